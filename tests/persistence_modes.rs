use std::fs;
use std::path::{Path, PathBuf};

use recbase::RecbaseError;
use recbase::base::{Base, release_lock};
use recbase::persist::PersistenceMode;
use recbase::settings::Settings;
use rusqlite::{Connection, params};
use serde_json::json;
use tempfile::TempDir;

const SCHEMA: &str = r#"[{
    "name": "People",
    "fields": [
        { "name": "Name", "type": "string", "primary": true },
        { "name": "Gender", "type": "string", "shortstring": true }
    ],
    "keys": [
        { "field": "Name", "type": "text" },
        { "field": "Gender", "type": "value" }
    ]
}]"#;

// a config target with a file-backed database and a schema file next to it
fn setup(settings: Settings) -> (TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("base.conf");
    settings.save(&target, true).expect("config");
    let schema = dir.path().join("schema.json");
    fs::write(&schema, SCHEMA).expect("schema");
    (dir, target, schema)
}

fn add_people(base: &mut Base) {
    let people = base.store_mut("People").expect("store");
    people
        .add(&json!({ "Name": "Carolina Fortuna", "Gender": "Female", "$fq": 5 }))
        .expect("first row");
    people
        .add(&json!({ "Name": "Blaz Fortuna", "Gender": "Male", "$fq": 3 }))
        .expect("second row");
}

fn lock_file(target: &Path) -> PathBuf {
    PathBuf::from(format!("{}.lock", target.display()))
}

#[test]
fn in_memory_mode_allows_basic_operations() {
    let (_dir, target, schema) = setup(Settings::default());
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    assert_eq!(base.persistence_mode(), &PersistenceMode::InMemory);
    add_people(&mut base);
    assert_eq!(base.store("People").unwrap().len(), 2);
    base.close().unwrap();

    // nothing survives a reopen
    let base = Base::create(&target, None, false).expect("base");
    assert!(matches!(base.store("People"), Err(RecbaseError::NotFound(_))));
    base.close().unwrap();
}

#[test]
fn file_mode_restores_rows_and_indexes() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    assert_eq!(
        base.persistence_mode(),
        &PersistenceMode::File(dir.path().join("people.db"))
    );
    add_people(&mut base);
    base.close().unwrap();

    // reopening with the same schema keeps the restored store
    let mut base = Base::create(&target, Some(schema.as_path()), false).expect("reopen");
    let people = base.store("People").unwrap();
    assert_eq!(people.len(), 2);
    let rec = people.first().unwrap();
    assert_eq!(rec.fq(), 5);
    assert_eq!(rec.to_json(), json!({ "$id": 0, "Name": "Carolina Fortuna", "Gender": "Female" }));
    assert_eq!(people.rec_by_name("Blaz Fortuna").map(|r| r.id()), Some(1));
    assert_eq!(people.lookup("Gender", "Male").unwrap().len(), 1);
    assert_eq!(people.search("Name", "fortuna").unwrap().len(), 2);

    // restored primary keys still guard uniqueness, and ids continue densely
    let people = base.store_mut("People").unwrap();
    assert!(matches!(
        people.add(&json!({ "Name": "Blaz Fortuna", "Gender": "Male" })),
        Err(RecbaseError::DuplicateKey { .. })
    ));
    assert_eq!(people.add(&json!({ "Name": "Ana Novak", "Gender": "Female" })).unwrap(), 2);
    base.close().unwrap();

    let base = Base::create(&target, None, false).expect("reopen");
    assert_eq!(base.store("People").unwrap().len(), 3);
    base.close().unwrap();
}

#[test]
fn largest_frequency_survives_a_reopen() {
    let (_dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    let people = base.store_mut("People").unwrap();
    people.add(&json!({ "Name": "Ana", "$fq": i64::MAX })).unwrap();
    // rejected before anything is written, as in memory
    assert!(matches!(
        people.add(&json!({ "Name": "Bor", "$fq": u64::MAX })),
        Err(RecbaseError::Type { .. })
    ));
    base.close().unwrap();

    let base = Base::create(&target, None, false).expect("reopen");
    let people = base.store("People").unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people.first().unwrap().fq(), i64::MAX as u64);
    base.close().unwrap();
}

#[test]
fn store_definitions_are_written_all_or_nothing() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    let cities = r#"[
        { "name": "Cities", "fields": [ { "name": "Name", "type": "string" } ] },
        { "name": "Towns", "fields": [ { "name": "Name", "type": "string" } ] }
    ]"#;

    // a second connection takes the name of the last store behind the base's back
    let db = Connection::open(dir.path().join("people.db")).unwrap();
    db.execute(
        "insert into Store (Store_Name, Definition, Position) values (?, ?, ?)",
        params!["Towns", "{}", 99],
    )
    .unwrap();
    let err = base.create_store_json(cities).unwrap_err();
    assert!(matches!(err, RecbaseError::Persistence(_)), "unexpected {err}");
    let written: i64 = db
        .query_row("select count(*) from Store where Store_Name = 'Cities'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(written, 0);
    assert!(matches!(base.store("Cities"), Err(RecbaseError::NotFound(_))));

    // once the conflict is gone the same call succeeds
    db.execute("delete from Store where Store_Name = 'Towns'", []).unwrap();
    drop(db);
    base.create_store_json(cities).expect("retry");
    base.close().unwrap();

    let base = Base::create(&target, None, false).expect("reopen");
    let mut names: Vec<&str> = base.store_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Cities", "People", "Towns"]);
    base.close().unwrap();
}

#[test]
fn rows_with_a_gap_in_identity_fail_the_restore() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    add_people(&mut base);
    base.close().unwrap();

    let db = Connection::open(dir.path().join("people.db")).unwrap();
    db.execute("update StoreRow set Row_Identity = 5 where Row_Identity = 1", [])
        .unwrap();
    drop(db);

    let err = Base::create(&target, None, false).unwrap_err();
    assert!(matches!(err, RecbaseError::Initialization(_)), "unexpected {err}");
    assert!(!lock_file(&target).exists());
}

#[test]
fn unreadable_row_values_fail_the_restore() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    add_people(&mut base);
    base.close().unwrap();

    let db = Connection::open(dir.path().join("people.db")).unwrap();
    db.execute("update StoreRow set Row_Values = 'x' where Row_Identity = 0", [])
        .unwrap();
    drop(db);

    let err = Base::create(&target, None, false).unwrap_err();
    assert!(matches!(err, RecbaseError::Initialization(_)), "unexpected {err}");
    assert!(!lock_file(&target).exists());
}

#[test]
fn reset_wipes_existing_state() {
    let (_dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let mut base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    add_people(&mut base);
    base.close().unwrap();

    let base = Base::create(&target, Some(schema.as_path()), true).expect("reset");
    assert!(base.store("People").unwrap().is_empty());
    base.close().unwrap();
}

#[test]
fn conflicting_schema_for_a_restored_store_is_refused() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    let base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    base.close().unwrap();

    let other = dir.path().join("other.json");
    fs::write(
        &other,
        r#"{ "name": "People", "fields": [ { "name": "Name", "type": "int" } ] }"#,
    )
    .unwrap();
    let err = Base::create(&target, Some(other.as_path()), false).unwrap_err();
    assert!(matches!(err, RecbaseError::Schema(_)));
    // the failed open released its lock
    assert!(!lock_file(&target).exists());
}

#[test]
fn corrupt_database_fails_initialization() {
    let (dir, target, schema) = setup(Settings::default().with_database("people.db"));
    fs::write(dir.path().join("people.db"), vec![b'x'; 4096]).unwrap();
    let err = Base::create(&target, Some(schema.as_path()), false).unwrap_err();
    assert!(matches!(err, RecbaseError::Initialization(_)), "unexpected {err}");
    assert!(!lock_file(&target).exists());

    // a reset opens over the corrupt file
    let base = Base::create(&target, Some(schema.as_path()), true).expect("reset");
    base.close().unwrap();
}

#[test]
fn a_live_base_locks_its_target() {
    let (_dir, target, schema) = setup(Settings::default());
    let base = Base::create(&target, Some(schema.as_path()), true).expect("base");
    assert!(lock_file(&target).exists());

    let err = Base::create(&target, None, false).unwrap_err();
    assert!(matches!(err, RecbaseError::Initialization(_)));
    // a live holder cannot be cleared
    assert!(matches!(release_lock(&target), Err(RecbaseError::Initialization(_))));

    base.close().unwrap();
    assert!(!lock_file(&target).exists());
    assert!(!release_lock(&target).unwrap());
    Base::create(&target, None, false).expect("after close").close().unwrap();
}

#[test]
fn stale_lock_is_released_before_create() {
    let (_dir, target, _schema) = setup(Settings::default());
    // a lock file nobody holds, as left by an unclean shutdown
    fs::write(lock_file(&target), "12345\n").unwrap();
    assert!(matches!(
        Base::create(&target, None, false),
        Err(RecbaseError::Initialization(_))
    ));
    assert!(release_lock(&target).unwrap());
    let base = Base::create(&target, None, false).expect("base");
    base.close().unwrap();
}

#[test]
fn dropping_a_base_releases_its_lock() {
    let (_dir, target, _schema) = setup(Settings::default());
    {
        let _base = Base::create(&target, None, false).expect("base");
        assert!(lock_file(&target).exists());
    }
    assert!(!lock_file(&target).exists());
}

#[test]
fn missing_config_target_is_a_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Base::create(dir.path().join("nope.conf"), None, false).unwrap_err();
    assert!(matches!(err, RecbaseError::Config(_)));
}

#[test]
fn tuning_values_are_carried_through() {
    let settings = Settings { cache_size: 64, port: 9090, ..Settings::default() };
    let (_dir, target, _schema) = setup(settings.clone());
    let base = Base::create(&target, None, false).expect("base");
    assert_eq!(base.settings(), &settings);
    base.close().unwrap();
}
