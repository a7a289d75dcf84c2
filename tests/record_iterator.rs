use recbase::base::Base;
use recbase::datatype::Value;
use serde_json::json;

fn setup() -> Base {
    let mut base = Base::in_memory();
    base.create_store_json(
        r#"[{
            "name": "People",
            "fields": [
                { "name": "Name", "type": "string", "primary": true },
                { "name": "Gender", "type": "string", "shortstring": true }
            ],
            "keys": [
                { "field": "Name", "type": "text" },
                { "field": "Gender", "type": "value" }
            ]
        }]"#,
    )
    .expect("schema");
    let people = base.store_mut("People").expect("store");
    people
        .add(&json!({ "Name": "Carolina Fortuna", "Gender": "Female", "$fq": 5 }))
        .expect("first row");
    people
        .add(&json!({ "Name": "Blaz Fortuna", "Gender": "Male", "$fq": 3 }))
        .expect("second row");
    base
}

#[test]
fn record_metadata() {
    let base = setup();
    let rec = base.store("People").unwrap().first().expect("row 0");
    assert_eq!(rec.id(), 0);
    assert_eq!(rec.name(), Some(&Value::from("Carolina Fortuna")));
    assert_eq!(rec.fq(), 5);
    assert_eq!(rec.store_name(), "People");
    assert_eq!(rec.store().name(), "People");
    base.close().unwrap();
}

#[test]
fn detached_record_matches_the_view() {
    let base = setup();
    let rec = base.store("People").unwrap().first().unwrap();
    let copy = rec.detach();
    assert_eq!(copy.get("Name").unwrap(), rec.get("Name").unwrap());
    assert_eq!(copy.get("Gender").unwrap(), rec.get("Gender").unwrap());
    assert_eq!(copy.id(), rec.id());
    assert_eq!(copy.fq(), 5);
    assert_eq!(copy.store_name(), "People");
    assert_eq!(copy.name(), rec.name());
    assert_eq!(copy.to_json(), rec.to_json());
}

#[test]
fn detached_record_outlives_the_base() {
    let base = setup();
    let copy = base.store("People").unwrap().rec(1).unwrap().detach();
    base.close().unwrap();
    assert_eq!(copy.get("Name").unwrap(), "Blaz Fortuna");
    assert_eq!(copy.to_json(), json!({ "$id": 1, "Name": "Blaz Fortuna", "Gender": "Male" }));
}

#[test]
fn to_json_has_id_and_fields_only() {
    let base = setup();
    let json = base.store("People").unwrap().first().unwrap().to_json();
    assert_eq!(json, json!({ "$id": 0, "Name": "Carolina Fortuna", "Gender": "Female" }));
    let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["$id", "Name", "Gender"]);
}

#[test]
fn unknown_field_read_is_an_error() {
    let base = setup();
    let rec = base.store("People").unwrap().first().unwrap();
    let err = rec.get("Age").unwrap_err();
    assert!(format!("{}", err).contains("Unknown field 'Age'"));
}

#[test]
fn records_with_the_same_row_are_equal() {
    let base = setup();
    let people = base.store("People").unwrap();
    assert_eq!(people.rec(1), people.rec_by_name("Blaz Fortuna"));
    assert_ne!(people.rec(0), people.rec(1));
}

#[test]
fn iterator_gives_the_first_record() {
    let base = setup();
    let mut iter = base.store("People").unwrap().forward_iter();
    assert!(iter.next());
    assert_eq!(iter.rec().get("Name").unwrap(), "Carolina Fortuna");
    assert_eq!(iter.rec().get("Gender").unwrap(), "Female");
    assert_eq!(iter.store().name(), "People");
}

#[test]
fn iterator_goes_through_all_records() {
    let base = setup();
    let mut iter = base.store("People").unwrap().forward_iter();

    assert!(iter.next());
    assert_eq!(iter.rec().get("Name").unwrap(), "Carolina Fortuna");
    assert_eq!(iter.rec().get("Gender").unwrap(), "Female");
    assert_eq!(iter.store().name(), "People");

    assert!(iter.next());
    assert_eq!(iter.rec().get("Name").unwrap(), "Blaz Fortuna");
    assert_eq!(iter.rec().get("Gender").unwrap(), "Male");
    assert_eq!(iter.store().name(), "People");

    assert!(!iter.next());
    assert!(!iter.next());
    assert!(iter.is_exhausted());
}

#[test]
fn iterator_keeps_a_detached_copy_across_advances() {
    let base = setup();
    let mut iter = base.store("People").unwrap().forward_iter();
    assert!(iter.next());
    let first = iter.rec().detach();
    assert!(iter.next());
    assert_eq!(iter.rec().id(), 1);
    assert_eq!(first.id(), 0);
    assert_eq!(first.get("Name").unwrap(), "Carolina Fortuna");
}

#[test]
#[should_panic(expected = "before the first next()")]
fn reading_before_next_panics() {
    let base = setup();
    let iter = base.store("People").unwrap().forward_iter();
    let _ = iter.rec();
}

#[test]
#[should_panic(expected = "after it was exhausted")]
fn reading_after_exhaustion_panics() {
    let base = setup();
    let mut iter = base.store("People").unwrap().forward_iter();
    while iter.next() {}
    let _ = iter.rec();
}

#[test]
fn iterator_over_an_empty_store() {
    let mut base = Base::in_memory();
    base.create_store_json(r#"{ "name": "Empty", "fields": [ { "name": "Title", "type": "string" } ] }"#)
        .unwrap();
    let mut iter = base.store("Empty").unwrap().forward_iter();
    assert!(!iter.next());
    assert!(!iter.next());
}
