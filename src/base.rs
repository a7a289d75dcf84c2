//! The lifecycle root: one base owns the stores of one database instance.
//!
//! Opening a base from a configuration target takes an exclusive lock next to
//! that target (`<target>.lock`). The lock is held for the life of the
//! [`Base`] and released by [`Base::close`], on drop, or when opening fails
//! part way. A lock left behind by an unclean shutdown is cleared with
//! [`release_lock`].

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// advisory locks keep a database to one live instance
use fs2::FileExt;
use tracing::{info, warn};

use crate::construct::{OtherHasher, Store, StoreDef};
use crate::error::{RecbaseError, Result};
use crate::persist::{PersistenceMode, Persistor};
use crate::settings::Settings;

fn lock_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

// ------------- Lock -------------
#[derive(Debug)]
struct BaseLock {
    path: PathBuf,
    file: File,
}

impl BaseLock {
    fn acquire(target: &Path) -> Result<BaseLock> {
        let path = lock_path(target);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    RecbaseError::Initialization(format!(
                        "{} is locked by another instance (release a stale lock first)",
                        target.display()
                    ))
                } else {
                    RecbaseError::Initialization(format!("{}: {}", path.display(), e))
                }
            })?;
        if let Err(e) = file.try_lock_exclusive() {
            let _ = fs::remove_file(&path);
            return Err(RecbaseError::Initialization(format!(
                "{}: {}",
                path.display(),
                e
            )));
        }
        // the pid is informational only
        let _ = writeln!(file, "{}", std::process::id());
        Ok(BaseLock { path, file })
    }
}

impl Drop for BaseLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = fs::remove_file(&self.path);
    }
}

/// Clears a lock left behind by a base that was not closed.
///
/// Returns `Ok(false)` when there is no lock, `Ok(true)` when a stale lock
/// was removed, and an initialization error when a live instance still holds it.
pub fn release_lock(target: impl AsRef<Path>) -> Result<bool> {
    let path = lock_path(target.as_ref());
    let file = match OpenOptions::new().write(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(RecbaseError::Initialization(format!("{}: {}", path.display(), e)));
        }
    };
    if file.try_lock_exclusive().is_err() {
        return Err(RecbaseError::Initialization(format!(
            "{} is held by a live instance",
            path.display()
        )));
    }
    let _ = FileExt::unlock(&file);
    fs::remove_file(&path)
        .map_err(|e| RecbaseError::Initialization(format!("{}: {}", path.display(), e)))?;
    warn!(lock = %path.display(), "cleared stale lock");
    Ok(true)
}

// ------------- Base -------------
#[derive(Debug)]
pub struct Base {
    settings: Settings,
    mode: PersistenceMode,
    stores: HashMap<String, Store, OtherHasher>,
    // responsible for the persistence layer, shared with every store
    persistor: Option<Arc<Mutex<Persistor>>>,
    // dropped last, after the persistor has closed its connection
    lock: Option<BaseLock>,
}

impl Base {
    /// Opens or initializes the base described by the configuration target.
    ///
    /// With `reset` set, an existing database file is deleted first. Stores in
    /// the schema file that were already restored from disk with the same
    /// definition are kept as they are.
    pub fn create(
        config_target: impl AsRef<Path>,
        schema_path: Option<&Path>,
        reset: bool,
    ) -> Result<Base> {
        let target = config_target.as_ref();
        let settings = Settings::load(target)?;
        let lock = BaseLock::acquire(target)?;
        // on any error below the lock is dropped, and thereby released
        let mode = settings.persistence_mode(target);
        let persistor = match &mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => {
                if reset && path.exists() {
                    fs::remove_file(path).map_err(|e| {
                        RecbaseError::Initialization(format!("{}: {}", path.display(), e))
                    })?;
                }
                let persistor = Persistor::new(path, settings.cache_size)
                    .map_err(|e| RecbaseError::Initialization(e.to_string()))?;
                Some(Arc::new(Mutex::new(persistor)))
            }
        };
        let mut base = Base {
            settings,
            mode,
            stores: HashMap::default(),
            persistor,
            lock: Some(lock),
        };
        base.restore()
            .map_err(|e| RecbaseError::Initialization(e.to_string()))?;
        if let Some(schema_path) = schema_path {
            let text = fs::read_to_string(schema_path).map_err(|e| {
                RecbaseError::Schema(format!("{}: {}", schema_path.display(), e))
            })?;
            let definitions = StoreDef::parse_all(&text)?;
            let fresh: Vec<StoreDef> = definitions
                .into_iter()
                .map(|def| match base.stores.get(def.name()) {
                    Some(existing) if existing.definition() == &def => Ok(None),
                    Some(_) => Err(RecbaseError::Schema(format!(
                        "store '{}' already exists with a different definition",
                        def.name()
                    ))),
                    None => Ok(Some(def)),
                })
                .filter_map(Result::transpose)
                .collect::<Result<_>>()?;
            base.create_store(&fresh)?;
        }
        info!(
            config = %target.display(),
            mode = ?base.mode,
            stores = base.stores.len(),
            cache_size = base.settings.cache_size,
            port = base.settings.port,
            "base opened"
        );
        Ok(base)
    }

    /// A base that lives only in memory and takes no lock.
    pub fn in_memory() -> Base {
        Base {
            settings: Settings::default(),
            mode: PersistenceMode::InMemory,
            stores: HashMap::default(),
            persistor: None,
            lock: None,
        }
    }

    fn restore(&mut self) -> Result<()> {
        let Some(persistor) = self.persistor.clone() else {
            return Ok(());
        };
        let mut persistor = persistor
            .lock()
            .map_err(|e| RecbaseError::Lock(e.to_string()))?;
        for definition in persistor.restore_stores()? {
            let rows = persistor.restore_rows(definition.name())?;
            let mut store = Store::new(definition, self.persistor.clone())?;
            for row in &rows {
                store.restore(row.id, row.fq, &row.values)?;
            }
            info!(store = %store.name(), rows = store.len(), "store restored");
            self.stores.insert(store.name().to_owned(), store);
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
    pub fn persistence_mode(&self) -> &PersistenceMode {
        &self.mode
    }

    /// Creates stores from descriptors. Every descriptor is validated before
    /// any store is registered, so a bad descriptor leaves the base untouched.
    pub fn create_store(&mut self, definitions: &[StoreDef]) -> Result<()> {
        let mut created: Vec<Store> = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if self.stores.contains_key(definition.name())
                || created.iter().any(|s| s.name() == definition.name())
            {
                return Err(RecbaseError::Schema(format!(
                    "store '{}' already exists",
                    definition.name()
                )));
            }
            created.push(Store::new(definition.clone(), self.persistor.clone())?);
        }
        if let Some(persistor) = &self.persistor {
            persistor
                .lock()
                .map_err(|e| RecbaseError::Lock(e.to_string()))?
                .persist_stores(definitions)?;
        }
        for store in created {
            info!(store = %store.name(), fields = store.fields().len(), keys = store.keys().len(), "store created");
            self.stores.insert(store.name().to_owned(), store);
        }
        Ok(())
    }

    /// Creates stores from a JSON descriptor or an array of them.
    pub fn create_store_json(&mut self, json: &str) -> Result<()> {
        let definitions = StoreDef::parse_all(json)?;
        self.create_store(&definitions)
    }

    pub fn store(&self, name: &str) -> Result<&Store> {
        self.stores
            .get(name)
            .ok_or_else(|| RecbaseError::NotFound(format!("store '{}'", name)))
    }
    pub fn store_mut(&mut self, name: &str) -> Result<&mut Store> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| RecbaseError::NotFound(format!("store '{}'", name)))
    }
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Releases all stores, the storage engine and the lock. Taking `self`
    /// means nothing obtained from the base can be used afterwards.
    pub fn close(mut self) -> Result<()> {
        let stores = self.stores.len();
        // stores share the persistor, so they go first
        self.stores.clear();
        if let Some(persistor) = self.persistor.take() {
            Arc::try_unwrap(persistor)
                .map_err(|_| RecbaseError::Invariant("persistor still shared at close".into()))?
                .into_inner()
                .map_err(|e| RecbaseError::Lock(e.to_string()))?
                .close()?;
        }
        self.lock.take();
        info!(stores, "base closed");
        Ok(())
    }
}
