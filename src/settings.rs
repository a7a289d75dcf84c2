//! Configuration target handling.
//!
//! A configuration target is a JSON file read through `config`, with
//! `RECBASE_`-prefixed environment variables taking precedence:
//!
//! ```json
//! { "database": "people.db", "cache_size": 1024, "port": 8080 }
//! ```
//!
//! `database` is resolved relative to the directory of the file and selects
//! file-backed persistence; without it the base lives in memory only.
//! `cache_size` (MiB) is handed to the storage engine, while `port` is carried
//! for callers and not interpreted here.

use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{RecbaseError, Result};
use crate::persist::PersistenceMode;

pub const DEFAULT_CACHE_SIZE: u64 = 1024;
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default = "default_cache_size")]
    pub cache_size: u64,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_cache_size() -> u64 {
    DEFAULT_CACHE_SIZE
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: None,
            cache_size: DEFAULT_CACHE_SIZE,
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    pub fn with_database(mut self, database: impl Into<PathBuf>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn load(target: &Path) -> Result<Settings> {
        let name = target
            .to_str()
            .ok_or_else(|| RecbaseError::Config(format!("{} is not valid UTF-8", target.display())))?;
        let settings = Config::builder()
            .add_source(File::new(name, FileFormat::Json).required(true))
            .add_source(Environment::with_prefix("RECBASE").try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings)
    }

    /// Writes these settings to `target`. An existing file is only replaced
    /// when `overwrite` is set; returns whether the file was written.
    pub fn save(&self, target: &Path, overwrite: bool) -> Result<bool> {
        if target.exists() && !overwrite {
            return Ok(false);
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| RecbaseError::Config(e.to_string()))?;
        fs::write(target, text)
            .map_err(|e| RecbaseError::Config(format!("{}: {}", target.display(), e)))?;
        Ok(true)
    }

    pub fn persistence_mode(&self, target: &Path) -> PersistenceMode {
        match &self.database {
            None => PersistenceMode::InMemory,
            Some(database) if database.is_absolute() => PersistenceMode::File(database.clone()),
            Some(database) => {
                let dir = target.parent().unwrap_or_else(|| Path::new(""));
                PersistenceMode::File(dir.join(database))
            }
        }
    }
}
