use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecbaseError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Initialization error: {0}")]
    Initialization(String),
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Type error: field '{field}' expects {expected}, got {found}")]
    Type {
        field: String,
        expected: String,
        found: String,
    },
    #[error("Duplicate key: store '{store}' already has a row with {field} = {value}")]
    DuplicateKey {
        store: String,
        field: String,
        value: String,
    },
    #[error("Unknown field '{field}' in store '{store}'")]
    UnknownField { store: String, field: String },
    #[error("No {kind} key on field '{field}' in store '{store}'")]
    NoKey {
        store: String,
        field: String,
        kind: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, RecbaseError>;

// Helper conversions
impl From<rusqlite::Error> for RecbaseError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}
impl From<config::ConfigError> for RecbaseError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}
impl From<serde_json::Error> for RecbaseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Schema(e.to_string())
    }
}
