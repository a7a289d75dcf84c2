use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, ValueHint};
use serde_json::Value as Json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use recbase::base::{Base, release_lock};
use recbase::{RecbaseError, Result};

/// Opens a record base, optionally loads rows, and prints every record.
#[derive(Debug, Parser)]
#[command(name = "recbase", version, about = "Embedded record stores with keyed lookups")]
struct Cli {
    /// Configuration file of the base (JSON)
    #[arg(value_hint = ValueHint::FilePath)]
    config: PathBuf,
    /// Store descriptors to create (a JSON array or a single object)
    #[arg(long, value_hint = ValueHint::FilePath)]
    schema: Option<PathBuf>,
    /// Rows to add, as an object of store name to an array of rows
    #[arg(long, value_hint = ValueHint::FilePath)]
    rows: Option<PathBuf>,
    /// Delete the existing database before opening
    #[arg(long)]
    reset: bool,
    /// Clear a stale lock left by an unclean shutdown first
    #[arg(long)]
    release_lock: bool,
}

// Rows are given as { "<store>": [ { field: value, ... }, ... ], ... }
fn load_rows(base: &mut Base, path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path)
        .map_err(|e| RecbaseError::Config(format!("{}: {}", path.display(), e)))?;
    let parsed: Json = serde_json::from_str(&text)?;
    let Json::Object(stores) = parsed else {
        return Err(RecbaseError::Config(format!(
            "{} must hold an object of store names",
            path.display()
        )));
    };
    let mut added = 0;
    for (name, rows) in &stores {
        let rows = rows.as_array().ok_or_else(|| {
            RecbaseError::Config(format!(
                "{}: rows of store '{}' must be an array",
                path.display(),
                name
            ))
        })?;
        let store = base.store_mut(name)?;
        for row in rows {
            store.add(row)?;
            added += 1;
        }
    }
    Ok(added)
}

fn run(options: &Cli) -> Result<()> {
    if options.release_lock && release_lock(&options.config)? {
        info!("stale lock released");
    }
    let mut base = Base::create(&options.config, options.schema.as_deref(), options.reset)?;
    if let Some(rows) = &options.rows {
        let added = load_rows(&mut base, rows)?;
        info!(added, "rows loaded");
    }
    let mut names: Vec<&str> = base.store_names().collect();
    names.sort_unstable();
    for name in names {
        let mut iter = base.store(name)?.forward_iter();
        while iter.next() {
            let rec = iter.rec();
            println!("{} {}", rec.store_name(), rec.to_json());
        }
    }
    base.close()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let options = Cli::parse();
    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "recbase failed");
            ExitCode::FAILURE
        }
    }
}
