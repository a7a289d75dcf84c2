// used for persistence
use rusqlite::{Connection, params};
use serde_json::Value as Json;
use std::path::{Path, PathBuf};

use crate::construct::{RowId, StoreDef};
use crate::datatype::Value;
use crate::error::{RecbaseError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

/// A row as it was written: identifier, frequency and the field values as a JSON array.
#[derive(Debug)]
pub struct PersistedRow {
    pub id: RowId,
    pub fq: u64,
    pub values: Json,
}

fn to_sql_integer(n: u64, what: &str) -> Result<i64> {
    i64::try_from(n).map_err(|_| RecbaseError::Persistence(format!("{} {} is out of range", what, n)))
}

// ------------- Persistence -------------
#[derive(Debug)]
pub struct Persistor {
    db: Connection,
    path: PathBuf,
}
impl Persistor {
    pub fn new(path: &Path, cache_size_mb: u64) -> Result<Persistor> {
        let connection = Connection::open(path)?;
        // negative values are in KiB
        connection.execute_batch(&format!(
            "PRAGMA cache_size = -{};",
            cache_size_mb.saturating_mul(1024)
        ))?;
        connection.execute_batch(
            "
            create table if not exists Store (
                Store_Name text not null,
                Definition text not null,
                Position integer not null,
                constraint referenceable_Store_Name primary key (
                    Store_Name
                )
            );
            create table if not exists StoreRow (
                Store_Name text not null,
                Row_Identity integer not null,
                Frequency integer not null,
                Row_Values text not null,
                constraint StoreRow_in_Store foreign key (
                    Store_Name
                ) references Store(Store_Name),
                constraint referenceable_Row_Identity primary key (
                    Store_Name,
                    Row_Identity
                )
            );
            ",
        )?;
        Ok(Persistor {
            db: connection,
            path: path.to_path_buf(),
        })
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn close(self) -> Result<()> {
        self.db.close().map_err(|(_, e)| e.into())
    }
    /// Writes store definitions in one transaction: either all of them are
    /// stored or none is.
    pub fn persist_stores(&mut self, definitions: &[StoreDef]) -> Result<()> {
        let tx = self.db.transaction()?;
        let first: i64 = tx.query_row("select count(*) from Store", [], |r| r.get(0))?;
        {
            let mut statement = tx.prepare_cached(
                "
                insert into Store (
                    Store_Name,
                    Definition,
                    Position
                ) values (?, ?, ?)
            ",
            )?;
            for (offset, definition) in definitions.iter().enumerate() {
                let text = serde_json::to_string(definition)
                    .map_err(|e| RecbaseError::Persistence(e.to_string()))?;
                statement.execute(params![definition.name(), text, first + offset as i64])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
    pub fn persist_row(&mut self, store: &str, id: RowId, fq: u64, values: &[Value]) -> Result<()> {
        let text = Json::Array(values.iter().map(Value::to_json).collect()).to_string();
        self.db
            .prepare_cached(
                "
                insert into StoreRow (
                    Store_Name,
                    Row_Identity,
                    Frequency,
                    Row_Values
                ) values (?, ?, ?, ?)
            ",
            )?
            .execute(params![
                store,
                to_sql_integer(id, "row identity")?,
                to_sql_integer(fq, "frequency")?,
                text
            ])?;
        Ok(())
    }
    pub fn restore_stores(&mut self) -> Result<Vec<StoreDef>> {
        let mut statement = self.db.prepare_cached(
            "
            select Definition
                from Store
                order by Position
        ",
        )?;
        let texts = statement
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        texts
            .iter()
            .map(|text| {
                serde_json::from_str(text).map_err(|e| {
                    RecbaseError::Persistence(format!("unreadable store definition: {}", e))
                })
            })
            .collect()
    }
    pub fn restore_rows(&mut self, store: &str) -> Result<Vec<PersistedRow>> {
        let mut statement = self.db.prepare_cached(
            "
            select Row_Identity, Frequency, Row_Values
                from StoreRow
                where Store_Name = ?
                order by Row_Identity
        ",
        )?;
        let raw = statement
            .query_map(params![store], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<(i64, i64, String)>>>()?;
        raw.into_iter()
            .map(|(id, fq, text)| {
                let corrupt = |what: &str| {
                    RecbaseError::Persistence(format!(
                        "row {} of store '{}' has {}",
                        id, store, what
                    ))
                };
                Ok(PersistedRow {
                    id: RowId::try_from(id).map_err(|_| corrupt("a negative identity"))?,
                    fq: u64::try_from(fq).map_err(|_| corrupt("a negative frequency"))?,
                    values: serde_json::from_str(&text).map_err(|_| corrupt("unreadable values"))?,
                })
            })
            .collect()
    }
}
