//! Record views over store rows, and detached snapshots of them.
//!
//! A [`Record`] is a view: a reference to its owning [`Store`] plus a row
//! identifier. Every read resolves against the store's row data, so a record
//! cannot outlive the store (or the base) it was obtained from.
//! [`Record::detach`] copies the row out into a [`DetachedRecord`] that owns
//! its values and can be kept for as long as the caller likes.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as Json};

use crate::construct::{RowId, Schema, Store};
use crate::datatype::Value;
use crate::error::Result;

// `$id` followed by every declared field, in declaration order.
fn record_json(schema: &Schema, id: RowId, values: &[Value]) -> Json {
    let mut object = Map::with_capacity(values.len() + 1);
    object.insert("$id".to_owned(), Json::from(id));
    for (field, value) in schema.fields().iter().zip(values) {
        object.insert(field.name().to_owned(), value.to_json());
    }
    Json::Object(object)
}

fn primary_value<'v>(schema: &Schema, values: &'v [Value]) -> Option<&'v Value> {
    schema.primary().map(|p| &values[p])
}

// ------------- Record -------------
pub struct Record<'a> {
    store: &'a Store,
    id: RowId,
}

impl<'a> Record<'a> {
    pub(crate) fn new(store: &'a Store, id: RowId) -> Self {
        Self { store, id }
    }
    // used by the forward iterator to move its single record along
    pub(crate) fn set_id(&mut self, id: RowId) {
        self.id = id;
    }
    pub fn id(&self) -> RowId {
        self.id
    }
    pub fn store(&self) -> &'a Store {
        self.store
    }
    pub fn store_name(&self) -> &'a str {
        self.store.name()
    }
    pub fn fq(&self) -> u64 {
        self.store.row(self.id).fq
    }
    /// Value of the primary field, or `None` when the store declares none.
    pub fn name(&self) -> Option<&'a Value> {
        primary_value(self.store.schema(), self.values())
    }
    pub fn get(&self, field: &str) -> Result<&'a Value> {
        let position = self.store.schema().resolve(field)?;
        Ok(&self.values()[position])
    }
    /// Field values in declaration order.
    pub fn values(&self) -> &'a [Value] {
        &self.store.row(self.id).values
    }
    pub fn to_json(&self) -> Json {
        record_json(self.store.schema(), self.id, self.values())
    }
    /// Clones the record: the current row is copied into a record that owns
    /// its values and no longer reads through the store.
    ///
    /// This is the only way to copy a record. A view itself cannot be cloned,
    /// so nothing can keep reading a row through a copied handle:
    ///
    /// ```compile_fail
    /// # use recbase::base::Base;
    /// # let mut base = Base::in_memory();
    /// # base.create_store_json(r#"{ "name": "A", "fields": [] }"#).unwrap();
    /// # base.store_mut("A").unwrap().add(&serde_json::json!({})).unwrap();
    /// let rec = base.store("A").unwrap().first().unwrap();
    /// let view: recbase::record::Record = rec.clone();
    /// ```
    pub fn detach(&self) -> DetachedRecord {
        let row = self.store.row(self.id);
        DetachedRecord {
            schema: Arc::clone(self.store.schema()),
            id: self.id,
            fq: row.fq,
            values: row.values.to_vec(),
        }
    }
}

impl PartialEq for Record<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.store, other.store) && self.id == other.id
    }
}
impl Eq for Record<'_> {}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Record")
            .field("store", &self.store_name())
            .field("id", &self.id)
            .finish()
    }
}
impl fmt::Display for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

// ------------- DetachedRecord -------------
#[derive(Clone, Debug)]
pub struct DetachedRecord {
    schema: Arc<Schema>,
    id: RowId,
    fq: u64,
    values: Vec<Value>,
}

impl DetachedRecord {
    pub fn id(&self) -> RowId {
        self.id
    }
    pub fn store_name(&self) -> &str {
        self.schema.store_name()
    }
    pub fn fq(&self) -> u64 {
        self.fq
    }
    pub fn name(&self) -> Option<&Value> {
        primary_value(&self.schema, &self.values)
    }
    pub fn get(&self, field: &str) -> Result<&Value> {
        let position = self.schema.resolve(field)?;
        Ok(&self.values[position])
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn to_json(&self) -> Json {
        record_json(&self.schema, self.id, &self.values)
    }
}

impl PartialEq for DetachedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.store_name() == other.store_name()
            && self.id == other.id
            && self.fq == other.fq
            && self.values == other.values
    }
}
