use std::sync::{Arc, Mutex};

// used to keep the one-to-one mapping between field names and their positions in a row
use bimap::BiMap;

// postings of secondary indexes, ordered by row identifier
use roaring::RoaringTreemap;

// keys of lookups are strings, so we use a fast non-cryptographic hasher
use core::hash::{BuildHasher, BuildHasherDefault};
use seahash::SeaHasher;
use std::collections::HashMap;

// used to tokenize text keys
use lazy_static::lazy_static;
use regex::Regex;

// schema descriptors are supplied as data
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use tracing::{debug, warn};

// our own stuff that we need
use crate::datatype::{FieldType, Value, describe};
use crate::error::{RecbaseError, Result};
use crate::iterator::ForwardIter;
use crate::persist::Persistor;
use crate::record::Record;

// ------------- Row identifiers -------------
pub type RowId = u64;

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// Frequency attached to a row when the input carries no `$fq`.
pub const DEFAULT_FQ: u64 = 1;
/// Largest frequency a row can carry.
pub const MAX_FQ: u64 = i64::MAX as u64;

// ------------- Field -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: FieldType,
    #[serde(default)]
    primary: bool,
    #[serde(default, rename = "shortstring")]
    short_string: bool,
    #[serde(default)]
    null: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            primary: false,
            short_string: false,
            null: false,
        }
    }
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }
    pub fn short_string(mut self) -> Self {
        self.short_string = true;
        self
    }
    pub fn nullable(mut self) -> Self {
        self.null = true;
        self
    }
    // Only getters are exposed, so a schema stays immutable once a store owns it.
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }
    pub fn is_primary(&self) -> bool {
        self.primary
    }
    pub fn is_short_string(&self) -> bool {
        self.short_string
    }
    pub fn is_nullable(&self) -> bool {
        self.null
    }
    /// Validates one input value against this field.
    pub fn accept(&self, json: &Json) -> Result<Value> {
        if json.is_null() && self.null {
            return Ok(Value::Null);
        }
        self.field_type
            .convert(json)
            .ok_or_else(|| RecbaseError::Type {
                field: self.name.clone(),
                expected: self.field_type.to_string(),
                found: describe(json).to_string(),
            })
    }
    /// The value stored when a row omits this field.
    pub fn absent_value(&self) -> Value {
        if self.null {
            Value::Null
        } else {
            self.field_type.default_value()
        }
    }
}

// ------------- Key -------------
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Text,
    Value,
}
impl KeyKind {
    pub fn name(&self) -> &'static str {
        match self {
            KeyKind::Text => "text",
            KeyKind::Value => "value",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    field: String,
    #[serde(rename = "type")]
    kind: KeyKind,
}
impl KeySpec {
    pub fn new(field: impl Into<String>, kind: KeyKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
    pub fn field(&self) -> &str {
        &self.field
    }
    pub fn kind(&self) -> KeyKind {
        self.kind
    }
}

// ------------- Store descriptor -------------
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreDef {
    name: String,
    fields: Vec<FieldSchema>,
    #[serde(default)]
    keys: Vec<KeySpec>,
}
impl StoreDef {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSchema>, keys: Vec<KeySpec>) -> Self {
        Self {
            name: name.into(),
            fields,
            keys,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
    pub fn keys(&self) -> &[KeySpec] {
        &self.keys
    }
    /// Parses either a single descriptor or an array of them.
    pub fn parse_all(json: &str) -> Result<Vec<StoreDef>> {
        let parsed: Json = serde_json::from_str(json)?;
        match parsed {
            Json::Array(_) => Ok(serde_json::from_value(parsed)?),
            _ => Ok(vec![serde_json::from_value(parsed)?]),
        }
    }
}

// ------------- Schema -------------
#[derive(Debug)]
pub struct Schema {
    store: String,
    fields: Vec<FieldSchema>,
    positions: BiMap<String, usize>,
    primary: Option<usize>,
}
impl Schema {
    pub fn new(definition: &StoreDef) -> Result<Self> {
        let store = definition.name();
        if store.is_empty() {
            return Err(RecbaseError::Schema("store name is empty".into()));
        }
        let mut positions = BiMap::new();
        let mut primary = None;
        for (position, field) in definition.fields().iter().enumerate() {
            if field.name().is_empty() || field.name().starts_with('$') {
                return Err(RecbaseError::Schema(format!(
                    "store '{}' has an invalid field name '{}'",
                    store,
                    field.name()
                )));
            }
            if positions.insert_no_overwrite(field.name().to_owned(), position).is_err() {
                return Err(RecbaseError::Schema(format!(
                    "field '{}' repeats in store '{}'",
                    field.name(),
                    store
                )));
            }
            if field.is_primary() {
                if primary.is_some() {
                    return Err(RecbaseError::Schema(format!(
                        "store '{}' marks more than one field as primary",
                        store
                    )));
                }
                if field.is_nullable() {
                    return Err(RecbaseError::Schema(format!(
                        "primary field '{}' in store '{}' cannot be nullable",
                        field.name(),
                        store
                    )));
                }
                primary = Some(position);
            }
        }
        Ok(Self {
            store: store.to_owned(),
            fields: definition.fields().to_vec(),
            positions,
            primary,
        })
    }
    pub fn store_name(&self) -> &str {
        &self.store
    }
    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get_by_left(name).copied()
    }
    pub fn field_name(&self, position: usize) -> Option<&str> {
        self.positions.get_by_right(&position).map(String::as_str)
    }
    pub fn primary(&self) -> Option<usize> {
        self.primary
    }
    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.primary.map(|p| &self.fields[p])
    }
    pub fn resolve(&self, name: &str) -> Result<usize> {
        self.position(name).ok_or_else(|| RecbaseError::UnknownField {
            store: self.store.clone(),
            field: name.to_owned(),
        })
    }
}

// ------------- Lookups -------------
#[derive(Debug)]
pub struct Lookup<H = OtherHasher> {
    index: HashMap<String, RoaringTreemap, H>,
}
impl<H: BuildHasher + Default> Lookup<H> {
    pub fn new() -> Self {
        Self {
            index: HashMap::<String, RoaringTreemap, H>::default(),
        }
    }
    pub fn insert(&mut self, key: String, row: RowId) {
        let postings = self.index.entry(key).or_default();
        postings.insert(row);
    }
    pub fn lookup(&self, key: &str) -> Option<&RoaringTreemap> {
        self.index.get(key)
    }
    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
impl<H: BuildHasher + Default> Default for Lookup<H> {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").unwrap();
}

/// Splits text into lowercase word tokens, each reported once, for text keys.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = WORD
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

#[derive(Debug)]
struct KeyIndex {
    spec: KeySpec,
    position: usize,
    lookup: Lookup,
}

// ------------- Rows -------------
#[derive(Debug)]
pub(crate) struct Row {
    pub(crate) fq: u64,
    pub(crate) values: Box<[Value]>,
}

// ------------- Store -------------
// A named table of rows, appended in order and never reordered.
#[derive(Debug)]
pub struct Store {
    definition: StoreDef,
    schema: Arc<Schema>,
    keys: Vec<KeyIndex>,
    primary_lookup: HashMap<String, RowId, OtherHasher>,
    rows: Vec<Row>,
    // responsible for the persistence layer, absent for in-memory bases
    persistor: Option<Arc<Mutex<Persistor>>>,
}

impl Store {
    pub fn new(definition: StoreDef, persistor: Option<Arc<Mutex<Persistor>>>) -> Result<Self> {
        let schema = Schema::new(&definition)?;
        let mut keys: Vec<KeyIndex> = Vec::new();
        for spec in definition.keys() {
            let position = schema.position(spec.field()).ok_or_else(|| {
                RecbaseError::Schema(format!(
                    "key references unknown field '{}' in store '{}'",
                    spec.field(),
                    definition.name()
                ))
            })?;
            if spec.kind() == KeyKind::Text
                && schema.fields()[position].field_type() != FieldType::String
            {
                return Err(RecbaseError::Schema(format!(
                    "text key on field '{}' in store '{}' requires a string field",
                    spec.field(),
                    definition.name()
                )));
            }
            if keys.iter().any(|k| k.spec == *spec) {
                return Err(RecbaseError::Schema(format!(
                    "{} key on field '{}' is declared twice in store '{}'",
                    spec.kind().name(),
                    spec.field(),
                    definition.name()
                )));
            }
            keys.push(KeyIndex {
                spec: spec.clone(),
                position,
                lookup: Lookup::new(),
            });
        }
        Ok(Self {
            definition,
            schema: Arc::new(schema),
            keys,
            primary_lookup: HashMap::default(),
            rows: Vec::new(),
            persistor,
        })
    }
    pub fn name(&self) -> &str {
        self.definition.name()
    }
    pub fn definition(&self) -> &StoreDef {
        &self.definition
    }
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }
    pub fn fields(&self) -> &[FieldSchema] {
        self.schema.fields()
    }
    pub fn keys(&self) -> &[KeySpec] {
        self.definition.keys()
    }
    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.schema.primary_field()
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Adds a row given as a JSON object of field values plus an optional `$fq`.
    ///
    /// The row is validated in full before anything changes: a rejected row
    /// leaves the row count and every index exactly as they were.
    pub fn add(&mut self, row: &Json) -> Result<RowId> {
        let (fq, values) = self.prepare(row).inspect_err(|e| {
            warn!(store = %self.name(), error = %e, "row rejected");
        })?;
        self.check_unique(&values)?;
        let id = self.rows.len() as RowId;
        if let Some(persistor) = &self.persistor {
            persistor
                .lock()
                .map_err(|e| RecbaseError::Lock(e.to_string()))?
                .persist_row(self.name(), id, fq, &values)?;
        }
        self.append(fq, values);
        debug!(store = %self.name(), id, fq, "row added");
        Ok(id)
    }

    // Replays a persisted row through the same checks and indexing as `add`.
    pub(crate) fn restore(&mut self, id: RowId, fq: u64, stored: &Json) -> Result<()> {
        if id != self.rows.len() as RowId {
            return Err(RecbaseError::Persistence(format!(
                "store '{}' expected row {} but found row {}",
                self.name(),
                self.rows.len(),
                id
            )));
        }
        let stored = stored.as_array().ok_or_else(|| {
            RecbaseError::Persistence(format!("row {} of store '{}' is not an array", id, self.name()))
        })?;
        let mut values = Vec::with_capacity(self.schema.fields().len());
        for (position, field) in self.schema.fields().iter().enumerate() {
            let value = match stored.get(position) {
                Some(json) => field.accept(json)?,
                None => field.absent_value(),
            };
            values.push(value);
        }
        self.check_unique(&values)?;
        self.append(fq, values);
        Ok(())
    }

    fn prepare(&self, row: &Json) -> Result<(u64, Vec<Value>)> {
        let object = row.as_object().ok_or_else(|| RecbaseError::Type {
            field: self.name().to_owned(),
            expected: "object".into(),
            found: describe(row).into(),
        })?;
        let mut fq = DEFAULT_FQ;
        let mut given: Vec<Option<Value>> = vec![None; self.schema.fields().len()];
        for (key, json) in object {
            if key == "$fq" {
                // frequencies are stored as signed 64-bit integers
                fq = json
                    .as_u64()
                    .filter(|fq| *fq <= MAX_FQ)
                    .ok_or_else(|| RecbaseError::Type {
                        field: "$fq".into(),
                        expected: "non-negative integer up to 2^63-1".into(),
                        found: describe(json).into(),
                    })?;
                continue;
            }
            // other metadata, such as the $id of a serialized record
            if key.starts_with('$') {
                continue;
            }
            let position = self.schema.resolve(key)?;
            given[position] = Some(self.schema.fields()[position].accept(json)?);
        }
        let values = given
            .into_iter()
            .zip(self.schema.fields())
            .map(|(value, field)| value.unwrap_or_else(|| field.absent_value()))
            .collect();
        Ok((fq, values))
    }

    fn check_unique(&self, values: &[Value]) -> Result<()> {
        let Some(primary) = self.schema.primary() else {
            return Ok(());
        };
        if let Some(key) = values[primary].index_key() {
            if self.primary_lookup.contains_key(&key) {
                return Err(RecbaseError::DuplicateKey {
                    store: self.name().to_owned(),
                    field: self.schema.fields()[primary].name().to_owned(),
                    value: key,
                });
            }
        }
        Ok(())
    }

    // Infallible once the row has been validated.
    fn append(&mut self, fq: u64, values: Vec<Value>) {
        let id = self.rows.len() as RowId;
        if let Some(primary) = self.schema.primary() {
            if let Some(key) = values[primary].index_key() {
                self.primary_lookup.insert(key, id);
            }
        }
        for key in self.keys.iter_mut() {
            let value = &values[key.position];
            match key.spec.kind() {
                KeyKind::Value => {
                    if let Some(k) = value.index_key() {
                        key.lookup.insert(k, id);
                    }
                }
                KeyKind::Text => {
                    if let Some(text) = value.as_str() {
                        for token in tokenize(text) {
                            key.lookup.insert(token, id);
                        }
                    }
                }
            }
        }
        self.rows.push(Row {
            fq,
            values: values.into_boxed_slice(),
        });
    }

    pub(crate) fn row(&self, id: RowId) -> &Row {
        &self.rows[id as usize]
    }

    /// The record at row identifier `id`, if such a row exists.
    pub fn rec(&self, id: RowId) -> Option<Record<'_>> {
        if id < self.rows.len() as RowId {
            Some(Record::new(self, id))
        } else {
            None
        }
    }
    pub fn first(&self) -> Option<Record<'_>> {
        self.rec(0)
    }
    pub fn last(&self) -> Option<Record<'_>> {
        self.rows
            .len()
            .checked_sub(1)
            .map(|id| Record::new(self, id as RowId))
    }
    /// All records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> + '_ {
        (0..self.rows.len() as RowId).map(move |id| Record::new(self, id))
    }
    pub fn forward_iter(&self) -> ForwardIter<'_> {
        ForwardIter::new(self)
    }

    /// Finds a record through the primary field. Absence is not an error,
    /// and neither is a name of another type than the primary field.
    pub fn rec_by_name<V: Into<Value>>(&self, name: V) -> Option<Record<'_>> {
        let field = self.schema.primary_field()?;
        let key = field.field_type().coerce(name.into())?.index_key()?;
        self.primary_lookup
            .get(&key)
            .map(|id| Record::new(self, *id))
    }
    /// Exact-match query through a value key.
    pub fn lookup<V: Into<Value>>(&self, field: &str, value: V) -> Result<Vec<Record<'_>>> {
        let key = self.key_index(field, KeyKind::Value)?;
        let value = value.into();
        if value.is_null() {
            // nulls are never indexed
            return Ok(Vec::new());
        }
        let field_type = self.schema.fields()[key.position].field_type();
        let found = value.type_name();
        let value = field_type.coerce(value).ok_or_else(|| RecbaseError::Type {
            field: field.to_owned(),
            expected: field_type.to_string(),
            found: found.to_owned(),
        })?;
        let records = match value.index_key() {
            Some(k) => key
                .lookup
                .lookup(&k)
                .map(|rows| self.records_of(rows))
                .unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(records)
    }
    /// Records whose text-keyed field contains every token of `text`.
    pub fn search(&self, field: &str, text: &str) -> Result<Vec<Record<'_>>> {
        let key = self.key_index(field, KeyKind::Text)?;
        let mut hits: Option<RoaringTreemap> = None;
        for token in tokenize(text) {
            let Some(rows) = key.lookup.lookup(&token) else {
                return Ok(Vec::new());
            };
            hits = Some(match hits {
                None => rows.clone(),
                Some(mut acc) => {
                    acc &= rows;
                    acc
                }
            });
        }
        Ok(hits.map(|rows| self.records_of(&rows)).unwrap_or_default())
    }
    fn key_index(&self, field: &str, kind: KeyKind) -> Result<&KeyIndex> {
        let position = self.schema.resolve(field)?;
        self.keys
            .iter()
            .find(|k| k.position == position && k.spec.kind() == kind)
            .ok_or_else(|| RecbaseError::NoKey {
                store: self.name().to_owned(),
                field: field.to_owned(),
                kind: kind.name().to_owned(),
            })
    }
    fn records_of(&self, rows: &RoaringTreemap) -> Vec<Record<'_>> {
        rows.iter().map(|id| Record::new(self, id)).collect()
    }
}
