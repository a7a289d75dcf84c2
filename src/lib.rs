//! Recbase – a small embedded record store.
//!
//! Recbase keeps typed, schema-defined tables called *stores*:
//! * A [`construct::StoreDef`] names a store, its [`construct::FieldSchema`]s
//!   (name, [`datatype::FieldType`], primary and short-string flags) and its
//!   [`construct::KeySpec`]s (secondary indexes of kind `text` or `value`).
//! * A [`construct::Store`] owns the rows, appended in order and addressed by
//!   their 0-based insertion number (the row identifier), and keeps the
//!   secondary indexes up to date on every insertion.
//! * A [`record::Record`] is a view of one row: a reference to its store plus
//!   a row identifier. [`record::Record::detach`] copies the row out into an
//!   owned [`record::DetachedRecord`].
//! * An [`iterator::ForwardIter`] walks a store in insertion order, moving a
//!   single record along instead of creating one per row.
//! * A [`base::Base`] owns the stores of one database instance and is the
//!   lifecycle root: it is opened from a configuration target and closed
//!   explicitly.
//!
//! ## Modules
//! * [`construct`] – Schema descriptors, index lookups and the store itself.
//! * [`datatype`] – Field types and the values they hold.
//! * [`record`] – Record views and detached records.
//! * [`iterator`] – The forward iterator.
//! * [`base`] – Base lifecycle and the instance lock.
//! * [`settings`] – Reading and writing configuration targets.
//! * [`persist`] – SQLite persistence & restoration layer.
//!
//! ## Quick Start
//! ```
//! use recbase::base::Base;
//! use serde_json::json;
//!
//! let mut base = Base::in_memory();
//! base.create_store_json(r#"[{
//!     "name": "People",
//!     "fields": [
//!         { "name": "Name", "type": "string", "primary": true },
//!         { "name": "Gender", "type": "string", "shortstring": true }
//!     ],
//!     "keys": [
//!         { "field": "Name", "type": "text" },
//!         { "field": "Gender", "type": "value" }
//!     ]
//! }]"#).unwrap();
//! let people = base.store_mut("People").unwrap();
//! people.add(&json!({ "Name": "Carolina Fortuna", "Gender": "Female", "$fq": 5 })).unwrap();
//! people.add(&json!({ "Name": "Blaz Fortuna", "Gender": "Male", "$fq": 3 })).unwrap();
//!
//! let mut iter = base.store("People").unwrap().forward_iter();
//! while iter.next() {
//!     println!("{}", iter.rec().to_json());
//! }
//! base.close().unwrap();
//! ```
//!
//! ## Persistence
//! A configuration target whose settings name a `database` file makes the
//! base durable: store definitions and rows are written through a
//! [`persist::Persistor`] as they are created, and replayed (indexes included)
//! when the base is opened again without a reset.

pub mod base;
pub mod construct;
pub mod datatype;
pub mod error;
pub mod iterator;
pub mod persist;
pub mod record;
pub mod settings;

pub use error::{RecbaseError, Result};
