//! A document-mapping layer over a document database.
//!
//! Models name their attributes freely; a per-model [`FieldMap`](query::FieldMap) maps those
//! names to the literal keys stored in documents. Keyword conditions such as
//! `age__gte = 21` are translated into native query documents, attribute updates into
//! native update documents, and results come back through a lazy [`QuerySet`](query::QuerySet).
//!
//! ```
//! use docmap::query::{Fields, QueryBuilder, FieldMap};
//! use bson::doc;
//!
//! let mut map = FieldMap::with_id();
//! map.insert("x", "location.x");
//! let q = QueryBuilder::new(&map).build(&Fields::new().with("x__gt", 3)).unwrap();
//! assert_eq!(q.into_document(), doc! { "location.x": { "$gt": 3 } });
//! ```

pub mod aggregation;
pub mod config;
pub mod connection;
pub mod driver;
pub mod errors;
pub mod logger;
pub mod model;
pub mod query;
pub mod types;

pub use aggregation::{Accumulator, Pipeline};
pub use config::OdmConfig;
pub use driver::memory::{MemoryCollection, MemoryDatabase};
pub use driver::{Collection, Database};
pub use errors::{OdmError, Result};
pub use model::{Model, ModelConfig, Record};
pub use query::{Fields, Q, QuerySet};
