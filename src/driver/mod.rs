//! Database driver boundary.
//!
//! The ODM layer builds native query and update documents and hands them to a [`Collection`].
//! Any backend that speaks the document grammar can sit behind these traits; [`memory`] is the
//! in-process one used by tests and the CLI.

pub mod memory;

use bson::{Bson, Document};
use std::sync::Arc;

use crate::errors::{OdmError, Result};
use crate::types::{DeleteOutcome, SortKey, UpdateOutcome, WriteOptions};

/// Everything a find needs: filter, ordering and window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindSpec {
    pub filter: Document,
    pub sort: Vec<SortKey>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl FindSpec {
    #[must_use]
    pub const fn new(filter: Document) -> Self {
        Self { filter, sort: Vec::new(), limit: None, skip: None }
    }

    /// The sort specification in wire form (`{key: 1, other: -1}`).
    #[must_use]
    pub fn sort_document(&self) -> Document {
        self.sort.iter().map(|s| (s.key.clone(), Bson::Int32(s.direction.as_i32()))).collect()
    }
}

/// Documents streamed back from a find; each item may fail independently.
pub type DocumentStream<'a> = Box<dyn Iterator<Item = Result<Document>> + 'a>;

/// One collection on the server.
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// `DatabaseUnavailable` or `QueryExecution` from the backend.
    fn find(&self, spec: &FindSpec) -> Result<DocumentStream<'_>>;

    /// # Errors
    /// Backend errors.
    fn find_one(&self, filter: &Document) -> Result<Option<Document>> {
        let mut spec = FindSpec::new(filter.clone());
        spec.limit = Some(1);
        self.find(&spec)?.next().transpose()
    }

    /// Inserts `doc` and returns its `_id`, generating one when absent.
    ///
    /// # Errors
    /// Backend errors.
    fn insert(&self, doc: Document, options: WriteOptions) -> Result<Bson>;

    /// Applies `update` to the first document matching `selector`.
    ///
    /// # Errors
    /// Backend errors.
    fn update(&self, selector: &Document, update: &Document, options: WriteOptions) -> Result<UpdateOutcome>;

    /// # Errors
    /// Backend errors.
    fn remove(&self, selector: &Document, options: WriteOptions) -> Result<DeleteOutcome>;

    /// # Errors
    /// Backend errors.
    fn distinct(&self, key: &str, filter: &Document) -> Result<Vec<Bson>>;

    /// Number of matches after applying `skip` and `limit`.
    ///
    /// # Errors
    /// Backend errors.
    fn count(&self, filter: &Document, limit: Option<u64>, skip: Option<u64>) -> Result<u64>;

    /// # Errors
    /// `QueryExecution` when the backend has no aggregation support.
    fn aggregate(&self, stages: &[Document]) -> Result<Vec<Document>> {
        let _ = stages;
        Err(OdmError::QueryExecution(format!("collection `{}` does not support aggregation", self.name())))
    }
}

pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    /// `DatabaseUnavailable` when the collection cannot be opened.
    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>>;
}
