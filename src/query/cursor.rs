use bson::{Bson, Document};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use super::builder::Query;
use super::field_map::FieldMap;
use crate::driver::{Collection, FindSpec};
use crate::errors::{OdmError, Result};
use crate::types::SortKey;

#[derive(Debug)]
enum CursorState {
    Unmaterialized,
    Materialized(Vec<Document>),
    Failed,
}

/// A lazy, chainable result cursor.
///
/// Nothing reaches the collection until the cursor is observed through [`materialize`],
/// [`get`], [`slice`], [`iter`] or [`count`]. The fetched documents are cached, so later
/// access issues no further driver calls. `sort`, `limit` and `skip` never touch the cache:
/// they return a fresh, unmaterialized cursor over the same query.
///
/// Indexing and slicing load the whole result set; there is no partial fetch.
///
/// A driver failure during materialization is returned once and leaves the cursor unusable
/// ([`OdmError::CursorFailed`] afterwards).
///
/// [`materialize`]: Self::materialize
/// [`get`]: Self::get
/// [`slice`]: Self::slice
/// [`iter`]: Self::iter
/// [`count`]: Self::count
pub struct QuerySet {
    collection: Arc<dyn Collection>,
    map: Arc<FieldMap>,
    query: Query,
    sort: Vec<SortKey>,
    limit: Option<u64>,
    skip: Option<u64>,
    state: CursorState,
    count: Option<u64>,
}

impl fmt::Debug for QuerySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("collection", &self.collection.name())
            .field("query", &self.query)
            .field("sort", &self.sort)
            .field("limit", &self.limit)
            .field("skip", &self.skip)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl QuerySet {
    #[must_use]
    pub fn new(collection: Arc<dyn Collection>, map: Arc<FieldMap>, query: Query) -> Self {
        Self {
            collection,
            map,
            query,
            sort: Vec::new(),
            limit: None,
            skip: None,
            state: CursorState::Unmaterialized,
            count: None,
        }
    }

    fn derive(&self) -> Self {
        Self {
            collection: Arc::clone(&self.collection),
            map: Arc::clone(&self.map),
            query: self.query.clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
            state: CursorState::Unmaterialized,
            count: None,
        }
    }

    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    #[must_use]
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    #[must_use]
    pub const fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub const fn skip_value(&self) -> Option<u64> {
        self.skip
    }

    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        matches!(self.state, CursorState::Materialized(_))
    }

    /// What would be sent to the driver on materialization.
    #[must_use]
    pub fn find_spec(&self) -> FindSpec {
        FindSpec {
            filter: self.query.as_document().clone(),
            sort: self.sort.clone(),
            limit: self.limit,
            skip: self.skip,
        }
    }

    /// Orders by `fields`; a leading `-` sorts that field descending.
    ///
    /// Replaces any previous ordering.
    ///
    /// # Errors
    /// `MalformedKeyword` for an empty field name.
    pub fn sort<S: AsRef<str>>(&self, fields: &[S]) -> Result<Self> {
        let mut keys = Vec::with_capacity(fields.len());
        for f in fields {
            let (name, direction) = SortKey::parse_marker(f.as_ref());
            keys.push(SortKey::new(self.map.resolve_keyword(name)?, direction));
        }
        let mut next = self.derive();
        next.sort = keys;
        Ok(next)
    }

    /// Limits the number of documents returned; `0` removes the limit.
    #[must_use]
    pub fn limit(&self, n: u64) -> Self {
        let mut next = self.derive();
        next.limit = (n > 0).then_some(n);
        next
    }

    #[must_use]
    pub fn skip(&self, n: u64) -> Self {
        let mut next = self.derive();
        next.skip = (n > 0).then_some(n);
        next
    }

    /// Fetches and caches the result set, if not already done.
    ///
    /// # Errors
    /// The driver error on a failed fetch; `CursorFailed` on every call after that.
    pub fn materialize(&mut self) -> Result<&[Document]> {
        if matches!(self.state, CursorState::Unmaterialized) {
            match self.fetch() {
                Ok(docs) => {
                    self.count = Some(docs.len() as u64);
                    self.state = CursorState::Materialized(docs);
                }
                Err(e) => return Err(self.fail("materialize", e)),
            }
        }
        match &self.state {
            CursorState::Materialized(docs) => Ok(docs.as_slice()),
            _ => Err(OdmError::CursorFailed),
        }
    }

    fn fail(&mut self, during: &str, e: OdmError) -> OdmError {
        log::warn!(
            target: crate::logger::QUERY_TARGET,
            "cursor on `{}` failed to {during}: {e}",
            self.collection.name()
        );
        self.state = CursorState::Failed;
        e
    }

    fn fetch(&self) -> Result<Vec<Document>> {
        let spec = self.find_spec();
        log::debug!(
            target: crate::logger::QUERY_TARGET,
            "find on `{}`: filter={} sort={:?} limit={:?} skip={:?}",
            self.collection.name(),
            spec.filter,
            spec.sort,
            spec.limit,
            spec.skip
        );
        self.collection.find(&spec)?.collect()
    }

    /// Number of documents this cursor yields, honouring limit and skip.
    ///
    /// Uses the cache when materialized; otherwise asks the driver for a count, which is then
    /// remembered without fetching any documents.
    ///
    /// A failed count leaves the cursor unusable, the same as a failed fetch.
    ///
    /// # Errors
    /// Driver errors from the count, or `CursorFailed`.
    pub fn count(&mut self) -> Result<u64> {
        match &self.state {
            CursorState::Materialized(docs) => return Ok(docs.len() as u64),
            CursorState::Failed => return Err(OdmError::CursorFailed),
            CursorState::Unmaterialized => {}
        }
        if let Some(n) = self.count {
            return Ok(n);
        }
        let counted = self.collection.count(self.query.as_document(), self.limit, self.skip);
        match counted {
            Ok(n) => {
                self.count = Some(n);
                Ok(n)
            }
            Err(e) => Err(self.fail("count", e)),
        }
    }

    /// The document at `index`, or `None` past the end.
    ///
    /// # Errors
    /// Materialization errors.
    pub fn get(&mut self, index: usize) -> Result<Option<&Document>> {
        Ok(self.materialize()?.get(index))
    }

    /// # Errors
    /// Materialization errors.
    pub fn first(&mut self) -> Result<Option<&Document>> {
        self.get(0)
    }

    /// Documents in `range`, clamped to the result set.
    ///
    /// # Errors
    /// Materialization errors.
    pub fn slice(&mut self, range: Range<usize>) -> Result<&[Document]> {
        let docs = self.materialize()?;
        let end = range.end.min(docs.len());
        let start = range.start.min(end);
        Ok(&docs[start..end])
    }

    /// # Errors
    /// Materialization errors.
    pub fn iter(&mut self) -> Result<std::slice::Iter<'_, Document>> {
        Ok(self.materialize()?.iter())
    }

    /// Consumes the cursor, returning the cached documents.
    ///
    /// # Errors
    /// Materialization errors.
    pub fn into_vec(mut self) -> Result<Vec<Document>> {
        self.materialize()?;
        match std::mem::replace(&mut self.state, CursorState::Failed) {
            CursorState::Materialized(docs) => Ok(docs),
            _ => Err(OdmError::CursorFailed),
        }
    }

    /// Distinct values of `field` over this cursor's query.
    ///
    /// Sort, limit and skip do not apply.
    ///
    /// # Errors
    /// `MalformedKeyword`, or driver errors.
    pub fn distinct(&self, field: &str) -> Result<Vec<Bson>> {
        let key = self.map.resolve_keyword(field)?;
        self.collection.distinct(&key, self.query.as_document())
    }
}
