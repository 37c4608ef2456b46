//! In-process collections evaluated with the document filter engine.
//!
//! Geospatial operators are rejected with `QueryExecution`; everything else the query and update
//! builders emit is evaluated locally.

mod eval;
mod filter;
mod pipeline;
mod update;

pub use eval::{compare_bson, eval_filter};
pub use filter::{CmpOp, Filter, parse_filter};
pub use update::apply_update;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

use super::{Collection, Database, DocumentStream, FindSpec};
use crate::errors::{OdmError, Result};
use crate::types::{DeleteOutcome, ID_KEY, UpdateOutcome, WriteOptions};

fn window<T>(items: Vec<T>, limit: Option<u64>, skip: Option<u64>) -> Vec<T> {
    let skip = skip.and_then(|s| usize::try_from(s).ok()).unwrap_or(0);
    let limit = limit.filter(|l| *l > 0).and_then(|l| usize::try_from(l).ok()).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(limit).collect()
}

/// A collection held in memory, in insertion order.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    name: String,
    docs: RwLock<Vec<Document>>,
    failure: Mutex<Option<OdmError>>,
}

impl MemoryCollection {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Makes the next operation on this collection fail with `err`.
    pub fn fail_next(&self, err: OdmError) {
        *self.failure.lock() = Some(err);
    }

    fn check_failure(&self) -> Result<()> {
        self.failure.lock().take().map_or(Ok(()), Err)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Snapshot of every stored document.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.docs.read().clone()
    }

    fn matching(&self, filter: &Document) -> Result<Vec<Document>> {
        let f = parse_filter(filter)?;
        Ok(self.docs.read().iter().filter(|d| eval_filter(d, &f)).cloned().collect())
    }
}

/// Equality fields of a selector, used to seed an upserted document.
fn upsert_seed(selector: &Document) -> Document {
    selector
        .iter()
        .filter(|(k, v)| {
            !k.starts_with('$') && !matches!(v, Bson::Document(d) if d.keys().any(|x| x.starts_with('$')))
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, spec: &FindSpec) -> Result<DocumentStream<'_>> {
        self.check_failure()?;
        let mut docs = self.matching(&spec.filter)?;
        if !spec.sort.is_empty() {
            docs.sort_by(|a, b| eval::compare_docs(a, b, &spec.sort));
        }
        let docs = window(docs, spec.limit, spec.skip);
        Ok(Box::new(docs.into_iter().map(Ok)))
    }

    fn insert(&self, mut doc: Document, options: WriteOptions) -> Result<Bson> {
        self.check_failure()?;
        let id = match doc.get(ID_KEY) {
            Some(id) => id.clone(),
            None => {
                let id = Bson::ObjectId(ObjectId::new());
                doc.insert(ID_KEY, id.clone());
                id
            }
        };
        let mut docs = self.docs.write();
        if docs.iter().any(|d| d.get(ID_KEY) == Some(&id)) {
            return Err(OdmError::QueryExecution(format!("duplicate key {id} in `{}`", self.name)));
        }
        docs.push(doc);
        log::debug!("insert into `{}` (w={})", self.name, options.write_concern.0);
        Ok(id)
    }

    fn update(&self, selector: &Document, update: &Document, options: WriteOptions) -> Result<UpdateOutcome> {
        self.check_failure()?;
        let f = parse_filter(selector)?;
        let mut docs = self.docs.write();
        if let Some(doc) = docs.iter_mut().find(|d| eval_filter(d, &f)) {
            let mut next = doc.clone();
            let changed = apply_update(&mut next, update)?;
            *doc = next;
            return Ok(UpdateOutcome { matched: 1, modified: u64::from(changed), upserted_id: None });
        }
        if !options.upsert {
            return Ok(UpdateOutcome::default());
        }
        let mut doc = upsert_seed(selector);
        apply_update(&mut doc, update)?;
        let id = match doc.get(ID_KEY) {
            Some(id) if !matches!(id, Bson::Null) => id.clone(),
            _ => Bson::ObjectId(ObjectId::new()),
        };
        doc.insert(ID_KEY, id.clone());
        docs.push(doc);
        Ok(UpdateOutcome { matched: 0, modified: 0, upserted_id: Some(id) })
    }

    fn remove(&self, selector: &Document, _options: WriteOptions) -> Result<DeleteOutcome> {
        self.check_failure()?;
        let f = parse_filter(selector)?;
        let mut docs = self.docs.write();
        let before = docs.len();
        docs.retain(|d| !eval_filter(d, &f));
        Ok(DeleteOutcome { deleted: (before - docs.len()) as u64 })
    }

    fn distinct(&self, key: &str, filter: &Document) -> Result<Vec<Bson>> {
        self.check_failure()?;
        let mut out: Vec<Bson> = Vec::new();
        for doc in self.matching(filter)? {
            for v in eval::collect_path(&doc, key) {
                let values = match v {
                    Bson::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                for v in values {
                    if !out.contains(&v) {
                        out.push(v);
                    }
                }
            }
        }
        Ok(out)
    }

    fn count(&self, filter: &Document, limit: Option<u64>, skip: Option<u64>) -> Result<u64> {
        self.check_failure()?;
        Ok(window(self.matching(filter)?, limit, skip).len() as u64)
    }

    fn aggregate(&self, stages: &[Document]) -> Result<Vec<Document>> {
        self.check_failure()?;
        pipeline::run(self.documents(), stages)
    }
}

/// A named set of [`MemoryCollection`]s, created on first access.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), collections: RwLock::new(HashMap::new()) }
    }

    /// The concrete collection, for test hooks such as [`MemoryCollection::fail_next`].
    pub fn memory_collection(&self, name: &str) -> Arc<MemoryCollection> {
        if let Some(c) = self.collections.read().get(name) {
            return Arc::clone(c);
        }
        let mut map = self.collections.write();
        Arc::clone(map.entry(name.to_string()).or_insert_with(|| Arc::new(MemoryCollection::new(name))))
    }

    #[must_use]
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Result<Arc<dyn Collection>> {
        Ok(self.memory_collection(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, SortKey};
    use bson::doc;

    fn seeded() -> MemoryCollection {
        let c = MemoryCollection::new("people");
        for (i, name) in ["ann", "bob", "cid", "dee"].into_iter().enumerate() {
            c.insert(doc! { "_id": i as i32, "name": name, "age": 20 + i as i32 }, WriteOptions::default()).unwrap();
        }
        c
    }

    #[test]
    fn find_sorts_and_windows() {
        let c = seeded();
        let mut spec = FindSpec::new(doc! { "age": { "$gte": 21 } });
        spec.sort = vec![SortKey::new("age", Direction::Descending)];
        spec.limit = Some(2);
        spec.skip = Some(1);
        let names: Vec<String> =
            c.find(&spec).unwrap().map(|d| d.unwrap().get_str("name").unwrap().to_string()).collect();
        assert_eq!(names, ["cid", "bob"]);
        assert_eq!(c.count(&spec.filter, spec.limit, spec.skip).unwrap(), 2);
    }

    #[test]
    fn upsert_seeds_from_selector() {
        let c = MemoryCollection::new("u");
        let out = c.update(&doc! { "_id": 9 }, &doc! { "$set": { "a": 1 } }, WriteOptions::default().upsert(true)).unwrap();
        assert_eq!(out.upserted_id, Some(Bson::Int32(9)));
        assert_eq!(c.documents(), vec![doc! { "_id": 9, "a": 1 }]);
    }

    #[test]
    fn injected_failure_fires_once() {
        let c = seeded();
        c.fail_next(OdmError::DatabaseUnavailable("down".into()));
        assert!(matches!(c.count(&doc! {}, None, None), Err(OdmError::DatabaseUnavailable(_))));
        assert_eq!(c.count(&doc! {}, None, None).unwrap(), 4);
    }
}
