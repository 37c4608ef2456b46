#![allow(dead_code)]

use bson::{Bson, Document};
use docmap::driver::{Collection, DocumentStream, FindSpec};
use docmap::types::{DeleteOutcome, UpdateOutcome, WriteOptions};
use docmap::{MemoryCollection, Model, ModelConfig, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Wraps a [`MemoryCollection`] and records every call that reaches it.
#[derive(Debug)]
pub struct Counting {
    pub inner: Arc<MemoryCollection>,
    pub finds: AtomicUsize,
    pub counts: AtomicUsize,
    pub writes: AtomicUsize,
    pub last_find: Mutex<Option<FindSpec>>,
    pub last_update: Mutex<Option<(Document, Document, WriteOptions)>>,
}

impl Counting {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemoryCollection::new(name)),
            finds: AtomicUsize::new(0),
            counts: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            last_find: Mutex::new(None),
            last_update: Mutex::new(None),
        })
    }

    pub fn finds(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.counts.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seed(&self, docs: impl IntoIterator<Item = Document>) {
        for d in docs {
            self.inner.insert(d, WriteOptions::default()).unwrap();
        }
    }
}

impl Collection for Counting {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn find(&self, spec: &FindSpec) -> Result<DocumentStream<'_>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        *self.last_find.lock() = Some(spec.clone());
        self.inner.find(spec)
    }

    fn insert(&self, doc: Document, options: WriteOptions) -> Result<Bson> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(doc, options)
    }

    fn update(&self, selector: &Document, update: &Document, options: WriteOptions) -> Result<UpdateOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last_update.lock() = Some((selector.clone(), update.clone(), options));
        self.inner.update(selector, update, options)
    }

    fn remove(&self, selector: &Document, options: WriteOptions) -> Result<DeleteOutcome> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.remove(selector, options)
    }

    fn distinct(&self, key: &str, filter: &Document) -> Result<Vec<Bson>> {
        self.inner.distinct(key, filter)
    }

    fn count(&self, filter: &Document, limit: Option<u64>, skip: Option<u64>) -> Result<u64> {
        self.counts.fetch_add(1, Ordering::SeqCst);
        self.inner.count(filter, limit, skip)
    }

    fn aggregate(&self, stages: &[Document]) -> Result<Vec<Document>> {
        self.inner.aggregate(stages)
    }
}

/// A model over a fresh counting collection.
pub fn model(config: ModelConfig) -> (Model, Arc<Counting>) {
    let col = Counting::new(&config.collection_name());
    let model = Model::new(config, col.clone());
    (model, col)
}
