use bson::{Bson, Document};
use std::fmt;
use std::sync::Arc;

use super::meta::ModelConfig;
use super::nested::set_nested_key;
use super::record::Record;
use crate::aggregation::Pipeline;
use crate::connection;
use crate::driver::Collection;
use crate::errors::{OdmError, Result};
use crate::query::{FieldMap, FieldValue, Fields, Q, QueryBuilder, QuerySet, UpdateBuilder, coerce_object_id};
use crate::types::{ID_KEY, WriteOptions};

struct ModelInner {
    config: ModelConfig,
    map: Arc<FieldMap>,
    collection: Arc<dyn Collection>,
}

/// A configured model bound to its collection.
///
/// Cheap to clone; every clone shares one frozen [`FieldMap`].
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.config.name)
            .field("collection", &self.inner.collection.name())
            .finish_non_exhaustive()
    }
}

impl Model {
    #[must_use]
    pub fn new(config: ModelConfig, collection: Arc<dyn Collection>) -> Self {
        let map = Arc::new(config.effective_field_map());
        Self { inner: Arc::new(ModelInner { config, map, collection }) }
    }

    /// Binds `config` to its collection in the database registered under `config.database`.
    ///
    /// # Errors
    /// `ConnectionNotFound`, or the driver's error when opening the collection.
    pub fn connect(config: ModelConfig) -> Result<Self> {
        let db = connection::get(&config.database)?;
        let collection = db.collection(&config.collection_name())?;
        Ok(Self::new(config, collection))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn field_map(&self) -> &FieldMap {
        &self.inner.map
    }

    #[must_use]
    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.inner.collection
    }

    #[must_use]
    pub fn query_builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.inner.map)
    }

    #[must_use]
    pub fn update_builder(&self) -> UpdateBuilder<'_> {
        UpdateBuilder::new(&self.inner.map)
    }

    /// The caller's options, or the model's write concern.
    #[must_use]
    pub fn write_options(&self, options: Option<WriteOptions>) -> WriteOptions {
        options.unwrap_or_else(|| self.inner.config.write_options())
    }

    /// A lazy cursor over documents matching every `Q` and every keyword pair.
    ///
    /// The model's default sort applies.
    ///
    /// # Errors
    /// Translation errors; nothing is sent to the database here.
    pub fn find(&self, qs: &[Q], fields: &Fields) -> Result<QuerySet> {
        let query = self.query_builder().build_all(qs, fields)?;
        let cursor = QuerySet::new(Arc::clone(&self.inner.collection), Arc::clone(&self.inner.map), query);
        if self.inner.config.sort.is_empty() {
            Ok(cursor)
        } else {
            cursor.sort(self.inner.config.sort.as_slice())
        }
    }

    /// # Errors
    /// Translation errors for the default sort.
    pub fn all(&self) -> Result<QuerySet> {
        self.find(&[], &Fields::new())
    }

    /// Exactly one matching record.
    ///
    /// # Errors
    /// `NoDocumentFound`, `MultipleDocumentsFound`, translation or driver errors.
    pub fn get(&self, qs: &[Q], fields: &Fields) -> Result<Record> {
        let mut cursor = self.find(qs, fields)?;
        match cursor.count()? {
            0 => Err(OdmError::NoDocumentFound(format!("`{}` matching query does not exist", self.name()))),
            1 => {
                let doc = cursor.first()?.cloned().ok_or_else(|| {
                    OdmError::NoDocumentFound(format!("`{}` matching query does not exist", self.name()))
                })?;
                Ok(self.record(doc))
            }
            count => Err(OdmError::MultipleDocumentsFound { model: self.name().to_string(), count }),
        }
    }

    /// The single match, or a newly created record from `fields`.
    ///
    /// The flag is `true` when the record was created.
    ///
    /// # Errors
    /// `MultipleDocumentsFound`, translation or driver errors.
    pub fn get_or_create(&self, fields: &Fields, options: Option<WriteOptions>) -> Result<(Record, bool)> {
        match self.get(&[], fields) {
            Ok(r) => Ok((r, false)),
            Err(OdmError::NoDocumentFound(_)) => Ok((self.create(fields, options)?, true)),
            Err(e) => Err(e),
        }
    }

    /// Builds a record from `fields` and saves it.
    ///
    /// # Errors
    /// `MalformedKeyword`, `MissingRequiredField`, driver errors.
    pub fn create(&self, fields: &Fields, options: Option<WriteOptions>) -> Result<Record> {
        let mut record = self.new_record(fields)?;
        record.save_with(options)?;
        Ok(record)
    }

    /// An unsaved record whose attributes are resolved through the field map.
    ///
    /// # Errors
    /// `MalformedKeyword`, or `InvalidOperatorValue` for a geospatial value.
    pub fn new_record(&self, fields: &Fields) -> Result<Record> {
        let mut doc = Document::new();
        for (attribute, value) in fields.iter() {
            let FieldValue::Value(v) = value else {
                return Err(OdmError::invalid_value(attribute, "geospatial expressions are query-only"));
            };
            let key = self.inner.map.resolve_keyword(attribute)?;
            let v = if key == ID_KEY { coerce_object_id(v) } else { v.clone() };
            set_nested_key(&mut doc, &key, v);
        }
        Ok(self.record(doc))
    }

    /// Wraps a stored document.
    #[must_use]
    pub fn record(&self, doc: Document) -> Record {
        Record::new(self.clone(), doc)
    }

    /// Materializes `cursor` into records.
    ///
    /// # Errors
    /// Materialization errors.
    pub fn records(&self, cursor: QuerySet) -> Result<Vec<Record>> {
        Ok(cursor.into_vec()?.into_iter().map(|d| self.record(d)).collect())
    }

    /// Runs an aggregation pipeline against this model's collection.
    ///
    /// # Errors
    /// Driver errors.
    pub fn aggregate(&self, pipeline: &Pipeline) -> Result<Vec<Document>> {
        let stages = pipeline.stages();
        log::debug!(target: crate::logger::QUERY_TARGET, "aggregate on `{}`: {} stage(s)", self.inner.collection.name(), stages.len());
        self.inner.collection.aggregate(&stages)
    }

    /// A pipeline whose field names resolve through this model's map.
    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.inner.map))
    }

    pub(crate) fn id_selector(id: &Bson) -> Document {
        let mut d = Document::new();
        d.insert(ID_KEY, id.clone());
        d
    }
}
