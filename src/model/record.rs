use bson::{Bson, Document};

use super::core::Model;
use super::nested::{get_nested_key, remove_nested_key, set_nested_key};
use crate::errors::Result;
use crate::types::ID_KEY;

/// One document of a model, accessed by attribute name.
///
/// Attribute names (`name`, `location__x`, `id`) resolve through the model's field map; the
/// record itself stores literal keys only.
#[derive(Debug, Clone)]
pub struct Record {
    pub(super) model: Model,
    pub(super) doc: Document,
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.model.name() == other.model.name() && self.doc == other.doc
    }
}

impl Record {
    pub(crate) const fn new(model: Model, doc: Document) -> Self {
        Self { model, doc }
    }

    #[must_use]
    pub const fn model(&self) -> &Model {
        &self.model
    }

    #[must_use]
    pub const fn document(&self) -> &Document {
        &self.doc
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.doc
    }

    #[must_use]
    pub fn id(&self) -> Option<&Bson> {
        self.doc.get(ID_KEY).filter(|v| !matches!(v, Bson::Null))
    }

    /// # Errors
    /// `MalformedKeyword` for an empty attribute name.
    pub fn key_for(&self, attribute: &str) -> Result<String> {
        self.model.field_map().resolve_keyword(attribute)
    }

    /// Value of an attribute, or `None` when absent or malformed.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&Bson> {
        let key = self.key_for(attribute).ok()?;
        get_nested_key(&self.doc, &key)
    }

    /// Value at a literal dotted key, bypassing the field map.
    #[must_use]
    pub fn get_path(&self, key: &str) -> Option<&Bson> {
        get_nested_key(&self.doc, key)
    }

    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.get(attribute).is_some()
    }

    /// Sets an attribute locally; nothing is written until a save.
    ///
    /// # Errors
    /// `MalformedKeyword`.
    pub fn set(&mut self, attribute: &str, value: impl Into<Bson>) -> Result<()> {
        let key = self.key_for(attribute)?;
        set_nested_key(&mut self.doc, &key, value.into());
        Ok(())
    }

    /// Removes an attribute locally.
    ///
    /// # Errors
    /// `MalformedKeyword`.
    pub fn remove(&mut self, attribute: &str) -> Result<Option<Bson>> {
        let key = self.key_for(attribute)?;
        Ok(remove_nested_key(&mut self.doc, &key))
    }
}
