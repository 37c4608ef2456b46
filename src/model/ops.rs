//! Write operations on a single record.
//!
//! Every operation except `save` needs the record to carry an `_id`. Writes go out with the
//! model's write concern unless the caller passes options, and each one is logged to the
//! `docmap::audit` target.

use bson::{Bson, Document};
use chrono::Utc;
use std::collections::BTreeMap;

use super::core::Model;
use super::nested::{get_nested_key, remove_nested_key, set_nested_key, update_nested_keys};
use super::record::Record;
use crate::errors::{OdmError, Result};
use crate::query::{Fields, UpdateExpr, UpdateOp};
use crate::types::{ID_KEY, WriteOptions};

pub const CREATED_KEY: &str = "created";
pub const MODIFIED_KEY: &str = "modified";

/// Current UTC time at millisecond precision, the resolution documents store.
fn now() -> bson::DateTime {
    bson::DateTime::from_millis(Utc::now().timestamp_millis())
}

fn set_bucket(doc: Document) -> UpdateExpr {
    UpdateExpr::Atomic(BTreeMap::from([(UpdateOp::Set, doc)]))
}

impl Record {
    fn require_id(&self) -> Result<Bson> {
        self.id().cloned().ok_or_else(|| OdmError::MissingId(self.model.name().to_string()))
    }

    fn audit(&self, op: &str, id: &Bson) {
        log::info!(target: crate::logger::AUDIT_TARGET, "{op} {}/{} _id={id}", self.model.name(), self.model.collection().name());
    }

    /// Sends `update` for this record, returning the selector used.
    fn send(&self, update: &UpdateExpr, options: WriteOptions) -> Result<Document> {
        let id = self.require_id()?;
        let selector = Model::id_selector(&id);
        self.model.collection().update(&selector, &update.to_document(), options)?;
        self.audit("update", &id);
        Ok(selector)
    }

    /// Re-reads the literal `keys` from the stored document and merges them in.
    fn reload_keys<'a>(&mut self, selector: &Document, keys: impl IntoIterator<Item = &'a String>) -> Result<()> {
        let Some(fresh) = self.model.collection().find_one(selector)? else {
            return Ok(());
        };
        let mut partial = Document::new();
        for key in keys {
            if let Some(v) = get_nested_key(&fresh, key) {
                set_nested_key(&mut partial, key, v.clone());
            }
        }
        update_nested_keys(&mut self.doc, partial);
        Ok(())
    }

    fn reload_all(&mut self, selector: &Document) -> Result<()> {
        if let Some(fresh) = self.model.collection().find_one(selector)? {
            self.doc = fresh;
        }
        Ok(())
    }

    /// Saves with the model's write concern.
    ///
    /// # Errors
    /// See [`save_with`](Self::save_with).
    pub fn save(&mut self) -> Result<()> {
        self.save_with(None)
    }

    /// Inserts a new record, or `$set`s every field of a stored one.
    ///
    /// With `auto_timestamp`, `created` is added when the record is new or lacks one and
    /// `modified` is always refreshed. `options.upsert` creates the document if its `_id` is
    /// not stored.
    ///
    /// # Errors
    /// `MissingRequiredField`, `ConflictingUpdate`, or driver errors.
    pub fn save_with(&mut self, options: Option<WriteOptions>) -> Result<()> {
        let config = self.model.config();
        for attribute in &config.required_fields {
            if !self.contains(attribute) {
                return Err(OdmError::MissingRequiredField(attribute.clone()));
            }
        }
        let options = self.model.write_options(options);
        let mut stamps = Document::new();
        if config.auto_timestamp {
            let now = now();
            if self.id().is_none() || !self.doc.contains_key(CREATED_KEY) {
                stamps.insert(CREATED_KEY, now);
            }
            stamps.insert(MODIFIED_KEY, now);
        }
        let Some(id) = self.id().cloned() else {
            let mut doc = self.doc.clone();
            doc.remove(ID_KEY);
            for (k, v) in stamps {
                doc.insert(k, v);
            }
            let id = self.model.collection().insert(doc.clone(), options)?;
            doc.insert(ID_KEY, id.clone());
            self.doc = doc;
            self.audit("insert", &id);
            return Ok(());
        };
        let mut fields = self.doc.clone();
        fields.remove(ID_KEY);
        for k in stamps.keys() {
            fields.remove(k);
        }
        let update = set_bucket(fields).merge(set_bucket(stamps.clone()))?;
        if update.is_empty() {
            return Ok(());
        }
        let outcome =
            self.model.collection().update(&Model::id_selector(&id), &update.to_document(), options)?;
        for (k, v) in stamps {
            self.doc.insert(k, v);
        }
        if let Some(upserted) = outcome.upserted_id {
            self.doc.insert(ID_KEY, upserted);
        }
        self.audit("save", &id);
        Ok(())
    }

    /// `$set`s the given attributes and reloads them.
    ///
    /// `modified` is left alone.
    ///
    /// # Errors
    /// `MissingId`, `NoFields`, translation or driver errors.
    pub fn update(&mut self, fields: &Fields) -> Result<()> {
        self.require_id()?;
        let update = self.model.update_builder().set(fields).build()?;
        let selector = self.send(&update, self.model.write_options(None))?;
        let keys: Vec<String> = update.bucket(UpdateOp::Set).map(|d| d.keys().cloned().collect()).unwrap_or_default();
        self.reload_keys(&selector, &keys)
    }

    /// Atomically increments one attribute, by 1 when `by` is `None`.
    ///
    /// # Errors
    /// `MissingId`, `InvalidOperatorValue`, or driver errors.
    pub fn increment(&mut self, attribute: &str, by: Option<Bson>) -> Result<()> {
        self.require_id()?;
        let update = self.model.update_builder().increment_field(attribute, by).build()?;
        self.increment_expr(&update)
    }

    /// Atomically increments each attribute by its value.
    ///
    /// # Errors
    /// `MissingId`, `NoFields`, `InvalidOperatorValue`, or driver errors.
    pub fn increment_fields(&mut self, fields: &Fields) -> Result<()> {
        self.require_id()?;
        if fields.is_empty() {
            return Err(OdmError::NoFields);
        }
        let update = self.model.update_builder().increment(fields).build()?;
        self.increment_expr(&update)
    }

    fn increment_expr(&mut self, update: &UpdateExpr) -> Result<()> {
        let selector = self.send(update, self.model.write_options(None))?;
        let keys: Vec<String> = update.bucket(UpdateOp::Inc).map(|d| d.keys().cloned().collect()).unwrap_or_default();
        self.reload_keys(&selector, &keys)
    }

    /// Sends a literal update document and reloads the whole record.
    ///
    /// Nothing is mapped or validated. A document without operators replaces the stored one.
    ///
    /// # Errors
    /// `MissingId` when the record has no `_id` and `upsert` is off; driver errors.
    pub fn raw_update(&mut self, update: Document, options: Option<WriteOptions>) -> Result<()> {
        let options = self.model.write_options(options);
        let id = match self.id().cloned() {
            Some(id) => id,
            None if options.upsert => Bson::Null,
            None => return Err(OdmError::MissingId(self.model.name().to_string())),
        };
        let selector = Model::id_selector(&id);
        let outcome = self.model.collection().update(&selector, &UpdateExpr::raw(update).to_document(), options)?;
        let id = outcome.upserted_id.unwrap_or(id);
        self.audit("raw_update", &id);
        self.reload_all(&Model::id_selector(&id))
    }

    /// `$unset`s attributes in the database and drops them locally.
    ///
    /// # Errors
    /// `MissingId`, `NoFields`, or driver errors.
    pub fn remove_fields<S: AsRef<str>>(&mut self, attributes: &[S]) -> Result<()> {
        self.require_id()?;
        let update = self.model.update_builder().unset(attributes).build()?;
        self.send(&update, self.model.write_options(None))?;
        if let Some(bucket) = update.bucket(UpdateOp::Unset) {
            for key in bucket.keys() {
                remove_nested_key(&mut self.doc, key);
            }
        }
        Ok(())
    }

    /// `$set`s only the named attributes, with their current local values.
    ///
    /// # Errors
    /// `MissingId`, `MissingField` when an attribute is not on the record, or driver errors.
    pub fn save_fields<S: AsRef<str>>(&mut self, attributes: &[S]) -> Result<()> {
        self.require_id()?;
        let mut set = Document::new();
        for a in attributes {
            let key = self.key_for(a.as_ref())?;
            let value =
                get_nested_key(&self.doc, &key).ok_or_else(|| OdmError::MissingField(a.as_ref().to_string()))?;
            set.insert(key, value.clone());
        }
        if set.is_empty() {
            return Err(OdmError::NoFields);
        }
        self.send(&set_bucket(set), self.model.write_options(None))?;
        Ok(())
    }

    fn array_op(&mut self, update: Result<UpdateExpr>) -> Result<()> {
        self.require_id()?;
        let selector = self.send(&update?, self.model.write_options(None))?;
        self.reload_all(&selector)
    }

    /// # Errors
    /// `MissingId`, translation or driver errors.
    pub fn push(&mut self, attribute: &str, value: impl Into<Bson>) -> Result<()> {
        let update = self.model.update_builder().push(attribute, value).build();
        self.array_op(update)
    }

    /// # Errors
    /// `MissingId`, translation or driver errors.
    pub fn pull(&mut self, attribute: &str, value: impl Into<Bson>) -> Result<()> {
        let update = self.model.update_builder().pull(attribute, value).build();
        self.array_op(update)
    }

    /// # Errors
    /// `MissingId`, translation or driver errors.
    pub fn pop(&mut self, attribute: &str, from_front: bool) -> Result<()> {
        let update = self.model.update_builder().pop(attribute, from_front).build();
        self.array_op(update)
    }

    /// # Errors
    /// `MissingId`, translation or driver errors.
    pub fn add_to_set(&mut self, attribute: &str, value: impl Into<Bson>) -> Result<()> {
        let update = self.model.update_builder().add_to_set(attribute, value).build();
        self.array_op(update)
    }

    /// # Errors
    /// `MissingId`, translation or driver errors.
    pub fn rename(&mut self, attribute: &str, new_attribute: &str) -> Result<()> {
        let update = self.model.update_builder().rename(attribute, new_attribute).build();
        self.array_op(update)
    }

    /// Removes the stored document and clears the record.
    ///
    /// # Errors
    /// `MissingId`, or driver errors.
    pub fn delete(&mut self, options: Option<WriteOptions>) -> Result<()> {
        let id = self.require_id()?;
        self.model.collection().remove(&Model::id_selector(&id), self.model.write_options(options))?;
        self.audit("remove", &id);
        self.doc = Document::new();
        Ok(())
    }
}
