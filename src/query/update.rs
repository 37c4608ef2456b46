//! Update Expression Builder.
//!
//! Attribute names go through the model's [`FieldMap`] and land in one bucket per update
//! operator. A literal key may appear only once across the whole expression: the same key (or a
//! key and one of its own sub-paths) in two places is a [`OdmError::ConflictingUpdate`].

use bson::{Bson, Document};
use std::collections::BTreeMap;

use super::args::{FieldValue, Fields};
use super::builder::coerce_object_id;
use super::field_map::FieldMap;
use super::operators::is_number;
use crate::errors::{OdmError, Result};
use crate::types::ID_KEY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateOp {
    Set,
    Unset,
    Inc,
    Push,
    Pull,
    Pop,
    Rename,
    AddToSet,
}

impl UpdateOp {
    pub const ALL: [Self; 8] =
        [Self::Set, Self::Unset, Self::Inc, Self::Push, Self::Pull, Self::Pop, Self::Rename, Self::AddToSet];

    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::Set => "$set",
            Self::Unset => "$unset",
            Self::Inc => "$inc",
            Self::Push => "$push",
            Self::Pull => "$pull",
            Self::Pop => "$pop",
            Self::Rename => "$rename",
            Self::AddToSet => "$addToSet",
        }
    }

    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.token() == token)
    }
}

/// A native update document.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateExpr {
    /// Operator buckets, each mapping literal key → value.
    Atomic(BTreeMap<UpdateOp, Document>),
    /// A caller-supplied document sent as-is. No mapping, no validation.
    Raw(Document),
}

impl UpdateExpr {
    /// Wraps a literal update document.
    ///
    /// The caller supplies literal keys; nothing is resolved or checked.
    #[must_use]
    pub const fn raw(doc: Document) -> Self {
        Self::Raw(doc)
    }

    #[must_use]
    pub fn to_document(&self) -> Document {
        match self {
            Self::Raw(d) => d.clone(),
            Self::Atomic(buckets) => buckets
                .iter()
                .filter(|(_, d)| !d.is_empty())
                .map(|(op, d)| (op.token().to_string(), Bson::Document(d.clone())))
                .collect(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Raw(d) => d.is_empty(),
            Self::Atomic(buckets) => buckets.values().all(Document::is_empty),
        }
    }

    /// The bucket for `op`, if any key was placed there.
    #[must_use]
    pub fn bucket(&self, op: UpdateOp) -> Option<&Document> {
        match self {
            Self::Atomic(buckets) => buckets.get(&op).filter(|d| !d.is_empty()),
            Self::Raw(_) => None,
        }
    }

    /// Combines two atomic expressions into one.
    ///
    /// # Errors
    /// `ConflictingUpdate` when a literal key collides with one already present, or when either
    /// side is a raw update.
    pub fn merge(self, other: Self) -> Result<Self> {
        let (Self::Atomic(mut buckets), Self::Atomic(incoming)) = (self, other) else {
            return Err(OdmError::ConflictingUpdate("a raw update cannot be combined".into()));
        };
        for (op, doc) in incoming {
            for (key, value) in doc {
                insert_checked(&mut buckets, op, key, value)?;
            }
        }
        Ok(Self::Atomic(buckets))
    }
}

impl From<UpdateExpr> for Document {
    fn from(u: UpdateExpr) -> Self {
        match u {
            UpdateExpr::Raw(d) => d,
            atomic => atomic.to_document(),
        }
    }
}

fn overlaps(a: &str, b: &str) -> bool {
    a == b
        || a.strip_prefix(b).is_some_and(|rest| rest.starts_with('.'))
        || b.strip_prefix(a).is_some_and(|rest| rest.starts_with('.'))
}

fn insert_checked(buckets: &mut BTreeMap<UpdateOp, Document>, op: UpdateOp, key: String, value: Bson) -> Result<()> {
    let mut targets = vec![key.as_str()];
    if op == UpdateOp::Rename
        && let Bson::String(to) = &value
    {
        targets.push(to.as_str());
    }
    for (existing_op, doc) in buckets.iter() {
        for (existing, v) in doc {
            let mut held = vec![existing.as_str()];
            if *existing_op == UpdateOp::Rename
                && let Bson::String(to) = v
            {
                held.push(to.as_str());
            }
            if let Some(hit) = targets.iter().find(|t| held.iter().any(|h| overlaps(t, h))) {
                return Err(OdmError::ConflictingUpdate(format!(
                    "`{hit}` in {} collides with `{existing}` in {}",
                    op.token(),
                    existing_op.token()
                )));
            }
        }
    }
    buckets.entry(op).or_default().insert(key, value);
    Ok(())
}

/// Accumulates update operations for one logical write.
///
/// Methods chain by value; the first error is kept and reported by [`build`](Self::build).
///
/// ```
/// use docmap::query::{FieldMap, Fields, UpdateBuilder};
/// let map = FieldMap::with_id();
/// let update = UpdateBuilder::new(&map)
///     .set(&Fields::new().with("name", "Ada"))
///     .increment_field("logins", None)
///     .build()
///     .unwrap();
/// assert!(update.to_document().contains_key("$inc"));
/// ```
#[derive(Debug)]
pub struct UpdateBuilder<'a> {
    map: &'a FieldMap,
    buckets: BTreeMap<UpdateOp, Document>,
    error: Option<OdmError>,
}

impl<'a> UpdateBuilder<'a> {
    #[must_use]
    pub const fn new(map: &'a FieldMap) -> Self {
        Self { map, buckets: BTreeMap::new(), error: None }
    }

    fn place(mut self, op: UpdateOp, attribute: &str, value: Bson) -> Self {
        if self.error.is_some() {
            return self;
        }
        let key = match self.map.resolve_keyword(attribute) {
            Ok(k) => k,
            Err(e) => {
                self.error = Some(e);
                return self;
            }
        };
        let value = if key == ID_KEY { coerce_object_id(&value) } else { value };
        if let Err(e) = insert_checked(&mut self.buckets, op, key, value) {
            self.error = Some(e);
        }
        self
    }

    fn fail(mut self, e: OdmError) -> Self {
        if self.error.is_none() {
            self.error = Some(e);
        }
        self
    }

    fn place_fields(mut self, op: UpdateOp, fields: &Fields, check: impl Fn(&Bson) -> Result<()>) -> Self {
        for (attribute, value) in fields.iter() {
            let FieldValue::Value(v) = value else {
                return self.fail(OdmError::invalid_value(op.token(), "geospatial expressions are query-only"));
            };
            if let Err(e) = check(v) {
                return self.fail(e);
            }
            self = self.place(op, attribute, v.clone());
        }
        self
    }

    /// `$set` every pair.
    #[must_use]
    pub fn set(self, fields: &Fields) -> Self {
        self.place_fields(UpdateOp::Set, fields, |_| Ok(()))
    }

    #[must_use]
    pub fn set_value(self, attribute: &str, value: impl Into<Bson>) -> Self {
        self.place(UpdateOp::Set, attribute, value.into())
    }

    /// `$inc` every pair by its value; the server treats an absent field as zero.
    #[must_use]
    pub fn increment(self, fields: &Fields) -> Self {
        self.place_fields(UpdateOp::Inc, fields, |v| {
            if is_number(v) { Ok(()) } else { Err(OdmError::invalid_value("$inc", "expected a number")) }
        })
    }

    /// `$inc` one attribute, by 1 when `by` is `None`.
    #[must_use]
    pub fn increment_field(self, attribute: &str, by: Option<Bson>) -> Self {
        let by = by.unwrap_or(Bson::Int32(1));
        if !is_number(&by) {
            return self.fail(OdmError::invalid_value("$inc", "expected a number"));
        }
        self.place(UpdateOp::Inc, attribute, by)
    }

    #[must_use]
    pub fn unset<S: AsRef<str>>(mut self, attributes: &[S]) -> Self {
        for a in attributes {
            self = self.place(UpdateOp::Unset, a.as_ref(), Bson::Int32(1));
        }
        self
    }

    #[must_use]
    pub fn push(self, attribute: &str, value: impl Into<Bson>) -> Self {
        self.place(UpdateOp::Push, attribute, value.into())
    }

    /// Pushes each of `values` (`{$push: {key: {$each: [...]}}}`).
    #[must_use]
    pub fn push_all(self, attribute: &str, values: Vec<Bson>) -> Self {
        let mut each = Document::new();
        each.insert("$each", values);
        self.place(UpdateOp::Push, attribute, Bson::Document(each))
    }

    #[must_use]
    pub fn pull(self, attribute: &str, value: impl Into<Bson>) -> Self {
        self.place(UpdateOp::Pull, attribute, value.into())
    }

    /// Removes the last element, or the first when `from_front` is set.
    #[must_use]
    pub fn pop(self, attribute: &str, from_front: bool) -> Self {
        self.place(UpdateOp::Pop, attribute, Bson::Int32(if from_front { -1 } else { 1 }))
    }

    #[must_use]
    pub fn rename(self, attribute: &str, new_attribute: &str) -> Self {
        match self.map.resolve_keyword(new_attribute) {
            Ok(to) => self.place(UpdateOp::Rename, attribute, Bson::String(to)),
            Err(e) => self.fail(e),
        }
    }

    #[must_use]
    pub fn add_to_set(self, attribute: &str, value: impl Into<Bson>) -> Self {
        self.place(UpdateOp::AddToSet, attribute, value.into())
    }

    /// # Errors
    /// The first error recorded while building, or `NoFields` when nothing was added.
    pub fn build(self) -> Result<UpdateExpr> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let expr = UpdateExpr::Atomic(self.buckets);
        if expr.is_empty() {
            return Err(OdmError::NoFields);
        }
        log::debug!(target: crate::logger::QUERY_TARGET, "translated update: {}", expr.to_document());
        Ok(expr)
    }
}
