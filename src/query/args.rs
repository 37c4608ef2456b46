use bson::{Bson, Document};

use super::geo::GeoExpr;
use crate::errors::Result;

/// A single keyword value: a plain BSON value or a pre-built geospatial expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Bson),
    Geo(GeoExpr),
}

impl From<GeoExpr> for FieldValue {
    fn from(g: GeoExpr) -> Self {
        Self::Geo(g)
    }
}

/// Ordered keyword arguments (`name__op` → value) handed to the query and update builders.
///
/// ```
/// use docmap::query::Fields;
/// let f = Fields::new().with("name__in", vec!["A", "B"]).with("score__gt", 10);
/// assert_eq!(f.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    pairs: Vec<(String, FieldValue)>,
}

impl Fields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.push(key, value);
        self
    }

    #[must_use]
    pub fn with_geo(mut self, key: impl Into<String>, geo: GeoExpr) -> Self {
        self.pairs.push((key.into(), FieldValue::Geo(geo)));
        self
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        self.pairs.push((key.into(), FieldValue::Value(value.into())));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(k, _)| k.as_str())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.pairs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Appends every pair of `other`.
    pub fn extend(&mut self, other: Self) {
        self.pairs.extend(other.pairs);
    }
}

impl From<Document> for Fields {
    fn from(doc: Document) -> Self {
        Self { pairs: doc.into_iter().map(|(k, v)| (k, FieldValue::Value(v))).collect() }
    }
}

impl<K: Into<String>, V: Into<Bson>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { pairs: iter.into_iter().map(|(k, v)| (k.into(), FieldValue::Value(v.into()))).collect() }
    }
}

impl Fields {
    /// Parses a JSON object into keyword pairs.
    ///
    /// # Errors
    /// `Json` for malformed input or a non-object, `Bson` for values BSON cannot hold.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let serde_json::Value::Object(map) = value else {
            return Err(<serde_json::Error as serde::de::Error>::custom("expected a JSON object").into());
        };
        Ok(Self::from(Document::try_from(map)?))
    }
}

impl IntoIterator for Fields {
    type Item = (String, FieldValue);
    type IntoIter = std::vec::IntoIter<(String, FieldValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::OdmError;

    #[test]
    fn json_objects_become_fields() {
        let f = Fields::from_json(r#"{"a": "x", "b__gt": 1, "c": [1, 2.5]}"#).unwrap();
        assert_eq!(f.len(), 3);
        assert_eq!(f.get("b__gt"), Some(&FieldValue::Value(Bson::Int32(1))));
        assert_eq!(f.get("c"), Some(&FieldValue::Value(bson::bson!([1, 2.5]))));
        assert_eq!(f.get("a"), Some(&FieldValue::Value(Bson::from("x"))));
    }

    #[test]
    fn json_non_objects_are_rejected() {
        assert!(matches!(Fields::from_json("[1, 2]"), Err(OdmError::Json(_))));
        assert!(matches!(Fields::from_json("{oops"), Err(OdmError::Json(_))));
    }
}
