use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{OdmError, Result};
use crate::types::ID_KEY;

/// Keyword separator between path elements and the trailing operator token.
pub const SEPARATOR: &str = "__";

/// Logical attribute name → literal document key path.
///
/// Keys may themselves be dotted (`"d.e" → "f.e"`); an attribute written as `d__e` is stored
/// as `d.e`. Built once per model and shared read-only through an `Arc` afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, String>", into = "HashMap<String, String>")]
pub struct FieldMap {
    entries: HashMap<String, String>,
}

impl FieldMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A map holding only `id → _id`.
    #[must_use]
    pub fn with_id() -> Self {
        let mut m = Self::new();
        m.insert("id", ID_KEY);
        m
    }

    /// Adds a mapping; a repeated attribute replaces the previous entry.
    pub fn insert(&mut self, attribute: impl Into<String>, key: impl Into<String>) {
        let attribute = normalize(attribute.into());
        let key = key.into();
        if let Some(prev) = self.entries.get(&attribute)
            && *prev != key
        {
            log::debug!("field map entry `{attribute}` remapped from `{prev}` to `{key}`");
        }
        self.entries.insert(attribute, key);
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.entries.get(attribute).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.entries.contains_key(attribute)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolves a dotted attribute path to its literal key path.
    ///
    /// The longest leading run of path elements that has an entry is replaced; the remaining
    /// elements are appended unchanged. Unmapped paths pass through as-is.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if let Some(key) = self.entries.get(path) {
            return key.clone();
        }
        let parts: Vec<&str> = path.split('.').collect();
        for end in (1..parts.len()).rev() {
            let head = parts[..end].join(".");
            if let Some(key) = self.entries.get(&head) {
                let mut out = key.clone();
                for p in &parts[end..] {
                    out.push('.');
                    out.push_str(p);
                }
                return out;
            }
        }
        path.to_string()
    }

    /// Resolves already-split keyword segments (`["a", "b"]` for `a__b` or `a.b`).
    #[must_use]
    pub fn resolve_segments<S: AsRef<str>>(&self, segments: &[S]) -> String {
        let dotted = segments.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".");
        self.resolve(&dotted)
    }

    /// Resolves an attribute written either with dots or with `__` separators.
    ///
    /// # Errors
    /// `MalformedKeyword` for empty names or empty path elements.
    pub fn resolve_keyword(&self, keyword: &str) -> Result<String> {
        let segments = split_keyword(keyword)?;
        Ok(self.resolve_segments(&segments))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::new();
        for (k, v) in iter {
            m.insert(k, v);
        }
        m
    }
}

impl From<HashMap<String, String>> for FieldMap {
    fn from(entries: HashMap<String, String>) -> Self {
        entries.into_iter().collect()
    }
}

impl From<FieldMap> for HashMap<String, String> {
    fn from(map: FieldMap) -> Self {
        map.entries
    }
}

/// `a__b` → `a.b`. Names that do not split cleanly are kept verbatim.
fn normalize(attribute: String) -> String {
    match split_keyword(&attribute) {
        Ok(parts) if parts.len() > 1 => parts.join("."),
        _ => attribute,
    }
}

/// Splits a keyword into path elements on `__` and `.`.
///
/// A leading or trailing `__` belongs to the adjacent name (`__a`, `a__`), so it is never
/// treated as a separator.
///
/// # Errors
/// `MalformedKeyword` when the keyword or any element is empty.
pub fn split_keyword(keyword: &str) -> Result<Vec<String>> {
    let malformed = || OdmError::MalformedKeyword(keyword.to_string());
    let lead = keyword.starts_with(SEPARATOR);
    let body = if lead { &keyword[SEPARATOR.len()..] } else { keyword };
    let trail = body.len() > SEPARATOR.len() && body.ends_with(SEPARATOR);
    let core = if trail { &body[..body.len() - SEPARATOR.len()] } else { body };
    if core.is_empty() {
        return Err(malformed());
    }
    let mut parts: Vec<String> =
        core.split(SEPARATOR).flat_map(|p| p.split('.')).map(str::to_string).collect();
    if parts.iter().any(String::is_empty) {
        return Err(malformed());
    }
    if lead {
        parts[0].insert_str(0, SEPARATOR);
    }
    if trail && let Some(last) = parts.last_mut() {
        last.push_str(SEPARATOR);
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldMap {
        [("id", "_id"), ("b", "c"), ("d.e", "f.e"), ("x", "location.x")].into_iter().collect()
    }

    #[test]
    fn underscore_attributes_are_stored_dotted() {
        let mut m = FieldMap::new();
        m.insert("a__b", "ab");
        m.insert("__private", "p");
        assert!(m.contains("a.b"));
        assert_eq!(m.resolve_keyword("a__b").unwrap(), "ab");
        assert_eq!(m.resolve_keyword("a__b__c").unwrap(), "ab.c");
        assert_eq!(m.get("__private"), Some("p"));
    }

    #[test]
    fn deserialized_entries_are_normalized() {
        let m: FieldMap = serde_json::from_str(r#"{"a__b": "ab", "x": "location.x"}"#).unwrap();
        assert_eq!(m.get("a.b"), Some("ab"));
        assert_eq!(m.resolve("x.y"), "location.x.y");
    }

    #[test]
    fn resolves_plain_and_unmapped() {
        let m = sample();
        assert_eq!(m.resolve("b"), "c");
        assert_eq!(m.resolve("a"), "a");
        assert_eq!(m.resolve("id"), "_id");
    }

    #[test]
    fn resolves_path_prefixes() {
        let m = sample();
        assert_eq!(m.resolve("x"), "location.x");
        assert_eq!(m.resolve("x.y"), "location.x.y");
        assert_eq!(m.resolve("d.e"), "f.e");
        assert_eq!(m.resolve("d.e.g"), "f.e.g");
        assert_eq!(m.resolve("b.d"), "c.d");
    }

    #[test]
    fn split_keeps_edge_underscores() {
        assert_eq!(split_keyword("__a").unwrap(), vec!["__a"]);
        assert_eq!(split_keyword("a__").unwrap(), vec!["a__"]);
        assert_eq!(split_keyword("__a__").unwrap(), vec!["__a__"]);
        assert_eq!(split_keyword("a__b__c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_keyword("a.b__c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_keyword("first_name").unwrap(), vec!["first_name"]);
    }

    #[test]
    fn split_rejects_empty_elements() {
        assert!(split_keyword("").is_err());
        assert!(split_keyword("__").is_err());
        assert!(split_keyword("a____b").is_err());
        assert!(split_keyword("a..b").is_err());
    }

    #[test]
    fn resolve_keyword_uses_separators() {
        let m = sample();
        assert_eq!(m.resolve_keyword("d__e").unwrap(), "f.e");
        assert_eq!(m.resolve_keyword("a__b__c").unwrap(), "a.b.c");
    }
}
