//! Dotted-path helpers over embedded documents.

use bson::{Bson, Document};

/// Value at a dotted key.
///
/// A key stored literally (`"a.b"` as one key) wins over the nested path.
#[must_use]
pub fn get_nested_key<'a>(doc: &'a Document, key: &str) -> Option<&'a Bson> {
    if let Some(v) = doc.get(key) {
        return Some(v);
    }
    let (head, rest) = key.split_once('.')?;
    match doc.get(head) {
        Some(Bson::Document(sub)) => get_nested_key(sub, rest),
        _ => None,
    }
}

/// Sets a dotted key, creating embedded documents along the way.
///
/// A non-document value in the way is replaced.
pub fn set_nested_key(doc: &mut Document, key: &str, value: Bson) {
    let Some((head, rest)) = key.split_once('.') else {
        doc.insert(key, value);
        return;
    };
    if !matches!(doc.get(head), Some(Bson::Document(_))) {
        doc.insert(head, Document::new());
    }
    if let Some(Bson::Document(sub)) = doc.get_mut(head) {
        set_nested_key(sub, rest, value);
    }
}

/// Removes a dotted key, returning the removed value.
pub fn remove_nested_key(doc: &mut Document, key: &str) -> Option<Bson> {
    if let Some(v) = doc.remove(key) {
        return Some(v);
    }
    let (head, rest) = key.split_once('.')?;
    match doc.get_mut(head) {
        Some(Bson::Document(sub)) => remove_nested_key(sub, rest),
        _ => None,
    }
}

/// Deep-merges `updates` into `original`: embedded documents merge key by key, any other
/// value replaces what was there.
pub fn update_nested_keys(original: &mut Document, updates: Document) {
    for (k, v) in updates {
        match v {
            Bson::Document(sub) => {
                if !matches!(original.get(&k), Some(Bson::Document(_))) {
                    original.insert(k.clone(), Document::new());
                }
                if let Some(Bson::Document(target)) = original.get_mut(&k) {
                    update_nested_keys(target, sub);
                }
            }
            other => {
                original.insert(k, other);
            }
        }
    }
}
