use bson::{Bson, Document};

use super::eval::{as_f64_num, eval_filter, get_path, is_num};
use super::filter::{ELEMENT_PATH, parse_field};
use crate::errors::{OdmError, Result};
use crate::types::ID_KEY;

fn exec_err(msg: impl Into<String>) -> OdmError {
    OdmError::QueryExecution(msg.into())
}

/// Parent document of the last segment of `path`, creating embedded documents when `create`.
fn parent_mut<'a>(root: &'a mut Document, path: &str, create: bool) -> Option<(&'a mut Document, String)> {
    let mut segs: Vec<&str> = path.split('.').collect();
    let last = segs.pop()?.to_string();
    let mut cur = root;
    for seg in segs {
        if create && !matches!(cur.get(seg), Some(Bson::Document(_))) {
            cur.insert(seg, Document::new());
        }
        cur = match cur.get_mut(seg) {
            Some(Bson::Document(d)) => d,
            _ => return None,
        };
    }
    Some((cur, last))
}

fn set_path(root: &mut Document, path: &str, value: Bson) -> bool {
    let Some((parent, last)) = parent_mut(root, path, true) else {
        return false;
    };
    let old = parent.insert(last, value.clone());
    old.as_ref() != Some(&value)
}

fn unset_path(root: &mut Document, path: &str) -> Option<Bson> {
    let (parent, last) = parent_mut(root, path, false)?;
    parent.remove(&last)
}

fn array_mut<'a>(root: &'a mut Document, path: &str, op: &str) -> Result<&'a mut Vec<Bson>> {
    let (parent, last) = parent_mut(root, path, true).ok_or_else(|| exec_err(format!("{op}: bad path `{path}`")))?;
    if !parent.contains_key(&last) {
        parent.insert(last.clone(), Bson::Array(Vec::new()));
    }
    match parent.get_mut(&last) {
        Some(Bson::Array(items)) => Ok(items),
        _ => Err(exec_err(format!("{op}: `{path}` is not an array"))),
    }
}

/// Adds two numbers, keeping integer types while they fit.
fn add_numbers(cur: &Bson, by: &Bson) -> Option<Bson> {
    Some(match (cur, by) {
        (Bson::Int32(a), Bson::Int32(b)) => a.checked_add(*b).map_or_else(|| Bson::Int64(i64::from(*a) + i64::from(*b)), Bson::Int32),
        (Bson::Int32(a), Bson::Int64(b)) => Bson::Int64(i64::from(*a).checked_add(*b)?),
        (Bson::Int64(a), Bson::Int32(b)) => Bson::Int64(a.checked_add(i64::from(*b))?),
        (Bson::Int64(a), Bson::Int64(b)) => Bson::Int64(a.checked_add(*b)?),
        (a, b) if is_num(a) && is_num(b) => Bson::Double(as_f64_num(a) + as_f64_num(b)),
        _ => return None,
    })
}

fn each_values(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(d) if d.contains_key("$each") => match d.get("$each") {
            Some(Bson::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        },
        v => vec![v.clone()],
    }
}

fn fields<'a>(op: &str, value: &'a Bson) -> Result<&'a Document> {
    match value {
        Bson::Document(d) => Ok(d),
        _ => Err(exec_err(format!("{op} expects a document"))),
    }
}

/// Whether an array element satisfies a `$pull` condition.
fn pull_matches(item: &Bson, cond: &Bson) -> Result<bool> {
    match cond {
        Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => {
            let f = parse_field(ELEMENT_PATH, cond)?;
            let mut wrapped = Document::new();
            wrapped.insert(ELEMENT_PATH, item.clone());
            Ok(eval_filter(&wrapped, &f))
        }
        Bson::Document(d) => match item {
            Bson::Document(sub) => Ok(eval_filter(sub, &super::filter::parse_filter(d)?)),
            _ => Ok(false),
        },
        other => Ok(item == other),
    }
}

/// Applies a native update document in place; returns whether anything changed.
///
/// A document without `$` operators replaces everything but `_id`.
///
/// # Errors
/// `QueryExecution` for unknown operators, non-numeric `$inc` targets, or array operators on
/// non-arrays.
pub fn apply_update(doc: &mut Document, update: &Document) -> Result<bool> {
    if !update.keys().any(|k| k.starts_with('$')) {
        let id = doc.get(ID_KEY).cloned();
        let mut replacement = update.clone();
        if let Some(id) = id {
            replacement.insert(ID_KEY, id);
        }
        let changed = *doc != replacement;
        *doc = replacement;
        return Ok(changed);
    }
    let mut changed = false;
    for (op, spec) in update {
        let spec = fields(op, spec)?;
        for (path, value) in spec {
            changed |= apply_one(doc, op, path, value)?;
        }
    }
    Ok(changed)
}

fn apply_one(doc: &mut Document, op: &str, path: &str, value: &Bson) -> Result<bool> {
    match op {
        "$set" => Ok(set_path(doc, path, value.clone())),
        "$unset" => Ok(unset_path(doc, path).is_some()),
        "$inc" => {
            let cur = get_path(doc, path).cloned().unwrap_or(Bson::Int32(0));
            let next = add_numbers(&cur, value)
                .ok_or_else(|| exec_err(format!("$inc: cannot add {value} to `{path}`")))?;
            Ok(set_path(doc, path, next))
        }
        "$push" => {
            let values = each_values(value);
            let items = array_mut(doc, path, op)?;
            let changed = !values.is_empty();
            items.extend(values);
            Ok(changed)
        }
        "$addToSet" => {
            let items = array_mut(doc, path, op)?;
            let mut changed = false;
            for v in each_values(value) {
                if !items.contains(&v) {
                    items.push(v);
                    changed = true;
                }
            }
            Ok(changed)
        }
        "$pull" => {
            let items = array_mut(doc, path, op)?;
            let before = items.len();
            let mut kept = Vec::with_capacity(before);
            for item in items.drain(..) {
                if !pull_matches(&item, value)? {
                    kept.push(item);
                }
            }
            *items = kept;
            Ok(items.len() != before)
        }
        "$pop" => {
            let items = array_mut(doc, path, op)?;
            if items.is_empty() {
                return Ok(false);
            }
            let front = matches!(value, Bson::Int32(n) if *n < 0) || matches!(value, Bson::Int64(n) if *n < 0);
            if front {
                items.remove(0);
            } else {
                items.pop();
            }
            Ok(true)
        }
        "$rename" => {
            let Bson::String(to) = value else {
                return Err(exec_err("$rename expects string targets"));
            };
            match unset_path(doc, path) {
                Some(v) => {
                    set_path(doc, to, v);
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        other => Err(exec_err(format!("unsupported update operator {other}"))),
    }
}
