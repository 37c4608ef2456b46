use bson::{Bson, Document};

use crate::errors::{OdmError, Result};

// Safety limits to keep a single query bounded
pub(crate) const MAX_PATH_DEPTH: usize = 32;
pub(crate) const MAX_IN_SET: usize = 1000;

/// Pseudo path for `$elemMatch` conditions over scalar array elements.
pub(crate) const ELEMENT_PATH: &str = "\u{0}elem";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// An evaluable form of a native query document.
#[derive(Debug, Clone)]
pub enum Filter {
    True,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    Exists { path: String, exists: bool },
    In { path: String, values: Vec<Bson> },
    Nin { path: String, values: Vec<Bson> },
    All { path: String, values: Vec<Bson> },
    Size { path: String, size: usize },
    ElemMatch { path: String, filter: Box<Filter> },
    Cmp { path: String, op: CmpOp, value: Bson },
    #[cfg(feature = "regex")]
    Regex { path: String, pattern: String, case_insensitive: bool },
}

fn unsupported(what: &str) -> OdmError {
    OdmError::QueryExecution(format!("{what} is not supported by the memory backend"))
}

fn bad(op: &str, expected: &str) -> OdmError {
    OdmError::QueryExecution(format!("{op} expects {expected}"))
}

fn and_of(mut parts: Vec<Filter>) -> Filter {
    match parts.len() {
        0 => Filter::True,
        1 => parts.pop().unwrap_or(Filter::True),
        _ => Filter::And(parts),
    }
}

/// Parses a native query document.
///
/// # Errors
/// `QueryExecution` for malformed operators and for operators this backend cannot evaluate
/// (geospatial, `$where`, ...).
pub fn parse_filter(doc: &Document) -> Result<Filter> {
    let mut parts = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        parts.push(parse_entry(key, value)?);
    }
    Ok(and_of(parts))
}

fn parse_entry(key: &str, value: &Bson) -> Result<Filter> {
    match key {
        "$and" | "$or" | "$nor" => {
            let Bson::Array(items) = value else {
                return Err(bad(key, "an array of documents"));
            };
            let mut subs = Vec::with_capacity(items.len());
            for item in items {
                let Bson::Document(d) = item else {
                    return Err(bad(key, "an array of documents"));
                };
                subs.push(parse_filter(d)?);
            }
            Ok(match key {
                "$and" => Filter::And(subs),
                "$or" => Filter::Or(subs),
                _ => Filter::Nor(subs),
            })
        }
        k if k.starts_with('$') => Err(unsupported(k)),
        path => parse_field(path, value),
    }
}

pub(crate) fn parse_field(path: &str, value: &Bson) -> Result<Filter> {
    match value {
        Bson::Document(d) if !d.is_empty() && d.keys().all(|k| k.starts_with('$')) => parse_ops(path, d),
        Bson::RegularExpression(re) => regex_filter(path, re.pattern.as_str(), re.options.as_str()),
        v => Ok(Filter::Cmp { path: path.to_string(), op: CmpOp::Eq, value: v.clone() }),
    }
}

fn parse_ops(path: &str, ops: &Document) -> Result<Filter> {
    let mut parts = Vec::with_capacity(ops.len());
    for (op, value) in ops {
        let p = path.to_string();
        let part = match op.as_str() {
            "$eq" => Filter::Cmp { path: p, op: CmpOp::Eq, value: value.clone() },
            "$ne" => Filter::Cmp { path: p, op: CmpOp::Ne, value: value.clone() },
            "$gt" => Filter::Cmp { path: p, op: CmpOp::Gt, value: value.clone() },
            "$gte" => Filter::Cmp { path: p, op: CmpOp::Gte, value: value.clone() },
            "$lt" => Filter::Cmp { path: p, op: CmpOp::Lt, value: value.clone() },
            "$lte" => Filter::Cmp { path: p, op: CmpOp::Lte, value: value.clone() },
            "$in" | "$nin" | "$all" => {
                let Bson::Array(items) = value else {
                    return Err(bad(op, "an array"));
                };
                let values: Vec<Bson> = items.iter().take(MAX_IN_SET).cloned().collect();
                match op.as_str() {
                    "$in" => Filter::In { path: p, values },
                    "$nin" => Filter::Nin { path: p, values },
                    _ => Filter::All { path: p, values },
                }
            }
            "$exists" => Filter::Exists { path: p, exists: truthy(value) },
            "$size" => {
                let size = match value {
                    Bson::Int32(n) => usize::try_from(*n).ok(),
                    Bson::Int64(n) => usize::try_from(*n).ok(),
                    _ => None,
                };
                Filter::Size { path: p, size: size.ok_or_else(|| bad(op, "a non-negative integer"))? }
            }
            "$elemMatch" => {
                let Bson::Document(d) = value else {
                    return Err(bad(op, "a document"));
                };
                let inner = if d.keys().all(|k| k.starts_with('$') && !matches!(k.as_str(), "$and" | "$or" | "$nor")) {
                    parse_ops(ELEMENT_PATH, d)?
                } else {
                    parse_filter(d)?
                };
                Filter::ElemMatch { path: p, filter: Box::new(inner) }
            }
            "$not" => match value {
                Bson::Document(d) => Filter::Not(Box::new(parse_ops(path, d)?)),
                Bson::RegularExpression(re) => Filter::Not(Box::new(regex_filter(path, re.pattern.as_str(), re.options.as_str())?)),
                _ => return Err(bad(op, "an operator document or a regular expression")),
            },
            "$regex" => {
                let pattern = match value {
                    Bson::String(s) => s.clone(),
                    Bson::RegularExpression(re) => re.pattern.as_str().to_string(),
                    _ => return Err(bad(op, "a string")),
                };
                let options = ops.get_str("$options").unwrap_or("");
                regex_filter(path, &pattern, options)?
            }
            "$options" => continue,
            "$near" | "$within" | "$geoWithin" | "$nearSphere" | "$maxDistance" | "$uniqueDocs" => {
                return Err(unsupported("geospatial query"));
            }
            other => return Err(unsupported(other)),
        };
        parts.push(part);
    }
    Ok(and_of(parts))
}

#[cfg(feature = "regex")]
#[allow(clippy::unnecessary_wraps)]
fn regex_filter(path: &str, pattern: &str, options: &str) -> Result<Filter> {
    Ok(Filter::Regex { path: path.to_string(), pattern: pattern.to_string(), case_insensitive: options.contains('i') })
}

#[cfg(not(feature = "regex"))]
fn regex_filter(_path: &str, _pattern: &str, _options: &str) -> Result<Filter> {
    Err(unsupported("$regex (enable the `regex` feature)"))
}

pub(crate) const fn truthy(v: &Bson) -> bool {
    match v {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Null => false,
        _ => true,
    }
}
