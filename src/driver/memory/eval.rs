use bson::{Bson, Document};
use std::cmp::Ordering;

use super::filter::{CmpOp, ELEMENT_PATH, Filter, MAX_PATH_DEPTH};
use crate::types::{Direction, SortKey};

pub fn eval_filter(doc: &Document, filter: &Filter) -> bool {
    match filter {
        Filter::True => true,
        Filter::And(fs) => fs.iter().all(|f| eval_filter(doc, f)),
        Filter::Or(fs) => fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Nor(fs) => !fs.iter().any(|f| eval_filter(doc, f)),
        Filter::Not(f) => !eval_filter(doc, f),
        Filter::Exists { path, exists } => !collect_path(doc, path).is_empty() == *exists,
        Filter::In { path, values } => candidates(doc, path).iter().any(|v| values.contains(v)),
        Filter::Nin { path, values } => !candidates(doc, path).iter().any(|v| values.contains(v)),
        Filter::All { path, values } => collect_path(doc, path).iter().any(|v| match v {
            Bson::Array(items) => !values.is_empty() && values.iter().all(|x| items.contains(x)),
            other => values.len() == 1 && values[0] == **other,
        }),
        Filter::Size { path, size } => {
            collect_path(doc, path).iter().any(|v| matches!(v, Bson::Array(a) if a.len() == *size))
        }
        Filter::ElemMatch { path, filter } => collect_path(doc, path).iter().any(|v| match v {
            Bson::Array(items) => items.iter().any(|item| match item {
                Bson::Document(d) if !uses_element_path(filter) => eval_filter(d, filter),
                scalar => {
                    let mut wrapped = Document::new();
                    wrapped.insert(ELEMENT_PATH, scalar.clone());
                    eval_filter(&wrapped, filter)
                }
            }),
            _ => false,
        }),
        Filter::Cmp { path, op: CmpOp::Ne, value } => !candidates(doc, path).iter().any(|v| *v == value),
        Filter::Cmp { path, op: CmpOp::Eq, value } => {
            let found = candidates(doc, path);
            if found.is_empty() { matches!(value, Bson::Null) } else { found.iter().any(|v| *v == value) }
        }
        Filter::Cmp { path, op, value } => candidates(doc, path).iter().any(|v| {
            // Ordering comparisons only hold within the same type class, as on the server.
            same_class(v, value)
                && match (op, compare_bson(v, value)) {
                    (CmpOp::Gt, c) => c == Ordering::Greater,
                    (CmpOp::Gte, c) => c != Ordering::Less,
                    (CmpOp::Lt, c) => c == Ordering::Less,
                    (CmpOp::Lte, c) => c != Ordering::Greater,
                    _ => false,
                }
        }),
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            let mut re = regex::RegexBuilder::new(pattern);
            re.case_insensitive(*case_insensitive);
            let Ok(r) = re.build() else {
                return false;
            };
            candidates(doc, path).iter().any(|v| matches!(v, Bson::String(s) if r.is_match(s)))
        }
    }
}

fn uses_element_path(filter: &Filter) -> bool {
    match filter {
        Filter::And(fs) | Filter::Or(fs) | Filter::Nor(fs) => fs.iter().any(uses_element_path),
        Filter::Not(f) => uses_element_path(f),
        Filter::Exists { path, .. }
        | Filter::In { path, .. }
        | Filter::Nin { path, .. }
        | Filter::All { path, .. }
        | Filter::Size { path, .. }
        | Filter::ElemMatch { path, .. }
        | Filter::Cmp { path, .. } => path == ELEMENT_PATH,
        #[cfg(feature = "regex")]
        Filter::Regex { path, .. } => path == ELEMENT_PATH,
        Filter::True => false,
    }
}

/// Values at `path` plus the elements of any array found there.
fn candidates<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let mut out = Vec::new();
    for v in collect_path(doc, path) {
        out.push(v);
        if let Bson::Array(items) = v {
            out.extend(items.iter());
        }
    }
    out
}

/// Every value reachable at a dotted path, fanning out over arrays of documents.
///
/// Numeric segments index into arrays (`tags.0`).
pub fn collect_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    if path.is_empty() || path.len() > 1024 {
        return Vec::new();
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.len() > MAX_PATH_DEPTH {
        return Vec::new();
    }
    let mut out = Vec::new();
    if let Some(first) = doc.get(parts[0]) {
        descend(first, &parts[1..], &mut out);
    }
    out
}

fn descend<'a>(cur: &'a Bson, rest: &[&str], out: &mut Vec<&'a Bson>) {
    let Some((seg, tail)) = rest.split_first() else {
        out.push(cur);
        return;
    };
    match cur {
        Bson::Document(d) => {
            if let Some(next) = d.get(*seg) {
                descend(next, tail, out);
            }
        }
        Bson::Array(items) => {
            if let Ok(i) = seg.parse::<usize>() {
                if let Some(next) = items.get(i) {
                    descend(next, tail, out);
                }
            } else {
                for item in items {
                    if let Bson::Document(d) = item
                        && let Some(next) = d.get(*seg)
                    {
                        descend(next, tail, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// First value at a dotted path, without array fan-out.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut cur = doc;
    let mut iter = path.split('.').take(MAX_PATH_DEPTH).peekable();
    while let Some(seg) = iter.next() {
        if iter.peek().is_none() {
            return cur.get(seg);
        }
        match cur.get(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    None
}

pub fn compare_docs(a: &Document, b: &Document, sort: &[SortKey]) -> Ordering {
    for s in sort {
        let ord = match (get_path(a, &s.key), get_path(b, &s.key)) {
            (Some(x), Some(y)) => compare_bson(x, y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return if s.direction == Direction::Ascending { ord } else { ord.reverse() };
        }
    }
    Ordering::Equal
}

pub(crate) const fn is_num(x: &Bson) -> bool {
    matches!(x, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

#[allow(clippy::cast_precision_loss)]
pub(crate) fn as_f64_num(x: &Bson) -> f64 {
    match x {
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn same_class(a: &Bson, b: &Bson) -> bool {
    (is_num(a) && is_num(b)) || type_rank(a) == type_rank(b)
}

pub fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    if is_num(a) && is_num(b) {
        return as_f64_num(a).total_cmp(&as_f64_num(b));
    }
    match (a, b) {
        (Bson::String(x), Bson::String(y)) => x.cmp(y),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// Server sort order across types.
const fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 255,
        _ => 12,
    }
}

#[cfg(test)]
mod tests {
    use super::super::filter::parse_filter;
    use super::*;
    use bson::doc;

    fn matches(doc: &Document, query: Document) -> bool {
        eval_filter(doc, &parse_filter(&query).unwrap())
    }

    #[test]
    fn equality_matches_array_members() {
        let d = doc! { "tags": ["a", "b"] };
        assert!(matches(&d, doc! { "tags": "a" }));
        assert!(matches(&d, doc! { "tags": { "$in": ["z", "b"] } }));
        assert!(!matches(&d, doc! { "tags": { "$nin": ["a"] } }));
        assert!(matches(&d, doc! { "tags": { "$all": ["b", "a"] } }));
        assert!(matches(&d, doc! { "tags": { "$size": 2 } }));
    }

    #[test]
    fn nested_paths_fan_out_over_arrays() {
        let d = doc! { "items": [{ "n": 1 }, { "n": 5 }] };
        assert!(matches(&d, doc! { "items.n": { "$gt": 4 } }));
        assert!(matches(&d, doc! { "items.0.n": 1 }));
        assert!(matches(&d, doc! { "items": { "$elemMatch": { "n": { "$gte": 5 } } } }));
    }

    #[test]
    fn comparisons_stay_within_type_class() {
        let d = doc! { "v": "10" };
        assert!(!matches(&d, doc! { "v": { "$gt": 1 } }));
        assert!(matches(&doc! { "v": 10 }, doc! { "v": { "$gt": 1.5 } }));
    }

    #[test]
    fn logical_operators_and_not() {
        let d = doc! { "a": 1, "b": 2 };
        assert!(matches(&d, doc! { "$or": [{ "a": 2 }, { "b": 2 }] }));
        assert!(!matches(&d, doc! { "$nor": [{ "a": 1 }] }));
        assert!(matches(&d, doc! { "a": { "$not": { "$gt": 3 } } }));
        assert!(matches(&d, doc! { "missing": { "$not": { "$gt": 3 } } }));
        assert!(matches(&d, doc! { "missing": null }));
        assert!(matches(&d, doc! { "missing": { "$exists": false } }));
    }
}
