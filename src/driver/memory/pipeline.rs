use bson::{Bson, Document};

use super::eval::{as_f64_num, compare_bson, compare_docs, eval_filter, get_path, is_num};
use super::filter::{parse_filter, truthy};
use crate::errors::{OdmError, Result};
use crate::types::{Direction, ID_KEY, SortKey};

fn stage_err(stage: &str, msg: &str) -> OdmError {
    OdmError::QueryExecution(format!("{stage}: {msg}"))
}

fn as_count(stage: &str, v: &Bson) -> Result<usize> {
    let n = match v {
        Bson::Int32(n) => usize::try_from(*n).ok(),
        Bson::Int64(n) => usize::try_from(*n).ok(),
        _ => None,
    };
    n.ok_or_else(|| stage_err(stage, "expected a non-negative integer"))
}

/// Runs aggregation stages over `docs` in order.
///
/// # Errors
/// `QueryExecution` for unknown stages or malformed stage arguments.
pub fn run(mut docs: Vec<Document>, stages: &[Document]) -> Result<Vec<Document>> {
    for stage in stages {
        let Some((name, arg)) = stage.iter().next().filter(|_| stage.len() == 1) else {
            return Err(OdmError::QueryExecution("each stage needs exactly one operator".into()));
        };
        docs = match name.as_str() {
            "$match" => {
                let Bson::Document(q) = arg else {
                    return Err(stage_err(name, "expected a document"));
                };
                let f = parse_filter(q)?;
                docs.into_iter().filter(|d| eval_filter(d, &f)).collect()
            }
            "$project" => {
                let Bson::Document(spec) = arg else {
                    return Err(stage_err(name, "expected a document"));
                };
                docs.iter().map(|d| project(d, spec)).collect()
            }
            "$sort" => {
                let Bson::Document(spec) = arg else {
                    return Err(stage_err(name, "expected a document"));
                };
                let keys: Vec<SortKey> = spec
                    .iter()
                    .map(|(k, v)| {
                        let dir = if is_num(v) && as_f64_num(v) < 0.0 { Direction::Descending } else { Direction::Ascending };
                        SortKey::new(k.clone(), dir)
                    })
                    .collect();
                docs.sort_by(|a, b| compare_docs(a, b, &keys));
                docs
            }
            "$skip" => docs.into_iter().skip(as_count(name, arg)?).collect(),
            "$limit" => docs.into_iter().take(as_count(name, arg)?).collect(),
            "$unwind" => {
                let path = match arg {
                    Bson::String(s) => s.as_str(),
                    Bson::Document(d) => d.get_str("path").map_err(|_| stage_err(name, "expected a path"))?,
                    _ => return Err(stage_err(name, "expected a field path")),
                };
                let path = path.strip_prefix('$').ok_or_else(|| stage_err(name, "paths start with `$`"))?;
                unwind(docs, path)
            }
            "$group" => {
                let Bson::Document(spec) = arg else {
                    return Err(stage_err(name, "expected a document"));
                };
                group(&docs, spec)?
            }
            other => return Err(stage_err(other, "unsupported stage")),
        };
    }
    Ok(docs)
}

fn project(doc: &Document, spec: &Document) -> Document {
    let include = spec.iter().any(|(k, v)| k != ID_KEY && truthy(v));
    let keep_id = spec.get(ID_KEY).is_none_or(truthy);
    let mut out = Document::new();
    if include {
        if keep_id && let Some(id) = doc.get(ID_KEY) {
            out.insert(ID_KEY, id.clone());
        }
        for (k, v) in spec {
            if k != ID_KEY
                && truthy(v)
                && let Some(found) = get_path(doc, k)
            {
                insert_path(&mut out, k, found.clone());
            }
        }
    } else {
        out = doc.clone();
        for (k, v) in spec {
            if !truthy(v) {
                remove_path(&mut out, k);
            }
        }
    }
    out
}

fn insert_path(out: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            out.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(out.get(head), Some(Bson::Document(_))) {
                out.insert(head, Document::new());
            }
            if let Some(Bson::Document(sub)) = out.get_mut(head) {
                insert_path(sub, rest, value);
            }
        }
    }
}

fn remove_path(out: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            out.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(sub)) = out.get_mut(head) {
                remove_path(sub, rest);
            }
        }
    }
}

fn unwind(docs: Vec<Document>, path: &str) -> Vec<Document> {
    let mut out = Vec::with_capacity(docs.len());
    for d in docs {
        let items = match get_path(&d, path) {
            Some(Bson::Array(items)) => Some(items.clone()),
            Some(Bson::Null) | None => continue,
            Some(_) => None,
        };
        let Some(items) = items else {
            out.push(d);
            continue;
        };
        for item in items {
            let mut copy = d.clone();
            insert_path(&mut copy, path, item);
            out.push(copy);
        }
    }
    out
}

/// Evaluates a `$path` reference or returns a literal.
fn expr(doc: &Document, e: &Bson) -> Bson {
    match e {
        Bson::String(s) if s.starts_with('$') => get_path(doc, &s[1..]).cloned().unwrap_or(Bson::Null),
        Bson::Document(d) => Bson::Document(d.iter().map(|(k, v)| (k.clone(), expr(doc, v))).collect()),
        other => other.clone(),
    }
}

fn group(docs: &[Document], spec: &Document) -> Result<Vec<Document>> {
    let id_expr = spec.get(ID_KEY).cloned().unwrap_or(Bson::Null);
    let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();
    for d in docs {
        let key = expr(d, &id_expr);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(d),
            None => groups.push((key, vec![d])),
        }
    }
    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut row = Document::new();
        row.insert(ID_KEY, key);
        for (field, acc) in spec {
            if field == ID_KEY {
                continue;
            }
            let Bson::Document(acc) = acc else {
                return Err(stage_err("$group", "accumulators are documents"));
            };
            let Some((op, arg)) = acc.iter().next() else {
                return Err(stage_err("$group", "empty accumulator"));
            };
            let values: Vec<Bson> = members.iter().map(|d| expr(d, arg)).collect();
            row.insert(field.clone(), accumulate(op, values)?);
        }
        out.push(row);
    }
    Ok(out)
}

fn numbers(values: &[Bson]) -> impl Iterator<Item = &Bson> {
    values.iter().filter(|v| is_num(v))
}

fn accumulate(op: &str, values: Vec<Bson>) -> Result<Bson> {
    Ok(match op {
        "$sum" => {
            if numbers(&values).all(|v| matches!(v, Bson::Int32(_) | Bson::Int64(_))) {
                let total: i64 = numbers(&values)
                    .map(|v| match v {
                        Bson::Int32(n) => i64::from(*n),
                        Bson::Int64(n) => *n,
                        _ => 0,
                    })
                    .sum();
                i32::try_from(total).map_or(Bson::Int64(total), Bson::Int32)
            } else {
                Bson::Double(numbers(&values).map(as_f64_num).sum())
            }
        }
        "$avg" => {
            let n = numbers(&values).count();
            if n == 0 {
                Bson::Null
            } else {
                #[allow(clippy::cast_precision_loss)]
                let avg = numbers(&values).map(as_f64_num).sum::<f64>() / n as f64;
                Bson::Double(avg)
            }
        }
        "$first" => values.first().cloned().unwrap_or(Bson::Null),
        "$last" => values.last().cloned().unwrap_or(Bson::Null),
        "$max" => values.iter().filter(|v| !matches!(v, Bson::Null)).max_by(|a, b| compare_bson(a, b)).cloned().unwrap_or(Bson::Null),
        "$min" => values.iter().filter(|v| !matches!(v, Bson::Null)).min_by(|a, b| compare_bson(a, b)).cloned().unwrap_or(Bson::Null),
        "$push" => Bson::Array(values),
        "$addToSet" => {
            let mut set: Vec<Bson> = Vec::new();
            for v in values {
                if !set.contains(&v) {
                    set.push(v);
                }
            }
            Bson::Array(set)
        }
        other => return Err(stage_err("$group", &format!("unsupported accumulator {other}"))),
    })
}
