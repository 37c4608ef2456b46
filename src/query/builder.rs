use bson::oid::ObjectId;
use bson::{Bson, Document};

use super::args::{FieldValue, Fields};
use super::field_map::{FieldMap, split_keyword};
use super::operators::{self, Operator, OperatorKind};
use super::q::Q;
use crate::errors::{OdmError, Result};
use crate::logger::QUERY_TARGET;
use crate::types::ID_KEY;

/// Top-level keys that hold a list of sub-queries.
pub const LOGICAL_KEYS: [&str; 3] = ["$and", "$or", "$nor"];

/// A native query document.
///
/// Never mutated once built; combining queries produces a new value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query(Document);

impl Query {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps a literal query document without translation.
    #[must_use]
    pub const fn raw(doc: Document) -> Self {
        Self(doc)
    }

    #[must_use]
    pub const fn as_document(&self) -> &Document {
        &self.0
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Joins queries with implicit AND.
    ///
    /// Empty parts are dropped. A single remaining part is returned as-is; otherwise the documents
    /// are merged when their keys are disjoint and wrapped in `$and` when they are not.
    #[must_use]
    pub fn and_all(parts: impl IntoIterator<Item = Self>) -> Self {
        let parts: Vec<Document> = parts.into_iter().map(Self::into_document).filter(|d| !d.is_empty()).collect();
        match parts.len() {
            0 => Self::empty(),
            1 => Self(parts.into_iter().next().unwrap_or_default()),
            _ => {
                let disjoint = {
                    let mut seen = std::collections::HashSet::new();
                    parts.iter().flat_map(Document::keys).all(|k| seen.insert(k.clone()))
                };
                if disjoint {
                    Self(parts.into_iter().flatten().collect())
                } else {
                    let mut d = Document::new();
                    d.insert("$and", parts.into_iter().map(Bson::Document).collect::<Vec<_>>());
                    Self(d)
                }
            }
        }
    }
}

impl From<Query> for Document {
    fn from(q: Query) -> Self {
        q.0
    }
}

/// A keyword split into its literal key and optional operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKeyword {
    pub literal_key: String,
    pub operator: Option<&'static Operator>,
    pub negated: bool,
}

/// Translates keyword arguments into native query documents through a model's [`FieldMap`].
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder<'a> {
    map: &'a FieldMap,
}

impl<'a> QueryBuilder<'a> {
    #[must_use]
    pub const fn new(map: &'a FieldMap) -> Self {
        Self { map }
    }

    /// Builds one query from keyword pairs; pairs combine with implicit AND.
    ///
    /// # Errors
    /// Translation errors (`UnknownOperator`, `InvalidOperatorValue`, `AmbiguousKeyword`,
    /// `MalformedKeyword`, `DuplicateCondition`).
    pub fn build(&self, fields: &Fields) -> Result<Query> {
        let mut out = Document::new();
        for (key, value) in fields.iter() {
            if key.starts_with('$') {
                let v = self.build_raw_key(key, value)?;
                merge_condition(&mut out, key.to_string(), v)?;
                continue;
            }
            let parsed = self.parse_keyword(key)?;
            let cond = condition(&parsed, value)?;
            merge_condition(&mut out, parsed.literal_key, cond)?;
        }
        log::debug!(target: QUERY_TARGET, "translated query: {out}");
        Ok(Query(out))
    }

    /// Builds a query from a boolean expression tree.
    ///
    /// Consecutive nodes of the same combinator are flattened into one array and equal
    /// sub-expressions are kept once.
    ///
    /// # Errors
    /// Any translation error raised by a leaf.
    pub fn build_q(&self, q: &Q) -> Result<Query> {
        self.build_node(q).map(Query)
    }

    /// Builds a query from keyword pairs and boolean expressions, joined with AND.
    ///
    /// # Errors
    /// Any translation error.
    pub fn build_all(&self, qs: &[Q], fields: &Fields) -> Result<Query> {
        let mut parts = Vec::with_capacity(qs.len() + 1);
        for q in qs {
            parts.push(self.build_q(q)?);
        }
        parts.push(self.build(fields)?);
        Ok(Query::and_all(parts))
    }

    /// Builds a single condition from an explicit path and operator token.
    ///
    /// This is the unambiguous form for attribute names that collide with operator tokens.
    ///
    /// # Errors
    /// `UnknownOperator` for a token missing from the table, `InvalidOperatorValue` for a value of
    /// the wrong shape.
    pub fn condition(&self, path: &str, operator: Option<&str>, value: impl Into<Bson>) -> Result<Query> {
        let segments = split_keyword(path)?;
        let parsed = match operator {
            Some("not") => return Err(OdmError::UnknownOperator("not requires a nested operator".into())),
            Some(tok) => ParsedKeyword {
                literal_key: self.map.resolve_segments(&segments),
                operator: Some(operators::lookup_query(tok)?),
                negated: false,
            },
            None => ParsedKeyword { literal_key: self.map.resolve_segments(&segments), operator: None, negated: false },
        };
        let mut out = Document::new();
        let cond = condition(&parsed, &FieldValue::Value(value.into()))?;
        out.insert(parsed.literal_key, cond);
        Ok(Query(out))
    }

    /// Splits `name__op` into its literal key and operator.
    ///
    /// The final element is an operator only when it is in the table and something precedes
    /// it. `not` consumes exactly one following operator (`score__not__gt`).
    ///
    /// # Errors
    /// `MalformedKeyword`, `UnknownOperator` (bad token after `not`, accumulators),
    /// `AmbiguousKeyword` when the whole keyword is also an explicit field map entry.
    pub fn parse_keyword(&self, key: &str) -> Result<ParsedKeyword> {
        let parts = split_keyword(key)?;
        let n = parts.len();
        let last = operators::lookup(&parts[n - 1]).filter(|_| n >= 2);
        let Some(op) = last else {
            if n >= 3 && parts[n - 2] == "not" {
                return Err(OdmError::UnknownOperator(parts[n - 1].clone()));
            }
            return Ok(ParsedKeyword { literal_key: self.map.resolve_segments(&parts), operator: None, negated: false });
        };
        if op.kind == OperatorKind::Accumulator {
            operators::lookup_query(op.token)?;
        }
        if self.map.contains(&parts.join(".")) || self.map.contains(key) {
            return Err(OdmError::AmbiguousKeyword(key.to_string()));
        }
        let (path, operator, negated) = if op.kind == OperatorKind::Negation {
            if n >= 3 && parts[n - 2] == "not" {
                return Err(OdmError::UnknownOperator("not__not".into()));
            }
            (&parts[..n - 1], None, true)
        } else if n >= 3 && parts[n - 2] == "not" {
            (&parts[..n - 2], Some(op), true)
        } else {
            (&parts[..n - 1], Some(op), false)
        };
        Ok(ParsedKeyword { literal_key: self.map.resolve_segments(path), operator, negated })
    }

    fn build_raw_key(&self, key: &str, value: &FieldValue) -> Result<Bson> {
        let FieldValue::Value(v) = value else {
            return Err(OdmError::invalid_value(key, "geospatial expressions need a field name"));
        };
        if !LOGICAL_KEYS.contains(&key) {
            return Ok(v.clone());
        }
        let Bson::Array(items) = v else {
            return Err(OdmError::invalid_value(key, "expected an array of documents"));
        };
        let mut built = Vec::with_capacity(items.len());
        for item in items {
            let Bson::Document(d) = item else {
                return Err(OdmError::invalid_value(key, "expected an array of documents"));
            };
            built.push(Bson::Document(self.build(&Fields::from(d.clone()))?.into_document()));
        }
        Ok(Bson::Array(built))
    }

    fn build_node(&self, q: &Q) -> Result<Document> {
        match q {
            Q::Leaf(fields) => self.build(fields).map(Query::into_document),
            Q::And(..) => self.build_combined(q, "$and"),
            Q::Or(..) => self.build_combined(q, "$or"),
            Q::Not(inner) => {
                let mut d = Document::new();
                d.insert("$nor", vec![Bson::Document(self.build_node(inner)?)]);
                Ok(d)
            }
        }
    }

    fn build_combined(&self, q: &Q, token: &str) -> Result<Document> {
        let mut items = Vec::new();
        self.collect_operands(q, token, &mut items)?;
        if token == "$or" && items.iter().any(Document::is_empty) {
            return Ok(Document::new());
        }
        if items.len() <= 1 {
            return Ok(items.pop().unwrap_or_default());
        }
        let mut d = Document::new();
        d.insert(token, items.into_iter().map(Bson::Document).collect::<Vec<_>>());
        Ok(d)
    }

    fn collect_operands(&self, q: &Q, token: &str, items: &mut Vec<Document>) -> Result<()> {
        match (q, token) {
            (Q::And(l, r), "$and") | (Q::Or(l, r), "$or") => {
                self.collect_operands(l, token, items)?;
                self.collect_operands(r, token, items)
            }
            _ => {
                let d = self.build_node(q)?;
                // An empty operand matches everything: neutral under AND, absorbing under OR.
                if (token == "$or" || !d.is_empty()) && !items.contains(&d) {
                    items.push(d);
                }
                Ok(())
            }
        }
    }
}

/// Builds the condition placed under a literal key.
fn condition(parsed: &ParsedKeyword, value: &FieldValue) -> Result<Bson> {
    let is_id = parsed.literal_key == ID_KEY;
    match (parsed.operator, value) {
        (_, FieldValue::Geo(_)) if parsed.negated => {
            Err(OdmError::invalid_value("not", "geospatial expressions cannot be negated"))
        }
        (None, FieldValue::Geo(g)) => Ok(Bson::Document(g.as_document().clone())),
        (Some(op), FieldValue::Geo(_)) => Err(OdmError::invalid_value(
            op.token,
            "geospatial expressions are only accepted without an operator",
        )),
        (None, FieldValue::Value(v)) if parsed.negated => match v {
            Bson::Document(d) if is_operator_document(d) => Ok(wrap("$not", Bson::Document(d.clone()))),
            Bson::RegularExpression(_) => Ok(wrap("$not", v.clone())),
            _ => Err(OdmError::invalid_value("not", "expected an operator document or a regular expression")),
        },
        (None, FieldValue::Value(v)) => Ok(if is_id { coerce_object_id(v) } else { v.clone() }),
        (Some(op), FieldValue::Value(v)) => {
            op.validate(v)?;
            let v = if is_id { coerce_object_id(v) } else { v.clone() };
            let inner = match op.kind {
                OperatorKind::GeoShape => wrap("$within", Bson::Document(wrap_doc(op.native, v))),
                _ => Bson::Document(wrap_doc(op.native, v)),
            };
            Ok(if parsed.negated { wrap("$not", inner) } else { inner })
        }
    }
}

fn wrap_doc(key: &str, v: Bson) -> Document {
    let mut d = Document::new();
    d.insert(key, v);
    d
}

fn wrap(key: &str, v: Bson) -> Bson {
    Bson::Document(wrap_doc(key, v))
}

/// Whether every key of `d` is a `$` operator.
#[must_use]
pub fn is_operator_document(d: &Document) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

/// Places `cond` under `key`.
///
/// Two operator documents for the same key merge when their operators differ
/// (`score__gt` + `score__lt`); any other repeat is a `DuplicateCondition`.
fn merge_condition(out: &mut Document, key: String, cond: Bson) -> Result<()> {
    match (out.get_mut(&key), cond) {
        (None, cond) => {
            out.insert(key, cond);
            Ok(())
        }
        (Some(Bson::Document(existing)), Bson::Document(incoming))
            if is_operator_document(existing) && is_operator_document(&incoming) =>
        {
            for (op, v) in incoming {
                if existing.contains_key(&op) {
                    return Err(OdmError::DuplicateCondition(format!("{key}.{op}")));
                }
                existing.insert(op, v);
            }
            Ok(())
        }
        (Some(_), _) => Err(OdmError::DuplicateCondition(key)),
    }
}

/// Converts 24-hex strings into object ids, descending into operator documents and arrays.
#[must_use]
pub fn coerce_object_id(v: &Bson) -> Bson {
    match v {
        Bson::String(s) => ObjectId::parse_str(s).map_or_else(|_| v.clone(), Bson::ObjectId),
        Bson::Array(items) => Bson::Array(items.iter().map(coerce_object_id).collect()),
        Bson::Document(d) if is_operator_document(d) => {
            Bson::Document(d.iter().map(|(k, x)| (k.clone(), coerce_object_id(x))).collect())
        }
        _ => v.clone(),
    }
}
