//! Aggregation pipeline builder.
//!
//! Stage arguments use attribute names and go through the model's field map, like queries.

use bson::{Bson, Document, doc};
use std::sync::Arc;

use crate::errors::{OdmError, Result};
use crate::query::operators::lookup_accumulator;
use crate::query::{FieldMap, Fields, Q, QueryBuilder};
use crate::types::{ID_KEY, SortKey};

/// One `$group` output field: `output: { $<operator>: source }`.
///
/// A string source names an attribute and becomes a `$key` reference; any other value is
/// passed through (`1` to count).
#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub output: String,
    pub operator: String,
    pub source: Bson,
}

impl Accumulator {
    #[must_use]
    pub fn new(output: impl Into<String>, operator: impl Into<String>, source: impl Into<Bson>) -> Self {
        Self { output: output.into(), operator: operator.into(), source: source.into() }
    }
}

/// An ordered list of aggregation stages.
#[derive(Debug, Clone)]
pub struct Pipeline {
    map: Arc<FieldMap>,
    stages: Vec<Document>,
}

impl Pipeline {
    #[must_use]
    pub fn new(map: Arc<FieldMap>) -> Self {
        Self { map, stages: Vec::new() }
    }

    fn key(&self, attribute: &str) -> Result<String> {
        self.map.resolve_keyword(attribute)
    }

    fn reference(&self, attribute: &str) -> Result<String> {
        Ok(format!("${}", self.key(attribute)?))
    }

    /// Adds `include` fields as `1` and `exclude` fields as `0` to a `$project` stage.
    ///
    /// Back-to-back calls extend the same stage; a field named again takes its latest value.
    ///
    /// # Errors
    /// `MalformedKeyword`.
    pub fn project(mut self, include: &[&str], exclude: &[&str]) -> Result<Self> {
        let mut spec = match self.stages.last_mut().and_then(|s| s.get_document_mut("$project").ok()) {
            Some(existing) => std::mem::take(existing),
            None => {
                self.stages.push(doc! { "$project": {} });
                Document::new()
            }
        };
        for a in include {
            spec.insert(self.key(a)?, 1);
        }
        for a in exclude {
            spec.insert(self.key(a)?, 0);
        }
        if let Some(last) = self.stages.last_mut() {
            last.insert("$project", spec);
        }
        Ok(self)
    }

    /// Appends a `$match` stage built from keyword conditions.
    ///
    /// # Errors
    /// Translation errors.
    pub fn match_fields(self, fields: &Fields) -> Result<Self> {
        let query = QueryBuilder::new(&self.map).build(fields)?;
        Ok(self.push("$match", query.into_document()))
    }

    /// # Errors
    /// Translation errors.
    pub fn match_q(self, q: &Q) -> Result<Self> {
        let query = QueryBuilder::new(&self.map).build_q(q)?;
        Ok(self.push("$match", query.into_document()))
    }

    /// Appends a `$sort`; `-name` sorts descending.
    ///
    /// # Errors
    /// `MalformedKeyword`.
    pub fn sort<S: AsRef<str>>(self, fields: &[S]) -> Result<Self> {
        let mut spec = Document::new();
        for f in fields {
            let (name, direction) = SortKey::parse_marker(f.as_ref());
            spec.insert(self.key(name)?, direction.as_i32());
        }
        Ok(self.push("$sort", spec))
    }

    #[must_use]
    pub fn limit(self, n: u64) -> Self {
        self.push("$limit", Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)))
    }

    #[must_use]
    pub fn skip(self, n: u64) -> Self {
        self.push("$skip", Bson::Int64(i64::try_from(n).unwrap_or(i64::MAX)))
    }

    /// # Errors
    /// `MalformedKeyword`.
    pub fn unwind(self, attribute: &str) -> Result<Self> {
        let path = self.reference(attribute)?;
        Ok(self.push("$unwind", path))
    }

    /// Appends a `$group` keyed by attribute `by` (`None` groups everything together).
    ///
    /// # Errors
    /// `UnknownOperator` for a token that is not an accumulator; `MalformedKeyword`.
    pub fn group(self, by: Option<&str>, accumulators: &[Accumulator]) -> Result<Self> {
        let mut spec = Document::new();
        spec.insert(ID_KEY, by.map(|b| self.reference(b)).transpose()?.map_or(Bson::Null, Bson::String));
        for acc in accumulators {
            if acc.output == ID_KEY {
                return Err(OdmError::invalid_value(&acc.operator, "`_id` is the group key"));
            }
            let op = lookup_accumulator(&acc.operator)?;
            let source = match &acc.source {
                Bson::String(attr) => Bson::String(self.reference(attr)?),
                other => other.clone(),
            };
            let mut expr = Document::new();
            expr.insert(op.native, source);
            spec.insert(acc.output.clone(), expr);
        }
        Ok(self.push("$group", spec))
    }

    fn push(mut self, stage: &str, arg: impl Into<Bson>) -> Self {
        let mut d = Document::new();
        d.insert(stage, arg.into());
        self.stages.push(d);
        self
    }

    #[must_use]
    pub fn stages(&self) -> Vec<Document> {
        self.stages.clone()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> Pipeline {
        let mut map = FieldMap::with_id();
        map.insert("x", "location.x");
        Pipeline::new(Arc::new(map))
    }

    #[test]
    fn consecutive_projects_merge() {
        let p = pipeline().project(&["a"], &[]).unwrap().project(&["b"], &[]).unwrap().project(&[], &["a", "c"]).unwrap();
        assert_eq!(p.stages(), vec![doc! { "$project": { "a": 0, "b": 1, "c": 0 } }]);
    }

    #[test]
    fn project_after_another_stage_starts_a_new_one() {
        let p = pipeline().project(&["x"], &[]).unwrap().limit(2).project(&["id"], &[]).unwrap();
        assert_eq!(
            p.stages(),
            vec![doc! { "$project": { "location.x": 1 } }, doc! { "$limit": 2_i64 }, doc! { "$project": { "_id": 1 } }]
        );
    }

    #[test]
    fn group_resolves_sources_and_rejects_query_operators() {
        let p = pipeline()
            .group(Some("x"), &[Accumulator::new("total", "sum", "n"), Accumulator::new("count", "sum", 1)])
            .unwrap();
        assert_eq!(
            p.stages(),
            vec![doc! { "$group": { "_id": "$location.x", "total": { "$sum": "$n" }, "count": { "$sum": 1 } } }]
        );
        assert!(matches!(pipeline().group(None, &[Accumulator::new("t", "gt", "n")]), Err(OdmError::UnknownOperator(_))));
    }
}
