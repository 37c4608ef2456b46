//! Suffix token → native operator table.
//!
//! Every keyword suffix (`score__gt`, `tags__in`, `loc__near`) is looked up here. The table is
//! static and shared by the query builder, the aggregation `$group` builder and the CLI.

use bson::Bson;

use crate::errors::{OdmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    /// `{key: {$op: value}}`
    Comparison,
    /// Wraps the following operator in `$not`.
    Negation,
    /// `$near` / `$within`, emitted like a comparison.
    Geo,
    /// `$box` / `$polygon` / `$circle`, emitted inside `{$within: {...}}`.
    GeoShape,
    /// `$group` accumulators; not valid inside a query.
    Accumulator,
}

/// Value shape an operator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Any,
    Sequence,
    Flag,
    Integer,
    Point,
    Document,
    Box,
    Polygon,
    Circle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub token: &'static str,
    pub native: &'static str,
    pub kind: OperatorKind,
    pub shape: ValueShape,
}

const fn op(token: &'static str, native: &'static str, kind: OperatorKind, shape: ValueShape) -> Operator {
    Operator { token, native, kind, shape }
}

use OperatorKind as K;
use ValueShape as S;

static OPERATORS: &[Operator] = &[
    op("gt", "$gt", K::Comparison, S::Any),
    op("gte", "$gte", K::Comparison, S::Any),
    op("lt", "$lt", K::Comparison, S::Any),
    op("lte", "$lte", K::Comparison, S::Any),
    op("ne", "$ne", K::Comparison, S::Any),
    op("in", "$in", K::Comparison, S::Sequence),
    op("nin", "$nin", K::Comparison, S::Sequence),
    op("all", "$all", K::Comparison, S::Sequence),
    op("exists", "$exists", K::Comparison, S::Flag),
    op("size", "$size", K::Comparison, S::Integer),
    op("elemMatch", "$elemMatch", K::Comparison, S::Document),
    op("elemmatch", "$elemMatch", K::Comparison, S::Document),
    op("not", "$not", K::Negation, S::Any),
    op("near", "$near", K::Geo, S::Point),
    op("within", "$within", K::Geo, S::Document),
    op("box", "$box", K::GeoShape, S::Box),
    op("polygon", "$polygon", K::GeoShape, S::Polygon),
    op("circle", "$circle", K::GeoShape, S::Circle),
    op("sum", "$sum", K::Accumulator, S::Any),
    op("avg", "$avg", K::Accumulator, S::Any),
    op("first", "$first", K::Accumulator, S::Any),
    op("last", "$last", K::Accumulator, S::Any),
    op("max", "$max", K::Accumulator, S::Any),
    op("min", "$min", K::Accumulator, S::Any),
    op("push", "$push", K::Accumulator, S::Any),
    op("addToSet", "$addToSet", K::Accumulator, S::Any),
    op("addtoset", "$addToSet", K::Accumulator, S::Any),
];

/// The full table, in declaration order.
#[must_use]
pub fn operators() -> &'static [Operator] {
    OPERATORS
}

#[must_use]
pub fn lookup(token: &str) -> Option<&'static Operator> {
    OPERATORS.iter().find(|o| o.token == token)
}

/// Looks up a token that is about to be used inside a query document.
///
/// # Errors
/// `UnknownOperator` when the token is missing or names a `$group` accumulator.
pub fn lookup_query(token: &str) -> Result<&'static Operator> {
    match lookup(token) {
        Some(o) if o.kind != OperatorKind::Accumulator => Ok(o),
        Some(_) => Err(OdmError::UnknownOperator(format!(
            "`{token}` is an aggregation accumulator and is only valid in $group"
        ))),
        None => Err(OdmError::UnknownOperator(token.to_string())),
    }
}

/// # Errors
/// `UnknownOperator` when the token is missing or is not an accumulator.
pub fn lookup_accumulator(token: &str) -> Result<&'static Operator> {
    match lookup(token) {
        Some(o) if o.kind == OperatorKind::Accumulator => Ok(o),
        _ => Err(OdmError::UnknownOperator(format!("`{token}` is not a $group accumulator"))),
    }
}

impl Operator {
    /// Checks that `value` has the shape this operator expects.
    ///
    /// # Errors
    /// `InvalidOperatorValue` describing the mismatch.
    pub fn validate(&self, value: &Bson) -> Result<()> {
        let ok = match self.shape {
            S::Any => true,
            S::Sequence => matches!(value, Bson::Array(_)),
            S::Flag => matches!(value, Bson::Boolean(_) | Bson::Int32(_) | Bson::Int64(_)),
            S::Integer => matches!(value, Bson::Int32(_) | Bson::Int64(_)),
            S::Document => matches!(value, Bson::Document(_)),
            S::Point => is_point(value) || matches!(value, Bson::Document(d) if d.contains_key("$geometry")),
            S::Box => matches!(value, Bson::Array(a) if a.len() == 2 && a.iter().all(is_point)),
            S::Polygon => match value {
                Bson::Array(a) => a.len() >= 3 && a.iter().all(is_point),
                Bson::Document(d) => d.len() >= 2 && d.iter().all(|(_, p)| is_point(p)),
                _ => false,
            },
            S::Circle => matches!(value, Bson::Array(a) if a.len() == 2 && is_point(&a[0]) && is_number(&a[1])),
        };
        if ok {
            Ok(())
        } else {
            Err(OdmError::invalid_value(self.token, self.shape.describe()))
        }
    }
}

impl ValueShape {
    const fn describe(self) -> &'static str {
        match self {
            S::Any => "any value",
            S::Sequence => "expected an array",
            S::Flag => "expected a boolean",
            S::Integer => "expected an integer",
            S::Document => "expected a document",
            S::Point => "expected a point of exactly 2 numbers",
            S::Box => "expected [lower_left, upper_right] points",
            S::Polygon => "expected at least 3 points or a mapping of at least 2 named points",
            S::Circle => "expected [center, radius]",
        }
    }
}

pub(crate) const fn is_number(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_))
}

/// A point is a 2-element numeric array or a 2-entry numeric mapping (`{x: .., y: ..}`).
pub(crate) fn is_point(v: &Bson) -> bool {
    match v {
        Bson::Array(a) => a.len() == 2 && a.iter().all(is_number),
        Bson::Document(d) => d.len() == 2 && d.iter().all(|(_, x)| is_number(x)),
        _ => false,
    }
}
