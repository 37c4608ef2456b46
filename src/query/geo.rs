//! Helpers for geospatial queries.
//!
//! Each builder returns a [`GeoExpr`]: a pre-built operator sub-document that the query builder
//! splices in as the condition of a keyword without an operator suffix:
//!
//! ```
//! use docmap::query::{geo, Fields};
//! let fields = Fields::new().with_geo("location", geo::near([1.0, 2.0], Some(3.0), false));
//! # let _ = fields;
//! ```
//!
//! No field resolution happens here.

use bson::{Bson, Document, doc};

use crate::errors::{OdmError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn to_bson(self) -> Bson {
        Bson::Array(vec![Bson::Double(self.x), Bson::Double(self.y)])
    }

    fn to_mapping(self) -> Bson {
        Bson::Document(doc! { "x": self.x, "y": self.y })
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// A geospatial operator document such as `{$near: [x, y], $maxDistance: d}`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoExpr(Document);

impl GeoExpr {
    #[must_use]
    pub const fn as_document(&self) -> &Document {
        &self.0
    }

    #[must_use]
    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<GeoExpr> for Bson {
    fn from(g: GeoExpr) -> Self {
        Self::Document(g.0)
    }
}

/// Builds `{$near: point}` with optional `$maxDistance` and `$uniqueDocs`.
#[must_use]
pub fn near(point: impl Into<Point>, max_distance: Option<f64>, unique_docs: bool) -> GeoExpr {
    let mut d = doc! { "$near": point.into().to_bson() };
    if let Some(m) = max_distance {
        d.insert("$maxDistance", m);
    }
    if unique_docs {
        d.insert("$uniqueDocs", true);
    }
    GeoExpr(d)
}

/// Builds `{$within: {$<shape>: bounds}}`.
#[must_use]
pub fn within(shape: &str, bounds: impl Into<Bson>) -> GeoExpr {
    let shape = shape.strip_prefix('$').unwrap_or(shape);
    let mut inner = Document::new();
    inner.insert(format!("${shape}"), bounds.into());
    GeoExpr(doc! { "$within": inner })
}

/// `$within` a `$box` bounded by its lower-left and upper-right corners.
#[must_use]
pub fn bounding_box(lower_left: impl Into<Point>, upper_right: impl Into<Point>) -> GeoExpr {
    within("box", vec![lower_left.into().to_bson(), upper_right.into().to_bson()])
}

/// `$within` a `$circle` around `center`.
#[must_use]
pub fn circle(center: impl Into<Point>, radius: f64) -> GeoExpr {
    within("circle", vec![center.into().to_bson(), Bson::Double(radius)])
}

/// `$within` a `$polygon` given as a sequence of vertices.
///
/// # Errors
/// `InvalidOperatorValue` with fewer than 3 points.
pub fn polygon<P: Into<Point>>(points: impl IntoIterator<Item = P>) -> Result<GeoExpr> {
    let pts: Vec<Bson> = points.into_iter().map(|p| p.into().to_bson()).collect();
    if pts.len() < 3 {
        return Err(OdmError::invalid_value("polygon", "a polygon needs at least 3 points"));
    }
    Ok(within("polygon", pts))
}

/// `$within` a `$polygon` given as named vertices (`{a: {x, y}, b: {x, y}}`).
///
/// # Errors
/// `InvalidOperatorValue` with fewer than 2 points.
pub fn polygon_map<K: Into<String>, P: Into<Point>>(
    points: impl IntoIterator<Item = (K, P)>,
) -> Result<GeoExpr> {
    let mut d = Document::new();
    for (name, p) in points {
        d.insert(name.into(), p.into().to_mapping());
    }
    if d.len() < 2 {
        return Err(OdmError::invalid_value("polygon", "a point mapping needs at least 2 points"));
    }
    Ok(within("polygon", d))
}
