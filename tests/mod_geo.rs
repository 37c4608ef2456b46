mod _support;

use bson::doc;
use docmap::query::geo::{Point, bounding_box, circle, near, polygon, polygon_map, within};
use docmap::query::{FieldMap, Fields, QueryBuilder};
use docmap::{ModelConfig, OdmError};

fn map() -> FieldMap {
    [("loc", "location")].into_iter().collect()
}

fn build(fields: Fields) -> Result<bson::Document, OdmError> {
    let m = map();
    QueryBuilder::new(&m).build(&fields).map(|q| q.into_document())
}

#[test]
fn near_with_options() {
    let q = build(Fields::new().with_geo("loc", near([1.0, 2.0], Some(5.0), true))).unwrap();
    assert_eq!(q, doc! { "location": { "$near": [1.0, 2.0], "$maxDistance": 5.0, "$uniqueDocs": true } });
}

#[test]
fn shape_builders() {
    assert_eq!(
        bounding_box((0.0, 0.0), (1.0, 1.0)).into_document(),
        doc! { "$within": { "$box": [[0.0, 0.0], [1.0, 1.0]] } }
    );
    assert_eq!(circle(Point::new(1.0, 1.0), 2.0).into_document(), doc! { "$within": { "$circle": [[1.0, 1.0], 2.0] } });
    assert_eq!(
        polygon([[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]).unwrap().into_document(),
        doc! { "$within": { "$polygon": [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] } }
    );
    assert_eq!(
        polygon_map([("a", [0.0, 0.0]), ("b", [1.0, 1.0])]).unwrap().into_document(),
        doc! { "$within": { "$polygon": { "a": { "x": 0.0, "y": 0.0 }, "b": { "x": 1.0, "y": 1.0 } } } }
    );
}

#[test]
fn too_few_polygon_points() {
    assert!(matches!(polygon([[0.0, 0.0], [1.0, 1.0]]), Err(OdmError::InvalidOperatorValue { .. })));
    assert!(matches!(polygon_map([("a", [0.0, 0.0])]), Err(OdmError::InvalidOperatorValue { .. })));
}

#[test]
fn keyword_shortcuts_match_builders() {
    let via_keyword = build(Fields::new().with("loc__box", vec![vec![0.0, 0.0], vec![1.0, 1.0]])).unwrap();
    let via_builder = build(Fields::new().with_geo("loc", bounding_box([0.0, 0.0], [1.0, 1.0]))).unwrap();
    assert_eq!(via_keyword, via_builder);

    assert_eq!(
        build(Fields::new().with("loc__circle", bson::bson!([[1.0, 1.0], 2.0]))).unwrap(),
        doc! { "location": { "$within": { "$circle": [[1.0, 1.0], 2.0] } } }
    );
    assert_eq!(build(Fields::new().with("loc__near", vec![1.0, 2.0])).unwrap(), doc! { "location": { "$near": [1.0, 2.0] } });
    assert_eq!(
        build(Fields::new().with("loc__within", doc! { "$center": [[0, 0], 1] })).unwrap(),
        doc! { "location": { "$within": { "$center": [[0, 0], 1] } } }
    );
    assert_eq!(within("$box", vec![1, 2]), within("box", vec![1, 2]));
}

#[test]
fn malformed_geometry_is_rejected() {
    assert!(matches!(build(Fields::new().with("loc__near", vec![1.0])), Err(OdmError::InvalidOperatorValue { .. })));
    assert!(matches!(
        build(Fields::new().with("loc__box", vec![vec![0.0, 0.0]])),
        Err(OdmError::InvalidOperatorValue { .. })
    ));
    assert!(matches!(
        build(Fields::new().with("loc__polygon", vec![vec![0.0, 0.0], vec![1.0, 1.0]])),
        Err(OdmError::InvalidOperatorValue { .. })
    ));
}

#[test]
fn geo_values_with_an_operator_are_rejected() {
    let r = build(Fields::new().with_geo("loc__gt", near([1.0, 2.0], None, false)));
    assert!(matches!(r, Err(OdmError::InvalidOperatorValue { .. })));
    let r = build(Fields::new().with_geo("loc__not", near([1.0, 2.0], None, false)));
    assert!(matches!(r, Err(OdmError::InvalidOperatorValue { .. })));
}

#[test]
fn memory_backend_refuses_geo_queries() {
    let (m, col) = _support::model(ModelConfig::new("Place").field("loc", "location"));
    col.seed([doc! { "location": [0.0, 0.0] }]);
    let mut cursor = m.find(&[], &Fields::new().with_geo("loc", near([0.0, 0.0], None, false))).unwrap();
    assert!(matches!(cursor.materialize(), Err(OdmError::QueryExecution(_))));
}
