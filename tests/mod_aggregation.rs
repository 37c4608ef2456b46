mod _support;

use bson::{Bson, doc};
use docmap::{Accumulator, Fields, ModelConfig, OdmError};

fn seeded() -> docmap::Model {
    let (m, col) = _support::model(ModelConfig::new("Sale").field("region", "r.name"));
    col.seed([
        doc! { "_id": 1, "r": { "name": "north" }, "amount": 10, "items": ["a", "b"] },
        doc! { "_id": 2, "r": { "name": "south" }, "amount": 5, "items": ["a"] },
        doc! { "_id": 3, "r": { "name": "north" }, "amount": 7, "items": [] },
    ]);
    m
}

#[test]
fn stages_render_in_order_with_mapped_names() {
    let m = seeded();
    let p = m
        .pipeline()
        .match_fields(&Fields::new().with("amount__gte", 5))
        .unwrap()
        .project(&["region", "amount"], &[])
        .unwrap()
        .sort(&["-amount"])
        .unwrap()
        .skip(1)
        .limit(10);
    assert_eq!(
        p.stages(),
        vec![
            doc! { "$match": { "amount": { "$gte": 5 } } },
            doc! { "$project": { "r.name": 1, "amount": 1 } },
            doc! { "$sort": { "amount": -1 } },
            doc! { "$skip": 1_i64 },
            doc! { "$limit": 10_i64 },
        ]
    );
}

#[test]
fn group_totals_per_region() {
    let m = seeded();
    let p = m
        .pipeline()
        .group(Some("region"), &[Accumulator::new("total", "sum", "amount"), Accumulator::new("n", "sum", 1)])
        .unwrap()
        .sort(&["id"])
        .unwrap();
    let rows = m.aggregate(&p).unwrap();
    assert_eq!(rows, vec![doc! { "_id": "north", "total": 17, "n": 2 }, doc! { "_id": "south", "total": 5, "n": 1 }]);
}

#[test]
fn unwind_then_collect_sets() {
    let m = seeded();
    let p = m
        .pipeline()
        .unwind("items")
        .unwrap()
        .group(None, &[Accumulator::new("items", "addtoset", "items"), Accumulator::new("top", "max", "amount")])
        .unwrap();
    let rows = m.aggregate(&p).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("_id"), Some(&Bson::Null));
    assert_eq!(rows[0].get_array("items").unwrap(), &vec![Bson::from("a"), Bson::from("b")]);
    assert_eq!(rows[0].get_i32("top").unwrap(), 10);
}

#[test]
fn match_q_and_exclusion_project() {
    let m = seeded();
    let q = docmap::Q::new(Fields::new().with("region", "south")).not();
    let p = m.pipeline().match_q(&q).unwrap().project(&[], &["items", "r"]).unwrap();
    let rows = m.aggregate(&p).unwrap();
    assert_eq!(rows, vec![doc! { "_id": 1, "amount": 10 }, doc! { "_id": 3, "amount": 7 }]);
}

#[test]
fn query_operators_are_not_accumulators() {
    let m = seeded();
    let err = m.pipeline().group(None, &[Accumulator::new("x", "in", "amount")]).unwrap_err();
    assert!(matches!(err, OdmError::UnknownOperator(_)));
}
