mod _support;

use _support::model;
use bson::{Bson, doc};
use docmap::types::{Direction, SortKey};
use docmap::{Fields, ModelConfig, OdmError};

fn seeded() -> (docmap::Model, std::sync::Arc<_support::Counting>) {
    let (m, col) = model(ModelConfig::new("Item").field("rank", "r"));
    col.seed((1..=5).map(|i| doc! { "_id": i, "r": 6 - i, "tags": [i % 2] }));
    (m, col)
}

#[test]
fn nothing_is_fetched_until_observed() {
    let (m, col) = seeded();
    let cursor = m.find(&[], &Fields::new().with("rank__gt", 1)).unwrap();
    let cursor = cursor.sort(&["rank"]).unwrap().limit(3).skip(1);
    assert_eq!(col.finds(), 0);
    assert!(!cursor.is_materialized());

    let mut cursor = cursor;
    let ranks: Vec<i32> = cursor.iter().unwrap().map(|d| d.get_i32("r").unwrap()).collect();
    assert_eq!(ranks, vec![3, 4, 5]);
    cursor.first().unwrap();
    cursor.slice(0..2).unwrap();
    assert_eq!(col.finds(), 1);
}

#[test]
fn find_spec_carries_resolved_sort_and_window() {
    let (m, col) = seeded();
    let mut cursor = m.all().unwrap().sort(&["-rank", "name"]).unwrap().limit(2).skip(1);
    cursor.materialize().unwrap();
    let spec = col.last_find.lock().clone().unwrap();
    assert_eq!(spec.sort, vec![SortKey::new("r", Direction::Descending), SortKey::new("name", Direction::Ascending)]);
    assert_eq!(spec.limit, Some(2));
    assert_eq!(spec.skip, Some(1));
    assert_eq!(spec.sort_document(), doc! { "r": -1, "name": 1 });
}

#[test]
fn zero_limit_and_skip_mean_none() {
    let (m, _col) = seeded();
    let cursor = m.all().unwrap().limit(0).skip(0);
    assert_eq!(cursor.limit_value(), None);
    assert_eq!(cursor.skip_value(), None);
    let mut cursor = cursor;
    assert_eq!(cursor.count().unwrap(), 5);
}

#[test]
fn count_uses_server_once_then_cache() {
    let (m, col) = seeded();
    let mut cursor = m.find(&[], &Fields::new().with("rank__lte", 3)).unwrap();
    assert_eq!(cursor.count().unwrap(), 3);
    assert_eq!(cursor.count().unwrap(), 3);
    assert_eq!(col.counts(), 1);
    assert_eq!(col.finds(), 0);

    let mut fetched = m.all().unwrap().limit(2);
    fetched.materialize().unwrap();
    assert_eq!(fetched.count().unwrap(), 2);
    assert_eq!(col.counts(), 1);
}

#[test]
fn indexing_past_the_end_and_clamped_slices() {
    let (m, _col) = seeded();
    let mut cursor = m.all().unwrap().sort(&["id"]).unwrap();
    assert_eq!(cursor.get(4).unwrap().and_then(|d| d.get("_id")), Some(&Bson::Int32(5)));
    assert!(cursor.get(9).unwrap().is_none());
    assert_eq!(cursor.slice(3..100).unwrap().len(), 2);
    assert!(cursor.slice(7..9).unwrap().is_empty());
}

#[test]
fn chaining_after_materialization_starts_fresh() {
    let (m, col) = seeded();
    let mut cursor = m.all().unwrap();
    cursor.materialize().unwrap();
    let mut narrowed = cursor.limit(1);
    assert!(cursor.is_materialized());
    assert!(!narrowed.is_materialized());
    assert_eq!(narrowed.materialize().unwrap().len(), 1);
    assert_eq!(col.finds(), 2);
}

#[test]
fn failed_fetch_poisons_the_cursor() {
    let (m, col) = seeded();
    let mut cursor = m.all().unwrap();
    col.inner.fail_next(OdmError::DatabaseUnavailable("down".into()));
    assert!(matches!(cursor.materialize(), Err(OdmError::DatabaseUnavailable(_))));
    assert!(matches!(cursor.materialize(), Err(OdmError::CursorFailed)));
    assert!(matches!(cursor.count(), Err(OdmError::CursorFailed)));

    let mut retry = m.all().unwrap();
    assert_eq!(retry.materialize().unwrap().len(), 5);

    let mut counted = m.all().unwrap();
    col.inner.fail_next(OdmError::DatabaseUnavailable("down".into()));
    assert!(matches!(counted.count(), Err(OdmError::DatabaseUnavailable(_))));
    assert!(matches!(counted.count(), Err(OdmError::CursorFailed)));
    assert!(matches!(counted.first(), Err(OdmError::CursorFailed)));
    assert_eq!(col.counts(), 1);
}

#[test]
fn distinct_unwinds_arrays() {
    let (m, _col) = seeded();
    let cursor = m.find(&[], &Fields::new().with("rank__gte", 2)).unwrap();
    let mut values = cursor.distinct("tags").unwrap();
    values.sort_by_key(|v| v.as_i32());
    assert_eq!(values, vec![Bson::Int32(0), Bson::Int32(1)]);
}

#[test]
fn default_sort_applies_to_find() {
    let (m, _col) = model(ModelConfig::new("Item").sort(["-n"]));
    m.collection().insert(doc! { "n": 1 }, Default::default()).unwrap();
    m.collection().insert(doc! { "n": 2 }, Default::default()).unwrap();
    let mut cursor = m.all().unwrap();
    assert_eq!(cursor.sort_keys(), &[SortKey::new("n", Direction::Descending)]);
    assert_eq!(cursor.first().unwrap().and_then(|d| d.get_i32("n").ok()), Some(2));
}
