use bson::{Bson, Document, doc};
use docmap::driver::{Collection, Database, FindSpec};
use docmap::types::{Direction, SortKey, WriteOptions};
use docmap::{MemoryCollection, MemoryDatabase, OdmError};

fn opts() -> WriteOptions {
    WriteOptions::default()
}

fn collection() -> MemoryCollection {
    let c = MemoryCollection::new("things");
    for d in [
        doc! { "_id": 1, "n": 1, "tags": ["a", "b"], "sub": { "k": 1 } },
        doc! { "_id": 2, "n": 2, "tags": ["b"], "items": [{ "q": 1 }, { "q": 5 }] },
        doc! { "_id": 3, "n": 3, "name": "c" },
    ] {
        c.insert(d, opts()).unwrap();
    }
    c
}

fn ids(c: &MemoryCollection, filter: Document) -> Vec<i32> {
    let mut spec = FindSpec::new(filter);
    spec.sort = vec![SortKey::new("_id", Direction::Ascending)];
    c.find(&spec).unwrap().map(|d| d.unwrap().get_i32("_id").unwrap()).collect()
}

#[test]
fn query_operators() {
    let c = collection();
    assert_eq!(ids(&c, doc! { "tags": "b" }), vec![1, 2]);
    assert_eq!(ids(&c, doc! { "tags": { "$all": ["a", "b"] } }), vec![1]);
    assert_eq!(ids(&c, doc! { "tags": { "$size": 1 } }), vec![2]);
    assert_eq!(ids(&c, doc! { "name": { "$exists": false } }), vec![1, 2]);
    assert_eq!(ids(&c, doc! { "n": { "$in": [1, 3] } }), vec![1, 3]);
    assert_eq!(ids(&c, doc! { "n": { "$nin": [1, 3] } }), vec![2]);
    assert_eq!(ids(&c, doc! { "n": { "$not": { "$gt": 1 } } }), vec![1]);
    assert_eq!(ids(&c, doc! { "items": { "$elemMatch": { "q": { "$gt": 2 } } } }), vec![2]);
    assert_eq!(ids(&c, doc! { "sub.k": 1 }), vec![1]);
    assert_eq!(ids(&c, doc! { "$nor": [{ "n": 1 }, { "n": 2 }] }), vec![3]);
    assert_eq!(ids(&c, doc! { "$or": [{ "n": 1 }, { "name": "c" }] }), vec![1, 3]);
}

#[test]
fn orderings_do_not_cross_types() {
    let c = MemoryCollection::new("mixed");
    c.insert(doc! { "_id": 1, "v": "10" }, opts()).unwrap();
    c.insert(doc! { "_id": 2, "v": 10 }, opts()).unwrap();
    assert_eq!(ids(&c, doc! { "v": { "$gt": 5 } }), vec![2]);
}

#[test]
fn sort_limit_skip_and_count() {
    let c = collection();
    let mut spec = FindSpec::new(doc! {});
    spec.sort = vec![SortKey::new("n", Direction::Descending)];
    spec.skip = Some(1);
    spec.limit = Some(1);
    let got: Vec<_> = c.find(&spec).unwrap().map(|d| d.unwrap().get_i32("n").unwrap()).collect();
    assert_eq!(got, vec![2]);
    assert_eq!(c.count(&doc! {}, None, None).unwrap(), 3);
    assert_eq!(c.count(&doc! {}, Some(2), Some(2)).unwrap(), 1);
}

#[test]
fn duplicate_ids_are_rejected() {
    let c = collection();
    assert!(matches!(c.insert(doc! { "_id": 1 }, opts()), Err(OdmError::QueryExecution(_))));
    let generated = c.insert(doc! { "x": 1 }, opts()).unwrap();
    assert!(matches!(generated, Bson::ObjectId(_)));
}

#[test]
fn updates_and_upserts() {
    let c = collection();
    let out = c.update(&doc! { "_id": 1 }, &doc! { "$inc": { "n": 2 }, "$push": { "tags": "c" } }, opts()).unwrap();
    assert_eq!((out.matched, out.modified), (1, 1));
    let d = c.find_one(&doc! { "_id": 1 }).unwrap().unwrap();
    assert_eq!(d.get_i32("n").unwrap(), 3);
    assert_eq!(d.get_array("tags").unwrap().len(), 3);

    let none = c.update(&doc! { "_id": 99 }, &doc! { "$set": { "a": 1 } }, opts()).unwrap();
    assert_eq!(none.matched, 0);
    assert!(none.upserted_id.is_none());

    let up = c
        .update(&doc! { "_id": 99, "n": { "$gt": 1 } }, &doc! { "$set": { "a": 1 } }, opts().upsert(true))
        .unwrap();
    assert_eq!(up.upserted_id, Some(Bson::Int32(99)));
    assert_eq!(c.find_one(&doc! { "_id": 99 }).unwrap().unwrap(), doc! { "_id": 99, "a": 1 });
}

#[test]
fn replacement_keeps_the_id() {
    let c = collection();
    c.update(&doc! { "_id": 3 }, &doc! { "fresh": true }, opts()).unwrap();
    assert_eq!(c.find_one(&doc! { "_id": 3 }).unwrap().unwrap(), doc! { "_id": 3, "fresh": true });
}

#[test]
fn remove_deletes_every_match() {
    let c = collection();
    let out = c.remove(&doc! { "tags": "b" }, opts()).unwrap();
    assert_eq!(out.deleted, 2);
    assert_eq!(c.len(), 1);
}

#[test]
fn database_hands_out_shared_collections() {
    let db = MemoryDatabase::new("db");
    let a = db.collection("users").unwrap();
    a.insert(doc! { "_id": 1 }, opts()).unwrap();
    let b = db.collection("users").unwrap();
    assert_eq!(b.count(&doc! {}, None, None).unwrap(), 1);
    assert_eq!(db.collection_names(), vec!["users".to_string()]);
    assert_eq!(db.memory_collection("users").len(), 1);
}
