// Keyword and update translation
pub mod geo;
pub mod operators;

mod args;
mod builder;
mod cursor;
mod field_map;
mod q;
mod update;

pub use args::{FieldValue, Fields};
pub use builder::{LOGICAL_KEYS, ParsedKeyword, Query, QueryBuilder, coerce_object_id, is_operator_document};
pub use cursor::QuerySet;
pub use field_map::{FieldMap, SEPARATOR, split_keyword};
pub use geo::{GeoExpr, Point};
pub use q::Q;
pub use update::{UpdateBuilder, UpdateExpr, UpdateOp};
