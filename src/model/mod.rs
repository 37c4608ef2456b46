//! Models: configuration, records and the write operations on them.

mod core;
mod meta;
mod nested;
mod ops;
mod record;

pub use self::core::Model;
pub use meta::ModelConfig;
pub use nested::{get_nested_key, remove_nested_key, set_nested_key, update_nested_keys};
pub use ops::{CREATED_KEY, MODIFIED_KEY};
pub use record::Record;
