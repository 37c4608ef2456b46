use serde::{Deserialize, Serialize};

use crate::connection::DEFAULT_ALIAS;
use crate::query::FieldMap;
use crate::types::{ID_KEY, WriteConcern, WriteOptions};

/// Per-model options: where documents live and how attributes map to keys.
///
/// Deserializes from a `[models.<name>]` TOML table; every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(skip)]
    pub name: String,
    /// Defaults to the lowercase model name plus `s`.
    pub collection: Option<String>,
    /// Connection alias.
    pub database: String,
    pub field_map: FieldMap,
    /// Adds `id → _id` unless `id` is already mapped.
    pub map_id: bool,
    /// Maintains `created` / `modified` on save.
    pub auto_timestamp: bool,
    pub write_concern: i32,
    /// Default sort for `find()`, with `-` marking descending fields.
    pub sort: Vec<String>,
    pub required_fields: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            collection: None,
            database: DEFAULT_ALIAS.to_string(),
            field_map: FieldMap::new(),
            map_id: true,
            auto_timestamp: true,
            write_concern: WriteConcern::ACKNOWLEDGED.0,
            sort: Vec::new(),
            required_fields: Vec::new(),
        }
    }
}

impl ModelConfig {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn field(mut self, attribute: impl Into<String>, key: impl Into<String>) -> Self {
        self.field_map.insert(attribute, key);
        self
    }

    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn database(mut self, alias: impl Into<String>) -> Self {
        self.database = alias.into();
        self
    }

    #[must_use]
    pub const fn map_id(mut self, map_id: bool) -> Self {
        self.map_id = map_id;
        self
    }

    #[must_use]
    pub const fn auto_timestamp(mut self, on: bool) -> Self {
        self.auto_timestamp = on;
        self
    }

    #[must_use]
    pub const fn write_concern(mut self, w: i32) -> Self {
        self.write_concern = w;
        self
    }

    #[must_use]
    pub fn sort<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.sort = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn required<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.required_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn collection_name(&self) -> String {
        self.collection.clone().unwrap_or_else(|| format!("{}s", self.name.to_lowercase()))
    }

    /// The configured map plus `id → _id` when `map_id` is set.
    #[must_use]
    pub fn effective_field_map(&self) -> FieldMap {
        let mut map = self.field_map.clone();
        if self.map_id && !map.contains("id") {
            map.insert("id", ID_KEY);
        }
        map
    }

    #[must_use]
    pub const fn write_options(&self) -> WriteOptions {
        WriteOptions::with_concern(WriteConcern(self.write_concern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ModelConfig::new("User");
        assert_eq!(c.collection_name(), "users");
        assert_eq!(c.database, "default");
        assert_eq!(c.effective_field_map().get("id"), Some("_id"));
        assert!(c.auto_timestamp);
        assert_eq!(c.write_options().write_concern, WriteConcern::ACKNOWLEDGED);
    }

    #[test]
    fn map_id_can_be_disabled_or_overridden() {
        assert!(ModelConfig::new("a").map_id(false).effective_field_map().is_empty());
        let c = ModelConfig::new("a").field("id", "legacy_id");
        assert_eq!(c.effective_field_map().get("id"), Some("legacy_id"));
    }
}
