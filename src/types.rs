pub use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

/// The literal key of the primary identifier in every stored document.
pub const ID_KEY: &str = "_id";

/// Prefix marking a descending sort field, as in `-email`.
pub const DESCENDING_MARKER: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// Native wire value: `1` ascending, `-1` descending.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub key: String,
    pub direction: Direction,
}

impl SortKey {
    #[must_use]
    pub fn new(key: impl Into<String>, direction: Direction) -> Self {
        Self { key: key.into(), direction }
    }

    /// Splits `-name` into `("name", Descending)` and `name` into `("name", Ascending)`.
    #[must_use]
    pub fn parse_marker(field: &str) -> (&str, Direction) {
        field
            .strip_prefix(DESCENDING_MARKER)
            .map_or((field, Direction::Ascending), |rest| (rest, Direction::Descending))
    }
}

/// Acknowledgment level requested for a write (`w`). `0` is fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern(pub i32);

impl WriteConcern {
    pub const UNACKNOWLEDGED: Self = Self(0);
    pub const ACKNOWLEDGED: Self = Self(1);

    #[must_use]
    pub const fn is_acknowledged(self) -> bool {
        self.0 > 0
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::ACKNOWLEDGED
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub write_concern: WriteConcern,
    pub upsert: bool,
}

impl WriteOptions {
    #[must_use]
    pub const fn with_concern(write_concern: WriteConcern) -> Self {
        Self { write_concern, upsert: false }
    }

    #[must_use]
    pub const fn upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: u64,
}
