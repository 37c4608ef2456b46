use thiserror::Error;

#[derive(Debug, Error)]
pub enum OdmError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid value for operator `{operator}`: {reason}")]
    InvalidOperatorValue { operator: String, reason: String },

    #[error("Ambiguous keyword `{0}`: it names a mapped field and ends with an operator token")]
    AmbiguousKeyword(String),

    #[error("Malformed keyword: {0:?}")]
    MalformedKeyword(String),

    #[error("Duplicate condition for key `{0}`")]
    DuplicateCondition(String),

    #[error("Conflicting update for key `{0}`")]
    ConflictingUpdate(String),

    #[error("No document found: {0}")]
    NoDocumentFound(String),

    #[error("get() returned more than one `{model}`; it returned {count}")]
    MultipleDocumentsFound { model: String, count: u64 },

    #[error("Database unavailable: {0}")]
    DatabaseUnavailable(String),

    #[error("Query execution error: {0}")]
    QueryExecution(String),

    #[error("Cursor is unusable after a failed materialization")]
    CursorFailed,

    #[error("No database registered for alias `{0}`")]
    ConnectionNotFound(String),

    #[error("The `{0}` record cannot be written because its id has not been set")]
    MissingId(String),

    #[error("No fields have been specified")]
    NoFields,

    #[error("Record does not have field `{0}`")]
    MissingField(String),

    #[error("Required field `{0}` is missing")]
    MissingRequiredField(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),
}

impl OdmError {
    pub(crate) fn invalid_value(operator: &str, reason: impl Into<String>) -> Self {
        Self::InvalidOperatorValue { operator: operator.to_string(), reason: reason.into() }
    }

    /// Whether the error was raised while translating an expression, before any driver call.
    #[must_use]
    pub const fn is_translation_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownOperator(_)
                | Self::InvalidOperatorValue { .. }
                | Self::AmbiguousKeyword(_)
                | Self::MalformedKeyword(_)
                | Self::DuplicateCondition(_)
                | Self::ConflictingUpdate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OdmError>;
