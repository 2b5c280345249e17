use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ValidationError / ValidationErrors
// ---------------------------------------------------------------------------

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub expected: String,
    pub received: String,
}

impl ValidationError {
    pub fn new(
        path: impl Into<String>,
        expected: impl Into<String>,
        received: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            expected: expected.into(),
            received: received.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"Validation failed at "{}": expected {}, received {}"#,
            self.path, self.expected, self.received
        )
    }
}

impl std::error::Error for ValidationError {}

/// A collection of one or more `ValidationError`s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn single(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validation failed:")?;
        for e in &self.0 {
            write!(f, "\n  - {}: expected {}, received {}", e.path, e.expected, e.received)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("Unknown field \"{field}\" in query against collection \"{collection}\"")]
    UnknownField { collection: String, field: String },

    #[error("Malformed query: {0}")]
    Malformed(String),
}

// ---------------------------------------------------------------------------
// CollectionError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    #[error("Duplicate key on \"{field}\" in collection \"{collection}\": {value} already exists")]
    DuplicateKey {
        collection: String,
        field: String,
        value: serde_json::Value,
    },

    #[error("Document not found: {collection}/{key}")]
    NotFound { collection: String, key: String },

    #[error("Expected exactly one match in collection \"{collection}\", found {matches}")]
    AmbiguousResult { collection: String, matches: usize },

    #[error("Cannot modify read-only field \"{field}\" in collection \"{collection}\"")]
    ReadOnlyField { collection: String, field: String },

    #[error("Store backing collection \"{0}\" has been dropped")]
    StoreClosed(String),
}

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend rejected operation on \"{table}\": {message}")]
    Backend { table: String, message: String },

    #[error("Storage quota exceeded while writing \"{table}\"")]
    QuotaExceeded { table: String },

    #[error("Storage backend unreachable: {0}")]
    Unreachable(String),

    #[error("Storage corruption in {table}/{key}: stored data is not a document")]
    Corruption {
        table: String,
        key: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// PersistError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("A persist or restore is already in flight for collection \"{0}\"")]
    ConcurrentOperation(String),

    #[error("Collection \"{0}\" is not registered in the store")]
    NotRegistered(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No {0} handler configured for this descriptor")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

// ---------------------------------------------------------------------------
// ShelfError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ShelfError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

impl From<ValidationError> for ShelfError {
    fn from(e: ValidationError) -> Self {
        ShelfError::Validation(ValidationErrors::single(e))
    }
}

impl ShelfError {
    /// True for `CollectionError::DuplicateKey`.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, ShelfError::Collection(CollectionError::DuplicateKey { .. }))
    }

    /// True for `CollectionError::NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ShelfError::Collection(CollectionError::NotFound { .. }))
    }

    /// True for `CollectionError::AmbiguousResult`.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ShelfError::Collection(CollectionError::AmbiguousResult { .. }))
    }
}

/// Convenience alias — the default error type is `ShelfError`.
pub type Result<T, E = ShelfError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
