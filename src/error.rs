use std::io;
use thiserror::Error;

/// type alias for all operations on a [`Database`] that could fail with a [`DbError`]
///
/// [`Database`]: crate::Database
pub type Result<T> = std::result::Result<T, DbError>;

/// Error variants used throughout the store.
/// It wraps any lower level errors from third party crates
#[derive(Error)]
pub enum DbError {
    /// variant for errors caused by std::io
    #[error("IO error")]
    Io {
        /// source of the IO Error
        #[from]
        source: io::Error,
    },

    /// variant for errors when a key was not found in the store
    #[error("data not found")]
    NotFound,

    /// a set/add/delete was issued with an empty key
    #[error("key cannot be empty")]
    EmptyKey,

    /// a dotted path ran into an intermediate segment that is not a JSON object
    #[error("path segment '{}' exists but is not an object", .0)]
    PathConflict(String),

    /// variant for errors caused during JSON serialization/deserialization
    #[error("serialization/deserialization error")]
    Json(#[from] serde_json::Error),

    /// variant for errors caused while encoding a document as BSON
    #[error("BSON encode error")]
    BsonEncode(#[from] bson::ser::Error),

    /// variant for errors caused while decoding a BSON document
    #[error("BSON decode error")]
    BsonDecode(#[from] bson::de::Error),

    /// a request envelope was missing a field or carried an ill-typed one
    #[error("{}", .0)]
    InvalidRequest(String),

    /// variant for errors when parsing strings to some other type
    #[error("{}", .0)]
    Parsing(String),

    /// catch-all variant for reporting error message strings to clients
    #[error("{}", .0)]
    StringErr(String),
}

/// a custom Debug implementation that will write the entire error chain
impl std::fmt::Debug for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

/// writes the entire error chain of the given error `e`, to the formatter.
fn error_chain_fmt(
    e: &impl std::error::Error,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    writeln!(f, "{}\n", e)?;
    let mut current = e.source();
    while let Some(cause) = current {
        writeln!(f, "Caused by: {}", cause)?;
        current = cause.source();
    }
    Ok(())
}
