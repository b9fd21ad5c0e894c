//! Fault taxonomy for fixture collection, serialization, and replay.
//!
//! Non-fatal traversal problems (broken relationships, dangling references)
//! are not errors: they land in `CollectionStats` warnings and the branch is
//! skipped. Everything here is fatal and leaves no partial side effect.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Contradictory or invalid configuration, raised at configuration time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An unexempted cycle in the type-level insert-order graph.
    #[error("circular dependency between types: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    /// A value producer failed for one attribute of one record.
    #[error("failed to anonymize {entity}.{attribute}: {reason}")]
    Anonymization {
        entity: String,
        attribute: String,
        reason: String,
    },

    /// A value could not be encoded as a literal for its declared column type.
    #[error("cannot encode value for column {column}: {reason}")]
    Encode { column: String, reason: String },

    /// Missing dump file, or a dump file could not be written.
    #[error("dump file error for {}: {reason}", path.display())]
    DumpFile { path: PathBuf, reason: String },

    /// A statement failed during replay; the transaction was rolled back.
    /// Carries the full statement text; the display form truncates it.
    #[error("statement failed during replay: {reason}\nstatement was:\n{}", elide(statement))]
    Statement { statement: String, reason: String },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

/// Display-time cap on statement text in messages. The fault itself keeps
/// the whole statement.
fn elide(statement: &str) -> String {
    const LIMIT: usize = 500;
    if statement.len() <= LIMIT {
        return statement.to_string();
    }
    let mut cut = LIMIT;
    while !statement.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... ({} bytes total)", &statement[..cut], statement.len())
}
