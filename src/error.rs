//! Error types for parsing, ingest, and database access.

use thiserror::Error;

//-----------------------------------------------------------------------------

/// A `Result` whose error type is [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The errors that can occur while parsing annotation files or building and
/// querying a database.
///
/// Line numbers are 1-based positions in the input file, counting every
/// physical line. For in-memory feature streams, they are ordinals in the
/// stream. Errors raised by code that does not know the line number use 0;
/// the ingest pipeline fills in the real number before the error surfaces.
#[derive(Error, Debug)]
pub enum Error {
    /// A line that does not have the structure of a GFF/GTF record.
    #[error("malformed line {line}: {reason}")]
    MalformedLine {
        /// Line number in the input.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// A start or end field that is present but not a valid coordinate.
    #[error("invalid coordinate {token:?} on line {line}")]
    Coordinate {
        /// Line number in the input.
        line: usize,
        /// The offending field.
        token: String,
    },

    /// An attribute token without a key/value separator in a dialect that
    /// requires one.
    #[error("invalid attribute token {token:?} on line {line}")]
    InvalidAttributeToken {
        /// Line number in the input.
        line: usize,
        /// The offending token.
        token: String,
    },

    /// Two features resolved to the same primary key under the `error`
    /// merge strategy.
    #[error("duplicate id {0:?}")]
    DuplicateId(String),

    /// Two features with the same primary key could not be merged because
    /// their non-attribute fields differ.
    #[error("cannot merge duplicate id {id:?} on line {line}: non-attribute fields differ")]
    MergeConflict {
        /// The colliding primary key.
        id: String,
        /// Line number of the feature that could not be merged.
        line: usize,
    },

    /// The input did not contain any features.
    #[error("no features found in the input")]
    EmptyInput,

    /// Dialect inference was requested but no line had an inferable
    /// attribute column.
    #[error("could not infer an attribute dialect from the input")]
    UnknownDialect,

    /// The ingest was cancelled through [`crate::IngestParams::cancel`].
    #[error("the ingest was cancelled")]
    Cancelled,

    /// Invalid arguments or input that is not covered by the other variants.
    #[error("{0}")]
    InvalidInput(String),

    /// An I/O error from the input.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An HTTP error from a remote input.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// A database error.
    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    /// A serialization error in the attribute or dialect columns.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    // Fills in the line number on variants that carry one, if it is not
    // known yet. Parsing code below the line reader reports line 0.
    pub(crate) fn at_line(self, line_number: usize) -> Error {
        match self {
            Error::MalformedLine { line: 0, reason } => Error::MalformedLine { line: line_number, reason },
            Error::Coordinate { line: 0, token } => Error::Coordinate { line: line_number, token },
            Error::InvalidAttributeToken { line: 0, token } => {
                Error::InvalidAttributeToken { line: line_number, token }
            }
            Error::MergeConflict { id, line: 0 } => Error::MergeConflict { id, line: line_number },
            _ => self,
        }
    }
}

//-----------------------------------------------------------------------------
