//! Schema-driven tab-separated record decoder
//!
//! A dataset declares its record layout once as a [`Schema`]: an ordered
//! catalog of fields, each with a [`FieldKind`], an optional source column
//! name and a setter. The decoder reads the header line, resolves a
//! [`FieldMapping`] against the schema and then lazily decodes every following
//! line into a fresh record.
//!
//! # Mapping modes
//!
//! - **Bound**: at least one declared column name matches the header. Only
//!   bound columns populate fields; every other column is ignored.
//! - **Positional**: no binding matches. Column `i` populates field `i`.
//!
//! # Example
//!
//! ```rust
//! use imdb_ingest::decode::{Schema, TsvDecoder};
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct Movie {
//!     id: String,
//!     year: i64,
//! }
//!
//! let schema = Schema::<Movie>::builder()
//!     .text("id", "tconst", |m, v| m.id = v)
//!     .integer("year", "startYear", |m, v| m.year = v)
//!     .build()
//!     .unwrap();
//!
//! let input = "tconst\tstartYear\ntt0000001\t1894\n";
//! let decoder = TsvDecoder::new(Arc::new(schema)).with_empty_value("\\N");
//! let movies: Vec<Movie> = decoder
//!     .decode(input.as_bytes())
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! assert_eq!(movies[0].year, 1894);
//! ```

pub mod mapping;
pub mod reader;
pub mod row;
pub mod schema;
pub mod value;

pub use mapping::{FieldMapping, MappingMode};
pub use reader::{Records, TextNormalizer, TsvDecoder};
pub use row::{FieldDeclaration, Row};
pub use schema::{FieldSpec, Schema, SchemaBuilder};
pub use value::{FieldKind, FieldValue};

use thiserror::Error;

/// Column separator for every dataset file
pub const COLUMN_SEPARATOR: char = '\t';

/// Separator inside list-valued columns
pub const LIST_SEPARATOR: char = ',';

/// Schema declaration problems, raised before any row is read
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unsupported field kind '{0}'")]
    UnsupportedKind(String),

    #[error("Schema declares no fields")]
    EmptySchema,

    #[error("Field '{0}' is declared more than once")]
    DuplicateField(String),

    #[error("Column '{column}' is bound to both '{first}' and '{second}'")]
    DuplicateColumn {
        column: String,
        first: String,
        second: String,
    },

    #[error("Invalid field declaration '{0}', expected name:kind[:column]")]
    InvalidDeclaration(String),

    #[error("Batch size {batch_size} is invalid for {columns} columns (must be > 0 and bind at most 65535 parameters)")]
    InvalidBatchSize { batch_size: usize, columns: usize },
}

/// Failure to decode one line of a dataset stream
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Input has no header line")]
    MissingHeader,

    #[error("Line {line}: invalid {kind} value {value:?} for field '{field}': {reason}")]
    Malformed {
        line: usize,
        field: String,
        kind: FieldKind,
        value: String,
        reason: String,
    },

    #[error("Failed to read line {line}: {source}")]
    Read {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

impl DecodeError {
    /// Line number the error refers to (the header is line 1)
    pub fn line(&self) -> Option<usize> {
        match self {
            DecodeError::MissingHeader => None,
            DecodeError::Malformed { line, .. } | DecodeError::Read { line, .. } => Some(*line),
        }
    }
}
