//! Error taxonomy for the extract-and-load pipeline.
//!
//! Every variant is fatal at this layer. Errors carry enough context
//! (operation, offending id, counts so far, underlying cause) for the
//! caller to log and abort, or to re-run the whole pipeline.

use std::fmt;

/// Boxed underlying cause carried by every [`EtlError`] variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The per-record operation that failed during a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Exists,
    Insert,
}

impl fmt::Display for LoadOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadOp::Exists => write!(f, "existence check"),
            LoadOp::Insert => write!(f, "insert"),
        }
    }
}

/// Errors produced by the extractor, the loader and connection setup.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// Cannot establish a session to the source or destination.
    #[error("connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: BoxError,
    },

    /// Query submission, page fetch or row decoding failed.
    ///
    /// `delivered` records were already handed to the caller and stay valid.
    #[error("extraction failed while {context} after {delivered} records: {source}")]
    Extraction {
        context: String,
        delivered: u64,
        #[source]
        source: BoxError,
    },

    /// Listing existing tables or creating the destination table failed.
    #[error("schema bootstrap for table '{table}' failed: {source}")]
    Schema {
        table: String,
        #[source]
        source: BoxError,
    },

    /// The existence check or insert for one record failed.
    #[error(
        "load aborted on {op} for id {id} ({inserted} inserted, {processed} processed): {source}"
    )]
    Load {
        op: LoadOp,
        id: i64,
        processed: u64,
        inserted: u64,
        #[source]
        source: BoxError,
    },
}

impl EtlError {
    pub fn connection(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        EtlError::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    pub fn extraction(
        context: impl Into<String>,
        delivered: u64,
        source: impl Into<BoxError>,
    ) -> Self {
        EtlError::Extraction {
            context: context.into(),
            delivered,
            source: source.into(),
        }
    }

    pub fn schema(table: impl Into<String>, source: impl Into<BoxError>) -> Self {
        EtlError::Schema {
            table: table.into(),
            source: source.into(),
        }
    }

    /// Short name of the failure class, as used in logs and the CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            EtlError::Connection { .. } => "ConnectionFailure",
            EtlError::Extraction { .. } => "ExtractionFailure",
            EtlError::Schema { .. } => "SchemaFailure",
            EtlError::Load { .. } => "LoadFailure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn load_error_names_op_and_id() {
        let err = EtlError::Load {
            op: LoadOp::Insert,
            id: 42,
            processed: 7,
            inserted: 5,
            source: "duplicate key".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("insert"), "got: {msg}");
        assert!(msg.contains("id 42"), "got: {msg}");
        assert!(msg.contains("5 inserted"), "got: {msg}");
        assert_eq!(err.kind(), "LoadFailure");
    }

    #[test]
    fn extraction_error_keeps_cause() {
        let err = EtlError::extraction("fetching page", 10_000, "connection reset");
        assert_eq!(err.kind(), "ExtractionFailure");
        assert_eq!(err.source().unwrap().to_string(), "connection reset");
    }

    #[test]
    fn anyhow_cause_converts() {
        let cause = anyhow::anyhow!("no such table: posts");
        let err = EtlError::schema("posts", cause);
        assert!(err.to_string().contains("no such table"));
    }
}
