//! Core data model moved end to end by the pipeline.
//!
//! A [`Record`] is created by the extractor once per source row, consumed
//! once by the loader, and never mutated in between.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Substituted for null text fields coming out of the source.
pub const PLACEHOLDER: &str = "None";

/// One Hacker News item, keyed by its source-assigned `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Globally unique identity; the only dedup key.
    pub id: i64,
    pub title: String,
    pub url: String,
    pub score: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// The source `type` column (`story`, `comment`, `job`, ...).
    #[serde(rename = "type")]
    pub kind: String,
}

/// Replace a missing text value with [`PLACEHOLDER`].
pub fn or_placeholder(value: Option<String>) -> String {
    value.unwrap_or_else(|| PLACEHOLDER.to_string())
}
