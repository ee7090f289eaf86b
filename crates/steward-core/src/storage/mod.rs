pub mod models;
mod queries;
mod sqlite;

pub use sqlite::Database;

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-precision RFC 3339 in UTC, so stored timestamps sort as text.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn timestamp_now() -> String {
    timestamp(Utc::now())
}
