mod auth;
mod chat;
mod profile;

pub use auth::*;
pub use chat::*;
pub use profile::*;

use serde::Deserialize;

/// Upstream payloads arrive either bare or wrapped in `{"data": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Payload<T> {
    pub fn into_inner(self) -> T {
        match self {
            Payload::Wrapped { data } => data,
            Payload::Bare(inner) => inner,
        }
    }
}

/// Render an upstream RFC 3339 timestamp as `YYYY-MM-DD HH:MM` (UTC).
/// Unparseable input is returned unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => ts
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d %H:%M")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
