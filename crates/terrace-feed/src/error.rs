//! Error types for the terrace-feed decoders.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("payload is missing the `{0}` section")]
  MissingSection(&'static str),

  #[error("no event carries a deadline_time; cannot derive the season")]
  NoDeadline,

  #[error("invalid timestamp in {field}: {value}")]
  InvalidTimestamp { field: &'static str, value: String },

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
