//! Error type for `terrace-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] terrace_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// Raised inside a transaction body on the connection thread.
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held a value the domain types cannot represent.
  #[error("corrupt {column} value: {value:?}")]
  Corrupt { column: &'static str, value: String },
}

impl Error {
  /// Whether the failure came from a SQLite constraint (UNIQUE, CHECK,
  /// FOREIGN KEY or an aborting trigger).
  pub fn is_constraint_violation(&self) -> bool {
    let failure = match self {
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) | Self::Sqlite(e) => e,
      _ => return false,
    };
    matches!(
      failure,
      rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
