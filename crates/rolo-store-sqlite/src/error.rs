//! Error type for `rolo-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] rolo_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl From<Error> for rolo_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      other => rolo_core::Error::Backend(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
