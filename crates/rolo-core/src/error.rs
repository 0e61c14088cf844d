//! Error taxonomy shared by every Rolo crate.

use thiserror::Error;
use validator::ValidationErrors;

use crate::contact::ContactId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  /// Input failed schema validation before reaching the store.
  #[error("validation failed: {0}")]
  Validation(String),

  #[error("a contact with email {0:?} already exists")]
  DuplicateEmail(String),

  #[error("contact {0} not found")]
  ContactNotFound(ContactId),

  /// The store or the server behind it failed.
  #[error("backend error: {0}")]
  Backend(String),

  /// The request never produced a usable response (connection, timeout,
  /// undecodable body).
  #[error("transport error: {0}")]
  Transport(String),
}

/// Coarse classification of an [`Error`], used on the wire and in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Validation,
  Conflict,
  NotFound,
  Backend,
  Transport,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::DuplicateEmail(_) => ErrorKind::Conflict,
      Self::ContactNotFound(_) => ErrorKind::NotFound,
      Self::Backend(_) => ErrorKind::Backend,
      Self::Transport(_) => ErrorKind::Transport,
    }
  }
}

impl From<ValidationErrors> for Error {
  fn from(errors: ValidationErrors) -> Self {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let messages: Vec<String> = fields
      .into_iter()
      .flat_map(|(field, errs)| {
        errs.iter().map(move |e| {
          e.message
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| format!("{field} is invalid"))
        })
      })
      .collect();

    Self::Validation(messages.join("; "))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
