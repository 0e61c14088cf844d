//! Contact records and the form input used to create or update them.

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::Result;

/// Store-assigned contact identifier. Speculative client-side records use
/// negative values, which a store never hands out.
pub type ContactId = i64;

/// Minimum number of characters in a phone number, excluding a leading `+`.
const PHONE_MIN_LENGTH: usize = 10;

// ─── Contact ─────────────────────────────────────────────────────────────────

/// An authoritative contact record as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub id:         ContactId,
  pub first_name: String,
  pub last_name:  String,
  /// Always lower-cased and trimmed.
  pub email:      String,
  pub phone:      Option<String>,
  pub company:    Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Contact {
  /// `"First Last"`, as shown in messages and listings.
  pub fn full_name(&self) -> String {
    format!("{} {}", self.first_name, self.last_name)
  }
}

// ─── ContactInput ────────────────────────────────────────────────────────────

/// Form data for creating or updating a contact.
///
/// Callers normally go through [`ContactInput::validated`], which trims every
/// field, lower-cases the email and turns blank optionals into `None` before
/// checking the field rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ContactInput {
  #[validate(length(
    min = 2,
    max = 100,
    message = "First name must be between 2 and 100 characters"
  ))]
  pub first_name: String,

  #[validate(length(
    min = 2,
    max = 100,
    message = "Last name must be between 2 and 100 characters"
  ))]
  pub last_name: String,

  #[validate(email(message = "Invalid email address"))]
  pub email: String,

  #[serde(default)]
  #[validate(custom(function = "validate_phone"))]
  pub phone: Option<String>,

  #[serde(default)]
  #[validate(length(
    min = 2,
    max = 100,
    message = "Company name must be between 2 and 100 characters"
  ))]
  pub company: Option<String>,
}

impl ContactInput {
  pub fn new(
    first_name: impl Into<String>,
    last_name: impl Into<String>,
    email: impl Into<String>,
  ) -> Self {
    Self {
      first_name: first_name.into(),
      last_name:  last_name.into(),
      email:      email.into(),
      phone:      None,
      company:    None,
    }
  }

  pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
    self.phone = Some(phone.into());
    self
  }

  pub fn with_company(mut self, company: impl Into<String>) -> Self {
    self.company = Some(company.into());
    self
  }

  /// Trim all fields, lower-case the email, drop blank optionals.
  pub fn normalized(self) -> Self {
    Self {
      first_name: self.first_name.trim().to_owned(),
      last_name:  self.last_name.trim().to_owned(),
      email:      self.email.trim().to_lowercase(),
      phone:      non_blank(self.phone),
      company:    non_blank(self.company),
    }
  }

  /// Normalise, then check every field rule.
  pub fn validated(self) -> Result<Self> {
    let input = self.normalized();
    input.validate()?;
    Ok(input)
  }
}

fn non_blank(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_owned())
    .filter(|v| !v.is_empty())
}

/// Accepts an optional leading `+` followed by at least ten digits, spaces,
/// hyphens or parentheses.
fn validate_phone(phone: &str) -> Result<(), ValidationError> {
  let body = phone.strip_prefix('+').unwrap_or(phone);
  let well_formed = body.chars().count() >= PHONE_MIN_LENGTH
    && body
      .chars()
      .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'));

  if well_formed {
    Ok(())
  } else {
    Err(
      ValidationError::new("phone")
        .with_message(Cow::Borrowed("Invalid phone number format")),
    )
  }
}
