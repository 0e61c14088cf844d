//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings.

use chrono::{DateTime, Utc};
use rolo_core::contact::Contact;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Search ──────────────────────────────────────────────────────────────────

/// Turn free search text into a lower-cased `LIKE … ESCAPE '\'` substring
/// pattern, so `%` and `_` typed by the user match literally. Compare it
/// against `fold_case(column)`.
pub fn like_pattern(search: &str) -> String {
  let search = search.to_lowercase();
  let mut escaped = String::with_capacity(search.len() + 2);
  escaped.push('%');
  for c in search.chars() {
    if matches!(c, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching the field order of [`RawContact::from_row`].
pub const CONTACT_COLUMNS: &str =
  "id, first_name, last_name, email, phone, company, created_at, updated_at";

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub id:         i64,
  pub first_name: String,
  pub last_name:  String,
  pub email:      String,
  pub phone:      Option<String>,
  pub company:    Option<String>,
  pub created_at: String,
  pub updated_at: String,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      first_name: row.get(1)?,
      last_name:  row.get(2)?,
      email:      row.get(3)?,
      phone:      row.get(4)?,
      company:    row.get(5)?,
      created_at: row.get(6)?,
      updated_at: row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      id:         self.id,
      first_name: self.first_name,
      last_name:  self.last_name,
      email:      self.email,
      phone:      self.phone,
      company:    self.company,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
