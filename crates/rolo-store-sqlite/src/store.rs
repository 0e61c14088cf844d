//! [`SqliteStore`], the SQLite implementation of [`ContactStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use rolo_core::{
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};

use crate::{
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, like_pattern},
  schema::{SCHEMA, register_functions},
  Result,
};

/// Shared `WHERE` clause for list and count queries; `?1` is the lower-cased
/// `LIKE` pattern or `NULL` for no search.
const SEARCH_FILTER: &str = r"?1 IS NULL
  OR fold_case(first_name) LIKE ?1 ESCAPE '\'
  OR fold_case(last_name)  LIKE ?1 ESCAPE '\'
  OR fold_case(email)      LIKE ?1 ESCAPE '\'
  OR fold_case(company)    LIKE ?1 ESCAPE '\'";

/// Result of an insert or update, decided inside the connection closure.
enum WriteOutcome {
  Written(RawContact),
  DuplicateEmail,
  NotFound(ContactId),
}

impl WriteOutcome {
  fn into_contact(self, email: String) -> Result<Contact> {
    match self {
      Self::Written(raw) => raw.into_contact(),
      Self::DuplicateEmail => Err(rolo_core::Error::DuplicateEmail(email).into()),
      Self::NotFound(id) => Err(rolo_core::Error::ContactNotFound(id).into()),
    }
  }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Rolo contact store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        register_functions(conn)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for SqliteStore {
  type Error = crate::Error;

  async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    query.validate()?;

    let pattern = query.search.as_deref().map(like_pattern);
    let limit   = i64::from(query.limit);
    let offset  = i64::from(query.offset);

    let (raws, total): (Vec<RawContact>, i64) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM contacts WHERE {SEARCH_FILTER}"),
          rusqlite::params![pattern],
          |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTACT_COLUMNS}
           FROM contacts
           WHERE {SEARCH_FILTER}
           ORDER BY fold_case(last_name), fold_case(first_name), id
           LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![pattern, limit, offset],
            RawContact::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((rows, total))
      })
      .await?;

    let contacts = raws
      .into_iter()
      .map(RawContact::into_contact)
      .collect::<Result<Vec<_>>>()?;

    Ok(ContactPage::new(contacts, total as u64, query))
  }

  async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
            rusqlite::params![id],
            RawContact::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawContact::into_contact).transpose()
  }

  async fn create(&self, input: ContactInput) -> Result<Contact> {
    let input = input.validated()?;
    let email = input.email.clone();
    let now   = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let inserted = conn.query_row(
          &format!(
            "INSERT INTO contacts
               (first_name, last_name, email, phone, company, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             RETURNING {CONTACT_COLUMNS}"
          ),
          rusqlite::params![
            input.first_name,
            input.last_name,
            input.email,
            input.phone,
            input.company,
            now,
          ],
          RawContact::from_row,
        );

        match inserted {
          Ok(raw) => Ok(WriteOutcome::Written(raw)),
          Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::DuplicateEmail),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    outcome.into_contact(email)
  }

  async fn update(&self, id: ContactId, input: ContactInput) -> Result<Contact> {
    let input = input.validated()?;
    let email = input.email.clone();
    let now   = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let updated = conn
          .query_row(
            &format!(
              "UPDATE contacts
               SET first_name = ?1, last_name = ?2, email = ?3,
                   phone = ?4, company = ?5, updated_at = ?6
               WHERE id = ?7
               RETURNING {CONTACT_COLUMNS}"
            ),
            rusqlite::params![
              input.first_name,
              input.last_name,
              input.email,
              input.phone,
              input.company,
              now,
              id,
            ],
            RawContact::from_row,
          )
          .optional();

        match updated {
          Ok(Some(raw)) => Ok(WriteOutcome::Written(raw)),
          Ok(None) => Ok(WriteOutcome::NotFound(id)),
          Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::DuplicateEmail),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    outcome.into_contact(email)
  }

  async fn delete(&self, id: ContactId) -> Result<()> {
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM contacts WHERE id = ?1", rusqlite::params![id])?)
      })
      .await?;

    if removed == 0 {
      return Err(rolo_core::Error::ContactNotFound(id).into());
    }
    Ok(())
  }

  async fn stats(&self) -> Result<ContactStats> {
    let (total, with_phone, with_company): (i64, i64, i64) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*), COUNT(phone), COUNT(company) FROM contacts",
          [],
          |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?)
      })
      .await?;

    Ok(ContactStats::from_counts(
      total as u64,
      with_phone as u64,
      with_company as u64,
    ))
  }
}
