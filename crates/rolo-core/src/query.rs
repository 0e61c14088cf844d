//! List query parameters and the result types returned for them.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, contact::Contact};

/// Page size used by clients when none is given.
pub const DEFAULT_LIMIT: u32 = 50;
/// Largest page a store will return.
pub const MAX_LIMIT: u32 = 100;

// ─── Query ───────────────────────────────────────────────────────────────────

/// Parameters for [`ContactStore::list`](crate::store::ContactStore::list).
///
/// Also serves as the cache key on the client: two queries address the same
/// cached page exactly when they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactQuery {
  /// Case-insensitive substring matched against first name, last name, email
  /// and company. `None` lists everything.
  pub search: Option<String>,
  pub limit:  u32,
  pub offset: u32,
}

impl Default for ContactQuery {
  fn default() -> Self {
    Self { search: None, limit: DEFAULT_LIMIT, offset: 0 }
  }
}

impl ContactQuery {
  /// Build a query, treating blank search text as no search.
  pub fn new(search: Option<&str>, limit: u32, offset: u32) -> Self {
    let search = search
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .map(str::to_owned);
    Self { search, limit, offset }
  }

  pub fn validate(&self) -> Result<()> {
    if self.limit == 0 || self.limit > MAX_LIMIT {
      return Err(Error::Validation(format!(
        "limit must be between 1 and {MAX_LIMIT}, got {}",
        self.limit
      )));
    }
    Ok(())
  }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// One page of a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactPage {
  /// Ordered by last name, then first name, then id.
  pub contacts:          Vec<Contact>,
  /// Number of contacts matching the query across all pages.
  pub total_count:       u64,
  pub has_next_page:     bool,
  pub has_previous_page: bool,
}

impl ContactPage {
  /// Assemble a page, deriving the paging flags from `query`.
  pub fn new(contacts: Vec<Contact>, total_count: u64, query: &ContactQuery) -> Self {
    Self {
      contacts,
      total_count,
      has_next_page: u64::from(query.offset) + u64::from(query.limit) < total_count,
      has_previous_page: query.offset > 0,
    }
  }

  pub fn contains(&self, id: crate::contact::ContactId) -> bool {
    self.contacts.iter().any(|c| c.id == id)
  }
}

/// Aggregate counts over every stored contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContactStats {
  pub total_contacts:           u64,
  pub contacts_with_phone:      u64,
  pub contacts_with_company:    u64,
  pub contacts_without_phone:   u64,
  pub contacts_without_company: u64,
}

impl ContactStats {
  pub fn from_counts(total: u64, with_phone: u64, with_company: u64) -> Self {
    Self {
      total_contacts:           total,
      contacts_with_phone:      with_phone,
      contacts_with_company:    with_company,
      contacts_without_phone:   total.saturating_sub(with_phone),
      contacts_without_company: total.saturating_sub(with_company),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn blank_search_is_no_search() {
    assert_eq!(ContactQuery::new(Some("   "), 50, 0), ContactQuery::default());
    assert_eq!(ContactQuery::new(Some(" jo "), 10, 0).search.as_deref(), Some("jo"));
  }

  #[test]
  fn limit_bounds() {
    assert!(ContactQuery::new(None, 0, 0).validate().is_err());
    assert!(ContactQuery::new(None, 1, 0).validate().is_ok());
    assert!(ContactQuery::new(None, 100, 0).validate().is_ok());
    assert!(ContactQuery::new(None, 101, 0).validate().is_err());
  }

  #[test]
  fn paging_flags() {
    let first = ContactPage::new(vec![], 25, &ContactQuery::new(None, 10, 0));
    assert!(first.has_next_page);
    assert!(!first.has_previous_page);

    let last = ContactPage::new(vec![], 25, &ContactQuery::new(None, 10, 20));
    assert!(!last.has_next_page);
    assert!(last.has_previous_page);

    let exact = ContactPage::new(vec![], 20, &ContactQuery::new(None, 10, 10));
    assert!(!exact.has_next_page);
  }

  #[test]
  fn stats_derive_the_complements() {
    let stats = ContactStats::from_counts(10, 4, 7);
    assert_eq!(stats.contacts_without_phone, 6);
    assert_eq!(stats.contacts_without_company, 3);
  }
}
