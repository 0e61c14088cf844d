//! Keyed, in-memory cache of list and stats results.
//!
//! The cache never talks to the service. Callers fetch, then hand the result
//! back through [`CacheStore::complete_fetch`] together with the
//! [`FetchToken`] they were issued; responses whose token has been cancelled
//! in the meantime are dropped on the floor.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use rolo_core::query::{ContactPage, ContactQuery, ContactStats};

/// The cache as shared between the coordinator, the search controller and
/// in-flight mutations. The lock is never held across an `.await`.
pub type SharedCache = Arc<Mutex<CacheStore>>;

/// Lock the shared cache, ignoring poisoning: no cache operation can leave
/// the store half-written.
pub fn lock(cache: &SharedCache) -> MutexGuard<'_, CacheStore> {
  cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which entries an invalidation or cancellation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  /// Every list page and the stats.
  AllContacts,
  /// Every list page, stats untouched.
  AllLists,
  /// One list page.
  List(ContactQuery),
  Stats,
}

impl KeyPattern {
  fn matches_list(&self, key: &ContactQuery) -> bool {
    match self {
      Self::AllContacts | Self::AllLists => true,
      Self::List(k) => k == key,
      Self::Stats => false,
    }
  }

  fn matches_stats(&self) -> bool {
    matches!(self, Self::AllContacts | Self::Stats)
  }
}

/// Proof that a fetch was started; only the latest uncancelled token for a
/// key may write its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchToken(u64);

/// Keys that were fresh until [`CacheStore::invalidate`] marked them stale.
/// These are the entries a caller should refetch to bring the cache back up
/// to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invalidated {
  pub lists: Vec<ContactQuery>,
  pub stats: bool,
}

#[derive(Debug, Clone)]
struct Entry<T> {
  value:      T,
  stale:      bool,
  /// Changes on every write to this key, including going stale.
  generation: u64,
}

impl<T> Entry<T> {
  fn fresh(value: T, generation: u64) -> Self {
    Self { value, stale: false, generation }
  }

  fn get(&self) -> Option<&T> { (!self.stale).then_some(&self.value) }
}

/// The client session's cache. Create one per session with
/// [`CacheStore::shared`] and pass it to every component that needs it.
#[derive(Debug, Default)]
pub struct CacheStore {
  lists:        HashMap<ContactQuery, Entry<ContactPage>>,
  stats:        Option<Entry<ContactStats>>,
  list_fetches: HashMap<ContactQuery, u64>,
  stats_fetch:  Option<u64>,
  next_token:   u64,
  generation:   u64,
  /// The list key most recently read for display.
  watched:      Option<ContactQuery>,
}

impl CacheStore {
  pub fn new() -> Self { Self::default() }

  pub fn shared() -> SharedCache { Arc::new(Mutex::new(Self::new())) }

  // ── Reads ───────────────────────────────────────────────────────────────

  /// The last page stored for exactly `key`, unless it has been invalidated.
  pub fn get(&self, key: &ContactQuery) -> Option<&ContactPage> {
    self.lists.get(key).and_then(Entry::get)
  }

  pub fn stats(&self) -> Option<&ContactStats> {
    self.stats.as_ref().and_then(Entry::get)
  }

  /// Whether `key` has an entry that was invalidated and not yet refetched.
  pub fn is_stale(&self, key: &ContactQuery) -> bool {
    self.lists.get(key).is_some_and(|e| e.stale)
  }

  /// The generation of the fresh page for `key`. Two equal readings mean
  /// nothing wrote to the key in between.
  pub fn generation(&self, key: &ContactQuery) -> Option<u64> {
    self.lists.get(key).filter(|e| !e.stale).map(|e| e.generation)
  }

  /// The list key most recently read for display, if any.
  pub fn watched(&self) -> Option<&ContactQuery> { self.watched.as_ref() }

  /// Record `key` as the page on display. Only the watched page is refetched
  /// eagerly after an invalidation; other keys wait for their next read.
  pub fn watch(&mut self, key: &ContactQuery) { self.watched = Some(key.clone()); }

  /// Keys of every page held fresh right now.
  pub fn fresh_keys(&self) -> Vec<ContactQuery> {
    self
      .lists
      .iter()
      .filter(|(_, e)| !e.stale)
      .map(|(k, _)| k.clone())
      .collect()
  }

  // ── Writes ──────────────────────────────────────────────────────────────

  /// Replace the page for `key` through `transform`.
  ///
  /// The transform sees the current fresh page, or `None` when nothing
  /// usable is cached; a transform given `None` must return `None`, and a
  /// `None` result leaves the entry as it was.
  pub fn set<F>(&mut self, key: &ContactQuery, transform: F)
  where
    F: FnOnce(Option<ContactPage>) -> Option<ContactPage>,
  {
    let current = self.get(key).cloned();
    let had_page = current.is_some();

    if let Some(page) = transform(current)
      && had_page
    {
      let generation = self.next_generation();
      self.lists.insert(key.clone(), Entry::fresh(page, generation));
    }
  }

  /// Write `page` back verbatim, but only while the entry for `key` is still
  /// at `generation`. Returns whether the page was written; when it was not,
  /// the entry is marked stale instead so the next read refetches it.
  pub fn restore(&mut self, key: &ContactQuery, page: ContactPage, generation: u64) -> bool {
    if self.generation(key) == Some(generation) {
      let generation = self.next_generation();
      self.lists.insert(key.clone(), Entry::fresh(page, generation));
      return true;
    }
    self.mark_stale(key);
    false
  }

  /// Mark the page for `key` stale. Unlike [`Self::invalidate`], fetches
  /// already in flight for it are kept.
  pub fn mark_stale(&mut self, key: &ContactQuery) {
    let generation = self.next_generation();
    if let Some(entry) = self.lists.get_mut(key)
      && !entry.stale
    {
      entry.stale = true;
      entry.generation = generation;
    }
  }

  /// Mark matching fresh entries stale and cancel matching in-flight
  /// fetches. Matching entries that were already stale are evicted, so a
  /// second invalidation leaves nothing readable and reports nothing to
  /// refetch.
  pub fn invalidate(&mut self, pattern: &KeyPattern) -> Invalidated {
    self.cancel_fetches(pattern);

    self
      .lists
      .retain(|k, e| !(e.stale && pattern.matches_list(k)));

    let generation = self.next_generation();
    let mut lists: Vec<ContactQuery> = self
      .lists
      .iter_mut()
      .filter(|(k, _)| pattern.matches_list(k))
      .map(|(k, e)| {
        e.stale = true;
        e.generation = generation;
        k.clone()
      })
      .collect();
    lists.sort_by_key(|k| (k.offset, k.search.clone(), k.limit));

    if pattern.matches_stats() && self.stats.as_ref().is_some_and(|e| e.stale) {
      self.stats = None;
    }
    let stats = match self.stats.as_mut() {
      Some(e) if pattern.matches_stats() => {
        e.stale = true;
        e.generation = generation;
        true
      }
      _ => false,
    };

    Invalidated { lists, stats }
  }

  fn next_generation(&mut self) -> u64 {
    self.generation += 1;
    self.generation
  }

  // ── Fetch bookkeeping ───────────────────────────────────────────────────

  fn issue_token(&mut self) -> u64 {
    self.next_token += 1;
    self.next_token
  }

  /// Record that a list fetch for `key` has started. Supersedes any earlier
  /// fetch of the same key.
  pub fn begin_fetch(&mut self, key: &ContactQuery) -> FetchToken {
    let token = self.issue_token();
    self.list_fetches.insert(key.clone(), token);
    FetchToken(token)
  }

  /// Store a fetched page if `token` is still current for `key`. Returns
  /// whether the page was written.
  pub fn complete_fetch(
    &mut self,
    key: &ContactQuery,
    token: FetchToken,
    page: ContactPage,
  ) -> bool {
    if self.list_fetches.get(key) != Some(&token.0) {
      return false;
    }
    self.list_fetches.remove(key);
    let generation = self.next_generation();
    self.lists.insert(key.clone(), Entry::fresh(page, generation));
    true
  }

  /// Forget a failed list fetch without touching the cached page.
  pub fn abandon_fetch(&mut self, key: &ContactQuery, token: FetchToken) {
    if self.list_fetches.get(key) == Some(&token.0) {
      self.list_fetches.remove(key);
    }
  }

  pub fn begin_stats_fetch(&mut self) -> FetchToken {
    let token = self.issue_token();
    self.stats_fetch = Some(token);
    FetchToken(token)
  }

  pub fn complete_stats_fetch(&mut self, token: FetchToken, stats: ContactStats) -> bool {
    if self.stats_fetch != Some(token.0) {
      return false;
    }
    self.stats_fetch = None;
    let generation = self.next_generation();
    self.stats = Some(Entry::fresh(stats, generation));
    true
  }

  /// Cancel in-flight fetches matching `pattern`; their responses will be
  /// discarded when they arrive.
  pub fn cancel_fetches(&mut self, pattern: &KeyPattern) {
    self.list_fetches.retain(|k, _| !pattern.matches_list(k));
    if pattern.matches_stats() {
      self.stats_fetch = None;
    }
  }

  /// Whether a list fetch for `key` is outstanding.
  pub fn is_fetching(&self, key: &ContactQuery) -> bool {
    self.list_fetches.contains_key(key)
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use rolo_core::contact::Contact;

  use super::*;

  fn contact(id: i64, last: &str) -> Contact {
    let now = Utc::now();
    Contact {
      id,
      first_name: "Test".into(),
      last_name:  last.into(),
      email:      format!("{id}@example.com"),
      phone:      None,
      company:    None,
      created_at: now,
      updated_at: now,
    }
  }

  fn page(ids: &[i64]) -> ContactPage {
    let contacts: Vec<_> = ids.iter().map(|&id| contact(id, "Doe")).collect();
    let total = contacts.len() as u64;
    ContactPage::new(contacts, total, &ContactQuery::default())
  }

  fn filled(key: &ContactQuery, p: ContactPage) -> CacheStore {
    let mut cache = CacheStore::new();
    let token = cache.begin_fetch(key);
    assert!(cache.complete_fetch(key, token, p));
    cache
  }

  #[test]
  fn get_returns_nothing_before_first_fetch() {
    let cache = CacheStore::new();
    assert!(cache.get(&ContactQuery::default()).is_none());
  }

  #[test]
  fn set_on_absent_entry_is_a_noop() {
    let key = ContactQuery::default();
    let mut cache = CacheStore::new();
    let mut called_with = None;

    cache.set(&key, |old| {
      called_with = Some(old.is_some());
      old
    });

    assert_eq!(called_with, Some(false));
    assert!(cache.get(&key).is_none());
  }

  #[test]
  fn set_ignores_a_transform_that_invents_a_page() {
    let key = ContactQuery::default();
    let mut cache = CacheStore::new();
    cache.set(&key, |_| Some(page(&[1])));
    assert!(cache.get(&key).is_none());
  }

  #[test]
  fn set_transforms_existing_page() {
    let key = ContactQuery::default();
    let mut cache = filled(&key, page(&[1, 2]));

    cache.set(&key, |old| {
      old.map(|mut p| {
        p.contacts.retain(|c| c.id != 1);
        p.total_count -= 1;
        p
      })
    });

    let p = cache.get(&key).unwrap();
    assert_eq!(p.contacts.len(), 1);
    assert_eq!(p.total_count, 1);
  }

  #[test]
  fn invalidate_marks_stale_and_is_idempotent() {
    let key = ContactQuery::default();
    let other = ContactQuery::new(Some("jo"), 50, 0);
    let mut cache = filled(&key, page(&[1]));
    let t = cache.begin_fetch(&other);
    cache.complete_fetch(&other, t, page(&[2]));

    let once = cache.invalidate(&KeyPattern::AllLists);
    assert_eq!(once.lists.len(), 2);
    assert!(cache.get(&key).is_none());
    assert!(cache.is_stale(&key));
    assert!(cache.fresh_keys().is_empty());

    let twice = cache.invalidate(&KeyPattern::AllLists);
    assert_eq!(twice, Invalidated::default());
    assert!(cache.get(&key).is_none());
    assert!(cache.get(&other).is_none());
    assert!(cache.fresh_keys().is_empty());
  }

  #[test]
  fn invalidate_reports_only_keys_that_were_fresh() {
    let mut cache = CacheStore::new();
    for search in ["a", "b", "c"] {
      let key = ContactQuery::new(Some(search), 50, 0);
      let t = cache.begin_fetch(&key);
      cache.complete_fetch(&key, t, page(&[1]));
      cache.invalidate(&KeyPattern::AllContacts);
    }
    let key = ContactQuery::default();
    let t = cache.begin_fetch(&key);
    cache.complete_fetch(&key, t, page(&[1]));

    let invalidated = cache.invalidate(&KeyPattern::AllContacts);
    assert_eq!(invalidated.lists, vec![key.clone()]);
    assert!(!cache.is_stale(&ContactQuery::new(Some("a"), 50, 0)));
    assert!(cache.is_stale(&key));
  }

  #[test]
  fn stale_stats_are_not_reported_twice() {
    let mut cache = CacheStore::new();
    let t = cache.begin_stats_fetch();
    cache.complete_stats_fetch(t, ContactStats::from_counts(3, 1, 1));

    assert!(cache.invalidate(&KeyPattern::Stats).stats);
    assert!(!cache.invalidate(&KeyPattern::Stats).stats);
    assert!(cache.stats().is_none());
  }

  #[test]
  fn invalidating_one_key_leaves_others_fresh() {
    let key = ContactQuery::default();
    let other = ContactQuery::new(Some("jo"), 50, 0);
    let mut cache = filled(&key, page(&[1]));
    let t = cache.begin_fetch(&other);
    cache.complete_fetch(&other, t, page(&[2]));

    let invalidated = cache.invalidate(&KeyPattern::List(other.clone()));
    assert_eq!(invalidated.lists, vec![other.clone()]);
    assert!(!invalidated.stats);
    assert!(cache.get(&key).is_some());
    assert!(cache.get(&other).is_none());
  }

  #[test]
  fn stats_follow_the_all_contacts_pattern() {
    let mut cache = CacheStore::new();
    let t = cache.begin_stats_fetch();
    assert!(cache.complete_stats_fetch(t, ContactStats::from_counts(3, 1, 1)));
    assert!(cache.stats().is_some());

    assert!(!cache.invalidate(&KeyPattern::AllLists).stats);
    assert!(cache.stats().is_some());

    assert!(cache.invalidate(&KeyPattern::AllContacts).stats);
    assert!(cache.stats().is_none());
  }

  #[test]
  fn cancelled_fetch_cannot_overwrite() {
    let key = ContactQuery::default();
    let mut cache = filled(&key, page(&[1]));

    let late = cache.begin_fetch(&key);
    cache.cancel_fetches(&KeyPattern::AllLists);
    assert!(!cache.is_fetching(&key));

    assert!(!cache.complete_fetch(&key, late, page(&[9])));
    assert_eq!(cache.get(&key).unwrap().contacts[0].id, 1);
  }

  #[test]
  fn newer_fetch_supersedes_older_one() {
    let key = ContactQuery::default();
    let mut cache = CacheStore::new();

    let old = cache.begin_fetch(&key);
    let new = cache.begin_fetch(&key);
    assert!(cache.complete_fetch(&key, new, page(&[2])));
    assert!(!cache.complete_fetch(&key, old, page(&[1])));
    assert_eq!(cache.get(&key).unwrap().contacts[0].id, 2);
  }

  #[test]
  fn invalidate_cancels_in_flight_fetches() {
    let key = ContactQuery::default();
    let mut cache = CacheStore::new();
    let token = cache.begin_fetch(&key);

    cache.invalidate(&KeyPattern::AllContacts);
    assert!(!cache.complete_fetch(&key, token, page(&[1])));
  }

  #[test]
  fn abandoned_fetch_keeps_previous_page() {
    let key = ContactQuery::default();
    let mut cache = filled(&key, page(&[1]));

    let token = cache.begin_fetch(&key);
    cache.abandon_fetch(&key, token);
    assert!(!cache.is_fetching(&key));
    assert_eq!(cache.get(&key).unwrap().contacts[0].id, 1);
  }

  #[test]
  fn every_write_moves_the_generation() {
    let key = ContactQuery::default();
    let mut cache = filled(&key, page(&[1]));
    let first = cache.generation(&key).unwrap();

    cache.set(&key, |old| old);
    let second = cache.generation(&key).unwrap();
    assert_ne!(first, second);

    cache.invalidate(&KeyPattern::AllLists);
    assert_eq!(cache.generation(&key), None);
  }

  #[test]
  fn restore_writes_verbatim() {
    let key = ContactQuery::default();
    let snapshot = page(&[1, 2, 3]);
    let mut cache = filled(&key, snapshot.clone());

    cache.set(&key, |old| old.map(|_| page(&[])));
    let generation = cache.generation(&key).unwrap();
    assert!(cache.restore(&key, snapshot.clone(), generation));
    assert_eq!(cache.get(&key), Some(&snapshot));
  }

  #[test]
  fn restore_over_a_newer_write_marks_the_key_stale() {
    let key = ContactQuery::default();
    let snapshot = page(&[1, 2, 3]);
    let mut cache = filled(&key, snapshot.clone());

    cache.set(&key, |old| old.map(|_| page(&[2])));
    let generation = cache.generation(&key).unwrap();
    cache.set(&key, |old| old.map(|_| page(&[3])));

    assert!(!cache.restore(&key, snapshot, generation));
    assert!(cache.get(&key).is_none());
    assert!(cache.is_stale(&key));
  }
}
