//! Staging and resolution of optimistic mutations.
//!
//! A [`StagedMutation`] is created by patching the cache with the expected
//! outcome of a create, update or delete. It must then be resolved exactly
//! once: [`StagedMutation::commit`] when the service accepted the change,
//! [`StagedMutation::rollback`] when it did not. Dropping a still-staged
//! mutation (for example because the awaiting task was cancelled) rolls it
//! back.

use chrono::{DateTime, Utc};
use rolo_core::{
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery},
};

use crate::cache::{Invalidated, KeyPattern, SharedCache, lock};

/// Which mutation was staged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
  Create,
  Update(ContactId),
  Delete(ContactId),
}

/// Lifecycle of a single mutation. Only `Staged` has a live context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
  Staged,
  Committed,
  RolledBack,
}

/// Everything needed to undo a staged mutation.
#[derive(Debug, Clone)]
pub struct MutationContext {
  pub kind:        MutationKind,
  /// Pages as they were before staging. Empty for creates, which are undone
  /// by removing the speculative record.
  pub snapshot:    Vec<PageSnapshot>,
  /// The record shown in place of the service's answer, if any page held it.
  pub speculative: Option<Contact>,
  insertion:       Option<Insertion>,
}

/// A page as it was before staging.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
  pub key:    ContactQuery,
  pub page:   ContactPage,
  /// Cache generation of the key right after the patch. Rollback restores
  /// `page` only if the key is still at this generation.
  generation: u64,
}

/// Where a speculative create went and what it displaced.
#[derive(Debug, Clone)]
struct Insertion {
  key:           ContactQuery,
  evicted:       Option<Contact>,
  had_next_page: bool,
  generation:    u64,
}

/// A record built from validated input, standing in for the one the service
/// will return.
pub fn speculative_contact(
  id: ContactId,
  input: &ContactInput,
  now: DateTime<Utc>,
) -> Contact {
  Contact {
    id,
    first_name: input.first_name.clone(),
    last_name: input.last_name.clone(),
    email: input.email.clone(),
    phone: input.phone.clone(),
    company: input.company.clone(),
    created_at: now,
    updated_at: now,
  }
}

fn merged(existing: &Contact, input: &ContactInput, now: DateTime<Utc>) -> Contact {
  Contact {
    created_at: existing.created_at,
    ..speculative_contact(existing.id, input, now)
  }
}

/// An optimistic change applied to the cache and awaiting the service.
#[derive(Debug)]
pub struct StagedMutation {
  cache:   SharedCache,
  state:   MutationState,
  context: Option<MutationContext>,
}

impl StagedMutation {
  fn staged(cache: SharedCache, context: MutationContext) -> Self {
    tracing::debug!(kind = ?context.kind, "mutation staged");
    Self { cache, state: MutationState::Staged, context: Some(context) }
  }

  /// Prepend `speculative` to the page cached for `key`.
  ///
  /// The page keeps at most `key.limit` records; one pushed off the end is
  /// remembered and put back on rollback. Nothing is patched when `key` is
  /// not cached.
  pub fn create(cache: SharedCache, key: &ContactQuery, speculative: Contact) -> Self {
    let mut insertion = Insertion {
      key:           key.clone(),
      evicted:       None,
      had_next_page: false,
      generation:    0,
    };
    let mut inserted = false;

    {
      let mut store = lock(&cache);
      store.cancel_fetches(&KeyPattern::AllLists);
      store.set(key, |current| {
        current.map(|mut page| {
          insertion.had_next_page = page.has_next_page;
          page.contacts.insert(0, speculative.clone());
          page.total_count += 1;
          if page.contacts.len() > key.limit as usize {
            insertion.evicted = page.contacts.pop();
            page.has_next_page = true;
          }
          inserted = true;
          page
        })
      });
      insertion.generation = store.generation(key).unwrap_or_default();
    }

    Self::staged(cache, MutationContext {
      kind:        MutationKind::Create,
      snapshot:    Vec::new(),
      speculative: inserted.then_some(speculative),
      insertion:   inserted.then_some(insertion),
    })
  }

  /// Replace contact `id` with the merged `input` in every fresh page that
  /// holds it, snapshotting each page first.
  pub fn update(cache: SharedCache, id: ContactId, input: &ContactInput) -> Self {
    let now = Utc::now();
    let mut speculative = None;
    let snapshot = patch_pages(&cache, id, |page| {
      for contact in page.contacts.iter_mut().filter(|c| c.id == id) {
        *contact = merged(contact, input, now);
        speculative.get_or_insert_with(|| contact.clone());
      }
    });

    Self::staged(cache, MutationContext {
      kind: MutationKind::Update(id),
      snapshot,
      speculative,
      insertion: None,
    })
  }

  /// Remove contact `id` from every fresh page that holds it, snapshotting
  /// each page first.
  pub fn delete(cache: SharedCache, id: ContactId) -> Self {
    let snapshot = patch_pages(&cache, id, |page| {
      page.contacts.retain(|c| c.id != id);
      page.total_count = page.total_count.saturating_sub(1);
    });

    Self::staged(cache, MutationContext {
      kind: MutationKind::Delete(id),
      snapshot,
      speculative: None,
      insertion: None,
    })
  }

  pub fn state(&self) -> MutationState { self.state }

  pub fn context(&self) -> Option<&MutationContext> { self.context.as_ref() }

  pub fn kind(&self) -> Option<MutationKind> {
    self.context.as_ref().map(|c| c.kind)
  }

  /// The service accepted the change: drop the context and mark every
  /// contact-derived entry stale. The returned keys should be refetched.
  pub fn commit(mut self) -> Invalidated {
    let kind = self.kind();
    self.context = None;
    self.state = MutationState::Committed;
    tracing::debug!(?kind, "mutation committed");
    let invalidated = lock(&self.cache).invalidate(&KeyPattern::AllContacts);
    invalidated
  }

  /// The service rejected the change: put the cache back as it was.
  ///
  /// A page written by something else since staging is not put back; it is
  /// marked stale instead and returned for refetching.
  pub fn rollback(mut self) -> Invalidated { self.undo() }

  fn undo(&mut self) -> Invalidated {
    let mut expired = Invalidated::default();
    let Some(context) = self.context.take() else { return expired };
    self.state = MutationState::RolledBack;
    tracing::debug!(kind = ?context.kind, "mutation rolled back");

    let mut store = lock(&self.cache);
    if let (Some(insertion), Some(speculative)) = (context.insertion, context.speculative) {
      if store.generation(&insertion.key) == Some(insertion.generation) {
        store.set(&insertion.key, |current| {
          current.map(|mut page| {
            page.contacts.retain(|c| c.id != speculative.id);
            page.total_count = page.total_count.saturating_sub(1);
            page.contacts.extend(insertion.evicted);
            page.has_next_page = insertion.had_next_page;
            page
          })
        });
      } else if store.get(&insertion.key).is_some_and(|p| p.contains(speculative.id)) {
        store.mark_stale(&insertion.key);
        expired.lists.push(insertion.key);
      }
    }
    for snapshot in context.snapshot {
      let fresh = store.generation(&snapshot.key).is_some();
      if !store.restore(&snapshot.key, snapshot.page, snapshot.generation) && fresh {
        expired.lists.push(snapshot.key);
      }
    }

    if !expired.lists.is_empty() {
      tracing::debug!(keys = expired.lists.len(), "pages changed since staging; expired");
    }
    expired
  }
}

impl Drop for StagedMutation {
  fn drop(&mut self) {
    if self.state == MutationState::Staged {
      tracing::warn!(kind = ?self.kind(), "mutation dropped unresolved; rolling back");
      self.undo();
    }
  }
}

/// Apply `patch` to every fresh page containing `id`, returning the pages as
/// they were. In-flight list fetches are cancelled first so they cannot
/// overwrite the patch.
fn patch_pages<F>(cache: &SharedCache, id: ContactId, mut patch: F) -> Vec<PageSnapshot>
where
  F: FnMut(&mut ContactPage),
{
  let mut store = lock(cache);
  store.cancel_fetches(&KeyPattern::AllLists);

  let mut snapshot = Vec::new();
  for key in store.fresh_keys() {
    let Some(page) = store.get(&key).filter(|p| p.contains(id)).cloned() else {
      continue;
    };
    store.set(&key, |current| {
      current.map(|mut page| {
        patch(&mut page);
        page
      })
    });
    let generation = store.generation(&key).unwrap_or_default();
    snapshot.push(PageSnapshot { key, page, generation });
  }
  snapshot
}

#[cfg(test)]
mod tests {
  use rolo_core::query::ContactStats;

  use super::*;
  use crate::cache::CacheStore;

  fn contact(id: ContactId, first: &str) -> Contact {
    let now = Utc::now();
    Contact {
      id,
      first_name: first.into(),
      last_name:  "Doe".into(),
      email:      format!("{id}@example.com"),
      phone:      None,
      company:    None,
      created_at: now,
      updated_at: now,
    }
  }

  fn seeded(key: &ContactQuery, ids: &[ContactId], total: u64) -> SharedCache {
    let contacts = ids.iter().map(|&id| contact(id, "Test")).collect();
    let cache = CacheStore::shared();
    {
      let mut store = lock(&cache);
      let token = store.begin_fetch(key);
      store.complete_fetch(key, token, ContactPage::new(contacts, total, key));
      let token = store.begin_stats_fetch();
      store.complete_stats_fetch(token, ContactStats::from_counts(total, 0, 0));
    }
    cache
  }

  fn page(cache: &SharedCache, key: &ContactQuery) -> ContactPage {
    lock(cache).get(key).cloned().unwrap()
  }

  fn input(first: &str) -> ContactInput {
    ContactInput::new(first, "Doe", "new@example.com")
  }

  #[test]
  fn create_prepends_and_rollback_removes() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2], 2);
    let before = page(&cache, &key);

    let staged = StagedMutation::create(
      cache.clone(),
      &key,
      speculative_contact(-1, &input("Neo"), Utc::now()),
    );
    assert_eq!(staged.state(), MutationState::Staged);
    let during = page(&cache, &key);
    assert_eq!(during.contacts[0].id, -1);
    assert_eq!(during.total_count, 3);

    staged.rollback();
    assert_eq!(page(&cache, &key), before);
  }

  #[test]
  fn create_on_full_page_evicts_and_restores_last() {
    let key = ContactQuery::new(None, 2, 0);
    let cache = seeded(&key, &[1, 2], 2);
    let before = page(&cache, &key);
    assert!(!before.has_next_page);

    let staged = StagedMutation::create(
      cache.clone(),
      &key,
      speculative_contact(-1, &input("Neo"), Utc::now()),
    );
    let during = page(&cache, &key);
    let ids: Vec<_> = during.contacts.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![-1, 1]);
    assert!(during.has_next_page);

    staged.rollback();
    assert_eq!(page(&cache, &key), before);
  }

  #[test]
  fn create_without_cached_page_patches_nothing() {
    let key = ContactQuery::default();
    let cache = CacheStore::shared();

    let staged = StagedMutation::create(
      cache.clone(),
      &key,
      speculative_contact(-1, &input("Neo"), Utc::now()),
    );
    assert!(staged.context().unwrap().speculative.is_none());
    assert!(lock(&cache).get(&key).is_none());
    staged.rollback();
    assert!(lock(&cache).get(&key).is_none());
  }

  #[test]
  fn update_patches_every_page_holding_the_contact() {
    let all = ContactQuery::default();
    let search = ContactQuery::new(Some("test"), 50, 0);
    let cache = seeded(&all, &[1, 2, 3], 3);
    {
      let mut store = lock(&cache);
      let token = store.begin_fetch(&search);
      store.complete_fetch(
        &search,
        token,
        ContactPage::new(vec![contact(2, "Test")], 1, &search),
      );
    }
    let before_all = page(&cache, &all);
    let before_search = page(&cache, &search);

    let staged = StagedMutation::update(cache.clone(), 2, &input("Zed"));
    assert_eq!(staged.context().unwrap().snapshot.len(), 2);
    assert_eq!(page(&cache, &all).contacts[1].first_name, "Zed");
    assert_eq!(page(&cache, &search).contacts[0].first_name, "Zed");
    assert_eq!(page(&cache, &all).contacts[1].created_at, before_all.contacts[1].created_at);

    staged.rollback();
    assert_eq!(page(&cache, &all), before_all);
    assert_eq!(page(&cache, &search), before_search);
  }

  #[test]
  fn delete_removes_and_rollback_restores() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2, 3], 3);
    let before = page(&cache, &key);

    let staged = StagedMutation::delete(cache.clone(), 2);
    let during = page(&cache, &key);
    assert_eq!(during.contacts.len(), 2);
    assert_eq!(during.total_count, 2);

    staged.rollback();
    assert_eq!(page(&cache, &key), before);
  }

  #[test]
  fn delete_of_uncached_id_changes_nothing() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1], 1);
    let before = page(&cache, &key);

    let staged = StagedMutation::delete(cache.clone(), 42);
    assert!(staged.context().unwrap().snapshot.is_empty());
    assert_eq!(page(&cache, &key), before);
    staged.rollback();
    assert_eq!(page(&cache, &key), before);
  }

  #[test]
  fn commit_invalidates_lists_and_stats() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1], 1);

    let staged = StagedMutation::delete(cache.clone(), 1);
    let invalidated = staged.commit();

    assert_eq!(invalidated.lists, vec![key.clone()]);
    assert!(invalidated.stats);
    let store = lock(&cache);
    assert!(store.is_stale(&key));
    assert!(store.stats().is_none());
  }

  #[test]
  fn dropping_a_staged_mutation_rolls_back() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2], 2);
    let before = page(&cache, &key);

    drop(StagedMutation::delete(cache.clone(), 1));
    assert_eq!(page(&cache, &key), before);
  }

  fn ids(page: &ContactPage) -> Vec<ContactId> { page.contacts.iter().map(|c| c.id).collect() }

  fn no_fresh_page_holds_a_temporary_id(cache: &SharedCache) {
    let store = lock(cache);
    for key in store.fresh_keys() {
      let page = store.get(&key).unwrap();
      assert!(page.contacts.iter().all(|c| c.id > 0), "{:?}", ids(page));
    }
  }

  #[test]
  fn create_rolled_back_before_an_overlapping_delete() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2], 2);

    let create = StagedMutation::create(
      cache.clone(),
      &key,
      speculative_contact(-1, &input("Neo"), Utc::now()),
    );
    let delete = StagedMutation::delete(cache.clone(), 2);
    assert_eq!(ids(&page(&cache, &key)), vec![-1, 1]);

    assert_eq!(create.rollback().lists, vec![key.clone()]);
    assert!(delete.rollback().lists.is_empty());

    no_fresh_page_holds_a_temporary_id(&cache);
    assert!(lock(&cache).is_stale(&key));
  }

  #[test]
  fn delete_rolled_back_before_an_overlapping_create() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2], 2);

    let create = StagedMutation::create(
      cache.clone(),
      &key,
      speculative_contact(-1, &input("Neo"), Utc::now()),
    );
    let delete = StagedMutation::delete(cache.clone(), 2);

    assert!(delete.rollback().lists.is_empty());
    assert_eq!(ids(&page(&cache, &key)), vec![-1, 1, 2]);
    assert_eq!(create.rollback().lists, vec![key.clone()]);

    no_fresh_page_holds_a_temporary_id(&cache);
  }

  #[test]
  fn rollback_after_a_refetch_does_not_write_the_snapshot() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1, 2], 2);

    let staged = StagedMutation::delete(cache.clone(), 2);
    let fetched = ContactPage::new(vec![contact(1, "Test"), contact(3, "Test")], 2, &key);
    {
      let mut store = lock(&cache);
      let token = store.begin_fetch(&key);
      store.complete_fetch(&key, token, fetched);
    }

    assert_eq!(staged.rollback().lists, vec![key.clone()]);
    assert!(lock(&cache).get(&key).is_none());
  }

  #[test]
  fn staging_cancels_in_flight_list_fetches() {
    let key = ContactQuery::default();
    let cache = seeded(&key, &[1], 1);
    let token = lock(&cache).begin_fetch(&key);

    let staged = StagedMutation::delete(cache.clone(), 1);
    let stale = ContactPage::new(vec![contact(1, "Test")], 1, &key);
    assert!(!lock(&cache).complete_fetch(&key, token, stale));
    assert!(page(&cache, &key).contacts.is_empty());
    staged.rollback();
  }
}
