//! Cached reads and optimistic writes against a [`ContactStore`].

use std::sync::{
  Arc,
  atomic::{AtomicI64, Ordering},
};

use chrono::Utc;
use rolo_core::{
  Error, Result,
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};

use crate::{
  cache::{Invalidated, KeyPattern, SharedCache, lock},
  mutation::{StagedMutation, speculative_contact},
};

/// Routes every read through the cache and every write through a
/// [`StagedMutation`].
pub struct ContactCoordinator<S> {
  service:       Arc<S>,
  cache:         SharedCache,
  /// The key a speculative create is shown under.
  default_query: ContactQuery,
  next_temp_id:  AtomicI64,
}

impl<S: ContactStore> ContactCoordinator<S> {
  pub fn new(service: Arc<S>, cache: SharedCache) -> Self {
    Self {
      service,
      cache,
      default_query: ContactQuery::default(),
      next_temp_id: AtomicI64::new(-1),
    }
  }

  pub fn with_default_query(mut self, query: ContactQuery) -> Self {
    self.default_query = query;
    self
  }

  pub fn cache(&self) -> &SharedCache { &self.cache }

  pub fn service(&self) -> &Arc<S> { &self.service }

  pub fn default_query(&self) -> &ContactQuery { &self.default_query }

  fn temp_id(&self) -> ContactId {
    self.next_temp_id.fetch_sub(1, Ordering::Relaxed)
  }

  // ─── Reads ─────────────────────────────────────────────────────────────────

  /// Fetch `query` from the service and store the page, unless the fetch was
  /// cancelled or superseded while in flight. A failed fetch leaves the
  /// cached page untouched.
  pub async fn fetch_list(&self, query: &ContactQuery) -> Result<ContactPage> {
    let token = lock(&self.cache).begin_fetch(query);
    let result: Result<ContactPage> = self.service.list(query).await.map_err(Into::into);

    match result {
      Ok(page) => {
        let written = lock(&self.cache).complete_fetch(query, token, page.clone());
        if !written {
          tracing::debug!(?query, "discarding superseded list response");
        }
        Ok(page)
      }
      Err(e) => {
        lock(&self.cache).abandon_fetch(query, token);
        Err(e)
      }
    }
  }

  /// The cached page for `query`, fetched when missing or stale. `query`
  /// becomes the watched key.
  pub async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    let cached = {
      let mut store = lock(&self.cache);
      store.watch(query);
      store.get(query).cloned()
    };
    match cached {
      Some(page) => Ok(page),
      None => self.fetch_list(query).await,
    }
  }

  pub async fn fetch_stats(&self) -> Result<ContactStats> {
    let token = lock(&self.cache).begin_stats_fetch();
    let stats = self.service.stats().await.map_err(Into::<Error>::into)?;
    let written = lock(&self.cache).complete_stats_fetch(token, stats);
    if !written {
      tracing::debug!("discarding superseded stats response");
    }
    Ok(stats)
  }

  pub async fn stats(&self) -> Result<ContactStats> {
    let cached = lock(&self.cache).stats().copied();
    match cached {
      Some(stats) => Ok(stats),
      None => self.fetch_stats().await,
    }
  }

  /// A single contact, straight from the service.
  pub async fn get(&self, id: ContactId) -> Result<Contact> {
    let found = self.service.get(id).await.map_err(Into::<Error>::into)?;
    found.ok_or(Error::ContactNotFound(id))
  }

  // ─── Writes ────────────────────────────────────────────────────────────────

  /// Validate `input`, show it at the top of the default page, then create it.
  pub async fn create(&self, input: ContactInput) -> Result<Contact> {
    let input = input.validated()?;
    let speculative = speculative_contact(self.temp_id(), &input, Utc::now());
    let staged = StagedMutation::create(self.cache.clone(), &self.default_query, speculative);

    let result: Result<Contact> = self.service.create(input).await.map_err(Into::into);
    self.resolve(staged, result).await
  }

  /// Validate `input`, patch it into every cached page holding `id`, then
  /// update it.
  pub async fn update(&self, id: ContactId, input: ContactInput) -> Result<Contact> {
    let input = input.validated()?;
    let staged = StagedMutation::update(self.cache.clone(), id, &input);

    let result: Result<Contact> = self.service.update(id, input).await.map_err(Into::into);
    self.resolve(staged, result).await
  }

  /// Remove `id` from every cached page, then delete it.
  pub async fn delete(&self, id: ContactId) -> Result<()> {
    let staged = StagedMutation::delete(self.cache.clone(), id);

    let result: Result<()> = self.service.delete(id).await.map_err(Into::into);
    self.resolve(staged, result).await
  }

  async fn resolve<T>(&self, staged: StagedMutation, result: Result<T>) -> Result<T> {
    match result {
      Ok(value) => {
        let invalidated = staged.commit();
        self.refetch(&invalidated).await;
        Ok(value)
      }
      Err(e) => {
        tracing::warn!(kind = ?staged.kind(), error = %e, "mutation failed; rolling back");
        let expired = staged.rollback();
        self.refetch(&expired).await;
        Err(e)
      }
    }
  }

  // ─── Invalidation ──────────────────────────────────────────────────────────

  /// Mark every list page and the stats stale.
  pub fn invalidate_all(&self) -> Invalidated {
    lock(&self.cache).invalidate(&KeyPattern::AllContacts)
  }

  /// Refetch the watched page if it is among `invalidated`, and the stats if
  /// they were invalidated. Other pages stay stale until their next read.
  /// Failures are logged and leave the entry stale, so the next read fetches
  /// it again.
  pub async fn refetch(&self, invalidated: &Invalidated) {
    let watched = lock(&self.cache).watched().cloned();
    for query in invalidated.lists.iter().filter(|q| Some(*q) == watched.as_ref()) {
      if let Err(e) = self.fetch_list(query).await {
        tracing::warn!(?query, error = %e, "refetch failed");
      }
    }
    if invalidated.stats
      && let Err(e) = self.fetch_stats().await
    {
      tracing::warn!(error = %e, "stats refetch failed");
    }
  }

  /// Invalidate everything and refetch the watched page and the stats.
  pub async fn reconcile(&self) {
    let invalidated = self.invalidate_all();
    self.refetch(&invalidated).await;
  }
}
