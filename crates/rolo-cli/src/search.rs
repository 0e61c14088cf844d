//! Search text, paging and refresh state for a contact listing.

use std::sync::{
  Arc, Mutex, MutexGuard, PoisonError,
  atomic::{AtomicBool, Ordering},
};

use rolo_core::{
  Result,
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};

use crate::coordinator::ContactCoordinator;

#[derive(Debug, Default)]
struct SearchState {
  search: String,
  offset: u32,
}

/// Tracks which page of which search the user is looking at.
///
/// The page size is taken from the coordinator's default query, so an
/// unfiltered first page is the same cache entry a speculative create lands
/// in.
pub struct SearchController<S> {
  coordinator: Arc<ContactCoordinator<S>>,
  state:       Mutex<SearchState>,
  refreshing:  AtomicBool,
}

/// Clears the refreshing flag however the refresh ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
  fn drop(&mut self) { self.0.store(false, Ordering::SeqCst); }
}

impl<S: ContactStore> SearchController<S> {
  pub fn new(coordinator: Arc<ContactCoordinator<S>>) -> Self {
    Self {
      coordinator,
      state: Mutex::new(SearchState::default()),
      refreshing: AtomicBool::new(false),
    }
  }

  fn state(&self) -> MutexGuard<'_, SearchState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn limit(&self) -> u32 { self.coordinator.default_query().limit }

  /// The cache key for what is currently shown.
  pub fn query(&self) -> ContactQuery {
    let state = self.state();
    ContactQuery::new(Some(state.search.as_str()), self.limit(), state.offset)
  }

  pub fn search(&self) -> String { self.state().search.clone() }

  pub fn is_refreshing(&self) -> bool { self.refreshing.load(Ordering::SeqCst) }

  /// Replace the search text and return to the first page.
  pub async fn set_search(&self, text: impl Into<String>) -> Result<ContactPage> {
    self.set_search_at(text, 0).await
  }

  /// Replace the search text and go straight to `offset`. Only the page at
  /// `offset` is fetched.
  pub async fn set_search_at(&self, text: impl Into<String>, offset: u32) -> Result<ContactPage> {
    {
      let mut state = self.state();
      state.search = text.into();
      state.offset = offset;
    }
    self.contacts().await
  }

  pub async fn clear_search(&self) -> Result<ContactPage> { self.set_search("").await }

  /// The page for the current search and offset.
  pub async fn contacts(&self) -> Result<ContactPage> {
    let query = self.query();
    self.coordinator.list(&query).await
  }

  pub async fn stats(&self) -> Result<ContactStats> { self.coordinator.stats().await }

  /// Advance one page if the current page says there is one.
  pub async fn next_page(&self) -> Result<ContactPage> {
    let page = self.contacts().await?;
    if !page.has_next_page {
      return Ok(page);
    }
    {
      let mut state = self.state();
      state.offset = state.offset.saturating_add(self.limit());
    }
    self.contacts().await
  }

  /// Go back one page if the current page says there is one.
  pub async fn previous_page(&self) -> Result<ContactPage> {
    let page = self.contacts().await?;
    if !page.has_previous_page {
      return Ok(page);
    }
    {
      let mut state = self.state();
      state.offset = state.offset.saturating_sub(self.limit());
    }
    self.contacts().await
  }

  /// Invalidate everything and refetch the current page, plus the stats if
  /// they were cached. Returns whether the page could be fetched; failures
  /// are logged, not returned.
  pub async fn refresh(&self) -> bool {
    self.refreshing.store(true, Ordering::SeqCst);
    let _guard = RefreshGuard(&self.refreshing);

    let invalidated = self.coordinator.invalidate_all();
    let query = self.query();
    let ok = match self.coordinator.fetch_list(&query).await {
      Ok(_) => true,
      Err(e) => {
        tracing::warn!(?query, error = %e, "refresh failed");
        false
      }
    };

    if invalidated.stats
      && let Err(e) = self.coordinator.fetch_stats().await
    {
      tracing::warn!(error = %e, "stats refresh failed");
    }
    ok
  }
}
