//! Client side of Rolo: an HTTP [`client::ApiClient`], a keyed
//! [`cache::CacheStore`], and the [`coordinator::ContactCoordinator`] that
//! applies mutations to the cache optimistically before the service confirms
//! them.
//!
//! ```rust,ignore
//! let cache = CacheStore::shared();
//! let coordinator = Arc::new(ContactCoordinator::new(Arc::new(client), cache));
//! let search = SearchController::new(coordinator.clone());
//! let page = search.set_search("jo").await?;
//! ```

pub mod cache;
pub mod client;
pub mod coordinator;
pub mod messages;
pub mod mutation;
pub mod search;

#[cfg(test)]
mod testing;
