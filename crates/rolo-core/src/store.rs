//! The `ContactStore` trait.
//!
//! The trait is implemented by the authoritative backend
//! (`rolo-store-sqlite`) and by the HTTP client in `rolo-cli`, so the client
//! cache can sit in front of either.

use std::future::Future;

use crate::{
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
};

/// Abstraction over the contact service.
///
/// Every error converts into the shared [`crate::Error`] taxonomy so callers
/// can tell conflicts, missing records, and validation and transport failures
/// apart without knowing the backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ContactStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// Return one page of contacts matching `query`, plus the total match
  /// count.
  fn list<'a>(
    &'a self,
    query: &'a ContactQuery,
  ) -> impl Future<Output = Result<ContactPage, Self::Error>> + Send + 'a;

  /// Retrieve a contact by id. Returns `None` if not found.
  fn get(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<Option<Contact>, Self::Error>> + Send + '_;

  /// Validate, normalise and persist a new contact. The id and both
  /// timestamps are assigned by the store.
  ///
  /// Fails with a duplicate-email error if the address is already taken.
  fn create(
    &self,
    input: ContactInput,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  /// Overwrite every field of an existing contact and bump `updated_at`.
  fn update(
    &self,
    id: ContactId,
    input: ContactInput,
  ) -> impl Future<Output = Result<Contact, Self::Error>> + Send + '_;

  /// Remove a contact. Fails with a not-found error if it does not exist.
  fn delete(
    &self,
    id: ContactId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Aggregate counts over all contacts.
  fn stats(&self) -> impl Future<Output = Result<ContactStats, Self::Error>> + Send + '_;
}
