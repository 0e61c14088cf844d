//! Store wrappers and fixtures for coordinator and controller tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rolo_core::{
  Error, Result,
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};

static NEXT_SEED: AtomicUsize = AtomicUsize::new(0);

/// Store `n` contacts with distinct emails, returning their ids in insertion
/// order. Last names sort in insertion order and before any letter past `N`.
pub async fn seed<S: ContactStore>(store: &S, n: usize) -> Vec<ContactId> {
  let mut ids = Vec::with_capacity(n);
  for _ in 0..n {
    let i = NEXT_SEED.fetch_add(1, Ordering::Relaxed);
    let input = ContactInput::new(
      "Person",
      format!("Number{i:04}"),
      format!("person{i}@example.com"),
    );
    let contact = store.create(input).await.map_err(Into::<Error>::into).unwrap();
    ids.push(contact.id);
  }
  ids
}

fn injected() -> Error { Error::Backend("injected failure".into()) }

/// Delegates reads to `inner` and fails every mutation. Reads can be made to
/// fail too with [`FailingStore::fail_reads`].
pub struct FailingStore<S> {
  inner:      S,
  fail_reads: AtomicBool,
  /// Yield once before failing a mutation, so concurrent mutations overlap.
  yielding:   bool,
}

impl<S> FailingStore<S> {
  pub fn new(inner: S) -> Self {
    Self { inner, fail_reads: AtomicBool::new(false), yielding: false }
  }

  pub fn yielding(inner: S) -> Self { Self { yielding: true, ..Self::new(inner) } }

  pub fn fail_reads(&self, fail: bool) { self.fail_reads.store(fail, Ordering::SeqCst); }

  fn check_reads(&self) -> Result<()> {
    if self.fail_reads.load(Ordering::SeqCst) { Err(injected()) } else { Ok(()) }
  }

  async fn pause(&self) {
    if self.yielding {
      tokio::task::yield_now().await;
    }
  }
}

impl<S: ContactStore> ContactStore for FailingStore<S> {
  type Error = Error;

  async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    self.check_reads()?;
    self.inner.list(query).await.map_err(Into::into)
  }

  async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
    self.check_reads()?;
    self.inner.get(id).await.map_err(Into::into)
  }

  async fn create(&self, _input: ContactInput) -> Result<Contact> {
    self.pause().await;
    Err(injected())
  }

  async fn update(&self, _id: ContactId, _input: ContactInput) -> Result<Contact> {
    self.pause().await;
    Err(injected())
  }

  async fn delete(&self, _id: ContactId) -> Result<()> {
    self.pause().await;
    Err(injected())
  }

  async fn stats(&self) -> Result<ContactStats> {
    self.check_reads()?;
    self.inner.stats().await.map_err(Into::into)
  }
}

/// Delegates reads to `inner`; mutations never complete.
pub struct HangingStore<S> {
  inner: S,
}

impl<S> HangingStore<S> {
  pub fn new(inner: S) -> Self { Self { inner } }
}

impl<S: ContactStore> ContactStore for HangingStore<S> {
  type Error = Error;

  async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    self.inner.list(query).await.map_err(Into::into)
  }

  async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
    self.inner.get(id).await.map_err(Into::into)
  }

  async fn create(&self, _input: ContactInput) -> Result<Contact> {
    std::future::pending().await
  }

  async fn update(&self, _id: ContactId, _input: ContactInput) -> Result<Contact> {
    std::future::pending().await
  }

  async fn delete(&self, _id: ContactId) -> Result<()> { std::future::pending().await }

  async fn stats(&self) -> Result<ContactStats> {
    self.inner.stats().await.map_err(Into::into)
  }
}

/// Delegates everything to `inner`, counting list calls.
pub struct CountingStore<S> {
  inner: S,
  lists: AtomicUsize,
}

impl<S> CountingStore<S> {
  pub fn new(inner: S) -> Self { Self { inner, lists: AtomicUsize::new(0) } }

  /// List calls made so far.
  pub fn lists(&self) -> usize { self.lists.load(Ordering::SeqCst) }
}

impl<S: ContactStore> ContactStore for CountingStore<S> {
  type Error = Error;

  async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    self.lists.fetch_add(1, Ordering::SeqCst);
    self.inner.list(query).await.map_err(Into::into)
  }

  async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
    self.inner.get(id).await.map_err(Into::into)
  }

  async fn create(&self, input: ContactInput) -> Result<Contact> {
    self.inner.create(input).await.map_err(Into::into)
  }

  async fn update(&self, id: ContactId, input: ContactInput) -> Result<Contact> {
    self.inner.update(id, input).await.map_err(Into::into)
  }

  async fn delete(&self, id: ContactId) -> Result<()> {
    self.inner.delete(id).await.map_err(Into::into)
  }

  async fn stats(&self) -> Result<ContactStats> {
    self.inner.stats().await.map_err(Into::into)
  }
}
