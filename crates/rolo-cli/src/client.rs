//! Async HTTP client wrapping the Rolo JSON API.
//!
//! [`ApiClient`] implements [`ContactStore`], so the cache and coordinator run
//! unchanged against a remote server or an in-process store.

use std::{str::FromStr as _, time::Duration};

use anyhow::Context as _;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rolo_core::{
  Error, ErrorKind, Result,
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};
use serde::{Deserialize, de::DeserializeOwned};

/// Connection settings for the Rolo API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Whole-request timeout; an expired request surfaces as a transport error.
  pub timeout:  Duration,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:5232".to_string(),
      timeout:  Duration::from_secs(30),
    }
  }
}

/// Error body produced by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
  error: String,
  kind:  Option<String>,
}

/// What a failed request was about, used to rebuild a typed error from the
/// response.
#[derive(Debug, Default, Clone, Copy)]
struct Target<'a> {
  id:    Option<ContactId>,
  email: Option<&'a str>,
}

/// Async HTTP client for the Rolo JSON API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!(
      "{}/api{}",
      self.config.base_url.trim_end_matches('/'),
      path
    )
  }

  async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
    req
      .send()
      .await
      .map_err(|e| Error::Transport(format!("{what} failed: {e}")))
  }

  /// Decode a successful response, or turn a failed one into a typed error.
  async fn read<T: DeserializeOwned>(
    resp: Response,
    what: &str,
    target: Target<'_>,
  ) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
      return resp
        .json()
        .await
        .map_err(|e| Error::Transport(format!("{what}: decoding response: {e}")));
    }

    let body = resp.json::<ErrorBody>().await.ok();
    Err(classify(status, body, what, target))
  }
}

fn classify(
  status: StatusCode,
  body: Option<ErrorBody>,
  what: &str,
  target: Target<'_>,
) -> Error {
  let kind = body
    .as_ref()
    .and_then(|b| b.kind.as_deref())
    .and_then(|k| ErrorKind::from_str(k).ok())
    .unwrap_or(match status {
      StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ErrorKind::Validation,
      StatusCode::CONFLICT => ErrorKind::Conflict,
      StatusCode::NOT_FOUND => ErrorKind::NotFound,
      _ => ErrorKind::Backend,
    });
  let message = body.map(|b| b.error).unwrap_or_else(|| status.to_string());

  match (kind, target) {
    (ErrorKind::Validation, _) => Error::Validation(message),
    (ErrorKind::Conflict, Target { email: Some(email), .. }) => {
      Error::DuplicateEmail(email.trim().to_lowercase())
    }
    (ErrorKind::NotFound, Target { id: Some(id), .. }) => Error::ContactNotFound(id),
    _ => Error::Backend(format!("{what} → {status}: {message}")),
  }
}

// ─── ContactStore impl ───────────────────────────────────────────────────────

impl ContactStore for ApiClient {
  type Error = Error;

  /// `GET /api/contacts?search=…&limit=…&offset=…`
  async fn list(&self, query: &ContactQuery) -> Result<ContactPage> {
    let mut params = vec![
      ("limit", query.limit.to_string()),
      ("offset", query.offset.to_string()),
    ];
    if let Some(search) = &query.search {
      params.push(("search", search.clone()));
    }

    let what = "GET /contacts";
    let resp = self
      .send(self.client.get(self.url("/contacts")).query(&params), what)
      .await?;
    Self::read(resp, what, Target::default()).await
  }

  /// `GET /api/contacts/:id`; a 404 is `Ok(None)`.
  async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
    let what = "GET /contacts/:id";
    let resp = self
      .send(self.client.get(self.url(&format!("/contacts/{id}"))), what)
      .await?;
    if resp.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    Self::read(resp, what, Target { id: Some(id), email: None }).await
  }

  /// `POST /api/contacts`
  async fn create(&self, input: ContactInput) -> Result<Contact> {
    let what = "POST /contacts";
    let resp = self
      .send(self.client.post(self.url("/contacts")).json(&input), what)
      .await?;
    Self::read(resp, what, Target { id: None, email: Some(&input.email) }).await
  }

  /// `PUT /api/contacts/:id`
  async fn update(&self, id: ContactId, input: ContactInput) -> Result<Contact> {
    let what = "PUT /contacts/:id";
    let resp = self
      .send(
        self.client.put(self.url(&format!("/contacts/{id}"))).json(&input),
        what,
      )
      .await?;
    Self::read(resp, what, Target { id: Some(id), email: Some(&input.email) }).await
  }

  /// `DELETE /api/contacts/:id`
  async fn delete(&self, id: ContactId) -> Result<()> {
    let what = "DELETE /contacts/:id";
    let resp = self
      .send(self.client.delete(self.url(&format!("/contacts/{id}"))), what)
      .await?;
    let _: serde_json::Value = Self::read(resp, what, Target { id: Some(id), email: None }).await?;
    Ok(())
  }

  /// `GET /api/stats`
  async fn stats(&self) -> Result<ContactStats> {
    let what = "GET /stats";
    let resp = self.send(self.client.get(self.url("/stats")), what).await?;
    Self::read(resp, what, Target::default()).await
  }
}
