//! Handlers for `/contacts` and `/stats`.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/contacts` | Optional `search`, `limit` (1..=100, default 10), `offset` |
//! | `POST`   | `/contacts` | Body: [`ContactInput`]; returns 201 + stored contact |
//! | `GET`    | `/contacts/:id` | 404 if not found |
//! | `PUT`    | `/contacts/:id` | Body: [`ContactInput`] |
//! | `DELETE` | `/contacts/:id` | Returns `{"success": true}` |
//! | `GET`    | `/stats` | [`ContactStats`] |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rolo_core::{
  contact::{Contact, ContactId, ContactInput},
  query::{ContactPage, ContactQuery, ContactStats},
  store::ContactStore,
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{ApiError, JsonBody, PathParam, QueryParams};

/// Page size when the request does not name one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub search: Option<String>,
  pub limit:  Option<u32>,
  pub offset: Option<u32>,
}

/// `GET /contacts[?search=...][&limit=...][&offset=...]`
pub async fn list<S: ContactStore>(
  State(store): State<Arc<S>>,
  QueryParams(params): QueryParams<ListParams>,
) -> Result<Json<ContactPage>, ApiError> {
  let query = ContactQuery::new(
    params.search.as_deref(),
    params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    params.offset.unwrap_or(0),
  );
  query.validate()?;

  let page = store.list(&query).await.map_err(ApiError::store)?;
  Ok(Json(page))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /contacts/:id`
pub async fn get_one<S: ContactStore>(
  State(store): State<Arc<S>>,
  PathParam(id): PathParam<ContactId>,
) -> Result<Json<Contact>, ApiError> {
  let contact = store
    .get(id)
    .await
    .map_err(ApiError::store)?
    .ok_or(rolo_core::Error::ContactNotFound(id))?;
  Ok(Json(contact))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /contacts`
pub async fn create<S: ContactStore>(
  State(store): State<Arc<S>>,
  JsonBody(body): JsonBody<ContactInput>,
) -> Result<impl IntoResponse, ApiError> {
  let contact = store.create(body).await.map_err(ApiError::store)?;
  tracing::info!(id = contact.id, "contact created");
  Ok((StatusCode::CREATED, Json(contact)))
}

// ─── Update ───────────────────────────────────────────────────────────────────

/// `PUT /contacts/:id`
pub async fn update<S: ContactStore>(
  State(store): State<Arc<S>>,
  PathParam(id): PathParam<ContactId>,
  JsonBody(body): JsonBody<ContactInput>,
) -> Result<Json<Contact>, ApiError> {
  let contact = store.update(id, body).await.map_err(ApiError::store)?;
  tracing::info!(id, "contact updated");
  Ok(Json(contact))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /contacts/:id`
pub async fn delete_one<S: ContactStore>(
  State(store): State<Arc<S>>,
  PathParam(id): PathParam<ContactId>,
) -> Result<Json<Value>, ApiError> {
  store.delete(id).await.map_err(ApiError::store)?;
  tracing::info!(id, "contact deleted");
  Ok(Json(json!({ "success": true })))
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// `GET /stats`
pub async fn stats<S: ContactStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<ContactStats>, ApiError> {
  let stats = store.stats().await.map_err(ApiError::store)?;
  Ok(Json(stats))
}
