//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::{
    FromRequest, FromRequestParts, Path, Query,
    rejection::{JsonRejection, PathRejection, QueryRejection},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use rolo_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
///
/// The body is `{"error": <message>, "kind": <kind>}`; clients map the status
/// code back onto [`rolo_core::Error`].
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub rolo_core::Error);

impl ApiError {
  /// Convert any store error into an API error.
  pub fn store<E: Into<rolo_core::Error>>(err: E) -> Self { Self(err.into()) }

  pub fn status(&self) -> StatusCode {
    match self.0.kind() {
      ErrorKind::Validation => StatusCode::BAD_REQUEST,
      ErrorKind::Conflict => StatusCode::CONFLICT,
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Backend => StatusCode::INTERNAL_SERVER_ERROR,
      ErrorKind::Transport => StatusCode::BAD_GATEWAY,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self.0, "request failed");
    }

    let message = match &self.0 {
      rolo_core::Error::Validation(m) => m.clone(),
      other => other.to_string(),
    };
    let body = json!({ "error": message, "kind": self.0.kind().as_ref() });
    (status, Json(body)).into_response()
  }
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// [`Json`] whose rejection (malformed body, wrong content type) is answered
/// with the same `{"error", "kind"}` body as every other failure.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// [`Path`] with its rejection reported as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct PathParam<T>(pub T);

/// [`Query`] with its rejection reported as an [`ApiError`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

fn rejected(message: String) -> ApiError {
  ApiError(rolo_core::Error::Validation(message))
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self { rejected(rejection.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(rejection: PathRejection) -> Self { rejected(rejection.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(rejection: QueryRejection) -> Self { rejected(rejection.body_text()) }
}
