//! JSON API for Rolo.
//!
//! Exposes an axum [`Router`] backed by any [`rolo_core::store::ContactStore`].
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rolo_api::api_router(store.clone()))
//! ```

pub mod contacts;
pub mod error;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, routing::get};
use rolo_core::store::ContactStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `rolo.toml` and `ROLO_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

impl ServerConfig {
  /// Built-in defaults, overridden by the TOML file at `path` (if present),
  /// overridden in turn by `ROLO_HOST`, `ROLO_PORT` and `ROLO_STORE_PATH`.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 5232)?
      .set_default("store_path", "rolo.db")?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("ROLO"))
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// `store_path` with a leading `~/` expanded to `$HOME`.
  pub fn resolved_store_path(&self) -> PathBuf {
    let raw = self.store_path.to_string_lossy();
    match (raw.strip_prefix("~/"), std::env::var_os("HOME")) {
      (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
      _ => self.store_path.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: ContactStore + 'static,
{
  Router::new()
    .route(
      "/contacts",
      get(contacts::list::<S>).post(contacts::create::<S>),
    )
    .route(
      "/contacts/{id}",
      get(contacts::get_one::<S>)
        .put(contacts::update::<S>)
        .delete(contacts::delete_one::<S>),
    )
    .route("/stats", get(contacts::stats::<S>))
    .with_state(store)
}

/// The full application: the API under `/api`, with request tracing.
pub fn app<S>(store: Arc<S>) -> Router
where
  S: ContactStore + 'static,
{
  Router::new()
    .nest("/api", api_router(store))
    .layer(TraceLayer::new_for_http())
}

// ─── Tests ────────────────────────────────────────────────────────────────────
