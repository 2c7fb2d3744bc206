//! JSON REST API for biomap curation.
//!
//! Exposes an axum [`Router`] over a [`CurationEngine`] backed by any
//! [`MappingStore`]. Store access is synchronous, so every handler runs the
//! engine on the blocking pool. Auth and TLS are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", biomap_api::api_router(ApiState::new(engine, curator)))
//! ```

pub mod error;
pub mod integrity;
pub mod mappings;
pub mod predictions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use biomap_core::{CurationEngine, MappingStore};

pub use error::ApiError;

// ─── State ───────────────────────────────────────────────────────────────────

/// Shared state for all handlers.
pub struct ApiState<S> {
  pub engine:  Arc<CurationEngine<S>>,
  /// Provenance stamped into `source` on every review made through the API.
  pub curator: Arc<str>,
}

impl<S> ApiState<S> {
  pub fn new(engine: CurationEngine<S>, curator: impl Into<Arc<str>>) -> Self {
    Self { engine: Arc::new(engine), curator: curator.into() }
  }
}

// Manual impl: `S` itself need not be `Clone`.
impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { engine: Arc::clone(&self.engine), curator: Arc::clone(&self.curator) }
  }
}

/// Run `f` against the engine on the blocking thread pool.
pub(crate) async fn run<S, T, F>(state: &ApiState<S>, f: F) -> Result<T, ApiError>
where
  S: MappingStore + 'static,
  T: Send + 'static,
  F: FnOnce(&CurationEngine<S>) -> biomap_core::Result<T> + Send + 'static,
{
  let engine = Arc::clone(&state.engine);
  tokio::task::spawn_blocking(move || f(&engine))
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))?
    .map_err(ApiError::from)
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: MappingStore + 'static,
{
  Router::new()
    // Review queue
    .route("/predictions", get(predictions::list::<S>).post(predictions::import::<S>))
    .route("/predictions/summary", get(predictions::summary::<S>))
    .route("/predictions/prune", post(predictions::prune::<S>))
    .route("/predictions/{position}/mark", post(predictions::mark::<S>))
    // Curated stores
    .route("/mappings", post(mappings::create::<S>))
    .route("/mappings/{kind}", get(mappings::list::<S>))
    .route("/mappings/{kind}/revise", post(mappings::revise::<S>))
    // Integrity
    .route("/integrity", get(integrity::handler::<S>))
    .with_state(state)
}
