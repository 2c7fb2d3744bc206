//! Handler for `GET /integrity`: the checker over all four stores.

use axum::{Json, extract::State};
use biomap_core::{
  MappingStore,
  check::{self, Violation},
};
use serde::Serialize;

use crate::{ApiState, error::ApiError, run};

#[derive(Debug, Serialize)]
pub struct IntegrityReport {
  /// No error-severity violations.
  pub clean:      bool,
  pub violations: Vec<Violation>,
}

/// `GET /integrity`
pub async fn handler<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Json<IntegrityReport>, ApiError> {
  let violations = run(&state, |engine| engine.check()).await?;
  Ok(Json(IntegrityReport { clean: check::is_clean(&violations), violations }))
}
