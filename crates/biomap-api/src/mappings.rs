//! Handlers for the curated stores.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/mappings/{kind}` | Every record of `positive`, `negative`, `unsure` or `predicted` |
//! | `POST` | `/mappings` | Body: [`NovelBody`]; returns 201 + [`Outcome`] |
//! | `POST` | `/mappings/{kind}/revise` | Body: [`ReviseBody`]; re-curates one row |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use biomap_core::{
  Decision, EntityRef, IdentityKey, MappingRecord, MappingStore, Outcome, Predicate, StoreKind,
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError, run};

/// `GET /mappings/{kind}`
pub async fn list<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(kind): Path<StoreKind>,
) -> Result<Json<Vec<MappingRecord>>, ApiError> {
  let records = run(&state, move |engine| engine.load(kind)).await?;
  Ok(Json(records))
}

// ─── Novel mappings ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NovelBody {
  pub subject:   EntityRef,
  /// Defaults to exact match.
  pub predicate: Option<Predicate>,
  pub object:    EntityRef,
}

/// `POST /mappings`, returning 201 and the [`Outcome`].
pub async fn create<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Json(body): Json<NovelBody>,
) -> Result<impl IntoResponse, ApiError> {
  let curator = state.curator.clone();
  let predicate = body.predicate.unwrap_or(Predicate::ExactMatch);
  let outcome = run(&state, move |engine| {
    engine.add_novel_mapping(body.subject, predicate, body.object, &curator)
  })
  .await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}

// ─── Revisions ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ReviseBody {
  pub key:      IdentityKey,
  pub decision: String,
}

/// `POST /mappings/{kind}/revise`
pub async fn revise<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(kind): Path<StoreKind>,
  Json(body): Json<ReviseBody>,
) -> Result<Json<Outcome>, ApiError> {
  let decision: Decision = body.decision.parse()?;
  let curator = state.curator.clone();
  let outcome =
    run(&state, move |engine| engine.revise(kind, &body.key, decision, &curator)).await?;
  Ok(Json(outcome))
}
