//! Handlers for `/predictions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/predictions` | Filters and paging from [`ListParams`]; returns a [`Page`] |
//! | `POST` | `/predictions` | Body: JSON array of predicted records; returns an [`ImportReport`] |
//! | `GET`  | `/predictions/summary` | Same filters; pending counts per prefix pair |
//! | `POST` | `/predictions/prune` | Drops predictions on curated pairs and repeats; returns a [`PruneReport`] |
//! | `POST` | `/predictions/{position}/mark` | Body: [`MarkBody`]; returns the [`Outcome`] |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use biomap_core::{
  Decision, IdentityKey, ImportReport, MappingRecord, MappingStore, Outcome, PruneReport, RowRef,
  query::{Page, PredictionQuery, PrefixPairCount, SortOrder},
};
use serde::Deserialize;

use crate::{ApiState, error::ApiError, run};

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  /// Free text over both sides and the provenance column.
  pub query:         Option<String>,
  pub source_query:  Option<String>,
  pub source_prefix: Option<String>,
  pub target_query:  Option<String>,
  pub target_prefix: Option<String>,
  pub prefix:        Option<String>,
  pub provenance:    Option<String>,
  #[serde(default)]
  pub same_text:     bool,
  pub sort:          Option<SortOrder>,
  pub offset:        Option<usize>,
  pub limit:         Option<usize>,
}

impl From<ListParams> for PredictionQuery {
  fn from(p: ListParams) -> Self {
    PredictionQuery {
      query:         p.query,
      source_query:  p.source_query,
      source_prefix: p.source_prefix,
      target_query:  p.target_query,
      target_prefix: p.target_prefix,
      prefix:        p.prefix,
      provenance:    p.provenance,
      same_text:     p.same_text,
      sort:          p.sort,
      offset:        p.offset.unwrap_or_default(),
      limit:         p.limit,
    }
  }
}

/// `GET /predictions[?query=...][&source_prefix=...][&sort=...][&offset=...][&limit=...]`
pub async fn list<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Page>, ApiError> {
  let query = PredictionQuery::from(params);
  let page = run(&state, move |engine| engine.page(&query)).await?;
  Ok(Json(page))
}

/// `GET /predictions/summary`
pub async fn summary<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<PrefixPairCount>>, ApiError> {
  let query = PredictionQuery::from(params);
  let rows = run(&state, move |engine| engine.summarize(&query)).await?;
  Ok(Json(rows))
}

// ─── Import ──────────────────────────────────────────────────────────────────

/// `POST /predictions`
pub async fn import<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Json(records): Json<Vec<MappingRecord>>,
) -> Result<Json<ImportReport>, ApiError> {
  let report = run(&state, move |engine| engine.import_predictions(records)).await?;
  Ok(Json(report))
}

/// `POST /predictions/prune`
pub async fn prune<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
) -> Result<Json<PruneReport>, ApiError> {
  let report = run(&state, |engine| engine.prune_predictions()).await?;
  Ok(Json(report))
}

// ─── Mark ────────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /predictions/{position}/mark`.
#[derive(Debug, Deserialize)]
pub struct MarkBody {
  /// Identity of the prediction the curator was shown at `position`.
  pub key:      IdentityKey,
  /// A decision name or one of its aliases (`yup`, `nope`, `idk`, ...).
  pub decision: String,
}

/// `POST /predictions/{position}/mark`
pub async fn mark<S: MappingStore + 'static>(
  State(state): State<ApiState<S>>,
  Path(position): Path<usize>,
  Json(body): Json<MarkBody>,
) -> Result<Json<Outcome>, ApiError> {
  let decision: Decision = body.decision.parse()?;
  let row = RowRef::at(position, body.key);
  let curator = state.curator.clone();
  let outcome = run(&state, move |engine| engine.apply_decision(&row, decision, &curator)).await?;
  Ok(Json(outcome))
}
