//! Error types for `biomap-core`.

use thiserror::Error;

use crate::{
  check::Located,
  record::{Curie, IdentityKey, MalformedRecord},
  store::StoreKind,
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed record: {0}")]
  Malformed(#[from] MalformedRecord),

  /// The addressed prediction is no longer pending. Retryable after the
  /// caller re-reads the review page.
  #[error("prediction {key} is no longer pending{}", describe_stale(.expected_position, .found))]
  StaleRecord {
    key:               IdentityKey,
    expected_position: Option<usize>,
    /// What sits at `expected_position` now, if anything.
    found:             Option<IdentityKey>,
  },

  #[error("{candidate} conflicts with an existing {} mapping: {}", .existing.store, .existing.record.identity_key())]
  DuplicateMapping {
    candidate: IdentityKey,
    existing:  Box<Located>,
  },

  #[error("no {kind} mapping {key}")]
  NotFound { kind: StoreKind, key: IdentityKey },

  #[error("invalid decision: {0}")]
  InvalidDecision(String),

  #[error("{0} cannot be mapped to itself")]
  SelfMapping(Curie),

  #[error("{0} is not a prediction")]
  NotAPrediction(IdentityKey),

  #[error("store error: {0}")]
  Store(Box<dyn std::error::Error + Send + Sync>),
}

fn describe_stale(expected: &Option<usize>, found: &Option<IdentityKey>) -> String {
  match (expected, found) {
    (Some(position), Some(found)) => format!(" (row {position} now holds {found})"),
    (Some(position), None) => format!(" (row {position} no longer exists)"),
    (None, _) => String::new(),
  }
}

impl Error {
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self { Self::Store(Box::new(e)) }

  /// Whether re-reading current state and retrying can succeed.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::StaleRecord { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
