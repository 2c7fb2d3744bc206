//! The curation state machine.
//!
//! Every mutating operation runs as one critical section: acquire the store
//! lock, re-read the stores it depends on, decide, then hand a single
//! [`Changeset`] (or append) to the store. Nothing is cached between calls.

use std::{collections::HashSet, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};
use tracing::{debug, info, warn};

use crate::{
  check::{self, Located, Violation},
  error::{Error, Result},
  query::{self, Page, PredictionQuery, PrefixPairCount},
  record::{EntityRef, IdentityKey, MappingRecord, PairKey, Predicate},
  registry::{self, EmptyRegistry, IdentifierRegistry, ValidationWarning},
  store::{Changeset, MappingStore, Snapshot, StoreKind},
};

// ─── Decisions ───────────────────────────────────────────────────────────────

/// A curator's verdict on one mapping.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case", try_from = "String")]
#[strum(serialize_all = "kebab-case")]
pub enum Decision {
  ConfirmCorrect,
  ConfirmIncorrect,
  /// The subject is broader than the object.
  MarkBroader,
  /// The subject is narrower than the object.
  MarkNarrower,
  MarkUnsure,
}

impl Decision {
  /// The store a record ends up in.
  pub fn target(self) -> StoreKind {
    match self {
      Self::ConfirmCorrect | Self::MarkBroader | Self::MarkNarrower => StoreKind::Positive,
      Self::ConfirmIncorrect => StoreKind::Negative,
      Self::MarkUnsure => StoreKind::Unsure,
    }
  }

  /// The predicate a record carries after this decision.
  pub fn rewrite(self, predicate: Predicate) -> Result<Predicate> {
    match self {
      Self::ConfirmIncorrect => Ok(Predicate::NotRelated),
      Self::MarkBroader => Ok(Predicate::BroaderThan),
      Self::MarkNarrower => Ok(Predicate::NarrowerThan),
      Self::ConfirmCorrect | Self::MarkUnsure if predicate == Predicate::NotRelated => {
        Err(Error::InvalidDecision(format!(
          "{self} keeps the relation, but the record asserts none"
        )))
      }
      Self::ConfirmCorrect | Self::MarkUnsure => Ok(predicate),
    }
  }
}

impl FromStr for Decision {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let decision = match s.trim().to_lowercase().as_str() {
      "confirm-correct" | "yup" | "true" | "t" | "correct" | "right" | "close enough" | "disco" => {
        Self::ConfirmCorrect
      }
      "confirm-incorrect" | "no" | "nope" | "false" | "f" | "nada" | "nein" | "incorrect"
      | "negative" | "negatory" => Self::ConfirmIncorrect,
      "mark-unsure" | "unsure" | "maybe" | "idk" => Self::MarkUnsure,
      "mark-broader" | "broad" | "broader" => Self::MarkBroader,
      "mark-narrower" | "narrow" | "narrower" => Self::MarkNarrower,
      _ => return Err(Error::InvalidDecision(format!("unknown decision {s:?}"))),
    };
    Ok(decision)
  }
}

impl TryFrom<String> for Decision {
  type Error = Error;

  fn try_from(value: String) -> Result<Self> { value.parse() }
}

// ─── Request and result types ────────────────────────────────────────────────

/// Addresses a pending prediction. The position is a hint; the key is
/// authoritative and always re-validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
  #[serde(default)]
  pub position: Option<usize>,
  pub key:      IdentityKey,
}

impl RowRef {
  pub fn new(key: IdentityKey) -> Self { Self { position: None, key } }

  pub fn at(position: usize, key: IdentityKey) -> Self { Self { position: Some(position), key } }
}

/// What a successful mutation did.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
  /// The record as written.
  pub record:     MappingRecord,
  /// `None` for a novel mapping.
  pub from:       Option<StoreKind>,
  pub to:         StoreKind,
  /// Stores whose backing resource changed, for an external commit sink.
  pub changed:    Vec<StoreKind>,
  /// Other predictions for the same pair, retired with this decision.
  pub retired:    Vec<IdentityKey>,
  pub warnings:   Vec<ValidationWarning>,
  pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
  pub added:   usize,
  pub skipped: usize,
}

impl fmt::Display for ImportReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} added, {} skipped", self.added, self.skipped)
  }
}

/// What [`CurationEngine::prune_predictions`] dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
  pub kept:       usize,
  /// Predictions whose pair is already curated.
  pub curated:    usize,
  /// Repeats of an earlier prediction's identity.
  pub duplicates: usize,
}

impl PruneReport {
  pub fn removed(&self) -> usize { self.curated + self.duplicates }
}

impl fmt::Display for PruneReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} kept, {} already curated, {} duplicates",
      self.kept, self.curated, self.duplicates
    )
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct CurationEngine<S> {
  store:    S,
  registry: Arc<dyn IdentifierRegistry>,
}

fn find_pair(snapshot: &Snapshot, kinds: &[StoreKind], pair: &PairKey) -> Option<Located> {
  kinds.iter().find_map(|&kind| {
    snapshot
      .get(kind)
      .iter()
      .position(|r| r.pair_key() == *pair)
      .map(|position| Located {
        store: kind,
        position,
        record: snapshot.get(kind)[position].clone(),
      })
  })
}

fn duplicate(candidate: &MappingRecord, existing: Located) -> Error {
  Error::DuplicateMapping {
    candidate: candidate.identity_key(),
    existing:  Box::new(existing),
  }
}

impl<S: MappingStore> CurationEngine<S> {
  pub fn new(store: S) -> Self { Self { store, registry: Arc::new(EmptyRegistry) } }

  pub fn with_registry(mut self, registry: Arc<dyn IdentifierRegistry>) -> Self {
    self.registry = registry;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  fn lock(&self) -> Result<S::Guard> { self.store.lock().map_err(Error::store) }

  fn snapshot(&self) -> Result<Snapshot> { Snapshot::load(&self.store).map_err(Error::store) }

  fn warnings(&self, record: &MappingRecord) -> Vec<ValidationWarning> {
    let warnings = registry::validate(record, self.registry.as_ref());
    for w in &warnings {
      warn!(key = %record.identity_key(), "{w}");
    }
    warnings
  }

  /// Current contents of one store.
  pub fn load(&self, kind: StoreKind) -> Result<Vec<MappingRecord>> {
    self.store.load(kind).map_err(Error::store)
  }

  /// A page of pending predictions.
  pub fn page(&self, query: &PredictionQuery) -> Result<Page> {
    Ok(query::page(&self.load(StoreKind::Predicted)?, query))
  }

  /// Number of pending predictions matching `query`.
  pub fn count(&self, query: &PredictionQuery) -> Result<usize> {
    Ok(query::count(&self.load(StoreKind::Predicted)?, query))
  }

  pub fn summarize(&self, query: &PredictionQuery) -> Result<Vec<PrefixPairCount>> {
    Ok(query::summarize(&self.load(StoreKind::Predicted)?, query))
  }

  /// Run the integrity checker over all four stores.
  pub fn check(&self) -> Result<Vec<Violation>> { Ok(check::check(&self.snapshot()?)) }

  /// Review one pending prediction: remove it from the predicted store and
  /// write the reviewed record to the store `decision` targets.
  pub fn apply_decision(&self, row: &RowRef, decision: Decision, curator: &str) -> Result<Outcome> {
    let _guard = self.lock()?;
    let snapshot = self.snapshot()?;
    let predictions = snapshot.get(StoreKind::Predicted);

    let hinted = row.position.and_then(|p| predictions.get(p).map(|r| (p, r)));
    let position = match hinted {
      Some((p, r)) if r.identity_key() == row.key => Some(p),
      _ => predictions.iter().position(|r| r.identity_key() == row.key),
    };
    let Some(position) = position.filter(|&p| predictions[p].is_prediction()) else {
      let found = hinted.map(|(_, r)| r.identity_key());
      warn!(key = %row.key, position = ?row.position, "decision on a prediction that is no longer pending");
      return Err(Error::StaleRecord {
        key: row.key.clone(),
        expected_position: row.position,
        found,
      });
    };
    if row.position.is_some_and(|p| p != position) {
      debug!(key = %row.key, hint = ?row.position, position, "prediction moved since it was listed");
    }

    let prediction = &predictions[position];
    let predicate = decision.rewrite(prediction.predicate)?;
    let record = prediction.clone().into_reviewed(predicate, curator);
    let to = decision.target();

    if let Some(existing) = find_pair(&snapshot, &StoreKind::CURATED, &record.pair_key()) {
      warn!(key = %row.key, store = %existing.store, "decision collides with a curated mapping");
      return Err(duplicate(&record, existing));
    }

    // Sibling predictions on the same pair would collide with the new curation.
    // One removal per key drops every repeat of it.
    let mut seen = HashSet::new();
    let retired: Vec<IdentityKey> = predictions
      .iter()
      .filter(|r| r.pair_key() == record.pair_key())
      .map(MappingRecord::identity_key)
      .filter(|k| *k != row.key && seen.insert(k.clone()))
      .collect();

    let mut changes = Changeset::new();
    changes.remove(StoreKind::Predicted, row.key.clone());
    for key in &retired {
      changes.remove(StoreKind::Predicted, key.clone());
    }
    changes.append(to, record.clone());

    let warnings = self.warnings(&record);
    self.store.apply(&changes).map_err(Error::store)?;

    info!(key = %row.key, %decision, %to, curator, "applied curation decision");
    Ok(Outcome {
      record,
      from: Some(StoreKind::Predicted),
      to,
      changed: changes.kinds(),
      retired,
      warnings,
      decided_at: Utc::now(),
    })
  }

  /// Assert a mapping no prediction covers, straight into the positive store.
  pub fn add_novel_mapping(
    &self,
    subject: EntityRef,
    predicate: Predicate,
    object: EntityRef,
    curator: &str,
  ) -> Result<Outcome> {
    if !predicate.is_positive() {
      return Err(Error::InvalidDecision(
        "a novel mapping must assert a relation".to_owned(),
      ));
    }
    let record = MappingRecord::reviewed(subject, predicate, object, curator);
    if record.is_self_mapping() {
      return Err(Error::SelfMapping(record.subject.curie()));
    }

    let _guard = self.lock()?;
    let snapshot = self.snapshot()?;
    if let Some(existing) = find_pair(&snapshot, &StoreKind::ALL, &record.pair_key()) {
      warn!(key = %record.identity_key(), store = %existing.store, "novel mapping already present");
      return Err(duplicate(&record, existing));
    }

    let warnings = self.warnings(&record);
    self
      .store
      .append(StoreKind::Positive, std::slice::from_ref(&record))
      .map_err(Error::store)?;

    info!(key = %record.identity_key(), curator, "added novel mapping");
    Ok(Outcome {
      record,
      from: None,
      to: StoreKind::Positive,
      changed: vec![StoreKind::Positive],
      retired: Vec::new(),
      warnings,
      decided_at: Utc::now(),
    })
  }

  /// Re-curate an already reviewed mapping. The new curator takes over
  /// `source`; the row moves if `decision` targets another store and is
  /// rewritten in place otherwise.
  pub fn revise(
    &self,
    kind: StoreKind,
    key: &IdentityKey,
    decision: Decision,
    curator: &str,
  ) -> Result<Outcome> {
    if !kind.is_curated() {
      return Err(Error::InvalidDecision(
        "pending predictions are reviewed with a decision, not revised".to_owned(),
      ));
    }

    let _guard = self.lock()?;
    let snapshot = self.snapshot()?;
    let rows = snapshot.get(kind);
    let position = rows
      .iter()
      .position(|r| r.identity_key() == *key)
      .ok_or_else(|| Error::NotFound { kind, key: key.clone() })?;

    let current = &rows[position];
    let predicate = decision.rewrite(current.predicate)?;
    let record = current.clone().into_reviewed(predicate, curator);
    let to = decision.target();

    let collision = StoreKind::CURATED.iter().find_map(|&other| {
      snapshot
        .get(other)
        .iter()
        .enumerate()
        .filter(|&(p, _)| !(other == kind && p == position))
        .find(|(_, r)| r.pair_key() == record.pair_key())
        .map(|(p, r)| Located { store: other, position: p, record: r.clone() })
    });
    if let Some(existing) = collision {
      return Err(duplicate(&record, existing));
    }

    let mut changes = Changeset::new();
    if to == kind {
      changes.replace(kind, key.clone(), record.clone());
    } else {
      changes.remove(kind, key.clone()).append(to, record.clone());
    }

    let warnings = self.warnings(&record);
    self.store.apply(&changes).map_err(Error::store)?;

    info!(%key, from = %kind, %to, %decision, curator, "revised curated mapping");
    Ok(Outcome {
      record,
      from: Some(kind),
      to,
      changed: changes.kinds(),
      retired: Vec::new(),
      warnings,
      decided_at: Utc::now(),
    })
  }

  /// Append a batch from an external prediction generator. The batch is
  /// rejected whole if any row is not a prediction; rows already predicted,
  /// already curated, or repeated within the batch are skipped.
  pub fn import_predictions(&self, records: Vec<MappingRecord>) -> Result<ImportReport> {
    if let Some(bad) = records.iter().find(|r| StoreKind::Predicted.admit(r).is_err()) {
      return Err(Error::NotAPrediction(bad.identity_key()));
    }

    let _guard = self.lock()?;
    let snapshot = self.snapshot()?;
    let mut seen: HashSet<IdentityKey> = snapshot
      .get(StoreKind::Predicted)
      .iter()
      .map(MappingRecord::identity_key)
      .collect();
    let curated: HashSet<PairKey> = StoreKind::CURATED
      .iter()
      .flat_map(|&kind| snapshot.get(kind).iter().map(MappingRecord::pair_key))
      .collect();

    let total = records.len();
    let fresh: Vec<MappingRecord> = records
      .into_iter()
      .filter(|r| !r.is_self_mapping())
      .filter(|r| !curated.contains(&r.pair_key()))
      .filter(|r| seen.insert(r.identity_key()))
      .collect();

    let added = if fresh.is_empty() {
      0
    } else {
      self.store.append(StoreKind::Predicted, &fresh).map_err(Error::store)?
    };
    let report = ImportReport { added, skipped: total - added };
    info!(added = report.added, skipped = report.skipped, "imported predictions");
    Ok(report)
  }

  /// Drop predictions that can no longer be reviewed: those whose pair is
  /// already curated and repeats of an earlier identity. Surviving rows keep
  /// their order.
  pub fn prune_predictions(&self) -> Result<PruneReport> {
    let _guard = self.lock()?;
    let snapshot = self.snapshot()?;
    let curated: HashSet<PairKey> = StoreKind::CURATED
      .iter()
      .flat_map(|&kind| snapshot.get(kind).iter().map(MappingRecord::pair_key))
      .collect();

    let mut report = PruneReport::default();
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for record in snapshot.get(StoreKind::Predicted) {
      if curated.contains(&record.pair_key()) {
        debug!(key = %record.identity_key(), "pruning prediction on a curated pair");
        report.curated += 1;
      } else if !seen.insert(record.identity_key()) {
        report.duplicates += 1;
      } else {
        kept.push(record.clone());
      }
    }
    report.kept = kept.len();

    if report.removed() > 0 {
      self.store.save(StoreKind::Predicted, &kept).map_err(Error::store)?;
    }
    info!(
      kept = report.kept,
      curated = report.curated,
      duplicates = report.duplicates,
      "pruned predictions"
    );
    Ok(report)
  }
}
