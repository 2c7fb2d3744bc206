//! The `MappingStore` trait and the change-set it applies.
//!
//! The trait is implemented by storage backends (e.g. `biomap-store-tsv`).
//! Every read goes to the backing medium; implementations must not cache
//! records across calls, so edits made outside the process are always seen.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::record::{CurationType, IdentityKey, MalformedRecord, MappingRecord};

// ─── Store kinds ─────────────────────────────────────────────────────────────

/// One of the four parallel record collections.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
  Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StoreKind {
  /// Confirmed-true.
  Positive,
  /// Confirmed-false.
  Negative,
  Unsure,
  Predicted,
}

impl StoreKind {
  pub const ALL: [Self; 4] = [Self::Positive, Self::Negative, Self::Unsure, Self::Predicted];

  pub const CURATED: [Self; 3] = [Self::Positive, Self::Negative, Self::Unsure];

  pub fn file_name(self) -> &'static str {
    match self {
      Self::Positive => "positive.tsv",
      Self::Negative => "negative.tsv",
      Self::Unsure => "unsure.tsv",
      Self::Predicted => "predictions.tsv",
    }
  }

  pub fn expected_type(self) -> CurationType {
    match self {
      Self::Predicted => CurationType::Predicted,
      _ => CurationType::ManuallyReviewed,
    }
  }

  pub fn is_curated(self) -> bool { self != Self::Predicted }

  /// Check the per-store type invariant for `record`.
  pub fn admit(self, record: &MappingRecord) -> Result<(), MalformedRecord> {
    let expected = self.expected_type();
    if record.curation != expected {
      return Err(MalformedRecord::WrongType { expected, found: record.curation });
    }
    match (expected, record.confidence) {
      (CurationType::Predicted, None) => Err(MalformedRecord::MissingConfidence),
      (CurationType::ManuallyReviewed, Some(_)) => Err(MalformedRecord::ConfidenceOnReviewed),
      _ => Ok(()),
    }
  }
}

// ─── Change sets ─────────────────────────────────────────────────────────────

/// A single row-level edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
  /// Drop the row(s) whose identity key equals `key`.
  Remove { kind: StoreKind, key: IdentityKey },
  /// Overwrite the row whose identity key equals `key`, keeping its position.
  Replace {
    kind:   StoreKind,
    key:    IdentityKey,
    record: MappingRecord,
  },
  /// Add a row at the end of the store.
  Append { kind: StoreKind, record: MappingRecord },
}

impl Change {
  pub fn kind(&self) -> StoreKind {
    match self {
      Self::Remove { kind, .. } | Self::Replace { kind, .. } | Self::Append { kind, .. } => *kind,
    }
  }
}

/// An ordered group of edits applied all-or-nothing by
/// [`MappingStore::apply`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
  changes: Vec<Change>,
}

impl Changeset {
  pub fn new() -> Self { Self::default() }

  pub fn remove(&mut self, kind: StoreKind, key: IdentityKey) -> &mut Self {
    self.changes.push(Change::Remove { kind, key });
    self
  }

  pub fn replace(&mut self, kind: StoreKind, key: IdentityKey, record: MappingRecord) -> &mut Self {
    self.changes.push(Change::Replace { kind, key, record });
    self
  }

  pub fn append(&mut self, kind: StoreKind, record: MappingRecord) -> &mut Self {
    self.changes.push(Change::Append { kind, record });
    self
  }

  pub fn changes(&self) -> &[Change] { &self.changes }

  pub fn is_empty(&self) -> bool { self.changes.is_empty() }

  /// Distinct stores touched, in [`StoreKind`] order.
  pub fn kinds(&self) -> Vec<StoreKind> {
    let mut kinds: Vec<StoreKind> = self.changes.iter().map(Change::kind).collect();
    kinds.sort();
    kinds.dedup();
    kinds
  }

  /// Distinct stores touched, in the order their new contents should land:
  /// stores that receive a row before stores that only lose rows. An
  /// interrupted commit then leaves a relocated row in both stores, where
  /// the checker reports it, never in neither.
  pub fn commit_order(&self) -> Vec<StoreKind> {
    let (gaining, losing): (Vec<StoreKind>, Vec<StoreKind>) = self
      .kinds()
      .into_iter()
      .partition(|&kind| self.for_kind(kind).any(|c| !matches!(c, Change::Remove { .. })));
    gaining.into_iter().chain(losing).collect()
  }

  /// The edits that touch `kind`, in submission order.
  pub fn for_kind(&self, kind: StoreKind) -> impl Iterator<Item = &Change> {
    self.changes.iter().filter(move |c| c.kind() == kind)
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the backing medium of the four stores.
///
/// The store performs no in-process serialisation of writers. Callers that
/// read, decide and write hold the guard returned by [`MappingStore::lock`]
/// for the whole sequence.
pub trait MappingStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Held for the duration of a critical section; released on drop.
  type Guard: Send;

  /// Acquire exclusive access to the whole store.
  fn lock(&self) -> Result<Self::Guard, Self::Error>;

  /// Read every record of `kind`, in on-disk order. Fails as a whole if any
  /// row is malformed.
  fn load(&self, kind: StoreKind) -> Result<Vec<MappingRecord>, Self::Error>;

  /// Replace the full contents of `kind`. Rows repeating an earlier identity
  /// key are dropped.
  fn save(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<(), Self::Error>;

  /// Add `records` at the end of `kind`, skipping identities already
  /// present. Returns the number of rows written.
  fn append(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<usize, Self::Error>;

  /// Apply every change or none of them. Rows not named by a change keep
  /// their position and text.
  fn apply(&self, changes: &Changeset) -> Result<(), Self::Error>;

  /// Human-readable location of `kind` (e.g. a file path), for reports.
  fn location(&self, kind: StoreKind) -> String;
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The contents of all four stores read at one moment.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
  stores: BTreeMap<StoreKind, Vec<MappingRecord>>,
}

impl Snapshot {
  pub fn new() -> Self { Self::default() }

  pub fn load<S: MappingStore>(store: &S) -> Result<Self, S::Error> {
    let mut snapshot = Self::new();
    for kind in StoreKind::ALL {
      snapshot.stores.insert(kind, store.load(kind)?);
    }
    Ok(snapshot)
  }

  pub fn with(mut self, kind: StoreKind, records: Vec<MappingRecord>) -> Self {
    self.stores.insert(kind, records);
    self
  }

  pub fn get(&self, kind: StoreKind) -> &[MappingRecord] {
    self.stores.get(&kind).map(Vec::as_slice).unwrap_or_default()
  }

  /// Every record with its store and row position.
  pub fn iter(&self) -> impl Iterator<Item = (StoreKind, usize, &MappingRecord)> {
    StoreKind::ALL
      .into_iter()
      .flat_map(move |kind| self.get(kind).iter().enumerate().map(move |(i, r)| (kind, i, r)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::record::{Confidence, EntityRef, Predicate};

  fn prediction() -> MappingRecord {
    MappingRecord::prediction(
      EntityRef::new("mesh", "D001", "Foo"),
      Predicate::ExactMatch,
      EntityRef::new("chebi", "C001", "Bar"),
      Confidence::from_f64(0.9).unwrap(),
      "script:gen.py",
    )
  }

  #[test]
  fn kinds_admit_only_their_type() {
    let p = prediction();
    assert!(StoreKind::Predicted.admit(&p).is_ok());
    assert!(matches!(
      StoreKind::Positive.admit(&p),
      Err(MalformedRecord::WrongType { .. })
    ));
    let reviewed = p.into_reviewed(Predicate::ExactMatch, "orcid:1");
    assert!(StoreKind::Unsure.admit(&reviewed).is_ok());
    assert!(StoreKind::Predicted.admit(&reviewed).is_err());
  }

  #[test]
  fn changeset_reports_touched_kinds_once() {
    let p = prediction();
    let mut changes = Changeset::new();
    changes
      .append(StoreKind::Positive, p.clone())
      .remove(StoreKind::Predicted, p.identity_key())
      .append(StoreKind::Positive, p);
    assert_eq!(changes.kinds(), vec![StoreKind::Positive, StoreKind::Predicted]);
    assert_eq!(changes.for_kind(StoreKind::Positive).count(), 2);
  }

  #[test]
  fn stores_gaining_rows_commit_first() {
    let reviewed = prediction().into_reviewed(Predicate::ExactMatch, "orcid:1");
    let key = reviewed.identity_key();

    let mut relocation = Changeset::new();
    relocation.remove(StoreKind::Positive, key.clone()).append(StoreKind::Unsure, reviewed.clone());
    assert_eq!(relocation.kinds(), vec![StoreKind::Positive, StoreKind::Unsure]);
    assert_eq!(relocation.commit_order(), vec![StoreKind::Unsure, StoreKind::Positive]);

    let mut in_place = Changeset::new();
    in_place
      .remove(StoreKind::Predicted, prediction().identity_key())
      .replace(StoreKind::Negative, key.clone(), reviewed.clone())
      .remove(StoreKind::Positive, key);
    assert_eq!(
      in_place.commit_order(),
      vec![StoreKind::Negative, StoreKind::Positive, StoreKind::Predicted]
    );
  }

  #[test]
  fn kind_names_roundtrip() {
    assert_eq!(StoreKind::Predicted.to_string(), "predicted");
    assert_eq!("negative".parse::<StoreKind>().unwrap(), StoreKind::Negative);
  }
}
