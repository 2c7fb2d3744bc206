//! Duplication and contradiction analysis over all four stores.
//!
//! [`check`] is pure: it reads a [`Snapshot`] and reports. It backs the
//! integrity gate (no error-severity violations allowed) and the curation
//! warnings report.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::{
  record::{IdentityKey, MappingRecord, PairKey, Predicate},
  store::{Snapshot, StoreKind},
};

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
  DuplicateInStore,
  CrossStoreCollision,
  InverseContradiction,
  SelfMapping,
  SamePrefix,
  MisplacedNotRelated,
  KindMismatch,
}

impl ViolationKind {
  pub fn severity(self) -> Severity {
    match self {
      Self::SamePrefix => Severity::Warning,
      _ => Severity::Error,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
  Warning,
  Error,
}

/// A record together with where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Located {
  pub store:    StoreKind,
  /// Zero-based row index, not counting the header.
  pub position: usize,
  pub record:   MappingRecord,
}

impl Located {
  fn new(store: StoreKind, position: usize, record: &MappingRecord) -> Self {
    Self { store, position, record: record.clone() }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
  pub kind:     ViolationKind,
  pub severity: Severity,
  pub records:  Vec<Located>,
  pub message:  String,
}

impl Violation {
  fn new(kind: ViolationKind, records: Vec<Located>, message: String) -> Self {
    Self { kind, severity: kind.severity(), records, message }
  }
}

/// `true` when no error-severity violation is present.
pub fn is_clean(violations: &[Violation]) -> bool {
  violations.iter().all(|v| v.severity < Severity::Error)
}

// ─── Analysis ────────────────────────────────────────────────────────────────

/// Run every rule over `snapshot`. Output order is deterministic: per-record
/// rules in store order, then duplicates, collisions and contradictions in
/// key order.
pub fn check(snapshot: &Snapshot) -> Vec<Violation> {
  let mut out = Vec::new();
  per_record(snapshot, &mut out);
  duplicates_in_store(snapshot, &mut out);
  cross_store_collisions(snapshot, &mut out);
  inverse_contradictions(snapshot, &mut out);
  out
}

fn per_record(snapshot: &Snapshot, out: &mut Vec<Violation>) {
  for (kind, position, record) in snapshot.iter() {
    let here = || vec![Located::new(kind, position, record)];

    if let Err(e) = kind.admit(record) {
      out.push(Violation::new(
        ViolationKind::KindMismatch,
        here(),
        format!("{kind}:{position}: {e}"),
      ));
    }
    if record.is_self_mapping() {
      out.push(Violation::new(
        ViolationKind::SelfMapping,
        here(),
        format!("{kind}:{position}: {} is mapped to itself", record.subject.curie()),
      ));
    }
    if record.predicate == Predicate::NotRelated && kind != StoreKind::Negative {
      out.push(Violation::new(
        ViolationKind::MisplacedNotRelated,
        here(),
        format!("{kind}:{position}: not-related is only valid in the negative store"),
      ));
    }
    if kind != StoreKind::Negative
      && record.predicate.is_positive()
      && record.subject.prefix == record.object.prefix
      && !record.is_self_mapping()
    {
      out.push(Violation::new(
        ViolationKind::SamePrefix,
        here(),
        format!(
          "{kind}:{position}: {} and {} share the prefix {}",
          record.subject.curie(),
          record.object.curie(),
          record.subject.prefix,
        ),
      ));
    }
  }
}

fn duplicates_in_store(snapshot: &Snapshot, out: &mut Vec<Violation>) {
  for kind in StoreKind::ALL {
    let mut groups: BTreeMap<IdentityKey, Vec<usize>> = BTreeMap::new();
    for (position, record) in snapshot.get(kind).iter().enumerate() {
      groups.entry(record.canonical_key()).or_default().push(position);
    }
    for (key, positions) in groups.into_iter().filter(|(_, p)| p.len() > 1) {
      let records = positions
        .iter()
        .map(|&p| Located::new(kind, p, &snapshot.get(kind)[p]))
        .collect();
      out.push(Violation::new(
        ViolationKind::DuplicateInStore,
        records,
        format!("{kind}: {key} appears {} times (rows {positions:?})", positions.len()),
      ));
    }
  }
}

fn cross_store_collisions(snapshot: &Snapshot, out: &mut Vec<Violation>) {
  let mut groups: BTreeMap<PairKey, Vec<Located>> = BTreeMap::new();
  for (kind, position, record) in snapshot.iter() {
    groups
      .entry(record.pair_key())
      .or_default()
      .push(Located::new(kind, position, record));
  }
  for (pair, records) in groups {
    let stores: BTreeSet<StoreKind> = records.iter().map(|l| l.store).collect();
    if stores.len() > 1 {
      let names: Vec<String> = stores.iter().map(ToString::to_string).collect();
      out.push(Violation::new(
        ViolationKind::CrossStoreCollision,
        records,
        format!("{pair} is present in {}", names.join(", ")),
      ));
    }
  }
}

/// Two different assertions about one pair in the positive store, or a
/// directional positive whose reverse-direction assertion was rejected.
fn inverse_contradictions(snapshot: &Snapshot, out: &mut Vec<Violation>) {
  let positives = snapshot.get(StoreKind::Positive);
  let mut by_pair: BTreeMap<PairKey, Vec<usize>> = BTreeMap::new();
  for (position, record) in positives.iter().enumerate() {
    by_pair.entry(record.pair_key()).or_default().push(position);
  }
  for (pair, positions) in by_pair {
    let assertions: BTreeSet<IdentityKey> =
      positions.iter().map(|&p| positives[p].canonical_key()).collect();
    if assertions.len() > 1 {
      let records = positions
        .iter()
        .map(|&p| Located::new(StoreKind::Positive, p, &positives[p]))
        .collect();
      let described: Vec<String> = assertions.iter().map(ToString::to_string).collect();
      out.push(Violation::new(
        ViolationKind::InverseContradiction,
        records,
        format!("{pair} is confirmed with conflicting relations: {}", described.join("; ")),
      ));
    }
  }

  let negatives = snapshot.get(StoreKind::Negative);
  let rejected: BTreeMap<IdentityKey, usize> = negatives
    .iter()
    .enumerate()
    .map(|(p, r)| (r.canonical_key(), p))
    .collect();
  for (position, record) in positives.iter().enumerate() {
    if record.predicate.is_self_inverse() {
      continue;
    }
    // Same relation pointing the other way, e.g. A broader B against B broader A.
    let reversed = IdentityKey {
      subject:   record.object.curie(),
      predicate: record.predicate,
      object:    record.subject.curie(),
    };
    if let Some(&negative) = rejected.get(&reversed.canonical()) {
      out.push(Violation::new(
        ViolationKind::InverseContradiction,
        vec![
          Located::new(StoreKind::Positive, position, record),
          Located::new(StoreKind::Negative, negative, &negatives[negative]),
        ],
        format!(
          "{} is confirmed while {reversed} is rejected",
          record.identity_key()
        ),
      ));
    }
  }
}
