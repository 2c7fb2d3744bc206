//! Mapping records: the rows of the four curation stores.
//!
//! A record asserts a relation between two entities drawn from different
//! controlled vocabularies. Identity is a property of the
//! `(subject, predicate, object)` triple only; names, confidence, provenance
//! and justification never participate in identity comparisons.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

// ─── Table layout ────────────────────────────────────────────────────────────

/// Column names of every store, in on-disk order.
///
/// The first ten columns are the historical layout; the trailing
/// justification column is optional on read.
pub const HEADER: [&str; 11] = [
  "source prefix",
  "source identifier",
  "source name",
  "relation",
  "target prefix",
  "target identifier",
  "target name",
  "type",
  "confidence",
  "source",
  "mapping justification",
];

/// Number of columns in a row written before the justification column existed.
pub const LEGACY_COLUMNS: usize = 10;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// A row that cannot be turned into a [`MappingRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
  #[error("expected 10 or 11 columns, found {found}")]
  ColumnCount { found: usize },

  #[error("missing required field: {0}")]
  MissingField(&'static str),

  #[error("unknown relation code: {0:?}")]
  UnknownPredicate(String),

  #[error("unknown mapping justification code: {0:?}")]
  UnknownJustification(String),

  #[error("unknown curation type: {0:?}")]
  UnknownType(String),

  #[error("invalid confidence {0:?}: expected a decimal in [0, 1]")]
  InvalidConfidence(String),

  #[error("invalid CURIE: {0:?}")]
  InvalidCurie(String),

  #[error("a manually reviewed record cannot carry a confidence")]
  ConfidenceOnReviewed,

  #[error("a predicted record requires a confidence")]
  MissingConfidence,

  #[error("record of type {found} does not belong in a store of type {expected}")]
  WrongType {
    expected: CurationType,
    found:    CurationType,
  },
}

// ─── References ──────────────────────────────────────────────────────────────

/// Collapse tabs and line breaks so a value always fits in one TSV cell.
fn clean_cell(value: &str) -> String {
  value
    .trim()
    .chars()
    .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
    .collect()
}

/// A compact `prefix:identifier` pointer, without a display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Curie {
  pub prefix:     String,
  pub identifier: String,
}

impl Curie {
  pub fn new(prefix: &str, identifier: &str) -> Self {
    Self {
      prefix:     clean_cell(prefix).to_lowercase(),
      identifier: clean_cell(identifier),
    }
  }
}

impl fmt::Display for Curie {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.prefix, self.identifier)
  }
}

impl FromStr for Curie {
  type Err = MalformedRecord;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().split_once(':') {
      Some((prefix, identifier))
        if !prefix.trim().is_empty() && !identifier.trim().is_empty() =>
      {
        Ok(Self::new(prefix, identifier))
      }
      _ => Err(MalformedRecord::InvalidCurie(s.to_owned())),
    }
  }
}

impl Serialize for Curie {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for Curie {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
  }
}

/// A concept in an external vocabulary.
///
/// `name` is a display label only. Construction lowercases the prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntityRefParts")]
pub struct EntityRef {
  pub prefix:     String,
  pub identifier: String,
  pub name:       String,
}

#[derive(Deserialize)]
struct EntityRefParts {
  prefix:     String,
  identifier: String,
  #[serde(default)]
  name:       String,
}

impl From<EntityRefParts> for EntityRef {
  fn from(p: EntityRefParts) -> Self { Self::new(&p.prefix, &p.identifier, &p.name) }
}

impl EntityRef {
  pub fn new(prefix: &str, identifier: &str, name: &str) -> Self {
    let curie = Curie::new(prefix, identifier);
    Self {
      prefix:     curie.prefix,
      identifier: curie.identifier,
      name:       clean_cell(name),
    }
  }

  pub fn curie(&self) -> Curie {
    Curie {
      prefix:     self.prefix.clone(),
      identifier: self.identifier.clone(),
    }
  }

  /// Same prefix and identifier; names are ignored.
  pub fn same_entity(&self, other: &EntityRef) -> bool {
    self.prefix == other.prefix && self.identifier == other.identifier
  }
}

// ─── Codes ───────────────────────────────────────────────────────────────────

/// The relation asserted between subject and object.
///
/// SKOS codes read "object is <relation> of subject": `A skos:narrowMatch B`
/// says B is narrower, i.e. A is broader than B.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
  Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum Predicate {
  #[serde(rename = "skos:exactMatch")]
  #[strum(serialize = "skos:exactMatch")]
  ExactMatch,
  #[serde(rename = "skos:closeMatch")]
  #[strum(serialize = "skos:closeMatch")]
  CloseMatch,
  /// Subject is broader than object.
  #[serde(rename = "skos:narrowMatch")]
  #[strum(serialize = "skos:narrowMatch")]
  BroaderThan,
  /// Subject is narrower than object.
  #[serde(rename = "skos:broadMatch")]
  #[strum(serialize = "skos:broadMatch")]
  NarrowerThan,
  /// Only valid in the confirmed-false store.
  #[serde(rename = "biomap:notRelated")]
  #[strum(serialize = "biomap:notRelated")]
  NotRelated,
}

impl Predicate {
  pub fn from_code(code: &str) -> Result<Self, MalformedRecord> {
    code
      .parse()
      .map_err(|_| MalformedRecord::UnknownPredicate(code.to_owned()))
  }

  /// The predicate that holds when subject and object are swapped.
  pub fn inverse(self) -> Self {
    match self {
      Self::ExactMatch => Self::ExactMatch,
      Self::CloseMatch => Self::CloseMatch,
      Self::BroaderThan => Self::NarrowerThan,
      Self::NarrowerThan => Self::BroaderThan,
      Self::NotRelated => Self::NotRelated,
    }
  }

  pub fn is_self_inverse(self) -> bool { self.inverse() == self }

  /// Everything except the not-related sentinel asserts some relation.
  pub fn is_positive(self) -> bool { self != Self::NotRelated }
}

/// How a mapping was produced.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
  Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
pub enum Justification {
  #[serde(rename = "semapv:ManualMappingCuration")]
  #[strum(serialize = "semapv:ManualMappingCuration")]
  ManualCuration,
  #[serde(rename = "semapv:LexicalMatching")]
  #[strum(serialize = "semapv:LexicalMatching")]
  LexicalMatching,
  #[serde(rename = "semapv:SemanticSimilarityThresholdMatching")]
  #[strum(serialize = "semapv:SemanticSimilarityThresholdMatching")]
  SemanticSimilarity,
  #[serde(rename = "semapv:MappingChaining")]
  #[strum(serialize = "semapv:MappingChaining")]
  MappingChaining,
  #[serde(rename = "semapv:LogicalReasoning")]
  #[strum(serialize = "semapv:LogicalReasoning")]
  LogicalReasoning,
  #[serde(rename = "semapv:UnspecifiedMatching")]
  #[strum(serialize = "semapv:UnspecifiedMatching")]
  Unspecified,
}

impl Justification {
  pub fn from_code(code: &str) -> Result<Self, MalformedRecord> {
    code
      .parse()
      .map_err(|_| MalformedRecord::UnknownJustification(code.to_owned()))
  }
}

/// Curation status of a record.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
  Serialize, Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CurationType {
  Predicted,
  ManuallyReviewed,
}

impl CurationType {
  pub fn from_code(code: &str) -> Result<Self, MalformedRecord> {
    code
      .parse()
      .map_err(|_| MalformedRecord::UnknownType(code.to_owned()))
  }

  /// Justification assumed for rows that predate the justification column.
  pub fn default_justification(self) -> Justification {
    match self {
      Self::Predicted => Justification::LexicalMatching,
      Self::ManuallyReviewed => Justification::ManualCuration,
    }
  }
}

// ─── Confidence ──────────────────────────────────────────────────────────────

/// A probability in [0, 1], held in hundredths so formatting is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Confidence(u8);

impl Confidence {
  pub const CERTAIN: Self = Self(100);

  /// Rounds to two decimal places. `None` outside [0, 1] or for NaN.
  pub fn from_f64(value: f64) -> Option<Self> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
      Some(Self((value * 100.0).round() as u8))
    } else {
      None
    }
  }

  pub fn hundredths(self) -> u8 { self.0 }

  pub fn as_f64(self) -> f64 { f64::from(self.0) / 100.0 }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
  }
}

impl FromStr for Confidence {
  type Err = MalformedRecord;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    s.trim()
      .parse::<f64>()
      .ok()
      .and_then(Self::from_f64)
      .ok_or_else(|| MalformedRecord::InvalidConfidence(s.to_owned()))
  }
}

impl Serialize for Confidence {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(self.as_f64())
  }
}

impl<'de> Deserialize<'de> for Confidence {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let value = f64::deserialize(deserializer)?;
    Self::from_f64(value)
      .ok_or_else(|| de::Error::custom(format!("confidence {value} outside [0, 1]")))
  }
}

// ─── Identity ────────────────────────────────────────────────────────────────

/// The directional identity of a candidate mapping.
#[derive(
  Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct IdentityKey {
  pub subject:   Curie,
  pub predicate: Predicate,
  pub object:    Curie,
}

impl IdentityKey {
  pub fn inverse(&self) -> Self {
    Self {
      subject:   self.object.clone(),
      predicate: self.predicate.inverse(),
      object:    self.subject.clone(),
    }
  }

  /// The smaller of this key and its inverse; equal for two records that
  /// state the same assertion from opposite ends.
  pub fn canonical(&self) -> Self {
    let inverse = self.inverse();
    if inverse < *self { inverse } else { self.clone() }
  }

  pub fn pair(&self) -> PairKey { PairKey::new(self.subject.clone(), self.object.clone()) }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.subject, self.predicate, self.object)
  }
}

/// An unordered pair of entities, regardless of predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey(Curie, Curie);

impl PairKey {
  pub fn new(a: Curie, b: Curie) -> Self { if b < a { Self(b, a) } else { Self(a, b) } }
}

impl fmt::Display for PairKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} / {}", self.0, self.1)
  }
}

// ─── MappingRecord ───────────────────────────────────────────────────────────

/// One row of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
  pub subject:       EntityRef,
  pub predicate:     Predicate,
  pub object:        EntityRef,
  pub justification: Justification,
  #[serde(rename = "type")]
  pub curation:      CurationType,
  /// Present on predictions only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub confidence:    Option<Confidence>,
  /// Curator CURIE when reviewed; generating process URI when predicted.
  pub source:        String,
}

impl MappingRecord {
  /// A machine-generated candidate.
  pub fn prediction(
    subject: EntityRef,
    predicate: Predicate,
    object: EntityRef,
    confidence: Confidence,
    source: &str,
  ) -> Self {
    Self {
      subject,
      predicate,
      object,
      justification: Justification::LexicalMatching,
      curation: CurationType::Predicted,
      confidence: Some(confidence),
      source: clean_cell(source),
    }
  }

  /// A mapping asserted directly by a curator.
  pub fn reviewed(
    subject: EntityRef,
    predicate: Predicate,
    object: EntityRef,
    curator: &str,
  ) -> Self {
    Self {
      subject,
      predicate,
      object,
      justification: Justification::ManualCuration,
      curation: CurationType::ManuallyReviewed,
      confidence: None,
      source: clean_cell(curator),
    }
  }

  /// Stamp a human review onto this record: new predicate, curator as
  /// `source`, manual justification, confidence dropped.
  pub fn into_reviewed(self, predicate: Predicate, curator: &str) -> Self {
    Self {
      predicate,
      justification: Justification::ManualCuration,
      curation: CurationType::ManuallyReviewed,
      confidence: None,
      source: clean_cell(curator),
      ..self
    }
  }

  pub fn identity_key(&self) -> IdentityKey {
    IdentityKey {
      subject:   self.subject.curie(),
      predicate: self.predicate,
      object:    self.object.curie(),
    }
  }

  pub fn canonical_key(&self) -> IdentityKey { self.identity_key().canonical() }

  pub fn pair_key(&self) -> PairKey { PairKey::new(self.subject.curie(), self.object.curie()) }

  /// Swap subject and object and invert the predicate.
  pub fn inverse(&self) -> Self {
    Self {
      subject: self.object.clone(),
      predicate: self.predicate.inverse(),
      object: self.subject.clone(),
      ..self.clone()
    }
  }

  pub fn is_prediction(&self) -> bool { self.curation == CurationType::Predicted }

  pub fn is_self_mapping(&self) -> bool { self.subject.same_entity(&self.object) }
}

// ─── Row codec ───────────────────────────────────────────────────────────────

/// Parse one row (already split on tabs) into a record.
pub fn parse_row(fields: &[&str]) -> Result<MappingRecord, MalformedRecord> {
  if fields.len() != LEGACY_COLUMNS && fields.len() != HEADER.len() {
    return Err(MalformedRecord::ColumnCount { found: fields.len() });
  }

  let required = |index: usize, name: &'static str| {
    let value = fields[index].trim();
    if value.is_empty() { Err(MalformedRecord::MissingField(name)) } else { Ok(value) }
  };

  let subject = EntityRef::new(
    required(0, "source prefix")?,
    required(1, "source identifier")?,
    fields[2],
  );
  let predicate = Predicate::from_code(required(3, "relation")?)?;
  let object = EntityRef::new(
    required(4, "target prefix")?,
    required(5, "target identifier")?,
    fields[6],
  );
  let curation = CurationType::from_code(required(7, "type")?)?;
  let confidence = match fields[8].trim() {
    "" => None,
    raw => Some(raw.parse::<Confidence>()?),
  };
  let source = required(9, "source")?.to_owned();
  let justification = match fields.get(10).map(|f| f.trim()).filter(|f| !f.is_empty()) {
    Some(code) => Justification::from_code(code)?,
    None => curation.default_justification(),
  };

  match (curation, confidence) {
    (CurationType::Predicted, None) => return Err(MalformedRecord::MissingConfidence),
    (CurationType::ManuallyReviewed, Some(_)) => {
      return Err(MalformedRecord::ConfidenceOnReviewed);
    }
    _ => {}
  }

  Ok(MappingRecord {
    subject,
    predicate,
    object,
    justification,
    curation,
    confidence,
    source,
  })
}

/// Serialise a record into its eleven cells.
pub fn to_row(record: &MappingRecord) -> Vec<String> {
  vec![
    clean_cell(&record.subject.prefix),
    clean_cell(&record.subject.identifier),
    clean_cell(&record.subject.name),
    record.predicate.to_string(),
    clean_cell(&record.object.prefix),
    clean_cell(&record.object.identifier),
    clean_cell(&record.object.name),
    record.curation.to_string(),
    record.confidence.map(|c| c.to_string()).unwrap_or_default(),
    clean_cell(&record.source),
    record.justification.to_string(),
  ]
}
