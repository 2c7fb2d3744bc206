//! Filtering and pagination over the predicted store for review.
//!
//! Every function here is read-only and deterministic: the same records and
//! query always give the same page.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::{MappingRecord, Predicate};

/// Page size used when a query does not set `limit`.
pub const DEFAULT_LIMIT: usize = 10;

// ─── Query type ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
  #[serde(alias = "desc")]
  ConfidenceDesc,
  #[serde(alias = "asc")]
  ConfidenceAsc,
  Subject,
  Object,
}

/// Filters for [`page`], [`count`] and [`summarize`]. All text matching is
/// case-insensitive substring matching; unset fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionQuery {
  /// Either side's CURIE or name, or the `source` column.
  pub query:         Option<String>,
  pub source_query:  Option<String>,
  pub source_prefix: Option<String>,
  pub target_query:  Option<String>,
  pub target_prefix: Option<String>,
  /// Either side's CURIE.
  pub prefix:        Option<String>,
  /// The `source` column.
  pub provenance:    Option<String>,
  /// Only exact matches whose two names are equal ignoring case.
  pub same_text:     bool,
  pub sort:          Option<SortOrder>,
  pub offset:        usize,
  pub limit:         Option<usize>,
}

/// A prediction together with its row index in the predicted store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Positioned {
  pub position: usize,
  pub record:   MappingRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
  /// Size of the filtered set, before pagination.
  pub total:  usize,
  pub offset: usize,
  pub items:  Vec<Positioned>,
}

/// Pending predictions for one `(subject prefix, object prefix)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrefixPairCount {
  pub source_prefix: String,
  pub target_prefix: String,
  pub count:         usize,
}

// ─── Matching ────────────────────────────────────────────────────────────────

fn contains_any(needle: &str, haystacks: &[&str]) -> bool {
  let needle = needle.to_lowercase();
  haystacks.iter().any(|h| !h.is_empty() && h.to_lowercase().contains(&needle))
}

impl PredictionQuery {
  pub fn matches(&self, record: &MappingRecord) -> bool {
    let subject = record.subject.curie().to_string();
    let object = record.object.curie().to_string();
    let checks: [(&Option<String>, Vec<&str>); 7] = [
      (&self.query, vec![
        &subject,
        &record.subject.name,
        &object,
        &record.object.name,
        &record.source,
      ]),
      (&self.source_query, vec![&subject, &record.subject.name]),
      (&self.source_prefix, vec![&subject]),
      (&self.target_query, vec![&object, &record.object.name]),
      (&self.target_prefix, vec![&object]),
      (&self.prefix, vec![&subject, &object]),
      (&self.provenance, vec![&record.source]),
    ];
    let text_ok = checks
      .iter()
      .all(|(needle, hay)| needle.as_deref().is_none_or(|n| contains_any(n, hay)));

    text_ok && (!self.same_text || same_text(record))
  }
}

fn same_text(record: &MappingRecord) -> bool {
  record.predicate == Predicate::ExactMatch
    && !record.subject.name.is_empty()
    && record.subject.name.to_lowercase() == record.object.name.to_lowercase()
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// Filter then stably sort, keeping original positions.
fn filtered<'a>(records: &'a [MappingRecord], query: &PredictionQuery) -> Vec<(usize, &'a MappingRecord)> {
  let mut hits: Vec<(usize, &MappingRecord)> = records
    .iter()
    .enumerate()
    .filter(|(_, r)| query.matches(r))
    .collect();

  match query.sort {
    None => {}
    Some(SortOrder::ConfidenceDesc) => hits.sort_by(|a, b| b.1.confidence.cmp(&a.1.confidence)),
    Some(SortOrder::ConfidenceAsc) => hits.sort_by(|a, b| a.1.confidence.cmp(&b.1.confidence)),
    Some(SortOrder::Subject) => hits.sort_by_key(|(_, r)| r.subject.curie()),
    Some(SortOrder::Object) => hits.sort_by_key(|(_, r)| r.object.curie()),
  }
  hits
}

/// One page of the filtered predictions.
pub fn page(records: &[MappingRecord], query: &PredictionQuery) -> Page {
  let hits = filtered(records, query);
  let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
  let items = hits
    .iter()
    .skip(query.offset)
    .take(limit)
    .map(|&(position, record)| Positioned { position, record: record.clone() })
    .collect();
  Page { total: hits.len(), offset: query.offset, items }
}

/// Size of the filtered set, ignoring offset and limit.
pub fn count(records: &[MappingRecord], query: &PredictionQuery) -> usize {
  records.iter().filter(|r| query.matches(r)).count()
}

/// Filtered predictions per prefix pair, most common first; ties by prefix.
pub fn summarize(records: &[MappingRecord], query: &PredictionQuery) -> Vec<PrefixPairCount> {
  let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
  for record in records.iter().filter(|r| query.matches(r)) {
    *counts
      .entry((record.subject.prefix.as_str(), record.object.prefix.as_str()))
      .or_default() += 1;
  }
  let mut rows: Vec<PrefixPairCount> = counts
    .into_iter()
    .map(|((s, t), count)| PrefixPairCount {
      source_prefix: s.to_owned(),
      target_prefix: t.to_owned(),
      count,
    })
    .collect();
  rows.sort_by(|a, b| b.count.cmp(&a.count));
  rows
}
