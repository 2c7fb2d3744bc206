//! Best-effort identifier validation against a prefix registry.
//!
//! The registry is an injected capability so records can be parsed and
//! tested without network access. Every finding is a
//! [`ValidationWarning`]; none of them blocks a write.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::record::{Curie, MappingRecord};

// ─── Capability ──────────────────────────────────────────────────────────────

/// Lookup from a vocabulary prefix to its expected local-identifier pattern.
pub trait IdentifierRegistry: Send + Sync {
  /// The anchored pattern for `prefix`, or `None` if the prefix is unknown.
  fn pattern(&self, prefix: &str) -> Option<&Regex>;

  fn knows(&self, prefix: &str) -> bool { self.pattern(prefix).is_some() }
}

/// A registry that knows no prefixes. Validation degrades to
/// unknown-prefix warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRegistry;

impl IdentifierRegistry for EmptyRegistry {
  fn pattern(&self, _prefix: &str) -> Option<&Regex> { None }
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("registry json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid pattern for prefix {prefix:?}: {source}")]
  Pattern {
    prefix: String,
    #[source]
    source: regex::Error,
  },
}

/// An in-memory prefix → pattern table.
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
  patterns: HashMap<String, Regex>,
}

impl PatternRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register `pattern` for `prefix`. Unanchored patterns are anchored at
  /// both ends so they must match the whole identifier.
  pub fn insert(&mut self, prefix: &str, pattern: &str) -> Result<(), RegistryError> {
    let anchored = if pattern.starts_with('^') && pattern.ends_with('$') {
      pattern.to_owned()
    } else {
      format!("^(?:{pattern})$")
    };
    let regex = Regex::new(&anchored).map_err(|source| RegistryError::Pattern {
      prefix: prefix.to_owned(),
      source,
    })?;
    self.patterns.insert(prefix.to_lowercase(), regex);
    Ok(())
  }

  /// Build from a JSON object mapping prefixes to patterns.
  pub fn from_json(json: &str) -> Result<Self, RegistryError> {
    let raw: HashMap<String, String> = serde_json::from_str(json)?;
    let mut registry = Self::new();
    for (prefix, pattern) in &raw {
      registry.insert(prefix, pattern)?;
    }
    Ok(registry)
  }

  pub fn len(&self) -> usize { self.patterns.len() }

  pub fn is_empty(&self) -> bool { self.patterns.is_empty() }
}

impl IdentifierRegistry for PatternRegistry {
  fn pattern(&self, prefix: &str) -> Option<&Regex> { self.patterns.get(prefix) }
}

// ─── Warnings ────────────────────────────────────────────────────────────────

/// A non-fatal finding about a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
  UnknownPrefix { curie: Curie },
  InvalidIdentifier { curie: Curie, pattern: String },
  /// Both sides come from the same vocabulary.
  SamePrefix { prefix: String },
}

impl std::fmt::Display for ValidationWarning {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::UnknownPrefix { curie } => write!(f, "unknown prefix in {curie}"),
      Self::InvalidIdentifier { curie, pattern } => {
        write!(f, "{curie} does not match the pattern {pattern}")
      }
      Self::SamePrefix { prefix } => {
        write!(f, "subject and object are both from {prefix}")
      }
    }
  }
}

fn check_curie(curie: Curie, registry: &dyn IdentifierRegistry, out: &mut Vec<ValidationWarning>) {
  match registry.pattern(&curie.prefix) {
    None => out.push(ValidationWarning::UnknownPrefix { curie }),
    Some(pattern) if !pattern.is_match(&curie.identifier) => {
      out.push(ValidationWarning::InvalidIdentifier {
        pattern: pattern.as_str().to_owned(),
        curie,
      });
    }
    Some(_) => {}
  }
}

/// Collect every warning that applies to `record`.
pub fn validate(record: &MappingRecord, registry: &dyn IdentifierRegistry) -> Vec<ValidationWarning> {
  let mut warnings = Vec::new();
  check_curie(record.subject.curie(), registry, &mut warnings);
  check_curie(record.object.curie(), registry, &mut warnings);
  if record.predicate.is_positive() && record.subject.prefix == record.object.prefix {
    warnings.push(ValidationWarning::SamePrefix {
      prefix: record.subject.prefix.clone(),
    });
  }
  warnings
}
