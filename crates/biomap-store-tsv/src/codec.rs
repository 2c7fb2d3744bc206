//! Line-level TSV codec.
//!
//! A decoded [`Table`] keeps every line's original text so that rewriting
//! a store only changes the lines that were actually edited.

use std::path::Path;

use biomap_core::{
  IdentityKey, MappingRecord, StoreKind,
  record::{HEADER, LEGACY_COLUMNS, MalformedRecord, parse_row, to_row},
};

use crate::{Error, Result};

pub(crate) fn header_line() -> String { HEADER.join("\t") }

pub(crate) fn encode(record: &MappingRecord) -> String { to_row(record).join("\t") }

fn strip_eol(raw: &str) -> &str { raw.trim_end_matches(['\n', '\r']) }

fn is_header(raw: &str) -> bool {
  let fields: Vec<&str> = strip_eol(raw).split('\t').collect();
  (fields.len() == HEADER.len() || fields.len() == LEGACY_COLUMNS)
    && fields.iter().zip(HEADER).all(|(f, h)| f.trim().eq_ignore_ascii_case(h))
}

// ─── Table ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct Line {
  /// Original text, including its line terminator.
  pub raw:    String,
  /// `None` for blank lines.
  pub record: Option<MappingRecord>,
}

impl Line {
  pub fn new(record: MappingRecord) -> Self {
    Self { raw: format!("{}\n", encode(&record)), record: Some(record) }
  }

  fn holds(&self, key: &IdentityKey) -> bool {
    self.record.as_ref().is_some_and(|r| r.identity_key() == *key)
  }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Table {
  pub lines: Vec<Line>,
}

impl Table {
  pub fn records(&self) -> impl Iterator<Item = &MappingRecord> {
    self.lines.iter().filter_map(|l| l.record.as_ref())
  }

  pub fn into_records(self) -> Vec<MappingRecord> {
    self.lines.into_iter().filter_map(|l| l.record).collect()
  }

  pub fn contains(&self, key: &IdentityKey) -> bool { self.lines.iter().any(|l| l.holds(key)) }

  pub fn push(&mut self, record: MappingRecord) { self.lines.push(Line::new(record)); }

  /// Drop every row holding `key`. Returns how many were dropped.
  pub fn remove(&mut self, key: &IdentityKey) -> usize {
    let before = self.lines.len();
    self.lines.retain(|l| !l.holds(key));
    before - self.lines.len()
  }

  /// Overwrite the first row holding `key`. Returns `false` if there is none.
  pub fn replace(&mut self, key: &IdentityKey, record: MappingRecord) -> bool {
    match self.lines.iter_mut().find(|l| l.holds(key)) {
      Some(line) => {
        *line = Line::new(record);
        true
      }
      None => false,
    }
  }

  /// Header plus every line, each newline-terminated.
  pub fn render(&self) -> String {
    let mut out = header_line();
    out.push('\n');
    for line in &self.lines {
      out.push_str(&line.raw);
      if !line.raw.ends_with('\n') {
        out.push('\n');
      }
    }
    out
  }
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Parse a whole file. When `kind` is given, rows must also satisfy that
/// store's type invariants.
pub(crate) fn decode(path: &Path, text: &str, kind: Option<StoreKind>) -> Result<Table> {
  let mut lines = text.split_inclusive('\n');
  if !lines.next().is_some_and(is_header) {
    return Err(Error::MissingHeader { path: path.to_owned() });
  }

  let mut table = Table::default();
  // Line 1 is the header.
  for (number, raw) in (2..).zip(lines) {
    let content = strip_eol(raw);
    if content.trim().is_empty() {
      table.lines.push(Line { raw: raw.to_owned(), record: None });
      continue;
    }
    let corrupt = |source: MalformedRecord| Error::Corrupt {
      path: path.to_owned(),
      line: number,
      source,
    };
    let fields: Vec<&str> = content.split('\t').collect();
    let record = parse_row(&fields).map_err(corrupt)?;
    if let Some(kind) = kind {
      kind.admit(&record).map_err(corrupt)?;
    }
    table.lines.push(Line { raw: raw.to_owned(), record: Some(record) });
  }
  Ok(table)
}
