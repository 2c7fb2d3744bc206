//! The curators table: who may stamp their ORCID onto a review.

use std::{fs, path::Path};

use serde::Serialize;

use crate::{Error, Result};

pub const CURATORS_FILE: &str = "curators.tsv";

const COLUMNS: [&str; 3] = ["user", "orcid", "name"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CuratorEntry {
  /// Local account name.
  pub user:  String,
  pub orcid: String,
  pub name:  String,
}

impl CuratorEntry {
  /// The provenance string written into a reviewed record's `source`.
  pub fn curie(&self) -> String { format!("orcid:{}", self.orcid) }
}

#[derive(Debug, Clone, Default)]
pub struct Curators {
  entries: Vec<CuratorEntry>,
}

impl Curators {
  pub fn lookup(&self, user: &str) -> Option<&CuratorEntry> {
    self.entries.iter().find(|e| e.user == user)
  }

  pub fn iter(&self) -> impl Iterator<Item = &CuratorEntry> { self.entries.iter() }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

pub fn load_curators(path: &Path) -> Result<Curators> {
  let text = fs::read_to_string(path).map_err(Error::io(path))?;
  parse(path, &text)
}

fn parse(path: &Path, text: &str) -> Result<Curators> {
  let invalid = |line: usize, reason: &str| Error::InvalidCurators {
    path: path.to_owned(),
    line,
    reason: reason.to_owned(),
  };

  let mut lines = (1..).zip(text.lines());
  match lines.next() {
    Some((_, header)) if header.split('\t').map(str::trim).eq(COLUMNS) => {}
    _ => return Err(invalid(1, "expected the header: user, orcid, name")),
  }

  let mut entries = Vec::new();
  for (number, line) in lines.filter(|(_, l)| !l.trim().is_empty()) {
    let cells: Vec<&str> = line.split('\t').map(str::trim).collect();
    let [user, orcid, name] = cells.as_slice() else {
      return Err(invalid(number, "expected three columns"));
    };
    if user.is_empty() || orcid.is_empty() {
      return Err(invalid(number, "user and orcid are required"));
    }
    entries.push(CuratorEntry {
      user:  (*user).to_owned(),
      orcid: (*orcid).to_owned(),
      name:  (*name).to_owned(),
    });
  }
  Ok(Curators { entries })
}
