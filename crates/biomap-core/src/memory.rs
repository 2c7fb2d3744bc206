//! In-memory `MappingStore` used by the engine tests.

use std::{
  collections::{BTreeMap, HashSet},
  sync::Mutex,
};

use thiserror::Error;

use crate::{
  record::{IdentityKey, MappingRecord},
  store::{Change, Changeset, MappingStore, StoreKind},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("no row {key} in {kind}")]
  MissingRow { kind: StoreKind, key: IdentityKey },

  #[error("store mutex poisoned")]
  Poisoned,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
  stores: Mutex<BTreeMap<StoreKind, Vec<MappingRecord>>>,
}

impl MemoryStore {
  pub fn new() -> Self { Self::default() }

  pub fn with(self, kind: StoreKind, records: Vec<MappingRecord>) -> Self {
    if let Ok(mut stores) = self.stores.lock() {
      stores.insert(kind, records);
    }
    self
  }
}

impl MappingStore for MemoryStore {
  type Error = MemoryError;
  type Guard = ();

  fn lock(&self) -> Result<(), MemoryError> { Ok(()) }

  fn load(&self, kind: StoreKind) -> Result<Vec<MappingRecord>, MemoryError> {
    let stores = self.stores.lock().map_err(|_| MemoryError::Poisoned)?;
    Ok(stores.get(&kind).cloned().unwrap_or_default())
  }

  fn save(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<(), MemoryError> {
    let mut seen = HashSet::new();
    let deduped = records
      .iter()
      .filter(|r| seen.insert(r.identity_key()))
      .cloned()
      .collect();
    let mut stores = self.stores.lock().map_err(|_| MemoryError::Poisoned)?;
    stores.insert(kind, deduped);
    Ok(())
  }

  fn append(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<usize, MemoryError> {
    let mut stores = self.stores.lock().map_err(|_| MemoryError::Poisoned)?;
    let rows = stores.entry(kind).or_default();
    let mut seen: HashSet<IdentityKey> = rows.iter().map(MappingRecord::identity_key).collect();
    let before = rows.len();
    rows.extend(records.iter().filter(|r| seen.insert(r.identity_key())).cloned());
    Ok(rows.len() - before)
  }

  fn apply(&self, changes: &Changeset) -> Result<(), MemoryError> {
    let mut stores = self.stores.lock().map_err(|_| MemoryError::Poisoned)?;
    let mut next = stores.clone();
    for change in changes.changes() {
      let rows = next.entry(change.kind()).or_default();
      match change {
        Change::Remove { kind, key } => {
          let before = rows.len();
          rows.retain(|r| r.identity_key() != *key);
          if rows.len() == before {
            return Err(MemoryError::MissingRow { kind: *kind, key: key.clone() });
          }
        }
        Change::Replace { kind, key, record } => {
          let slot = rows
            .iter_mut()
            .find(|r| r.identity_key() == *key)
            .ok_or_else(|| MemoryError::MissingRow { kind: *kind, key: key.clone() })?;
          *slot = record.clone();
        }
        Change::Append { record, .. } => rows.push(record.clone()),
      }
    }
    *stores = next;
    Ok(())
  }

  fn location(&self, kind: StoreKind) -> String { format!("memory:{kind}") }
}
