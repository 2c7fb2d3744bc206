//! [`TsvStore`]: the flat-file implementation of [`MappingStore`].

use std::{
  collections::HashSet,
  fs,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use biomap_core::{
  IdentityKey, MappingRecord, MappingStore, StoreKind,
  registry::{self, IdentifierRegistry},
  store::{Change, Changeset},
};
use tracing::{debug, warn};

use crate::{
  Error, Result,
  atomic::Staged,
  codec::{self, Table},
  lock::{DEFAULT_LOCK_TIMEOUT, DirectoryLock},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// The four stores as TSV files in one directory.
///
/// Every read goes to disk. Every write stages a complete file next to its
/// target and renames it into place, so a reader never sees a partial file.
#[derive(Clone)]
pub struct TsvStore {
  dir:          PathBuf,
  registry:     Option<Arc<dyn IdentifierRegistry>>,
  lock_timeout: Duration,
}

impl TsvStore {
  /// Open the store in `dir`, creating the directory and any missing store
  /// file (header only).
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
    let dir = dir.into();
    fs::create_dir_all(&dir).map_err(Error::io(&dir))?;
    let store = Self { dir, registry: None, lock_timeout: DEFAULT_LOCK_TIMEOUT };
    for kind in StoreKind::ALL {
      let path = store.path(kind);
      if !path.exists() {
        Staged::write(&path, &Table::default().render())?.commit()?;
        debug!(path = %path.display(), "created empty store");
      }
    }
    Ok(store)
  }

  /// Report identifier warnings for every row on load.
  pub fn with_registry(mut self, registry: Arc<dyn IdentifierRegistry>) -> Self {
    self.registry = Some(registry);
    self
  }

  pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
    self.lock_timeout = timeout;
    self
  }

  pub fn dir(&self) -> &Path { &self.dir }

  /// The registry rows are checked against on load, if any.
  pub fn registry(&self) -> Option<&dyn IdentifierRegistry> { self.registry.as_deref() }

  pub fn path(&self, kind: StoreKind) -> PathBuf { self.dir.join(kind.file_name()) }

  fn read(&self, kind: StoreKind) -> Result<Table> {
    let path = self.path(kind);
    let text = fs::read_to_string(&path).map_err(Error::io(&path))?;
    codec::decode(&path, &text, Some(kind))
  }

  fn report_warnings(&self, kind: StoreKind, records: &[MappingRecord]) {
    let Some(registry) = &self.registry else { return };
    let mut flagged = 0;
    for record in records {
      let warnings = registry::validate(record, registry.as_ref());
      for w in &warnings {
        debug!(%kind, key = %record.identity_key(), "{w}");
      }
      flagged += usize::from(!warnings.is_empty());
    }
    if flagged > 0 {
      warn!(%kind, flagged, "rows with identifier warnings");
    }
  }
}

fn admit(kind: StoreKind, record: &MappingRecord) -> Result<()> {
  kind.admit(record).map_err(|source| Error::Rejected {
    kind,
    key: record.identity_key(),
    source,
  })
}

impl TsvStore {
  /// Stage every touched file before renaming any of them, in
  /// [`Changeset::commit_order`]. A partial commit leaves a detectable
  /// duplicate, never a loss.
  pub(crate) fn stage(&self, changes: &Changeset) -> Result<Vec<Staged>> {
    let mut staged = Vec::new();
    for kind in changes.commit_order() {
      let mut table = self.read(kind)?;
      edit(&mut table, kind, changes.for_kind(kind))?;
      staged.push(Staged::write(&self.path(kind), &table.render())?);
    }
    Ok(staged)
  }
}

fn missing(kind: StoreKind, key: &IdentityKey) -> Error { Error::MissingRow { kind, key: key.clone() } }

/// Apply the changes that touch one table, in submission order.
fn edit<'a>(table: &mut Table, kind: StoreKind, changes: impl Iterator<Item = &'a Change>) -> Result<()> {
  for change in changes {
    match change {
      Change::Remove { key, .. } => {
        if table.remove(key) == 0 {
          return Err(missing(kind, key));
        }
      }
      Change::Replace { key, record, .. } => {
        admit(kind, record)?;
        if !table.replace(key, record.clone()) {
          return Err(missing(kind, key));
        }
      }
      Change::Append { record, .. } => {
        admit(kind, record)?;
        if table.contains(&record.identity_key()) {
          debug!(%kind, key = %record.identity_key(), "skipping append of a row already present");
        } else {
          table.push(record.clone());
        }
      }
    }
  }
  Ok(())
}

// ─── MappingStore impl ───────────────────────────────────────────────────────

impl MappingStore for TsvStore {
  type Error = Error;
  type Guard = DirectoryLock;

  fn lock(&self) -> Result<DirectoryLock> { DirectoryLock::acquire(&self.dir, self.lock_timeout) }

  fn load(&self, kind: StoreKind) -> Result<Vec<MappingRecord>> {
    let records = self.read(kind)?.into_records();
    debug!(%kind, rows = records.len(), "loaded store");
    self.report_warnings(kind, &records);
    Ok(records)
  }

  fn save(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<()> {
    let mut seen = HashSet::new();
    let mut table = Table::default();
    for record in records {
      admit(kind, record)?;
      if seen.insert(record.identity_key()) {
        table.push(record.clone());
      }
    }
    Staged::write(&self.path(kind), &table.render())?.commit()?;
    debug!(%kind, rows = table.lines.len(), "saved store");
    Ok(())
  }

  fn append(&self, kind: StoreKind, records: &[MappingRecord]) -> Result<usize> {
    let mut table = self.read(kind)?;
    let mut seen: HashSet<IdentityKey> = table.records().map(MappingRecord::identity_key).collect();
    let mut added = 0;
    for record in records {
      admit(kind, record)?;
      if seen.insert(record.identity_key()) {
        table.push(record.clone());
        added += 1;
      }
    }
    if added > 0 {
      Staged::write(&self.path(kind), &table.render())?.commit()?;
    }
    debug!(%kind, added, skipped = records.len() - added, "appended to store");
    Ok(added)
  }

  fn apply(&self, changes: &Changeset) -> Result<()> {
    for file in self.stage(changes)? {
      file.commit()?;
    }
    debug!(stores = ?changes.kinds(), changes = changes.changes().len(), "applied changeset");
    Ok(())
  }

  fn location(&self, kind: StoreKind) -> String { self.path(kind).display().to_string() }
}

/// Read any TSV table of mappings without per-store type checks, e.g. a
/// batch from a prediction generator.
pub fn read_table(path: &Path) -> Result<Vec<MappingRecord>> {
  let text = fs::read_to_string(path).map_err(Error::io(path))?;
  Ok(codec::decode(path, &text, None)?.into_records())
}
