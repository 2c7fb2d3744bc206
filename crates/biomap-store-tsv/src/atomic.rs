//! Staged writes: temp file in the target's directory, fsync, then rename.
//!
//! A [`Staged`] file that is dropped without [`Staged::commit`] is deleted
//! and the target is left untouched.

use std::{
  fs,
  io::Write as _,
  path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::{Error, Result};

pub(crate) struct Staged {
  file:   NamedTempFile,
  target: PathBuf,
}

impl Staged {
  /// Write `contents` next to `target` and flush them to disk.
  pub fn write(target: &Path, contents: &str) -> Result<Self> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::Builder::new()
      .prefix(".biomap-")
      .suffix(".tmp")
      .tempfile_in(dir)
      .map_err(Error::io(dir))?;

    if let Ok(meta) = fs::metadata(target) {
      file
        .as_file()
        .set_permissions(meta.permissions())
        .map_err(Error::io(file.path()))?;
    }
    file.write_all(contents.as_bytes()).map_err(Error::io(file.path()))?;
    file.as_file().sync_all().map_err(Error::io(file.path()))?;

    Ok(Self { file, target: target.to_owned() })
  }

  /// Atomically replace the target with the staged contents.
  pub fn commit(self) -> Result<()> {
    let Self { file, target } = self;
    file
      .persist(&target)
      .map_err(|e| Error::Persist { path: target, source: e.error })?;
    Ok(())
  }
}
