//! Directory-wide advisory lock.
//!
//! Held by creating `.biomap.lock` exclusively; works across processes that
//! share the store directory. Released by removing the file on drop.

use std::{
  fs::{self, OpenOptions},
  io::{self, Write as _},
  path::{Path, PathBuf},
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, warn};

use crate::{Error, Result};

pub const LOCK_FILE: &str = ".biomap.lock";

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct DirectoryLock {
  path: PathBuf,
}

impl DirectoryLock {
  /// Take the lock in `dir`, waiting up to `timeout` for another holder.
  pub fn acquire(dir: &Path, timeout: Duration) -> Result<Self> {
    let path = dir.join(LOCK_FILE);
    let started = Instant::now();
    loop {
      match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
          let lock = Self { path };
          writeln!(file, "{}", std::process::id()).map_err(Error::io(&lock.path))?;
          debug!(path = %lock.path.display(), "acquired store lock");
          return Ok(lock);
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
          let waited = started.elapsed();
          if waited >= timeout {
            return Err(Error::LockTimeout { path, waited: timeout });
          }
          thread::sleep(RETRY_INTERVAL.min(timeout - waited));
        }
        Err(source) => return Err(Error::Io { path, source }),
      }
    }
  }

  pub fn path(&self) -> &Path { &self.path }
}

impl Drop for DirectoryLock {
  fn drop(&mut self) {
    match fs::remove_file(&self.path) {
      Ok(()) => debug!(path = %self.path.display(), "released store lock"),
      Err(e) => warn!(path = %self.path.display(), "failed to release store lock: {e}"),
    }
  }
}
