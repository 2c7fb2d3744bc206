//! Error type for `biomap-store-tsv`.

use std::{io, path::PathBuf, time::Duration};

use biomap_core::{IdentityKey, StoreKind, record::MalformedRecord};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{}: {source}", .path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  /// A row failed to parse. `line` is 1-based and counts the header.
  #[error("{}:{line}: {source}", .path.display())]
  Corrupt {
    path:   PathBuf,
    line:   usize,
    #[source]
    source: MalformedRecord,
  },

  #[error("{}: missing or unrecognised header row", .path.display())]
  MissingHeader { path: PathBuf },

  /// A change named a row the store does not contain.
  #[error("no row {key} in the {kind} store")]
  MissingRow { kind: StoreKind, key: IdentityKey },

  /// A record was refused before it reached the file.
  #[error("{key} cannot be written to the {kind} store: {source}")]
  Rejected {
    kind:   StoreKind,
    key:    IdentityKey,
    #[source]
    source: MalformedRecord,
  },

  #[error(
    "could not lock {} within {waited:?}; remove it if no other biomap process is running",
    .path.display()
  )]
  LockTimeout { path: PathBuf, waited: Duration },

  #[error("could not move the staged file into {}: {source}", .path.display())]
  Persist {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("{}:{line}: {reason}", .path.display())]
  InvalidCurators {
    path:   PathBuf,
    line:   usize,
    reason: String,
  },
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
