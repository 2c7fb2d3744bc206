//! Flat-file backend for the biomap mapping store.
//!
//! Each of the four stores is one tab-separated file in a shared directory,
//! so the data stays diffable and version-controllable. Writers are
//! serialised across processes by a lock file in that directory.

mod atomic;
mod codec;
mod store;

pub mod curators;
pub mod error;
pub mod lock;

pub use curators::{CuratorEntry, Curators, load_curators};
pub use error::{Error, Result};
pub use lock::DirectoryLock;
pub use store::{TsvStore, read_table};

#[cfg(test)]
mod tests;
