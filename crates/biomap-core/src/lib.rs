//! Core types and the curation state machine for the biomap mapping store.
//!
//! This crate does no I/O of its own. Storage backends implement
//! [`store::MappingStore`]; the HTTP surface and the binary depend on both.

pub mod check;
pub mod curation;
pub mod error;
pub mod query;
pub mod record;
pub mod registry;
pub mod store;

#[cfg(test)]
mod memory;

pub use curation::{CurationEngine, Decision, ImportReport, Outcome, PruneReport, RowRef};
pub use error::{Error, Result};
pub use record::{EntityRef, IdentityKey, MappingRecord, Predicate};
pub use store::{MappingStore, StoreKind};
