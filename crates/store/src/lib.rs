//! Store - Persistence and serialized access for thesis documents
//!
//! This crate is the boundary around `thesis_collab`: it loads documents,
//! runs core operations under a per-document lock, saves the result, and
//! hands the emitted events to an [`EventSink`]. It also owns the settings
//! file the service is configured from.

mod error;
mod events;
mod file_store;
mod memory_store;
mod service;
mod settings;
mod storage;

pub use error::*;
pub use events::*;
pub use file_store::*;
pub use memory_store::*;
pub use service::*;
pub use settings::*;
pub use storage::*;
