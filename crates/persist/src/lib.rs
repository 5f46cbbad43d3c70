//! Persistence: the resource collaborator used by cooking and streaming.
//!
//! Layout of a binary resource file:
//! ```text
//! zstd( cbor( ResourceEnvelope { schema_version, kind, sha256, payload: cbor(T) } ) )
//! ```
//! Paths ending in `.json` hold plain JSON of `T` instead, for hand-authored content.
//!
//! # Invariants
//! - Loads fail closed on schema, kind or hash mismatch.
//! - Depot paths are `/`-separated and relative to the depot root.

mod depot;
mod resource;

pub use depot::{Depot, DepotError, FileDepot, MemoryDepot, file_stem, join_path, parent_path};
pub use resource::{RESOURCE_SCHEMA_VERSION, Resource, load_resource, save_resource};
