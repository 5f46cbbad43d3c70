//! Streaming: sector packing at cook time, sector load/unload at runtime.
//!
//! # Invariants
//! - Packing is deterministic for the same extracted nodes.
//! - Sector loading never blocks the scene tick; results are polled.
//! - An unloaded sector has none of its entities attached to the scene.
//! - Always-loaded sectors stay resident while their world is attached.

mod collector;
mod config;
mod cook;
mod grid;
mod job;
mod sector;
mod streamer;
mod system;

pub use collector::{ExtractedNode, NodeCollector};
pub use config::{CookConfig, GridConfig, StreamingConfig};
pub use cook::{CookError, CookReport, cook_world};
pub use grid::{SectorCoord, SectorGrid};
pub use job::{InlineJobRunner, Job, JobRunner, TokioJobRunner};
pub use sector::{ALWAYS_LOADED_SECTOR, CompiledWorld, WorldSector, WorldSectorDesc, sector_resource_path};
pub use streamer::{LoadOutcome, SectorState, WorldSectorStreamer};
pub use system::{StreamStats, WorldStreamingSystem};
