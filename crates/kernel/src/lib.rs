//! Scene kernel: the live scene that compiled world content is streamed into.
//!
//! # Invariants
//! - Entity attach/detach only happens on the scene thread, through `Scene`.
//! - Every attach/detach is recorded in the scene event log.
//! - Systems are dispatched in registration order.

pub mod scene;
pub mod system;

pub use scene::{AttachedEntity, ObserverId, Scene, SceneEvent};
pub use system::{DebugBox, FrameDebug, SceneSystem, WorldContent};
