//! Shared value types: entity ids, placements, bounding boxes and parameter bags.

mod types;

pub use types::{Aabb, EntityId, ParamBag, ParamValue, Transform};
