//! Authoring-time node templates and the prefab flattening compiler.
//!
//! # Invariants
//! - Merge inputs are ordered innermost (base) first, outermost (instance) last.
//! - Container parents always precede their children.
//! - Flattened containers carry no prefab references.

pub mod compiler;
pub mod component;
pub mod container;
pub mod entity;
pub mod node;
pub mod prefab;
pub mod world;

pub use component::ComponentTemplate;
pub use container::{NodeRecord, NodeTemplateContainer};
pub use entity::EntityTemplate;
pub use node::{NodeTemplate, PrefabSetup, StreamingModel};
pub use prefab::{
    DepotPrefabSource, Prefab, PrefabData, PrefabDependencies, PrefabLibrary, PrefabRef,
    PrefabSource,
};
pub use world::{Layer, WorldParameters, WorldTemplate};
