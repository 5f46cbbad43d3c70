use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;
use worldspace_common::Aabb;
use worldspace_ecs::Entity;
use worldspace_kernel::WorldContent;
use worldspace_persist::{
    Depot, DepotError, Resource, file_stem, join_path, load_resource, parent_path, save_resource,
};
use worldspace_template::{PrefabDependencies, WorldParameters};

/// Name of the sector holding every always-loaded node.
pub const ALWAYS_LOADED_SECTOR: &str = "root";

/// Entities streamed in and out as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSector {
    pub entities: Vec<Entity>,
}

impl Resource for WorldSector {
    const KIND: &'static str = "sector";
    const EXTENSION: &'static str = "sector";
}

impl WorldSector {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Description of one packed sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSectorDesc {
    pub name: String,
    pub always_loaded: bool,
    pub streaming_box: Aabb,
    /// Packed content not yet written to the depot.
    #[serde(skip)]
    pub unsaved_payload: Option<Arc<WorldSector>>,
}

impl WorldSectorDesc {
    pub fn new(name: impl Into<String>, always_loaded: bool, streaming_box: Aabb) -> Self {
        Self {
            name: name.into(),
            always_loaded,
            streaming_box,
            unsaved_payload: None,
        }
    }

    pub fn entity_count(&self) -> usize {
        self.unsaved_payload.as_ref().map_or(0, |p| p.len())
    }
}

/// The cooked artifact consumed at runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompiledWorld {
    pub name: String,
    pub parameters: WorldParameters,
    pub sectors: Vec<WorldSectorDesc>,
    /// Prefabs consulted while cooking, for staleness checks.
    #[serde(default)]
    pub dependencies: PrefabDependencies,
    /// Directory holding the sibling sector resources.
    #[serde(skip)]
    cooked_dir: String,
}

impl Resource for CompiledWorld {
    const KIND: &'static str = "cworld";
    const EXTENSION: &'static str = "cworld";
}

impl CompiledWorld {
    pub fn new(
        name: impl Into<String>,
        parameters: WorldParameters,
        sectors: Vec<WorldSectorDesc>,
        dependencies: PrefabDependencies,
    ) -> Self {
        Self {
            name: name.into(),
            parameters,
            sectors,
            dependencies,
            cooked_dir: String::new(),
        }
    }

    /// Load a compiled world; sector keys resolve next to `path`.
    pub fn load(depot: &dyn Depot, path: &str) -> Result<Self, DepotError> {
        let mut world: CompiledWorld = load_resource(depot, path)?;
        world.cooked_dir = parent_path(path).to_string();
        if world.name.is_empty() {
            world.name = file_stem(path).to_string();
        }
        tracing::info!(path, sectors = world.sectors.len(), "loaded compiled world");
        Ok(world)
    }

    /// Save the world description and remember `path`'s directory as the
    /// sector location. Sector payloads are not written.
    pub fn save(&mut self, depot: &dyn Depot, path: &str) -> Result<(), DepotError> {
        save_resource(depot, self, path)?;
        self.cooked_dir = parent_path(path).to_string();
        Ok(())
    }

    pub fn cooked_dir(&self) -> &str {
        &self.cooked_dir
    }

    pub fn set_cooked_dir(&mut self, dir: impl Into<String>) {
        self.cooked_dir = dir.into();
    }

    /// Depot key of a sector resource.
    pub fn sector_path(&self, sector: &WorldSectorDesc) -> String {
        sector_resource_path(&self.cooked_dir, &sector.name)
    }

    pub fn find_sector(&self, name: &str) -> Option<&WorldSectorDesc> {
        self.sectors.iter().find(|s| s.name == name)
    }
}

impl WorldContent for CompiledWorld {
    fn content_name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn sector_resource_path(dir: &str, sector_name: &str) -> String {
    join_path(dir, &format!("{sector_name}.{}", WorldSector::EXTENSION))
}
