use serde::{Deserialize, Serialize};
use worldspace_common::ParamBag;
use worldspace_persist::{Depot, Resource, join_path, parent_path};

use crate::container::NodeTemplateContainer;

/// Directory, relative to the world resource, scanned for layers when the
/// world lists none.
pub const LAYERS_DIR: &str = "layers";

/// One authored layer of a world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub container: NodeTemplateContainer,
}

impl Resource for Layer {
    const KIND: &'static str = "layer";
    const EXTENSION: &'static str = "layer";
}

/// World-wide parameters carried into the compiled world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldParameters {
    #[serde(default)]
    pub params: ParamBag,
}

/// Authored world: global parameters plus the layers to cook.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldTemplate {
    #[serde(default)]
    pub parameters: WorldParameters,
    /// Depot paths of layer resources. Empty means "discover".
    #[serde(default)]
    pub layers: Vec<String>,
}

impl Resource for WorldTemplate {
    const KIND: &'static str = "world";
    const EXTENSION: &'static str = "world";
}

impl WorldTemplate {
    /// Layer paths to cook for the world stored at `world_path`.
    ///
    /// Explicit layers are returned as listed. Otherwise every layer resource
    /// in the `layers` directory next to the world is used, sorted by path.
    pub fn collect_layer_paths(&self, depot: &dyn Depot, world_path: &str) -> Vec<String> {
        if !self.layers.is_empty() {
            return self.layers.clone();
        }
        let dir = join_path(parent_path(world_path), LAYERS_DIR);
        match depot.list(&dir) {
            Ok(mut files) => {
                files.retain(|f| is_layer_path(f));
                files.sort();
                tracing::debug!(dir = %dir, count = files.len(), "discovered layers");
                files
            }
            Err(err) => {
                tracing::warn!(dir = %dir, %err, "failed to list layers");
                Vec::new()
            }
        }
    }
}

fn is_layer_path(path: &str) -> bool {
    path.ends_with(".layer") || path.ends_with(".layer.json")
}
