use worldspace_persist::{
    Depot, DepotError, Resource, file_stem, join_path, load_resource, parent_path, save_resource,
};
use worldspace_template::{PrefabSource, WorldTemplate};

use crate::collector::NodeCollector;
use crate::config::CookConfig;
use crate::sector::{CompiledWorld, sector_resource_path};

/// Errors from cooking a world.
#[derive(Debug, thiserror::Error)]
pub enum CookError {
    #[error("failed to load world {path}: {source}")]
    WorldLoad {
        path: String,
        #[source]
        source: DepotError,
    },
    #[error("failed to save {path}: {source}")]
    Save {
        path: String,
        #[source]
        source: DepotError,
    },
}

/// Summary of one cook run.
#[derive(Debug, Clone, Default)]
pub struct CookReport {
    pub world_path: String,
    pub compiled_world_path: String,
    pub layer_count: usize,
    pub node_count: usize,
    pub sector_count: usize,
    pub entity_count: usize,
    pub dependency_count: usize,
    /// Every resource written, sectors first.
    pub written: Vec<String>,
}

/// Cook the world at `world_path` into `<world dir>/<output dir>/`.
///
/// Missing layers and prefabs are skipped. Any write failure aborts the run;
/// files already written are left in place.
pub fn cook_world(
    depot: &dyn Depot,
    world_path: &str,
    config: &CookConfig,
    source: &dyn PrefabSource,
) -> Result<CookReport, CookError> {
    let _span = tracing::info_span!("cook_world", world = world_path).entered();

    let world: WorldTemplate = load_resource(depot, world_path).map_err(|err| CookError::WorldLoad {
        path: world_path.to_string(),
        source: err,
    })?;

    let layers = world.collect_layer_paths(depot, world_path);
    let mut collector = NodeCollector::new(source, config.grid.clone()).with_id_seed(world_path);
    let mut node_count = 0;
    for layer in &layers {
        node_count += collector.extract_nodes_from_layer(depot, layer);
    }

    let mut sectors = collector.pack();
    let cooked_dir = join_path(parent_path(world_path), &config.output_dir);
    let mut report = CookReport {
        world_path: world_path.to_string(),
        layer_count: layers.len(),
        node_count,
        sector_count: sectors.len(),
        ..CookReport::default()
    };

    for sector in &mut sectors {
        let Some(payload) = sector.unsaved_payload.take() else {
            continue;
        };
        let path = sector_resource_path(&cooked_dir, &sector.name);
        save_resource(depot, payload.as_ref(), &path).map_err(|err| {
            tracing::error!(path = %path, %err, "failed to save sector");
            CookError::Save {
                path: path.clone(),
                source: err,
            }
        })?;
        tracing::debug!(sector = %sector.name, entities = payload.len(), "saved sector");
        report.entity_count += payload.len();
        report.written.push(path);
    }

    let stem = file_stem(world_path);
    let mut compiled = CompiledWorld::new(
        stem,
        world.parameters,
        sectors,
        collector.into_dependencies(),
    );
    let compiled_path = join_path(&cooked_dir, &format!("{stem}.{}", CompiledWorld::EXTENSION));
    compiled.save(depot, &compiled_path).map_err(|err| {
        tracing::error!(path = %compiled_path, %err, "failed to save compiled world");
        CookError::Save {
            path: compiled_path.clone(),
            source: err,
        }
    })?;

    report.dependency_count = compiled.dependencies.len();
    report.compiled_world_path = compiled_path.clone();
    report.written.push(compiled_path);
    tracing::info!(
        sectors = report.sector_count,
        entities = report.entity_count,
        dependencies = report.dependency_count,
        "cooked world"
    );
    Ok(report)
}
