//! Cook-time node collection and sector packing.

use glam::Vec3;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use worldspace_common::{Aabb, EntityId, Transform};
use worldspace_ecs::Entity;
use worldspace_persist::{Depot, file_stem, load_resource};
use worldspace_template::{
    Layer, NodeTemplateContainer, PrefabDependencies, PrefabSource, StreamingModel,
};

use crate::config::GridConfig;
use crate::grid::{SectorCoord, SectorGrid};
use crate::sector::{ALWAYS_LOADED_SECTOR, WorldSector, WorldSectorDesc};

/// A compiled node kept between extraction and packing.
#[derive(Debug, Clone)]
pub struct ExtractedNode {
    pub entity: Option<Entity>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// `/`-joined names from the layer down to this node.
    pub path: String,
    /// Absolute placement.
    pub transform: Transform,
    pub streaming_model: StreamingModel,
    pub streaming_distance_override: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SectorKey {
    AlwaysLoaded,
    Grid(SectorCoord),
    Separate(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Placement {
    Discard,
    Sector(SectorKey, Option<Aabb>),
}

/// Walks layers, flattens their nodes and buckets entities into sectors.
///
/// Nodes live in one arena; hierarchy links are arena indices. Parents are
/// always extracted before their children.
pub struct NodeCollector<'s> {
    source: &'s dyn PrefabSource,
    grid: SectorGrid,
    nodes: Vec<ExtractedNode>,
    roots: Vec<usize>,
    dependencies: PrefabDependencies,
    id_seed: String,
}

impl<'s> NodeCollector<'s> {
    pub fn new(source: &'s dyn PrefabSource, config: GridConfig) -> Self {
        Self {
            source,
            grid: SectorGrid::new(config),
            nodes: Vec::new(),
            roots: Vec::new(),
            dependencies: PrefabDependencies::new(),
            id_seed: String::new(),
        }
    }

    /// Mix `seed` into every entity id this collector derives. Entity ids
    /// are a function of the seed, the node path and the extraction order.
    pub fn with_id_seed(mut self, seed: impl Into<String>) -> Self {
        self.id_seed = seed.into();
        self
    }

    pub fn nodes(&self) -> &[ExtractedNode] {
        &self.nodes
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn dependencies(&self) -> &PrefabDependencies {
        &self.dependencies
    }

    pub fn into_dependencies(self) -> PrefabDependencies {
        self.dependencies
    }

    /// Load a layer and extract all of its nodes. A layer that cannot be
    /// loaded contributes nothing. Returns the number of nodes extracted.
    pub fn extract_nodes_from_layer(&mut self, depot: &dyn Depot, layer_path: &str) -> usize {
        let layer: Layer = match load_resource(depot, layer_path) {
            Ok(layer) => layer,
            Err(err) => {
                tracing::warn!(layer = layer_path, %err, "failed to load layer, skipping");
                return 0;
            }
        };
        let stem = file_stem(layer_path).trim_end_matches(".layer");
        self.extract_nodes_from_container(&layer.container, stem)
    }

    /// Flatten every root of `container` at its authored placement and append
    /// the result. Returns the number of nodes extracted.
    pub fn extract_nodes_from_container(&mut self, container: &NodeTemplateContainer, prefix: &str) -> usize {
        let (flat, deps) = container.compile(Transform::default(), self.source);
        self.dependencies.merge_from(&deps);

        let base = self.nodes.len();
        for (index, record) in flat.nodes().iter().enumerate() {
            let parent = record.parent.map(|p| base + p);
            let (transform, parent_path) = match parent {
                Some(p) => {
                    let parent_node = &self.nodes[p];
                    (
                        parent_node.transform.mul_transform(&record.template.placement),
                        parent_node.path.as_str(),
                    )
                }
                None => (record.template.placement, prefix),
            };
            let path = if parent_path.is_empty() {
                record.template.name.clone()
            } else {
                format!("{parent_path}/{}", record.template.name)
            };

            let id = base + index;
            let entity = record.template.compile(transform).map(|mut entity| {
                entity.set_id(EntityId::from_key(&format!("{}:{path}#{id}", self.id_seed)));
                entity
            });
            let node = ExtractedNode {
                entity,
                parent,
                children: Vec::new(),
                path,
                transform,
                streaming_model: record.template.streaming_model,
                streaming_distance_override: record.template.streaming_distance_override,
            };
            match parent {
                Some(p) => self.nodes[p].children.push(id),
                None => self.roots.push(id),
            }
            self.nodes.push(node);
        }
        flat.len()
    }

    fn placement_for(&self, index: usize, resolved: &[Placement]) -> Placement {
        let node = &self.nodes[index];
        match node.streaming_model {
            StreamingModel::Discard => Placement::Discard,
            StreamingModel::AlwaysLoaded => Placement::Sector(SectorKey::AlwaysLoaded, None),
            StreamingModel::StreamWithParent if node.parent.is_some() => {
                node.parent.map_or(Placement::Discard, |p| resolved[p])
            }
            StreamingModel::SeparateSector => {
                let distance = self.node_distance(node);
                let half = Vec3::new(distance, distance, self.grid.config().vertical_half_extent);
                let bounds = Aabb::from_center_half_extents(node.transform.position, half);
                Placement::Sector(SectorKey::Separate(index), Some(bounds))
            }
            _ => {
                let distance = self.node_distance(node);
                let level = self.grid.grid_level_for_streaming_distance(distance);
                let coord = self.grid.sector_coord(level, node.transform.position);
                Placement::Sector(SectorKey::Grid(coord), None)
            }
        }
    }

    fn node_distance(&self, node: &ExtractedNode) -> f32 {
        let required = node
            .entity
            .as_ref()
            .map_or(0.0, Entity::calculate_required_streaming_distance);
        self.grid
            .effective_distance(node.streaming_distance_override, required)
    }

    /// Bucket every extracted entity into sectors, in first-use order.
    ///
    /// Packing is read-only; packing the same collector twice yields the same
    /// sectors with the same entities.
    pub fn pack(&self) -> Vec<WorldSectorDesc> {
        let _span = tracing::info_span!("pack_sectors", nodes = self.nodes.len()).entered();

        let mut resolved = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            let placement = self.placement_for(index, &resolved);
            resolved.push(placement);
        }

        let mut lookup: HashMap<SectorKey, usize> = HashMap::new();
        let mut used_names: HashSet<String> = HashSet::new();
        let mut sectors: Vec<(WorldSectorDesc, Vec<Entity>)> = Vec::new();
        let mut discarded = 0usize;

        for (index, node) in self.nodes.iter().enumerate() {
            let Some(entity) = &node.entity else {
                continue;
            };
            let Placement::Sector(key, bounds) = resolved[index] else {
                discarded += 1;
                continue;
            };
            let slot = *lookup.entry(key).or_insert_with(|| {
                let mut desc = self.sector_desc(key, bounds);
                desc.name = unique_name(&mut used_names, desc.name);
                sectors.push((desc, Vec::new()));
                sectors.len() - 1
            });
            sectors[slot].1.push(entity.clone());
        }

        let packed: Vec<WorldSectorDesc> = sectors
            .into_iter()
            .map(|(mut desc, entities)| {
                desc.unsaved_payload = Some(Arc::new(WorldSector { entities }));
                desc
            })
            .collect();

        tracing::info!(sectors = packed.len(), discarded, "packed sectors");
        packed
    }

    fn sector_desc(&self, key: SectorKey, bounds: Option<Aabb>) -> WorldSectorDesc {
        match key {
            SectorKey::AlwaysLoaded => WorldSectorDesc::new(ALWAYS_LOADED_SECTOR, true, Aabb::UNBOUNDED),
            SectorKey::Grid(coord) => {
                WorldSectorDesc::new(coord.to_string(), false, self.grid.streaming_box(coord))
            }
            SectorKey::Separate(index) => {
                let name = format!("S_{}", sanitize(&self.nodes[index].path));
                WorldSectorDesc::new(name, false, bounds.unwrap_or(Aabb::UNBOUNDED))
            }
        }
    }
}

/// `name`, or `name_2`, `name_3`... when an earlier sector already took it.
fn unique_name(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name}_{n}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn sanitize(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
