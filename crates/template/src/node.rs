use serde::{Deserialize, Serialize};
use worldspace_common::Transform;
use worldspace_ecs::Entity;

use crate::component::ComponentTemplate;
use crate::entity::EntityTemplate;
use crate::prefab::PrefabRef;

/// How a node is streamed at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamingModel {
    /// Let the cooker decide (hierarchical grid).
    #[default]
    Auto,
    /// Stream together with the parent node. Sticky under merge.
    StreamWithParent,
    HierarchicalGrid,
    /// Lives in the always-loaded sector.
    AlwaysLoaded,
    SeparateSector,
    /// Dropped during cooking. Sticky under merge.
    Discard,
}

impl StreamingModel {
    /// Models that a later override layer cannot replace.
    pub fn is_sticky(self) -> bool {
        matches!(self, Self::StreamWithParent | Self::Discard)
    }
}

/// One prefab instanced by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefabSetup {
    pub prefab: PrefabRef,
    pub enabled: bool,
}

impl PrefabSetup {
    pub fn new(prefab: PrefabRef) -> Self {
        Self {
            prefab,
            enabled: true,
        }
    }
}

/// Authoring-time descriptor for one node in a world or prefab hierarchy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub name: String,
    /// Placement relative to the parent node.
    #[serde(default)]
    pub placement: Transform,
    #[serde(default)]
    pub streaming_model: StreamingModel,
    /// Custom streaming distance; `0` means "derive from content".
    #[serde(default)]
    pub streaming_distance_override: f32,
    #[serde(default)]
    pub prefabs: Vec<PrefabSetup>,
    #[serde(default)]
    pub entity: Option<EntityTemplate>,
    #[serde(default)]
    pub components: Vec<ComponentTemplate>,
}

impl NodeTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_placement(mut self, placement: Transform) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_streaming(mut self, model: StreamingModel, distance_override: f32) -> Self {
        self.streaming_model = model;
        self.streaming_distance_override = distance_override;
        self
    }

    pub fn with_entity(mut self, entity: EntityTemplate) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn with_component(mut self, component: ComponentTemplate) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_prefab(mut self, prefab: PrefabRef, enabled: bool) -> Self {
        self.prefabs.push(PrefabSetup { prefab, enabled });
        self
    }

    pub fn find_component(&self, name: &str) -> Option<&ComponentTemplate> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Enabled prefab references in declaration order.
    pub fn enabled_prefabs(&self) -> impl Iterator<Item = &PrefabRef> {
        self.prefabs
            .iter()
            .filter(|p| p.enabled && !p.prefab.is_empty())
            .map(|p| &p.prefab)
    }

    /// Collapse a stack of override layers into one template.
    ///
    /// `templates[0]` is the innermost base, the last entry is the final
    /// instance. Name and placement come from the last layer. The merged
    /// template carries no prefab references. An empty stack yields an empty
    /// placeholder node.
    pub fn merge(templates: &[&NodeTemplate]) -> NodeTemplate {
        let Some(last) = templates.last() else {
            return NodeTemplate::default();
        };

        let mut ret = NodeTemplate::new(last.name.clone()).with_placement(last.placement);

        for t in templates {
            if t.streaming_distance_override > 0.0 {
                ret.streaming_distance_override = t.streaming_distance_override;
            }
            if t.streaming_model != StreamingModel::Auto && !ret.streaming_model.is_sticky() {
                ret.streaming_model = t.streaming_model;
            }
        }

        let entities: Vec<&EntityTemplate> = templates
            .iter()
            .filter_map(|t| t.entity.as_ref())
            .filter(|e| e.enabled)
            .collect();
        ret.entity = EntityTemplate::merge(&entities);

        // buckets keep first-appearance order so output is deterministic
        let mut buckets: Vec<(&str, Vec<&ComponentTemplate>)> = Vec::new();
        for comp in templates.iter().flat_map(|t| t.components.iter()) {
            if !comp.enabled || comp.name.is_empty() {
                continue;
            }
            match buckets.iter_mut().find(|(name, _)| *name == comp.name) {
                Some((_, list)) => list.push(comp),
                None => buckets.push((comp.name.as_str(), vec![comp])),
            }
        }
        ret.components = buckets
            .iter()
            .filter_map(|(_, list)| ComponentTemplate::merge(list))
            .collect();

        ret
    }

    /// Compile into a runtime entity placed at `transform` (absolute).
    ///
    /// Nodes without an entity template compile to nothing.
    pub fn compile(&self, transform: Transform) -> Option<Entity> {
        let template = self.entity.as_ref().filter(|e| e.enabled)?;
        let mut entity = template.compile();
        entity.set_transform(transform);
        for comp in self.components.iter().filter(|c| c.enabled) {
            if let Some(component) = comp.compile() {
                entity.attach_component(component);
            }
        }
        Some(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::collections::HashSet;
    use worldspace_common::ParamValue;

    fn at(x: f32) -> Transform {
        Transform::from_position(Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn single_layer_merge_is_identity() {
        let node = NodeTemplate::new("crate")
            .with_placement(at(3.0))
            .with_streaming(StreamingModel::SeparateSector, 120.0)
            .with_entity(EntityTemplate::new("Prop").with_param("mass", ParamValue::Float(2.0)))
            .with_component(ComponentTemplate::new("mesh", "MeshComponent"))
            .with_component(ComponentTemplate::new("body", "RigidBodyComponent"));

        let merged = NodeTemplate::merge(&[&node]);
        assert_eq!(merged, node);
    }

    #[test]
    fn name_and_placement_come_from_last_layer() {
        let base = NodeTemplate::new("base").with_placement(at(1.0));
        let top = NodeTemplate::new("instance").with_placement(at(9.0));
        let merged = NodeTemplate::merge(&[&base, &top]);
        assert_eq!(merged.name, "instance");
        assert_eq!(merged.placement, at(9.0));
    }

    #[test]
    fn zero_distance_does_not_clear_earlier_override() {
        let base = NodeTemplate::new("n").with_streaming(StreamingModel::Auto, 50.0);
        let mid = NodeTemplate::new("n").with_streaming(StreamingModel::Auto, 80.0);
        let top = NodeTemplate::new("n");
        assert_eq!(
            NodeTemplate::merge(&[&base, &mid, &top]).streaming_distance_override,
            80.0
        );
    }

    #[test]
    fn sticky_models_survive_later_overrides() {
        for sticky in [StreamingModel::Discard, StreamingModel::StreamWithParent] {
            for later in [
                StreamingModel::AlwaysLoaded,
                StreamingModel::HierarchicalGrid,
                StreamingModel::SeparateSector,
                StreamingModel::Discard,
                StreamingModel::StreamWithParent,
            ] {
                let base = NodeTemplate::new("n").with_streaming(sticky, 0.0);
                let mid = NodeTemplate::new("n");
                let top = NodeTemplate::new("n").with_streaming(later, 0.0);
                assert_eq!(NodeTemplate::merge(&[&base, &mid, &top]).streaming_model, sticky);
            }
        }
    }

    #[test]
    fn non_sticky_models_are_overridden() {
        let base = NodeTemplate::new("n").with_streaming(StreamingModel::AlwaysLoaded, 0.0);
        let top = NodeTemplate::new("n").with_streaming(StreamingModel::SeparateSector, 0.0);
        let auto = NodeTemplate::new("n");
        assert_eq!(
            NodeTemplate::merge(&[&base, &top, &auto]).streaming_model,
            StreamingModel::SeparateSector
        );
    }

    #[test]
    fn components_are_bucketed_by_name() {
        let base = NodeTemplate::new("n")
            .with_component(ComponentTemplate::new("mesh", "MeshComponent"))
            .with_component(ComponentTemplate::new("light", "LightComponent"));
        let top = NodeTemplate::new("n")
            .with_component(
                ComponentTemplate::override_of("mesh")
                    .with_param("mesh", ParamValue::Text("b.mesh".into())),
            )
            .with_component(ComponentTemplate::new("audio", "AudioComponent"))
            .with_component(ComponentTemplate::new("light", "LightComponent").disabled());

        let merged = NodeTemplate::merge(&[&base, &top]);
        let names: Vec<&str> = merged.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["mesh", "light", "audio"]);
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());

        let mesh = merged.find_component("mesh").unwrap();
        assert_eq!(mesh.class, "MeshComponent");
        assert_eq!(mesh.params.get("mesh"), Some(&ParamValue::Text("b.mesh".into())));
    }

    #[test]
    fn all_disabled_bucket_is_dropped() {
        let base = NodeTemplate::new("n")
            .with_component(ComponentTemplate::new("light", "LightComponent").disabled());
        let top = NodeTemplate::new("n")
            .with_component(ComponentTemplate::override_of("light").disabled());
        assert!(NodeTemplate::merge(&[&base, &top]).components.is_empty());
    }

    #[test]
    fn empty_stack_is_placeholder() {
        let merged = NodeTemplate::merge(&[]);
        assert!(merged.entity.is_none());
        assert!(merged.components.is_empty());
    }

    #[test]
    fn all_disabled_stack_is_placeholder() {
        let base = NodeTemplate::new("n")
            .with_entity(EntityTemplate::new("Prop").disabled())
            .with_component(ComponentTemplate::new("mesh", "MeshComponent").disabled());
        let merged = NodeTemplate::merge(&[&base, &base.clone()]);
        assert!(merged.entity.is_none());
        assert!(merged.components.is_empty());
        assert_eq!(merged.name, "n");
    }

    #[test]
    fn merge_drops_prefab_references() {
        let node = NodeTemplate::new("n").with_prefab(PrefabRef::new("p/a.prefab"), true);
        assert!(NodeTemplate::merge(&[&node]).prefabs.is_empty());
    }

    #[test]
    fn compile_builds_entity_with_components() {
        let node = NodeTemplate::new("n")
            .with_entity(EntityTemplate::new("Prop"))
            .with_component(ComponentTemplate::new("mesh", "MeshComponent"))
            .with_component(ComponentTemplate::override_of("classless"));
        let entity = node.compile(at(5.0)).unwrap();
        assert_eq!(entity.class(), "Prop");
        assert_eq!(entity.transform().position.x, 5.0);
        assert_eq!(entity.components().len(), 1);
    }

    #[test]
    fn compile_without_entity_template_is_none() {
        let node = NodeTemplate::new("n").with_component(ComponentTemplate::new("m", "MeshComponent"));
        assert!(node.compile(Transform::default()).is_none());
    }
}
