//! Compiled runtime entities and components.
//!
//! Entities are produced by compiling node templates at cook time, travel
//! inside sector payloads, and are attached to / detached from the live scene
//! by the streaming system.
//!
//! # Invariants
//! - An entity's components are uniquely named.
//! - Attach/detach go through `Scene`, so the scene event log sees every change.

use serde::{Deserialize, Serialize};
use worldspace_common::{EntityId, ParamBag, ParamValue, Transform};
use worldspace_kernel::Scene;

/// Parameter consulted for an explicit streaming distance.
pub const STREAMING_DISTANCE_PARAM: &str = "streamingDistance";

/// Entity class used when a template does not name one.
pub const DEFAULT_ENTITY_CLASS: &str = "StaticEntity";

/// Per-class streaming distances for components that carry no explicit value.
const CLASS_STREAMING_DISTANCES: &[(&str, f32)] = &[("MeshComponent", 75.0)];

/// A compiled component attached to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub class: String,
    pub params: ParamBag,
}

impl Component {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class: class.into(),
            params: ParamBag::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Distance from which this component must be resident to look right.
    pub fn required_streaming_distance(&self) -> f32 {
        if let Some(distance) = self
            .params
            .get(STREAMING_DISTANCE_PARAM)
            .and_then(ParamValue::as_float)
        {
            return distance.max(0.0);
        }
        CLASS_STREAMING_DISTANCES
            .iter()
            .find(|(class, _)| *class == self.class)
            .map(|(_, distance)| *distance)
            .unwrap_or(0.0)
    }
}

/// A compiled entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    class: String,
    params: ParamBag,
    transform: Transform,
    components: Vec<Component>,
}

impl Entity {
    pub fn new(class: impl Into<String>) -> Self {
        let class = class.into();
        Self {
            id: EntityId::new(),
            class: if class.is_empty() {
                DEFAULT_ENTITY_CLASS.to_string()
            } else {
                class
            },
            params: ParamBag::new(),
            transform: Transform::default(),
            components: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn params(&self) -> &ParamBag {
        &self.params
    }

    pub fn set_params(&mut self, params: ParamBag) {
        self.params = params;
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Attach a component, replacing any existing component with the same name.
    pub fn attach_component(&mut self, component: Component) {
        match self.components.iter_mut().find(|c| c.name == component.name) {
            Some(existing) => *existing = component,
            None => self.components.push(component),
        }
    }

    /// The largest distance at which any part of this entity must be resident.
    pub fn calculate_required_streaming_distance(&self) -> f32 {
        let own = self
            .params
            .get(STREAMING_DISTANCE_PARAM)
            .and_then(ParamValue::as_float)
            .unwrap_or(0.0);
        self.components
            .iter()
            .map(Component::required_streaming_distance)
            .fold(own.max(0.0), f32::max)
    }

    /// Make the entity part of the live scene.
    pub fn attach_to_scene(&self, scene: &mut Scene) -> bool {
        tracing::trace!(id = ?self.id, class = %self.class, "attaching entity");
        scene.attach_entity(self.id, &self.class, self.transform)
    }

    /// Remove the entity from the live scene.
    pub fn detach_from_scene(&self, scene: &mut Scene) -> bool {
        tracing::trace!(id = ?self.id, "detaching entity");
        scene.detach_entity(self.id).is_some()
    }
}
