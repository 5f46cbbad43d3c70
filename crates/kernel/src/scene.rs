use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use worldspace_common::{EntityId, Transform};

use crate::system::{FrameDebug, SceneSystem, WorldContent};

/// An event record produced by every mutation of the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SceneEvent {
    /// Entity became part of the live scene.
    EntityAttached { id: EntityId, transform: Transform },
    /// Entity was removed from the live scene.
    EntityDetached { id: EntityId },
    /// Cooked world content was attached.
    ContentAttached { name: String },
    /// Cooked world content was detached.
    ContentDetached { name: String },
    /// Scene advanced one tick.
    Ticked { tick: u64 },
}

/// Identifier of a scene observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(pub u32);

/// Per-entity data held while the entity is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachedEntity {
    pub class: String,
    pub transform: Transform,
}

/// The live scene.
///
/// Holds attached entities (BTreeMap for deterministic iteration), the
/// observer positions that drive streaming, attached world content, and the
/// registered runtime systems.
#[derive(Default)]
pub struct Scene {
    entities: BTreeMap<EntityId, AttachedEntity>,
    observers: BTreeMap<ObserverId, Vec3>,
    next_observer: u32,
    tick: u64,
    content: Vec<Arc<dyn WorldContent>>,
    systems: Vec<Box<dyn SceneSystem>>,
    /// Append-only event log of all mutations.
    event_log: Vec<SceneEvent>,
}

impl Scene {
    /// Create an empty scene at tick 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tick.
    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Number of attached entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, AttachedEntity> {
        &self.entities
    }

    pub fn is_attached(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Drain and return the event log.
    pub fn drain_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.event_log)
    }

    /// Read-only access to the event log.
    pub fn events(&self) -> &[SceneEvent] {
        &self.event_log
    }

    /// Attach an entity. Returns false if it was already attached.
    pub fn attach_entity(&mut self, id: EntityId, class: &str, transform: Transform) -> bool {
        if self.entities.contains_key(&id) {
            tracing::warn!(?id, "entity already attached to scene");
            return false;
        }
        self.entities.insert(
            id,
            AttachedEntity {
                class: class.to_string(),
                transform,
            },
        );
        self.event_log
            .push(SceneEvent::EntityAttached { id, transform });
        true
    }

    /// Detach an entity. Returns its data if it was attached.
    pub fn detach_entity(&mut self, id: EntityId) -> Option<AttachedEntity> {
        let data = self.entities.remove(&id);
        if data.is_some() {
            self.event_log.push(SceneEvent::EntityDetached { id });
        }
        data
    }

    // --- Observers ---

    pub fn add_observer(&mut self, position: Vec3) -> ObserverId {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        self.observers.insert(id, position);
        id
    }

    /// Move an observer. Returns false for unknown observers.
    pub fn move_observer(&mut self, id: ObserverId, position: Vec3) -> bool {
        match self.observers.get_mut(&id) {
            Some(pos) => {
                *pos = position;
                true
            }
            None => false,
        }
    }

    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Positions of all observers, in observer creation order.
    pub fn observers(&self) -> Vec<Vec3> {
        self.observers.values().copied().collect()
    }

    // --- Systems and content ---

    pub fn register_system(&mut self, system: Box<dyn SceneSystem>) {
        tracing::debug!(system = system.name(), "registered scene system");
        self.systems.push(system);
    }

    /// Find a registered system by concrete type.
    pub fn system<T: SceneSystem + 'static>(&self) -> Option<&T> {
        self.systems
            .iter()
            .find_map(|s| s.as_any().downcast_ref::<T>())
    }

    pub fn attached_content(&self) -> &[Arc<dyn WorldContent>] {
        &self.content
    }

    /// Attach cooked world content and notify every system.
    pub fn attach_world_content(&mut self, content: Arc<dyn WorldContent>) {
        if self.content.iter().any(|c| Arc::ptr_eq(c, &content)) {
            tracing::warn!(content = content.content_name(), "world content already attached");
            return;
        }
        tracing::info!(content = content.content_name(), "attaching world content");
        self.content.push(content.clone());
        self.event_log.push(SceneEvent::ContentAttached {
            name: content.content_name().to_string(),
        });
        self.with_systems(|scene, system| system.on_world_content_attached(scene, &content));
    }

    /// Detach world content. Returns false if it was not attached.
    pub fn detach_world_content(&mut self, content: &Arc<dyn WorldContent>) -> bool {
        let Some(index) = self.content.iter().position(|c| Arc::ptr_eq(c, content)) else {
            return false;
        };
        tracing::info!(content = content.content_name(), "detaching world content");
        let content = self.content.remove(index);
        self.with_systems(|scene, system| system.on_world_content_detached(scene, &content));
        self.event_log.push(SceneEvent::ContentDetached {
            name: content.content_name().to_string(),
        });
        true
    }

    /// Advance the scene by one tick, running every system's pre-tick phase.
    pub fn tick(&mut self) {
        let _span = tracing::trace_span!("scene_tick", tick = self.tick + 1).entered();
        self.tick += 1;
        self.with_systems(|scene, system| system.on_pre_tick(scene));
        self.event_log.push(SceneEvent::Ticked { tick: self.tick });
    }

    /// Collect debug output from every system.
    pub fn render_frame(&self) -> FrameDebug {
        let mut frame = FrameDebug::default();
        for system in &self.systems {
            system.on_render_frame(self, &mut frame);
        }
        frame
    }

    /// Detach all content, then drop all systems.
    pub fn shutdown(&mut self) {
        while let Some(content) = self.content.last().cloned() {
            self.detach_world_content(&content);
        }
        self.systems.clear();
    }

    fn with_systems(&mut self, mut f: impl FnMut(&mut Scene, &mut dyn SceneSystem)) {
        let mut systems = std::mem::take(&mut self.systems);
        for system in systems.iter_mut() {
            f(self, system.as_mut());
        }
        // systems registered from inside a callback go after the existing ones
        systems.append(&mut self.systems);
        self.systems = systems;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[derive(Debug)]
    struct Content(&'static str);

    impl WorldContent for Content {
        fn content_name(&self) -> &str {
            self.0
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[derive(Default)]
    struct CountingSystem {
        pre_ticks: u32,
        attached: Vec<String>,
        detached: Vec<String>,
        observers_seen: usize,
    }

    impl SceneSystem for CountingSystem {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn on_pre_tick(&mut self, scene: &mut Scene) {
            self.pre_ticks += 1;
            self.observers_seen = scene.observers().len();
        }

        fn on_world_content_attached(&mut self, _scene: &mut Scene, content: &Arc<dyn WorldContent>) {
            self.attached.push(content.content_name().to_string());
        }

        fn on_world_content_detached(&mut self, _scene: &mut Scene, content: &Arc<dyn WorldContent>) {
            self.detached.push(content.content_name().to_string());
        }

        fn on_render_frame(&self, _scene: &Scene, frame: &mut FrameDebug) {
            frame.push_line(format!("ticks={}", self.pre_ticks));
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn scene_starts_empty() {
        let s = Scene::new();
        assert_eq!(s.tick_count(), 0);
        assert_eq!(s.entity_count(), 0);
        assert!(s.observers().is_empty());
    }

    #[test]
    fn attach_and_detach_entity() {
        let mut s = Scene::new();
        let id = EntityId::new();
        assert!(s.attach_entity(id, "StaticEntity", Transform::default()));
        assert!(!s.attach_entity(id, "StaticEntity", Transform::default()));
        assert!(s.is_attached(id));

        assert!(s.detach_entity(id).is_some());
        assert!(s.detach_entity(id).is_none());
        assert_eq!(s.entity_count(), 0);
        // attach + detach; the duplicate attach and second detach log nothing
        assert_eq!(s.events().len(), 2);
    }

    #[test]
    fn observers_add_move_remove() {
        let mut s = Scene::new();
        let a = s.add_observer(Vec3::ZERO);
        let b = s.add_observer(Vec3::X);
        assert!(s.move_observer(a, Vec3::Y));
        assert_eq!(s.observers(), vec![Vec3::Y, Vec3::X]);
        assert!(s.remove_observer(b));
        assert!(!s.move_observer(b, Vec3::Z));
        assert_eq!(s.observers(), vec![Vec3::Y]);
    }

    #[test]
    fn systems_receive_ticks_and_content() {
        let mut s = Scene::new();
        s.register_system(Box::new(CountingSystem::default()));
        s.add_observer(Vec3::ZERO);

        let content: Arc<dyn WorldContent> = Arc::new(Content("test"));
        s.attach_world_content(content.clone());
        s.attach_world_content(content.clone());
        s.tick();
        s.tick();
        assert!(s.detach_world_content(&content));
        assert!(!s.detach_world_content(&content));

        let sys = s.system::<CountingSystem>().unwrap();
        assert_eq!(sys.pre_ticks, 2);
        assert_eq!(sys.attached, vec!["test".to_string()]);
        assert_eq!(sys.detached, vec!["test".to_string()]);
        assert_eq!(sys.observers_seen, 1);
        assert_eq!(s.tick_count(), 2);
    }

    #[test]
    fn render_frame_collects_from_systems() {
        let mut s = Scene::new();
        s.register_system(Box::new(CountingSystem::default()));
        s.tick();
        let frame = s.render_frame();
        assert_eq!(frame.lines, vec!["ticks=1".to_string()]);
    }

    #[test]
    fn shutdown_detaches_all_content() {
        let mut s = Scene::new();
        s.attach_world_content(Arc::new(Content("a")));
        s.attach_world_content(Arc::new(Content("b")));
        s.shutdown();
        assert!(s.attached_content().is_empty());
    }
}
