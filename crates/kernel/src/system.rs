use std::any::Any;
use std::fmt;
use std::sync::Arc;

use worldspace_common::Aabb;

use crate::scene::Scene;

/// Cooked content that can be attached to a scene (e.g. a compiled world).
///
/// Systems receive attached content as a trait object and downcast to the
/// concrete type they know how to stream.
pub trait WorldContent: Any + Send + Sync + fmt::Debug {
    /// Human-readable name used in logs and debug output.
    fn content_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// A runtime system driven by the scene update cadence.
pub trait SceneSystem {
    fn name(&self) -> &'static str;

    /// Called once per scene tick, before anything else is updated.
    fn on_pre_tick(&mut self, _scene: &mut Scene) {}

    fn on_world_content_attached(&mut self, _scene: &mut Scene, _content: &Arc<dyn WorldContent>) {}

    fn on_world_content_detached(&mut self, _scene: &mut Scene, _content: &Arc<dyn WorldContent>) {}

    /// Contribute debug geometry and text for the current frame.
    fn on_render_frame(&self, _scene: &Scene, _frame: &mut FrameDebug) {}

    fn as_any(&self) -> &dyn Any;
}

/// A labelled debug box.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugBox {
    pub bounds: Aabb,
    pub label: String,
    pub color: [u8; 3],
}

/// Debug output collected from all systems for one rendered frame.
#[derive(Debug, Clone, Default)]
pub struct FrameDebug {
    pub boxes: Vec<DebugBox>,
    pub lines: Vec<String>,
}

impl FrameDebug {
    pub fn push_box(&mut self, bounds: Aabb, label: impl Into<String>, color: [u8; 3]) {
        self.boxes.push(DebugBox {
            bounds,
            label: label.into(),
            color,
        });
    }

    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}
