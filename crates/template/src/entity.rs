use serde::{Deserialize, Serialize};
use worldspace_common::{ParamBag, ParamValue};
use worldspace_ecs::Entity;

/// Authoring-time description of the entity a node spawns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTemplate {
    pub enabled: bool,
    /// Entity class to spawn. Empty means "not specified by this layer".
    pub class: String,
    #[serde(default)]
    pub params: ParamBag,
}

impl Default for EntityTemplate {
    fn default() -> Self {
        Self {
            enabled: true,
            class: String::new(),
            params: ParamBag::new(),
        }
    }
}

impl EntityTemplate {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Merge a stack of entity templates, innermost first.
    ///
    /// Only enabled templates take part. The last one naming a class supplies
    /// it and later parameters override earlier ones. `None` for an empty stack.
    pub fn merge(templates: &[&EntityTemplate]) -> Option<EntityTemplate> {
        let mut enabled = templates.iter().filter(|t| t.enabled).peekable();
        enabled.peek()?;

        let mut ret = EntityTemplate::default();
        for t in enabled {
            if !t.class.is_empty() {
                ret.class = t.class.clone();
            }
            ret.params
                .extend(t.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(ret)
    }

    /// Create the runtime entity, without components or placement.
    pub fn compile(&self) -> Entity {
        let mut entity = Entity::new(self.class.clone());
        entity.set_params(self.params.clone());
        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldspace_ecs::DEFAULT_ENTITY_CLASS;

    #[test]
    fn merge_takes_last_class_and_layers_params() {
        let base = EntityTemplate::new("Door")
            .with_param("locked", ParamValue::Bool(false))
            .with_param("health", ParamValue::Int(10));
        let over = EntityTemplate::default().with_param("locked", ParamValue::Bool(true));

        let merged = EntityTemplate::merge(&[&base, &over]).unwrap();
        assert_eq!(merged.class, "Door");
        assert_eq!(merged.params.get("locked"), Some(&ParamValue::Bool(true)));
        assert_eq!(merged.params.get("health"), Some(&ParamValue::Int(10)));
    }

    #[test]
    fn merge_skips_disabled() {
        let base = EntityTemplate::new("Door");
        let off = EntityTemplate::new("Window").disabled();
        assert_eq!(EntityTemplate::merge(&[&base, &off]).unwrap().class, "Door");
        assert!(EntityTemplate::merge(&[&off]).is_none());
        assert!(EntityTemplate::merge(&[]).is_none());
    }

    #[test]
    fn compile_uses_default_class_when_unset() {
        let e = EntityTemplate::default()
            .with_param("tag", ParamValue::Text("x".into()))
            .compile();
        assert_eq!(e.class(), DEFAULT_ENTITY_CLASS);
        assert_eq!(e.params().len(), 1);
    }
}
