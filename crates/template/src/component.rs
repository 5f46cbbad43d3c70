use serde::{Deserialize, Serialize};
use worldspace_common::{ParamBag, ParamValue};
use worldspace_ecs::Component;

/// Authoring-time description of one named component on a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentTemplate {
    pub enabled: bool,
    /// Merge identity across override layers.
    pub name: String,
    /// Component class to spawn. Empty means "not specified by this layer".
    pub class: String,
    #[serde(default)]
    pub params: ParamBag,
}

impl ComponentTemplate {
    pub fn new(name: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            enabled: true,
            name: name.into(),
            class: class.into(),
            params: ParamBag::new(),
        }
    }

    /// An override layer: names the component but leaves its class alone.
    pub fn override_of(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn with_param(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Merge a stack of same-named templates, innermost first.
    ///
    /// The last layer naming a class supplies it; parameters from later
    /// layers override same-named parameters of earlier ones. Disabled
    /// layers contribute nothing. Returns `None` when nothing is enabled.
    pub fn merge(templates: &[&ComponentTemplate]) -> Option<ComponentTemplate> {
        let mut enabled = templates.iter().filter(|t| t.enabled);
        let first = enabled.next()?;

        let mut ret = ComponentTemplate::new(first.name.clone(), first.class.clone());
        ret.params = first.params.clone();
        for t in enabled {
            if !t.class.is_empty() {
                ret.class = t.class.clone();
            }
            ret.params
                .extend(t.params.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Some(ret)
    }

    /// Create the runtime component. Templates without a class compile to nothing.
    pub fn compile(&self) -> Option<Component> {
        if self.class.is_empty() {
            return None;
        }
        let mut component = Component::new(self.name.clone(), self.class.clone());
        component.params = self.params.clone();
        Some(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layer_overrides_class_and_params() {
        let base = ComponentTemplate::new("mesh", "MeshComponent")
            .with_param("mesh", ParamValue::Text("rock.mesh".into()))
            .with_param("castShadows", ParamValue::Bool(true));
        let over = ComponentTemplate::override_of("mesh")
            .with_param("mesh", ParamValue::Text("boulder.mesh".into()));
        let top = ComponentTemplate::new("mesh", "SkinnedMeshComponent");

        let merged = ComponentTemplate::merge(&[&base, &over, &top]).unwrap();
        assert_eq!(merged.class, "SkinnedMeshComponent");
        assert_eq!(
            merged.params.get("mesh"),
            Some(&ParamValue::Text("boulder.mesh".into()))
        );
        assert_eq!(merged.params.get("castShadows"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn empty_class_does_not_clear_earlier_class() {
        let base = ComponentTemplate::new("light", "LightComponent");
        let over = ComponentTemplate::override_of("light");
        let merged = ComponentTemplate::merge(&[&base, &over]).unwrap();
        assert_eq!(merged.class, "LightComponent");
    }

    #[test]
    fn disabled_layers_are_ignored() {
        let base = ComponentTemplate::new("light", "LightComponent");
        let off = ComponentTemplate::new("light", "SpotLightComponent")
            .with_param("range", ParamValue::Float(4.0))
            .disabled();
        let merged = ComponentTemplate::merge(&[&base, &off]).unwrap();
        assert_eq!(merged.class, "LightComponent");
        assert!(merged.params.is_empty());
    }

    #[test]
    fn all_disabled_yields_none() {
        let off = ComponentTemplate::new("light", "LightComponent").disabled();
        assert!(ComponentTemplate::merge(&[&off]).is_none());
        assert!(ComponentTemplate::merge(&[]).is_none());
    }

    #[test]
    fn compile_requires_class() {
        assert!(ComponentTemplate::override_of("x").compile().is_none());
        let c = ComponentTemplate::new("x", "MeshComponent")
            .with_param("mesh", ParamValue::Text("a".into()))
            .compile()
            .unwrap();
        assert_eq!(c.class, "MeshComponent");
        assert_eq!(c.params.len(), 1);
    }
}
