//! Prefab flattening.
//!
//! A [`NodeNavigator`] is the stack of template layers that together describe
//! one output node: prefab roots (innermost first) followed by the authored
//! node. [`NodeCompiler`] merges each navigator into one template, emits it,
//! then walks the union of child names across all layers.

use std::collections::BTreeSet;
use std::sync::Arc;
use worldspace_common::Transform;

use crate::container::NodeTemplateContainer;
use crate::node::NodeTemplate;
use crate::prefab::{PrefabDependencies, PrefabSource};

/// Deepest node nesting the compiler descends into.
pub const MAX_COMPILE_DEPTH: usize = 64;

#[derive(Debug, Clone)]
enum CursorSource<'a> {
    Authored(&'a NodeTemplateContainer),
    Prefab(Arc<NodeTemplateContainer>),
}

/// A position inside some container.
#[derive(Debug, Clone)]
struct Cursor<'a> {
    source: CursorSource<'a>,
    node: usize,
}

impl<'a> Cursor<'a> {
    fn container(&self) -> &NodeTemplateContainer {
        match &self.source {
            CursorSource::Authored(c) => *c,
            CursorSource::Prefab(c) => c.as_ref(),
        }
    }

    fn template(&self) -> &NodeTemplate {
        &self.container().nodes()[self.node].template
    }

    fn child(&self, name: &str) -> Option<Cursor<'a>> {
        let node = self.container().find_child(self.node, name)?;
        Some(Cursor {
            source: self.source.clone(),
            node,
        })
    }
}

/// Ordered template layers contributing to one output node.
#[derive(Debug, Clone, Default)]
pub struct NodeNavigator<'a> {
    cursors: Vec<Cursor<'a>>,
}

impl<'a> NodeNavigator<'a> {
    /// Navigator over a single authored node.
    pub fn new(container: &'a NodeTemplateContainer, node: usize) -> Self {
        let mut nav = Self::default();
        if node < container.len() {
            nav.cursors.push(Cursor {
                source: CursorSource::Authored(container),
                node,
            });
        }
        nav
    }

    pub fn len(&self) -> usize {
        self.cursors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cursors.is_empty()
    }

    /// Templates in merge order.
    pub fn templates(&self) -> Vec<&NodeTemplate> {
        self.cursors.iter().map(Cursor::template).collect()
    }

    /// Insert the root of every enabled prefab ahead of the cursor that
    /// references it, expanding chained prefabs the same way.
    ///
    /// A prefab path already in `instanced` is skipped; every path expanded
    /// here is added to it. Seeding it with the prefabs of the ancestor nodes
    /// stops a prefab from being instanced inside itself.
    pub fn expand_prefabs(
        &mut self,
        source: &dyn PrefabSource,
        deps: &mut PrefabDependencies,
        instanced: &mut BTreeSet<String>,
    ) {
        let cursors = std::mem::take(&mut self.cursors);
        for cursor in cursors {
            expand_cursor(cursor, source, deps, instanced, &mut self.cursors);
        }
    }

    /// Distinct child names across all layers, in first-seen order.
    pub fn child_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for cursor in &self.cursors {
            let container = cursor.container();
            for &child in &container.nodes()[cursor.node].children {
                let name = &container.nodes()[child].template.name;
                if !names.iter().any(|n| n == name) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Navigator over the same-named child of every layer that has one.
    pub fn child(&self, name: &str) -> NodeNavigator<'a> {
        NodeNavigator {
            cursors: self.cursors.iter().filter_map(|c| c.child(name)).collect(),
        }
    }
}

fn expand_cursor<'a>(
    cursor: Cursor<'a>,
    source: &dyn PrefabSource,
    deps: &mut PrefabDependencies,
    visited: &mut BTreeSet<String>,
    out: &mut Vec<Cursor<'a>>,
) {
    let prefabs: Vec<_> = cursor.template().enabled_prefabs().cloned().collect();
    for prefab_ref in prefabs {
        if !visited.insert(prefab_ref.path.clone()) {
            tracing::debug!(prefab = %prefab_ref.path, "prefab already instanced on this branch");
            continue;
        }
        let Some(prefab) = source.resolve(&prefab_ref) else {
            tracing::warn!(prefab = %prefab_ref.path, "unresolved prefab, skipping");
            continue;
        };
        let (container, version) = prefab.snapshot();
        let Some(&root) = container.roots().first() else {
            continue;
        };
        deps.record(&prefab_ref.path, version);
        let root_cursor = Cursor {
            source: CursorSource::Prefab(container),
            node: root,
        };
        expand_cursor(root_cursor, source, deps, visited, out);
    }
    out.push(cursor);
}

/// Flattens authored nodes into one output container.
pub struct NodeCompiler<'s> {
    source: &'s dyn PrefabSource,
    output: NodeTemplateContainer,
    dependencies: PrefabDependencies,
}

impl<'s> NodeCompiler<'s> {
    pub fn new(source: &'s dyn PrefabSource) -> Self {
        Self {
            source,
            output: NodeTemplateContainer::new(),
            dependencies: PrefabDependencies::new(),
        }
    }

    pub fn output(&self) -> &NodeTemplateContainer {
        &self.output
    }

    pub fn dependencies(&self) -> &PrefabDependencies {
        &self.dependencies
    }

    pub fn record_dependency(&mut self, path: &str, version: u64) {
        self.dependencies.record(path, version);
    }

    /// Compile every root of `container`, each placed at `placement` composed
    /// with the root's own placement.
    pub fn compile_container(&mut self, container: &NodeTemplateContainer, placement: Transform) {
        for &root in container.roots() {
            let local = container.nodes()[root].template.placement;
            self.compile_node(container, root, placement.mul_transform(&local));
        }
    }

    /// Compile one authored node and its whole subtree as a new output root.
    ///
    /// The output root takes `placement`; descendants keep their merged local
    /// placement. Returns the output index of the root.
    pub fn compile_node(
        &mut self,
        container: &NodeTemplateContainer,
        node: usize,
        placement: Transform,
    ) -> Option<usize> {
        let nav = NodeNavigator::new(container, node);
        if nav.is_empty() {
            tracing::warn!(node, "node index out of range");
            return None;
        }
        self.compile_navigator(nav, None, Some(placement), &BTreeSet::new(), 0)
    }

    fn compile_navigator(
        &mut self,
        mut nav: NodeNavigator<'_>,
        parent: Option<usize>,
        placement: Option<Transform>,
        ancestors: &BTreeSet<String>,
        depth: usize,
    ) -> Option<usize> {
        if depth >= MAX_COMPILE_DEPTH {
            let templates = nav.templates();
            let name = templates.last().map(|t| t.name.as_str()).unwrap_or("");
            tracing::error!(depth, node = name, "node nesting too deep, possible prefab cycle");
            return None;
        }

        let mut instanced = ancestors.clone();
        nav.expand_prefabs(self.source, &mut self.dependencies, &mut instanced);

        let mut merged = NodeTemplate::merge(&nav.templates());
        if let Some(placement) = placement {
            merged.placement = placement;
        }
        let index = self.output.add_node(merged, parent);

        for name in nav.child_names() {
            let child = nav.child(&name);
            self.compile_navigator(child, Some(index), None, &instanced, depth + 1);
        }
        Some(index)
    }

    pub fn finish(self) -> (NodeTemplateContainer, PrefabDependencies) {
        (self.output, self.dependencies)
    }
}
