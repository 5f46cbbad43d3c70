use serde::{Deserialize, Serialize};
use worldspace_common::Transform;

use crate::compiler::NodeCompiler;
use crate::node::NodeTemplate;
use crate::prefab::{PrefabDependencies, PrefabSource};

/// One node of a container with its hierarchy links.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub template: NodeTemplate,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// A flat, topologically ordered node hierarchy.
///
/// Parents always precede their children; roots have no parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ContainerData", into = "ContainerData")]
pub struct NodeTemplateContainer {
    nodes: Vec<NodeRecord>,
    roots: Vec<usize>,
}

#[derive(Serialize, Deserialize)]
struct RecordData {
    template: NodeTemplate,
    #[serde(default)]
    parent: Option<usize>,
}

#[derive(Serialize, Deserialize)]
struct ContainerData {
    nodes: Vec<RecordData>,
}

impl From<ContainerData> for NodeTemplateContainer {
    fn from(data: ContainerData) -> Self {
        let mut container = NodeTemplateContainer {
            nodes: data
                .nodes
                .into_iter()
                .map(|r| NodeRecord {
                    template: r.template,
                    parent: r.parent,
                    children: Vec::new(),
                })
                .collect(),
            roots: Vec::new(),
        };
        container.repair();
        container
    }
}

impl From<NodeTemplateContainer> for ContainerData {
    fn from(container: NodeTemplateContainer) -> Self {
        ContainerData {
            nodes: container
                .nodes
                .into_iter()
                .map(|r| RecordData {
                    template: r.template,
                    parent: r.parent,
                })
                .collect(),
        }
    }
}

impl NodeTemplateContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node. A parent that does not precede the new node makes it a root.
    pub fn add_node(&mut self, template: NodeTemplate, parent: Option<usize>) -> usize {
        let index = self.nodes.len();
        let parent = match parent {
            Some(p) if p < index => Some(p),
            Some(p) => {
                tracing::warn!(node = %template.name, parent = p, "invalid parent index, adding as root");
                None
            }
            None => None,
        };
        self.nodes.push(NodeRecord {
            template,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(index),
            None => self.roots.push(index),
        }
        index
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&NodeRecord> {
        self.nodes.get(index)
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// First child of `parent` with the given name.
    pub fn find_child(&self, parent: usize, name: &str) -> Option<usize> {
        self.nodes
            .get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.nodes[c].template.name == name)
    }

    pub fn find_root(&self, name: &str) -> Option<usize> {
        self.roots
            .iter()
            .copied()
            .find(|&r| self.nodes[r].template.name == name)
    }

    /// Rebuild child and root lists from parent indices.
    ///
    /// Records whose parent is out of range or does not precede them become
    /// roots. Returns the number of records that were repaired.
    pub fn repair(&mut self) -> usize {
        let mut repaired = 0;
        self.roots.clear();
        for record in &mut self.nodes {
            record.children.clear();
        }
        for index in 0..self.nodes.len() {
            match self.nodes[index].parent {
                Some(p) if p < index => self.nodes[p].children.push(index),
                Some(p) => {
                    tracing::warn!(
                        node = %self.nodes[index].template.name,
                        parent = p,
                        "node parent does not precede it, treating as root"
                    );
                    self.nodes[index].parent = None;
                    self.roots.push(index);
                    repaired += 1;
                }
                None => self.roots.push(index),
            }
        }
        repaired
    }

    /// Flatten every root, resolving prefab references through `source`.
    ///
    /// Each root is placed at `placement` composed with its own placement.
    pub fn compile(
        &self,
        placement: Transform,
        source: &dyn PrefabSource,
    ) -> (NodeTemplateContainer, PrefabDependencies) {
        let mut compiler = NodeCompiler::new(source);
        compiler.compile_container(self, placement);
        compiler.finish()
    }

    /// True when any node still references a prefab.
    pub fn has_prefab_references(&self) -> bool {
        self.nodes
            .iter()
            .any(|r| r.template.enabled_prefabs().next().is_some())
    }
}
