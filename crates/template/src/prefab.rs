use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use worldspace_common::Transform;
use worldspace_persist::{Depot, Resource, load_resource, save_resource};

use crate::compiler::NodeCompiler;
use crate::container::NodeTemplateContainer;

/// Reference to a prefab resource by depot path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrefabRef {
    pub path: String,
}

impl PrefabRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

/// Persisted form of a prefab.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrefabData {
    pub container: NodeTemplateContainer,
    #[serde(default)]
    pub version: u64,
}

impl Resource for PrefabData {
    const KIND: &'static str = "prefab";
    const EXTENSION: &'static str = "prefab";
}

#[derive(Debug)]
struct PrefabState {
    container: Arc<NodeTemplateContainer>,
    version: u64,
}

/// A reusable sub-hierarchy, versioned on every content replace.
///
/// Readers take a `(container, version)` snapshot under one lock so a compile
/// sees consistent content even if the prefab is edited concurrently.
#[derive(Debug)]
pub struct Prefab {
    path: String,
    state: RwLock<PrefabState>,
}

impl Prefab {
    pub fn new(path: impl Into<String>, container: NodeTemplateContainer) -> Self {
        Self::with_version(path, container, 1)
    }

    fn with_version(path: impl Into<String>, container: NodeTemplateContainer, version: u64) -> Self {
        Self {
            path: path.into(),
            state: RwLock::new(PrefabState {
                container: Arc::new(container),
                version,
            }),
        }
    }

    pub fn from_data(path: impl Into<String>, data: PrefabData) -> Self {
        Self::with_version(path, data.container, data.version.max(1))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn snapshot(&self) -> (Arc<NodeTemplateContainer>, u64) {
        let state = self.state.read();
        (state.container.clone(), state.version)
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    pub fn has_content(&self) -> bool {
        !self.state.read().container.roots().is_empty()
    }

    /// Swap in new content and bump the data version. Returns the new version.
    pub fn replace_content(&self, container: NodeTemplateContainer) -> u64 {
        let mut state = self.state.write();
        state.container = Arc::new(container);
        state.version += 1;
        tracing::debug!(prefab = %self.path, version = state.version, "prefab content replaced");
        state.version
    }

    pub fn to_data(&self) -> PrefabData {
        let (container, version) = self.snapshot();
        PrefabData {
            container: (*container).clone(),
            version,
        }
    }

    /// Flatten this prefab's content at a world placement.
    ///
    /// The prefab itself is recorded as the first dependency.
    pub fn compile(
        &self,
        placement: Transform,
        source: &dyn PrefabSource,
    ) -> (NodeTemplateContainer, PrefabDependencies) {
        let (container, version) = self.snapshot();
        let mut compiler = NodeCompiler::new(source);
        compiler.record_dependency(&self.path, version);
        compiler.compile_container(&container, placement);
        compiler.finish()
    }
}

/// Resolves prefab references during flattening.
pub trait PrefabSource {
    /// `None` when the prefab cannot be resolved; callers treat that as empty.
    fn resolve(&self, prefab: &PrefabRef) -> Option<Arc<Prefab>>;
}

/// In-memory prefab set, keyed by path.
#[derive(Debug, Default)]
pub struct PrefabLibrary {
    prefabs: HashMap<String, Arc<Prefab>>,
}

impl PrefabLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, container: NodeTemplateContainer) -> Arc<Prefab> {
        let path = path.into();
        let prefab = Arc::new(Prefab::new(path.clone(), container));
        self.prefabs.insert(path, prefab.clone());
        prefab
    }

    pub fn remove(&mut self, path: &str) -> Option<Arc<Prefab>> {
        self.prefabs.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&Arc<Prefab>> {
        self.prefabs.get(path)
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }
}

impl PrefabSource for PrefabLibrary {
    fn resolve(&self, prefab: &PrefabRef) -> Option<Arc<Prefab>> {
        self.prefabs.get(&prefab.path).cloned()
    }
}

/// Prefab source backed by a depot. Loaded prefabs and failures are cached.
pub struct DepotPrefabSource {
    depot: Arc<dyn Depot>,
    cache: Mutex<HashMap<String, Option<Arc<Prefab>>>>,
}

impl DepotPrefabSource {
    pub fn new(depot: Arc<dyn Depot>) -> Self {
        Self {
            depot,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop cached entries so the next resolve reloads from the depot.
    pub fn invalidate(&self) {
        self.cache.lock().clear();
    }

    /// Persist a prefab's current content and version.
    pub fn save(&self, prefab: &Prefab) -> Result<(), worldspace_persist::DepotError> {
        save_resource(self.depot.as_ref(), &prefab.to_data(), prefab.path())
    }
}

impl PrefabSource for DepotPrefabSource {
    fn resolve(&self, prefab: &PrefabRef) -> Option<Arc<Prefab>> {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.get(&prefab.path) {
            return entry.clone();
        }
        let loaded = match load_resource::<PrefabData>(self.depot.as_ref(), &prefab.path) {
            Ok(data) => Some(Arc::new(Prefab::from_data(prefab.path.clone(), data))),
            Err(err) => {
                tracing::warn!(prefab = %prefab.path, %err, "failed to load prefab");
                None
            }
        };
        cache.insert(prefab.path.clone(), loaded.clone());
        loaded
    }
}

/// Prefabs consulted by a compile, with the lowest data version seen for each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefabDependencies {
    versions: BTreeMap<String, u64>,
}

impl PrefabDependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &str, version: u64) {
        self.versions
            .entry(path.to_string())
            .and_modify(|v| *v = (*v).min(version))
            .or_insert(version);
    }

    pub fn merge_from(&mut self, other: &PrefabDependencies) {
        for (path, version) in &other.versions {
            self.record(path, *version);
        }
    }

    pub fn version_of(&self, path: &str) -> Option<u64> {
        self.versions.get(path).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.versions.iter().map(|(p, v)| (p.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// True when any recorded prefab has changed or disappeared since the compile.
    pub fn is_stale(&self, source: &dyn PrefabSource) -> bool {
        self.versions.iter().any(|(path, seen)| {
            match source.resolve(&PrefabRef::new(path.clone())) {
                Some(prefab) => prefab.version() > *seen,
                None => true,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeTemplate;
    use worldspace_persist::MemoryDepot;

    fn single(name: &str) -> NodeTemplateContainer {
        let mut c = NodeTemplateContainer::new();
        c.add_node(NodeTemplate::new(name), None);
        c
    }

    #[test]
    fn replace_bumps_version_and_snapshot_is_stable() {
        let prefab = Prefab::new("p/a.prefab", single("a"));
        let (before, v1) = prefab.snapshot();
        let v2 = prefab.replace_content(single("b"));
        assert_eq!(v2, v1 + 1);
        assert_eq!(before.nodes()[0].template.name, "a");
        assert_eq!(prefab.snapshot().0.nodes()[0].template.name, "b");
    }

    #[test]
    fn dependencies_keep_min_version_and_detect_staleness() {
        let mut lib = PrefabLibrary::new();
        let prefab = lib.insert("p/a.prefab", single("a"));

        let mut deps = PrefabDependencies::new();
        deps.record("p/a.prefab", 3);
        deps.record("p/a.prefab", 1);
        assert_eq!(deps.version_of("p/a.prefab"), Some(1));
        assert!(!deps.is_stale(&lib));

        prefab.replace_content(single("a2"));
        assert!(deps.is_stale(&lib));

        let mut gone = PrefabDependencies::new();
        gone.record("p/missing.prefab", 1);
        assert!(gone.is_stale(&lib));
    }

    #[test]
    fn depot_source_loads_and_caches_failures() {
        let depot: Arc<dyn Depot> = Arc::new(MemoryDepot::new());
        let data = PrefabData {
            container: single("rock"),
            version: 7,
        };
        save_resource(depot.as_ref(), &data, "p/rock.prefab").unwrap();

        let source = DepotPrefabSource::new(depot.clone());
        let first = source.resolve(&PrefabRef::new("p/rock.prefab")).unwrap();
        let second = source.resolve(&PrefabRef::new("p/rock.prefab")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.version(), 7);

        assert!(source.resolve(&PrefabRef::new("p/later.prefab")).is_none());
        save_resource(depot.as_ref(), &data, "p/later.prefab").unwrap();
        assert!(source.resolve(&PrefabRef::new("p/later.prefab")).is_none());
        source.invalidate();
        assert!(source.resolve(&PrefabRef::new("p/later.prefab")).is_some());
    }

    #[test]
    fn save_round_trips_version() {
        let depot: Arc<dyn Depot> = Arc::new(MemoryDepot::new());
        let source = DepotPrefabSource::new(depot);
        let prefab = Prefab::new("p/tree.prefab", single("tree"));
        prefab.replace_content(single("tree"));
        source.save(&prefab).unwrap();
        let loaded = source.resolve(&PrefabRef::new("p/tree.prefab")).unwrap();
        assert_eq!(loaded.version(), 2);
        assert!(loaded.has_content());
    }
}
