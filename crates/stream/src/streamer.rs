use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use worldspace_common::Aabb;
use worldspace_kernel::Scene;
use worldspace_persist::{Depot, load_resource};

use crate::job::JobRunner;
use crate::sector::{CompiledWorld, WorldSector, WorldSectorDesc};

/// Public load state of one sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorState {
    Idle,
    Loading,
    Loaded,
}

/// Result of polling an in-flight load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No load in flight.
    NotLoading,
    Pending,
    /// Entities are now attached.
    Loaded,
    /// The job finished without data; the sector is idle again.
    Failed,
}

/// Shared between a streamer and its background job. Written once by the job.
#[derive(Debug)]
struct LoadingState {
    key: String,
    cancel: AtomicBool,
    finished: AtomicBool,
    result: Mutex<Option<Arc<WorldSector>>>,
}

impl LoadingState {
    fn new(key: String) -> Self {
        Self {
            key,
            cancel: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            result: Mutex::new(None),
        }
    }

    fn finish(&self, result: Option<Arc<WorldSector>>) {
        *self.result.lock() = result;
        self.finished.store(true, Ordering::Release);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

/// Runtime load/unload state machine for one sector of an attached world.
#[derive(Debug)]
pub struct WorldSectorStreamer {
    name: String,
    streaming_box: Aabb,
    always_loaded: bool,
    key: String,
    unsaved: Option<Arc<WorldSector>>,
    loaded: Option<Arc<WorldSector>>,
    loading: Option<Arc<LoadingState>>,
}

impl WorldSectorStreamer {
    pub fn new(world: &CompiledWorld, desc: &WorldSectorDesc) -> Self {
        Self {
            name: desc.name.clone(),
            streaming_box: desc.streaming_box,
            always_loaded: desc.always_loaded,
            key: world.sector_path(desc),
            unsaved: desc.unsaved_payload.clone(),
            loaded: None,
            loading: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn streaming_box(&self) -> &Aabb {
        &self.streaming_box
    }

    pub fn is_always_loaded(&self) -> bool {
        self.always_loaded
    }

    /// Depot key of the sector resource.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> SectorState {
        if self.loaded.is_some() {
            SectorState::Loaded
        } else if self.loading.is_some() {
            SectorState::Loading
        } else {
            SectorState::Idle
        }
    }

    pub fn loaded_entity_count(&self) -> usize {
        self.loaded.as_ref().map_or(0, |s| s.len())
    }

    /// Any observer inside the streaming box.
    pub fn is_visible(&self, observers: &[glam::Vec3]) -> bool {
        observers.iter().any(|o| self.streaming_box.contains_point(*o))
    }

    /// `Idle -> Loading`. Ignored unless idle.
    ///
    /// Sectors with an unsaved payload finish immediately without a job.
    pub fn request_load(&mut self, depot: &Arc<dyn Depot>, runner: &dyn JobRunner) {
        if self.state() != SectorState::Idle {
            return;
        }
        let state = Arc::new(LoadingState::new(self.key.clone()));
        self.loading = Some(state.clone());
        tracing::debug!(sector = %self.name, key = %self.key, "sector load requested");

        if let Some(payload) = &self.unsaved {
            state.finish(Some(payload.clone()));
            return;
        }

        let depot = depot.clone();
        runner.run(Box::new(move || {
            if state.is_canceled() {
                state.finish(None);
                return;
            }
            let result = match load_resource::<WorldSector>(depot.as_ref(), &state.key) {
                Ok(sector) => Some(Arc::new(sector)),
                Err(err) => {
                    tracing::warn!(key = %state.key, %err, "failed to load sector");
                    None
                }
            };
            state.finish(if state.is_canceled() { None } else { result });
        }));
    }

    /// `Loading -> Loaded` once the job has finished with data, attaching
    /// every entity to `scene`. A finished job without data returns the
    /// sector to idle.
    pub fn update_loading_state(&mut self, scene: &mut Scene) -> LoadOutcome {
        let Some(state) = &self.loading else {
            return LoadOutcome::NotLoading;
        };
        if !state.is_finished() {
            return LoadOutcome::Pending;
        }
        let result = state.result.lock().take();
        self.loading = None;

        match result {
            Some(sector) => {
                for entity in &sector.entities {
                    entity.attach_to_scene(scene);
                }
                tracing::debug!(sector = %self.name, entities = sector.len(), "sector loaded");
                self.loaded = Some(sector);
                LoadOutcome::Loaded
            }
            None => {
                tracing::warn!(sector = %self.name, "sector load failed");
                LoadOutcome::Failed
            }
        }
    }

    /// Load synchronously and attach. Used for always-loaded sectors.
    pub fn load_now(&mut self, depot: &dyn Depot, scene: &mut Scene) -> bool {
        if self.loaded.is_some() {
            return true;
        }
        let sector = match &self.unsaved {
            Some(payload) => payload.clone(),
            None => match load_resource::<WorldSector>(depot, &self.key) {
                Ok(sector) => Arc::new(sector),
                Err(err) => {
                    tracing::warn!(sector = %self.name, %err, "failed to load persistent sector");
                    return false;
                }
            },
        };
        for entity in &sector.entities {
            entity.attach_to_scene(scene);
        }
        self.loaded = Some(sector);
        true
    }

    /// Back to `Idle` from any state. Loaded entities are detached; an
    /// in-flight job is canceled and its result will be discarded.
    pub fn request_unload(&mut self, scene: &mut Scene) {
        if let Some(state) = self.loading.take() {
            state.cancel.store(true, Ordering::Release);
            tracing::debug!(sector = %self.name, "sector load canceled");
        }
        if let Some(sector) = self.loaded.take() {
            for entity in &sector.entities {
                entity.detach_from_scene(scene);
            }
            tracing::debug!(sector = %self.name, entities = sector.len(), "sector unloaded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{InlineJobRunner, Job};
    use glam::Vec3;
    use worldspace_ecs::Entity;
    use worldspace_persist::{MemoryDepot, save_resource};
    use worldspace_template::{PrefabDependencies, WorldParameters};

    /// Holds jobs until told to run them.
    #[derive(Default)]
    struct ManualRunner {
        jobs: Mutex<Vec<Job>>,
    }

    impl ManualRunner {
        fn run_all(&self) {
            let jobs = std::mem::take(&mut *self.jobs.lock());
            for job in jobs {
                job();
            }
        }
    }

    impl JobRunner for ManualRunner {
        fn run(&self, job: Job) {
            self.jobs.lock().push(job);
        }
    }

    fn setup() -> (Arc<dyn Depot>, WorldSectorStreamer) {
        let depot: Arc<dyn Depot> = Arc::new(MemoryDepot::new());
        let sector = WorldSector {
            entities: vec![Entity::new("Prop"), Entity::new("Prop")],
        };
        save_resource(depot.as_ref(), &sector, "w/cooked/L0_0_0.sector").unwrap();
        let desc = WorldSectorDesc::new(
            "L0_0_0",
            false,
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(512.0)),
        );
        let mut world = CompiledWorld::new(
            "w",
            WorldParameters::default(),
            vec![desc.clone()],
            PrefabDependencies::new(),
        );
        world.set_cooked_dir("w/cooked");
        let streamer = WorldSectorStreamer::new(&world, &desc);
        (depot, streamer)
    }

    #[test]
    fn idle_loading_loaded_idle() {
        let (depot, mut streamer) = setup();
        let runner = ManualRunner::default();
        let mut scene = Scene::new();

        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::NotLoading);
        streamer.request_load(&depot, &runner);
        assert_eq!(streamer.state(), SectorState::Loading);
        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::Pending);

        runner.run_all();
        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::Loaded);
        assert_eq!(streamer.state(), SectorState::Loaded);
        assert_eq!(scene.entity_count(), 2);

        streamer.request_unload(&mut scene);
        assert_eq!(streamer.state(), SectorState::Idle);
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn unload_while_loading_discards_result() {
        let (depot, mut streamer) = setup();
        let runner = ManualRunner::default();
        let mut scene = Scene::new();

        streamer.request_load(&depot, &runner);
        streamer.request_unload(&mut scene);
        assert_eq!(streamer.state(), SectorState::Idle);

        runner.run_all();
        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::NotLoading);
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn unload_is_safe_from_every_state() {
        let (depot, mut streamer) = setup();
        let mut scene = Scene::new();
        streamer.request_unload(&mut scene);
        assert_eq!(streamer.state(), SectorState::Idle);

        streamer.request_load(&depot, &InlineJobRunner);
        streamer.request_unload(&mut scene);
        assert_eq!(streamer.state(), SectorState::Idle);

        streamer.request_load(&depot, &InlineJobRunner);
        streamer.update_loading_state(&mut scene);
        streamer.request_unload(&mut scene);
        streamer.request_unload(&mut scene);
        assert_eq!(streamer.state(), SectorState::Idle);
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn missing_resource_returns_to_idle() {
        let depot: Arc<dyn Depot> = Arc::new(MemoryDepot::new());
        let desc = WorldSectorDesc::new("gone", false, Aabb::UNBOUNDED);
        let world = CompiledWorld::new("w", WorldParameters::default(), vec![], PrefabDependencies::new());
        let mut streamer = WorldSectorStreamer::new(&world, &desc);
        let mut scene = Scene::new();

        streamer.request_load(&depot, &InlineJobRunner);
        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::Failed);
        assert_eq!(streamer.state(), SectorState::Idle);
    }

    #[test]
    fn unsaved_payload_skips_depot() {
        let depot: Arc<dyn Depot> = Arc::new(MemoryDepot::new());
        let mut desc = WorldSectorDesc::new("mem", false, Aabb::UNBOUNDED);
        desc.unsaved_payload = Some(Arc::new(WorldSector {
            entities: vec![Entity::new("Prop")],
        }));
        let world = CompiledWorld::new("w", WorldParameters::default(), vec![], PrefabDependencies::new());
        let mut streamer = WorldSectorStreamer::new(&world, &desc);
        let mut scene = Scene::new();

        streamer.request_load(&depot, &ManualRunner::default());
        assert_eq!(streamer.update_loading_state(&mut scene), LoadOutcome::Loaded);
        assert_eq!(scene.entity_count(), 1);
    }
}
