use glam::Vec3;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use worldspace_kernel::{FrameDebug, Scene, SceneSystem, WorldContent};
use worldspace_persist::Depot;

use crate::config::StreamingConfig;
use crate::job::JobRunner;
use crate::sector::CompiledWorld;
use crate::streamer::{LoadOutcome, SectorState, WorldSectorStreamer};

/// Per-tick streaming statistics for instrumentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStats {
    pub sectors_requested_this_tick: usize,
    pub sectors_loaded_this_tick: usize,
    pub sectors_unloaded_this_tick: usize,
    pub sectors_failed_this_tick: usize,
    pub total_loading_sectors: usize,
    pub total_loaded_sectors: usize,
    pub frame_time: Duration,
}

struct AttachedWorld {
    content: Arc<dyn WorldContent>,
    streamers: Vec<WorldSectorStreamer>,
    loading: BTreeSet<usize>,
    loaded: BTreeSet<usize>,
    /// Sector index -> first tick a failed sector may be requested again.
    retry_at: BTreeMap<usize, u64>,
}

/// Streams sectors of every attached compiled world based on observer
/// positions.
pub struct WorldStreamingSystem {
    depot: Arc<dyn Depot>,
    runner: Arc<dyn JobRunner>,
    config: StreamingConfig,
    worlds: Vec<AttachedWorld>,
    tick: u64,
    stats: StreamStats,
}

impl WorldStreamingSystem {
    pub fn new(depot: Arc<dyn Depot>, runner: Arc<dyn JobRunner>, config: StreamingConfig) -> Self {
        Self {
            depot,
            runner,
            config,
            worlds: Vec::new(),
            tick: 0,
            stats: StreamStats::default(),
        }
    }

    /// Statistics from the last pre-tick.
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    /// State of a sector by name, searching every attached world.
    pub fn sector_state(&self, name: &str) -> Option<SectorState> {
        self.worlds
            .iter()
            .flat_map(|w| w.streamers.iter())
            .find(|s| s.name() == name)
            .map(WorldSectorStreamer::state)
    }

    pub fn loaded_sector_names(&self) -> Vec<&str> {
        self.worlds
            .iter()
            .flat_map(|w| w.loaded.iter().map(|&i| w.streamers[i].name()))
            .collect()
    }

    pub fn loading_sector_names(&self) -> Vec<&str> {
        self.worlds
            .iter()
            .flat_map(|w| w.loading.iter().map(|&i| w.streamers[i].name()))
            .collect()
    }

    fn update_world(&self, world: &mut AttachedWorld, observers: &[Vec3], scene: &mut Scene, stats: &mut StreamStats) {
        for index in 0..world.streamers.len() {
            let streamer = &mut world.streamers[index];
            if streamer.is_always_loaded() {
                // a persistent sector that failed on attach is retried until it lands
                if world.loaded.contains(&index) || world.retry_at.get(&index).is_some_and(|&at| self.tick < at) {
                    continue;
                }
                world.retry_at.remove(&index);
                if streamer.load_now(self.depot.as_ref(), scene) {
                    world.loaded.insert(index);
                    stats.sectors_loaded_this_tick += 1;
                } else {
                    stats.sectors_failed_this_tick += 1;
                    if self.config.failed_load_retry_delay > 0 {
                        world
                            .retry_at
                            .insert(index, self.tick + self.config.failed_load_retry_delay);
                    }
                }
                continue;
            }

            if !streamer.is_visible(observers) {
                if world.loaded.remove(&index) | world.loading.remove(&index) {
                    streamer.request_unload(scene);
                    stats.sectors_unloaded_this_tick += 1;
                }
                continue;
            }

            if world.loading.contains(&index) {
                match streamer.update_loading_state(scene) {
                    LoadOutcome::Loaded => {
                        world.loading.remove(&index);
                        world.loaded.insert(index);
                        stats.sectors_loaded_this_tick += 1;
                    }
                    LoadOutcome::Failed | LoadOutcome::NotLoading => {
                        world.loading.remove(&index);
                        stats.sectors_failed_this_tick += 1;
                        if self.config.failed_load_retry_delay > 0 {
                            world
                                .retry_at
                                .insert(index, self.tick + self.config.failed_load_retry_delay);
                        }
                    }
                    LoadOutcome::Pending => {}
                }
            } else if !world.loaded.contains(&index) {
                if world.retry_at.get(&index).is_some_and(|&at| self.tick < at) {
                    continue;
                }
                world.retry_at.remove(&index);
                streamer.request_load(&self.depot, self.runner.as_ref());
                world.loading.insert(index);
                stats.sectors_requested_this_tick += 1;
            }
        }
    }
}

impl SceneSystem for WorldStreamingSystem {
    fn name(&self) -> &'static str {
        "world_streaming"
    }

    fn on_pre_tick(&mut self, scene: &mut Scene) {
        let _span = tracing::info_span!("world_streaming_pre_tick").entered();
        let start = Instant::now();
        self.tick += 1;

        let mut observers = scene.observers();
        if observers.is_empty() {
            observers.push(Vec3::ZERO);
        }

        let mut stats = StreamStats::default();
        let mut worlds = std::mem::take(&mut self.worlds);
        for world in &mut worlds {
            self.update_world(world, &observers, scene, &mut stats);
            stats.total_loading_sectors += world.loading.len();
            stats.total_loaded_sectors += world.loaded.len();
        }
        self.worlds = worlds;

        stats.frame_time = start.elapsed();
        tracing::trace!(
            requested = stats.sectors_requested_this_tick,
            loaded = stats.sectors_loaded_this_tick,
            unloaded = stats.sectors_unloaded_this_tick,
            failed = stats.sectors_failed_this_tick,
            total_loaded = stats.total_loaded_sectors,
            "streaming update complete"
        );
        self.stats = stats;
    }

    fn on_world_content_attached(&mut self, scene: &mut Scene, content: &Arc<dyn WorldContent>) {
        let Some(world) = content.as_any().downcast_ref::<CompiledWorld>() else {
            return;
        };
        let mut attached = AttachedWorld {
            content: content.clone(),
            streamers: world
                .sectors
                .iter()
                .map(|desc| WorldSectorStreamer::new(world, desc))
                .collect(),
            loading: BTreeSet::new(),
            loaded: BTreeSet::new(),
            retry_at: BTreeMap::new(),
        };
        for (index, streamer) in attached.streamers.iter_mut().enumerate() {
            if streamer.is_always_loaded() && streamer.load_now(self.depot.as_ref(), scene) {
                attached.loaded.insert(index);
            }
        }
        tracing::info!(
            world = %world.name,
            sectors = attached.streamers.len(),
            persistent = attached.loaded.len(),
            "compiled world attached"
        );
        self.worlds.push(attached);
    }

    fn on_world_content_detached(&mut self, scene: &mut Scene, content: &Arc<dyn WorldContent>) {
        let Some(position) = self
            .worlds
            .iter()
            .position(|w| Arc::ptr_eq(&w.content, content))
        else {
            return;
        };
        let mut world = self.worlds.remove(position);
        for streamer in &mut world.streamers {
            streamer.request_unload(scene);
        }
        tracing::info!(world = content.content_name(), "compiled world detached");
    }

    fn on_render_frame(&self, _scene: &Scene, frame: &mut FrameDebug) {
        for world in &self.worlds {
            for streamer in &world.streamers {
                if streamer.streaming_box().is_unbounded() {
                    continue;
                }
                let (tag, color) = match streamer.state() {
                    SectorState::Idle => ("idle", [96, 96, 96]),
                    SectorState::Loading => ("loading", [255, 200, 0]),
                    SectorState::Loaded => ("loaded", [0, 200, 80]),
                };
                frame.push_box(*streamer.streaming_box(), format!("{} ({tag})", streamer.name()), color);
            }
        }
        frame.push_line(format!(
            "streaming: {} loaded, {} loading, {:?}",
            self.stats.total_loaded_sectors, self.stats.total_loading_sectors, self.stats.frame_time
        ));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
