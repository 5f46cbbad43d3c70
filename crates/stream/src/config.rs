use serde::{Deserialize, Serialize};

/// Hierarchical streaming grid parameters used when packing sectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cell size of the coarsest level (level 0).
    pub top_cell_size: f32,
    /// Number of halvings below the top level.
    pub max_levels: u32,
    /// Streaming distances are clamped up to this floor.
    pub min_streaming_distance: f32,
    /// Half-height of every grid sector's streaming box.
    pub vertical_half_extent: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            top_cell_size: 1024.0,
            max_levels: 4,
            min_streaming_distance: 5.0,
            vertical_half_extent: 100_000.0,
        }
    }
}

/// Runtime streaming parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Ticks a sector must wait after a failed load before it is requested
    /// again. `0` retries on the next visibility check.
    pub failed_load_retry_delay: u64,
}

/// Everything the cooker needs beyond the world itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookConfig {
    pub grid: GridConfig,
    pub streaming: StreamingConfig,
    /// Output directory name, relative to the world resource.
    pub output_dir: String,
}

impl Default for CookConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            streaming: StreamingConfig::default(),
            output_dir: "cooked".to_string(),
        }
    }
}
