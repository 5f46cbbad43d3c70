use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use worldspace_common::Aabb;

use crate::config::GridConfig;

/// Identity of a grid sector: level plus XY cell (Z is up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectorCoord {
    pub level: u32,
    pub x: i32,
    pub y: i32,
}

impl SectorCoord {
    pub fn new(level: u32, x: i32, y: i32) -> Self {
        Self { level, x, y }
    }
}

impl fmt::Display for SectorCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}_{}_{}", self.level, self.x, self.y)
    }
}

/// Multi-resolution streaming grid.
///
/// Level 0 has the top cell size; every following level halves it. Nodes are
/// bucketed into the level whose cell size first fits their streaming
/// distance, then into the cell nearest their XY position.
#[derive(Debug, Clone)]
pub struct SectorGrid {
    config: GridConfig,
}

impl SectorGrid {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn cell_size(&self, level: u32) -> f32 {
        self.config.top_cell_size / (1u64 << level.min(32)) as f32
    }

    /// Override if positive, otherwise the required distance, floored at the
    /// configured minimum.
    pub fn effective_distance(&self, override_distance: f32, required_distance: f32) -> f32 {
        let distance = if override_distance > 0.0 {
            override_distance
        } else {
            required_distance
        };
        distance.max(self.config.min_streaming_distance)
    }

    /// Grid level in `[0, max_levels]`; smaller distances never map to a
    /// coarser level.
    pub fn grid_level_for_streaming_distance(&self, distance: f32) -> u32 {
        let mut level = 0;
        let mut cell = self.config.top_cell_size;
        while level < self.config.max_levels && cell > distance {
            cell *= 0.5;
            level += 1;
        }
        level
    }

    pub fn sector_coord(&self, level: u32, position: Vec3) -> SectorCoord {
        let cell = self.cell_size(level);
        SectorCoord {
            level,
            x: (position.x / cell).round() as i32,
            y: (position.y / cell).round() as i32,
        }
    }

    /// The cell footprint, extended vertically.
    pub fn streaming_box(&self, coord: SectorCoord) -> Aabb {
        let cell = self.cell_size(coord.level);
        let center = Vec3::new(coord.x as f32 * cell, coord.y as f32 * cell, 0.0);
        Aabb::from_center_half_extents(
            center,
            Vec3::new(cell * 0.5, cell * 0.5, self.config.vertical_half_extent),
        )
    }
}

impl Default for SectorGrid {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_selection() {
        let grid = SectorGrid::default();
        assert_eq!(grid.grid_level_for_streaming_distance(2000.0), 0);
        assert_eq!(grid.grid_level_for_streaming_distance(1024.0), 0);
        assert_eq!(grid.grid_level_for_streaming_distance(600.0), 1);
        assert_eq!(grid.grid_level_for_streaming_distance(75.0), 4);
        assert_eq!(grid.grid_level_for_streaming_distance(5.0), 4);
        assert_eq!(grid.grid_level_for_streaming_distance(0.0), 4);
    }

    #[test]
    fn level_is_monotonic_and_bounded() {
        let grid = SectorGrid::default();
        let mut last = grid.grid_level_for_streaming_distance(0.0);
        for step in 1..5000 {
            let level = grid.grid_level_for_streaming_distance(step as f32 * 0.5);
            assert!(level <= last);
            assert!(level <= grid.config().max_levels);
            last = level;
        }
    }

    #[test]
    fn effective_distance_floor_and_override() {
        let grid = SectorGrid::default();
        assert_eq!(grid.effective_distance(0.0, 0.0), 5.0);
        assert_eq!(grid.effective_distance(0.0, 75.0), 75.0);
        assert_eq!(grid.effective_distance(300.0, 75.0), 300.0);
        assert_eq!(grid.effective_distance(1.0, 75.0), 5.0);
    }

    #[test]
    fn cell_rounds_to_nearest() {
        let grid = SectorGrid::default();
        assert_eq!(grid.sector_coord(0, Vec3::new(2000.0, 0.0, 50.0)), SectorCoord::new(0, 2, 0));
        assert_eq!(grid.sector_coord(0, Vec3::new(500.0, -600.0, 0.0)), SectorCoord::new(0, 0, -1));
        assert_eq!(grid.sector_coord(4, Vec3::new(100.0, 0.0, 0.0)), SectorCoord::new(4, 2, 0));
    }

    #[test]
    fn streaming_box_contains_its_nodes() {
        let grid = SectorGrid::default();
        let pos = Vec3::new(2000.0, 10.0, 300.0);
        let coord = grid.sector_coord(0, pos);
        let bounds = grid.streaming_box(coord);
        assert!(bounds.contains_point(pos));
        assert_eq!(bounds.center(), Vec3::new(2048.0, 0.0, 0.0));
        assert!(!bounds.contains_point(Vec3::ZERO));
        assert_eq!(coord.to_string(), "L0_2_0");
    }
}
