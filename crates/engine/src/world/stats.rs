use super::geometry::{GridCoord, Vec2};

/// Read-only counters reported by the area manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AreaStats {
    pub loaded_areas: usize,
    pub active_areas: usize,
    pub total_areas: usize,
    /// Enemies held in memory across every loaded area.
    pub total_enemies: usize,
    /// Items held in memory across every loaded area.
    pub total_items: usize,
    pub max_loaded_areas: usize,
    pub cache_errors: CacheErrorCounters,
}

impl AreaStats {
    pub fn memory_usage_label(&self) -> String {
        format!("{}/{} areas", self.loaded_areas, self.max_loaded_areas)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheErrorCounters {
    pub read_failures: u64,
    pub write_failures: u64,
}

/// Per-area state for drawing the debug grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaOverlay {
    pub coord: GridCoord,
    pub origin: Vec2,
    pub size: f32,
    pub active: bool,
    pub loaded: bool,
}
