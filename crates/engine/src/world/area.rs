use super::entities::{
    advance_all, Drawable, Enemy, Item, Player, SimulatedObject, TickContext,
};
use super::geometry::{Aabb, GridCoord, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaLoadState {
    Unloaded,
    Loaded,
}

/// Entities materialised for one area, as produced by a generator or a cache.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AreaContent {
    pub enemies: Vec<Enemy>,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub enemies_removed: usize,
    pub items_collected: usize,
}

/// One cell of the world grid. Records live for the whole session; only the
/// load state, the active flag and the entity lists change.
#[derive(Debug, Clone)]
pub struct AreaRecord {
    coord: GridCoord,
    origin: Vec2,
    area_size: f32,
    active: bool,
    state: AreaLoadState,
    enemies: Vec<Enemy>,
    items: Vec<Item>,
    last_accessed: f64,
    access_count: u64,
}

impl AreaRecord {
    pub fn new(coord: GridCoord, area_size: f32) -> Self {
        Self {
            coord,
            origin: coord.origin(area_size),
            area_size,
            active: false,
            state: AreaLoadState::Unloaded,
            enemies: Vec::new(),
            items: Vec::new(),
            last_accessed: 0.0,
            access_count: 0,
        }
    }

    pub fn coord(&self) -> GridCoord {
        self.coord
    }

    pub fn origin(&self) -> Vec2 {
        self.origin
    }

    pub fn area_size(&self) -> f32 {
        self.area_size
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.origin.x, self.origin.y, self.area_size, self.area_size)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_loaded(&self) -> bool {
        self.state == AreaLoadState::Loaded
    }

    pub fn load_state(&self) -> AreaLoadState {
        self.state
    }

    pub fn enemies(&self) -> &[Enemy] {
        &self.enemies
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn last_accessed(&self) -> f64 {
        self.last_accessed
    }

    pub fn access_count(&self) -> u64 {
        self.access_count
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub(crate) fn enemies_mut(&mut self) -> &mut Vec<Enemy> {
        &mut self.enemies
    }

    pub(crate) fn record_access(&mut self, now_seconds: f64) {
        self.last_accessed = now_seconds;
        self.access_count = self.access_count.saturating_add(1);
    }

    pub(crate) fn restore_access(&mut self, last_accessed: f64, access_count: u64) {
        self.last_accessed = last_accessed;
        self.access_count = access_count;
    }

    /// Replaces the entity lists wholesale and marks the area loaded.
    pub(crate) fn populate(&mut self, content: AreaContent) {
        self.enemies = content.enemies;
        self.items = content.items;
        self.state = AreaLoadState::Loaded;
    }

    /// Drops the entity lists and marks the area unloaded.
    pub(crate) fn release(&mut self) {
        self.enemies.clear();
        self.items.clear();
        self.state = AreaLoadState::Unloaded;
    }

    pub(crate) fn simulate(&mut self, player: &mut Player, ctx: TickContext) -> SimulationOutcome {
        SimulationOutcome {
            enemies_removed: advance_all(&mut self.enemies, player, ctx),
            items_collected: advance_all(&mut self.items, player, ctx),
        }
    }

    pub fn drawables(&self) -> impl Iterator<Item = Drawable<'_>> {
        self.enemies
            .iter()
            .map(|enemy| enemy.drawable())
            .chain(self.items.iter().map(|item| item.drawable()))
    }
}
