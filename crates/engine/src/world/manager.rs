use tracing::{debug, info, warn};

use crate::config::{ConfigError, GameConfig};

use super::area::{AreaContent, AreaRecord};
use super::cache::{world_fingerprint, AreaCache, CacheEntry, CacheError};
use super::entities::{Drawable, Player, TickContext};
use super::generator::ContentGenerator;
use super::geometry::{GridCoord, Vec2};
use super::snapshot::{invalid, AreaSnapshot, SnapshotError, WorldSnapshot};
use super::stats::{AreaOverlay, AreaStats, CacheErrorCounters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    AlreadyLoaded,
    FromCache,
    Generated,
    Unregistered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
    NotLoaded,
    Persisted,
    /// The area was unloaded but its snapshot could not be written.
    PersistFailed,
    Unregistered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// `None` when the player stood outside the registered grid and the
    /// active set was left untouched.
    pub current_area: Option<GridCoord>,
    pub enemies_removed: usize,
    pub items_collected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub persisted: usize,
    pub failed: usize,
}

/// Decides which grid areas are simulated, materialises their content from
/// the cache or the generator, and evicts stale areas over the loaded cap.
///
/// Two caps apply. At most `max_active_areas` areas are simulated per tick.
/// At most `max_loaded_areas` areas stay in memory, except that an active
/// area is never evicted; when every loaded area is active the loaded cap is
/// allowed to overflow.
///
/// Time only moves through `tick`; `load_area` takes its timestamp from the
/// caller. The manager never reads a wall clock.
pub struct DynamicAreaManager {
    config: GameConfig,
    grid_size: u32,
    areas: Vec<AreaRecord>,
    active: Vec<usize>,
    loaded: Vec<usize>,
    cache: Box<dyn AreaCache>,
    generator: Box<dyn ContentGenerator>,
    sim_time_seconds: f64,
    cache_errors: CacheErrorCounters,
}

impl DynamicAreaManager {
    pub fn new(
        config: GameConfig,
        cache: Box<dyn AreaCache>,
        generator: Box<dyn ContentGenerator>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let grid_size = config.world.grid_size;
        let area_size = config.world.area_size;
        let mut areas = Vec::with_capacity((grid_size as usize).pow(2));
        for gy in 0..grid_size as i32 {
            for gx in 0..grid_size as i32 {
                areas.push(AreaRecord::new(GridCoord::new(gx, gy), area_size));
            }
        }

        info!(
            grid_size,
            area_size,
            activation_distance = config.world.activation_distance,
            max_active_areas = config.world.max_active_areas,
            max_loaded_areas = config.world.max_loaded_areas,
            "area_manager_initialized"
        );

        Ok(Self {
            config,
            grid_size,
            areas,
            active: Vec::new(),
            loaded: Vec::new(),
            cache,
            generator,
            sim_time_seconds: 0.0,
            cache_errors: CacheErrorCounters::default(),
        })
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn sim_time_seconds(&self) -> f64 {
        self.sim_time_seconds
    }

    pub fn area(&self, coord: GridCoord) -> Option<&AreaRecord> {
        self.index_of(coord).map(|idx| &self.areas[idx])
    }

    /// Every registered area in row-major order.
    pub fn areas(&self) -> impl Iterator<Item = &AreaRecord> {
        self.areas.iter()
    }

    pub fn area_at_position(&self, position: Vec2) -> Option<&AreaRecord> {
        self.index_at_position(position).map(|idx| &self.areas[idx])
    }

    /// Active areas in activation order, current area first.
    pub fn active_coords(&self) -> Vec<GridCoord> {
        self.active.iter().map(|&idx| self.areas[idx].coord()).collect()
    }

    /// Loaded areas in load order, oldest load first.
    pub fn loaded_coords(&self) -> Vec<GridCoord> {
        self.loaded.iter().map(|&idx| self.areas[idx].coord()).collect()
    }

    pub fn active_areas(&self) -> impl Iterator<Item = &AreaRecord> {
        self.active.iter().map(|&idx| &self.areas[idx])
    }

    /// Everything the renderer should draw this frame.
    pub fn drawables(&self) -> impl Iterator<Item = Drawable<'_>> {
        self.active_areas()
            .filter(|area| area.is_loaded())
            .flat_map(|area| area.drawables())
    }

    pub fn grid_overlay(&self) -> Vec<AreaOverlay> {
        self.areas
            .iter()
            .map(|area| AreaOverlay {
                coord: area.coord(),
                origin: area.origin(),
                size: area.area_size(),
                active: area.is_active(),
                loaded: area.is_loaded(),
            })
            .collect()
    }

    /// Recomputes the active set around the player. Returns `false` and leaves
    /// the set untouched when the player is outside the registered grid.
    pub fn update_active_set(&mut self, player: &Player) -> bool {
        let Some(current) = self.index_at_position(player.position()) else {
            debug!(
                x = player.position().x,
                y = player.position().y,
                "player_outside_registered_grid"
            );
            return false;
        };

        let player_box = player.bounds();
        let activation_distance = self.config.world.activation_distance;
        let mut candidates = vec![current];
        candidates.extend(
            self.areas
                .iter()
                .enumerate()
                .filter(|(idx, area)| {
                    *idx != current
                        && player_box.gap_distance(&area.bounds()) <= activation_distance
                })
                .map(|(idx, _)| idx),
        );
        // Discovery order decides who survives the cap, not distance.
        candidates.truncate(self.config.world.max_active_areas);

        for &idx in &self.active {
            if !candidates.contains(&idx) {
                self.areas[idx].set_active(false);
            }
        }
        let entering = candidates
            .iter()
            .copied()
            .filter(|idx| !self.active.contains(idx))
            .collect::<Vec<_>>();
        for &idx in &candidates {
            self.areas[idx].set_active(true);
        }

        if !entering.is_empty() || candidates.len() != self.active.len() {
            debug!(
                current = %self.areas[current].coord(),
                active_count = candidates.len(),
                entering_count = entering.len(),
                "active_set_changed"
            );
        }
        self.active = candidates;

        let now = self.sim_time_seconds;
        for idx in entering {
            self.load_index(idx, now);
        }
        true
    }

    pub fn load_area(&mut self, coord: GridCoord, now_seconds: f64) -> LoadOutcome {
        match self.index_of(coord) {
            Some(idx) => self.load_index(idx, now_seconds),
            None => LoadOutcome::Unregistered,
        }
    }

    pub fn unload_area(&mut self, coord: GridCoord) -> UnloadOutcome {
        match self.index_of(coord) {
            Some(idx) => self.unload_index(idx),
            None => UnloadOutcome::Unregistered,
        }
    }

    /// Advances the sim clock by `dt_seconds`, refreshes the active set,
    /// makes sure every active area is loaded, then simulates active areas
    /// only. Loaded but inactive areas stay frozen.
    pub fn tick(&mut self, player: &mut Player, dt_seconds: f32) -> TickReport {
        let dt_seconds = dt_seconds.max(0.0);
        self.sim_time_seconds += f64::from(dt_seconds);
        let now = self.sim_time_seconds;

        let mut report = TickReport::default();
        if self.update_active_set(player) {
            report.current_area = self.active.first().map(|&idx| self.areas[idx].coord());
        }

        for slot in 0..self.active.len() {
            let idx = self.active[slot];
            if !self.areas[idx].is_loaded() {
                self.load_index(idx, now);
            }
        }
        // Areas that just went inactive may still hold the cap over its limit.
        self.enforce_loaded_cap();

        let ctx = TickContext {
            dt_seconds,
            now_seconds: now,
        };
        for &idx in &self.active {
            let outcome = self.areas[idx].simulate(player, ctx);
            report.enemies_removed += outcome.enemies_removed;
            report.items_collected += outcome.items_collected;
        }
        report
    }

    /// Spends one ammo item: every enemy in an active area within the blast
    /// radius of the player takes the blast damage, and the ones killed are
    /// discarded. `None` when the player holds no ammo.
    pub fn detonate_ammo(&mut self, player: &mut Player) -> Option<usize> {
        if !player.consume_ammo_item() {
            return None;
        }

        let blast = self.config.ammo_blast();
        let center = player.position();
        let mut killed = 0usize;
        for &idx in &self.active {
            let enemies = self.areas[idx].enemies_mut();
            for enemy in enemies.iter_mut() {
                if enemy.position().distance(center) <= blast.radius {
                    enemy.take_damage(blast.damage);
                }
            }
            let before = enemies.len();
            enemies.retain(|enemy| enemy.health() > 0);
            killed += before - enemies.len();
        }

        info!(killed, radius = blast.radius, "ammo_detonated");
        Some(killed)
    }

    /// Persists and unloads every loaded area and clears the active set.
    pub fn shutdown(&mut self) -> ShutdownReport {
        for idx in self.active.drain(..) {
            self.areas[idx].set_active(false);
        }

        let mut report = ShutdownReport::default();
        while let Some(&idx) = self.loaded.first() {
            match self.unload_index(idx) {
                UnloadOutcome::Persisted => report.persisted += 1,
                UnloadOutcome::PersistFailed => report.failed += 1,
                UnloadOutcome::NotLoaded | UnloadOutcome::Unregistered => {
                    self.loaded.retain(|&loaded| loaded != idx);
                }
            }
        }

        info!(
            persisted = report.persisted,
            failed = report.failed,
            "area_manager_shutdown"
        );
        report
    }

    /// Persists everything, then returns every area to its freshly registered
    /// state and rewinds the sim clock. The cache and its contents are kept,
    /// so a restarted world picks up where the persisted areas left off.
    pub fn reset_world(&mut self, generator: Box<dyn ContentGenerator>) -> ShutdownReport {
        let report = self.shutdown();
        for area in &mut self.areas {
            *area = AreaRecord::new(area.coord(), area.area_size());
        }
        self.generator = generator;
        self.sim_time_seconds = 0.0;
        info!(area_count = self.areas.len(), "area_world_reset");
        report
    }

    /// Snapshot of every area with known content. Loaded areas are read from
    /// memory and unloaded ones from the cache, so the result stands on its
    /// own. Areas never visited are left out.
    pub fn capture_state(&mut self) -> WorldSnapshot {
        let mut areas = Vec::new();
        for idx in 0..self.areas.len() {
            let content = if self.areas[idx].is_loaded() {
                Some(CacheEntry::capture(&self.areas[idx]))
            } else {
                self.read_cached(self.areas[idx].coord())
            };
            if let Some(content) = content {
                areas.push(AreaSnapshot::capture(&self.areas[idx], content));
            }
        }

        debug!(
            area_count = areas.len(),
            sim_time_seconds = self.sim_time_seconds,
            "area_world_captured"
        );
        WorldSnapshot {
            world_fingerprint_sha256_hex: world_fingerprint(&self.config.world),
            sim_time_seconds: self.sim_time_seconds,
            areas,
        }
    }

    /// Replaces the whole world with `snapshot`. The snapshot is checked in
    /// full before anything changes, so on error the manager is untouched.
    ///
    /// Areas currently in memory are dropped without being persisted. The
    /// cache is cleared and refilled with the snapshot's unloaded areas.
    pub fn restore_state(&mut self, snapshot: &WorldSnapshot) -> Result<(), SnapshotError> {
        if snapshot.world_fingerprint_sha256_hex != world_fingerprint(&self.config.world) {
            return Err(SnapshotError::WorldMismatch);
        }
        if !snapshot.sim_time_seconds.is_finite() || snapshot.sim_time_seconds < 0.0 {
            return Err(invalid(
                "world",
                "sim_time_seconds must be a non-negative number",
            ));
        }

        let mut seen = vec![false; self.areas.len()];
        let mut restored = Vec::with_capacity(snapshot.areas.len());
        for area in &snapshot.areas {
            let coord = area.coord();
            let idx = self
                .index_of(coord)
                .ok_or(SnapshotError::UnregisteredArea { coord })?;
            if std::mem::replace(&mut seen[idx], true) {
                return Err(SnapshotError::DuplicateArea { coord });
            }
            if !area.last_accessed.is_finite() {
                return Err(invalid("world", format!("area {coord} last_accessed")));
            }
            let content = area.entry().into_content(coord, &self.config)?;
            restored.push((idx, area, content));
        }

        let removed = self.cache.clear()?;
        for idx in self.active.drain(..) {
            self.areas[idx].set_active(false);
        }
        for area in &mut self.areas {
            *area = AreaRecord::new(area.coord(), area.area_size());
        }
        self.loaded.clear();
        self.sim_time_seconds = snapshot.sim_time_seconds;

        let max_active = self.config.world.max_active_areas;
        for (idx, area, content) in restored {
            self.areas[idx].restore_access(area.last_accessed, area.access_count);
            if area.loaded || area.active {
                self.areas[idx].populate(content);
                self.loaded.push(idx);
                if area.active && self.active.len() < max_active {
                    self.areas[idx].set_active(true);
                    self.active.push(idx);
                }
            } else {
                self.save_entry(area.coord(), &area.entry());
            }
        }
        self.enforce_loaded_cap();

        info!(
            area_count = snapshot.areas.len(),
            loaded_count = self.loaded.len(),
            active_count = self.active.len(),
            cache_entries_replaced = removed,
            sim_time_seconds = self.sim_time_seconds,
            "area_world_restored"
        );
        Ok(())
    }

    /// Removes every persisted snapshot. Areas currently in memory are not
    /// touched and will be written again when they unload.
    pub fn clear_cache(&mut self) -> Result<usize, CacheError> {
        let removed = self.cache.clear()?;
        info!(removed, "area_cache_cleared");
        Ok(removed)
    }

    pub fn stats(&self) -> AreaStats {
        let (total_enemies, total_items) =
            self.loaded.iter().fold((0, 0), |(enemies, items), &idx| {
                let area = &self.areas[idx];
                (enemies + area.enemies().len(), items + area.items().len())
            });

        AreaStats {
            loaded_areas: self.loaded.len(),
            active_areas: self.active.len(),
            total_areas: self.areas.len(),
            total_enemies,
            total_items,
            max_loaded_areas: self.config.world.max_loaded_areas,
            cache_errors: self.cache_errors,
        }
    }

    fn index_of(&self, coord: GridCoord) -> Option<usize> {
        let grid = self.grid_size as i32;
        if coord.gx < 0 || coord.gy < 0 || coord.gx >= grid || coord.gy >= grid {
            return None;
        }
        Some((coord.gy * grid + coord.gx) as usize)
    }

    fn index_at_position(&self, position: Vec2) -> Option<usize> {
        self.index_of(GridCoord::containing(
            position,
            self.config.world.area_size,
        ))
    }

    fn load_index(&mut self, idx: usize, now_seconds: f64) -> LoadOutcome {
        if self.areas[idx].is_loaded() {
            return LoadOutcome::AlreadyLoaded;
        }

        self.areas[idx].record_access(now_seconds);
        let (content, outcome) = match self.restore_from_cache(idx) {
            Some(content) => (content, LoadOutcome::FromCache),
            None => (
                self.generator.generate(&self.areas[idx]),
                LoadOutcome::Generated,
            ),
        };

        let area = &mut self.areas[idx];
        area.populate(content);
        self.loaded.push(idx);
        info!(
            coord = %area.coord(),
            source = ?outcome,
            enemy_count = area.enemies().len(),
            item_count = area.items().len(),
            access_count = area.access_count(),
            loaded_count = self.loaded.len(),
            "area_loaded"
        );

        if !self.enforce_loaded_cap() {
            warn!(
                loaded_count = self.loaded.len(),
                max_loaded_areas = self.config.world.max_loaded_areas,
                "loaded_cap_held_by_active_areas"
            );
        }
        outcome
    }

    fn restore_from_cache(&mut self, idx: usize) -> Option<AreaContent> {
        let coord = self.areas[idx].coord();
        let entry = self.read_cached(coord)?;
        match entry.into_content(coord, &self.config) {
            Ok(content) => Some(content),
            Err(error) => {
                self.note_read_failure(coord, &error);
                None
            }
        }
    }

    fn read_cached(&mut self, coord: GridCoord) -> Option<CacheEntry> {
        match self.cache.load(coord) {
            Ok(entry) => entry,
            Err(error) => {
                self.note_read_failure(coord, &error);
                None
            }
        }
    }

    fn note_read_failure(&mut self, coord: GridCoord, error: &CacheError) {
        self.cache_errors.read_failures = self.cache_errors.read_failures.saturating_add(1);
        warn!(
            coord = %coord,
            error = %error,
            "area_cache_read_failed"
        );
    }

    fn unload_index(&mut self, idx: usize) -> UnloadOutcome {
        if !self.areas[idx].is_loaded() {
            return UnloadOutcome::NotLoaded;
        }

        let persisted = self.persist(idx);
        self.areas[idx].release();
        self.loaded.retain(|&loaded| loaded != idx);
        debug!(
            coord = %self.areas[idx].coord(),
            persisted,
            loaded_count = self.loaded.len(),
            "area_unloaded"
        );

        if persisted {
            UnloadOutcome::Persisted
        } else {
            UnloadOutcome::PersistFailed
        }
    }

    fn persist(&mut self, idx: usize) -> bool {
        let entry = CacheEntry::capture(&self.areas[idx]);
        self.save_entry(self.areas[idx].coord(), &entry)
    }

    fn save_entry(&mut self, coord: GridCoord, entry: &CacheEntry) -> bool {
        match self.cache.save(coord, entry) {
            Ok(()) => true,
            Err(error) => {
                self.cache_errors.write_failures =
                    self.cache_errors.write_failures.saturating_add(1);
                warn!(
                    coord = %coord,
                    enemy_count = entry.enemies.len(),
                    item_count = entry.items.len(),
                    error = %error,
                    "area_cache_write_failed"
                );
                false
            }
        }
    }

    /// Evicts until the loaded set fits `max_loaded_areas`. Returns `false`
    /// when active areas alone keep it over the cap.
    fn enforce_loaded_cap(&mut self) -> bool {
        while self.loaded.len() > self.config.world.max_loaded_areas {
            if !self.evict_oldest_inactive() {
                return false;
            }
        }
        true
    }

    /// Unloads the least recently accessed loaded area that is not active.
    /// Ties go to the area loaded first.
    fn evict_oldest_inactive(&mut self) -> bool {
        let victim = self
            .loaded
            .iter()
            .copied()
            .filter(|&idx| !self.areas[idx].is_active())
            .min_by(|&a, &b| {
                self.areas[a]
                    .last_accessed()
                    .total_cmp(&self.areas[b].last_accessed())
            });

        match victim {
            Some(idx) => {
                info!(
                    coord = %self.areas[idx].coord(),
                    last_accessed = self.areas[idx].last_accessed(),
                    loaded_count = self.loaded.len(),
                    "area_evicted"
                );
                self.unload_index(idx);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use crate::world::{
        CacheEntry, CachedEnemy, Enemy, Item, ItemKind, MemoryAreaCache, RandomContentGenerator,
    };

    use super::*;

    struct CountingGenerator {
        calls: Rc<Cell<usize>>,
        config: GameConfig,
    }

    impl ContentGenerator for CountingGenerator {
        fn generate(&mut self, area: &AreaRecord) -> AreaContent {
            self.calls.set(self.calls.get() + 1);
            let center = Vec2::new(
                area.origin().x + area.area_size() / 2.0,
                area.origin().y + area.area_size() / 2.0,
            );
            AreaContent {
                enemies: vec![Enemy::new(center, &self.config.enemies)],
                items: vec![Item::new(
                    Vec2::new(area.origin().x + 30.0, area.origin().y + 30.0),
                    ItemKind::Health,
                    &self.config.items.health,
                )],
            }
        }
    }

    /// Cache whose reads always fail and whose writes always fail.
    struct BrokenCache;

    impl AreaCache for BrokenCache {
        fn save(&mut self, coord: GridCoord, _entry: &CacheEntry) -> Result<(), CacheError> {
            Err(CacheError::InvalidEntry {
                coord,
                message: "disk full".to_string(),
            })
        }

        fn load(&mut self, coord: GridCoord) -> Result<Option<CacheEntry>, CacheError> {
            Err(CacheError::InvalidEntry {
                coord,
                message: "unreadable".to_string(),
            })
        }

        fn clear(&mut self) -> Result<usize, CacheError> {
            Ok(0)
        }
    }

    /// Cache that hands back a snapshot with an invalid enemy for every area.
    struct PoisonedCache;

    impl AreaCache for PoisonedCache {
        fn save(&mut self, _coord: GridCoord, _entry: &CacheEntry) -> Result<(), CacheError> {
            Ok(())
        }

        fn load(&mut self, _coord: GridCoord) -> Result<Option<CacheEntry>, CacheError> {
            Ok(Some(CacheEntry {
                enemies: vec![
                    CachedEnemy {
                        x: 10.0,
                        y: 10.0,
                        health: 5,
                        max_health: 5,
                    },
                    CachedEnemy {
                        x: 20.0,
                        y: 20.0,
                        health: 5,
                        max_health: 0,
                    },
                ],
                items: Vec::new(),
            }))
        }

        fn clear(&mut self) -> Result<usize, CacheError> {
            Ok(0)
        }
    }

    fn manager_with(
        config: GameConfig,
        cache: Box<dyn AreaCache>,
    ) -> (DynamicAreaManager, Rc<Cell<usize>>) {
        let calls = Rc::new(Cell::new(0));
        let generator = CountingGenerator {
            calls: Rc::clone(&calls),
            config: config.clone(),
        };
        let manager =
            DynamicAreaManager::new(config, cache, Box::new(generator)).expect("manager");
        (manager, calls)
    }

    fn grid_config(grid_size: u32) -> GameConfig {
        let mut config = GameConfig::default();
        config.world.grid_size = grid_size;
        config
    }

    fn player_at(config: &GameConfig, x: f32, y: f32) -> Player {
        Player::new(Vec2::new(x, y), &config.player)
    }

    #[test]
    fn construction_registers_every_cell_unloaded_and_inactive() {
        let (manager, calls) = manager_with(grid_config(4), Box::new(MemoryAreaCache::new()));

        assert_eq!(manager.areas().count(), 16);
        assert!(manager.areas().all(|area| !area.is_loaded()
            && !area.is_active()
            && area.enemies().is_empty()
            && area.items().is_empty()));
        assert_eq!(calls.get(), 0);
        let order = manager.areas().map(AreaRecord::coord).take(5).collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                GridCoord::new(0, 0),
                GridCoord::new(1, 0),
                GridCoord::new(2, 0),
                GridCoord::new(3, 0),
                GridCoord::new(0, 1),
            ]
        );
    }

    #[test]
    fn invalid_config_fails_before_any_area_exists() {
        let mut config = GameConfig::default();
        config.items.health.heal_amount = None;
        let result = DynamicAreaManager::new(
            config.clone(),
            Box::new(MemoryAreaCache::new()),
            Box::new(RandomContentGenerator::seeded(&config, 1)),
        );
        assert!(matches!(result, Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn loading_twice_is_a_no_op() {
        let (mut manager, calls) = manager_with(grid_config(3), Box::new(MemoryAreaCache::new()));
        let coord = GridCoord::new(1, 1);

        assert_eq!(manager.load_area(coord, 1.0), LoadOutcome::Generated);
        assert_eq!(manager.load_area(coord, 2.0), LoadOutcome::AlreadyLoaded);

        let area = manager.area(coord).expect("area");
        assert_eq!(area.access_count(), 1);
        assert_eq!(area.last_accessed(), 1.0);
        assert_eq!(area.enemies().len(), 1);
        assert_eq!(calls.get(), 1);
        assert_eq!(manager.loaded_coords(), vec![coord]);
    }

    #[test]
    fn unloading_persists_and_reloading_reads_the_cache() {
        let (mut manager, calls) = manager_with(grid_config(3), Box::new(MemoryAreaCache::new()));
        let coord = GridCoord::new(0, 2);

        manager.load_area(coord, 1.0);
        let before = manager.area(coord).expect("area").enemies().to_vec();
        assert_eq!(manager.unload_area(coord), UnloadOutcome::Persisted);
        assert_eq!(manager.unload_area(coord), UnloadOutcome::NotLoaded);
        assert!(manager.area(coord).expect("area").enemies().is_empty());

        assert_eq!(manager.load_area(coord, 2.0), LoadOutcome::FromCache);
        assert_eq!(calls.get(), 1);
        let area = manager.area(coord).expect("area");
        assert_eq!(area.access_count(), 2);
        assert_eq!(area.enemies().len(), before.len());
        assert_eq!(area.enemies()[0].position(), before[0].position());
    }

    #[test]
    fn unregistered_coordinates_are_reported() {
        let (mut manager, _) = manager_with(grid_config(3), Box::new(MemoryAreaCache::new()));
        assert_eq!(
            manager.load_area(GridCoord::new(3, 0), 0.0),
            LoadOutcome::Unregistered
        );
        assert_eq!(
            manager.unload_area(GridCoord::new(-1, 0)),
            UnloadOutcome::Unregistered
        );
    }

    #[test]
    fn broken_cache_falls_back_to_generation_and_keeps_running() {
        let (mut manager, calls) = manager_with(grid_config(3), Box::new(BrokenCache));
        let config = manager.config().clone();
        let mut player = player_at(&config, 600.0, 600.0);

        manager.tick(&mut player, 0.016);
        assert_eq!(calls.get(), 1);
        assert!(manager.area(GridCoord::new(1, 1)).expect("area").is_loaded());

        assert_eq!(
            manager.unload_area(GridCoord::new(1, 1)),
            UnloadOutcome::PersistFailed
        );
        let stats = manager.stats();
        assert_eq!(stats.cache_errors.read_failures, 1);
        assert_eq!(stats.cache_errors.write_failures, 1);
        assert_eq!(stats.loaded_areas, 0);
    }

    #[test]
    fn partially_invalid_snapshot_is_discarded_whole() {
        let (mut manager, calls) = manager_with(grid_config(3), Box::new(PoisonedCache));

        assert_eq!(
            manager.load_area(GridCoord::new(2, 2), 0.5),
            LoadOutcome::Generated
        );
        assert_eq!(calls.get(), 1);
        let area = manager.area(GridCoord::new(2, 2)).expect("area");
        assert_eq!(area.enemies().len(), 1);
        assert_eq!(area.enemies()[0].max_health(), 50);
    }

    #[test]
    fn eviction_picks_oldest_inactive_area() {
        let (mut manager, _) = manager_with(grid_config(4), Box::new(MemoryAreaCache::new()));
        let coords = (0..7)
            .map(|i| GridCoord::new(i % 4, i / 4))
            .collect::<Vec<_>>();
        // Access times out of load order so the oldest is not the first loaded.
        let times = [5.0, 1.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        for (coord, time) in coords.iter().zip(times) {
            manager.load_area(*coord, time);
        }

        let loaded = manager.loaded_coords();
        assert_eq!(loaded.len(), 6);
        assert!(!loaded.contains(&coords[1]));
        assert!(loaded.contains(&coords[0]));
    }

    #[test]
    fn eviction_tie_goes_to_first_loaded() {
        let (mut manager, _) = manager_with(grid_config(4), Box::new(MemoryAreaCache::new()));
        for i in 0..7 {
            manager.load_area(GridCoord::new(i % 4, i / 4), 0.0);
        }
        assert!(!manager.loaded_coords().contains(&GridCoord::new(0, 0)));
        assert_eq!(manager.loaded_coords().len(), 6);
    }

    #[test]
    fn active_areas_are_never_evicted() {
        let mut config = grid_config(3);
        config.world.max_loaded_areas = 1;
        config.world.activation_distance = 50.0;
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));

        // Near the corner shared by four areas: all four become active.
        let mut player = player_at(&config, 790.0, 790.0);
        manager.tick(&mut player, 0.016);

        let stats = manager.stats();
        assert_eq!(stats.active_areas, 4);
        assert_eq!(stats.loaded_areas, 4);
        assert!(manager.active_areas().all(AreaRecord::is_loaded));
    }

    #[test]
    fn overflow_from_active_areas_drains_once_they_go_inactive() {
        let mut config = grid_config(3);
        config.world.max_loaded_areas = 2;
        config.world.max_active_areas = 4;
        config.world.activation_distance = 50.0;
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));

        let mut player = player_at(&config, 790.0, 790.0);
        manager.tick(&mut player, 0.016);
        assert_eq!(manager.stats().loaded_areas, 4);

        player.set_position(Vec2::new(600.0, 600.0));
        manager.tick(&mut player, 0.016);
        assert_eq!(manager.stats().active_areas, 1);
        assert_eq!(manager.stats().loaded_areas, 2);
        player.set_position(Vec2::new(200.0, 1000.0));
        for _ in 0..5 {
            manager.tick(&mut player, 0.016);
            let stats = manager.stats();
            assert!(stats.loaded_areas <= stats.active_areas.max(2));
        }
        assert!(manager.active_areas().all(AreaRecord::is_loaded));
    }

    #[test]
    fn active_set_is_truncated_in_discovery_order() {
        let mut config = grid_config(3);
        config.world.max_active_areas = 2;
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));

        let mut player = player_at(&config, 790.0, 790.0);
        manager.tick(&mut player, 0.016);

        // Current area first, then the first neighbour in row-major order.
        assert_eq!(
            manager.active_coords(),
            vec![GridCoord::new(1, 1), GridCoord::new(2, 1)]
        );
    }

    #[test]
    fn player_outside_grid_keeps_previous_active_set() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 600.0, 600.0);
        manager.tick(&mut player, 0.016);
        assert_eq!(manager.active_coords(), vec![GridCoord::new(1, 1)]);

        player.set_position(Vec2::new(-500.0, 600.0));
        let report = manager.tick(&mut player, 0.016);
        assert_eq!(report.current_area, None);
        assert_eq!(manager.active_coords(), vec![GridCoord::new(1, 1)]);
    }

    #[test]
    fn inactive_loaded_areas_are_frozen() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 600.0, 600.0);
        manager.tick(&mut player, 0.016);

        player.set_position(Vec2::new(1000.0, 600.0));
        manager.tick(&mut player, 0.016);
        let frozen = manager.area(GridCoord::new(1, 1)).expect("area");
        assert!(frozen.is_loaded());
        assert!(!frozen.is_active());
        let position = frozen.enemies()[0].position();

        manager.tick(&mut player, 0.5);
        assert_eq!(
            manager.area(GridCoord::new(1, 1)).expect("area").enemies()[0].position(),
            position
        );
    }

    #[test]
    fn tick_collects_items_in_active_areas() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        // CountingGenerator places a health item 30 units in from the origin.
        let mut player = player_at(&config, 430.0, 430.0);

        let report = manager.tick(&mut player, 0.016);
        assert_eq!(report.current_area, Some(GridCoord::new(1, 1)));
        assert_eq!(report.items_collected, 1);
        assert_eq!(player.health_items(), 1);
    }

    #[test]
    fn detonation_kills_enemies_in_radius() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 560.0, 600.0);
        manager.tick(&mut player, 0.0);

        assert_eq!(manager.detonate_ammo(&mut player), None);

        player.pick_up(ItemKind::Ammo);
        // Enemy at (600, 600) with 50 health; each blast deals 25.
        assert_eq!(manager.detonate_ammo(&mut player), Some(0));
        player.pick_up(ItemKind::Ammo);
        assert_eq!(manager.detonate_ammo(&mut player), Some(1));
        assert_eq!(manager.stats().total_enemies, 0);
        assert_eq!(player.ammo_items(), 0);
    }

    #[test]
    fn shutdown_persists_everything_and_clears_state() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 790.0, 790.0);
        manager.tick(&mut player, 0.016);
        let loaded = manager.stats().loaded_areas;
        assert!(loaded > 0);

        let report = manager.shutdown();
        assert_eq!(report.persisted, loaded);
        assert_eq!(report.failed, 0);
        let stats = manager.stats();
        assert_eq!(stats.loaded_areas, 0);
        assert_eq!(stats.active_areas, 0);
        assert!(manager.areas().all(|area| !area.is_loaded() && !area.is_active()));
    }

    #[test]
    fn reset_world_keeps_cached_progress_and_rewinds_clock() {
        let config = grid_config(3);
        let (mut manager, calls) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 600.0, 600.0);
        manager.tick(&mut player, 0.5);
        assert_eq!(calls.get(), 1);

        let fresh_calls = Rc::new(Cell::new(0));
        let report = manager.reset_world(Box::new(CountingGenerator {
            calls: Rc::clone(&fresh_calls),
            config: config.clone(),
        }));
        assert_eq!(report.persisted, 1);
        assert_eq!(manager.sim_time_seconds(), 0.0);
        assert!(manager.areas().all(|area| area.access_count() == 0));

        manager.tick(&mut player, 0.5);
        assert_eq!(fresh_calls.get(), 0);
        assert_eq!(
            manager.area(GridCoord::new(1, 1)).expect("area").access_count(),
            1
        );
    }

    #[test]
    fn captured_world_restores_into_a_fresh_manager() {
        let config = grid_config(3);
        let (mut source, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        source.load_area(GridCoord::new(0, 0), 0.25);
        source.unload_area(GridCoord::new(0, 0));
        let mut player = player_at(&config, 600.0, 600.0);
        source.tick(&mut player, 0.5);
        source.tick(&mut player, 0.5);
        let snapshot = source.capture_state();

        assert_eq!(snapshot.areas.len(), 2);
        let (mut target, calls) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        target.restore_state(&snapshot).expect("restore");

        assert_eq!(target.sim_time_seconds(), 1.0);
        assert_eq!(target.active_coords(), vec![GridCoord::new(1, 1)]);
        assert_eq!(target.loaded_coords(), vec![GridCoord::new(1, 1)]);
        let restored = target.area(GridCoord::new(1, 1)).expect("area");
        let original = source.area(GridCoord::new(1, 1)).expect("area");
        assert_eq!(restored.enemies()[0].position(), original.enemies()[0].position());
        assert_eq!(restored.last_accessed(), original.last_accessed());
        assert_eq!(
            target.area(GridCoord::new(0, 0)).expect("area").access_count(),
            1
        );

        assert_eq!(
            target.load_area(GridCoord::new(0, 0), 2.0),
            LoadOutcome::FromCache
        );
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn rejected_snapshot_leaves_the_world_untouched() {
        let config = grid_config(3);
        let (mut source, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 600.0, 600.0);
        source.tick(&mut player, 0.5);
        let good = source.capture_state();

        let (mut target, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        target.load_area(GridCoord::new(2, 2), 0.1);

        let mut bad_enemy = good.clone();
        bad_enemy.areas[0].enemies[0].max_health = 0;
        assert!(matches!(
            target.restore_state(&bad_enemy),
            Err(SnapshotError::Area(CacheError::InvalidEntry { .. }))
        ));

        let mut duplicated = good.clone();
        duplicated.areas.push(duplicated.areas[0].clone());
        assert!(matches!(
            target.restore_state(&duplicated),
            Err(SnapshotError::DuplicateArea { .. })
        ));

        let mut outside = good.clone();
        outside.areas[0].grid_x = 7;
        assert!(matches!(
            target.restore_state(&outside),
            Err(SnapshotError::UnregisteredArea { .. })
        ));

        let (mut bigger, _) = manager_with(grid_config(4), Box::new(MemoryAreaCache::new()));
        assert!(matches!(
            bigger.restore_state(&good),
            Err(SnapshotError::WorldMismatch)
        ));

        assert_eq!(target.loaded_coords(), vec![GridCoord::new(2, 2)]);
        assert_eq!(target.sim_time_seconds(), 0.0);
    }

    #[test]
    fn oversized_grid_is_rejected_before_allocation() {
        let config = grid_config(crate::config::MAX_GRID_SIZE + 1);
        let result = DynamicAreaManager::new(
            config.clone(),
            Box::new(MemoryAreaCache::new()),
            Box::new(RandomContentGenerator::seeded(&config, 1)),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                key: "world.grid_size",
                ..
            })
        ));
    }

    #[test]
    fn drawables_cover_active_areas_only() {
        let config = grid_config(3);
        let (mut manager, _) = manager_with(config.clone(), Box::new(MemoryAreaCache::new()));
        let mut player = player_at(&config, 600.0, 600.0);
        manager.tick(&mut player, 0.0);
        manager.load_area(GridCoord::new(0, 0), 0.0);

        assert_eq!(manager.stats().loaded_areas, 2);
        assert_eq!(manager.drawables().count(), 2);
        let overlay = manager.grid_overlay();
        assert_eq!(overlay.len(), 9);
        assert_eq!(overlay.iter().filter(|cell| cell.loaded).count(), 2);
        assert_eq!(overlay.iter().filter(|cell| cell.active).count(), 1);
    }
}
