use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::{EnemyConfig, GameConfig, ItemsConfig, SpawnConfig};

use super::area::{AreaContent, AreaRecord};
use super::entities::{Enemy, Item, ItemKind};
use super::geometry::Vec2;

/// Enemies never spawn closer than this to an area edge.
pub const ENEMY_SPAWN_MARGIN: f32 = 20.0;
/// Items never spawn closer than this to an area edge.
pub const ITEM_SPAWN_MARGIN: f32 = 15.0;

/// Produces fresh content for an area that has no cached snapshot.
pub trait ContentGenerator {
    fn generate(&mut self, area: &AreaRecord) -> AreaContent;
}

/// Spawns the configured number of enemies and items at uniformly random
/// positions inside the area, inset by the spawn margins. Spawns may overlap.
#[derive(Debug)]
pub struct RandomContentGenerator {
    rng: StdRng,
    spawn: SpawnConfig,
    enemies: EnemyConfig,
    items: ItemsConfig,
}

impl RandomContentGenerator {
    pub fn from_entropy(config: &GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn seeded(config: &GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &GameConfig, rng: StdRng) -> Self {
        Self {
            rng,
            spawn: config.spawn,
            enemies: config.enemies.clone(),
            items: config.items.clone(),
        }
    }

    fn sample_position(&mut self, area: &AreaRecord, margin: f32) -> Vec2 {
        let origin = area.origin();
        let size = area.area_size();
        Vec2 {
            x: self
                .rng
                .gen_range(origin.x + margin..=origin.x + size - margin),
            y: self
                .rng
                .gen_range(origin.y + margin..=origin.y + size - margin),
        }
    }

    fn spawn_items(&mut self, area: &AreaRecord, kind: ItemKind, count: u32, out: &mut Vec<Item>) {
        for _ in 0..count {
            let position = self.sample_position(area, ITEM_SPAWN_MARGIN);
            out.push(Item::new(position, kind, self.items.for_kind(kind)));
        }
    }
}

impl ContentGenerator for RandomContentGenerator {
    fn generate(&mut self, area: &AreaRecord) -> AreaContent {
        let mut enemies = Vec::with_capacity(self.spawn.enemies_per_area as usize);
        for _ in 0..self.spawn.enemies_per_area {
            let position = self.sample_position(area, ENEMY_SPAWN_MARGIN);
            enemies.push(Enemy::new(position, &self.enemies));
        }

        let item_count = self.spawn.health_items_per_area + self.spawn.ammo_items_per_area;
        let mut items = Vec::with_capacity(item_count as usize);
        self.spawn_items(
            area,
            ItemKind::Health,
            self.spawn.health_items_per_area,
            &mut items,
        );
        self.spawn_items(
            area,
            ItemKind::Ammo,
            self.spawn.ammo_items_per_area,
            &mut items,
        );

        debug!(
            coord = %area.coord(),
            enemy_count = enemies.len(),
            item_count = items.len(),
            "area_content_generated"
        );
        AreaContent { enemies, items }
    }
}
