use survival_engine::config::{AmmoBlast, GameConfig};
use survival_engine::world::{DynamicAreaManager, Player, Vec2};

const THREAT_RADIUS: f32 = 120.0;
const ITEM_SEEK_RADIUS: f32 = 220.0;
const WAYPOINT_ARRIVAL: f32 = 12.0;
const LOW_HEALTH_FRACTION: f32 = 0.5;
/// Detonate only once the nearest enemy is well inside the blast.
const DETONATE_RADIUS_FRACTION: f32 = 0.6;

/// One tick worth of player input.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct Intent {
    pub(crate) dx: f32,
    pub(crate) dy: f32,
    pub(crate) use_health_item: bool,
    pub(crate) detonate_ammo: bool,
}

/// Scripted stand-in for keyboard input: patrols the grid, grabs nearby
/// items, backs away from enemies and spends consumables when it pays off.
#[derive(Debug, Clone)]
pub(crate) struct Autopilot {
    waypoints: Vec<Vec2>,
    next_waypoint: usize,
}

impl Autopilot {
    pub(crate) fn for_world(config: &GameConfig) -> Self {
        let area_size = config.world.area_size;
        let world_size = config.world.grid_size as f32 * area_size;
        let near = area_size / 2.0;
        let far = world_size - area_size / 2.0;
        Self {
            waypoints: vec![
                Vec2::new(near, near),
                Vec2::new(far, near),
                Vec2::new(far, far),
                Vec2::new(near, far),
            ],
            next_waypoint: 0,
        }
    }

    pub(crate) fn plan(
        &mut self,
        player: &Player,
        manager: &DynamicAreaManager,
        blast: AmmoBlast,
    ) -> Intent {
        let position = player.position();
        let nearest_enemy = manager
            .active_areas()
            .flat_map(|area| area.enemies())
            .map(|enemy| enemy.position())
            .min_by(|a, b| a.distance(position).total_cmp(&b.distance(position)));
        let nearest_item = manager
            .active_areas()
            .flat_map(|area| area.items())
            .map(|item| item.position())
            .min_by(|a, b| a.distance(position).total_cmp(&b.distance(position)));

        let mut intent = Intent {
            use_health_item: player.health_items() > 0
                && player.health() < player.max_health()
                && (player.health() as f32) < player.max_health() as f32 * LOW_HEALTH_FRACTION,
            ..Intent::default()
        };

        if let Some(enemy) = nearest_enemy {
            let distance = enemy.distance(position);
            intent.detonate_ammo = player.ammo_items() > 0
                && distance <= blast.radius * DETONATE_RADIUS_FRACTION;
            if distance <= THREAT_RADIUS {
                (intent.dx, intent.dy) = direction(enemy, position);
                return intent;
            }
        }

        if let Some(item) = nearest_item.filter(|item| item.distance(position) <= ITEM_SEEK_RADIUS)
        {
            (intent.dx, intent.dy) = direction(position, item);
            return intent;
        }

        let mut target = self.waypoints[self.next_waypoint];
        if target.distance(position) <= WAYPOINT_ARRIVAL {
            self.next_waypoint = (self.next_waypoint + 1) % self.waypoints.len();
            target = self.waypoints[self.next_waypoint];
        }
        (intent.dx, intent.dy) = direction(position, target);
        intent
    }
}

/// Unit vector from `from` toward `to`, zero when they coincide.
fn direction(from: Vec2, to: Vec2) -> (f32, f32) {
    let distance = from.distance(to);
    if distance <= f32::EPSILON {
        return (0.0, 0.0);
    }
    ((to.x - from.x) / distance, (to.y - from.y) / distance)
}
