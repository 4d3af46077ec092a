use serde::{Deserialize, Serialize};

use crate::config::{EnemyConfig, ItemConfig, PlayerConfig, Rgb};

use super::geometry::{Aabb, Vec2};

/// Health an item carries; items are collected once and never damaged.
const ITEM_HEALTH: u32 = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub position: Vec2,
    pub size: f32,
    pub color: Rgb,
    pub health: u32,
    pub max_health: u32,
}

impl Body {
    pub fn bounds(&self) -> Aabb {
        Aabb::centered(self.position, self.size)
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.health = self.health.saturating_sub(amount);
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health == 0 {
            return 0.0;
        }
        (self.health as f32 / self.max_health as f32).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickContext {
    pub dt_seconds: f32,
    pub now_seconds: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retain {
    Keep,
    Remove,
}

/// Anything an area simulates each tick on behalf of the player.
pub trait SimulatedObject {
    fn advance(&mut self, player: &mut Player, ctx: TickContext) -> Retain;
    fn drawable(&self) -> Drawable<'_>;
}

/// Advances every object and drops the ones that asked to be removed.
/// Returns how many were dropped.
pub(crate) fn advance_all<T: SimulatedObject>(
    objects: &mut Vec<T>,
    player: &mut Player,
    ctx: TickContext,
) -> usize {
    let before = objects.len();
    objects.retain_mut(|object| object.advance(player, ctx) == Retain::Keep);
    before - objects.len()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawableKind<'a> {
    Enemy,
    Item { kind: ItemKind, symbol: &'a str },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawable<'a> {
    pub position: Vec2,
    pub size: f32,
    pub color: Rgb,
    pub health_fraction: f32,
    pub kind: DrawableKind<'a>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    body: Body,
    speed: f32,
    direction_radians: f32,
    health_items: u32,
    ammo_items: u32,
}

impl Player {
    pub fn new(position: Vec2, config: &PlayerConfig) -> Self {
        Self {
            body: Body {
                position,
                size: config.size,
                color: config.color,
                health: config.max_health,
                max_health: config.max_health,
            },
            speed: config.speed,
            direction_radians: 0.0,
            health_items: 0,
            ammo_items: 0,
        }
    }

    /// Player rebuilt from saved state; health is clamped to `max_health`.
    pub(crate) fn restored(
        config: &PlayerConfig,
        position: Vec2,
        direction_radians: f32,
        health: u32,
        max_health: u32,
        health_items: u32,
        ammo_items: u32,
    ) -> Self {
        let mut player = Self::new(position, config);
        player.body.max_health = max_health;
        player.body.health = health.min(max_health);
        player.direction_radians = direction_radians;
        player.health_items = health_items;
        player.ammo_items = ammo_items;
        player
    }

    pub fn position(&self) -> Vec2 {
        self.body.position
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.body.position = position;
    }

    pub fn bounds(&self) -> Aabb {
        self.body.bounds()
    }

    pub fn health(&self) -> u32 {
        self.body.health
    }

    pub fn max_health(&self) -> u32 {
        self.body.max_health
    }

    pub fn is_alive(&self) -> bool {
        self.body.is_alive()
    }

    pub fn direction_radians(&self) -> f32 {
        self.direction_radians
    }

    pub fn health_items(&self) -> u32 {
        self.health_items
    }

    pub fn ammo_items(&self) -> u32 {
        self.ammo_items
    }

    /// `dx`/`dy` is the input direction, typically in `[-1, 1]`.
    pub fn move_by(&mut self, dx: f32, dy: f32, dt_seconds: f32) {
        if dx != 0.0 || dy != 0.0 {
            self.direction_radians = dy.atan2(dx);
        }
        self.body.position.x += dx * self.speed * dt_seconds;
        self.body.position.y += dy * self.speed * dt_seconds;
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.body.take_damage(amount);
    }

    pub fn heal(&mut self, amount: u32) {
        self.body.health = self
            .body
            .health
            .saturating_add(amount)
            .min(self.body.max_health);
    }

    pub fn pick_up(&mut self, kind: ItemKind) {
        match kind {
            ItemKind::Health => self.health_items = self.health_items.saturating_add(1),
            ItemKind::Ammo => self.ammo_items = self.ammo_items.saturating_add(1),
        }
    }

    pub fn use_health_item(&mut self, heal_amount: u32) -> bool {
        if self.health_items == 0 {
            return false;
        }
        self.heal(heal_amount);
        self.health_items -= 1;
        true
    }

    pub(crate) fn consume_ammo_item(&mut self) -> bool {
        if self.ammo_items == 0 {
            return false;
        }
        self.ammo_items -= 1;
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    body: Body,
    speed: f32,
    damage: u32,
    damage_interval_seconds: f32,
    last_damage_at: f64,
}

impl Enemy {
    pub fn new(position: Vec2, config: &EnemyConfig) -> Self {
        Self {
            body: Body {
                position,
                size: config.size,
                color: config.color,
                health: config.health,
                max_health: config.health,
            },
            speed: config.speed,
            damage: config.damage,
            damage_interval_seconds: config.damage_interval,
            last_damage_at: 0.0,
        }
    }

    /// Rebuilds an enemy from persisted state; stats other than health come
    /// from the current config.
    pub fn restored(position: Vec2, health: u32, max_health: u32, config: &EnemyConfig) -> Self {
        let mut enemy = Self::new(position, config);
        enemy.body.health = health;
        enemy.body.max_health = max_health;
        enemy
    }

    pub fn position(&self) -> Vec2 {
        self.body.position
    }

    pub fn health(&self) -> u32 {
        self.body.health
    }

    pub fn max_health(&self) -> u32 {
        self.body.max_health
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.body.take_damage(amount);
    }

    /// Chases the player and deals contact damage. Returns whether the enemy
    /// is still alive.
    pub fn update(&mut self, player: &mut Player, dt_seconds: f32, now_seconds: f64) -> bool {
        let target = player.position();
        let dx = target.x - self.body.position.x;
        let dy = target.y - self.body.position.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance > 0.0 {
            let step = self.speed * dt_seconds;
            self.body.position.x += dx / distance * step;
            self.body.position.y += dy / distance * step;
        }

        if self.body.bounds().intersects(&player.bounds())
            && now_seconds - self.last_damage_at >= f64::from(self.damage_interval_seconds)
        {
            player.take_damage(self.damage);
            self.last_damage_at = now_seconds;
        }

        self.body.is_alive()
    }
}

impl SimulatedObject for Enemy {
    fn advance(&mut self, player: &mut Player, ctx: TickContext) -> Retain {
        if self.update(player, ctx.dt_seconds, ctx.now_seconds) {
            Retain::Keep
        } else {
            Retain::Remove
        }
    }

    fn drawable(&self) -> Drawable<'_> {
        Drawable {
            position: self.body.position,
            size: self.body.size,
            color: self.body.color,
            health_fraction: self.body.health_fraction(),
            kind: DrawableKind::Enemy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Health,
    Ammo,
}

impl ItemKind {
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Ammo => "ammo",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    body: Body,
    kind: ItemKind,
    symbol: String,
}

impl Item {
    pub fn new(position: Vec2, kind: ItemKind, config: &ItemConfig) -> Self {
        Self {
            body: Body {
                position,
                size: config.size,
                color: config.color,
                health: ITEM_HEALTH,
                max_health: ITEM_HEALTH,
            },
            kind,
            symbol: config.symbol.clone(),
        }
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    pub fn position(&self) -> Vec2 {
        self.body.position
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Hands the item to the player on contact. Returns whether it was taken.
    pub fn collect(&self, player: &mut Player) -> bool {
        if !self.body.bounds().intersects(&player.bounds()) {
            return false;
        }
        player.pick_up(self.kind);
        true
    }
}

impl SimulatedObject for Item {
    fn advance(&mut self, player: &mut Player, _ctx: TickContext) -> Retain {
        if self.collect(player) {
            Retain::Remove
        } else {
            Retain::Keep
        }
    }

    fn drawable(&self) -> Drawable<'_> {
        Drawable {
            position: self.body.position,
            size: self.body.size,
            color: self.body.color,
            health_fraction: self.body.health_fraction(),
            kind: DrawableKind::Item {
                kind: self.kind,
                symbol: &self.symbol,
            },
        }
    }
}
