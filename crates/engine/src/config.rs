use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::world::{ItemKind, ENEMY_SPAWN_MARGIN, ITEM_SPAWN_MARGIN};

pub type Rgb = [u8; 3];

pub const DEFAULT_MAX_LOADED_AREAS: usize = 6;

/// Largest accepted `world.grid_size`; keeps cell indices well inside `i32`.
pub const MAX_GRID_SIZE: u32 = 1024;

/// Scenario name that selects [`GameConfig::random_scenario`] instead of a
/// preset.
pub const RANDOM_SCENARIO: &str = "random";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config at {path}: {message}")]
    Parse { path: String, message: String },
    #[error("config key {key} is required")]
    MissingKey { key: &'static str },
    #[error("config value {key} is invalid: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("unknown scenario preset '{0}'")]
    UnknownScenario(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub game: SessionConfig,
    pub player: PlayerConfig,
    #[serde(alias = "enemy")]
    pub enemies: EnemyConfig,
    pub items: ItemsConfig,
    pub world: WorldConfig,
    pub spawn: SpawnConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub survival_time: f32,
    #[serde(alias = "fps")]
    pub tick_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    pub size: f32,
    pub speed: f32,
    pub max_health: u32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyConfig {
    pub size: f32,
    pub speed: f32,
    pub health: u32,
    pub damage: u32,
    pub damage_interval: f32,
    pub color: Rgb,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemsConfig {
    pub health: ItemConfig,
    pub ammo: ItemConfig,
}

impl ItemsConfig {
    pub fn for_kind(&self, kind: ItemKind) -> &ItemConfig {
        match kind {
            ItemKind::Health => &self.health,
            ItemKind::Ammo => &self.ammo,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemConfig {
    pub size: f32,
    pub color: Rgb,
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heal_amount: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    pub grid_size: u32,
    pub area_size: f32,
    pub activation_distance: f32,
    pub max_active_areas: usize,
    #[serde(default = "default_max_loaded_areas")]
    pub max_loaded_areas: usize,
}

fn default_max_loaded_areas() -> usize {
    DEFAULT_MAX_LOADED_AREAS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnConfig {
    pub enemies_per_area: u32,
    pub health_items_per_area: u32,
    pub ammo_items_per_area: u32,
}

/// Ammo tuning resolved from the item block; only valid after validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmmoBlast {
    pub damage: u32,
    pub radius: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            game: SessionConfig {
                survival_time: 60.0,
                tick_rate: 60,
            },
            player: PlayerConfig {
                size: 20.0,
                speed: 200.0,
                max_health: 100,
                color: [0, 255, 0],
            },
            enemies: EnemyConfig {
                size: 15.0,
                speed: 100.0,
                health: 50,
                damage: 10,
                damage_interval: 1.0,
                color: [255, 0, 0],
            },
            items: ItemsConfig {
                health: ItemConfig {
                    size: 10.0,
                    color: [255, 255, 0],
                    symbol: "➕".to_string(),
                    heal_amount: Some(30),
                    damage: None,
                    radius: None,
                },
                ammo: ItemConfig {
                    size: 10.0,
                    color: [0, 255, 255],
                    symbol: "⚡".to_string(),
                    heal_amount: None,
                    damage: Some(25),
                    radius: Some(100.0),
                },
            },
            world: WorldConfig {
                grid_size: 3,
                area_size: 400.0,
                activation_distance: 50.0,
                max_active_areas: 4,
                max_loaded_areas: DEFAULT_MAX_LOADED_AREAS,
            },
            spawn: SpawnConfig {
                enemies_per_area: 2,
                health_items_per_area: 1,
                ammo_items_per_area: 1,
            },
        }
    }
}

impl GameConfig {
    /// Parses and validates a config tree. Errors carry the JSON path of the
    /// offending key.
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let config: GameConfig =
            serde_path_to_error::deserialize(value).map_err(|error| ConfigError::Parse {
                path: error.path().to_string(),
                message: error.inner().to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config: GameConfig = serde_path_to_error::deserialize(&mut deserializer).map_err(
            |error| ConfigError::Parse {
                path: error.path().to_string(),
                message: error.inner().to_string(),
            },
        )?;
        config.validate()?;
        Ok(config)
    }

    /// Default config with the named preset merged over it.
    pub fn for_scenario(preset: ScenarioPreset) -> Result<Self, ConfigError> {
        let mut value =
            serde_json::to_value(GameConfig::default()).map_err(|error| ConfigError::Parse {
                path: ".".to_string(),
                message: error.to_string(),
            })?;
        merge_json(&mut value, preset.overlay());
        Self::from_value(value)
    }

    /// Default config with a randomised tuning overlay. The same seed always
    /// yields the same config; without one a seed is drawn and logged.
    pub fn random_scenario(seed: Option<u64>) -> Result<Self, ConfigError> {
        let seed = seed.unwrap_or_else(rand::random);
        info!(seed, "random_scenario_rolled");
        let mut value =
            serde_json::to_value(GameConfig::default()).map_err(|error| ConfigError::Parse {
                path: ".".to_string(),
                message: error.to_string(),
            })?;
        merge_json(&mut value, random_overlay(&mut StdRng::seed_from_u64(seed)));
        Self::from_value(value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if world.grid_size == 0 || world.grid_size > MAX_GRID_SIZE {
            return Err(invalid(
                "world.grid_size",
                format!("must be between 1 and {MAX_GRID_SIZE}"),
            ));
        }
        if !world.area_size.is_finite() || world.area_size <= 0.0 {
            return Err(invalid("world.area_size", "must be a positive number"));
        }
        let min_area_size = 2.0 * ENEMY_SPAWN_MARGIN.max(ITEM_SPAWN_MARGIN);
        if world.area_size <= min_area_size {
            return Err(invalid(
                "world.area_size",
                format!("must exceed {min_area_size} to fit the spawn margins"),
            ));
        }
        if !world.activation_distance.is_finite() || world.activation_distance < 0.0 {
            return Err(invalid(
                "world.activation_distance",
                "must be a non-negative number",
            ));
        }
        if world.max_active_areas == 0 {
            return Err(invalid("world.max_active_areas", "must be at least 1"));
        }
        if world.max_loaded_areas == 0 {
            return Err(invalid("world.max_loaded_areas", "must be at least 1"));
        }
        if !self.enemies.damage_interval.is_finite() || self.enemies.damage_interval < 0.0 {
            return Err(invalid(
                "enemies.damage_interval",
                "must be a non-negative number",
            ));
        }
        if self.enemies.health == 0 {
            return Err(invalid("enemies.health", "must be at least 1"));
        }
        if self.player.max_health == 0 {
            return Err(invalid("player.max_health", "must be at least 1"));
        }
        if self.items.health.heal_amount.is_none() {
            return Err(ConfigError::MissingKey {
                key: "items.health.heal_amount",
            });
        }
        if self.items.ammo.damage.is_none() {
            return Err(ConfigError::MissingKey {
                key: "items.ammo.damage",
            });
        }
        match self.items.ammo.radius {
            None => {
                return Err(ConfigError::MissingKey {
                    key: "items.ammo.radius",
                })
            }
            Some(radius) if !radius.is_finite() || radius < 0.0 => {
                return Err(invalid("items.ammo.radius", "must be a non-negative number"));
            }
            Some(_) => {}
        }
        if self.game.tick_rate == 0 {
            return Err(invalid("game.tick_rate", "must be at least 1"));
        }
        Ok(())
    }

    pub fn heal_amount(&self) -> u32 {
        self.items.health.heal_amount.unwrap_or(0)
    }

    pub fn ammo_blast(&self) -> AmmoBlast {
        AmmoBlast {
            damage: self.items.ammo.damage.unwrap_or(0),
            radius: self.items.ammo.radius.unwrap_or(0.0),
        }
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        message: message.into(),
    }
}

/// Recursively overlays `overlay` onto `base`; objects merge key by key,
/// everything else replaces.
pub fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(base_value) => merge_json(base_value, overlay_value),
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioPreset {
    Tutorial,
    Survival,
    Nightmare,
    Arena,
    Performance,
}

impl ScenarioPreset {
    pub const ALL: [ScenarioPreset; 5] = [
        Self::Tutorial,
        Self::Survival,
        Self::Nightmare,
        Self::Arena,
        Self::Performance,
    ];

    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| ConfigError::UnknownScenario(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tutorial => "tutorial",
            Self::Survival => "survival",
            Self::Nightmare => "nightmare",
            Self::Arena => "arena",
            Self::Performance => "performance",
        }
    }

    fn overlay(self) -> Value {
        match self {
            Self::Tutorial => serde_json::json!({
                "world": {"area_size": 300.0, "activation_distance": 40.0, "max_active_areas": 2},
                "spawn": {"enemies_per_area": 2, "health_items_per_area": 3, "ammo_items_per_area": 2},
                "enemies": {"speed": 60.0, "damage": 5, "health": 30},
                "player": {"speed": 150.0, "max_health": 120},
                "game": {"survival_time": 30.0}
            }),
            Self::Survival => serde_json::json!({
                "world": {"area_size": 500.0, "activation_distance": 80.0, "max_active_areas": 4},
                "spawn": {"enemies_per_area": 8, "health_items_per_area": 1, "ammo_items_per_area": 1},
                "enemies": {"speed": 120.0, "damage": 15, "health": 60},
                "player": {"speed": 200.0, "max_health": 100},
                "game": {"survival_time": 90.0}
            }),
            Self::Nightmare => serde_json::json!({
                "world": {"area_size": 600.0, "activation_distance": 120.0, "max_active_areas": 6},
                "spawn": {"enemies_per_area": 25, "health_items_per_area": 1, "ammo_items_per_area": 1},
                "enemies": {"speed": 150.0, "damage": 25, "health": 40},
                "player": {"speed": 250.0, "max_health": 80},
                "items": {"ammo": {"damage": 50, "radius": 150.0}},
                "game": {"survival_time": 120.0}
            }),
            Self::Arena => serde_json::json!({
                "world": {"area_size": 200.0, "activation_distance": 30.0, "max_active_areas": 1},
                "spawn": {"enemies_per_area": 15, "health_items_per_area": 5, "ammo_items_per_area": 5},
                "enemies": {"speed": 100.0, "damage": 20, "health": 50},
                "player": {"speed": 180.0, "max_health": 150},
                "game": {"survival_time": 45.0}
            }),
            Self::Performance => serde_json::json!({
                "world": {"area_size": 1000.0, "activation_distance": 200.0, "max_active_areas": 9,
                          "max_loaded_areas": 12},
                "spawn": {"enemies_per_area": 200, "health_items_per_area": 5, "ammo_items_per_area": 5},
                "enemies": {"speed": 80.0, "damage": 5, "health": 20},
                "player": {"speed": 400.0, "max_health": 200},
                "items": {"ammo": {"damage": 100, "radius": 200.0}},
                "game": {"survival_time": 30.0, "tick_rate": 30}
            }),
        }
    }
}

fn random_overlay(rng: &mut impl Rng) -> Value {
    const AREA_SIZES: [f32; 4] = [300.0, 400.0, 500.0, 600.0];
    serde_json::json!({
        "world": {
            "area_size": AREA_SIZES[rng.gen_range(0..AREA_SIZES.len())],
            "activation_distance": rng.gen_range(40..=120) as f32,
            "max_active_areas": rng.gen_range(2..=6)
        },
        "spawn": {
            "enemies_per_area": rng.gen_range(3..=20),
            "health_items_per_area": rng.gen_range(1..=4),
            "ammo_items_per_area": rng.gen_range(1..=3)
        },
        "enemies": {
            "speed": rng.gen_range(80..=180) as f32,
            "damage": rng.gen_range(8..=30),
            "health": rng.gen_range(30..=80)
        },
        "player": {
            "speed": rng.gen_range(150..=250) as f32,
            "max_health": rng.gen_range(80..=150)
        },
        "game": {"survival_time": rng.gen_range(30..=180) as f32}
    })
}
