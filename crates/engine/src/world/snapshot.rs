use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{GameConfig, PlayerConfig};

use super::area::AreaRecord;
use super::atomic_io::write_text_atomic;
use super::cache::{CacheEntry, CacheError, CachedEnemy, CachedItem};
use super::entities::Player;
use super::geometry::{GridCoord, Vec2};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read/write game state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("game state file {path} is malformed at {at}: {message}")]
    Parse {
        path: PathBuf,
        at: String,
        message: String,
    },
    #[error("failed to encode game state json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("game state was saved for a different world geometry")]
    WorldMismatch,
    #[error("game state names area {coord}, which is outside the registered grid")]
    UnregisteredArea { coord: GridCoord },
    #[error("game state lists area {coord} more than once")]
    DuplicateArea { coord: GridCoord },
    #[error("game state {section} is invalid: {message}")]
    Invalid {
        section: &'static str,
        message: String,
    },
    #[error(transparent)]
    Area(#[from] CacheError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub direction_radians: f32,
    pub health: u32,
    pub max_health: u32,
    pub health_items: u32,
    pub ammo_items: u32,
}

impl PlayerSnapshot {
    pub fn capture(player: &Player) -> Self {
        let position = player.position();
        Self {
            x: position.x,
            y: position.y,
            direction_radians: player.direction_radians(),
            health: player.health(),
            max_health: player.max_health(),
            health_items: player.health_items(),
            ammo_items: player.ammo_items(),
        }
    }

    /// Size, speed and colour come from `config`; everything else from the
    /// snapshot.
    pub fn restore(&self, config: &PlayerConfig) -> Result<Player, SnapshotError> {
        let position = Vec2::new(self.x, self.y);
        if !position.is_finite() || !self.direction_radians.is_finite() {
            return Err(invalid("player", "position and direction must be finite"));
        }
        if self.max_health == 0 {
            return Err(invalid("player", "max_health is 0"));
        }
        Ok(Player::restored(
            config,
            position,
            self.direction_radians,
            self.health,
            self.max_health,
            self.health_items,
            self.ammo_items,
        ))
    }
}

/// One area with known content. Unloaded areas carry what the cache held
/// for them when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaSnapshot {
    pub grid_x: i32,
    pub grid_y: i32,
    pub active: bool,
    pub loaded: bool,
    #[serde(default)]
    pub last_accessed: f64,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub enemies: Vec<CachedEnemy>,
    #[serde(default)]
    pub items: Vec<CachedItem>,
}

impl AreaSnapshot {
    pub(crate) fn capture(area: &AreaRecord, content: CacheEntry) -> Self {
        Self {
            grid_x: area.coord().gx,
            grid_y: area.coord().gy,
            active: area.is_active(),
            loaded: area.is_loaded(),
            last_accessed: area.last_accessed(),
            access_count: area.access_count(),
            enemies: content.enemies,
            items: content.items,
        }
    }

    pub fn coord(&self) -> GridCoord {
        GridCoord::new(self.grid_x, self.grid_y)
    }

    pub fn entry(&self) -> CacheEntry {
        CacheEntry {
            enemies: self.enemies.clone(),
            items: self.items.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub world_fingerprint_sha256_hex: String,
    pub sim_time_seconds: f64,
    pub areas: Vec<AreaSnapshot>,
}

/// Summary numbers for people reading a save file; ignored on restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub active_areas_count: usize,
    pub total_enemies: usize,
    pub total_items: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
    pub round: u32,
    pub elapsed_seconds: f32,
}

/// Everything needed to put a running game back where it was: player,
/// session progress and every area's entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub metadata: SnapshotMetadata,
    pub session: SessionProgress,
    pub player: PlayerSnapshot,
    pub world: WorldSnapshot,
    /// Tuning the game was running with when saved. Restoring keeps the
    /// running game's tuning; only the world geometry has to match.
    pub config: GameConfig,
}

impl GameStateSnapshot {
    pub fn new(
        session: SessionProgress,
        player: PlayerSnapshot,
        world: WorldSnapshot,
        config: GameConfig,
    ) -> Self {
        let metadata = SnapshotMetadata {
            active_areas_count: world.areas.iter().filter(|area| area.active).count(),
            total_enemies: world.areas.iter().map(|area| area.enemies.len()).sum(),
            total_items: world.areas.iter().map(|area| area.items.len()).sum(),
        };
        Self {
            metadata,
            session,
            player,
            world,
            config,
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), SnapshotError> {
        let text = serde_json::to_string_pretty(self).map_err(SnapshotError::Encode)?;
        write_text_atomic(path, &text).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_from_path(path: &Path) -> Result<Self, SnapshotError> {
        let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut deserializer = serde_json::Deserializer::from_str(&raw);
        serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
            SnapshotError::Parse {
                path: path.to_path_buf(),
                at: error.path().to_string(),
                message: error.inner().to_string(),
            }
        })
    }

    /// Checks the parts a restore cannot validate on its own.
    pub fn validate_progress(&self) -> Result<(), SnapshotError> {
        let elapsed = self.session.elapsed_seconds;
        if !elapsed.is_finite() || elapsed < 0.0 {
            return Err(invalid("session", "elapsed_seconds must be a non-negative number"));
        }
        if self.session.round == 0 {
            return Err(invalid("session", "round must be at least 1"));
        }
        Ok(())
    }
}

pub(crate) fn invalid(section: &'static str, message: impl Into<String>) -> SnapshotError {
    SnapshotError::Invalid {
        section,
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use crate::world::ItemKind;

    use super::*;

    fn sample_world() -> WorldSnapshot {
        WorldSnapshot {
            world_fingerprint_sha256_hex: "abc".to_string(),
            sim_time_seconds: 12.5,
            areas: vec![
                AreaSnapshot {
                    grid_x: 1,
                    grid_y: 1,
                    active: true,
                    loaded: true,
                    last_accessed: 12.0,
                    access_count: 3,
                    enemies: vec![CachedEnemy {
                        x: 610.0,
                        y: 590.0,
                        health: 20,
                        max_health: 50,
                    }],
                    items: vec![CachedItem {
                        x: 450.0,
                        y: 450.0,
                        kind: ItemKind::Ammo,
                        symbol: "⚡".to_string(),
                    }],
                },
                AreaSnapshot {
                    grid_x: 0,
                    grid_y: 0,
                    active: false,
                    loaded: false,
                    last_accessed: 2.0,
                    access_count: 1,
                    enemies: Vec::new(),
                    items: Vec::new(),
                },
            ],
        }
    }

    fn sample_player() -> PlayerSnapshot {
        PlayerSnapshot {
            x: 600.0,
            y: 600.0,
            direction_radians: 1.5,
            health: 70,
            max_health: 100,
            health_items: 2,
            ammo_items: 1,
        }
    }

    #[test]
    fn metadata_summarises_the_world() {
        let snapshot = GameStateSnapshot::new(
            SessionProgress {
                round: 1,
                elapsed_seconds: 12.5,
            },
            sample_player(),
            sample_world(),
            GameConfig::default(),
        );
        assert_eq!(
            snapshot.metadata,
            SnapshotMetadata {
                active_areas_count: 1,
                total_enemies: 1,
                total_items: 1,
            }
        );
    }

    #[test]
    fn save_then_load_reads_back_the_same_state() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("saves").join("game_save.json");
        let snapshot = GameStateSnapshot::new(
            SessionProgress {
                round: 2,
                elapsed_seconds: 30.0,
            },
            sample_player(),
            sample_world(),
            GameConfig::default(),
        );

        snapshot.save_to_path(&path).expect("save");
        let loaded = GameStateSnapshot::load_from_path(&path).expect("load");
        assert_eq!(loaded, snapshot);

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(value["world"]["areas"][0]["grid_x"], json!(1));
        assert_eq!(value["world"]["areas"][0]["items"][0]["type"], json!("ammo"));
        assert_eq!(value["player"]["health_items"], json!(2));
    }

    #[test]
    fn malformed_file_reports_the_offending_path() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("broken.json");
        let mut value = serde_json::to_value(GameStateSnapshot::new(
            SessionProgress {
                round: 1,
                elapsed_seconds: 0.0,
            },
            sample_player(),
            sample_world(),
            GameConfig::default(),
        ))
        .expect("value");
        value["player"]["health"] = json!("lots");
        fs::write(&path, value.to_string()).expect("write");

        match GameStateSnapshot::load_from_path(&path) {
            Err(SnapshotError::Parse { at, .. }) => assert_eq!(at, "player.health"),
            other => panic!("expected parse error, got {other:?}"),
        }
        assert!(matches!(
            GameStateSnapshot::load_from_path(&temp.path().join("missing.json")),
            Err(SnapshotError::Io { .. })
        ));
    }

    #[test]
    fn player_restore_keeps_vitals_inventory_and_facing() {
        let config = GameConfig::default();
        let player = sample_player().restore(&config.player).expect("player");

        assert_eq!(player.position(), Vec2::new(600.0, 600.0));
        assert_eq!(player.health(), 70);
        assert_eq!(player.health_items(), 2);
        assert_eq!(player.ammo_items(), 1);
        assert_eq!(PlayerSnapshot::capture(&player), sample_player());
    }

    #[test]
    fn player_restore_rejects_impossible_values() {
        let config = GameConfig::default();
        let mut broken = sample_player();
        broken.max_health = 0;
        assert!(broken.restore(&config.player).is_err());

        let mut broken = sample_player();
        broken.x = f32::NAN;
        assert!(broken.restore(&config.player).is_err());

        let mut overhealed = sample_player();
        overhealed.health = 500;
        let player = overhealed.restore(&config.player).expect("clamped");
        assert_eq!(player.health(), 100);
    }

    #[test]
    fn progress_must_be_sane() {
        let mut snapshot = GameStateSnapshot::new(
            SessionProgress {
                round: 1,
                elapsed_seconds: 5.0,
            },
            sample_player(),
            sample_world(),
            GameConfig::default(),
        );
        snapshot.validate_progress().expect("valid");

        snapshot.session.round = 0;
        assert!(snapshot.validate_progress().is_err());
        snapshot.session.round = 1;
        snapshot.session.elapsed_seconds = -1.0;
        assert!(snapshot.validate_progress().is_err());
    }
}
