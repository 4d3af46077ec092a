use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{GameConfig, WorldConfig};

use super::area::{AreaContent, AreaRecord};
use super::atomic_io::write_text_atomic;
use super::entities::{Enemy, Item, ItemKind};
use super::geometry::{GridCoord, Vec2};

const ENTRY_EXTENSION: &str = "json";
const WORLD_MANIFEST_FILE: &str = "world.manifest.json";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read/write area cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("area cache file {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
    #[error("cached area {coord} holds invalid data: {message}")]
    InvalidEntry { coord: GridCoord, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEnemy {
    pub x: f32,
    pub y: f32,
    pub health: u32,
    pub max_health: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedItem {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub symbol: String,
}

/// Persisted snapshot of one area's entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(default)]
    pub enemies: Vec<CachedEnemy>,
    #[serde(default)]
    pub items: Vec<CachedItem>,
}

impl CacheEntry {
    pub fn capture(area: &AreaRecord) -> Self {
        Self {
            enemies: area
                .enemies()
                .iter()
                .map(|enemy| CachedEnemy {
                    x: enemy.position().x,
                    y: enemy.position().y,
                    health: enemy.health(),
                    max_health: enemy.max_health(),
                })
                .collect(),
            items: area
                .items()
                .iter()
                .map(|item| CachedItem {
                    x: item.position().x,
                    y: item.position().y,
                    kind: item.kind(),
                    symbol: item.symbol().to_string(),
                })
                .collect(),
        }
    }

    /// Rebuilds live entities. Either every record converts or nothing does.
    pub fn into_content(
        self,
        coord: GridCoord,
        config: &GameConfig,
    ) -> Result<AreaContent, CacheError> {
        let mut enemies = Vec::with_capacity(self.enemies.len());
        for (idx, cached) in self.enemies.into_iter().enumerate() {
            let position = Vec2::new(cached.x, cached.y);
            if !position.is_finite() {
                return Err(invalid_entry(coord, format!("enemies[{idx}] position")));
            }
            if cached.max_health == 0 {
                return Err(invalid_entry(coord, format!("enemies[{idx}] max_health is 0")));
            }
            enemies.push(Enemy::restored(
                position,
                cached.health,
                cached.max_health,
                &config.enemies,
            ));
        }

        let mut items = Vec::with_capacity(self.items.len());
        for (idx, cached) in self.items.into_iter().enumerate() {
            let position = Vec2::new(cached.x, cached.y);
            if !position.is_finite() {
                return Err(invalid_entry(coord, format!("items[{idx}] position")));
            }
            let item_config = config.items.for_kind(cached.kind);
            items.push(Item::new(position, cached.kind, item_config).with_symbol(cached.symbol));
        }

        Ok(AreaContent { enemies, items })
    }
}

fn invalid_entry(coord: GridCoord, message: String) -> CacheError {
    CacheError::InvalidEntry { coord, message }
}

/// Durable per-area snapshot store keyed by grid coordinate.
pub trait AreaCache {
    /// Stores `entry`, replacing any previous entry for `coord`.
    fn save(&mut self, coord: GridCoord, entry: &CacheEntry) -> Result<(), CacheError>;
    /// `Ok(None)` when nothing is stored for `coord`.
    fn load(&mut self, coord: GridCoord) -> Result<Option<CacheEntry>, CacheError>;
    /// Removes every stored entry and returns how many were removed.
    fn clear(&mut self) -> Result<usize, CacheError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct WorldManifest {
    world_fingerprint_sha256_hex: String,
}

/// One pretty-printed JSON file per area under a directory, named after
/// [`GridCoord::cache_key`].
#[derive(Debug, Clone)]
pub struct FsAreaCache {
    dir: PathBuf,
}

impl FsAreaCache {
    /// Opens (creating if needed) the cache directory. Entries written for a
    /// different world geometry are discarded.
    pub fn open(dir: impl Into<PathBuf>, world: &WorldConfig) -> Result<Self, CacheError> {
        let mut cache = Self { dir: dir.into() };
        fs::create_dir_all(&cache.dir).map_err(|source| CacheError::Io {
            path: cache.dir.clone(),
            source,
        })?;

        let expected = WorldManifest {
            world_fingerprint_sha256_hex: world_fingerprint(world),
        };
        let manifest_path = cache.dir.join(WORLD_MANIFEST_FILE);
        match read_manifest(&manifest_path) {
            Some(manifest) if manifest == expected => {}
            previous => {
                let removed = cache.clear()?;
                if previous.is_some() || removed > 0 {
                    warn!(
                        dir = %cache.dir.display(),
                        removed,
                        "area_cache_invalidated_world_changed"
                    );
                }
                let text = serde_json::to_string_pretty(&expected).map_err(|error| {
                    CacheError::InvalidFormat {
                        path: manifest_path.clone(),
                        message: format!("failed to encode manifest json: {error}"),
                    }
                })?;
                write_text_atomic(&manifest_path, &text).map_err(|source| CacheError::Io {
                    path: manifest_path.clone(),
                    source,
                })?;
            }
        }

        info!(dir = %cache.dir.display(), "area_cache_opened");
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, coord: GridCoord) -> PathBuf {
        self.dir
            .join(format!("{}.{ENTRY_EXTENSION}", coord.cache_key()))
    }

    /// Coordinates with a stored entry, sorted.
    pub fn stored_coords(&self) -> Result<Vec<GridCoord>, CacheError> {
        let mut coords = self
            .stored_entries()?
            .into_iter()
            .map(|(coord, _)| coord)
            .collect::<Vec<_>>();
        coords.sort();
        Ok(coords)
    }

    fn stored_entries(&self) -> Result<Vec<(GridCoord, PathBuf)>, CacheError> {
        let entries = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut stored = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let coord = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(ENTRY_EXTENSION))
                .and_then(|stem| stem.strip_suffix('.'))
                .and_then(GridCoord::from_cache_key);
            if let Some(coord) = coord {
                stored.push((coord, path));
            }
        }
        Ok(stored)
    }
}

impl AreaCache for FsAreaCache {
    fn save(&mut self, coord: GridCoord, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.entry_path(coord);
        let text =
            serde_json::to_string_pretty(entry).map_err(|error| CacheError::InvalidFormat {
                path: path.clone(),
                message: format!("failed to encode area json: {error}"),
            })?;
        write_text_atomic(&path, &text).map_err(|source| CacheError::Io { path, source })
    }

    fn load(&mut self, coord: GridCoord) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(coord);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        serde_json::from_str::<CacheEntry>(&raw)
            .map(Some)
            .map_err(|error| CacheError::InvalidFormat {
                path,
                message: error.to_string(),
            })
    }

    fn clear(&mut self) -> Result<usize, CacheError> {
        let mut removed = 0usize;
        for (_, path) in self.stored_entries()? {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }
        Ok(removed)
    }
}

/// Process-local store; nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryAreaCache {
    entries: HashMap<GridCoord, CacheEntry>,
}

impl MemoryAreaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AreaCache for MemoryAreaCache {
    fn save(&mut self, coord: GridCoord, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(coord, entry.clone());
        Ok(())
    }

    fn load(&mut self, coord: GridCoord) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(&coord).cloned())
    }

    fn clear(&mut self) -> Result<usize, CacheError> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }
}

fn read_manifest(path: &Path) -> Option<WorldManifest> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Hash of the geometry that determines where cached entities may lie.
pub fn world_fingerprint(world: &WorldConfig) -> String {
    let mut hasher = Sha256::new();
    hasher.update(world.grid_size.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(world.area_size.to_bits().to_le_bytes());
    to_hex_lower(&hasher.finalize())
}

fn to_hex_lower(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
