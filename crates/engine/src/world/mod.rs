mod area;
mod atomic_io;
mod cache;
mod entities;
mod generator;
mod geometry;
mod manager;
mod snapshot;
mod stats;

pub use area::{AreaContent, AreaLoadState, AreaRecord, SimulationOutcome};
pub use cache::{
    world_fingerprint, AreaCache, CacheEntry, CacheError, CachedEnemy, CachedItem, FsAreaCache,
    MemoryAreaCache,
};
pub use entities::{
    Body, Drawable, DrawableKind, Enemy, Item, ItemKind, Player, Retain, SimulatedObject,
    TickContext,
};
pub use generator::{
    ContentGenerator, RandomContentGenerator, ENEMY_SPAWN_MARGIN, ITEM_SPAWN_MARGIN,
};
pub use geometry::{Aabb, GridCoord, Vec2};
pub use manager::{DynamicAreaManager, LoadOutcome, ShutdownReport, TickReport, UnloadOutcome};
pub use snapshot::{
    AreaSnapshot, GameStateSnapshot, PlayerSnapshot, SessionProgress, SnapshotError,
    SnapshotMetadata, WorldSnapshot,
};
pub use stats::{AreaOverlay, AreaStats, CacheErrorCounters};
