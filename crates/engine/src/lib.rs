use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod app;
pub mod config;
pub mod world;

pub use app::{
    run_headless, AppError, LoopCommand, LoopConfig, LoopMetricsSnapshot, LoopSummary,
    Simulation, SimulationStatus, StopReason, SLOW_FRAME_ENV_VAR,
};
pub use config::{ConfigError, GameConfig, ScenarioPreset};
pub use world::{
    AreaCache, AreaStats, CacheError, DynamicAreaManager, FsAreaCache, GridCoord,
    MemoryAreaCache, Player, RandomContentGenerator, Vec2,
};

pub const ROOT_ENV_VAR: &str = "SURVIVAL_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub area_cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to resolve current working directory: {0}")]
    CurrentDir(#[source] std::io::Error),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "SURVIVAL_ROOT is set but does not point to a directory: {path}\n\
Unset it to use the current directory, or point it at an existing directory."
    )]
    InvalidEnvRoot { path: PathBuf },
}

/// Resolves the data root and makes sure `cache/areas` exists under it.
pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    app_paths_under(root)
}

fn app_paths_under(root: PathBuf) -> Result<AppPaths, StartupError> {
    let cache_dir = root.join("cache");
    let area_cache_dir = cache_dir.join("areas");

    fs::create_dir_all(&area_cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: area_cache_dir.clone(),
        source,
    })?;

    Ok(AppPaths {
        root,
        cache_dir,
        area_cache_dir,
    })
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let normalized = normalize_path(&PathBuf::from(value));
            if normalized.is_dir() {
                Ok(normalized)
            } else {
                Err(StartupError::InvalidEnvRoot { path: normalized })
            }
        }
        Err(env::VarError::NotPresent) => {
            let cwd = env::current_dir().map_err(StartupError::CurrentDir)?;
            Ok(normalize_path(&cwd))
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
