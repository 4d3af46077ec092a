use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use survival_engine::config::{ConfigError, GameConfig, ScenarioPreset, RANDOM_SCENARIO};
use survival_engine::world::{AreaCache, FsAreaCache, MemoryAreaCache};
use survival_engine::{resolve_app_paths, AppError, LoopConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::session::{SessionOptions, SurvivalSession};

const SCENARIO_ENV_VAR: &str = "SURVIVAL_SCENARIO";
const CACHE_BACKEND_ENV_VAR: &str = "SURVIVAL_CACHE";
const SEED_ENV_VAR: &str = "SURVIVAL_SEED";
const ROUNDS_ENV_VAR: &str = "SURVIVAL_ROUNDS";
const FRESH_WORLD_ENV_VAR: &str = "SURVIVAL_FRESH_WORLD";
const LOAD_STATE_ENV_VAR: &str = "SURVIVAL_LOAD_STATE";
const SAVE_STATE_ENV_VAR: &str = "SURVIVAL_SAVE_STATE";

pub(crate) struct AppWiring {
    pub(crate) loop_config: LoopConfig,
    pub(crate) session: SurvivalSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheBackend {
    Disk,
    Memory,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Survival Startup ===");

    let scenario = env::var(SCENARIO_ENV_VAR).ok();
    let seed = parse_env_number(SEED_ENV_VAR, env::var(SEED_ENV_VAR).ok());
    let config = select_config(scenario.as_deref(), seed)?;
    info!(
        scenario = scenario.as_deref().unwrap_or("default"),
        grid_size = config.world.grid_size,
        area_size = config.world.area_size,
        max_active_areas = config.world.max_active_areas,
        max_loaded_areas = config.world.max_loaded_areas,
        "config_selected"
    );

    let cache: Box<dyn AreaCache> = match parse_cache_backend(env::var(CACHE_BACKEND_ENV_VAR).ok())
    {
        CacheBackend::Disk => {
            let paths = resolve_app_paths()?;
            info!(
                root = %paths.root.display(),
                area_cache_dir = %paths.area_cache_dir.display(),
                "startup"
            );
            Box::new(FsAreaCache::open(&paths.area_cache_dir, &config.world)?)
        }
        CacheBackend::Memory => {
            info!("area_cache_in_memory");
            Box::new(MemoryAreaCache::new())
        }
    };

    let options = SessionOptions {
        seed,
        rounds: parse_env_number(ROUNDS_ENV_VAR, env::var(ROUNDS_ENV_VAR).ok()).unwrap_or(1),
    };
    let loop_config = LoopConfig {
        target_tps: config.game.tick_rate,
        ..LoopConfig::default()
    };
    let mut session = SurvivalSession::new(config, cache, options)?;

    if env::var_os(FRESH_WORLD_ENV_VAR).is_some() {
        let removed = session.manager_mut().clear_cache()?;
        info!(removed, "fresh_world_requested");
    }
    if let Some(path) = env_path(LOAD_STATE_ENV_VAR) {
        session.load_game(&path)?;
    }
    if let Some(path) = env_path(SAVE_STATE_ENV_VAR) {
        info!(path = %path.display(), "save_on_shutdown_requested");
        session.save_on_shutdown(path);
    }

    Ok(AppWiring {
        loop_config,
        session,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

/// No scenario means the reference tuning. `random` rolls a tuning from
/// `seed`.
fn select_config(scenario: Option<&str>, seed: Option<u64>) -> Result<GameConfig, ConfigError> {
    match scenario.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) if name.eq_ignore_ascii_case(RANDOM_SCENARIO) => {
            GameConfig::random_scenario(seed)
        }
        Some(name) => GameConfig::for_scenario(ScenarioPreset::parse(name)?),
        None => Ok(GameConfig::default()),
    }
}

fn env_path(env_var: &'static str) -> Option<PathBuf> {
    env::var_os(env_var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn parse_cache_backend(raw: Option<String>) -> CacheBackend {
    match raw.as_deref().map(str::trim) {
        None | Some("") | Some("disk") => CacheBackend::Disk,
        Some("memory") => CacheBackend::Memory,
        Some(other) => {
            warn!(
                env_var = CACHE_BACKEND_ENV_VAR,
                value = other,
                "unknown cache backend; falling back to disk"
            );
            CacheBackend::Disk
        }
    }
}

fn parse_env_number<T: FromStr>(env_var: &'static str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(
                env_var,
                value = raw.as_str(),
                "invalid numeric env var value; ignoring"
            );
            None
        }
    }
}
