use std::path::{Path, PathBuf};

use survival_engine::config::GameConfig;
use survival_engine::world::{
    AreaCache, AreaStats, ContentGenerator, DynamicAreaManager, GameStateSnapshot, Player,
    PlayerSnapshot, RandomContentGenerator, SessionProgress, SnapshotError, Vec2,
};
use survival_engine::{ConfigError, LoopCommand, Simulation, SimulationStatus};
use tracing::{debug, info, warn};

use super::autopilot::Autopilot;

/// Sim seconds between `session_progress` events.
const PROGRESS_LOG_INTERVAL_SECONDS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RoundOutcome {
    Victory,
    Defeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct RoundResult {
    pub(crate) round: u32,
    pub(crate) outcome: RoundOutcome,
    pub(crate) survived_seconds: f32,
}

/// What a heads-up display would show for the current tick.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HudSnapshot {
    pub(crate) time_remaining_seconds: f32,
    pub(crate) health: u32,
    pub(crate) max_health: u32,
    pub(crate) health_items: u32,
    pub(crate) ammo_items: u32,
    pub(crate) area_memory: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionOptions {
    /// Base seed for content generation; each round derives its own.
    pub(crate) seed: Option<u64>,
    pub(crate) rounds: u32,
}

/// One survival run: the player has to stay alive for the configured time.
/// Finished rounds restart the world until the round budget is spent.
pub(crate) struct SurvivalSession {
    config: GameConfig,
    manager: DynamicAreaManager,
    player: Player,
    autopilot: Autopilot,
    options: SessionOptions,
    round: u32,
    elapsed_seconds: f32,
    next_progress_log: f32,
    results: Vec<RoundResult>,
    save_on_shutdown: Option<PathBuf>,
}

impl SurvivalSession {
    pub(crate) fn new(
        config: GameConfig,
        cache: Box<dyn AreaCache>,
        options: SessionOptions,
    ) -> Result<Self, ConfigError> {
        let generator = round_generator(&config, options.seed, 1);
        let manager = DynamicAreaManager::new(config.clone(), cache, generator)?;
        let player = Player::new(spawn_point(&config), &config.player);
        let autopilot = Autopilot::for_world(&config);
        info!(
            survival_seconds = config.game.survival_time,
            rounds = options.rounds.max(1),
            seed = options.seed,
            "session_started"
        );

        Ok(Self {
            config,
            manager,
            player,
            autopilot,
            options,
            round: 1,
            elapsed_seconds: 0.0,
            next_progress_log: PROGRESS_LOG_INTERVAL_SECONDS,
            results: Vec::new(),
            save_on_shutdown: None,
        })
    }

    pub(crate) fn manager_mut(&mut self) -> &mut DynamicAreaManager {
        &mut self.manager
    }

    pub(crate) fn results(&self) -> &[RoundResult] {
        &self.results
    }

    pub(crate) fn stats(&self) -> AreaStats {
        self.manager.stats()
    }

    pub(crate) fn hud(&self) -> HudSnapshot {
        HudSnapshot {
            time_remaining_seconds: (self.config.game.survival_time - self.elapsed_seconds)
                .max(0.0),
            health: self.player.health(),
            max_health: self.player.max_health(),
            health_items: self.player.health_items(),
            ammo_items: self.player.ammo_items(),
            area_memory: self.manager.stats().memory_usage_label(),
        }
    }

    /// Writes the game state to `path` when the session shuts down.
    pub(crate) fn save_on_shutdown(&mut self, path: PathBuf) {
        self.save_on_shutdown = Some(path);
    }

    pub(crate) fn capture_snapshot(&mut self) -> GameStateSnapshot {
        let world = self.manager.capture_state();
        GameStateSnapshot::new(
            SessionProgress {
                round: self.round,
                elapsed_seconds: self.elapsed_seconds,
            },
            PlayerSnapshot::capture(&self.player),
            world,
            self.config.clone(),
        )
    }

    /// Puts player, timer and world back to the snapshot. Nothing changes
    /// when the snapshot is rejected.
    pub(crate) fn restore_snapshot(
        &mut self,
        snapshot: &GameStateSnapshot,
    ) -> Result<(), SnapshotError> {
        snapshot.validate_progress()?;
        let player = snapshot.player.restore(&self.config.player)?;
        self.manager.restore_state(&snapshot.world)?;

        self.player = player;
        self.round = snapshot.session.round;
        self.elapsed_seconds = snapshot.session.elapsed_seconds;
        self.next_progress_log = ((self.elapsed_seconds / PROGRESS_LOG_INTERVAL_SECONDS).floor()
            + 1.0)
            * PROGRESS_LOG_INTERVAL_SECONDS;
        self.autopilot = Autopilot::for_world(&self.config);
        info!(
            round = self.round,
            elapsed_seconds = self.elapsed_seconds,
            health = self.player.health(),
            "session_restored"
        );
        Ok(())
    }

    pub(crate) fn save_game(&mut self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.capture_snapshot();
        snapshot.save_to_path(path)?;
        info!(
            path = %path.display(),
            areas = snapshot.world.areas.len(),
            total_enemies = snapshot.metadata.total_enemies,
            "game_saved"
        );
        Ok(())
    }

    pub(crate) fn load_game(&mut self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = GameStateSnapshot::load_from_path(path)?;
        self.restore_snapshot(&snapshot)?;
        info!(path = %path.display(), "game_loaded");
        Ok(())
    }

    fn step(&mut self, dt_seconds: f32) -> Option<RoundOutcome> {
        let intent = self
            .autopilot
            .plan(&self.player, &self.manager, self.config.ammo_blast());

        self.player.move_by(intent.dx, intent.dy, dt_seconds);
        self.keep_player_in_world();
        if intent.use_health_item && self.player.use_health_item(self.config.heal_amount()) {
            debug!(health = self.player.health(), "health_item_used");
        }
        if intent.detonate_ammo {
            if let Some(killed) = self.manager.detonate_ammo(&mut self.player) {
                debug!(killed, "ammo_item_used");
            }
        }

        let report = self.manager.tick(&mut self.player, dt_seconds);
        if report.items_collected > 0 || report.enemies_removed > 0 {
            debug!(
                items_collected = report.items_collected,
                enemies_removed = report.enemies_removed,
                "tick_pickups"
            );
        }
        self.elapsed_seconds += dt_seconds;

        if self.elapsed_seconds >= self.next_progress_log {
            self.next_progress_log += PROGRESS_LOG_INTERVAL_SECONDS;
            let hud = self.hud();
            info!(
                round = self.round,
                time_remaining = hud.time_remaining_seconds,
                health = hud.health,
                health_items = hud.health_items,
                ammo_items = hud.ammo_items,
                areas = %hud.area_memory,
                "session_progress"
            );
        }

        if !self.player.is_alive() {
            Some(RoundOutcome::Defeat)
        } else if self.elapsed_seconds >= self.config.game.survival_time {
            Some(RoundOutcome::Victory)
        } else {
            None
        }
    }

    fn finish_round(&mut self, outcome: RoundOutcome) -> LoopCommand {
        let result = RoundResult {
            round: self.round,
            outcome,
            survived_seconds: self.elapsed_seconds,
        };
        self.results.push(result);
        info!(
            round = result.round,
            outcome = ?result.outcome,
            survived_seconds = result.survived_seconds,
            "round_finished"
        );

        if self.round >= self.options.rounds.max(1) {
            return LoopCommand::Stop;
        }
        self.restart();
        LoopCommand::Continue
    }

    /// Fresh player and world; persisted areas are picked up again from the
    /// cache.
    fn restart(&mut self) {
        self.round += 1;
        let generator = round_generator(&self.config, self.options.seed, self.round);
        let report = self.manager.reset_world(generator);
        self.player = Player::new(spawn_point(&self.config), &self.config.player);
        self.autopilot = Autopilot::for_world(&self.config);
        self.elapsed_seconds = 0.0;
        self.next_progress_log = PROGRESS_LOG_INTERVAL_SECONDS;
        info!(
            round = self.round,
            persisted = report.persisted,
            "session_restarted"
        );
    }

    fn keep_player_in_world(&mut self) {
        let world_size = self.config.world.grid_size as f32 * self.config.world.area_size;
        let margin = self.config.player.size;
        let position = self.player.position();
        self.player.set_position(Vec2::new(
            position.x.clamp(margin, world_size - margin),
            position.y.clamp(margin, world_size - margin),
        ));
    }
}

impl Simulation for SurvivalSession {
    fn tick(&mut self, fixed_dt_seconds: f32) -> LoopCommand {
        match self.step(fixed_dt_seconds) {
            Some(outcome) => self.finish_round(outcome),
            None => LoopCommand::Continue,
        }
    }

    fn status(&self) -> SimulationStatus {
        let stats = self.manager.stats();
        SimulationStatus {
            loaded_areas: stats.loaded_areas,
            active_areas: stats.active_areas,
            entity_count: stats.total_enemies + stats.total_items,
        }
    }

    fn shutdown(&mut self) {
        if let Some(path) = self.save_on_shutdown.take() {
            if let Err(error) = self.save_game(&path) {
                warn!(path = %path.display(), error = %error, "game_save_failed");
            }
        }
        let report = self.manager.shutdown();
        let stats = self.manager.stats();
        info!(
            persisted = report.persisted,
            failed = report.failed,
            cache_read_failures = stats.cache_errors.read_failures,
            cache_write_failures = stats.cache_errors.write_failures,
            rounds_played = self.results.len(),
            "session_shutdown"
        );
    }
}

/// Centre of area (1, 1), or of the only area on a 1x1 grid.
fn spawn_point(config: &GameConfig) -> Vec2 {
    let area_size = config.world.area_size;
    let cell = if config.world.grid_size > 1 { 1.0 } else { 0.0 };
    let center = cell * area_size + area_size / 2.0;
    Vec2::new(center, center)
}

fn round_generator(
    config: &GameConfig,
    seed: Option<u64>,
    round: u32,
) -> Box<dyn ContentGenerator> {
    match seed {
        Some(seed) => Box::new(RandomContentGenerator::seeded(
            config,
            seed.wrapping_add(u64::from(round)),
        )),
        None => Box::new(RandomContentGenerator::from_entropy(config)),
    }
}
