use std::env;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{info, warn};

use crate::config::ConfigError;
use crate::world::{CacheError, SnapshotError};
use crate::StartupError;

use super::metrics::{LoopMetricsSnapshot, MetricsAccumulator};
use super::{LoopCommand, Simulation};

pub const SLOW_FRAME_ENV_VAR: &str = "SURVIVAL_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    /// Upper bound on loop iterations per second; `None` spins freely.
    pub max_loop_hz: Option<u32>,
    /// Wall-clock budget after which the loop stops on its own.
    pub max_runtime: Option<Duration>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_loop_hz: Some(240),
            max_runtime: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("invalid game configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("area cache unavailable: {0}")]
    Cache(#[from] CacheError),
    #[error("saved game unusable: {0}")]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Simulation,
    RuntimeLimit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSummary {
    pub ticks: u64,
    pub iterations: u64,
    pub stop_reason: StopReason,
    /// The most recent `loop_metrics` interval; `None` when the run ended
    /// before the first interval closed.
    pub last_metrics: Option<LoopMetricsSnapshot>,
}

/// Drives `simulation` at a fixed tick rate against the wall clock until it
/// asks to stop or the runtime budget runs out, then shuts it down.
pub fn run_headless(config: &LoopConfig, simulation: &mut dyn Simulation) -> LoopSummary {
    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let effective_loop_cap = normalize_loop_hz_cap(config.max_loop_hz);
    let iteration_target = target_frame_duration(effective_loop_cap);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        loop_hz_cap = %format_loop_cap(effective_loop_cap),
        max_runtime_ms = config.max_runtime.map(|limit| limit.as_millis() as u64),
        "loop_config"
    );

    let start = Instant::now();
    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = start;
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval, start);
    let mut ticks = 0u64;
    let mut iterations = 0u64;
    let mut last_metrics = None;

    let stop_reason = loop {
        if slow_frame_delay > Duration::ZERO {
            thread::sleep(slow_frame_delay);
        }

        let now = Instant::now();
        if let Some(limit) = config.max_runtime {
            if now.saturating_duration_since(start) >= limit {
                break StopReason::RuntimeLimit;
            }
        }

        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
        last_frame_instant = now;
        accumulator = accumulator.saturating_add(clamp_frame_delta(raw_frame_dt, max_frame_delta));

        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
        let mut stop_requested = false;
        for _ in 0..step_plan.ticks_to_run {
            ticks = ticks.saturating_add(1);
            metrics_accumulator.record_ticks(1);
            if simulation.tick(fixed_dt_seconds) == LoopCommand::Stop {
                stop_requested = true;
                break;
            }
        }
        accumulator = step_plan.remaining_accumulator;

        if step_plan.dropped_backlog > Duration::ZERO {
            metrics_accumulator.record_clamp();
            warn!(
                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame, "sim_clamp_triggered"
            );
        }

        iterations = iterations.saturating_add(1);
        metrics_accumulator.record_iteration(raw_frame_dt);
        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
            last_metrics = Some(snapshot);
            let status = simulation.status();
            info!(
                loop_hz = snapshot.loop_hz,
                tps = snapshot.tps,
                frame_time_ms = snapshot.frame_time_ms,
                clamp_events = snapshot.clamp_events,
                loaded_areas = status.loaded_areas,
                active_areas = status.active_areas,
                entity_count = status.entity_count,
                "loop_metrics"
            );
        }

        if stop_requested {
            break StopReason::Simulation;
        }

        let cap_sleep = compute_cap_sleep(
            Instant::now().saturating_duration_since(now),
            iteration_target,
        );
        if cap_sleep > Duration::ZERO {
            thread::sleep(cap_sleep);
        }
    };

    simulation.shutdown();
    info!(ticks, iterations, reason = ?stop_reason, "shutdown");

    LoopSummary {
        ticks,
        iterations,
        stop_reason,
        last_metrics,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_loop_hz_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_loop_hz: Option<u32>) -> Option<Duration> {
    max_loop_hz.map(|hz| Duration::from_secs_f64(1.0 / hz as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_loop_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::app::SimulationStatus;

    use super::*;

    #[derive(Default)]
    struct StopAfter {
        limit: u32,
        ticks: u32,
        dt_sum: f32,
        shutdowns: u32,
    }

    impl Simulation for StopAfter {
        fn tick(&mut self, fixed_dt_seconds: f32) -> LoopCommand {
            self.ticks += 1;
            self.dt_sum += fixed_dt_seconds;
            if self.ticks >= self.limit {
                LoopCommand::Stop
            } else {
                LoopCommand::Continue
            }
        }

        fn status(&self) -> SimulationStatus {
            SimulationStatus::default()
        }

        fn shutdown(&mut self) {
            self.shutdowns += 1;
        }
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            target_tps: 1000,
            max_loop_hz: None,
            ..LoopConfig::default()
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(250);
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(600), max_frame_delta),
            max_frame_delta
        );
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(50), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::from_millis(2));
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_sim_steps(Duration::from_millis(120), fixed_dt, 3);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(72));
    }

    #[test]
    fn cap_sleep_fills_remaining_frame_budget() {
        let target = Some(Duration::from_millis(10));
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(4), target),
            Duration::from_millis(6)
        );
        assert_eq!(
            compute_cap_sleep(Duration::from_millis(12), target),
            Duration::ZERO
        );
        assert_eq!(compute_cap_sleep(Duration::from_millis(1), None), Duration::ZERO);
        assert_eq!(normalize_loop_hz_cap(Some(0)), None);
    }

    #[test]
    fn loop_stops_when_simulation_asks_and_shuts_down_once() {
        let mut simulation = StopAfter {
            limit: 5,
            ..StopAfter::default()
        };
        let summary = run_headless(&fast_config(), &mut simulation);

        assert_eq!(summary.stop_reason, StopReason::Simulation);
        assert_eq!(summary.ticks, 5);
        assert_eq!(simulation.ticks, 5);
        assert_eq!(simulation.shutdowns, 1);
        assert!((simulation.dt_sum - 0.005).abs() < 1e-4);
    }

    #[test]
    fn loop_honours_runtime_limit() {
        let mut simulation = StopAfter {
            limit: u32::MAX,
            ..StopAfter::default()
        };
        let config = LoopConfig {
            max_runtime: Some(Duration::from_millis(30)),
            ..fast_config()
        };
        let summary = run_headless(&config, &mut simulation);

        assert_eq!(summary.stop_reason, StopReason::RuntimeLimit);
        assert_eq!(simulation.shutdowns, 1);
        assert_eq!(summary.ticks, u64::from(simulation.ticks));
    }

    #[test]
    fn summary_carries_the_last_metrics_interval() {
        let mut simulation = StopAfter {
            limit: u32::MAX,
            ..StopAfter::default()
        };
        let config = LoopConfig {
            metrics_log_interval: Duration::from_millis(10),
            max_runtime: Some(Duration::from_millis(60)),
            ..fast_config()
        };
        let summary = run_headless(&config, &mut simulation);

        let metrics = summary.last_metrics.expect("at least one interval closed");
        assert!(metrics.loop_hz > 0.0);
        assert!(metrics.tps > 0.0);

        let mut quick = StopAfter {
            limit: 1,
            ..StopAfter::default()
        };
        let summary = run_headless(&fast_config(), &mut quick);
        assert_eq!(summary.last_metrics, None);
    }
}
