mod loop_runner;
mod metrics;
mod simulation;

pub use loop_runner::{
    run_headless, AppError, LoopConfig, LoopSummary, StopReason, SLOW_FRAME_ENV_VAR,
};
pub use metrics::LoopMetricsSnapshot;
pub use simulation::{LoopCommand, Simulation, SimulationStatus};
