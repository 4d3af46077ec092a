#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    Continue,
    Stop,
}

/// Counters the loop attaches to its periodic `loop_metrics` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStatus {
    pub loaded_areas: usize,
    pub active_areas: usize,
    pub entity_count: usize,
}

/// Fixed-step simulation driven by the headless loop.
pub trait Simulation {
    fn tick(&mut self, fixed_dt_seconds: f32) -> LoopCommand;
    fn status(&self) -> SimulationStatus;
    /// Called exactly once, after the last tick.
    fn shutdown(&mut self);
}
