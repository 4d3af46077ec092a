use std::process::ExitCode;

use survival_engine::{run_headless, AppError};
use tracing::{error, info};

use super::bootstrap::AppWiring;
use super::session::RoundOutcome;

pub(crate) fn run(app: Result<AppWiring, AppError>) -> ExitCode {
    let mut app = match app {
        Ok(app) => app,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };

    let summary = run_headless(&app.loop_config, &mut app.session);
    let results = app.session.results();
    let victories = results
        .iter()
        .filter(|result| result.outcome == RoundOutcome::Victory)
        .count();
    let stats = app.session.stats();
    info!(
        ticks = summary.ticks,
        reason = ?summary.stop_reason,
        last_tps = summary.last_metrics.map(|metrics| metrics.tps),
        last_clamp_events = summary.last_metrics.map(|metrics| metrics.clamp_events),
        rounds = results.len(),
        victories,
        areas = %stats.memory_usage_label(),
        "run_finished"
    );

    ExitCode::SUCCESS
}
