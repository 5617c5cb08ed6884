//! Structured logging configuration.
//!
//! The engine crate logs through the `log` facade; the subscriber installed
//! here also receives those records.

use team_bracket::{TournamentId, TournamentResult, Transition};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```ignore
/// logging::init();
/// tracing::info!("Server starting");
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log the outcome of a scheduler callback with structured data
///
/// # Arguments
///
/// * `tournament_id` - Tournament the callback fired for
/// * `event` - Callback name
/// * `result` - What the engine returned
pub fn log_scheduler_event(
    tournament_id: TournamentId,
    event: &str,
    result: &TournamentResult<Transition>,
) {
    match result {
        Ok(transition) if transition.is_noop() => tracing::debug!(
            tournament_id = tournament_id,
            event = event,
            "Scheduler callback was a no-op: {:?}",
            transition
        ),
        Ok(transition) => tracing::info!(
            tournament_id = tournament_id,
            event = event,
            "Scheduler callback applied: {}",
            describe(transition)
        ),
        Err(e) if e.is_validation() => tracing::warn!(
            tournament_id = tournament_id,
            event = event,
            "Scheduler callback rejected: {}",
            e
        ),
        Err(e) => tracing::error!(
            tournament_id = tournament_id,
            event = event,
            "Scheduler callback failed: {}",
            e
        ),
    }
}

/// Log a completed overdue sweep
pub fn log_sweep(closed: usize, started: usize, failed: usize, duration_ms: u64) {
    if closed + started + failed == 0 {
        tracing::debug!(duration_ms = duration_ms, "Sweep found nothing overdue");
    } else {
        tracing::info!(
            closed = closed,
            started = started,
            failed = failed,
            duration_ms = duration_ms,
            "Sweep processed overdue tournaments"
        );
    }
}

fn describe(transition: &Transition) -> String {
    match transition {
        Transition::RegistrationClosed => "registration closed".to_string(),
        Transition::Started { round, matches } => {
            format!("started, round {round} with {} matches", matches.len())
        }
        Transition::Advanced { round, matches } => {
            format!("advanced to round {round} with {} matches", matches.len())
        }
        Transition::Finished { winner } => format!("finished, winner team {winner}"),
        Transition::Cancelled => "cancelled".to_string(),
        Transition::NoOp { status, .. } => format!("no-op while {status}"),
    }
}
