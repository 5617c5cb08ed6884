//! Deadline scheduling for pending tournaments.
//!
//! One tokio task per (tournament, event) sleeps until its deadline and then
//! fires the matching engine callback. A periodic sweep catches anything the
//! timers missed, e.g. deadlines that passed while the process was down.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use team_bracket::{
    Tournament, TournamentId, TournamentManager, TournamentResult, TournamentStatus, Transition,
};
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{logging, metrics};

/// Deadline-driven engine callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduledEvent {
    /// Fires `close_registration_now` at the registration deadline
    CloseRegistration,
    /// Fires `begin_now` at the start time
    Begin,
}

impl ScheduledEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledEvent::CloseRegistration => "close_registration",
            ScheduledEvent::Begin => "begin",
        }
    }
}

type TaskKey = (TournamentId, ScheduledEvent);

struct ScheduledTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Work done by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub closed: usize,
    pub started: usize,
    pub failed: usize,
}

/// Invoke the engine callback for `event` and record the outcome
pub async fn run_callback(
    manager: &TournamentManager,
    tournament_id: TournamentId,
    event: ScheduledEvent,
) -> TournamentResult<Transition> {
    let result = match event {
        ScheduledEvent::CloseRegistration => manager.close_registration_now(tournament_id).await,
        ScheduledEvent::Begin => manager.begin_now(tournament_id).await,
    };

    let outcome = match &result {
        Ok(transition) if transition.is_noop() => "noop",
        Ok(_) => "applied",
        Err(_) => "failed",
    };
    metrics::scheduler_callbacks_total(event.as_str(), outcome);

    match &result {
        Ok(Transition::Started { .. }) => metrics::rounds_generated_total(),
        Err(_) if event == ScheduledEvent::Begin => {
            let cancelled = manager
                .tournament(tournament_id)
                .await
                .is_ok_and(|t| t.status == TournamentStatus::Cancelled);
            if cancelled {
                metrics::tournaments_cancelled_total("scheduled_start");
            }
        }
        _ => {}
    }

    logging::log_scheduler_event(tournament_id, event.as_str(), &result);
    result
}

/// Timer registry for tournament deadlines
#[derive(Clone)]
pub struct TournamentScheduler {
    manager: TournamentManager,
    tasks: Arc<Mutex<HashMap<TaskKey, ScheduledTask>>>,
    generation: Arc<AtomicU64>,
}

impl TournamentScheduler {
    pub fn new(manager: TournamentManager) -> Self {
        Self {
            manager,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Arm timers for every tournament still in OPEN or CLOSED status.
    ///
    /// Returns the number of timers armed.
    pub async fn reload_pending(&self) -> TournamentResult<usize> {
        let pending = self.manager.pending_tournaments().await?;
        metrics::pending_tournaments(pending.len());

        let mut armed = 0;
        for tournament in &pending {
            armed += self.schedule_tournament_events(tournament).await;
        }

        tracing::info!(
            "Armed {} deadline timers for {} pending tournaments",
            armed,
            pending.len()
        );
        Ok(armed)
    }

    /// Arm the timers that still apply to `tournament`
    pub async fn schedule_tournament_events(&self, tournament: &Tournament) -> usize {
        let mut armed = 0;

        if tournament.status == TournamentStatus::Open {
            if let Some(deadline) = tournament.registration_deadline {
                self.schedule(tournament.id, ScheduledEvent::CloseRegistration, deadline)
                    .await;
                armed += 1;
            }
        }

        if tournament.status.is_pending() {
            if let Some(start) = tournament.start_time {
                self.schedule(tournament.id, ScheduledEvent::Begin, start)
                    .await;
                armed += 1;
            }
        }

        armed
    }

    /// Fire `event` for the tournament at `at`.
    ///
    /// Replaces any timer already armed for the same tournament and event.
    /// Deadlines in the past fire immediately.
    pub async fn schedule(&self, tournament_id: TournamentId, event: ScheduledEvent, at: DateTime<Utc>) {
        let key = (tournament_id, event);
        let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);

        let mut tasks = self.tasks.lock().await;

        let registry = Arc::clone(&self.tasks);
        let manager = self.manager.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Only the latest timer for a key may fire.
            let current = {
                let mut registry = registry.lock().await;
                match registry.get(&key) {
                    Some(task) if task.generation == generation => {
                        registry.remove(&key);
                        true
                    }
                    _ => false,
                }
            };

            if current {
                // Detached: aborting this timer must not interrupt the transition.
                tokio::spawn(async move {
                    let _ = run_callback(&manager, tournament_id, event).await;
                });
            }
        });

        if let Some(previous) = tasks.insert(key, ScheduledTask { generation, handle }) {
            previous.handle.abort();
            tracing::debug!(
                tournament_id = tournament_id,
                event = event.as_str(),
                "Replaced armed timer"
            );
        }
        metrics::scheduled_timers(tasks.len());
    }

    /// Disarm every timer of a tournament, returning how many were armed
    pub async fn cancel_events(&self, tournament_id: TournamentId) -> usize {
        let mut tasks = self.tasks.lock().await;
        let mut removed = 0;
        for event in [ScheduledEvent::CloseRegistration, ScheduledEvent::Begin] {
            if let Some(task) = tasks.remove(&(tournament_id, event)) {
                task.handle.abort();
                removed += 1;
            }
        }
        metrics::scheduled_timers(tasks.len());
        removed
    }

    /// Number of armed timers
    pub async fn scheduled_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Disarm all timers
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, task) in tasks.drain() {
            task.handle.abort();
        }
        metrics::scheduled_timers(0);
    }

    /// Run [`sweep_once`](Self::sweep_once) every `period`
    pub fn spawn_sweep(&self, period: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.sweep_once(Utc::now()).await {
                    tracing::error!("Overdue sweep failed: {}", e);
                }
            }
        })
    }

    /// Close overdue registrations and begin overdue tournaments
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> TournamentResult<SweepReport> {
        let started_at = Instant::now();
        let pending = self.manager.pending_tournaments().await?;
        metrics::pending_tournaments(pending.len());

        let mut report = SweepReport::default();
        for tournament in pending {
            let deadline_passed = tournament
                .registration_deadline
                .is_some_and(|deadline| deadline <= now);
            if tournament.status == TournamentStatus::Open && deadline_passed {
                match run_callback(&self.manager, tournament.id, ScheduledEvent::CloseRegistration)
                    .await
                {
                    Ok(Transition::RegistrationClosed) => report.closed += 1,
                    Ok(_) => {}
                    Err(_) => report.failed += 1,
                }
            }

            if tournament.start_time.is_some_and(|start| start <= now) {
                match run_callback(&self.manager, tournament.id, ScheduledEvent::Begin).await {
                    Ok(Transition::Started { .. }) => report.started += 1,
                    Ok(_) => {}
                    Err(_) => report.failed += 1,
                }
            }
        }

        let elapsed = started_at.elapsed();
        metrics::sweep_duration_ms(elapsed.as_secs_f64() * 1000.0);
        logging::log_sweep(
            report.closed,
            report.started,
            report.failed,
            elapsed.as_millis() as u64,
        );
        Ok(report)
    }
}
