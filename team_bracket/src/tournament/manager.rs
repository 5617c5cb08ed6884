//! Tournament manager: the bracket state machine.
//!
//! Every mutating operation takes the tournament's lock, re-reads the record,
//! validates, and persists through a version-checked save. Round claims are
//! saved before the round's matches are created, so a caller that loses a
//! race never writes matches.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use log::{error, info, warn};

use super::{
    config::BracketConfig,
    errors::{TournamentError, TournamentResult},
    locks::TournamentLocks,
    models::{
        Match, MatchDraft, MatchId, MatchReport, MatchStatus, NewTournament, Registration, Team,
        TeamId, Tournament, TournamentHistoryEntry, TournamentId, TournamentStatus, Transition,
    },
    pairing, progress,
};
use crate::db::{InMemoryStore, MatchStore, TeamRegistry, TournamentStore};

/// Run `op`, retrying once if it lost an optimistic concurrency race
async fn retry_on_conflict<T, F, Fut>(mut op: F) -> TournamentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = TournamentResult<T>>,
{
    match op().await {
        Err(TournamentError::ConcurrentModification(id)) => {
            warn!("Tournament {} changed underneath us, retrying once", id);
            op().await
        }
        other => other,
    }
}

fn no_op(tournament: &Tournament) -> Transition {
    Transition::NoOp {
        status: tournament.status,
        current_round: tournament.current_round,
    }
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    tournaments: Arc<dyn TournamentStore>,
    registry: Arc<dyn TeamRegistry>,
    matches: Arc<dyn MatchStore>,
    config: BracketConfig,
    locks: TournamentLocks,
}

impl TournamentManager {
    /// Create a new tournament manager
    ///
    /// # Arguments
    ///
    /// * `tournaments` - Tournament record storage
    /// * `registry` - Registrations and team strengths
    /// * `matches` - Match storage
    /// * `config` - Bracket policy
    pub fn new(
        tournaments: Arc<dyn TournamentStore>,
        registry: Arc<dyn TeamRegistry>,
        matches: Arc<dyn MatchStore>,
        config: BracketConfig,
    ) -> Self {
        Self {
            tournaments,
            registry,
            matches,
            config,
            locks: TournamentLocks::new(),
        }
    }

    /// Manager backed entirely by one in-memory store
    pub fn in_memory(store: InMemoryStore, config: BracketConfig) -> Self {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
            config,
        )
    }

    pub fn config(&self) -> &BracketConfig {
        &self.config
    }

    /// Create a tournament in OPEN status
    pub async fn create_tournament(&self, new: NewTournament) -> TournamentResult<Tournament> {
        new.validate()?;
        let tournament = self.tournaments.create(&new).await?;
        info!(
            "Created tournament {} '{}' in region {}",
            tournament.id, tournament.name, tournament.region
        );
        Ok(tournament)
    }

    /// Load a tournament
    pub async fn tournament(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        self.tournaments.load(tournament_id).await
    }

    /// Register a team for a tournament
    pub async fn register_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<Registration> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.tournaments.load(tournament_id).await?;
        let now = Utc::now();

        if !tournament.accepts_registrations(now) {
            return Err(TournamentError::RegistrationClosed(tournament_id));
        }

        let team_region = self.registry.team_region(team_id).await?;
        if team_region != tournament.region {
            return Err(TournamentError::RegionMismatch {
                team_id,
                team_region,
                tournament_region: tournament.region,
            });
        }

        if let Some(max) = tournament.max_teams {
            let registered = self.registry.registration_count(tournament_id).await?;
            if registered >= max as usize {
                return Err(TournamentError::TournamentFull { registered, max });
            }
        }

        if self
            .registry
            .registration(tournament_id, team_id)
            .await?
            .is_some()
        {
            return Err(TournamentError::AlreadyRegistered(team_id));
        }

        let registration = self
            .registry
            .register_team(tournament_id, team_id, now)
            .await?;
        info!("Team {} registered for tournament {}", team_id, tournament_id);
        Ok(registration)
    }

    /// Number of teams registered for a tournament
    pub async fn registration_count(&self, tournament_id: TournamentId) -> TournamentResult<usize> {
        self.tournaments.load(tournament_id).await?;
        self.registry.registration_count(tournament_id).await
    }

    /// Delete a tournament together with its registrations and matches.
    ///
    /// Allowed in any status.
    pub async fn delete_tournament(&self, tournament_id: TournamentId) -> TournamentResult<()> {
        let _guard = self.locks.acquire(tournament_id).await;
        self.tournaments.delete(tournament_id).await?;
        info!("Deleted tournament {}", tournament_id);
        Ok(())
    }

    /// Withdraw a team before the tournament starts
    pub async fn withdraw_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.tournaments.load(tournament_id).await?;

        if tournament.status != TournamentStatus::Open {
            return Err(TournamentError::InvalidTransition {
                status: tournament.status,
                operation: "withdraw from",
            });
        }

        if tournament.has_start_passed(Utc::now()) {
            return Err(TournamentError::AlreadyStarted(tournament_id));
        }

        self.registry.withdraw_team(tournament_id, team_id).await?;
        info!("Team {} withdrew from tournament {}", team_id, tournament_id);
        Ok(())
    }

    /// Lock registration. A no-op unless the tournament is OPEN.
    pub async fn close_registration(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        let _guard = self.locks.acquire(tournament_id).await;
        retry_on_conflict(|| self.try_close_registration(tournament_id)).await
    }

    async fn try_close_registration(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        let mut tournament = self.tournaments.load(tournament_id).await?;
        if tournament.status != TournamentStatus::Open {
            return Ok(no_op(&tournament));
        }

        tournament.status = TournamentStatus::Closed;
        self.tournaments.save(&tournament).await?;
        info!("Closed registration for tournament {}", tournament_id);
        Ok(Transition::RegistrationClosed)
    }

    /// Start the bracket, or advance it past a completed round.
    ///
    /// At round 0 this pairs every registrant into round 1. Afterwards it
    /// collects the current round's winners and either pairs them into the
    /// next round or, with one team left, finishes the tournament.
    pub async fn begin_or_advance(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        let _guard = self.locks.acquire(tournament_id).await;
        self.begin_or_advance_locked(tournament_id).await
    }

    /// Caller must hold the tournament's lock
    async fn begin_or_advance_locked(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        let result = retry_on_conflict(|| self.try_begin_or_advance(tournament_id)).await;
        if let Err(TournamentError::InternalConsistency(detail)) = &result {
            self.cancel_inconsistent(tournament_id, detail).await;
        }
        result
    }

    /// Log at error and move the tournament to CANCELLED.
    /// Caller must hold the tournament's lock.
    async fn cancel_inconsistent(&self, tournament_id: TournamentId, detail: &str) {
        error!(
            "Tournament {} is inconsistent, cancelling: {}",
            tournament_id, detail
        );
        let reason = format!("internal consistency failure: {detail}");
        if let Err(e) = self.cancel_if_active(tournament_id, reason).await {
            error!("Failed to cancel tournament {}: {}", tournament_id, e);
        }
    }

    async fn try_begin_or_advance(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        let tournament = self.tournaments.load(tournament_id).await?;
        if tournament.current_round == 0 {
            self.start_bracket(tournament).await
        } else {
            self.advance_round(tournament).await
        }
    }

    async fn start_bracket(&self, mut tournament: Tournament) -> TournamentResult<Transition> {
        if !tournament.status.is_pending() {
            return Err(TournamentError::InvalidTransition {
                status: tournament.status,
                operation: "start",
            });
        }

        let teams = self.registry.registered_teams(tournament.id).await?;
        if teams.len() < self.config.min_teams {
            return Err(TournamentError::InsufficientTeams {
                needed: self.config.min_teams,
                current: teams.len(),
            });
        }

        tournament.status = TournamentStatus::InProgress;
        tournament.current_round = 1;
        let matches = self.generate_round(&tournament, &teams).await?;

        info!(
            "Started tournament {} with {} teams and {} round-1 matches",
            tournament.id,
            teams.len(),
            matches.len()
        );
        Ok(Transition::Started { round: 1, matches })
    }

    async fn advance_round(&self, mut tournament: Tournament) -> TournamentResult<Transition> {
        if tournament.status != TournamentStatus::InProgress {
            return Err(TournamentError::InvalidTransition {
                status: tournament.status,
                operation: "advance",
            });
        }

        let tournament_id = tournament.id;
        let round = tournament.current_round;

        if self
            .matches
            .has_unfinished_matches(tournament_id, round)
            .await?
        {
            return Err(TournamentError::RoundNotFinished { round });
        }

        let round_matches = self.matches.matches_for_round(tournament_id, round).await?;
        if round_matches.is_empty() {
            // Claimed by another engine that has not written the matches yet.
            return Err(TournamentError::RoundNotFinished { round });
        }
        let winners = progress::collect_winners(round, &round_matches)
            .map_err(TournamentError::InternalConsistency)?;
        let mut finished_teams = progress::eliminated_teams(&round_matches);

        let registered = self.registry.registered_teams(tournament_id).await?;
        let survivors = progress::resolve_survivors(&winners, &registered)
            .map_err(TournamentError::InternalConsistency)?;

        if let [champion] = survivors.as_slice() {
            tournament.status = TournamentStatus::Finished;
            tournament.winner = Some(champion.id);
            self.tournaments.save(&tournament).await?;

            finished_teams.push(champion.id);
            self.registry
                .mark_finished(tournament_id, &finished_teams)
                .await?;

            info!(
                "Tournament {} finished after round {}, winner: team {}",
                tournament_id, round, champion.id
            );
            return Ok(Transition::Finished {
                winner: champion.id,
            });
        }

        let next_round = round + 1;
        tournament.current_round = next_round;
        let matches = self.generate_round(&tournament, &survivors).await?;
        self.registry
            .mark_finished(tournament_id, &finished_teams)
            .await?;

        info!(
            "Tournament {} advanced to round {} with {} survivors",
            tournament_id,
            next_round,
            survivors.len()
        );
        Ok(Transition::Advanced {
            round: next_round,
            matches,
        })
    }

    /// Pair `teams` into `tournament.current_round`, claim the round by
    /// saving `tournament`, then persist the matches and record the bye.
    async fn generate_round(
        &self,
        tournament: &Tournament,
        teams: &[Team],
    ) -> TournamentResult<Vec<Match>> {
        let round = tournament.current_round;

        if let Some(team_id) = pairing::find_duplicate(teams) {
            return Err(TournamentError::InternalConsistency(format!(
                "team {team_id} appears twice in the round {round} pool"
            )));
        }

        let mut bye_history = HashSet::new();
        if teams.len() % 2 == 1 {
            for team in teams {
                if self
                    .registry
                    .has_received_bye(tournament.id, team.id)
                    .await?
                {
                    bye_history.insert(team.id);
                }
            }
        }

        let drafts = pairing::generate_pairings(tournament.id, teams, round, &bye_history);
        if drafts.is_empty() {
            return Err(TournamentError::InternalConsistency(format!(
                "round {round} pool of {} teams produced no matches",
                teams.len()
            )));
        }

        self.tournaments.save(tournament).await?;

        // The round is claimed now. If its matches cannot be written the
        // tournament would wait on an empty round forever, so it is cancelled.
        match self.write_round(tournament.id, round, &drafts).await {
            Ok(created) => Ok(created),
            Err(e) => {
                error!(
                    "Round {} of tournament {} was claimed but not written, cancelling: {}",
                    round, tournament.id, e
                );
                let reason = format!("round {round} could not be written: {e}");
                if let Err(cancel_err) = self.cancel_if_active(tournament.id, reason).await {
                    error!(
                        "Failed to cancel tournament {}: {}",
                        tournament.id, cancel_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn write_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
        drafts: &[MatchDraft],
    ) -> TournamentResult<Vec<Match>> {
        let created = self
            .matches
            .create_matches(tournament_id, round, drafts)
            .await?;

        if let Some(team_id) = pairing::bye_recipient(drafts) {
            self.registry
                .mark_bye_received(tournament_id, team_id)
                .await?;
            info!(
                "Team {} advances on a bye in round {} of tournament {}",
                team_id, round, tournament_id
            );
        }

        Ok(created)
    }

    /// Cancel a tournament that has not reached a terminal status
    pub async fn cancel(
        &self,
        tournament_id: TournamentId,
        reason: impl Into<String>,
    ) -> TournamentResult<Transition> {
        let _guard = self.locks.acquire(tournament_id).await;
        let reason = reason.into();
        retry_on_conflict(|| self.try_cancel(tournament_id, reason.clone())).await
    }

    async fn try_cancel(
        &self,
        tournament_id: TournamentId,
        reason: String,
    ) -> TournamentResult<Transition> {
        let mut tournament = self.tournaments.load(tournament_id).await?;
        if tournament.status.is_terminal() {
            return Err(TournamentError::InvalidTransition {
                status: tournament.status,
                operation: "cancel",
            });
        }

        tournament.status = TournamentStatus::Cancelled;
        tournament.cancel_reason = Some(reason);
        self.tournaments.save(&tournament).await?;
        info!(
            "Cancelled tournament {} at round {}: {}",
            tournament_id,
            tournament.current_round,
            tournament.cancel_reason.as_deref().unwrap_or_default()
        );
        Ok(Transition::Cancelled)
    }

    /// Caller must hold the tournament's lock. Terminal tournaments are left alone.
    async fn cancel_if_active(
        &self,
        tournament_id: TournamentId,
        reason: String,
    ) -> TournamentResult<Transition> {
        let tournament = self.tournaments.load(tournament_id).await?;
        if tournament.status.is_terminal() {
            return Ok(no_op(&tournament));
        }
        retry_on_conflict(|| self.try_cancel(tournament_id, reason.clone())).await
    }

    /// Registration-deadline callback
    pub async fn close_registration_now(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Transition> {
        self.close_registration(tournament_id).await
    }

    /// Start-time callback.
    ///
    /// A no-op once the bracket has started or the tournament is terminal.
    /// If the start fails the tournament is cancelled and the original error
    /// is returned, unless another engine started or cancelled it
    /// concurrently.
    pub async fn begin_now(&self, tournament_id: TournamentId) -> TournamentResult<Transition> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.tournaments.load(tournament_id).await?;

        if tournament.current_round > 0 || !tournament.status.is_pending() {
            return Ok(no_op(&tournament));
        }

        let err = match self.begin_or_advance_locked(tournament_id).await {
            Ok(transition) => return Ok(transition),
            // Already cancelled by the consistency handler.
            Err(e @ TournamentError::InternalConsistency(_)) => return Err(e),
            Err(e @ TournamentError::ConcurrentModification(_)) => {
                warn!(
                    "Scheduled start of tournament {} kept conflicting: {}",
                    tournament_id, e
                );
                return Err(e);
            }
            Err(e) => e,
        };

        let current = self.tournaments.load(tournament_id).await?;
        if !current.status.is_pending() {
            if err.is_validation() {
                // Another engine instance moved it on in the meantime.
                return Ok(no_op(&current));
            }
            // A round write failed after the claim and was handled there.
            return Err(err);
        }

        warn!(
            "Scheduled start of tournament {} failed, cancelling: {}",
            tournament_id, err
        );
        let reason = format!("scheduled start failed: {err}");
        if let Err(cancel_err) = self.cancel_if_active(tournament_id, reason).await {
            error!(
                "Failed to cancel tournament {}: {}",
                tournament_id, cancel_err
            );
        }
        Err(err)
    }

    /// Record a match outcome.
    ///
    /// When this finishes the last open match of the round the bracket is
    /// advanced in the same call and the resulting transition is returned.
    pub async fn report_match_result(
        &self,
        match_id: MatchId,
        winner: TeamId,
    ) -> TournamentResult<MatchReport> {
        let tournament_id = self.matches.find_match(match_id).await?.tournament_id;
        let _guard = self.locks.acquire(tournament_id).await;

        let result = self.try_report(tournament_id, match_id, winner).await;
        if let Err(TournamentError::InternalConsistency(detail)) = &result {
            self.cancel_inconsistent(tournament_id, detail).await;
        }
        result
    }

    async fn try_report(
        &self,
        tournament_id: TournamentId,
        match_id: MatchId,
        winner: TeamId,
    ) -> TournamentResult<MatchReport> {
        let reported = self.matches.find_match(match_id).await?;
        let tournament = self.tournaments.load(tournament_id).await?;

        if tournament.status != TournamentStatus::InProgress {
            return Err(TournamentError::InvalidTransition {
                status: tournament.status,
                operation: "report a result for",
            });
        }
        if reported.status == MatchStatus::Finished {
            return Err(TournamentError::MatchAlreadyFinished(match_id));
        }
        if reported.is_bye() || !reported.involves(winner) {
            return Err(TournamentError::InvalidWinner {
                match_id,
                team_id: winner,
            });
        }
        if reported.round != tournament.current_round {
            return Err(TournamentError::InternalConsistency(format!(
                "match {match_id} of round {} is still open while tournament {tournament_id} is in round {}",
                reported.round, tournament.current_round
            )));
        }

        let recorded = self.matches.record_result(match_id, winner).await?;
        if let Some(loser) = recorded.loser() {
            self.registry.mark_finished(tournament_id, &[loser]).await?;
        }
        info!(
            "Match {} of tournament {} won by team {}",
            match_id, tournament_id, winner
        );

        let round_complete = !self
            .matches
            .has_unfinished_matches(tournament_id, recorded.round)
            .await?;
        let transition = if round_complete {
            Some(retry_on_conflict(|| self.try_begin_or_advance(tournament_id)).await?)
        } else {
            None
        };

        Ok(MatchReport {
            recorded,
            transition,
        })
    }

    /// Matches of the tournament's current round, empty before the start
    pub async fn current_round_matches(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Vec<Match>> {
        let tournament = self.tournaments.load(tournament_id).await?;
        if tournament.current_round == 0 {
            return Ok(Vec::new());
        }
        self.matches
            .matches_for_round(tournament_id, tournament.current_round)
            .await
    }

    /// Tournaments with deadlines still to fire (OPEN or CLOSED)
    pub async fn pending_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        self.tournaments.pending_tournaments().await
    }

    /// Finished tournaments of a region with their winners
    pub async fn tournament_history(
        &self,
        region: &str,
    ) -> TournamentResult<Vec<TournamentHistoryEntry>> {
        let finished = self.tournaments.finished_in_region(region).await?;
        let mut history = Vec::with_capacity(finished.len());
        for tournament in &finished {
            let registered = self.registry.registered_teams(tournament.id).await?;
            history.push(progress::history_entry(tournament, &registered));
        }
        Ok(history)
    }
}
