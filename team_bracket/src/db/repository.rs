//! Repository trait definitions for the engine's storage collaborators.
//!
//! The progression engine only talks to storage through these traits, so it
//! can run against PostgreSQL ([`super::postgres`]) or the in-memory store
//! ([`super::memory`]) unchanged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::tournament::{
    Match, MatchDraft, MatchId, NewTournament, Registration, Team, TeamId, Tournament,
    TournamentId, TournamentResult,
};

/// Trait for tournament record operations
#[async_trait]
pub trait TournamentStore: Send + Sync {
    /// Create a tournament in OPEN status
    async fn create(&self, new: &NewTournament) -> TournamentResult<Tournament>;

    /// Load a tournament, failing with `NotFound` if missing
    async fn load(&self, tournament_id: TournamentId) -> TournamentResult<Tournament>;

    /// Persist a tournament read earlier.
    ///
    /// Succeeds only if the stored `version` still equals `tournament.version`;
    /// otherwise fails with `ConcurrentModification`. Returns the record with
    /// its bumped version.
    async fn save(&self, tournament: &Tournament) -> TournamentResult<Tournament>;

    /// Delete a tournament with its registrations and matches,
    /// failing with `NotFound` if missing
    async fn delete(&self, tournament_id: TournamentId) -> TournamentResult<()>;

    /// Tournaments in OPEN or CLOSED status
    async fn pending_tournaments(&self) -> TournamentResult<Vec<Tournament>>;

    /// Finished tournaments of a region, most recent start first
    async fn finished_in_region(&self, region: &str) -> TournamentResult<Vec<Tournament>>;
}

/// Trait for tournament registration operations
#[async_trait]
pub trait TeamRegistry: Send + Sync {
    /// Teams registered for a tournament, in registration order
    async fn registered_teams(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Team>>;

    /// Whether the team has already advanced on a bye in this tournament
    async fn has_received_bye(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<bool>;

    /// Record that the team received a bye
    async fn mark_bye_received(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()>;

    /// Region a team plays in, failing with `TeamNotFound` if missing
    async fn team_region(&self, team_id: TeamId) -> TournamentResult<String>;

    /// Create a registration
    async fn register_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
        registered_at: DateTime<Utc>,
    ) -> TournamentResult<Registration>;

    /// Delete a registration
    async fn withdraw_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()>;

    /// Number of registrations
    async fn registration_count(&self, tournament_id: TournamentId) -> TournamentResult<usize>;

    /// Find a single registration
    async fn registration(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<Option<Registration>>;

    /// Flag the teams as done with the tournament
    async fn mark_finished(
        &self,
        tournament_id: TournamentId,
        team_ids: &[TeamId],
    ) -> TournamentResult<()>;
}

/// Trait for match operations
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Persist a round's drafts
    async fn create_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
        drafts: &[MatchDraft],
    ) -> TournamentResult<Vec<Match>>;

    /// Matches of a round, in creation order
    async fn matches_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<Vec<Match>>;

    /// Whether any match in the round is not yet FINISHED
    async fn has_unfinished_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<bool>;

    /// Load a match, failing with `MatchNotFound` if missing
    async fn find_match(&self, match_id: MatchId) -> TournamentResult<Match>;

    /// Mark a match finished with the given winner
    async fn record_result(&self, match_id: MatchId, winner: TeamId) -> TournamentResult<Match>;
}
