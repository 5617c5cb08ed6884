//! Tournament, registration and match records.
//!
//! Records reference each other by id only. A match stores the ids of its
//! tournament and teams, never the records themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{TournamentError, TournamentResult};

/// Tournament ID type
pub type TournamentId = i64;

/// Team ID type
pub type TeamId = i64;

/// Match ID type
pub type MatchId = i64;

/// Tournament lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Accepting registrations
    Open,
    /// Registration locked, bracket not started
    Closed,
    /// Bracket running
    InProgress,
    /// A winner has been recorded
    Finished,
    /// Abandoned before a winner was found
    Cancelled,
}

impl TournamentStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Open => "open",
            TournamentStatus::Closed => "closed",
            TournamentStatus::InProgress => "in_progress",
            TournamentStatus::Finished => "finished",
            TournamentStatus::Cancelled => "cancelled",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(TournamentStatus::Open),
            "closed" => Some(TournamentStatus::Closed),
            "in_progress" => Some(TournamentStatus::InProgress),
            "finished" => Some(TournamentStatus::Finished),
            "cancelled" => Some(TournamentStatus::Cancelled),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TournamentStatus::Finished | TournamentStatus::Cancelled)
    }

    /// Statuses that still have deadlines waiting to fire.
    pub fn is_pending(&self) -> bool {
        matches!(self, TournamentStatus::Open | TournamentStatus::Closed)
    }
}

impl std::fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tournament record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub region: String,
    pub status: TournamentStatus,
    /// 0 until the bracket starts, never decreases
    pub current_round: u32,
    pub max_teams: Option<u32>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    /// Set iff `status == Finished`
    pub winner: Option<TeamId>,
    pub cancel_reason: Option<String>,
    /// Optimistic concurrency stamp, bumped by every successful save
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Tournament {
    /// Whether registration is still accepted at `now`
    pub fn accepts_registrations(&self, now: DateTime<Utc>) -> bool {
        self.status == TournamentStatus::Open
            && self.registration_deadline.is_none_or(|deadline| now <= deadline)
    }

    /// Whether the configured start time has passed at `now`
    pub fn has_start_passed(&self, now: DateTime<Utc>) -> bool {
        self.start_time.is_some_and(|start| now >= start)
    }
}

/// Parameters for creating a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTournament {
    pub name: String,
    pub region: String,
    pub max_teams: Option<u32>,
    pub registration_deadline: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
}

impl NewTournament {
    /// Create an open-ended tournament with no deadlines
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            max_teams: None,
            registration_deadline: None,
            start_time: None,
        }
    }

    /// Cap the number of registered teams
    pub fn with_max_teams(mut self, max_teams: u32) -> Self {
        self.max_teams = Some(max_teams);
        self
    }

    /// Set the registration deadline and start time
    pub fn with_schedule(
        mut self,
        registration_deadline: Option<DateTime<Utc>>,
        start_time: Option<DateTime<Utc>>,
    ) -> Self {
        self.registration_deadline = registration_deadline;
        self.start_time = start_time;
        self
    }

    /// Validate before the record is created
    pub fn validate(&self) -> TournamentResult<()> {
        if self.name.trim().is_empty() {
            return Err(TournamentError::InvalidTournament(
                "name must not be empty".to_string(),
            ));
        }

        if let Some(max_teams) = self.max_teams.filter(|max| *max < 2) {
            return Err(TournamentError::InvalidTournament(format!(
                "max teams must be at least 2, got {max_teams}"
            )));
        }

        if let (Some(deadline), Some(start)) = (self.registration_deadline, self.start_time) {
            if start < deadline {
                return Err(TournamentError::InvalidTournament(format!(
                    "start time {start} is before the registration deadline {deadline}"
                )));
            }
        }

        Ok(())
    }
}

/// Link between a team and a tournament
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub tournament_id: TournamentId,
    pub team_id: TeamId,
    pub registered_at: DateTime<Utc>,
    /// Monotonic: never reset once set
    pub has_received_bye: bool,
    pub has_finished_tournament: bool,
}

/// A registered team as seen by the pairing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Teams may only enter tournaments of their own region
    pub region: String,
    /// Externally computed score, only used for ordering
    pub strength: f64,
    /// Registration time, the tie-breaker between equal strengths
    pub registered_at: DateTime<Utc>,
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    Scheduled,
    Finished,
}

impl MatchStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Finished => "finished",
        }
    }

    /// Parse the storage representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(MatchStatus::Scheduled),
            "finished" => Some(MatchStatus::Finished),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub round: u32,
    pub team_a: TeamId,
    /// `None` only for a bye
    pub team_b: Option<TeamId>,
    /// Set iff `status == Finished`
    pub winner: Option<TeamId>,
    pub status: MatchStatus,
    pub external_ref: String,
}

impl Match {
    pub fn is_bye(&self) -> bool {
        self.team_b.is_none()
    }

    /// Whether `team_id` plays in this match
    pub fn involves(&self, team_id: TeamId) -> bool {
        self.team_a == team_id || self.team_b == Some(team_id)
    }

    /// The team knocked out by this match, if it has been decided
    pub fn loser(&self) -> Option<TeamId> {
        let team_b = self.team_b?;
        match self.winner? {
            winner if winner == self.team_a => Some(team_b),
            winner if winner == team_b => Some(self.team_a),
            _ => None,
        }
    }
}

/// A match that has been paired but not yet persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDraft {
    pub tournament_id: TournamentId,
    pub round: u32,
    pub team_a: TeamId,
    pub team_b: Option<TeamId>,
    pub winner: Option<TeamId>,
    pub status: MatchStatus,
    pub external_ref: String,
}

impl MatchDraft {
    /// A scheduled match between two teams
    pub fn pairing(tournament_id: TournamentId, round: u32, team_a: TeamId, team_b: TeamId) -> Self {
        Self {
            tournament_id,
            round,
            team_a,
            team_b: Some(team_b),
            winner: None,
            status: MatchStatus::Scheduled,
            external_ref: format!("T{tournament_id}-R{round}-{team_a}-{team_b}"),
        }
    }

    /// An automatic advancement, created already finished
    pub fn bye(tournament_id: TournamentId, round: u32, team: TeamId) -> Self {
        Self {
            tournament_id,
            round,
            team_a: team,
            team_b: None,
            winner: Some(team),
            status: MatchStatus::Finished,
            external_ref: format!("T{tournament_id}-R{round}-{team}-BYE"),
        }
    }

    pub fn is_bye(&self) -> bool {
        self.team_b.is_none()
    }
}

/// Outcome of a state machine operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// OPEN -> CLOSED
    RegistrationClosed,
    /// Round 1 generated
    Started { round: u32, matches: Vec<Match> },
    /// A later round generated
    Advanced { round: u32, matches: Vec<Match> },
    /// One team left
    Finished { winner: TeamId },
    Cancelled,
    /// The requested transition had already happened or does not apply
    NoOp {
        status: TournamentStatus,
        current_round: u32,
    },
}

impl Transition {
    pub fn is_noop(&self) -> bool {
        matches!(self, Transition::NoOp { .. })
    }
}

/// Result of reporting a match outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReport {
    pub recorded: Match,
    /// Set when the report completed the round and the bracket moved on
    pub transition: Option<Transition>,
}

/// Finished tournament summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TournamentHistoryEntry {
    pub tournament_id: TournamentId,
    pub name: String,
    pub region: String,
    pub start_time: Option<DateTime<Utc>>,
    pub winner: Option<TeamId>,
    pub winner_name: Option<String>,
}
