//! Tournament error types.

use thiserror::Error;

use super::models::{MatchId, TeamId, TournamentId, TournamentStatus};

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Tournament not found
    #[error("Tournament not found: {0}")]
    NotFound(TournamentId),

    /// Match not found
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    /// Team not found
    #[error("Team not found: {0}")]
    TeamNotFound(TeamId),

    /// Current status does not allow the operation
    #[error("Cannot {operation} a tournament that is {status}")]
    InvalidTransition {
        status: TournamentStatus,
        operation: &'static str,
    },

    /// Unfinished matches block advancement
    #[error("Round {round} still has unfinished matches")]
    RoundNotFinished { round: u32 },

    /// Fewer registrants than the configured minimum
    #[error("Insufficient teams: need {needed}, have {current}")]
    InsufficientTeams { needed: usize, current: usize },

    /// Stored state contradicts an engine invariant
    #[error("Internal consistency error: {0}")]
    InternalConsistency(String),

    /// Lost an optimistic concurrency race
    #[error("Tournament {0} was modified concurrently")]
    ConcurrentModification(TournamentId),

    /// Registration cap reached
    #[error("Tournament is full ({registered}/{max})")]
    TournamentFull { registered: usize, max: u32 },

    /// Team already registered
    #[error("Team {0} is already registered")]
    AlreadyRegistered(TeamId),

    /// Team has no registration for the tournament
    #[error("Team {team_id} is not registered for tournament {tournament_id}")]
    NotRegistered {
        tournament_id: TournamentId,
        team_id: TeamId,
    },

    /// Team plays in a different region than the tournament
    #[error("Team {team_id} plays in region {team_region}, tournament is in {tournament_region}")]
    RegionMismatch {
        team_id: TeamId,
        team_region: String,
        tournament_region: String,
    },

    /// Registration is locked or the deadline has passed
    #[error("Registration is closed for tournament {0}")]
    RegistrationClosed(TournamentId),

    /// Start time has passed
    #[error("Tournament {0} has already started")]
    AlreadyStarted(TournamentId),

    /// Rejected tournament parameters
    #[error("Invalid tournament: {0}")]
    InvalidTournament(String),

    /// Result already reported
    #[error("Match {0} has already finished")]
    MatchAlreadyFinished(MatchId),

    /// Reported winner does not play in the match
    #[error("Team {team_id} does not play in match {match_id}")]
    InvalidWinner { match_id: MatchId, team_id: TeamId },
}

impl TournamentError {
    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database and consistency errors are reported generically; the details
    /// only go to the log.
    pub fn client_message(&self) -> String {
        match self {
            TournamentError::Database(_) => "Internal server error".to_string(),
            TournamentError::InternalConsistency(_) => {
                "Tournament data is inconsistent and the tournament was cancelled".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Expected rejections caused by the caller or by the tournament's state.
    /// These are returned for display and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TournamentError::InvalidTransition { .. }
                | TournamentError::RoundNotFinished { .. }
                | TournamentError::InsufficientTeams { .. }
                | TournamentError::TournamentFull { .. }
                | TournamentError::AlreadyRegistered(_)
                | TournamentError::NotRegistered { .. }
                | TournamentError::RegistrationClosed(_)
                | TournamentError::RegionMismatch { .. }
                | TournamentError::AlreadyStarted(_)
                | TournamentError::InvalidTournament(_)
                | TournamentError::MatchAlreadyFinished(_)
                | TournamentError::InvalidWinner { .. }
        )
    }
}

/// Result type for tournament operations
pub type TournamentResult<T> = Result<T, TournamentError>;
