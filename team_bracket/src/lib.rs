//! # Team Bracket
//!
//! Progression engine for single-elimination team tournaments.
//!
//! A tournament moves OPEN → CLOSED → IN_PROGRESS → FINISHED, or to
//! CANCELLED from any non-terminal status. Each round pairs the surviving
//! teams by strength; an odd pool gives one team a bye, and no team gets a
//! second bye while another still has none. The bracket ends when a single
//! team remains.
//!
//! ## Core Modules
//!
//! - [`tournament`]: State machine, pairing engine and round progression
//! - [`db`]: Storage traits with PostgreSQL and in-memory implementations
//!
//! The engine arms no timers itself. Deadline-driven transitions arrive through
//! [`TournamentManager::close_registration_now`] and
//! [`TournamentManager::begin_now`], invoked by whatever scheduler hosts it.

/// Storage traits and implementations.
pub mod db;

/// Tournament state machine and pairing.
pub mod tournament;

pub use tournament::{
    BracketConfig, Match, MatchDraft, Team, TeamId, Tournament, TournamentError, TournamentId,
    TournamentManager, TournamentResult, TournamentStatus, Transition,
};
