//! Single-elimination tournament progression.
//!
//! This module provides:
//! - The tournament state machine (OPEN, CLOSED, IN_PROGRESS, FINISHED, CANCELLED)
//! - Round advancement from finished match results
//! - Strength-ordered pairing with a single non-repeating bye
//! - Deadline callbacks for an external scheduler
//!
//! ## Example
//!
//! ```no_run
//! use team_bracket::db::InMemoryStore;
//! use team_bracket::tournament::{BracketConfig, NewTournament, TournamentManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryStore::new();
//!     for id in 1..=4 {
//!         store.upsert_team(id, format!("Team {id}"), "EUW", id as f64);
//!     }
//!
//!     let manager = TournamentManager::in_memory(store, BracketConfig::default());
//!     let cup = manager
//!         .create_tournament(NewTournament::new("Spring Cup", "EUW"))
//!         .await?;
//!     for id in 1..=4 {
//!         manager.register_team(cup.id, id).await?;
//!     }
//!
//!     let started = manager.begin_or_advance(cup.id).await?;
//!     println!("{started:?}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod errors;
pub mod locks;
pub mod manager;
pub mod models;
pub mod pairing;
pub mod progress;

pub use config::{BracketConfig, DEFAULT_MIN_TEAMS};
pub use errors::{TournamentError, TournamentResult};
pub use locks::{TournamentGuard, TournamentLocks};
pub use manager::TournamentManager;
pub use models::{
    Match, MatchDraft, MatchId, MatchReport, MatchStatus, NewTournament, Registration, Team,
    TeamId, Tournament, TournamentHistoryEntry, TournamentId, TournamentStatus, Transition,
};
pub use pairing::generate_pairings;
