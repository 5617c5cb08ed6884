//! Bracket policy configuration.

use serde::{Deserialize, Serialize};

/// Default minimum number of registered teams needed to start a bracket
pub const DEFAULT_MIN_TEAMS: usize = 4;

/// Policy knobs for the progression engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketConfig {
    /// Minimum registrants required at round-0 start
    pub min_teams: usize,
}

impl BracketConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `BRACKET_MIN_TEAMS`: Minimum teams to start a bracket (default: 4)
    pub fn from_env() -> Self {
        Self {
            min_teams: std::env::var("BRACKET_MIN_TEAMS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MIN_TEAMS),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.min_teams < 2 {
            return Err(format!(
                "min_teams must be at least 2, got {}",
                self.min_teams
            ));
        }
        Ok(())
    }
}

impl Default for BracketConfig {
    fn default() -> Self {
        Self {
            min_teams: DEFAULT_MIN_TEAMS,
        }
    }
}
