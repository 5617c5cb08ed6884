//! Round outcome helpers.

use std::collections::HashMap;

use super::models::{Match, MatchStatus, Team, TeamId, TournamentHistoryEntry, Tournament};

/// Winners of a completed round, in match order.
///
/// Fails with a description when a match is unfinished or finished without a
/// winner, or when the round is empty.
pub fn collect_winners(round: u32, matches: &[Match]) -> Result<Vec<TeamId>, String> {
    if matches.is_empty() {
        return Err(format!("round {round} has no matches"));
    }

    matches
        .iter()
        .map(|m| match (m.status, m.winner) {
            (MatchStatus::Finished, Some(winner)) => Ok(winner),
            (MatchStatus::Finished, None) => {
                Err(format!("match {} finished without a winner", m.id))
            }
            (MatchStatus::Scheduled, _) => Err(format!("match {} is still scheduled", m.id)),
        })
        .collect()
}

/// Teams knocked out by a round
pub fn eliminated_teams(matches: &[Match]) -> Vec<TeamId> {
    matches.iter().filter_map(Match::loser).collect()
}

/// Resolve winner ids to registered teams, keeping the winners' order
pub fn resolve_survivors(winners: &[TeamId], registered: &[Team]) -> Result<Vec<Team>, String> {
    let by_id: HashMap<TeamId, &Team> = registered.iter().map(|team| (team.id, team)).collect();

    winners
        .iter()
        .map(|id| {
            by_id
                .get(id)
                .map(|team| (*team).clone())
                .ok_or_else(|| format!("winner {id} is not registered for the tournament"))
        })
        .collect()
}

/// Build a history entry for a finished tournament
pub fn history_entry(tournament: &Tournament, registered: &[Team]) -> TournamentHistoryEntry {
    let winner_name = tournament.winner.and_then(|winner| {
        registered
            .iter()
            .find(|team| team.id == winner)
            .map(|team| team.name.clone())
    });

    TournamentHistoryEntry {
        tournament_id: tournament.id,
        name: tournament.name.clone(),
        region: tournament.region.clone(),
        start_time: tournament.start_time,
        winner: tournament.winner,
        winner_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn finished(id: i64, a: TeamId, b: Option<TeamId>, winner: Option<TeamId>) -> Match {
        Match {
            id,
            tournament_id: 1,
            round: 1,
            team_a: a,
            team_b: b,
            winner,
            status: MatchStatus::Finished,
            external_ref: format!("m{id}"),
        }
    }

    #[test]
    fn test_collect_winners_includes_byes() {
        let matches = vec![
            finished(1, 5, None, Some(5)),
            finished(2, 1, Some(2), Some(2)),
            finished(3, 3, Some(4), Some(3)),
        ];
        assert_eq!(collect_winners(1, &matches), Ok(vec![5, 2, 3]));
        assert_eq!(eliminated_teams(&matches), vec![1, 4]);
    }

    #[test]
    fn test_missing_winner_is_reported() {
        let matches = vec![finished(8, 1, Some(2), None)];
        let err = collect_winners(1, &matches).unwrap_err();
        assert!(err.contains("match 8"));
    }

    #[test]
    fn test_empty_round_is_reported() {
        assert!(collect_winners(3, &[]).is_err());
    }

    #[test]
    fn test_resolve_survivors_rejects_unknown_team() {
        let registered = vec![Team {
            id: 1,
            name: "Alpha".to_string(),
            region: "EUW".to_string(),
            strength: 1.0,
            registered_at: Utc::now(),
        }];
        assert_eq!(resolve_survivors(&[1], &registered).unwrap().len(), 1);
        assert!(resolve_survivors(&[1, 99], &registered).is_err());
    }
}
