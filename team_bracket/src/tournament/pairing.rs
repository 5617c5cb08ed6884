//! Round pairing with a single non-repeating bye.
//!
//! Teams are ordered strongest first and paired with their neighbour in that
//! order (1v2, 3v4, ...). This is a ladder, not a cross-bracket seeding: the
//! two strongest survivors meet as early as possible. When the pool is odd the
//! weakest team that has not yet had a bye advances without playing.
//!
//! Everything here is pure. Persisting drafts and recording the bye belong to
//! [`TournamentManager`](super::TournamentManager).

use std::cmp::Ordering;
use std::collections::HashSet;

use super::models::{MatchDraft, Team, TeamId, TournamentId};

/// Strongest first; equal strengths keep registration order, then id order.
pub fn strength_order(a: &Team, b: &Team) -> Ordering {
    b.strength
        .total_cmp(&a.strength)
        .then_with(|| a.registered_at.cmp(&b.registered_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort teams in pairing order
pub fn sort_by_strength(teams: &mut [Team]) {
    teams.sort_by(strength_order);
}

/// Index of the bye recipient in a pool already in pairing order.
///
/// Returns `None` for an even pool. Scans from the weakest team upward and
/// picks the first without a previous bye. If every team has had one, the
/// weakest gets a second.
pub fn select_bye(sorted: &[Team], bye_history: &HashSet<TeamId>) -> Option<usize> {
    if sorted.len() % 2 == 0 {
        return None;
    }

    sorted
        .iter()
        .rposition(|team| !bye_history.contains(&team.id))
        .or(Some(sorted.len() - 1))
}

/// Produce the match drafts for `round`.
///
/// Fewer than two teams yield no drafts. An odd pool yields exactly one bye
/// draft, listed first, followed by the adjacent-strength pairings.
pub fn generate_pairings(
    tournament_id: TournamentId,
    teams: &[Team],
    round: u32,
    bye_history: &HashSet<TeamId>,
) -> Vec<MatchDraft> {
    if teams.len() < 2 {
        return Vec::new();
    }

    let mut pool = teams.to_vec();
    sort_by_strength(&mut pool);

    let mut drafts = Vec::with_capacity(pool.len() / 2 + 1);

    if let Some(index) = select_bye(&pool, bye_history) {
        let team = pool.remove(index);
        drafts.push(MatchDraft::bye(tournament_id, round, team.id));
    }

    drafts.extend(
        pool.chunks_exact(2)
            .map(|pair| MatchDraft::pairing(tournament_id, round, pair[0].id, pair[1].id)),
    );

    drafts
}

/// The team awarded a bye by these drafts, if any
pub fn bye_recipient(drafts: &[MatchDraft]) -> Option<TeamId> {
    drafts.iter().find(|draft| draft.is_bye()).map(|draft| draft.team_a)
}

/// First team id that appears more than once, if any
pub fn find_duplicate(teams: &[Team]) -> Option<TeamId> {
    let mut seen = HashSet::with_capacity(teams.len());
    teams
        .iter()
        .find(|team| !seen.insert(team.id))
        .map(|team| team.id)
}
