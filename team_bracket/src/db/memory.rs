//! In-memory implementation of the storage traits.
//!
//! Backs tests, benches and local runs without PostgreSQL. One value
//! implements all three traits; clones share the same state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::repository::{MatchStore, TeamRegistry, TournamentStore};
use crate::tournament::{
    Match, MatchDraft, MatchId, MatchStatus, NewTournament, Registration, Team, TeamId,
    Tournament, TournamentError, TournamentId, TournamentResult, TournamentStatus,
};

#[derive(Debug, Clone)]
struct TeamRecord {
    name: String,
    region: String,
    strength: f64,
}

#[derive(Default)]
struct State {
    teams: HashMap<TeamId, TeamRecord>,
    tournaments: BTreeMap<TournamentId, Tournament>,
    registrations: BTreeMap<(TournamentId, TeamId), Registration>,
    matches: BTreeMap<MatchId, Match>,
    next_tournament_id: TournamentId,
    next_match_id: MatchId,
}

/// Shared in-memory store
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add or replace a team, its region and its strength score
    pub fn upsert_team(
        &self,
        team_id: TeamId,
        name: impl Into<String>,
        region: impl Into<String>,
        strength: f64,
    ) {
        self.state().teams.insert(
            team_id,
            TeamRecord {
                name: name.into(),
                region: region.into(),
                strength,
            },
        );
    }

    /// Update a team's strength score
    pub fn set_strength(&self, team_id: TeamId, strength: f64) -> TournamentResult<()> {
        let mut state = self.state();
        let team = state
            .teams
            .get_mut(&team_id)
            .ok_or(TournamentError::TeamNotFound(team_id))?;
        team.strength = strength;
        Ok(())
    }

    /// Overwrite a stored match, bypassing result validation
    pub fn put_match(&self, m: Match) {
        self.state().matches.insert(m.id, m);
    }

    /// Every match of a tournament, in creation order
    pub fn all_matches(&self, tournament_id: TournamentId) -> Vec<Match> {
        self.state()
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TournamentStore for InMemoryStore {
    async fn create(&self, new: &NewTournament) -> TournamentResult<Tournament> {
        let mut state = self.state();
        state.next_tournament_id += 1;
        let tournament = Tournament {
            id: state.next_tournament_id,
            name: new.name.clone(),
            region: new.region.clone(),
            status: TournamentStatus::Open,
            current_round: 0,
            max_teams: new.max_teams,
            registration_deadline: new.registration_deadline,
            start_time: new.start_time,
            winner: None,
            cancel_reason: None,
            version: 0,
            created_at: Utc::now(),
        };
        state.tournaments.insert(tournament.id, tournament.clone());
        Ok(tournament)
    }

    async fn load(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        self.state()
            .tournaments
            .get(&tournament_id)
            .cloned()
            .ok_or(TournamentError::NotFound(tournament_id))
    }

    async fn save(&self, tournament: &Tournament) -> TournamentResult<Tournament> {
        let mut state = self.state();
        let stored = state
            .tournaments
            .get_mut(&tournament.id)
            .ok_or(TournamentError::NotFound(tournament.id))?;

        if stored.version != tournament.version {
            return Err(TournamentError::ConcurrentModification(tournament.id));
        }

        let mut saved = tournament.clone();
        saved.version += 1;
        *stored = saved.clone();
        Ok(saved)
    }

    async fn delete(&self, tournament_id: TournamentId) -> TournamentResult<()> {
        let mut state = self.state();
        if state.tournaments.remove(&tournament_id).is_none() {
            return Err(TournamentError::NotFound(tournament_id));
        }
        state
            .registrations
            .retain(|(registered_in, _), _| *registered_in != tournament_id);
        state
            .matches
            .retain(|_, m| m.tournament_id != tournament_id);
        Ok(())
    }

    async fn pending_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        Ok(self
            .state()
            .tournaments
            .values()
            .filter(|t| t.status.is_pending())
            .cloned()
            .collect())
    }

    async fn finished_in_region(&self, region: &str) -> TournamentResult<Vec<Tournament>> {
        let mut finished: Vec<Tournament> = self
            .state()
            .tournaments
            .values()
            .filter(|t| t.status == TournamentStatus::Finished && t.region == region)
            .cloned()
            .collect();
        finished.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(finished)
    }
}

#[async_trait]
impl TeamRegistry for InMemoryStore {
    async fn registered_teams(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Team>> {
        let state = self.state();
        let mut teams = state
            .registrations
            .values()
            .filter(|r| r.tournament_id == tournament_id)
            .map(|r| {
                let record = state
                    .teams
                    .get(&r.team_id)
                    .ok_or(TournamentError::TeamNotFound(r.team_id))?;
                Ok(Team {
                    id: r.team_id,
                    name: record.name.clone(),
                    region: record.region.clone(),
                    strength: record.strength,
                    registered_at: r.registered_at,
                })
            })
            .collect::<TournamentResult<Vec<Team>>>()?;
        teams.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        Ok(teams)
    }

    async fn has_received_bye(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<bool> {
        self.state()
            .registrations
            .get(&(tournament_id, team_id))
            .map(|r| r.has_received_bye)
            .ok_or(TournamentError::NotRegistered {
                tournament_id,
                team_id,
            })
    }

    async fn mark_bye_received(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()> {
        let mut state = self.state();
        let registration = state
            .registrations
            .get_mut(&(tournament_id, team_id))
            .ok_or(TournamentError::NotRegistered {
                tournament_id,
                team_id,
            })?;
        registration.has_received_bye = true;
        Ok(())
    }

    async fn team_region(&self, team_id: TeamId) -> TournamentResult<String> {
        self.state()
            .teams
            .get(&team_id)
            .map(|team| team.region.clone())
            .ok_or(TournamentError::TeamNotFound(team_id))
    }

    async fn register_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
        registered_at: DateTime<Utc>,
    ) -> TournamentResult<Registration> {
        let mut state = self.state();
        if !state.tournaments.contains_key(&tournament_id) {
            return Err(TournamentError::NotFound(tournament_id));
        }
        if !state.teams.contains_key(&team_id) {
            return Err(TournamentError::TeamNotFound(team_id));
        }
        if state.registrations.contains_key(&(tournament_id, team_id)) {
            return Err(TournamentError::AlreadyRegistered(team_id));
        }

        let registration = Registration {
            tournament_id,
            team_id,
            registered_at,
            has_received_bye: false,
            has_finished_tournament: false,
        };
        state
            .registrations
            .insert((tournament_id, team_id), registration.clone());
        Ok(registration)
    }

    async fn withdraw_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()> {
        self.state()
            .registrations
            .remove(&(tournament_id, team_id))
            .map(|_| ())
            .ok_or(TournamentError::NotRegistered {
                tournament_id,
                team_id,
            })
    }

    async fn registration_count(&self, tournament_id: TournamentId) -> TournamentResult<usize> {
        Ok(self
            .state()
            .registrations
            .keys()
            .filter(|(t, _)| *t == tournament_id)
            .count())
    }

    async fn registration(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<Option<Registration>> {
        Ok(self
            .state()
            .registrations
            .get(&(tournament_id, team_id))
            .cloned())
    }

    async fn mark_finished(
        &self,
        tournament_id: TournamentId,
        team_ids: &[TeamId],
    ) -> TournamentResult<()> {
        let mut state = self.state();
        for team_id in team_ids {
            if let Some(registration) = state.registrations.get_mut(&(tournament_id, *team_id)) {
                registration.has_finished_tournament = true;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MatchStore for InMemoryStore {
    async fn create_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
        drafts: &[MatchDraft],
    ) -> TournamentResult<Vec<Match>> {
        let mut state = self.state();

        // Within a tournament and round each team plays at most once.
        let mut seen: HashSet<TeamId> = state
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id && m.round == round)
            .flat_map(|m| std::iter::once(m.team_a).chain(m.team_b))
            .collect();
        for draft in drafts {
            for team in std::iter::once(draft.team_a).chain(draft.team_b) {
                if !seen.insert(team) {
                    return Err(TournamentError::InternalConsistency(format!(
                        "team {team} would play twice in round {round} of tournament {tournament_id}"
                    )));
                }
            }
        }

        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            state.next_match_id += 1;
            let m = Match {
                id: state.next_match_id,
                tournament_id,
                round,
                team_a: draft.team_a,
                team_b: draft.team_b,
                winner: draft.winner,
                status: draft.status,
                external_ref: draft.external_ref.clone(),
            };
            state.matches.insert(m.id, m.clone());
            created.push(m);
        }
        Ok(created)
    }

    async fn matches_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<Vec<Match>> {
        Ok(self
            .state()
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id && m.round == round)
            .cloned()
            .collect())
    }

    async fn has_unfinished_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<bool> {
        Ok(self.state().matches.values().any(|m| {
            m.tournament_id == tournament_id
                && m.round == round
                && m.status != MatchStatus::Finished
        }))
    }

    async fn find_match(&self, match_id: MatchId) -> TournamentResult<Match> {
        self.state()
            .matches
            .get(&match_id)
            .cloned()
            .ok_or(TournamentError::MatchNotFound(match_id))
    }

    async fn record_result(&self, match_id: MatchId, winner: TeamId) -> TournamentResult<Match> {
        let mut state = self.state();
        let m = state
            .matches
            .get_mut(&match_id)
            .ok_or(TournamentError::MatchNotFound(match_id))?;
        if m.status == MatchStatus::Finished {
            return Err(TournamentError::MatchAlreadyFinished(match_id));
        }
        m.winner = Some(winner);
        m.status = MatchStatus::Finished;
        Ok(m.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_rejects_stale_version() {
        let store = InMemoryStore::new();
        let created = store
            .create(&NewTournament::new("Cup", "EUW"))
            .await
            .unwrap();

        let mut first = created.clone();
        first.status = TournamentStatus::Closed;
        let saved = store.save(&first).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut stale = created;
        stale.status = TournamentStatus::Cancelled;
        assert!(matches!(
            store.save(&stale).await,
            Err(TournamentError::ConcurrentModification(_))
        ));
        assert_eq!(
            store.load(saved.id).await.unwrap().status,
            TournamentStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_registration_is_unique_per_team() {
        let store = InMemoryStore::new();
        store.upsert_team(1, "Alpha", "EUW", 10.0);
        let t = store
            .create(&NewTournament::new("Cup", "EUW"))
            .await
            .unwrap();

        store.register_team(t.id, 1, Utc::now()).await.unwrap();
        assert!(matches!(
            store.register_team(t.id, 1, Utc::now()).await,
            Err(TournamentError::AlreadyRegistered(1))
        ));
        assert_eq!(store.registration_count(t.id).await.unwrap(), 1);
        assert_eq!(store.team_region(1).await.unwrap(), "EUW");
        assert!(matches!(
            store.team_region(2).await,
            Err(TournamentError::TeamNotFound(2))
        ));
    }

    #[tokio::test]
    async fn test_create_matches_rejects_team_twice_in_round() {
        let store = InMemoryStore::new();
        let drafts = vec![MatchDraft::pairing(1, 1, 1, 2), MatchDraft::pairing(1, 1, 2, 3)];
        assert!(matches!(
            store.create_matches(1, 1, &drafts).await,
            Err(TournamentError::InternalConsistency(_))
        ));
        assert!(store.all_matches(1).is_empty());
    }

    #[tokio::test]
    async fn test_record_result_only_once() {
        let store = InMemoryStore::new();
        let created = store
            .create_matches(1, 1, &[MatchDraft::pairing(1, 1, 1, 2)])
            .await
            .unwrap();
        let id = created[0].id;

        assert!(store.has_unfinished_matches(1, 1).await.unwrap());
        store.record_result(id, 2).await.unwrap();
        assert!(!store.has_unfinished_matches(1, 1).await.unwrap());
        assert!(matches!(
            store.record_result(id, 1).await,
            Err(TournamentError::MatchAlreadyFinished(_))
        ));
    }
}
