//! PostgreSQL implementations of the storage traits.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use super::repository::{MatchStore, TeamRegistry, TournamentStore};
use crate::tournament::{
    Match, MatchDraft, MatchId, MatchStatus, NewTournament, Registration, Team, TeamId,
    Tournament, TournamentError, TournamentId, TournamentResult, TournamentStatus,
};

const TOURNAMENT_COLUMNS: &str = "id, name, region, status, current_round, max_teams, \
     registration_deadline, start_time, winner_team_id, cancel_reason, version, created_at";

const MATCH_COLUMNS: &str =
    "id, tournament_id, round, team_a_id, team_b_id, winner_team_id, status, external_ref";

fn tournament_from_row(row: &PgRow) -> TournamentResult<Tournament> {
    let status: String = row.get("status");
    let status = TournamentStatus::parse(&status).ok_or_else(|| {
        TournamentError::InternalConsistency(format!("unknown tournament status '{status}'"))
    })?;

    Ok(Tournament {
        id: row.get("id"),
        name: row.get("name"),
        region: row.get("region"),
        status,
        current_round: row.get::<i32, _>("current_round") as u32,
        max_teams: row.get::<Option<i32>, _>("max_teams").map(|m| m as u32),
        registration_deadline: row.get("registration_deadline"),
        start_time: row.get("start_time"),
        winner: row.get("winner_team_id"),
        cancel_reason: row.get("cancel_reason"),
        version: row.get("version"),
        created_at: row.get("created_at"),
    })
}

fn match_from_row(row: &PgRow) -> TournamentResult<Match> {
    let status: String = row.get("status");
    let status = MatchStatus::parse(&status).ok_or_else(|| {
        TournamentError::InternalConsistency(format!("unknown match status '{status}'"))
    })?;

    Ok(Match {
        id: row.get("id"),
        tournament_id: row.get("tournament_id"),
        round: row.get::<i32, _>("round") as u32,
        team_a: row.get("team_a_id"),
        team_b: row.get("team_b_id"),
        winner: row.get("winner_team_id"),
        status,
        external_ref: row.get("external_ref"),
    })
}

fn registration_from_row(row: &PgRow) -> Registration {
    Registration {
        tournament_id: row.get("tournament_id"),
        team_id: row.get("team_id"),
        registered_at: row.get("registered_at"),
        has_received_bye: row.get("has_received_bye"),
        has_finished_tournament: row.get("has_finished_tournament"),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_foreign_key_violation())
}

/// PostgreSQL implementation of `TournamentStore`
#[derive(Clone)]
pub struct PgTournamentStore {
    pool: PgPool,
}

impl PgTournamentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TournamentStore for PgTournamentStore {
    async fn create(&self, new: &NewTournament) -> TournamentResult<Tournament> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO tournaments (name, region, status, max_teams, registration_deadline, start_time)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TOURNAMENT_COLUMNS}
            "#
        ))
        .bind(&new.name)
        .bind(&new.region)
        .bind(TournamentStatus::Open.as_str())
        .bind(new.max_teams.map(|m| m as i32))
        .bind(new.registration_deadline)
        .bind(new.start_time)
        .fetch_one(&self.pool)
        .await?;

        tournament_from_row(&row)
    }

    async fn load(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        let row = sqlx::query(&format!(
            "SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1"
        ))
        .bind(tournament_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TournamentError::NotFound(tournament_id))?;

        tournament_from_row(&row)
    }

    async fn save(&self, tournament: &Tournament) -> TournamentResult<Tournament> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE tournaments
            SET status = $1, current_round = $2, winner_team_id = $3, cancel_reason = $4,
                version = version + 1
            WHERE id = $5 AND version = $6
            RETURNING {TOURNAMENT_COLUMNS}
            "#
        ))
        .bind(tournament.status.as_str())
        .bind(tournament.current_round as i32)
        .bind(tournament.winner)
        .bind(&tournament.cancel_reason)
        .bind(tournament.id)
        .bind(tournament.version)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => tournament_from_row(&row),
            None => {
                // Distinguish a stale version from a missing row.
                self.load(tournament.id).await?;
                Err(TournamentError::ConcurrentModification(tournament.id))
            }
        }
    }

    async fn pending_tournaments(&self) -> TournamentResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TOURNAMENT_COLUMNS}
            FROM tournaments
            WHERE status IN ('open', 'closed')
            ORDER BY id
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tournament_from_row).collect()
    }

    async fn finished_in_region(&self, region: &str) -> TournamentResult<Vec<Tournament>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TOURNAMENT_COLUMNS}
            FROM tournaments
            WHERE status = 'finished' AND region = $1
            ORDER BY start_time DESC NULLS LAST, id DESC
            "#
        ))
        .bind(region)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tournament_from_row).collect()
    }

    async fn delete(&self, tournament_id: TournamentId) -> TournamentResult<()> {
        // Registrations and matches cascade.
        let result = sqlx::query("DELETE FROM tournaments WHERE id = $1")
            .bind(tournament_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(TournamentError::NotFound(tournament_id));
        }
        Ok(())
    }
}

/// PostgreSQL implementation of `TeamRegistry`
#[derive(Clone)]
pub struct PgTeamRegistry {
    pool: PgPool,
}

impl PgTeamRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRegistry for PgTeamRegistry {
    async fn registered_teams(&self, tournament_id: TournamentId) -> TournamentResult<Vec<Team>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.region, t.strength, r.registered_at
            FROM tournament_registrations r
            JOIN teams t ON t.id = r.team_id
            WHERE r.tournament_id = $1
            ORDER BY r.registered_at, t.id
            "#,
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Team {
                id: row.get("id"),
                name: row.get("name"),
                region: row.get("region"),
                strength: row.get("strength"),
                registered_at: row.get("registered_at"),
            })
            .collect())
    }

    async fn has_received_bye(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<bool> {
        let row = sqlx::query(
            "SELECT has_received_bye FROM tournament_registrations WHERE tournament_id = $1 AND team_id = $2",
        )
        .bind(tournament_id)
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TournamentError::NotRegistered {
            tournament_id,
            team_id,
        })?;

        Ok(row.get("has_received_bye"))
    }

    async fn mark_bye_received(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()> {
        let result = sqlx::query(
            "UPDATE tournament_registrations SET has_received_bye = TRUE WHERE tournament_id = $1 AND team_id = $2",
        )
        .bind(tournament_id)
        .bind(team_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TournamentError::NotRegistered {
                tournament_id,
                team_id,
            });
        }
        Ok(())
    }

    async fn team_region(&self, team_id: TeamId) -> TournamentResult<String> {
        let row = sqlx::query("SELECT region FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TournamentError::TeamNotFound(team_id))?;

        Ok(row.get("region"))
    }

    async fn register_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
        registered_at: DateTime<Utc>,
    ) -> TournamentResult<Registration> {
        let row = sqlx::query(
            r#"
            INSERT INTO tournament_registrations (tournament_id, team_id, registered_at)
            VALUES ($1, $2, $3)
            RETURNING tournament_id, team_id, registered_at, has_received_bye, has_finished_tournament
            "#,
        )
        .bind(tournament_id)
        .bind(team_id)
        .bind(registered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                TournamentError::AlreadyRegistered(team_id)
            } else if is_foreign_key_violation(&e) {
                TournamentError::TeamNotFound(team_id)
            } else {
                TournamentError::Database(e)
            }
        })?;

        Ok(registration_from_row(&row))
    }

    async fn withdraw_team(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<()> {
        let result = sqlx::query(
            "DELETE FROM tournament_registrations WHERE tournament_id = $1 AND team_id = $2",
        )
        .bind(tournament_id)
        .bind(team_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TournamentError::NotRegistered {
                tournament_id,
                team_id,
            });
        }
        Ok(())
    }

    async fn registration_count(&self, tournament_id: TournamentId) -> TournamentResult<usize> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM tournament_registrations WHERE tournament_id = $1",
        )
        .bind(tournament_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count") as usize)
    }

    async fn registration(
        &self,
        tournament_id: TournamentId,
        team_id: TeamId,
    ) -> TournamentResult<Option<Registration>> {
        let row = sqlx::query(
            r#"
            SELECT tournament_id, team_id, registered_at, has_received_bye, has_finished_tournament
            FROM tournament_registrations
            WHERE tournament_id = $1 AND team_id = $2
            "#,
        )
        .bind(tournament_id)
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(registration_from_row))
    }

    async fn mark_finished(
        &self,
        tournament_id: TournamentId,
        team_ids: &[TeamId],
    ) -> TournamentResult<()> {
        sqlx::query(
            r#"
            UPDATE tournament_registrations
            SET has_finished_tournament = TRUE
            WHERE tournament_id = $1 AND team_id = ANY($2)
            "#,
        )
        .bind(tournament_id)
        .bind(team_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// PostgreSQL implementation of `MatchStore`
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn create_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
        drafts: &[MatchDraft],
    ) -> TournamentResult<Vec<Match>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let row = sqlx::query(&format!(
                r#"
                INSERT INTO matches (tournament_id, round, team_a_id, team_b_id, winner_team_id, status, external_ref)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING {MATCH_COLUMNS}
                "#
            ))
            .bind(tournament_id)
            .bind(round as i32)
            .bind(draft.team_a)
            .bind(draft.team_b)
            .bind(draft.winner)
            .bind(draft.status.as_str())
            .bind(&draft.external_ref)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TournamentError::InternalConsistency(format!(
                        "round {round} of tournament {tournament_id} already has match {}",
                        draft.external_ref
                    ))
                } else {
                    TournamentError::Database(e)
                }
            })?;

            created.push(match_from_row(&row)?);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn matches_for_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<Vec<Match>> {
        let rows = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM matches WHERE tournament_id = $1 AND round = $2 ORDER BY id"
        ))
        .bind(tournament_id)
        .bind(round as i32)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    async fn has_unfinished_matches(
        &self,
        tournament_id: TournamentId,
        round: u32,
    ) -> TournamentResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM matches
                WHERE tournament_id = $1 AND round = $2 AND status <> 'finished'
            ) AS pending
            "#,
        )
        .bind(tournament_id)
        .bind(round as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("pending"))
    }

    async fn find_match(&self, match_id: MatchId) -> TournamentResult<Match> {
        let row = sqlx::query(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
            .bind(match_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TournamentError::MatchNotFound(match_id))?;

        match_from_row(&row)
    }

    async fn record_result(&self, match_id: MatchId, winner: TeamId) -> TournamentResult<Match> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE matches
            SET winner_team_id = $1, status = 'finished'
            WHERE id = $2 AND status = 'scheduled'
            RETURNING {MATCH_COLUMNS}
            "#
        ))
        .bind(winner)
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => match_from_row(&row),
            None => {
                self.find_match(match_id).await?;
                Err(TournamentError::MatchAlreadyFinished(match_id))
            }
        }
    }
}
