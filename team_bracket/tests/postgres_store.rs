//! PostgreSQL store integration tests.
//!
//! These need a running database:
//!
//! ```text
//! DATABASE_URL=postgres://postgres@localhost/bracket_test cargo test -- --ignored
//! ```

use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use team_bracket::db::{
    Database, DatabaseConfig, MatchStore, PgMatchStore, PgTeamRegistry, PgTournamentStore,
    TeamRegistry, TournamentStore,
};
use team_bracket::tournament::{
    BracketConfig, MatchDraft, NewTournament, TeamId, TournamentError, TournamentManager,
    TournamentStatus, Transition,
};

/// Helper to create a migrated test database
async fn setup_test_db() -> Database {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/bracket_test".to_string());

    let config = DatabaseConfig {
        database_url,
        max_connections: 5,
        min_connections: 1,
        connection_timeout_secs: 5,
        idle_timeout_secs: 300,
        max_lifetime_secs: 1800,
    };

    let db = Database::new(&config)
        .await
        .expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to run migrations");
    db.health_check().await.expect("Health check failed");
    db
}

/// Insert teams with ids unique to this run and return them strongest first
async fn insert_teams(pool: &PgPool, region: &str, count: usize) -> Vec<TeamId> {
    let base = chrono::Utc::now().timestamp_micros() * 10;
    let mut ids = Vec::with_capacity(count);
    for index in 0..count {
        let id = base + index as i64;
        sqlx::query("INSERT INTO teams (id, name, region, strength) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(format!("pg team {index}"))
            .bind(region)
            .bind(100.0 - index as f64)
            .execute(pool)
            .await
            .expect("Failed to insert team");
        ids.push(id);
    }
    ids
}

fn manager_for(db: &Database) -> TournamentManager {
    let (tournaments, registry, matches) = db.stores();
    TournamentManager::new(
        Arc::new(tournaments),
        Arc::new(registry),
        Arc::new(matches),
        BracketConfig::default(),
    )
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_save_is_version_checked() {
    let db = setup_test_db().await;
    let store = PgTournamentStore::new(db.pool().clone());

    let created = store
        .create(&NewTournament::new("Versioned", "EUW"))
        .await
        .unwrap();
    assert_eq!(created.status, TournamentStatus::Open);

    let mut closed = created.clone();
    closed.status = TournamentStatus::Closed;
    let saved = store.save(&closed).await.unwrap();
    assert_eq!(saved.version, created.version + 1);

    let mut stale = created;
    stale.status = TournamentStatus::Cancelled;
    assert!(matches!(
        store.save(&stale).await,
        Err(TournamentError::ConcurrentModification(_))
    ));

    let mut missing = saved.clone();
    missing.id = -1;
    assert!(matches!(
        store.save(&missing).await,
        Err(TournamentError::NotFound(-1))
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_registration_errors_are_mapped() {
    let db = setup_test_db().await;
    let tournaments = PgTournamentStore::new(db.pool().clone());
    let registry = PgTeamRegistry::new(db.pool().clone());
    let teams = insert_teams(db.pool(), "EUW", 1).await;

    let t = tournaments
        .create(&NewTournament::new("Registrations", "EUW"))
        .await
        .unwrap();
    let now = chrono::Utc::now();

    registry.register_team(t.id, teams[0], now).await.unwrap();
    assert!(matches!(
        registry.register_team(t.id, teams[0], now).await,
        Err(TournamentError::AlreadyRegistered(_))
    ));
    assert!(matches!(
        registry.register_team(t.id, -42, now).await,
        Err(TournamentError::TeamNotFound(-42))
    ));
    assert_eq!(registry.registration_count(t.id).await.unwrap(), 1);

    registry.withdraw_team(t.id, teams[0]).await.unwrap();
    assert!(matches!(
        registry.withdraw_team(t.id, teams[0]).await,
        Err(TournamentError::NotRegistered { .. })
    ));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_duplicate_round_matches_are_rejected() {
    let db = setup_test_db().await;
    let tournaments = PgTournamentStore::new(db.pool().clone());
    let matches = PgMatchStore::new(db.pool().clone());
    let teams = insert_teams(db.pool(), "EUW", 3).await;

    let t = tournaments
        .create(&NewTournament::new("Duplicates", "EUW"))
        .await
        .unwrap();

    let first = vec![MatchDraft::pairing(t.id, 1, teams[0], teams[1])];
    matches.create_matches(t.id, 1, &first).await.unwrap();

    let clash = vec![MatchDraft::pairing(t.id, 1, teams[0], teams[2])];
    assert!(matches!(
        matches.create_matches(t.id, 1, &clash).await,
        Err(TournamentError::InternalConsistency(_))
    ));
    assert_eq!(matches.matches_for_round(t.id, 1).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_full_bracket_on_postgres() {
    let db = setup_test_db().await;
    let manager = manager_for(&db);
    let region = format!("pg-{}", chrono::Utc::now().timestamp_micros());
    let teams = insert_teams(db.pool(), &region, 5).await;

    let t = manager
        .create_tournament(NewTournament::new("Postgres Cup", region.clone()))
        .await
        .unwrap();
    for team in &teams {
        manager.register_team(t.id, *team).await.unwrap();
    }

    let mut transition = manager.begin_or_advance(t.id).await.unwrap();
    loop {
        let matches = match transition {
            Transition::Started { matches, .. } | Transition::Advanced { matches, .. } => matches,
            Transition::Finished { winner } => {
                assert_eq!(winner, teams[0]);
                break;
            }
            other => panic!("unexpected transition {other:?}"),
        };

        let mut last = None;
        for m in matches.iter().filter(|m| !m.is_bye()) {
            // The stronger side always wins.
            last = Some(manager.report_match_result(m.id, m.team_a).await.unwrap());
        }
        transition = last
            .and_then(|report| report.transition)
            .expect("round completion advances the bracket");
    }

    let finished = manager.tournament(t.id).await.unwrap();
    assert_eq!(finished.status, TournamentStatus::Finished);

    let history = manager.tournament_history(&region).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].winner, Some(teams[0]));
    assert_eq!(history[0].winner_name.as_deref(), Some("pg team 0"));
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
#[serial]
async fn test_region_lookup_and_delete() {
    let db = setup_test_db().await;
    let manager = manager_for(&db);
    let registry = PgTeamRegistry::new(db.pool().clone());
    let tournaments = PgTournamentStore::new(db.pool().clone());
    let na = insert_teams(db.pool(), "NA", 1).await;
    let euw = insert_teams(db.pool(), "EUW", 1).await;

    assert_eq!(registry.team_region(na[0]).await.unwrap(), "NA");
    assert!(matches!(
        registry.team_region(-7).await,
        Err(TournamentError::TeamNotFound(-7))
    ));

    let t = manager
        .create_tournament(NewTournament::new("Region Cup", "EUW"))
        .await
        .unwrap();
    assert!(matches!(
        manager.register_team(t.id, na[0]).await,
        Err(TournamentError::RegionMismatch { .. })
    ));
    manager.register_team(t.id, euw[0]).await.unwrap();
    assert_eq!(manager.registration_count(t.id).await.unwrap(), 1);

    manager.delete_tournament(t.id).await.unwrap();
    assert!(matches!(
        tournaments.load(t.id).await,
        Err(TournamentError::NotFound(_))
    ));
    assert_eq!(registry.registration_count(t.id).await.unwrap(), 0);
    assert!(matches!(
        manager.delete_tournament(t.id).await,
        Err(TournamentError::NotFound(_))
    ));
}
