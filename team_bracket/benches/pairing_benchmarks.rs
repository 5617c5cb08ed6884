use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::collections::HashSet;
use team_bracket::{
    BracketConfig, Team, TeamId, TournamentManager, Transition,
    db::InMemoryStore,
    tournament::{NewTournament, generate_pairings, pairing},
};

/// Deterministic pool of `n` teams with scattered strengths
fn team_pool(n: usize) -> Vec<Team> {
    let base = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| Team {
            id: i as TeamId + 1,
            name: format!("team{}", i),
            region: "bench".to_string(),
            strength: ((i * 7919) % 1000) as f64 / 10.0,
            registered_at: base + Duration::seconds(i as i64),
        })
        .collect()
}

/// Benchmark strength ordering alone
fn bench_sort_by_strength(c: &mut Criterion) {
    let teams = team_pool(256);

    c.bench_function("sort_256_teams", |b| {
        b.iter_batched(
            || teams.clone(),
            |mut pool| {
                pairing::sort_by_strength(&mut pool);
                pool
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark round generation with different pool sizes
fn bench_generate_pairings(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_pairings");

    for n_teams in [8, 33, 128, 1025].iter() {
        let teams = team_pool(*n_teams);
        // Half the pool already had a bye, so odd pools have to scan.
        let history: HashSet<TeamId> = teams
            .iter()
            .filter(|t| t.id % 2 == 0)
            .map(|t| t.id)
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_teams", n_teams)),
            &teams,
            |b, teams| {
                b.iter(|| generate_pairings(1, teams, 1, &history));
            },
        );
    }

    group.finish();
}

/// Run a whole bracket where the stronger side always wins
async fn run_bracket(n: usize) -> TeamId {
    let store = InMemoryStore::new();
    for team in team_pool(n) {
        store.upsert_team(team.id, team.name, team.region, team.strength);
    }
    let manager = TournamentManager::in_memory(store, BracketConfig { min_teams: 2 });
    let cup = manager
        .create_tournament(NewTournament::new("bench", "bench"))
        .await
        .unwrap();
    for id in 1..=n as TeamId {
        manager.register_team(cup.id, id).await.unwrap();
    }

    let mut transition = manager.begin_or_advance(cup.id).await.unwrap();
    loop {
        let matches = match transition {
            Transition::Finished { winner } => return winner,
            Transition::Started { matches, .. } | Transition::Advanced { matches, .. } => matches,
            other => panic!("unexpected transition {other:?}"),
        };

        // Reporting the last open match advances the bracket.
        let mut next = None;
        for m in matches.iter().filter(|m| !m.is_bye()) {
            next = manager
                .report_match_result(m.id, m.team_a)
                .await
                .unwrap()
                .transition;
        }
        transition = next.expect("round did not advance");
    }
}

/// Benchmark a full in-memory bracket, registration to winner
fn bench_full_bracket(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("full_bracket");

    for n_teams in [16, 65].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_teams", n_teams)),
            n_teams,
            |b, &n| {
                b.iter(|| runtime.block_on(run_bracket(n)));
            },
        );
    }

    group.finish();
}

criterion_group!(pairing_engine, bench_sort_by_strength, bench_generate_pairings);

criterion_group!(bracket_progression, bench_full_bracket);

criterion_main!(pairing_engine, bracket_progression);
