use kartsim::core::handle_race::handle_race;
use kartsim::core::race::RacePhase;
use kartsim::interfaces::messages::{RaceSnapshot, MAX_OBSERVER_UPDATE_FREQUENCY};
use kartsim::pre::read_sim_pars::{read_sim_pars, SimPars};
use std::path::PathBuf;

fn oval_pars() -> SimPars {
    let path: PathBuf = [
        env!("CARGO_MANIFEST_DIR"),
        "..",
        "input",
        "parameters",
        "oval.json",
    ]
    .iter()
    .collect();
    read_sim_pars(&path).unwrap()
}

#[test]
fn headless_race_terminates_with_complete_standings() {
    let sim_pars = oval_pars();
    let result = handle_race(&sim_pars, 0.05, 1, None, 1.0).unwrap();

    assert_eq!(result.track_name, "Oval");
    assert_eq!(result.tot_no_laps, 2);
    assert_eq!(result.standings.len(), sim_pars.drivers.len());
    assert!(result.completion.is_some());
    assert!(result.race_time <= sim_pars.race_pars.max_race_duration + 0.1);

    let mut ranks: Vec<u32> = result.standings.iter().map(|s| s.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, vec![1, 2, 3, 4]);

    // the race only completes once everybody finished, timed out or was disqualified
    for standing in result.standings.iter() {
        assert!(standing.finished || standing.disqualified);
        assert!(standing.player.is_some());
    }
    for submit in result.leaderboard.iter() {
        assert!(submit.elapsed_seconds as f64 <= result.race_time + 1.0);
    }
}

#[test]
fn identical_seeds_give_identical_results() {
    let mut sim_pars = oval_pars();
    sim_pars.race_pars.tot_no_laps = 1;
    sim_pars.race_pars.max_race_duration = 60.0;

    let first = handle_race(&sim_pars, 0.05, 7, None, 1.0).unwrap();
    let second = handle_race(&sim_pars, 0.05, 7, None, 1.0).unwrap();
    assert_eq!(first.standings, second.standings);
}

#[test]
fn live_mode_streams_rate_limited_snapshots() {
    let mut sim_pars = oval_pars();
    sim_pars.race_pars.tot_no_laps = 1;
    sim_pars.race_pars.max_race_duration = 20.0;
    sim_pars.race_pars.completion_cooldown = 1.0;

    let (tx, rx) = flume::unbounded::<RaceSnapshot>();
    let result = handle_race(&sim_pars, 0.05, 3, Some(&tx), 1000.0).unwrap();
    drop(tx);
    let snapshots: Vec<RaceSnapshot> = rx.iter().collect();

    let last = snapshots.last().unwrap();
    assert_eq!(
        last.final_result.as_ref().map(|r| r.standings.len()),
        Some(result.standings.len())
    );

    let race_length = sim_pars.race_pars.countdown_duration
        + sim_pars.race_pars.max_race_duration
        + sim_pars.race_pars.completion_cooldown
        + 1.0;
    assert!(snapshots.len() as f64 <= race_length * MAX_OBSERVER_UPDATE_FREQUENCY + 2.0);
    assert!(snapshots.iter().any(|s| s.phase == RacePhase::Countdown));
    assert!(snapshots.iter().any(|s| s.phase == RacePhase::Active));
    assert!(snapshots
        .iter()
        .filter(|s| s.final_result.is_none())
        .all(|s| s.vehicles.len() == sim_pars.drivers.len()));
}

#[test]
fn invalid_timestep_is_rejected() {
    let sim_pars = oval_pars();
    assert!(handle_race(&sim_pars, 0.0, 0, None, 1.0).is_err());
    assert!(handle_race(&sim_pars, 0.05, 0, None, 0.0).is_err());
}
