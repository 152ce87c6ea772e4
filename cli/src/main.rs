use anyhow::Context;
use clap::Parser;
use kartsim::core::handle_race::handle_race;
use kartsim::interfaces::messages::RaceSnapshot;
use kartsim::post::race_result::RaceResult;
use kartsim::pre::read_sim_pars::{read_sim_pars, SimPars};
use kartsim::pre::sim_opts::SimOpts;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::thread;
use std::time::Instant;
use tracing::{info, warn, Level};

/// print_win_statistics prints how often each driver won over all simulation runs.
fn print_win_statistics(results: &[RaceResult]) {
    let mut wins: BTreeMap<String, u32> = BTreeMap::new();
    let mut no_winner = 0;

    for result in results.iter() {
        match result.winner() {
            Some(winner) => *wins.entry(winner.driver_initials.to_owned()).or_insert(0) += 1,
            None => no_winner += 1,
        }
    }

    println!("RESULT: Wins over {} runs", results.len());
    for (initials, count) in wins.iter() {
        println!(
            "{:>6}, {:5}, {:5.1}%",
            initials,
            count,
            100.0 * *count as f64 / results.len() as f64
        );
    }
    if no_winner > 0 {
        println!("{:>6}, {:5}", "-", no_winner);
    }
}

fn write_outputs(result: &RaceResult) {
    match result.write_standings_to_file(None) {
        Ok(path) => info!("Standings written to {}", path),
        Err(e) => warn!("Could not write standings: {:#}", e),
    }
    match result.write_json_to_file(None) {
        Ok(path) => info!("Race result written to {}", path),
        Err(e) => warn!("Could not write race result: {:#}", e),
    }
}

/// run_live simulates a single race in a separate thread and logs the standings it streams.
fn run_live(sim_opts: &SimOpts, sim_pars: &SimPars) -> anyhow::Result<RaceResult> {
    let (tx, rx) = flume::unbounded::<RaceSnapshot>();

    let sim_pars_thread = sim_pars.clone();
    let timestep_size = sim_opts.timestep_size;
    let seed = sim_opts.seed;
    let realtime_factor = sim_opts.realtime_factor;

    let sim_thread = thread::spawn(move || {
        handle_race(
            &sim_pars_thread,
            timestep_size,
            seed,
            Some(&tx),
            realtime_factor,
        )
    });

    let mut t_last_print = f64::NEG_INFINITY;
    for snapshot in rx.iter() {
        if snapshot.final_result.is_some() {
            break;
        }
        if snapshot.race_time < t_last_print + 1.0 && snapshot.race_time >= t_last_print {
            continue;
        }
        t_last_print = snapshot.race_time;

        let mut vehicles = snapshot.vehicles;
        vehicles.sort_by_key(|v| v.rank);
        let standings: Vec<String> = vehicles
            .iter()
            .map(|v| format!("{}. {} (lap {}, {:.1}m/s)", v.rank, v.name, v.lap, v.speed))
            .collect();
        info!(
            "{:?} {:6.1}s | {}",
            snapshot.phase,
            snapshot.race_time,
            standings.join(" | ")
        );
    }

    match sim_thread.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("Simulation thread panicked!"),
    }
}

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();

    tracing_subscriber::fmt()
        .with_max_level(if sim_opts.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .compact()
        .init();

    // get simulation parameters
    info!(
        "Reading simulation parameters from {:?}",
        sim_opts.parfile_path
    );
    let sim_pars = read_sim_pars(&sim_opts.parfile_path)?;

    info!(
        "Simulating {} laps on {} with a time step size of {:.3}s",
        sim_pars.race_pars.tot_no_laps, sim_pars.track_pars.name, sim_opts.timestep_size
    );

    // EXECUTION -----------------------------------------------------------------------------------
    if sim_opts.live {
        if sim_opts.no_sim_runs > 1 {
            warn!("Live mode simulates a single run, ignoring --no-sim-runs");
        }
        let result = run_live(&sim_opts, &sim_pars)?;
        result.print_standings();
        if sim_opts.output {
            write_outputs(&result);
        }
        return Ok(());
    }

    let t_start = Instant::now();
    let results: Vec<RaceResult> = (0..sim_opts.no_sim_runs as u64)
        .into_par_iter()
        .map(|run| {
            handle_race(
                &sim_pars,
                sim_opts.timestep_size,
                sim_opts.seed.wrapping_add(run),
                None,
                1.0,
            )
            .context(format!("Simulation run {} failed!", run))
        })
        .collect::<anyhow::Result<Vec<RaceResult>>>()?;

    info!(
        "Execution time for {} runs: {}ms",
        results.len(),
        t_start.elapsed().as_millis()
    );

    // POST-PROCESSING -----------------------------------------------------------------------------
    if let Some(first) = results.first() {
        first.print_standings();
        if sim_opts.output {
            write_outputs(first);
        }
    }
    if results.len() > 1 {
        print_win_statistics(&results);
    }

    Ok(())
}
