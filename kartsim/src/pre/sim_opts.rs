use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "kartsim",
    about = "Headless kart race simulator with an authoritative race progress engine"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging
    #[clap(short, long)]
    pub debug: bool,

    /// Stream race snapshots in real-time while simulating (single run only)
    #[clap(short, long)]
    pub live: bool,

    /// Write the standings and the JSON result of the first run to output/
    #[clap(short, long)]
    pub output: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set number of simulation runs, runs differ in their random seed
    #[clap(short, long, default_value = "1")]
    pub no_sim_runs: u32,

    /// Set path to the simulation parameter file
    #[clap(short, long)]
    pub parfile_path: PathBuf,

    /// Set real-time factor (only relevant in live mode)
    #[clap(short, long, default_value = "1.0")]
    pub realtime_factor: f64,

    /// Set the random seed of the first run
    #[clap(short, long, default_value = "0")]
    pub seed: u64,

    /// Set simulation timestep size in seconds, should be in the range [0.001, 0.25]
    #[clap(short, long, default_value = "0.05")]
    pub timestep_size: f64,
}
