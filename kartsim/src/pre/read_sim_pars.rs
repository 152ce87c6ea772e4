use crate::core::driver::DriverPars;
use crate::core::race::{RacePars, MAX_VEHICLES};
use crate::core::track::TrackPars;
use crate::core::vehicle::VehiclePars;
use anyhow::Context;
use helpers::general::InputValueError;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::Path;

/// SimPars is used to store all other parameter structs. Every driver gets its own vehicle.
#[derive(Debug, Deserialize, Clone)]
pub struct SimPars {
    #[serde(default)]
    pub race_pars: RacePars,
    pub track_pars: TrackPars,
    #[serde(default)]
    pub vehicle_pars: VehiclePars,
    pub drivers: Vec<DriverPars>,
}

impl SimPars {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.vehicle_pars.validate()?;

        if self.drivers.is_empty() || self.drivers.len() > MAX_VEHICLES {
            return Err(InputValueError).context(format!(
                "Number of drivers must lie between 1 and {}!",
                MAX_VEHICLES
            ));
        }

        let mut player_ids = HashSet::new();
        for driver in self.drivers.iter() {
            if !player_ids.insert(driver.player_id) {
                return Err(InputValueError).context(format!(
                    "Player id {} is used by more than one driver!",
                    driver.player_id
                ));
            }
        }
        Ok(())
    }
}

/// read_sim_pars reads the JSON file and decodes the JSON string into the simulation parameters
/// struct. A relative checkpoint file path is interpreted relative to the parameter file.
pub fn read_sim_pars(filepath: &Path) -> anyhow::Result<SimPars> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open parameter file {}!",
            filepath.display()
        ))?;
    let mut pars: SimPars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse parameter file {}!",
        filepath.display()
    ))?;

    if let (Some(checkpoint_file), Some(pardir)) =
        (&pars.track_pars.checkpoint_file, filepath.parent())
    {
        if checkpoint_file.is_relative() {
            pars.track_pars.checkpoint_file = Some(pardir.join(checkpoint_file));
        }
    }

    pars.validate()?;
    Ok(pars)
}
