use crate::core::track::Track;
use crate::core::vehicle::{InputAxes, InputDevice, Vehicle};
use crate::PlayerId;
use anyhow::Context;
use glam::Vec3;
use helpers::general::InputValueError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

/// Heading error (rad) above which the bot lifts off the throttle
const LIFT_OFF_HEADING_ERROR: f32 = 1.0;
/// (m/s) Speed below which the bot never lifts off
const LIFT_OFF_MIN_SPEED: f32 = 8.0;

/// * `name` - Driver name, e.g. Luigi Bot
/// * `initials` - Driver initials, e.g. LUI
/// * `player_id` - Player id the driver occupies its vehicle with
/// * `device` - Input device the driver is treated as (affects the turn rate)
/// * `throttle` - Throttle input in [0, 1] used on straights
/// * `steer_gain` - Turn input per radian of heading error
/// * `steer_noise` - Standard deviation of the normally distributed turn input noise
#[derive(Debug, Deserialize, Clone)]
pub struct DriverPars {
    pub name: String,
    pub initials: String,
    pub player_id: PlayerId,
    #[serde(default)]
    pub device: InputDevice,
    #[serde(default = "default_throttle")]
    pub throttle: f32,
    #[serde(default = "default_steer_gain")]
    pub steer_gain: f32,
    #[serde(default)]
    pub steer_noise: f32,
}

fn default_throttle() -> f32 {
    1.0
}

fn default_steer_gain() -> f32 {
    2.0
}

/// Driver is a simple bot that steers its vehicle towards the next checkpoint. It keeps its own
/// target checkpoint and never reads the race engine's progress records.
#[derive(Debug)]
pub struct Driver {
    pub initials: String,
    pub name: String,
    pub player_id: PlayerId,
    pub device: InputDevice,
    throttle: f32,
    steer_gain: f32,
    steer_noise: Normal<f32>,
    rng: StdRng,
    target: usize,
}

impl Driver {
    pub fn new(driver_pars: &DriverPars, seed: u64) -> anyhow::Result<Driver> {
        if !(0.0..=1.0).contains(&driver_pars.throttle) {
            return Err(InputValueError).context(format!(
                "Throttle of driver {} must lie in [0, 1]!",
                driver_pars.name
            ));
        }
        let steer_noise = Normal::new(0.0, driver_pars.steer_noise).context(format!(
            "Steering noise of driver {} must be a non-negative number!",
            driver_pars.name
        ))?;

        Ok(Driver {
            initials: driver_pars.initials.to_owned(),
            name: driver_pars.name.to_owned(),
            player_id: driver_pars.player_id,
            device: driver_pars.device,
            throttle: driver_pars.throttle,
            steer_gain: driver_pars.steer_gain,
            steer_noise,
            rng: StdRng::seed_from_u64(seed),
            target: 1,
        })
    }

    /// retarget lets the driver aim for the checkpoint after `checkpoint`, e.g. after a reset.
    pub fn retarget(&mut self, checkpoint: usize, track: &Track) {
        self.target = (checkpoint + 1) % track.checkpoint_count();
    }

    /// control returns the input axes for the current vehicle pose.
    pub fn control(&mut self, vehicle: &Vehicle, track: &Track) -> InputAxes {
        let pose = vehicle.pose();

        if let Some(checkpoint) = track.checkpoint(self.target) {
            let offset = checkpoint.position - pose.position;
            if Vec3::new(offset.x, 0.0, offset.z).length() < track.trigger_radius {
                self.target = (self.target + 1) % track.checkpoint_count();
            }
        }

        let target = match track.checkpoint(self.target) {
            Some(checkpoint) => checkpoint.position,
            None => return InputAxes::default(),
        };

        let local = pose.rotation.inverse() * (target - pose.position);
        let heading_error = local.x.atan2(local.z);
        let noise = self.steer_noise.sample(&mut self.rng);

        let throttle = if heading_error.abs() > LIFT_OFF_HEADING_ERROR
            && vehicle.speed() > LIFT_OFF_MIN_SPEED
        {
            0.0
        } else {
            self.throttle
        };

        InputAxes::new(heading_error * self.steer_gain + noise, throttle)
    }
}
