use crate::core::effects::{ActiveEffects, EffectPars, HazardKind, StatusEffectKind};
use crate::core::race::PoseSource;
use crate::interfaces::messages::{
    LeaderboardSubmit, RaceCommand, RaceEvent, VehicleProgressUpdate,
};
use crate::interfaces::probes::{Probes, SurfaceTag};
use crate::{PlayerId, VehicleId};
use anyhow::Context;
use glam::{Quat, Vec3};
use helpers::general::InputValueError;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use tracing::debug;

const TURN_DEADZONE: f32 = 0.05;
const TURN_RATE_SCALE: f32 = 6.0;
const ANGULAR_DECAY: f32 = 0.95;
const MIN_ROTATION_RATE: f32 = 0.01;
const MIN_MOVE_SPEED: f32 = 1e-4;

/// * `speed` - Throttle force coefficient
/// * `max_velocity` - (m/s) Upper bound of the velocity magnitude
/// * `turn_speed` - Turn rate coefficient for desktop players and bots
/// * `mobile_turn_speed` - Turn rate coefficient for mobile players
/// * `min_angular_velocity` - (rad/s) Lower bound of the yaw rate
/// * `max_angular_velocity` - (rad/s) Upper bound of the yaw rate
/// * `lateral_grip` - Share of the sideways velocity kept per tick in [0, 1], 0 stops sliding
/// * `lateral_grip_cutoff` - (m/s) Speed below which no grip correction is applied
/// * `min_friction` - Velocity decay factor per tick without throttle
/// * `max_friction` - Throttle force multiplier
/// * `ground_check_distance` - (m) Length of the downward grounding ray
/// * `collision_buffer` - (m) Added to the forward collision ray length
/// * `ride_height` - (m) Height above the ground the vehicle is placed at after landing
/// * `fall_speed` - (m/s) Sink rate while airborne and not launched
/// * `wheel_spin_speed` - Wheel spin angle per meter of forward travel
/// * `max_steer_deg` - (deg) Front wheel steering angle at full turn input
/// * `pitch_base` - Engine pitch at standstill
/// * `pitch_factor` - Engine pitch increase per m/s
/// * `settle_duration` - (s) Motion is suspended for this long after a reset to a checkpoint
/// * `landing_cooldown` - (s) Minimum time between two landing effects
/// * `effects` - Status effect tuning
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VehiclePars {
    pub speed: f32,
    pub max_velocity: f32,
    pub turn_speed: f32,
    pub mobile_turn_speed: f32,
    pub min_angular_velocity: f32,
    pub max_angular_velocity: f32,
    pub lateral_grip: f32,
    pub lateral_grip_cutoff: f32,
    pub min_friction: f32,
    pub max_friction: f32,
    pub ground_check_distance: f32,
    pub collision_buffer: f32,
    pub ride_height: f32,
    pub fall_speed: f32,
    pub wheel_spin_speed: f32,
    pub max_steer_deg: f32,
    pub pitch_base: f32,
    pub pitch_factor: f32,
    pub settle_duration: f32,
    pub landing_cooldown: f32,
    pub effects: EffectPars,
}

impl Default for VehiclePars {
    fn default() -> Self {
        VehiclePars {
            speed: 1.0,
            max_velocity: 20.0,
            turn_speed: 1.0,
            mobile_turn_speed: 0.4,
            min_angular_velocity: -1.0,
            max_angular_velocity: 1.0,
            lateral_grip: 0.85,
            lateral_grip_cutoff: 0.1,
            min_friction: 0.98,
            max_friction: 10.0,
            ground_check_distance: 2.0,
            collision_buffer: 0.5,
            ride_height: 0.5,
            fall_speed: 9.81,
            wheel_spin_speed: 5.0,
            max_steer_deg: 30.0,
            pitch_base: 0.25,
            pitch_factor: 0.02,
            settle_duration: 2.0,
            landing_cooldown: 1.0,
            effects: EffectPars::default(),
        }
    }
}

impl VehiclePars {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_velocity <= 0.0 {
            return Err(InputValueError).context("Vehicle max_velocity must be positive!");
        }
        if self.min_angular_velocity > self.max_angular_velocity {
            return Err(InputValueError)
                .context("Vehicle min_angular_velocity must not exceed max_angular_velocity!");
        }
        if !(0.0..=1.0).contains(&self.lateral_grip) || !(0.0..=1.0).contains(&self.min_friction) {
            return Err(InputValueError)
                .context("Vehicle lateral_grip and min_friction must lie in [0, 1]!");
        }
        if self.ground_check_distance <= 0.0 || self.ride_height >= self.ground_check_distance {
            return Err(InputValueError).context(
                "Vehicle ground_check_distance must be positive and exceed the ride height!",
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputDevice {
    #[default]
    Desktop,
    Mobile,
}

/// Turn and throttle axes, both clamped to [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InputAxes {
    pub turn: f32,
    pub throttle: f32,
}

impl InputAxes {
    pub fn new(turn: f32, throttle: f32) -> InputAxes {
        let clamp_axis = |x: f32| if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        InputAxes {
            turn: clamp_axis(turn),
            throttle: clamp_axis(throttle),
        }
    }
}

/// InputBinding is handed to whoever feeds input to the vehicle. It becomes stale as soon as the
/// occupant changes or ownership is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputBinding {
    pub vehicle: VehicleId,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehiclePose {
    pub position: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub angular_velocity: f32,
}

/// OwnershipSnapshot is the persistent vehicle state handed over when another peer takes control
/// of the vehicle. The live pose is not part of it, the new owner starts from the observed
/// transform.
///
/// * `race_active` - Race view of the vehicle at the time of the hand-off
/// * `finished` - Vehicle was already reported as finished
/// * `race_time` - (s) Race clock of the vehicle, keeps running on the new owner
/// * `submitted` - Leaderboard submission was already sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnershipSnapshot {
    pub spawn_position: Vec3,
    pub spawn_rotation: Quat,
    /// Base rotations of the wheels: front left, front right, rear left, rear right
    pub wheel_base: Option<[Quat; 4]>,
    #[serde(default)]
    pub race_active: bool,
    #[serde(default)]
    pub finished: bool,
    #[serde(default)]
    pub race_time: f64,
    #[serde(default)]
    pub submitted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelPose {
    pub spin_angle: f32,
    pub steer_angle: f32,
    pub rotations: Option<[Quat; 4]>,
}

#[derive(Debug, Clone, Default)]
pub struct TickOutput {
    pub moved: bool,
    pub collided: bool,
    pub landed: bool,
    pub gated: bool,
    pub engine_pitch: f32,
    pub wheels: Option<WheelPose>,
    pub expired_effects: Vec<StatusEffectKind>,
}

/// Vehicle is the kinematic integrator of a single kart. It is run by the peer that currently
/// owns the vehicle and only reads the race state (active/finished) it is told about.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pars: VehiclePars,
    pose: VehiclePose,
    spawn_position: Vec3,
    spawn_rotation: Quat,
    wheel_base: Option<[Quat; 4]>,
    effects: ActiveEffects,

    // input
    input: InputAxes,
    device: InputDevice,
    occupant: Option<PlayerId>,
    input_generation: u64,

    // timers
    clock: f64,
    grounded: bool,
    landing_cooldown_left: f32,
    settle_time: Option<f32>,
    wheel_spin: f32,

    // race view
    race_active: bool,
    finished: bool,
    race_time: f64,
    submitted: bool,
}

impl Vehicle {
    pub fn new(
        id: VehicleId,
        pars: &VehiclePars,
        spawn_position: Vec3,
        spawn_rotation: Quat,
    ) -> Vehicle {
        let snapshot = OwnershipSnapshot {
            spawn_position,
            spawn_rotation,
            wheel_base: None,
            race_active: false,
            finished: false,
            race_time: 0.0,
            submitted: false,
        };
        Vehicle::from_snapshot(id, pars, &snapshot, spawn_position, spawn_rotation)
    }

    /// from_snapshot creates the integrator on a peer that takes over control of the vehicle. The
    /// observed transform is used as the start pose, velocities start at zero. The race view and
    /// race clock continue where the previous owner left them.
    pub fn from_snapshot(
        id: VehicleId,
        pars: &VehiclePars,
        snapshot: &OwnershipSnapshot,
        position: Vec3,
        rotation: Quat,
    ) -> Vehicle {
        Vehicle {
            id,
            pars: pars.to_owned(),
            pose: VehiclePose {
                position,
                rotation: rotation.normalize(),
                ..VehiclePose::default()
            },
            spawn_position: snapshot.spawn_position,
            spawn_rotation: snapshot.spawn_rotation,
            wheel_base: snapshot.wheel_base,
            effects: ActiveEffects::default(),
            input: InputAxes::default(),
            device: InputDevice::Desktop,
            occupant: None,
            input_generation: 0,
            clock: 0.0,
            grounded: true,
            landing_cooldown_left: 0.0,
            settle_time: None,
            wheel_spin: 0.0,
            race_active: snapshot.race_active,
            finished: snapshot.finished,
            race_time: snapshot.race_time,
            submitted: snapshot.submitted,
        }
    }

    pub fn with_wheels(mut self, wheel_base: [Quat; 4]) -> Vehicle {
        self.wheel_base = Some(wheel_base);
        self
    }

    // GETTERS -------------------------------------------------------------------------------------
    pub fn pose(&self) -> &VehiclePose {
        &self.pose
    }

    pub fn speed(&self) -> f32 {
        self.pose.velocity.length()
    }

    pub fn forward(&self) -> Vec3 {
        self.pose.rotation * Vec3::Z
    }

    pub fn right(&self) -> Vec3 {
        self.pose.rotation * Vec3::X
    }

    pub fn occupant(&self) -> Option<PlayerId> {
        self.occupant
    }

    pub fn is_grounded(&self) -> bool {
        self.grounded
    }

    pub fn is_settling(&self) -> bool {
        self.settle_time.is_some()
    }

    pub fn race_active(&self) -> bool {
        self.race_active
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    pub fn race_time(&self) -> f64 {
        self.race_time
    }

    pub fn effects(&self) -> &ActiveEffects {
        &self.effects
    }

    pub fn body_scale(&self) -> Vec3 {
        self.effects.body_scale(&self.pars.effects)
    }

    pub fn avatar_scale(&self) -> f32 {
        self.effects.avatar_scale(&self.pars.effects)
    }

    pub fn engine_pitch(&self) -> f32 {
        self.pars.pitch_base + self.speed() * self.pars.pitch_factor
    }

    fn turn_speed(&self) -> f32 {
        match self.device {
            InputDevice::Desktop => self.pars.turn_speed,
            InputDevice::Mobile => self.pars.mobile_turn_speed,
        }
    }

    // MAIN METHOD ---------------------------------------------------------------------------------
    /// tick advances the vehicle by `dt` seconds using the current input axes and the given world
    /// probes.
    pub fn tick(&mut self, dt: f32, probes: Probes) -> TickOutput {
        let mut out = TickOutput {
            engine_pitch: self.engine_pitch(),
            ..TickOutput::default()
        };
        if dt <= 0.0 || !dt.is_finite() {
            out.gated = true;
            return out;
        }

        self.clock += dt as f64;
        out.expired_effects = self.effects.sweep(self.clock);
        self.landing_cooldown_left = (self.landing_cooldown_left - dt).max(0.0);
        if self.race_active && !self.finished {
            self.race_time += dt as f64;
        }

        let settling = self.update_settle_timer(dt);
        if !settling {
            out.landed = self.update_grounded(probes);
        }

        out.gated = settling
            || !self.grounded
            || !self.race_active
            || self.finished
            || self.effects.is_active(StatusEffectKind::Flatten);

        if !out.gated {
            self.integrate(dt, probes, &mut out);
        } else if !settling
            && !self.grounded
            && !self.effects.is_active(StatusEffectKind::Launch)
        {
            self.pose.position.y -= self.pars.fall_speed * dt;
        }

        if !settling && self.race_active && !self.finished {
            self.apply_effect_overrides(dt);
        }

        out.wheels = self.animate_wheels(dt);
        out.engine_pitch = self.engine_pitch();
        out
    }

    // METHODS (HELPERS FOR MAIN METHOD) -----------------------------------------------------------
    fn update_settle_timer(&mut self, dt: f32) -> bool {
        match self.settle_time.as_mut() {
            Some(t) => {
                *t += dt;
                if *t >= self.pars.settle_duration {
                    self.settle_time = None;
                }
                true
            }
            None => false,
        }
    }

    /// update_grounded casts the grounding ray and returns true if a landing effect should be
    /// played. Without a ground probe the grounded state is left as it is.
    fn update_grounded(&mut self, probes: Probes) -> bool {
        let probe = match probes.ground {
            Some(probe) => probe,
            None => return false,
        };

        let hit = probe
            .raycast(self.pose.position, Vec3::NEG_Y, self.pars.ground_check_distance)
            .filter(|hit| hit.surface == SurfaceTag::Ground);
        let was_grounded = self.grounded;
        self.grounded = hit.is_some();

        match hit {
            Some(hit) if !was_grounded => {
                self.pose.position.y = hit.point.y + self.pars.ride_height;
                if self.landing_cooldown_left <= 0.0 {
                    self.landing_cooldown_left = self.pars.landing_cooldown;
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    fn integrate(&mut self, dt: f32, probes: Probes, out: &mut TickOutput) {
        let forward = self.forward();
        let right = self.right();
        let InputAxes { turn, throttle } = self.input;
        let mut velocity = self.pose.velocity;

        // longitudinal force, boosts are added on top of the throttle force
        if throttle.abs() > 0.0 {
            velocity += forward
                * (self.pars.speed * self.effects.speed_factor())
                * throttle
                * dt
                * self.pars.max_friction;

            let boost_total = self.effects.boost_total();
            if boost_total > 0.0 {
                velocity += forward * boost_total * throttle * dt * self.pars.max_friction;
            }
        } else {
            velocity *= self.pars.min_friction;
        }

        // lateral grip
        if velocity.length() > self.pars.lateral_grip_cutoff {
            let lateral_speed = velocity.dot(right);
            velocity -= right * lateral_speed * (1.0 - self.pars.lateral_grip);
        }

        // turning, steering is mirrored when reversing
        if turn.abs() > TURN_DEADZONE {
            let direction_sign = if throttle >= 0.0 { 1.0 } else { -1.0 };
            self.pose.angular_velocity +=
                turn * direction_sign * self.turn_speed() * dt * TURN_RATE_SCALE;
        }
        self.pose.angular_velocity = (self.pose.angular_velocity * ANGULAR_DECAY)
            .max(self.pars.min_angular_velocity)
            .min(self.pars.max_angular_velocity);

        if self.pose.angular_velocity.abs() > MIN_ROTATION_RATE {
            let yaw = Quat::from_axis_angle(Vec3::Y, self.pose.angular_velocity * dt);
            self.pose.rotation = (self.pose.rotation * yaw).normalize();
        }

        // collision probe along the movement direction
        let step = velocity * dt;
        let speed = velocity.length();
        let mut can_move = true;

        if let Some(probe) = probes.forward {
            if speed > MIN_MOVE_SPEED {
                let hit = probe.raycast(
                    self.pose.position,
                    velocity / speed,
                    speed * dt + self.pars.collision_buffer,
                );
                if hit.is_some() {
                    debug!("Vehicle {} stopped by an obstacle", self.id);
                    can_move = false;
                    velocity = Vec3::ZERO;
                    out.collided = true;
                }
            }
        }

        if can_move && velocity.length() > MIN_MOVE_SPEED {
            self.pose.position += step;
            out.moved = true;
        }

        let speed = velocity.length();
        if speed > self.pars.max_velocity {
            velocity *= self.pars.max_velocity / speed;
        }
        self.pose.velocity = velocity;
    }

    fn apply_effect_overrides(&mut self, dt: f32) {
        if let Some(spin_speed) = self.effects.magnitude(StatusEffectKind::SpinOut) {
            let spin = Quat::from_axis_angle(Vec3::Y, (spin_speed * dt).to_radians());
            self.pose.rotation = (self.pose.rotation * spin).normalize();
        }
        if let Some(launch_speed) = self.effects.magnitude(StatusEffectKind::Launch) {
            self.pose.position.y += launch_speed * dt;
        }
    }

    fn animate_wheels(&mut self, dt: f32) -> Option<WheelPose> {
        if !self.race_active || self.finished {
            return None;
        }

        let move_speed = self.pose.velocity.dot(self.forward());
        self.wheel_spin = (self.wheel_spin + move_speed * dt * self.pars.wheel_spin_speed)
            .rem_euclid(TAU);
        let steer_angle = (self.input.turn * self.pars.max_steer_deg).to_radians();

        let rotations = self.wheel_base.map(|base| {
            let spin = Quat::from_rotation_x(self.wheel_spin);
            let steer = Quat::from_rotation_y(steer_angle);
            let mut rotations = [Quat::IDENTITY; 4];
            for (i, wheel_base) in base.iter().enumerate() {
                let local = if i < 2 {
                    steer * *wheel_base * spin
                } else {
                    *wheel_base * spin
                };
                rotations[i] = self.pose.rotation * local;
            }
            rotations
        });

        Some(WheelPose {
            spin_angle: self.wheel_spin,
            steer_angle,
            rotations,
        })
    }

    // STATUS EFFECTS ------------------------------------------------------------------------------
    pub fn apply_hazard(&mut self, hazard: HazardKind) -> StatusEffectKind {
        let kind = self
            .effects
            .apply_hazard(hazard, self.clock, &self.pars.effects);
        debug!("Vehicle {} hit {:?}, applying {:?}", self.id, hazard, kind);
        kind
    }

    // RACE MESSAGES -------------------------------------------------------------------------------
    pub fn on_race_control(&mut self, command: RaceCommand) {
        match command {
            RaceCommand::Start => {
                self.race_active = true;
                self.finished = false;
                self.race_time = 0.0;
                self.submitted = false;
            }
            RaceCommand::Stop | RaceCommand::Finished => {
                self.race_active = false;
                self.reset_to_spawn();
            }
        }
    }

    /// on_progress applies a progress update of the race engine. The first update that reports
    /// the vehicle as finished yields the leaderboard submission of the current occupant.
    pub fn on_progress(&mut self, update: &VehicleProgressUpdate) -> Option<LeaderboardSubmit> {
        if update.vehicle != self.id {
            return None;
        }

        self.race_active = update.race_active;
        let newly_finished = update.finished && !self.finished;
        self.finished = update.finished;

        if !newly_finished || self.submitted {
            return None;
        }
        let player = self.occupant?;
        self.submitted = true;
        Some(LeaderboardSubmit {
            player,
            elapsed_seconds: self.race_time.round() as u64,
        })
    }

    pub fn on_reset_to_checkpoint(&mut self, position: Vec3, rotation: Quat) {
        self.pose = VehiclePose {
            position,
            rotation: rotation.normalize(),
            ..VehiclePose::default()
        };
        self.settle_time = Some(0.0);
    }

    pub fn reset_to_spawn(&mut self) {
        self.pose = VehiclePose {
            position: self.spawn_position,
            rotation: self.spawn_rotation.normalize(),
            ..VehiclePose::default()
        };
        self.grounded = true;
        self.settle_time = None;
    }

    // OCCUPANCY AND INPUT -------------------------------------------------------------------------
    /// seat puts a player into the vehicle, invalidates previous input bindings and returns the new
    /// binding together with the occupancy event for the race engine.
    pub fn seat(&mut self, player: PlayerId, device: InputDevice) -> (InputBinding, RaceEvent) {
        self.occupant = Some(player);
        self.device = device;
        self.input = InputAxes::default();
        self.input_generation += 1;

        (
            InputBinding {
                vehicle: self.id,
                generation: self.input_generation,
            },
            RaceEvent::OccupancyChanged {
                vehicle: self.id,
                occupant: Some(player),
            },
        )
    }

    /// leave removes the occupant. The empty occupancy is only reported while the vehicle has not
    /// finished, a finished vehicle must not be disqualified.
    pub fn leave(&mut self) -> Option<RaceEvent> {
        self.occupant?;
        self.occupant = None;
        self.input = InputAxes::default();
        self.input_generation += 1;

        if self.finished {
            None
        } else {
            Some(RaceEvent::OccupancyChanged {
                vehicle: self.id,
                occupant: None,
            })
        }
    }

    /// apply_input sets the input axes if the binding is still current.
    pub fn apply_input(&mut self, binding: &InputBinding, axes: InputAxes) -> bool {
        if binding.vehicle != self.id
            || binding.generation != self.input_generation
            || self.occupant.is_none()
        {
            return false;
        }
        self.input = axes;
        true
    }

    pub fn ownership_snapshot(&self) -> OwnershipSnapshot {
        OwnershipSnapshot {
            spawn_position: self.spawn_position,
            spawn_rotation: self.spawn_rotation,
            wheel_base: self.wheel_base,
            race_active: self.race_active,
            finished: self.finished,
            race_time: self.race_time,
            submitted: self.submitted,
        }
    }

    /// release_ownership cancels all input bindings of this peer and returns the snapshot for the
    /// new owner.
    pub fn release_ownership(&mut self) -> OwnershipSnapshot {
        self.input_generation += 1;
        self.input = InputAxes::default();
        self.ownership_snapshot()
    }
}

impl PoseSource for Vec<Vehicle> {
    fn position(&self, vehicle: VehicleId) -> Option<Vec3> {
        self.iter()
            .find(|v| v.id == vehicle)
            .map(|v| v.pose.position)
    }
}
