use crate::core::driver::Driver;
use crate::core::race::{RaceEngine, RacePhase};
use crate::core::track::Track;
use crate::core::vehicle::{InputBinding, Vehicle};
use crate::interfaces::messages::{
    LeaderboardSubmit, RaceCommand, RaceEvent, RaceMessage, RaceSnapshot, VehicleSnapshot,
    MAX_OBSERVER_UPDATE_FREQUENCY,
};
use crate::interfaces::probes::{FlatWorld, Probes};
use crate::post::race_result::{RaceResult, Standing};
use crate::pre::read_sim_pars::SimPars;
use crate::VehicleId;
use anyhow::Context;
use flume::{Receiver, Sender};
use glam::{Quat, Vec3};
use helpers::general::InputValueError;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// (m) Distance of the first grid row behind the start/finish checkpoint
const GRID_START_OFFSET: f32 = 2.0;
/// (m) Distance between two grid rows
const GRID_ROW_SPACING: f32 = 4.0;
/// (m) Lateral offset of a grid slot from the center line
const GRID_LATERAL_OFFSET: f32 = 1.5;
/// (m) Vehicles sinking this far below the ground are reset to their last checkpoint
const OUT_OF_BOUNDS_DEPTH: f32 = 20.0;
/// (s) Simulated time added to the maximum race length before the loop gives up
const TIME_MARGIN: f64 = 5.0;

/// TriggerVolumes tracks for every vehicle whether it is inside the checkpoint and halfway
/// trigger volumes, so that only entries are reported.
struct TriggerVolumes {
    inside_checkpoint: Vec<Vec<bool>>,
    inside_halfway: Vec<bool>,
    reset_pending: Vec<bool>,
}

impl TriggerVolumes {
    fn new(track: &Track, vehicles: &[Vehicle]) -> TriggerVolumes {
        let inside_checkpoint = vehicles
            .iter()
            .map(|v| {
                track
                    .checkpoints()
                    .iter()
                    .map(|c| Self::contains(c.position, track.trigger_radius, v))
                    .collect()
            })
            .collect();
        let inside_halfway = vehicles
            .iter()
            .map(|v| Self::contains(track.halfway_position, track.trigger_radius, v))
            .collect();

        TriggerVolumes {
            inside_checkpoint,
            inside_halfway,
            reset_pending: vec![false; vehicles.len()],
        }
    }

    fn contains(center: Vec3, radius: f32, vehicle: &Vehicle) -> bool {
        (vehicle.pose().position - center).length() <= radius
    }

    /// detect returns the events of all volume entries since the last call and the reset request
    /// of vehicles that fell out of the world.
    fn detect(
        &mut self,
        track: &Track,
        vehicles: &[Vehicle],
        ground_height: f32,
    ) -> Vec<RaceEvent> {
        let mut events = vec![];

        for (i, vehicle) in vehicles.iter().enumerate() {
            for (idx, checkpoint) in track.checkpoints().iter().enumerate() {
                let inside = Self::contains(checkpoint.position, track.trigger_radius, vehicle);
                if inside && !self.inside_checkpoint[i][idx] {
                    events.push(RaceEvent::CheckpointCrossed {
                        vehicle: vehicle.id,
                        index: idx,
                    });
                }
                self.inside_checkpoint[i][idx] = inside;
            }

            let inside = Self::contains(track.halfway_position, track.trigger_radius, vehicle);
            if inside && !self.inside_halfway[i] {
                events.push(RaceEvent::HalfwayCrossed {
                    vehicle: vehicle.id,
                });
            }
            self.inside_halfway[i] = inside;

            if vehicle.pose().position.y < ground_height - OUT_OF_BOUNDS_DEPTH
                && !self.reset_pending[i]
            {
                self.reset_pending[i] = true;
                events.push(RaceEvent::ResetRequested {
                    vehicle: vehicle.id,
                });
            }
        }

        events
    }
}

/// grid_slot returns the spawn pose of grid slot `slot`, two vehicles per row behind the
/// start/finish checkpoint facing the first segment.
fn grid_slot(track: &Track, slot: usize, spawn_height: f32) -> (Vec3, Quat) {
    let start = track.checkpoints()[0];
    let forward = match track.segment(0) {
        Some((a, b)) => Vec3::new(b.x - a.x, 0.0, b.z - a.z).normalize_or_zero(),
        None => start.rotation * Vec3::Z,
    };
    let rotation = if forward == Vec3::ZERO {
        start.rotation
    } else {
        Quat::from_rotation_y(forward.x.atan2(forward.z))
    };
    let forward = rotation * Vec3::Z;
    let right = rotation * Vec3::X;

    let row = (slot / 2) as f32;
    let side = if slot % 2 == 0 { -1.0 } else { 1.0 };
    let mut position = start.position - forward * (GRID_START_OFFSET + GRID_ROW_SPACING * row)
        + right * side * GRID_LATERAL_OFFSET;
    position.y = spawn_height;

    (position, rotation)
}

/// handle_race creates and simulates a race on the basis of the inserted parameters, and returns
/// the results for post-processing. If a sender is inserted, the race is simulated in real-time
/// and snapshots are streamed to the receiver.
pub fn handle_race(
    sim_pars: &SimPars,
    timestep_size: f64,
    seed: u64,
    tx: Option<&Sender<RaceSnapshot>>,
    realtime_factor: f64,
) -> anyhow::Result<RaceResult> {
    if !(0.001..=0.25).contains(&timestep_size) {
        return Err(InputValueError).context(format!(
            "Timestep size {}s is outside of [0.001, 0.25]!",
            timestep_size
        ));
    }
    if realtime_factor <= 0.0 {
        return Err(InputValueError).context("Real-time factor must be positive!");
    }
    sim_pars.validate()?;

    // SETUP ---------------------------------------------------------------------------------------
    let track = Arc::new(Track::new(&sim_pars.track_pars).context(format!(
        "Failed to build track {}!",
        sim_pars.track_pars.name
    ))?);
    let world = FlatWorld::from_track_pars(&sim_pars.track_pars);
    let spawn_height = sim_pars.track_pars.ground_height + sim_pars.vehicle_pars.ride_height;

    let mut vehicles = Vec::with_capacity(sim_pars.drivers.len());
    let mut drivers = Vec::with_capacity(sim_pars.drivers.len());
    for (slot, driver_pars) in sim_pars.drivers.iter().enumerate() {
        let (position, rotation) = grid_slot(&track, slot, spawn_height);
        vehicles.push(Vehicle::new(
            slot as VehicleId + 1,
            &sim_pars.vehicle_pars,
            position,
            rotation,
        ));
        drivers.push(Driver::new(driver_pars, seed.wrapping_add(slot as u64))?);
    }
    let vehicle_ids: Vec<VehicleId> = vehicles.iter().map(|v| v.id).collect();

    let (event_tx, event_rx) = flume::unbounded();
    let (message_tx, message_rx) = flume::unbounded();
    let mut engine = RaceEngine::new(
        &sim_pars.race_pars,
        Arc::clone(&track),
        &vehicle_ids,
        event_rx,
        message_tx,
    )?;

    let mut bindings: Vec<InputBinding> = Vec::with_capacity(vehicles.len());
    for (vehicle, driver) in vehicles.iter_mut().zip(drivers.iter()) {
        event_tx
            .send(RaceEvent::JoinRequest {
                player: driver.player_id,
            })
            .context("Failed to send join request!")?;
        let (binding, event) = vehicle.seat(driver.player_id, driver.device);
        event_tx.send(event).context("Failed to send occupancy!")?;
        bindings.push(binding);
    }
    event_tx
        .send(RaceEvent::StartRequested)
        .context("Failed to request race start!")?;

    let mut volumes = TriggerVolumes::new(&track, &vehicles);
    let mut leaderboard: Vec<LeaderboardSubmit> = vec![];

    info!(
        "Simulating {} with {} vehicles and a time step size of {:.3}s",
        track.name,
        vehicles.len(),
        timestep_size
    );

    // SIMULATION ----------------------------------------------------------------------------------
    let race_pars = engine.pars();
    let max_ticks = ((race_pars.countdown_duration
        + race_pars.max_race_duration
        + race_pars.completion_cooldown
        + TIME_MARGIN)
        / timestep_size)
        .ceil() as u64;

    let sim_realtime = tx.is_some();
    let mut race_started = false;
    let mut sim_time = 0.0;
    let mut t_update_print = 0.0;
    let mut t_update_observer = f64::NEG_INFINITY;

    for _ in 0..max_ticks {
        let t_start = Instant::now();
        sim_time += timestep_size;

        for ((vehicle, driver), binding) in vehicles
            .iter_mut()
            .zip(drivers.iter_mut())
            .zip(bindings.iter())
        {
            let axes = driver.control(vehicle, &track);
            vehicle.apply_input(binding, axes);
        }

        for vehicle in vehicles.iter_mut() {
            vehicle.tick(timestep_size as f32, Probes::world(&world));
        }

        for event in volumes.detect(&track, &vehicles, sim_pars.track_pars.ground_height) {
            event_tx
                .send(event)
                .context("Failed to send event to the race engine!")?;
        }

        engine.tick(timestep_size, &vehicles);
        route_messages(
            &message_rx,
            &track,
            &mut vehicles,
            &mut drivers,
            &mut volumes,
            &mut leaderboard,
        );

        match engine.phase() {
            RacePhase::Idle if race_started => break,
            RacePhase::Idle => {}
            _ => race_started = true,
        }

        if engine.phase() == RacePhase::Active && engine.race_time() > t_update_print + 0.9999 {
            debug!(
                "Simulating... Current race time is {:.3}s, leader is vehicle {:?}",
                engine.race_time(),
                engine.ranking().first()
            );
            t_update_print = engine.race_time();
        }

        if let Some(tx) = tx {
            if sim_time > t_update_observer + 1.0 / MAX_OBSERVER_UPDATE_FREQUENCY - 0.001 {
                tx.send(snapshot(&engine, &vehicles, &drivers))
                    .context("Failed to send race snapshot to the observer!")?;
                t_update_observer = sim_time;
            }
        }

        // sleep until time step is finished in real-time as well (calculation in ms)
        if sim_realtime {
            let t_sleep = (timestep_size * 1000.0 / realtime_factor) as i64
                - t_start.elapsed().as_millis() as i64;

            if t_sleep > 0 {
                sleep(Duration::from_millis(t_sleep as u64));
            } else {
                debug!("Could not keep up with real-time!");
            }
        }
    }

    if engine.phase() != RacePhase::Idle {
        warn!("Race did not return to idle in time, stopping it");
        event_tx
            .send(RaceEvent::Control {
                command: RaceCommand::Stop,
            })
            .context("Failed to send stop command!")?;
        engine.tick(0.0, &vehicles);
        route_messages(
            &message_rx,
            &track,
            &mut vehicles,
            &mut drivers,
            &mut volumes,
            &mut leaderboard,
        );
    }

    let result = race_result(&engine, &drivers, leaderboard);

    if let Some(tx) = tx {
        let final_snapshot = RaceSnapshot {
            race_time: engine.race_time(),
            phase: engine.phase(),
            vehicles: Vec::new(),
            final_result: Some(result.clone()),
        };
        tx.send(final_snapshot)
            .context("Failed to send final race result to the observer!")?;
    }

    Ok(result)
}

/// route_messages delivers the messages of the race engine to the vehicles.
fn route_messages(
    rx: &Receiver<RaceMessage>,
    track: &Track,
    vehicles: &mut [Vehicle],
    drivers: &mut [Driver],
    volumes: &mut TriggerVolumes,
    leaderboard: &mut Vec<LeaderboardSubmit>,
) {
    for message in rx.try_iter() {
        match message {
            RaceMessage::RaceControl { command, target } => {
                for vehicle in vehicles
                    .iter_mut()
                    .filter(|v| target.map_or(true, |t| t == v.id))
                {
                    vehicle.on_race_control(command);
                }
            }
            RaceMessage::VehicleProgress(update) => {
                for vehicle in vehicles.iter_mut() {
                    if let Some(submit) = vehicle.on_progress(&update) {
                        info!(
                            "Player {} submitted {}s to the leaderboard",
                            submit.player, submit.elapsed_seconds
                        );
                        leaderboard.push(submit);
                    }
                }
            }
            RaceMessage::ResetToCheckpoint {
                vehicle,
                position,
                rotation,
            } => {
                if let Some(i) = vehicles.iter().position(|v| v.id == vehicle) {
                    vehicles[i].on_reset_to_checkpoint(position, rotation);
                    volumes.reset_pending[i] = false;
                    if let Some(idx) = track
                        .checkpoints()
                        .iter()
                        .position(|c| c.position == position)
                    {
                        drivers[i].retarget(idx, track);
                    }
                }
            }
            RaceMessage::CountdownCue { remaining } => debug!("Race starts in {}s", remaining),
            RaceMessage::JoinResult { player, outcome } => {
                debug!("Join result of player {}: {:?}", player, outcome)
            }
            RaceMessage::VehiclePosition { .. } | RaceMessage::LiveLeaderboard { .. } => {}
        }
    }
}

fn snapshot(engine: &RaceEngine, vehicles: &[Vehicle], drivers: &[Driver]) -> RaceSnapshot {
    let vehicle_snapshots = vehicles
        .iter()
        .zip(drivers.iter())
        .map(|(vehicle, driver)| {
            let mut snapshot = VehicleSnapshot {
                vehicle: vehicle.id,
                occupant: vehicle.occupant(),
                name: driver.name.to_owned(),
                position: vehicle.pose().position.to_array(),
                speed: vehicle.speed(),
                ..VehicleSnapshot::default()
            };
            if let Some(record) = engine.record(vehicle.id) {
                snapshot.rank = record.rank;
                snapshot.lap = record.lap;
                snapshot.score = record.last_score;
                snapshot.finished = record.finished;
                snapshot.disqualified = record.disqualified;
            }
            snapshot
        })
        .collect();

    RaceSnapshot {
        race_time: engine.race_time(),
        phase: engine.phase(),
        vehicles: vehicle_snapshots,
        final_result: None,
    }
}

fn race_result(
    engine: &RaceEngine,
    drivers: &[Driver],
    leaderboard: Vec<LeaderboardSubmit>,
) -> RaceResult {
    let standings = engine
        .last_result()
        .iter()
        .filter_map(|record| {
            let slot = engine.vehicles().iter().position(|v| *v == record.vehicle)?;
            let driver = drivers.get(slot)?;
            Some(Standing {
                rank: record.rank,
                vehicle: record.vehicle,
                driver_initials: driver.initials.to_owned(),
                driver_name: driver.name.to_owned(),
                player: Some(driver.player_id),
                lap: record.lap.min(engine.pars().tot_no_laps),
                finished: record.finished,
                timed_out: record.timed_out,
                disqualified: record.disqualified,
                finish_position: record.finish_position(),
                finish_time: record.finish_time,
            })
        })
        .collect();

    RaceResult {
        track_name: engine.track().name.to_owned(),
        tot_no_laps: engine.pars().tot_no_laps,
        race_time: engine.race_time(),
        completion: engine.completion(),
        standings,
        leaderboard,
    }
}
