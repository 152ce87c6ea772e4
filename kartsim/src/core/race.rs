use crate::core::progress::{CrossingOutcome, VehicleProgress};
use crate::core::roster::Roster;
use crate::core::scheduler::Scheduler;
use crate::core::track::Track;
use crate::interfaces::messages::{
    LeaderboardRow, RaceCommand, RaceEvent, RaceMessage, VehicleProgressUpdate,
};
use crate::{PlayerId, VehicleId};
use anyhow::Context;
use flume::{Receiver, Sender};
use glam::Vec3;
use helpers::general::{argsort, InputValueError, SortOrder};
use helpers::geometry::segment_fraction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Score offset of finished vehicles, larger than any score an unfinished vehicle can reach.
pub const FINISHED_SCORE_BASE: f64 = 1_000_000.0;
pub const MAX_VEHICLES: usize = 8;

/// * `tot_no_laps` - Number of laps to finish the race
/// * `skip_tolerance` - Maximum number of checkpoints a vehicle may skip
/// * `max_race_duration` - (s) The race is force-completed after this time
/// * `completion_cooldown` - (s) Time between race completion and the reset to idle
/// * `ranking_interval` - (s) Interval of the periodic ranking update
/// * `max_virtual_advances` - Maximum number of segments the scoring looks ahead of the last
/// validated checkpoint
/// * `countdown_duration` - (s) Duration of the start countdown
/// * `countdown_cues` - (s) Remaining countdown times at which a cue is sent
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RacePars {
    pub tot_no_laps: u32,
    pub skip_tolerance: usize,
    pub max_race_duration: f64,
    pub completion_cooldown: f64,
    pub ranking_interval: f64,
    pub max_virtual_advances: usize,
    pub countdown_duration: f64,
    pub countdown_cues: Vec<u32>,
}

impl Default for RacePars {
    fn default() -> Self {
        RacePars {
            tot_no_laps: 3,
            skip_tolerance: 3,
            max_race_duration: 600.0,
            completion_cooldown: 15.0,
            ranking_interval: 0.25,
            max_virtual_advances: 5,
            countdown_duration: 9.0,
            countdown_cues: vec![9, 4, 3, 2, 1],
        }
    }
}

impl RacePars {
    pub fn validate(&self, checkpoint_count: usize) -> anyhow::Result<()> {
        if self.tot_no_laps == 0 {
            return Err(InputValueError).context("Race must have at least one lap!");
        }
        if self.skip_tolerance == 0 {
            return Err(InputValueError).context("Skip tolerance must be at least 1!");
        }
        if self.ranking_interval <= 0.0 || self.max_race_duration <= 0.0 {
            return Err(InputValueError)
                .context("Ranking interval and maximum race duration must be positive!");
        }
        if self.completion_cooldown < 0.0 || self.countdown_duration < 0.0 {
            return Err(InputValueError)
                .context("Completion cooldown and countdown duration must not be negative!");
        }
        if self.tot_no_laps as f64 * checkpoint_count as f64 >= FINISHED_SCORE_BASE {
            return Err(InputValueError).context(format!(
                "{} laps of {} checkpoints exceed the finished score offset!",
                self.tot_no_laps, checkpoint_count
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RacePhase {
    #[default]
    Idle,
    Countdown,
    Active,
    Completed,
}

/// CompletionReason tells why an active race was completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    AllFinished,
    TimedOut,
    Commanded,
}

/// PoseSource gives the race engine read access to the current vehicle positions.
pub trait PoseSource {
    fn position(&self, vehicle: VehicleId) -> Option<Vec3>;
}

impl PoseSource for HashMap<VehicleId, Vec3> {
    fn position(&self, vehicle: VehicleId) -> Option<Vec3> {
        self.get(&vehicle).copied()
    }
}

/// Placement is the geometry-free ordering of a vehicle, see `RaceEngine::placements`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub position: u32,
    pub vehicle: VehicleId,
    pub lap: u32,
    pub finished: bool,
    pub disqualified: bool,
}

/// Timed actions carry the generation of the race they were scheduled for, actions of an older
/// generation are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimedAction {
    CountdownCue { generation: u64, remaining: u32 },
    CountdownDone { generation: u64 },
    CompletionReset { generation: u64 },
}

/// RaceEngine is the single authority on race progress. It consumes `RaceEvent`s from a channel,
/// keeps one `VehicleProgress` record per vehicle and broadcasts `RaceMessage`s.
#[derive(Debug)]
pub struct RaceEngine {
    pars: RacePars,
    track: Arc<Track>,
    vehicles: Vec<VehicleId>,
    occupancy: BTreeMap<VehicleId, Option<PlayerId>>,
    records: BTreeMap<VehicleId, VehicleProgress>,
    last_result: Vec<VehicleProgress>,
    completion: Option<CompletionReason>,
    roster: Roster,

    phase: RacePhase,
    generation: u64,
    clock: f64,
    race_time: f64,
    ranking_timer: f64,
    next_finish_position: u32,
    scheduler: Scheduler<TimedAction>,

    rx: Receiver<RaceEvent>,
    tx: Sender<RaceMessage>,
}

impl RaceEngine {
    pub fn new(
        race_pars: &RacePars,
        track: Arc<Track>,
        vehicles: &[VehicleId],
        rx: Receiver<RaceEvent>,
        tx: Sender<RaceMessage>,
    ) -> anyhow::Result<RaceEngine> {
        race_pars.validate(track.checkpoint_count())?;

        if vehicles.is_empty() || vehicles.len() > MAX_VEHICLES {
            return Err(InputValueError).context(format!(
                "A race needs between 1 and {} vehicles, {} were given!",
                MAX_VEHICLES,
                vehicles.len()
            ));
        }

        let mut vehicles_sorted = vehicles.to_vec();
        vehicles_sorted.sort_unstable();
        vehicles_sorted.dedup();
        if vehicles_sorted.len() != vehicles.len() {
            return Err(InputValueError).context("Vehicle ids must be unique!");
        }

        Ok(RaceEngine {
            pars: race_pars.to_owned(),
            track,
            occupancy: vehicles_sorted.iter().map(|v| (*v, None)).collect(),
            vehicles: vehicles_sorted,
            records: BTreeMap::new(),
            last_result: Vec::new(),
            completion: None,
            roster: Roster::default(),
            phase: RacePhase::Idle,
            generation: 0,
            clock: 0.0,
            race_time: 0.0,
            ranking_timer: 0.0,
            next_finish_position: 1,
            scheduler: Scheduler::new(),
            rx,
            tx,
        })
    }

    // GETTERS -------------------------------------------------------------------------------------
    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn race_time(&self) -> f64 {
        self.race_time
    }

    pub fn pars(&self) -> &RacePars {
        &self.pars
    }

    pub fn track(&self) -> &Arc<Track> {
        &self.track
    }

    pub fn vehicles(&self) -> &[VehicleId] {
        &self.vehicles
    }

    pub fn record(&self, vehicle: VehicleId) -> Option<&VehicleProgress> {
        self.records.get(&vehicle)
    }

    /// last_result contains the records of the last race that returned to idle, in rank order.
    pub fn last_result(&self) -> &[VehicleProgress] {
        &self.last_result
    }

    /// completion is the reason the last race was completed. It is `None` while the race is
    /// running and if the last race was stopped before completion.
    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn occupant(&self, vehicle: VehicleId) -> Option<PlayerId> {
        self.occupancy.get(&vehicle).copied().flatten()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// ranking returns the vehicles ordered by their current rank.
    pub fn ranking(&self) -> Vec<VehicleId> {
        let mut ranked: Vec<&VehicleProgress> = self.records.values().collect();
        ranked.sort_by_key(|r| r.rank);
        ranked.iter().map(|r| r.vehicle).collect()
    }

    // MAIN METHOD ---------------------------------------------------------------------------------
    /// tick processes all queued events, fires due timers and, while the race is active, advances
    /// the race time, updates the ranking and checks the race timeout.
    pub fn tick(&mut self, dt: f64, poses: &dyn PoseSource) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.clock += dt;

        let events: Vec<RaceEvent> = self.rx.try_iter().collect();
        for event in events {
            self.process_event(event, poses);
        }

        for action in self.scheduler.drain_due(self.clock) {
            self.fire(action, poses);
        }

        if self.phase != RacePhase::Active {
            return;
        }

        self.race_time += dt;
        self.ranking_timer += dt;

        if self.ranking_timer >= self.pars.ranking_interval {
            self.ranking_timer = 0.0;
            self.update_positions(poses);
        }

        if self.phase == RacePhase::Active && self.race_time >= self.pars.max_race_duration {
            info!(
                "Race exceeded {:.1}s, forcing completion",
                self.pars.max_race_duration
            );
            self.force_complete(CompletionReason::TimedOut, poses);
        }
    }

    pub fn process_event(&mut self, event: RaceEvent, poses: &dyn PoseSource) {
        match event {
            RaceEvent::StartRequested => {
                if self.phase == RacePhase::Idle {
                    self.begin_countdown();
                } else {
                    debug!("Start request ignored in phase {:?}", self.phase);
                }
            }
            RaceEvent::Control { command } => self.on_control(command, poses),
            RaceEvent::CheckpointCrossed { vehicle, index } => {
                self.on_checkpoint(vehicle, index, poses)
            }
            RaceEvent::HalfwayCrossed { vehicle } => self.on_halfway(vehicle),
            RaceEvent::OccupancyChanged { vehicle, occupant } => {
                self.on_occupancy(vehicle, occupant)
            }
            RaceEvent::ResetRequested { vehicle } => self.on_reset_requested(vehicle),
            RaceEvent::JoinRequest { player } => {
                let outcome = self.roster.join(player, self.phase != RacePhase::Idle);
                debug!("Join request of player {}: {:?}", player, outcome);
                self.send(RaceMessage::JoinResult { player, outcome });
            }
        }
    }

    // LIFECYCLE -----------------------------------------------------------------------------------
    fn on_control(&mut self, command: RaceCommand, poses: &dyn PoseSource) {
        match command {
            RaceCommand::Start => match self.phase {
                RacePhase::Idle | RacePhase::Countdown => self.start_race(poses),
                _ => debug!("Start command ignored in phase {:?}", self.phase),
            },
            RaceCommand::Stop => {
                if self.phase == RacePhase::Idle {
                    debug!("Stop command ignored, no race running");
                } else {
                    self.stop_race(poses);
                }
            }
            RaceCommand::Finished => {
                if self.phase == RacePhase::Active {
                    self.force_complete(CompletionReason::Commanded, poses);
                } else {
                    debug!("Finished command ignored in phase {:?}", self.phase);
                }
            }
        }
    }

    fn begin_countdown(&mut self) {
        self.generation += 1;
        self.scheduler.clear();
        self.phase = RacePhase::Countdown;

        let duration = self.pars.countdown_duration;
        for remaining in self.pars.countdown_cues.iter() {
            if *remaining as f64 <= duration {
                self.scheduler.schedule(
                    self.clock + duration - *remaining as f64,
                    TimedAction::CountdownCue {
                        generation: self.generation,
                        remaining: *remaining,
                    },
                );
            }
        }
        self.scheduler.schedule(
            self.clock + duration,
            TimedAction::CountdownDone {
                generation: self.generation,
            },
        );
        info!("Race countdown started ({:.1}s)", duration);
    }

    fn start_race(&mut self, poses: &dyn PoseSource) {
        self.generation += 1;
        self.scheduler.clear();
        self.phase = RacePhase::Active;

        self.records = self
            .vehicles
            .iter()
            .map(|v| (*v, VehicleProgress::new(*v)))
            .collect();
        self.next_finish_position = 1;
        self.completion = None;
        self.race_time = 0.0;
        self.ranking_timer = 0.0;

        self.send(RaceMessage::LiveLeaderboard { rows: Vec::new() });
        info!("Race started with {} vehicles", self.vehicles.len());

        self.update_positions(poses);
        self.send(RaceMessage::RaceControl {
            command: RaceCommand::Start,
            target: None,
        });
        self.broadcast_progress();
    }

    fn stop_race(&mut self, poses: &dyn PoseSource) {
        let was_active = self.phase == RacePhase::Active;
        self.generation += 1;
        self.scheduler.clear();

        if was_active {
            self.rank_vehicles(poses);
        }
        self.phase = RacePhase::Idle;

        self.broadcast_progress();
        self.send(RaceMessage::RaceControl {
            command: RaceCommand::Stop,
            target: None,
        });

        if !self.records.is_empty() {
            let mut records: Vec<VehicleProgress> = self.records.values().cloned().collect();
            records.sort_by_key(|r| r.rank);
            self.last_result = records;
        }
        self.records.clear();
        self.roster.clear();
        info!("Race stopped");
    }

    fn complete_race(&mut self, reason: CompletionReason) {
        self.phase = RacePhase::Completed;
        self.completion = Some(reason);
        self.scheduler.schedule(
            self.clock + self.pars.completion_cooldown,
            TimedAction::CompletionReset {
                generation: self.generation,
            },
        );
        match reason {
            CompletionReason::AllFinished => info!("All vehicles have finished, race complete"),
            CompletionReason::TimedOut => info!("Race time limit reached, race complete"),
            CompletionReason::Commanded => info!("Race completed by command"),
        }
    }

    /// force_complete ends the race for all vehicles that have not finished yet. They are marked
    /// as finished (timed out) behind the real finishers in their current ranking order.
    fn force_complete(&mut self, reason: CompletionReason, poses: &dyn PoseSource) {
        self.rank_vehicles(poses);

        for vehicle in self.ranking() {
            let position = self.next_finish_position;
            let race_time = self.race_time;
            if let Some(record) = self.records.get_mut(&vehicle) {
                if !record.finished && record.finish(position, race_time) {
                    record.timed_out = true;
                    self.next_finish_position += 1;
                }
            }
        }

        self.phase = RacePhase::Completed;
        self.rank_vehicles(poses);
        self.broadcast_progress();
        self.complete_race(reason);
    }

    fn fire(&mut self, action: TimedAction, poses: &dyn PoseSource) {
        match action {
            TimedAction::CountdownCue {
                generation,
                remaining,
            } => {
                if generation == self.generation && self.phase == RacePhase::Countdown {
                    self.send(RaceMessage::CountdownCue { remaining });
                }
            }
            TimedAction::CountdownDone { generation } => {
                if generation == self.generation && self.phase == RacePhase::Countdown {
                    self.start_race(poses);
                }
            }
            TimedAction::CompletionReset { generation } => {
                if generation == self.generation && self.phase == RacePhase::Completed {
                    self.send(RaceMessage::RaceControl {
                        command: RaceCommand::Finished,
                        target: None,
                    });
                    self.stop_race(poses);
                }
            }
        }
    }

    // EVENT HANDLING ------------------------------------------------------------------------------
    fn on_checkpoint(&mut self, vehicle: VehicleId, index: usize, poses: &dyn PoseSource) {
        if self.phase != RacePhase::Active {
            return;
        }
        if index >= self.track.checkpoint_count() {
            warn!("Vehicle {} crossed unknown checkpoint {}", vehicle, index);
            return;
        }

        let halfway_index = self.track.halfway_index();
        let skip_tolerance = self.pars.skip_tolerance;
        let outcome = match self.records.get_mut(&vehicle) {
            Some(record) => record.cross_checkpoint(index, halfway_index, skip_tolerance),
            None => {
                debug!("Checkpoint crossing of unknown vehicle {}", vehicle);
                return;
            }
        };

        match outcome {
            CrossingOutcome::LapCompleted { lap } => {
                debug!("Vehicle {} started lap {}", vehicle, lap);
                if lap > self.pars.tot_no_laps {
                    self.finish_vehicle(vehicle);
                }
                self.broadcast_progress();
            }
            CrossingOutcome::LapNotCounted => self.broadcast_progress(),
            CrossingOutcome::Advanced { halfway_reached } => {
                if halfway_reached {
                    debug!("Vehicle {} passed halfway", vehicle);
                }
            }
            CrossingOutcome::Rejected | CrossingOutcome::Ignored => {}
        }

        self.update_positions(poses);
    }

    fn finish_vehicle(&mut self, vehicle: VehicleId) {
        let position = self.next_finish_position;
        let race_time = self.race_time;

        let newly_finished = match self.records.get_mut(&vehicle) {
            Some(record) => record.finish(position, race_time),
            None => false,
        };
        if !newly_finished {
            return;
        }
        self.next_finish_position += 1;
        info!(
            "Vehicle {} finished in position {} after {:.2}s",
            vehicle, position, race_time
        );

        // the first finisher disqualifies everybody who never left the start
        if position == 1 {
            let mut not_started = vec![];
            for record in self.records.values_mut() {
                if !record.finished
                    && !record.disqualified
                    && record.lap == 1
                    && record.last_checkpoint == 0
                {
                    record.disqualified = true;
                    not_started.push(record.vehicle);
                }
            }
            for other in not_started {
                info!("Vehicle {} did not move, disqualified", other);
                self.send(RaceMessage::RaceControl {
                    command: RaceCommand::Stop,
                    target: Some(other),
                });
            }
        }

        self.send(RaceMessage::RaceControl {
            command: RaceCommand::Stop,
            target: Some(vehicle),
        });
    }

    fn on_halfway(&mut self, vehicle: VehicleId) {
        if self.phase != RacePhase::Active {
            return;
        }
        let halfway_index = self.track.halfway_index();
        let skip_tolerance = self.pars.skip_tolerance;
        if let Some(record) = self.records.get_mut(&vehicle) {
            if record.cross_halfway(halfway_index, skip_tolerance) {
                debug!("Vehicle {} passed the halfway marker", vehicle);
            }
        }
    }

    fn on_occupancy(&mut self, vehicle: VehicleId, occupant: Option<PlayerId>) {
        if !self.vehicles.contains(&vehicle) {
            warn!("Occupancy change of unknown vehicle {}", vehicle);
            return;
        }
        self.occupancy.insert(vehicle, occupant);

        match occupant {
            None => {
                if self.phase != RacePhase::Active {
                    return;
                }
                if let Some(record) = self.records.get_mut(&vehicle) {
                    if !record.finished && !record.disqualified {
                        record.disqualified = true;
                        info!("Vehicle {} disqualified (no occupant)", vehicle);
                    }
                }
            }
            Some(player) => {
                if let Some(record) = self.records.get_mut(&vehicle) {
                    if record.disqualified {
                        info!("Vehicle {} back in the race with player {}", vehicle, player);
                    }
                    record.disqualified = false;
                }
                if let Some(record) = self.records.get(&vehicle) {
                    self.send(RaceMessage::VehicleProgress(self.progress_update(record)));
                }
            }
        }
    }

    fn on_reset_requested(&mut self, vehicle: VehicleId) {
        let record = match self.records.get(&vehicle) {
            Some(record) => record,
            None => {
                debug!("Reset request of vehicle {} without progress record", vehicle);
                return;
            }
        };
        let checkpoint = match self.track.checkpoint(record.last_checkpoint) {
            Some(checkpoint) => *checkpoint,
            None => return,
        };
        debug!(
            "Vehicle {} reset to checkpoint {}",
            vehicle, record.last_checkpoint
        );
        self.send(RaceMessage::ResetToCheckpoint {
            vehicle,
            position: checkpoint.position,
            rotation: checkpoint.rotation,
        });
    }

    // SCORING AND RANKING -------------------------------------------------------------------------
    /// progress_score returns the continuous progress of a vehicle. Finished vehicles score
    /// `FINISHED_SCORE_BASE + finish position`. Unfinished vehicles score
    /// `(lap - 1) * checkpoint_count + checkpoint + t`, where the vehicle position is projected
    /// onto the segment following its last validated checkpoint. If the vehicle is already beyond that
    /// segment, the following segments are tried (at most `max_virtual_advances` times) without
    /// touching the record.
    pub fn progress_score(&self, record: &VehicleProgress, poses: &dyn PoseSource) -> f64 {
        if let Some(position) = record.finish_position() {
            return FINISHED_SCORE_BASE + position as f64;
        }

        let checkpoint_count = self.track.checkpoint_count();
        let base = record.base_score(checkpoint_count);
        let fallback = record.last_score.max(base);

        let position = match poses.position(record.vehicle) {
            Some(position) if position.is_finite() => position,
            _ => return fallback,
        };

        let mut checkpoint = record.last_checkpoint;
        let mut t = 0.0;
        let mut advances = 0;

        while let Some((a, b)) = self.track.segment(checkpoint) {
            let proj = match segment_fraction(position, a, b) {
                Some(proj) => proj,
                None => return fallback,
            };
            if proj <= 1.0 || advances >= self.pars.max_virtual_advances {
                t = proj.clamp(0.0, 1.0) as f64;
                break;
            }
            checkpoint += 1;
            advances += 1;
        }

        base + (checkpoint - record.last_checkpoint) as f64 + t
    }

    fn update_positions(&mut self, poses: &dyn PoseSource) {
        self.rank_vehicles(poses);
        self.check_completion();
    }

    /// rank_vehicles recomputes all scores and ranks. Finished vehicles come first ordered by
    /// finish position, the rest follows by descending score. Ties keep the vehicle id order.
    fn rank_vehicles(&mut self, poses: &dyn PoseSource) {
        if self.records.is_empty() {
            return;
        }

        let scores: Vec<f64> = self
            .records
            .values()
            .map(|r| self.progress_score(r, poses))
            .collect();
        for (record, score) in self.records.values_mut().zip(scores) {
            record.last_score = score;
        }

        let (finished, unfinished): (Vec<&VehicleProgress>, Vec<&VehicleProgress>) =
            self.records.values().partition(|r| r.finished);
        let finish_positions: Vec<u32> = finished
            .iter()
            .map(|r| r.finish_position().unwrap_or(u32::MAX))
            .collect();
        let unfinished_scores: Vec<f64> = unfinished.iter().map(|r| r.last_score).collect();

        let mut order: Vec<VehicleId> = argsort(&finish_positions, SortOrder::Ascending)
            .into_iter()
            .map(|i| finished[i].vehicle)
            .collect();
        order.extend(
            argsort(&unfinished_scores, SortOrder::Descending)
                .into_iter()
                .map(|i| unfinished[i].vehicle),
        );

        let mut rows = Vec::with_capacity(order.len());
        for (i, vehicle) in order.iter().enumerate() {
            let rank = i as u32 + 1;
            if let Some(record) = self.records.get_mut(vehicle) {
                record.rank = rank;
            }
            self.send(RaceMessage::VehiclePosition {
                vehicle: *vehicle,
                rank,
            });
            rows.push(LeaderboardRow {
                vehicle: *vehicle,
                occupant: self.occupant(*vehicle),
                rank,
            });
        }

        if self.phase == RacePhase::Active {
            self.send(RaceMessage::LiveLeaderboard { rows });
        }
    }

    fn check_completion(&mut self) {
        if self.phase != RacePhase::Active {
            return;
        }
        let mut active = self.records.values().filter(|r| !r.disqualified).peekable();
        if active.peek().is_some() && active.all(|r| r.finished) {
            self.complete_race(CompletionReason::AllFinished);
        }
    }

    /// placements orders the vehicles by (finished, finish position), then lap and then the last
    /// validated checkpoint, both descending. It does not depend on vehicle positions.
    pub fn placements(&self) -> Vec<Placement> {
        let mut records: Vec<&VehicleProgress> = self.records.values().collect();
        records.sort_by(|a, b| {
            b.finished
                .cmp(&a.finished)
                .then_with(|| {
                    a.finish_position()
                        .unwrap_or(u32::MAX)
                        .cmp(&b.finish_position().unwrap_or(u32::MAX))
                })
                .then_with(|| b.lap.cmp(&a.lap))
                .then_with(|| b.last_checkpoint.cmp(&a.last_checkpoint))
        });

        records
            .iter()
            .enumerate()
            .map(|(i, r)| Placement {
                position: i as u32 + 1,
                vehicle: r.vehicle,
                lap: r.lap,
                finished: r.finished,
                disqualified: r.disqualified,
            })
            .collect()
    }

    // MESSAGING -----------------------------------------------------------------------------------
    fn progress_update(&self, record: &VehicleProgress) -> VehicleProgressUpdate {
        VehicleProgressUpdate {
            vehicle: record.vehicle,
            lap: record.lap.min(self.pars.tot_no_laps),
            total_laps: self.pars.tot_no_laps,
            race_active: self.phase == RacePhase::Active,
            finished: record.finished,
        }
    }

    fn broadcast_progress(&self) {
        for record in self.records.values() {
            self.send(RaceMessage::VehicleProgress(self.progress_update(record)));
        }
    }

    fn send(&self, message: RaceMessage) {
        if self.tx.send(message).is_err() {
            debug!("Race message dropped, no receiver connected");
        }
    }
}
