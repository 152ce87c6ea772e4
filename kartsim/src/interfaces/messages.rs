use crate::core::race::RacePhase;
use crate::core::roster::JoinOutcome;
use crate::post::race_result::RaceResult;
use crate::{PlayerId, VehicleId};
use glam::{Quat, Vec3};
use serde::Serialize;

pub const MAX_OBSERVER_UPDATE_FREQUENCY: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceCommand {
    Start,
    Stop,
    Finished,
}

/// RaceEvent is everything the race engine consumes. Events are queued on a channel and processed
/// strictly in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceEvent {
    /// Start request that runs the countdown first
    StartRequested,
    Control {
        command: RaceCommand,
    },
    CheckpointCrossed {
        vehicle: VehicleId,
        index: usize,
    },
    HalfwayCrossed {
        vehicle: VehicleId,
    },
    OccupancyChanged {
        vehicle: VehicleId,
        occupant: Option<PlayerId>,
    },
    /// Out of bounds trigger
    ResetRequested {
        vehicle: VehicleId,
    },
    JoinRequest {
        player: PlayerId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VehicleProgressUpdate {
    pub vehicle: VehicleId,
    pub lap: u32,
    pub total_laps: u32,
    pub race_active: bool,
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub vehicle: VehicleId,
    pub occupant: Option<PlayerId>,
    pub rank: u32,
}

/// RaceMessage is everything the race engine broadcasts to vehicles and HUD collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum RaceMessage {
    /// `target` is `None` for a broadcast to all vehicles
    RaceControl {
        command: RaceCommand,
        target: Option<VehicleId>,
    },
    VehiclePosition {
        vehicle: VehicleId,
        rank: u32,
    },
    VehicleProgress(VehicleProgressUpdate),
    ResetToCheckpoint {
        vehicle: VehicleId,
        position: Vec3,
        rotation: Quat,
    },
    LiveLeaderboard {
        rows: Vec<LeaderboardRow>,
    },
    CountdownCue {
        remaining: u32,
    },
    JoinResult {
        player: PlayerId,
        outcome: JoinOutcome,
    },
}

/// LeaderboardSubmit is emitted by a vehicle once when it learns that it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeaderboardSubmit {
    pub player: PlayerId,
    pub elapsed_seconds: u64,
}

// OBSERVER SNAPSHOTS ------------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct VehicleSnapshot {
    pub vehicle: VehicleId,
    pub occupant: Option<PlayerId>,
    pub name: String,
    pub rank: u32,
    pub lap: u32,
    pub score: f64,
    pub position: [f32; 3],
    pub speed: f32,
    pub finished: bool,
    pub disqualified: bool,
}

/// RaceSnapshot is streamed to real-time observers at most `MAX_OBSERVER_UPDATE_FREQUENCY` times
/// per simulated second. The last snapshot of a race carries the final result.
#[derive(Debug, Clone, Default)]
pub struct RaceSnapshot {
    pub race_time: f64,
    pub phase: RacePhase,
    pub vehicles: Vec<VehicleSnapshot>,
    pub final_result: Option<RaceResult>,
}
