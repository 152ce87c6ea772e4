use crate::VehicleId;
use tracing::debug;

/// Outcome of a checkpoint crossing for a single progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingOutcome {
    Advanced { halfway_reached: bool },
    LapCompleted { lap: u32 },
    /// Start/finish crossed without having passed halfway
    LapNotCounted,
    /// Stale, duplicate or too far ahead
    Rejected,
    /// The record is frozen since the vehicle finished
    Ignored,
}

/// VehicleProgress is the race state of one vehicle. It is owned and mutated by the race engine
/// only.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleProgress {
    pub vehicle: VehicleId,
    pub last_checkpoint: usize,
    pub lap: u32,
    pub passed_halfway: bool,
    pub finished: bool,
    pub disqualified: bool,
    pub timed_out: bool,
    finish_position: Option<u32>,
    pub finish_time: Option<f64>,

    // ranking
    pub rank: u32,
    pub last_score: f64,
}

impl VehicleProgress {
    pub fn new(vehicle: VehicleId) -> VehicleProgress {
        VehicleProgress {
            vehicle,
            last_checkpoint: 0,
            lap: 1,
            passed_halfway: false,
            finished: false,
            disqualified: false,
            timed_out: false,
            finish_position: None,
            finish_time: None,
            rank: 0,
            last_score: 0.0,
        }
    }

    pub fn finish_position(&self) -> Option<u32> {
        self.finish_position
    }

    /// cross_checkpoint validates a crossing of checkpoint `index`. The start/finish line (index 0)
    /// counts a lap only if halfway was passed before. Other checkpoints must lie ahead of the last
    /// validated one by at most `skip_tolerance`.
    pub fn cross_checkpoint(
        &mut self,
        index: usize,
        halfway_index: usize,
        skip_tolerance: usize,
    ) -> CrossingOutcome {
        if self.finished {
            return CrossingOutcome::Ignored;
        }

        if index == 0 {
            if !self.passed_halfway {
                debug!(
                    "Vehicle {} crossed start/finish without passing halfway, lap not counted",
                    self.vehicle
                );
                return CrossingOutcome::LapNotCounted;
            }
            self.lap += 1;
            self.last_checkpoint = 0;
            self.passed_halfway = false;
            return CrossingOutcome::LapCompleted { lap: self.lap };
        }

        if index <= self.last_checkpoint || index - self.last_checkpoint > skip_tolerance {
            debug!(
                "Vehicle {} rejected checkpoint {} (last validated {})",
                self.vehicle, index, self.last_checkpoint
            );
            return CrossingOutcome::Rejected;
        }

        self.last_checkpoint = index;
        let halfway_reached = index >= halfway_index && !self.passed_halfway;
        if halfway_reached {
            self.passed_halfway = true;
        }
        CrossingOutcome::Advanced { halfway_reached }
    }

    /// cross_halfway handles the separate halfway volume. It is accepted if the last validated
    /// checkpoint lies within `skip_tolerance` of the halfway checkpoint.
    pub fn cross_halfway(&mut self, halfway_index: usize, skip_tolerance: usize) -> bool {
        if self.finished || self.last_checkpoint + skip_tolerance < halfway_index {
            return false;
        }
        self.passed_halfway = true;
        true
    }

    /// finish marks the record finished. The finish position is assigned once and never changed
    /// afterwards, later calls return false.
    pub fn finish(&mut self, position: u32, race_time: f64) -> bool {
        if self.finish_position.is_some() {
            return false;
        }
        self.finished = true;
        self.finish_position = Some(position);
        self.finish_time = Some(race_time);
        true
    }

    /// base_score is the score of the vehicle standing exactly on its last validated checkpoint.
    pub fn base_score(&self, checkpoint_count: usize) -> f64 {
        (self.lap as f64 - 1.0) * checkpoint_count as f64 + self.last_checkpoint as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HALFWAY: usize = 2;
    const SKIP: usize = 3;

    #[test]
    fn checkpoints_must_move_forward_within_tolerance() {
        let mut record = VehicleProgress::new(1);
        assert_eq!(
            record.cross_checkpoint(3, HALFWAY, SKIP),
            CrossingOutcome::Advanced {
                halfway_reached: true
            }
        );
        assert_eq!(record.cross_checkpoint(1, HALFWAY, SKIP), CrossingOutcome::Rejected);
        assert_eq!(record.cross_checkpoint(3, HALFWAY, SKIP), CrossingOutcome::Rejected);
        assert_eq!(record.last_checkpoint, 3);

        let mut record = VehicleProgress::new(2);
        assert_eq!(record.cross_checkpoint(4, 5, SKIP), CrossingOutcome::Rejected);
        assert_eq!(record.last_checkpoint, 0);
    }

    #[test]
    fn lap_needs_halfway() {
        let mut record = VehicleProgress::new(1);
        assert_eq!(record.cross_checkpoint(0, HALFWAY, SKIP), CrossingOutcome::LapNotCounted);
        assert_eq!(record.lap, 1);

        record.cross_checkpoint(1, HALFWAY, SKIP);
        record.cross_checkpoint(2, HALFWAY, SKIP);
        assert!(record.passed_halfway);
        assert_eq!(
            record.cross_checkpoint(0, HALFWAY, SKIP),
            CrossingOutcome::LapCompleted { lap: 2 }
        );
        assert!(!record.passed_halfway);
        assert_eq!(record.last_checkpoint, 0);

        // oscillating across the line does not count again
        assert_eq!(record.cross_checkpoint(0, HALFWAY, SKIP), CrossingOutcome::LapNotCounted);
        assert_eq!(record.lap, 2);
    }

    #[test]
    fn halfway_volume_within_tolerance() {
        let mut record = VehicleProgress::new(1);
        assert!(!record.cross_halfway(5, SKIP));
        record.cross_checkpoint(2, 5, SKIP);
        assert!(record.cross_halfway(5, SKIP));
        assert!(record.passed_halfway);
    }

    #[test]
    fn finish_position_is_immutable() {
        let mut record = VehicleProgress::new(1);
        assert!(record.finish(1, 30.0));
        assert!(!record.finish(2, 31.0));
        assert_eq!(record.finish_position(), Some(1));
        assert_eq!(record.finish_time, Some(30.0));
        assert_eq!(record.cross_checkpoint(1, HALFWAY, SKIP), CrossingOutcome::Ignored);
    }
}
