use flume::{Receiver, Sender};
use glam::{Quat, Vec3};
use kartsim::core::race::{CompletionReason, RaceEngine, RacePars, RacePhase};
use kartsim::core::track::{Checkpoint, Track};
use kartsim::interfaces::messages::{RaceCommand, RaceEvent, RaceMessage};
use kartsim::VehicleId;
use std::collections::HashMap;
use std::sync::Arc;

const A: VehicleId = 1;
const B: VehicleId = 2;

fn square_track() -> Arc<Track> {
    let checkpoints = [
        [0.0, 0.0, 0.0],
        [50.0, 0.0, 0.0],
        [50.0, 0.0, 50.0],
        [0.0, 0.0, 50.0],
    ]
    .iter()
    .map(|p| Checkpoint {
        position: Vec3::from(*p),
        rotation: Quat::IDENTITY,
    })
    .collect();
    Arc::new(Track::from_checkpoints("square", checkpoints).unwrap())
}

struct Race {
    engine: RaceEngine,
    events: Sender<RaceEvent>,
    messages: Receiver<RaceMessage>,
    poses: HashMap<VehicleId, Vec3>,
}

impl Race {
    fn start(pars: RacePars) -> Race {
        let (events, event_rx) = flume::unbounded();
        let (message_tx, messages) = flume::unbounded();
        let engine =
            RaceEngine::new(&pars, square_track(), &[A, B], event_rx, message_tx).unwrap();
        let poses = [(A, Vec3::ZERO), (B, Vec3::ZERO)].into_iter().collect();

        let mut race = Race {
            engine,
            events,
            messages,
            poses,
        };
        race.event(RaceEvent::Control {
            command: RaceCommand::Start,
        });
        assert_eq!(race.engine.phase(), RacePhase::Active);
        race
    }

    fn event(&mut self, event: RaceEvent) {
        self.events.send(event).unwrap();
        self.engine.tick(0.0, &self.poses);
    }

    fn cross(&mut self, vehicle: VehicleId, index: usize) {
        self.event(RaceEvent::CheckpointCrossed { vehicle, index });
    }

    fn drain(&self) -> Vec<RaceMessage> {
        self.messages.try_iter().collect()
    }
}

#[test]
fn scenario_a_first_finisher() {
    let pars = RacePars {
        tot_no_laps: 2,
        ..RacePars::default()
    };
    let mut race = Race::start(pars);

    race.cross(A, 1);
    race.cross(A, 2);
    race.event(RaceEvent::HalfwayCrossed { vehicle: A });
    race.cross(A, 3);
    race.cross(A, 0);
    assert_eq!(race.engine.record(A).unwrap().lap, 2);
    assert!(!race.engine.record(A).unwrap().finished);

    race.cross(A, 1);
    race.cross(A, 2);
    race.cross(A, 3);
    race.cross(A, 0);

    let a = race.engine.record(A).unwrap();
    assert!(a.finished);
    assert_eq!(a.finish_position(), Some(1));
    assert_eq!(a.rank, 1);

    let b = race.engine.record(B).unwrap();
    assert!(!b.finished);
    assert_eq!(b.rank, 2);
    // B never left the start line
    assert!(b.disqualified);

    let messages = race.drain();
    assert!(messages.contains(&RaceMessage::VehiclePosition { vehicle: A, rank: 1 }));
    assert!(messages.contains(&RaceMessage::RaceControl {
        command: RaceCommand::Stop,
        target: Some(A)
    }));
    assert!(messages.iter().any(|m| matches!(
        m,
        RaceMessage::VehicleProgress(update)
            if update.vehicle == A && update.finished && update.lap == 2 && update.total_laps == 2
    )));

    // the only remaining vehicle is disqualified, so the race is complete
    assert_eq!(race.engine.phase(), RacePhase::Completed);
    assert_eq!(race.engine.completion(), Some(CompletionReason::AllFinished));
}

#[test]
fn scenario_a_race_continues_while_others_drive() {
    let pars = RacePars {
        tot_no_laps: 1,
        ..RacePars::default()
    };
    let mut race = Race::start(pars);

    race.cross(B, 1);
    race.poses.insert(B, Vec3::new(50.0, 0.0, 10.0));
    race.cross(A, 1);
    race.cross(A, 2);
    race.cross(A, 3);
    race.cross(A, 0);

    assert!(race.engine.record(A).unwrap().finished);
    assert!(!race.engine.record(B).unwrap().disqualified);
    assert_eq!(race.engine.phase(), RacePhase::Active);
    assert_eq!(race.engine.ranking(), vec![A, B]);

    race.cross(B, 2);
    assert_eq!(race.engine.completion(), None);
    race.cross(B, 0);
    assert_eq!(race.engine.record(B).unwrap().finish_position(), Some(2));
    assert_eq!(race.engine.phase(), RacePhase::Completed);
    assert_eq!(race.engine.completion(), Some(CompletionReason::AllFinished));
}

#[test]
fn scenario_b_backwards_crossing_is_rejected() {
    let mut race = Race::start(RacePars::default());

    race.cross(A, 3);
    let before = race.engine.record(A).unwrap().clone();
    race.cross(A, 1);

    let after = race.engine.record(A).unwrap();
    assert_eq!(after.last_checkpoint, 3);
    assert_eq!(after.lap, before.lap);
    assert_eq!(after.passed_halfway, before.passed_halfway);
}

#[test]
fn scenario_c_timeout_force_completes() {
    let pars = RacePars {
        tot_no_laps: 1,
        max_race_duration: 30.0,
        completion_cooldown: 5.0,
        ..RacePars::default()
    };
    let mut race = Race::start(pars);

    race.cross(B, 1);
    race.cross(A, 1);
    race.cross(A, 2);
    race.cross(A, 0);
    assert!(race.engine.record(A).unwrap().finished);
    race.drain();

    for _ in 0..120 {
        race.engine.tick(0.25, &race.poses);
    }
    assert_eq!(race.engine.phase(), RacePhase::Completed);
    assert_eq!(race.engine.completion(), Some(CompletionReason::TimedOut));

    let b = race.engine.record(B).unwrap();
    assert!(b.finished);
    assert!(b.timed_out);
    assert!(!b.disqualified);
    assert_eq!(b.finish_position(), Some(2));

    let messages = race.drain();
    assert!(messages.iter().any(|m| matches!(
        m,
        RaceMessage::VehicleProgress(update)
            if update.vehicle == B && update.finished && !update.race_active
    )));

    for _ in 0..24 {
        race.engine.tick(0.25, &race.poses);
    }
    assert_eq!(race.engine.phase(), RacePhase::Idle);
    assert!(race.drain().contains(&RaceMessage::RaceControl {
        command: RaceCommand::Finished,
        target: None
    }));

    // the result survives the reset to idle
    let result = race.engine.last_result();
    assert_eq!(result.len(), 2);
    assert_eq!(result[0].vehicle, A);
    assert_eq!(race.engine.completion(), Some(CompletionReason::TimedOut));
    assert!(result[1].finished && result[1].timed_out);
}

#[test]
fn finished_command_force_completes() {
    let mut race = Race::start(RacePars::default());
    race.cross(B, 1);
    race.event(RaceEvent::Control {
        command: RaceCommand::Finished,
    });

    assert_eq!(race.engine.phase(), RacePhase::Completed);
    assert_eq!(race.engine.completion(), Some(CompletionReason::Commanded));
    assert_eq!(race.engine.record(B).unwrap().finish_position(), Some(1));
    assert_eq!(race.engine.record(A).unwrap().finish_position(), Some(2));
}

#[test]
fn virtual_advance_bound_under_ranks_far_ahead_vehicle() {
    // 12 checkpoints on a line, vehicle A validated checkpoint 0 only but drives far ahead
    let checkpoints = (0..12)
        .map(|i| Checkpoint {
            position: Vec3::new(10.0 * i as f32, 0.0, 0.0),
            rotation: Quat::IDENTITY,
        })
        .collect();
    let track = Arc::new(Track::from_checkpoints("line", checkpoints).unwrap());

    let (events, event_rx) = flume::unbounded();
    let (message_tx, _messages) = flume::unbounded();
    let mut engine =
        RaceEngine::new(&RacePars::default(), track, &[A, B], event_rx, message_tx).unwrap();
    let mut poses: HashMap<VehicleId, Vec3> = HashMap::new();
    poses.insert(A, Vec3::new(95.0, 0.0, 0.0));
    poses.insert(B, Vec3::new(65.0, 0.0, 0.0));

    events
        .send(RaceEvent::Control {
            command: RaceCommand::Start,
        })
        .unwrap();
    for index in [3, 6] {
        events
            .send(RaceEvent::CheckpointCrossed { vehicle: B, index })
            .unwrap();
    }
    engine.tick(0.25, &poses);

    // A is 9.5 segments ahead of the start, but only 6 are counted; B is at 6.5
    assert_eq!(engine.ranking(), vec![B, A]);
}
