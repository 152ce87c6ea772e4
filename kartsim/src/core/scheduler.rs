use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug)]
struct ScheduledAction<A> {
    fire_at: f64,
    id: u64,
    action: A,
}

// BinaryHeap is a max-heap, the ordering is reversed to pop the earliest action first. Actions
// scheduled for the same time fire in scheduling order.
impl<A> Ord for ScheduledAction<A> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .total_cmp(&self.fire_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl<A> PartialOrd for ScheduledAction<A> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<A> PartialEq for ScheduledAction<A> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<A> Eq for ScheduledAction<A> {}

/// Scheduler holds timed actions against a simulation clock. Due actions are drained once per
/// tick by the owner.
#[derive(Debug)]
pub struct Scheduler<A> {
    queue: BinaryHeap<ScheduledAction<A>>,
    next_id: u64,
}

impl<A> Default for Scheduler<A> {
    fn default() -> Self {
        Scheduler {
            queue: BinaryHeap::new(),
            next_id: 0,
        }
    }
}

impl<A> Scheduler<A> {
    pub fn new() -> Scheduler<A> {
        Scheduler::default()
    }

    pub fn schedule(&mut self, fire_at: f64, action: A) {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(ScheduledAction {
            fire_at,
            id,
            action,
        });
    }

    /// clear drops all pending actions, e.g. when the race is stopped.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// drain_due removes and returns all actions with a fire time at or before `now`, earliest
    /// first.
    pub fn drain_due(&mut self, now: f64) -> Vec<A> {
        let mut due = vec![];
        while let Some(entry) = self.queue.peek() {
            if entry.fire_at > now {
                break;
            }
            if let Some(entry) = self.queue.pop() {
                due.push(entry.action);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_time_then_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(2.0, "c");
        scheduler.schedule(1.0, "a");
        scheduler.schedule(1.0, "b");
        scheduler.schedule(5.0, "d");

        assert!(scheduler.drain_due(0.5).is_empty());
        assert_eq!(scheduler.drain_due(2.0), vec!["a", "b", "c"]);
        assert!(scheduler.drain_due(4.9).is_empty());
        assert_eq!(scheduler.drain_due(5.0), vec!["d"]);
    }

    #[test]
    fn cleared_actions_never_fire() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(1.0, 1);
        scheduler.schedule(2.0, 2);
        scheduler.clear();
        assert!(scheduler.drain_due(10.0).is_empty());

        scheduler.schedule(1.0, 3);
        assert_eq!(scheduler.drain_due(10.0), vec![3]);
    }
}
