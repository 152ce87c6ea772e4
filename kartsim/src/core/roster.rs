use crate::PlayerId;
use serde::Serialize;

pub const MAX_PLAYERS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinOutcome {
    Accepted,
    RaceActive,
    Full,
    AlreadyJoined,
}

/// Roster is the list of players that entered the next race. Joining is only possible while no
/// race is running.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<PlayerId>,
}

impl Roster {
    pub fn join(&mut self, player: PlayerId, race_running: bool) -> JoinOutcome {
        if race_running {
            JoinOutcome::RaceActive
        } else if self.players.contains(&player) {
            JoinOutcome::AlreadyJoined
        } else if self.players.len() >= MAX_PLAYERS {
            JoinOutcome::Full
        } else {
            self.players.push(player);
            JoinOutcome::Accepted
        }
    }

    pub fn players(&self) -> &[PlayerId] {
        &self.players
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_rules() {
        let mut roster = Roster::default();
        assert_eq!(roster.join(1, true), JoinOutcome::RaceActive);
        assert_eq!(roster.join(1, false), JoinOutcome::Accepted);
        assert_eq!(roster.join(1, false), JoinOutcome::AlreadyJoined);

        for player in 2..=8 {
            assert_eq!(roster.join(player, false), JoinOutcome::Accepted);
        }
        assert_eq!(roster.join(9, false), JoinOutcome::Full);

        assert_eq!(roster.players().len(), MAX_PLAYERS);

        roster.clear();
        assert!(roster.players().is_empty());
    }
}
