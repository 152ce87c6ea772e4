use crate::core::race::CompletionReason;
use crate::interfaces::messages::LeaderboardSubmit;
use crate::{PlayerId, VehicleId};
use anyhow::Context;
use serde::Serialize;
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::Path;
use tracing::warn;

/// Standing is the final result of a single vehicle.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Standing {
    pub rank: u32,
    pub vehicle: VehicleId,
    pub driver_initials: String,
    pub driver_name: String,
    pub player: Option<PlayerId>,
    pub lap: u32,
    pub finished: bool,
    pub timed_out: bool,
    pub disqualified: bool,
    pub finish_position: Option<u32>,
    pub finish_time: Option<f64>,
}

/// RaceResult contains all race information that is required for post-processing the results.
/// `standings` is sorted by rank.
#[derive(Debug, Serialize, Clone, Default)]
pub struct RaceResult {
    pub track_name: String,
    pub tot_no_laps: u32,
    pub race_time: f64,
    /// `None` if the race was stopped before it was completed
    pub completion: Option<CompletionReason>,
    pub standings: Vec<Standing>,
    pub leaderboard: Vec<LeaderboardSubmit>,
}

impl RaceResult {
    pub fn winner(&self) -> Option<&Standing> {
        self.standings
            .iter()
            .find(|s| s.finish_position == Some(1) && !s.timed_out)
    }

    /// format_standings returns the standings as a comma separated table.
    pub fn format_standings(&self) -> anyhow::Result<String> {
        let completion = match self.completion {
            Some(CompletionReason::AllFinished) => "all finished",
            Some(CompletionReason::TimedOut) => "timed out",
            Some(CompletionReason::Commanded) => "completed by command",
            None => "stopped",
        };
        let mut content = String::new();
        writeln!(
            &mut content,
            "RESULT: {} ({} laps, race time {:.3}s, {})",
            self.track_name, self.tot_no_laps, self.race_time, completion
        )?;
        writeln!(&mut content, "rank, vehicle, driver, laps, finish time, status")?;

        for standing in self.standings.iter() {
            let finish_time = match standing.finish_time {
                Some(t) if !standing.timed_out => format!("{:8.3}s", t),
                _ => format!("{:>9}", "-"),
            };
            let status = if standing.disqualified {
                "DSQ"
            } else if standing.timed_out {
                "DNF"
            } else if standing.finished {
                "FIN"
            } else {
                "RUN"
            };
            writeln!(
                &mut content,
                "{:4}, {:7}, {:>6}, {:4}, {}, {}",
                standing.rank,
                standing.vehicle,
                standing.driver_initials,
                standing.lap,
                finish_time,
                status
            )?;
        }

        if !self.leaderboard.is_empty() {
            writeln!(&mut content, "RESULT: Leaderboard submissions")?;
            writeln!(&mut content, "player, elapsed")?;
            for submit in self.leaderboard.iter() {
                writeln!(
                    &mut content,
                    "{:6}, {:6}s",
                    submit.player, submit.elapsed_seconds
                )?;
            }
        }

        Ok(content)
    }

    /// print_standings prints the resulting standings to the console output.
    pub fn print_standings(&self) {
        match self.format_standings() {
            Ok(content) => print!("{}", content),
            Err(e) => warn!("Could not format standings: {}", e),
        }
    }

    /// write_standings_to_file writes the standings to a text file (output/last_run.txt if no path
    /// is given). Returns the path to the written file.
    pub fn write_standings_to_file(&self, path: Option<&Path>) -> anyhow::Result<String> {
        let content = self.format_standings()?;
        self.write_to_file(path, "last_run.txt", content.as_bytes())
    }

    /// write_json_to_file writes the complete result as JSON (output/last_run.json if no path is
    /// given). Returns the path to the written file.
    pub fn write_json_to_file(&self, path: Option<&Path>) -> anyhow::Result<String> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize race result!")?;
        self.write_to_file(path, "last_run.json", content.as_bytes())
    }

    fn write_to_file(
        &self,
        path: Option<&Path>,
        default_filename: &str,
        content: &[u8],
    ) -> anyhow::Result<String> {
        let out_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let out_dir = Path::new("output");
                std::fs::create_dir_all(out_dir)
                    .context("Failed to create output directory!")?;
                out_dir.join(default_filename)
            }
        };

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&out_path)
            .context(format!("Failed to open result file {}!", out_path.display()))?;
        file.write_all(content)?;
        file.flush()?;

        Ok(out_path.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> RaceResult {
        RaceResult {
            track_name: "oval".to_owned(),
            tot_no_laps: 2,
            race_time: 95.5,
            completion: Some(CompletionReason::TimedOut),
            standings: vec![
                Standing {
                    rank: 1,
                    vehicle: 2,
                    driver_initials: "MAR".to_owned(),
                    driver_name: "Mario".to_owned(),
                    player: Some(20),
                    lap: 2,
                    finished: true,
                    timed_out: false,
                    disqualified: false,
                    finish_position: Some(1),
                    finish_time: Some(80.25),
                },
                Standing {
                    rank: 2,
                    vehicle: 1,
                    driver_initials: "LUI".to_owned(),
                    driver_name: "Luigi".to_owned(),
                    player: Some(10),
                    lap: 1,
                    finished: true,
                    timed_out: true,
                    disqualified: false,
                    finish_position: Some(2),
                    finish_time: Some(95.5),
                },
            ],
            leaderboard: vec![LeaderboardSubmit {
                player: 20,
                elapsed_seconds: 80,
            }],
        }
    }

    #[test]
    fn formats_standings() {
        let result = result();
        assert_eq!(result.winner().map(|s| s.vehicle), Some(2));

        let content = result.format_standings().unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert!(lines[0].contains("oval") && lines[0].ends_with("timed out)"));
        assert!(lines[2].contains("80.250s") && lines[2].ends_with("FIN"));
        assert!(lines[3].ends_with("DNF"));
        assert!(content.contains("Leaderboard"));
    }

    #[test]
    fn writes_json() {
        let path = std::env::temp_dir().join("kartsim_race_result_test.json");
        let written = result().write_json_to_file(Some(&path)).unwrap();
        let content = std::fs::read_to_string(&written).unwrap();
        std::fs::remove_file(&path).ok();

        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["standings"][0]["driver_initials"], "MAR");
        assert_eq!(value["leaderboard"][0]["elapsed_seconds"], 80);
        assert_eq!(value["completion"], "timed_out");
    }
}
