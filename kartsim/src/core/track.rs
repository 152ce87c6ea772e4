use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use helpers::general::InputValueError;
use serde::Deserialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// * `position` - (m) Center of the checkpoint trigger volume
/// * `yaw_deg` - (deg) Heading of the checkpoint about the up axis, used when a vehicle is reset
/// onto it
#[derive(Debug, Deserialize, Clone)]
pub struct CheckpointPars {
    pub position: [f32; 3],
    #[serde(default)]
    pub yaw_deg: f32,
}

/// * `min` - (m) Minimum corner of an axis aligned obstacle box
/// * `max` - (m) Maximum corner of an axis aligned obstacle box
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ObstaclePars {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

/// * `name` - Track name
/// * `checkpoints` - Ordered checkpoints, index 0 is the start/finish line
/// * `checkpoint_file` - CSV file with checkpoints (columns x_m, y_m, z_m, yaw_deg), used if
/// `checkpoints` is empty
/// * `halfway_position` - (m) Center of the halfway trigger volume (defaults to the position of the
/// halfway checkpoint)
/// * `trigger_radius` - (m) Radius of checkpoint and halfway trigger volumes
/// * `ground_height` - (m) Height of the ground plane
/// * `obstacles` - Solid boxes hit by the forward collision probe
#[derive(Debug, Deserialize, Clone)]
pub struct TrackPars {
    pub name: String,
    #[serde(default)]
    pub checkpoints: Vec<CheckpointPars>,
    #[serde(default)]
    pub checkpoint_file: Option<PathBuf>,
    #[serde(default)]
    pub halfway_position: Option<[f32; 3]>,
    #[serde(default = "default_trigger_radius")]
    pub trigger_radius: f32,
    #[serde(default)]
    pub ground_height: f32,
    #[serde(default)]
    pub obstacles: Vec<ObstaclePars>,
}

fn default_trigger_radius() -> f32 {
    8.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct CsvCheckpointEl {
    pub x_m: f32,
    pub y_m: f32,
    pub z_m: f32,
    pub yaw_deg: f32,
}

/// read_checkpoint_csv reads the ordered checkpoint list of a track from a CSV file.
pub fn read_checkpoint_csv(filepath: &Path) -> Result<Vec<CheckpointPars>> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open checkpoint file {}!",
            filepath.to_str().unwrap_or("unknown")
        ))?;

    let mut csv_reader = csv::Reader::from_reader(&fh);
    let mut checkpoints = vec![];

    for result in csv_reader.deserialize() {
        let el: CsvCheckpointEl = result.context(format!(
            "Failed to parse checkpoint file {}!",
            filepath.to_str().unwrap_or("unknown")
        ))?;
        checkpoints.push(CheckpointPars {
            position: [el.x_m, el.y_m, el.z_m],
            yaw_deg: el.yaw_deg,
        });
    }

    Ok(checkpoints)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Checkpoint {
    pub position: Vec3,
    pub rotation: Quat,
}

impl From<&CheckpointPars> for Checkpoint {
    fn from(pars: &CheckpointPars) -> Self {
        Checkpoint {
            position: Vec3::from(pars.position),
            rotation: Quat::from_rotation_y(pars.yaw_deg.to_radians()),
        }
    }
}

/// Track is the immutable checkpoint topology of a race. It is built once at race setup and
/// shared by reference (`Arc<Track>`) between the race engine and all vehicles.
#[derive(Debug)]
pub struct Track {
    pub name: String,
    checkpoints: Vec<Checkpoint>,
    halfway_index: usize,
    pub halfway_position: Vec3,
    pub trigger_radius: f32,
}

impl Track {
    pub fn new(track_pars: &TrackPars) -> Result<Track> {
        let checkpoint_pars = if track_pars.checkpoints.is_empty() {
            match &track_pars.checkpoint_file {
                Some(path) => read_checkpoint_csv(path)?,
                None => Vec::new(),
            }
        } else {
            track_pars.checkpoints.to_owned()
        };

        let mut track = Track::from_checkpoints(
            &track_pars.name,
            checkpoint_pars.iter().map(Checkpoint::from).collect(),
        )?;

        if let Some(pos) = track_pars.halfway_position {
            track.halfway_position = Vec3::from(pos);
        }
        if track_pars.trigger_radius <= 0.0 {
            return Err(InputValueError).context("Trigger radius must be positive!");
        }
        track.trigger_radius = track_pars.trigger_radius;

        Ok(track)
    }

    pub fn from_checkpoints(name: &str, checkpoints: Vec<Checkpoint>) -> Result<Track> {
        if checkpoints.is_empty() {
            return Err(InputValueError)
                .context(format!("Track {} does not contain any checkpoints!", name));
        }

        let halfway_index = checkpoints.len() / 2;
        let halfway_position = checkpoints[halfway_index].position;

        Ok(Track {
            name: name.to_owned(),
            checkpoints,
            halfway_index,
            halfway_position,
            trigger_radius: default_trigger_radius(),
        })
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    /// halfway_index is floor(checkpoint_count / 2).
    pub fn halfway_index(&self) -> usize {
        self.halfway_index
    }

    pub fn checkpoint(&self, idx: usize) -> Option<&Checkpoint> {
        self.checkpoints.get(idx)
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// segment returns the endpoints of the track segment starting at checkpoint `idx`. The last
    /// segment (back to the start/finish line) is not returned since it would complete a lap.
    pub fn segment(&self, idx: usize) -> Option<(Vec3, Vec3)> {
        let next_idx = (idx + 1) % self.checkpoints.len();
        if next_idx == 0 || idx >= self.checkpoints.len() {
            return None;
        }
        Some((
            self.checkpoints[idx].position,
            self.checkpoints[next_idx].position,
        ))
    }
}
