use crate::core::track::TrackPars;
use glam::Vec3;

/// Surface tag of a ray hit. Only surfaces tagged `Ground` count for grounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceTag {
    Ground,
    Untagged,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    pub surface: SurfaceTag,
}

/// WorldProbe answers raycasts against world geometry. `dir` is expected to be normalized.
pub trait WorldProbe {
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<RayHit>;
}

/// The two probes consumed by the vehicle integrator. Either may be missing, in which case the
/// dependent step (grounding or collision cancellation) is skipped.
#[derive(Clone, Copy, Default)]
pub struct Probes<'a> {
    pub ground: Option<&'a dyn WorldProbe>,
    pub forward: Option<&'a dyn WorldProbe>,
}

impl<'a> Probes<'a> {
    pub fn none() -> Probes<'a> {
        Probes::default()
    }

    pub fn world(world: &'a dyn WorldProbe) -> Probes<'a> {
        Probes {
            ground: Some(world),
            forward: Some(world),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
    pub surface: SurfaceTag,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3, surface: SurfaceTag) -> Aabb {
        Aabb {
            min: min.min(max),
            max: min.max(max),
            surface,
        }
    }

    /// ray_entry returns the distance along the ray at which it enters the box (slab method), 0
    /// if the origin lies inside.
    fn ray_entry(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<f32> {
        let mut t_min = 0.0f32;
        let mut t_max = max_distance;

        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            let (lo, hi) = (self.min[axis], self.max[axis]);

            if d.abs() < 1e-8 {
                if o < lo || o > hi {
                    return None;
                }
                continue;
            }

            let mut t1 = (lo - o) / d;
            let mut t2 = (hi - o) / d;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            t_min = t_min.max(t1);
            t_max = t_max.min(t2);
            if t_min > t_max {
                return None;
            }
        }

        Some(t_min)
    }
}

/// FlatWorld is a ground plane tagged as ground plus a set of solid boxes. It is the world used
/// by the headless race loop and the tests.
#[derive(Debug, Clone, Default)]
pub struct FlatWorld {
    pub ground_height: Option<f32>,
    pub boxes: Vec<Aabb>,
}

impl FlatWorld {
    pub fn new(ground_height: f32) -> FlatWorld {
        FlatWorld {
            ground_height: Some(ground_height),
            boxes: Vec::new(),
        }
    }

    pub fn from_track_pars(track_pars: &TrackPars) -> FlatWorld {
        let mut world = FlatWorld::new(track_pars.ground_height);
        for obstacle in track_pars.obstacles.iter() {
            world.boxes.push(Aabb::new(
                Vec3::from(obstacle.min),
                Vec3::from(obstacle.max),
                SurfaceTag::Untagged,
            ));
        }
        world
    }

    pub fn with_box(mut self, aabb: Aabb) -> FlatWorld {
        self.boxes.push(aabb);
        self
    }
}

impl WorldProbe for FlatWorld {
    fn raycast(&self, origin: Vec3, dir: Vec3, max_distance: f32) -> Option<RayHit> {
        if !dir.is_finite() || dir == Vec3::ZERO || max_distance <= 0.0 {
            return None;
        }

        let mut best: Option<(f32, SurfaceTag)> = None;

        if let Some(h) = self.ground_height {
            if dir.y < 0.0 && origin.y >= h {
                let t = (origin.y - h) / -dir.y;
                if t <= max_distance {
                    best = Some((t, SurfaceTag::Ground));
                }
            }
        }

        for aabb in self.boxes.iter() {
            if let Some(t) = aabb.ray_entry(origin, dir, max_distance) {
                if best.map_or(true, |(t_best, _)| t < t_best) {
                    best = Some((t, aabb.surface));
                }
            }
        }

        best.map(|(distance, surface)| RayHit {
            distance,
            point: origin + dir * distance,
            surface,
        })
    }
}
