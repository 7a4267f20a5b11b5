//! Kept Monte-Carlo particles and their trajectories
//!
//! Positions are (x, y, z, t) in mm and ns; momenta are (px, py, pz, E) in GeV.

use g4tpc_common::{Error, Result};
use serde::Serialize;

/// Parent id given to primaries; also the fallback attribution target
pub const ROOT_TRACK_ID: i32 = 0;

/// Parent id meaning "no parent at all" (the genie neutrino)
pub const NO_PARENT: i32 = -1;

/// Four-component vector used for both positions and momenta
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LorentzVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub t: f64,
}

impl LorentzVector {
    pub fn new(x: f64, y: f64, z: f64, t: f64) -> Self {
        Self { x, y, z, t }
    }

    /// Build from a spatial part and a fourth component
    pub fn from_parts(spatial: [f64; 3], t: f64) -> Self {
        Self::new(spatial[0], spatial[1], spatial[2], t)
    }

    pub fn spatial(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Fourth component read as an energy
    pub fn energy(&self) -> f64 {
        self.t
    }
}

/// One sampled point of a trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub position: LorentzVector,
    pub momentum: LorentzVector,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    points: Vec<TrajectoryPoint>,
}

impl Trajectory {
    pub fn push(&mut self, position: LorentzVector, momentum: LorentzVector) {
        self.points.push(TrajectoryPoint { position, momentum });
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, index: usize) -> Option<&TrajectoryPoint> {
        self.points.get(index)
    }

    pub fn first(&self) -> Option<&TrajectoryPoint> {
        self.points.first()
    }

    /// Last recorded point, not the last point with an energy deposit
    pub fn last(&self) -> Option<&TrajectoryPoint> {
        self.points.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryPoint> {
        self.points.iter()
    }
}

/// A simulated particle that passed every pruning filter
#[derive(Debug, Clone, PartialEq)]
pub struct MCParticle {
    track_id: i32,
    pdg: i32,
    parent: i32,
    mass: f64,
    trajectory: Trajectory,
    daughters: Vec<i32>,
}

impl MCParticle {
    pub fn new(track_id: i32, pdg: i32, parent: i32, mass: f64) -> Self {
        Self {
            track_id,
            pdg,
            parent,
            mass,
            trajectory: Trajectory::default(),
            daughters: Vec::new(),
        }
    }

    pub fn track_id(&self) -> i32 {
        self.track_id
    }

    pub fn pdg(&self) -> i32 {
        self.pdg
    }

    /// Resolved parent: nearest kept ancestor, [`ROOT_TRACK_ID`] for primaries
    pub fn parent(&self) -> i32 {
        self.parent
    }

    /// Rest mass in GeV
    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn add_trajectory_point(&mut self, position: LorentzVector, momentum: LorentzVector) {
        self.trajectory.push(position, momentum);
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn start(&self) -> Option<&TrajectoryPoint> {
        self.trajectory.first()
    }

    pub fn end(&self) -> Option<&TrajectoryPoint> {
        self.trajectory.last()
    }

    /// Total energy at the first trajectory point
    pub fn energy(&self) -> Option<f64> {
        self.start().map(|p| p.momentum.energy())
    }

    pub fn end_energy(&self) -> Option<f64> {
        self.end().map(|p| p.momentum.energy())
    }

    /// |p| at trajectory point `index`, from E² − m²
    pub fn step_momentum(&self, index: usize) -> Option<f64> {
        self.trajectory.point(index).map(|p| {
            let e = p.momentum.energy();
            (e * e - self.mass * self.mass).max(0.0).sqrt()
        })
    }

    pub fn add_daughter(&mut self, track_id: i32) {
        self.daughters.push(track_id);
    }

    pub fn daughters(&self) -> &[i32] {
        &self.daughters
    }

    /// Track id of the `index`th daughter
    pub fn daughter(&self, index: usize) -> Result<i32> {
        self.daughters
            .get(index)
            .copied()
            .ok_or(Error::DaughterOutOfRange {
                track_id: self.track_id,
                index,
                count: self.daughters.len(),
            })
    }

    pub(crate) fn clear_daughters(&mut self) {
        self.daughters.clear();
    }
}
