//! Particle ancestry tracking for one simulated event
//!
//! The transport engine reports every track it starts. Each track gets exactly
//! one entry in the ancestry map, tagged [`TrackState::Kept`] (an
//! [`MCParticle`] is recording its trajectory) or [`TrackState::Pruned`]
//! (only the parent link is remembered). Kept particles whose real parent was
//! pruned are re-pointed at their nearest kept ancestor, and the parent links
//! of pruned tracks let energy deposits be attributed to a kept particle later.
//!
//! Tracking is depth-first and single threaded, so at most one track is
//! current at any time.

use crate::particle::{LorentzVector, MCParticle, NO_PARENT, ROOT_TRACK_ID};
use g4tpc_common::{Error, GenieEvent, RunConfig};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Creator-process name fragments identifying electromagnetic shower daughters
pub const EM_SHOWER_PROCESSES: &[&str] = &[
    "conv",
    "LowEnConversion",
    "Pair",
    "compt",
    "Compt",
    "Brem",
    "phot",
    "Photo",
    "Ion",
    "annihil",
];

/// Case-sensitive substring match against [`EM_SHOWER_PROCESSES`]
pub fn is_em_shower_process(process_name: &str) -> bool {
    EM_SHOWER_PROCESSES
        .iter()
        .any(|fragment| process_name.contains(fragment))
}

/// Pruning policy for one run
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerSettings {
    /// Kinetic energy (GeV) below which non-primaries are pruned
    pub energy_threshold: f64,
    pub keep_em_shower_daughters: bool,
    /// Added to engine track and parent ids
    pub track_id_offset: i32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            energy_threshold: 0.001,
            keep_em_shower_daughters: false,
            track_id_offset: 0,
        }
    }
}

impl From<&RunConfig> for TrackerSettings {
    fn from(config: &RunConfig) -> Self {
        Self {
            energy_threshold: config.hit_energy_threshold,
            keep_em_shower_daughters: config.keep_em_shower_daughters,
            track_id_offset: config.track_id_offset,
        }
    }
}

/// Engine notification that a new track is about to be transported
///
/// Ids are the engine's own; the tracker applies the configured offset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackStart {
    pub track_id: i32,
    pub pdg: i32,
    pub parent_id: i32,
    /// Rest mass in GeV
    pub mass: f64,
    /// Kinetic energy at the start of the track in GeV
    pub kinetic_energy: f64,
    /// Name of the process that created the track; `None` for primaries
    pub creator_process: Option<String>,
    /// Injected by the event generator rather than produced in the detector
    pub is_primary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    EmShowerDaughter,
    BelowThreshold,
}

/// Outcome of [`AncestryTracker::on_track_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackDecision {
    /// A particle was created with this (possibly re-pointed) parent
    Kept { parent: i32 },
    Pruned(PruneReason),
}

/// Per-track entry state; `Kept` carries the particle handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    Pruned,
    Kept(usize),
}

#[derive(Debug, Clone, Copy)]
struct AncestryEntry {
    parent: i32,
    state: TrackState,
}

/// Kept/pruned particle graph for the event in progress
#[derive(Debug, Default)]
pub struct AncestryTracker {
    settings: TrackerSettings,
    entries: HashMap<i32, AncestryEntry>,
    particles: Vec<MCParticle>,
    by_engine_id: HashMap<i32, usize>,
    current: Option<i32>,
    unknown_ancestors: usize,
}

impl AncestryTracker {
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Engine track id with the configured offset applied
    pub fn offset_id(&self, engine_track_id: i32) -> i32 {
        engine_track_id + self.settings.track_id_offset
    }

    /// Register the genie neutrino as kept particle [`ROOT_TRACK_ID`]
    ///
    /// Primaries get parent [`ROOT_TRACK_ID`], so they become the neutrino's
    /// daughters when links are finalized.
    pub fn seed_neutrino(&mut self, event: &GenieEvent) {
        let track = event.neutrino_track();
        let energy = track.energy();
        // Neutrino mass taken as zero, so |p| = E
        let direction = track.unit_direction().unwrap_or([0.0; 3]);
        let momentum = LorentzVector::from_parts(direction.map(|c| c * energy), energy);
        let position = LorentzVector::from_parts(event.vertex(), 0.0);

        let mut neutrino = MCParticle::new(ROOT_TRACK_ID, track.pdg(), NO_PARENT, 0.0);
        neutrino.add_trajectory_point(position, momentum);

        let handle = self.particles.len();
        self.particles.push(neutrino);
        self.entries.insert(
            ROOT_TRACK_ID,
            AncestryEntry {
                parent: NO_PARENT,
                state: TrackState::Kept(handle),
            },
        );
        debug!("Seeded neutrino pdg {} with energy {} GeV", track.pdg(), energy);
    }

    /// Decide whether a starting track is kept, and make it current
    pub fn on_track_start(&mut self, start: &TrackStart) -> TrackDecision {
        let track_id = self.offset_id(start.track_id);
        let mut parent = if start.is_primary {
            ROOT_TRACK_ID
        } else {
            self.offset_id(start.parent_id)
        };

        self.current = Some(track_id);

        if let Some(AncestryEntry {
            state: TrackState::Kept(_),
            parent: existing,
        }) = self.entries.get(&track_id).copied()
        {
            warn!("Track {} started twice; keeping the first record", track_id);
            return TrackDecision::Kept { parent: existing };
        }

        // Every started track is recorded before any pruning decision
        self.entries.insert(
            track_id,
            AncestryEntry {
                parent,
                state: TrackState::Pruned,
            },
        );

        if !start.is_primary {
            if !self.settings.keep_em_shower_daughters
                && start
                    .creator_process
                    .as_deref()
                    .is_some_and(is_em_shower_process)
            {
                return TrackDecision::Pruned(PruneReason::EmShowerDaughter);
            }

            if start.kinetic_energy < self.settings.energy_threshold {
                return TrackDecision::Pruned(PruneReason::BelowThreshold);
            }

            if !self.is_kept(parent) {
                match self.resolve_kept(parent) {
                    Some(ancestor) => parent = ancestor,
                    None => {
                        self.unknown_ancestors += 1;
                        warn!(
                            "{}; keeping unresolved parent",
                            Error::UnknownAncestor {
                                track_id,
                                parent_id: parent
                            }
                        );
                    }
                }
            }
        }

        let handle = self.particles.len();
        self.particles
            .push(MCParticle::new(track_id, start.pdg, parent, start.mass));
        self.by_engine_id.insert(start.track_id, handle);
        // The map keeps the engine-reported parent; the particle keeps the resolved one
        if let Some(entry) = self.entries.get_mut(&track_id) {
            entry.state = TrackState::Kept(handle);
        }

        TrackDecision::Kept { parent }
    }

    /// Record a transport step of the current track
    ///
    /// Returns true if a trajectory point was added.
    pub fn on_step(&mut self, position: LorentzVector, momentum: LorentzVector) -> bool {
        let Some(track_id) = self.current else {
            return false;
        };
        match self.state(track_id) {
            Some(TrackState::Kept(handle)) => {
                self.particles[handle].add_trajectory_point(position, momentum);
                true
            }
            _ => false,
        }
    }

    pub fn on_track_end(&mut self) {
        self.current = None;
    }

    /// Currently transported track (offset applied)
    pub fn current_track(&self) -> Option<i32> {
        self.current
    }

    /// Fill daughter lists from resolved parent links
    ///
    /// Must run after every track of the event has started, since parents
    /// and children can be created in either order. Safe to call twice.
    pub fn finalize_daughters(&mut self) {
        for particle in &mut self.particles {
            particle.clear_daughters();
        }

        let mut order: Vec<usize> = (0..self.particles.len()).collect();
        order.sort_by_key(|&handle| self.particles[handle].track_id());

        let links: Vec<(usize, i32)> = order
            .into_iter()
            .filter_map(|handle| {
                let child = &self.particles[handle];
                if child.parent() == NO_PARENT || child.parent() == child.track_id() {
                    return None;
                }
                match self.state(child.parent()) {
                    Some(TrackState::Kept(parent_handle)) => Some((parent_handle, child.track_id())),
                    _ => None,
                }
            })
            .collect();

        for (parent_handle, child) in links {
            self.particles[parent_handle].add_daughter(child);
        }
    }

    /// Terminal ancestor of a track, following parent links to the end
    ///
    /// Returns `None` for a track the engine never started.
    pub fn get_parent(&self, track_id: i32) -> Option<i32> {
        let mut entry = self.entries.get(&track_id)?;
        let mut ancestor = track_id;

        for _ in 0..=self.entries.len() {
            if entry.parent == NO_PARENT {
                break;
            }
            ancestor = entry.parent;
            match self.entries.get(&ancestor) {
                Some(next) if ancestor != track_id => entry = next,
                _ => break,
            }
        }

        Some(ancestor)
    }

    /// Nearest kept track among `track_id` and its ancestors
    pub fn resolve_kept(&self, track_id: i32) -> Option<i32> {
        let mut id = track_id;

        for _ in 0..=self.entries.len() {
            let entry = self.entries.get(&id)?;
            if matches!(entry.state, TrackState::Kept(_)) {
                return Some(id);
            }
            if entry.parent == NO_PARENT {
                return None;
            }
            id = entry.parent;
        }

        None
    }

    /// Nearest kept ancestor of a track, not counting the track itself
    pub fn nearest_kept_ancestor(&self, track_id: i32) -> Option<i32> {
        match self.recorded_parent(track_id)? {
            NO_PARENT => None,
            parent if parent == track_id => None,
            parent => self.resolve_kept(parent),
        }
    }

    /// Kept particle to attribute a deposit from `track_id` to, [`ROOT_TRACK_ID`] if none
    pub fn resolve_visible(&self, track_id: i32) -> i32 {
        self.resolve_kept(track_id).unwrap_or(ROOT_TRACK_ID)
    }

    pub fn state(&self, track_id: i32) -> Option<TrackState> {
        self.entries.get(&track_id).map(|entry| entry.state)
    }

    pub fn is_kept(&self, track_id: i32) -> bool {
        matches!(self.state(track_id), Some(TrackState::Kept(_)))
    }

    /// Parent recorded for a track at start (offset applied, root for primaries)
    pub fn recorded_parent(&self, track_id: i32) -> Option<i32> {
        self.entries.get(&track_id).map(|entry| entry.parent)
    }

    pub fn particle(&self, track_id: i32) -> Option<&MCParticle> {
        match self.state(track_id)? {
            TrackState::Kept(handle) => self.particles.get(handle),
            TrackState::Pruned => None,
        }
    }

    /// Kept particle by the engine's own (un-offset) track id
    pub fn particle_by_engine_id(&self, engine_track_id: i32) -> Option<&MCParticle> {
        self.by_engine_id
            .get(&engine_track_id)
            .and_then(|&handle| self.particles.get(handle))
    }

    /// Kept particles in creation order
    pub fn particles(&self) -> &[MCParticle] {
        &self.particles
    }

    /// Number of tracks seen, kept or pruned
    pub fn known_tracks(&self) -> usize {
        self.entries.len()
    }

    pub fn unknown_ancestor_count(&self) -> usize {
        self.unknown_ancestors
    }
}
