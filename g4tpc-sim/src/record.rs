//! Event records and the run-level document they are collected into
//!
//! At the end of each event the kept particles and the cells above threshold
//! are turned into flat records, with every cell attributed to the nearest
//! kept ancestor of its dominant contributor. The run document is written
//! once, at the end of the run.

use crate::ancestry::AncestryTracker;
use crate::cells::CellAggregator;
use crate::output::{self, OutputFormat};
use crate::particle::MCParticle;
use crate::readout::{ProtoHit, ReadoutProjector};
use g4tpc_common::{Error, Result};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CellRecord {
    pub id: i64,
    #[serde(rename = "MCId")]
    pub mc_id: i32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub energy: f64,
}

/// Written with flat `StartX`..`MomentumZ` fields, the same names the XML uses
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleRecord {
    pub id: i32,
    pub pdg: i32,
    pub parent_id: i32,
    pub mass: f64,
    pub energy: f64,
    pub start: [f64; 3],
    pub end: [f64; 3],
    /// Momentum at the start of the trajectory
    pub momentum: [f64; 3],
}

impl Serialize for ParticleRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("MCParticle", 14)?;
        state.serialize_field("Id", &self.id)?;
        state.serialize_field("PDG", &self.pdg)?;
        state.serialize_field("ParentId", &self.parent_id)?;
        state.serialize_field("Mass", &self.mass)?;
        state.serialize_field("Energy", &self.energy)?;
        for (names, values) in [
            (["StartX", "StartY", "StartZ"], &self.start),
            (["EndX", "EndY", "EndZ"], &self.end),
            (["MomentumX", "MomentumY", "MomentumZ"], &self.momentum),
        ] {
            for (name, value) in names.into_iter().zip(values) {
                state.serialize_field(name, value)?;
            }
        }
        state.end()
    }
}

impl ParticleRecord {
    /// `None` for a particle that never recorded a trajectory point
    pub fn from_particle(particle: &MCParticle) -> Option<Self> {
        let start = particle.start()?;
        let end = particle.end()?;

        Some(Self {
            id: particle.track_id(),
            pdg: particle.pdg(),
            parent_id: particle.parent(),
            mass: particle.mass(),
            energy: start.momentum.energy(),
            start: start.position.spatial(),
            end: end.position.spatial(),
            momentum: start.momentum.spatial(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(rename = "Number")]
    pub number: usize,
    #[serde(rename = "Cells")]
    pub cells: Vec<CellRecord>,
    #[serde(rename = "MCParticles")]
    pub particles: Vec<ParticleRecord>,
    #[serde(rename = "LArTPCHits", skip_serializing_if = "Vec::is_empty")]
    pub hits: Vec<ProtoHit>,
}

/// Everything recorded during one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunDocument {
    #[serde(rename = "Events")]
    pub events: Vec<EventRecord>,
}

/// Totals reported when a run document is written
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub format: OutputFormat,
    pub events: usize,
    pub cells: usize,
    pub particles: usize,
    pub hits: usize,
}

/// Collects event records between `begin_run` and `end_run`
#[derive(Debug)]
pub struct RunRecorder {
    output_path: PathBuf,
    cell_energy_threshold: f64,
    readout: Option<ReadoutProjector>,
    document: Option<RunDocument>,
    current_event: Option<usize>,
}

impl RunRecorder {
    pub fn new(output_path: impl Into<PathBuf>, cell_energy_threshold: f64) -> Self {
        Self {
            output_path: output_path.into(),
            cell_energy_threshold,
            readout: None,
            document: None,
            current_event: None,
        }
    }

    /// Also project cells onto readout planes at the end of each event
    pub fn with_readout(mut self, readout: ReadoutProjector) -> Self {
        self.readout = Some(readout);
        self
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Document collected so far, `None` outside a run
    pub fn document(&self) -> Option<&RunDocument> {
        self.document.as_ref()
    }

    /// Start a fresh document, discarding any unfinished one
    pub fn begin_run(&mut self) {
        if self.document.is_some() {
            warn!("Run started while another was open; discarding its events");
        }
        self.document = Some(RunDocument::default());
        self.current_event = None;
    }

    pub fn begin_event(&mut self, number: usize) {
        self.current_event = Some(number);
    }

    /// Record the event and reset both per-event buffers
    pub fn end_event(&mut self, tracker: &mut AncestryTracker, cells: &mut CellAggregator) -> Result<&EventRecord> {
        let number = self
            .current_event
            .take()
            .ok_or_else(|| Error::Output("end of event without a matching begin".to_string()))?;
        let document = self
            .document
            .as_mut()
            .ok_or_else(|| Error::Output(format!("event {} ended outside a run", number)))?;

        tracker.finalize_daughters();

        let mut record = EventRecord {
            number,
            cells: cell_records(tracker, cells, self.cell_energy_threshold),
            ..EventRecord::default()
        };

        for particle in tracker.particles() {
            match ParticleRecord::from_particle(particle) {
                Some(particle_record) => record.particles.push(particle_record),
                None => warn!(
                    "Event {}: particle {} has no trajectory points; not written",
                    number,
                    particle.track_id()
                ),
            }
        }

        if let Some(readout) = self.readout.as_ref().filter(|r| r.write_hits()) {
            match readout.hits_for_event(&record.cells) {
                Ok(hits) => record.hits = hits,
                Err(e) => warn!("Event {}: no readout hits written: {}", number, e),
            }
        }

        debug!(
            "Event {}: {} cells, {} particles, {} hits",
            number,
            record.cells.len(),
            record.particles.len(),
            record.hits.len()
        );

        *tracker = AncestryTracker::new(tracker.settings().clone());
        cells.clear_for_next_event();

        document.events.push(record);
        document
            .events
            .last()
            .ok_or_else(|| Error::Output(format!("event {} was not recorded", number)))
    }

    /// Write the document to the output path and release it
    pub fn end_run(&mut self) -> Result<RunSummary> {
        let document = self
            .document
            .take()
            .ok_or_else(|| Error::Output("end of run without a matching begin".to_string()))?;

        let format = OutputFormat::from_path(&self.output_path);
        output::write_document(&document, &self.output_path, format)?;

        let summary = RunSummary {
            output_path: self.output_path.clone(),
            format,
            events: document.events.len(),
            cells: document.events.iter().map(|e| e.cells.len()).sum(),
            particles: document.events.iter().map(|e| e.particles.len()).sum(),
            hits: document.events.iter().map(|e| e.hits.len()).sum(),
        };

        info!(
            "Wrote {} events ({} cells, {} particles) to {:?}",
            summary.events, summary.cells, summary.particles, summary.output_path
        );
        Ok(summary)
    }
}

/// Cells at or above threshold with an attributable contributor
pub fn cell_records(tracker: &AncestryTracker, cells: &CellAggregator, threshold: f64) -> Vec<CellRecord> {
    cells
        .cells()
        .filter(|cell| cell.energy() >= threshold)
        .filter_map(|cell| {
            let contributor = cell.dominant_contributor()?;
            let [x, y, z] = cell.position();
            Some(CellRecord {
                id: cell.index(),
                mc_id: tracker.resolve_visible(contributor.track_id),
                x,
                y,
                z,
                energy: cell.energy(),
            })
        })
        .collect()
}
