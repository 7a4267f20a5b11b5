//! # G4TPC Simulation Bookkeeping (g4tpc-sim)
//!
//! Event-level bookkeeping for a liquid argon TPC Monte-Carlo simulation.
//! The transport engine (geometry, physics, stepping) is an external host
//! that drives a [`SimulationSession`] through run, event, track and step
//! callbacks. The session keeps a pruned particle ancestry, bins energy
//! deposits into detector cells, and writes one record per event.

pub mod ancestry;
pub mod cells;
pub mod detector;
pub mod output;
pub mod particle;
pub mod primary;
pub mod readout;
pub mod record;
pub mod session;

pub use ancestry::{AncestryTracker, TrackDecision, TrackStart, TrackState};
pub use cells::CellAggregator;
pub use detector::DetectorGeometry;
pub use particle::{LorentzVector, MCParticle, NO_PARENT, ROOT_TRACK_ID};
pub use record::{EventRecord, RunRecorder, RunSummary};
pub use session::{SimulationSession, StepPoint};
