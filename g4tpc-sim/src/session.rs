//! Callback surface driven by the transport engine
//!
//! The engine calls, strictly in sequence:
//! run start → {event start → {track start → step* → track end}* → event end}* → run end.
//! The session owns one [`EventContext`] per event and rebuilds it at every
//! event start, so nothing leaks between events.

use crate::ancestry::{AncestryTracker, TrackDecision, TrackStart, TrackerSettings};
use crate::cells::CellAggregator;
use crate::detector::DetectorGeometry;
use crate::particle::LorentzVector;
use crate::readout::ReadoutProjector;
use crate::record::{EventRecord, RunRecorder, RunSummary};
use g4tpc_common::{Error, GenieEvent, PrimarySource, Result, RunConfig, RunSetup};
use tracing::{debug, info, warn};

/// One transport step of the current track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPoint {
    /// Pre-step position (mm, ns); a track's first step starts at its production vertex
    pub position: LorentzVector,
    /// Pre-step momentum (GeV)
    pub momentum: LorentzVector,
    /// Energy deposited over the step (GeV)
    pub energy_deposit: f64,
}

/// Everything owned by the event in progress
#[derive(Debug)]
pub struct EventContext {
    pub number: usize,
    pub tracker: AncestryTracker,
    pub cells: CellAggregator,
}

impl EventContext {
    pub fn new(number: usize, settings: TrackerSettings) -> Self {
        Self {
            number,
            tracker: AncestryTracker::new(settings),
            cells: CellAggregator::new(),
        }
    }
}

/// Bookkeeping state for one run
#[derive(Debug)]
pub struct SimulationSession<'a> {
    config: &'a RunConfig,
    genie_events: &'a [GenieEvent],
    settings: TrackerSettings,
    detector: DetectorGeometry,
    recorder: RunRecorder,
    context: Option<EventContext>,
    events_recorded: usize,
}

impl<'a> SimulationSession<'a> {
    pub fn new(setup: &'a RunSetup) -> Result<Self> {
        let config = &setup.config;
        let mut recorder = RunRecorder::new(config.output_path.clone(), config.cell_energy_threshold);
        if let Some(lartpc) = &config.lartpc {
            recorder = recorder.with_readout(ReadoutProjector::from_config(lartpc)?);
        }

        Ok(Self {
            config,
            genie_events: &setup.genie_events,
            settings: TrackerSettings::from(config),
            detector: DetectorGeometry::from(&config.detector),
            recorder,
            context: None,
            events_recorded: 0,
        })
    }

    pub fn config(&self) -> &RunConfig {
        self.config
    }

    pub fn detector(&self) -> &DetectorGeometry {
        &self.detector
    }

    /// Event in progress, if any
    pub fn context(&self) -> Option<&EventContext> {
        self.context.as_ref()
    }

    pub fn events_recorded(&self) -> usize {
        self.events_recorded
    }

    pub fn begin_run(&mut self) {
        info!("Run started, writing to {:?}", self.config.output_path);
        self.recorder.begin_run();
        self.events_recorded = 0;
    }

    /// Open a fresh event context; genie runs seed the neutrino first
    pub fn begin_event(&mut self, number: usize) {
        if let Some(previous) = &self.context {
            warn!("Event {} started before event {} ended; discarding it", number, previous.number);
        }

        let mut context = EventContext::new(number, self.settings.clone());
        if self.config.primary_source() == PrimarySource::Genie {
            match self.genie_events.get(number) {
                Some(event) => context.tracker.seed_neutrino(event),
                None => warn!("No genie event {} to seed the neutrino from", number),
            }
        }

        debug!("Event {} started", number);
        self.recorder.begin_event(number);
        self.context = Some(context);
    }

    /// `None` when called outside an event
    pub fn on_track_start(&mut self, start: &TrackStart) -> Option<TrackDecision> {
        let Some(context) = self.context.as_mut() else {
            warn!("Track {} started outside an event; ignored", start.track_id);
            return None;
        };
        Some(context.tracker.on_track_start(start))
    }

    /// Record the step's pre-step point on the current particle and bin its deposit
    ///
    /// The deposit is binned at the pre-step position. Deposits outside the
    /// detector box are dropped.
    pub fn on_step(&mut self, step: &StepPoint) {
        let Some(context) = self.context.as_mut() else {
            return;
        };

        context.tracker.on_step(step.position, step.momentum);

        if step.energy_deposit <= 0.0 {
            return;
        }
        let Some(track_id) = context.tracker.current_track() else {
            return;
        };
        if let Some((index, centre)) = self.detector.cell_for(step.position.spatial()) {
            context
                .cells
                .add_energy_deposit(index, centre, step.energy_deposit, track_id);
        }
    }

    pub fn on_track_end(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.tracker.on_track_end();
        }
    }

    /// Record the event and drop its context
    pub fn end_event(&mut self) -> Result<&EventRecord> {
        let mut context = self.context.take().ok_or_else(|| {
            Error::Output("event ended without a matching start".to_string())
        })?;

        let record = self
            .recorder
            .end_event(&mut context.tracker, &mut context.cells)?;
        self.events_recorded += 1;
        Ok(record)
    }

    /// Write the run document
    pub fn end_run(&mut self) -> Result<RunSummary> {
        if let Some(open) = self.context.take() {
            warn!("Run ended inside event {}; event discarded", open.number);
        }
        self.recorder.end_run()
    }
}
