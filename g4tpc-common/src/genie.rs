//! Genie tracker file loading
//!
//! The tracker format is line oriented; tokens are separated by runs of
//! spaces or `$` characters:
//!
//! ```text
//! $ begin
//! $ nuance 1
//! $ vertex 0 0 0 0
//! $ track 14 3244 0 0 1 -1
//! $ track 13 3156.22 -0.0508622 -0.0226286 0.998449 0
//! $ end
//! $ stop
//! ```
//!
//! The first `track` of a block is the neutrino; later tracks are kept only
//! when their tracking status token is `0`. Energies in the file are MeV and
//! are stored as GeV on [`Track`].

use crate::{Error, Result};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Nuance-style PDG code for argon-40
pub const NUANCE_ARGON_PDG: i32 = 18040;

/// Standard PDG nuclear code for argon-40 (100ZZZAAAI, Z = 018, A = 040)
pub const ARGON_PDG: i32 = 1000180400;

/// Energy unit conversion applied to tracker file energies
pub const MEV_PER_GEV: f64 = 1000.0;

/// Map nuance-style nuclear codes onto the PDG standard encoding
pub fn normalize_pdg(pdg: i32) -> i32 {
    if pdg == NUANCE_ARGON_PDG {
        ARGON_PDG
    } else {
        pdg
    }
}

/// One particle line of a genie event
///
/// Energy is always GeV. Direction components are copied verbatim and are
/// not guaranteed to be unit length.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pdg: i32,
    energy: f64,
    direction: [f64; 3],
}

impl Track {
    /// Build a track from values already expressed in GeV
    pub fn new(pdg: i32, energy_gev: f64, direction: [f64; 3]) -> Self {
        Self {
            pdg: normalize_pdg(pdg),
            energy: energy_gev,
            direction,
        }
    }

    /// Parse the tokens of a `track <pdg> <energy_MeV> <dx> <dy> <dz> [status]` line
    pub fn from_tokens(tokens: &[&str]) -> std::result::Result<Self, String> {
        if tokens.len() < 6 {
            return Err(format!("track line needs 6 tokens, found {}", tokens.len()));
        }

        let pdg = tokens[1]
            .parse::<i32>()
            .map_err(|e| format!("invalid pdg code {:?}: {}", tokens[1], e))?;
        let energy_mev = parse_f64(tokens[2], "energy")?;
        let direction = [
            parse_f64(tokens[3], "direction x")?,
            parse_f64(tokens[4], "direction y")?,
            parse_f64(tokens[5], "direction z")?,
        ];

        Ok(Self::new(pdg, energy_mev / MEV_PER_GEV, direction))
    }

    pub fn pdg(&self) -> i32 {
        self.pdg
    }

    /// Total energy in GeV
    pub fn energy(&self) -> f64 {
        self.energy
    }

    pub fn direction(&self) -> [f64; 3] {
        self.direction
    }

    /// Direction scaled to unit length, `None` for a zero vector
    pub fn unit_direction(&self) -> Option<[f64; 3]> {
        let [x, y, z] = self.direction;
        let norm = (x * x + y * y + z * z).sqrt();
        if norm < f64::EPSILON {
            return None;
        }
        Some([x / norm, y / norm, z / norm])
    }
}

/// One neutrino interaction read from a `begin ... end` block
#[derive(Debug, Clone, PartialEq)]
pub struct GenieEvent {
    nuance_code: i32,
    vertex: [f64; 3],
    vertex_time: Option<f64>,
    neutrino: Track,
    daughters: Vec<Track>,
}

impl GenieEvent {
    pub fn new(nuance_code: i32, vertex: [f64; 3], neutrino: Track, daughters: Vec<Track>) -> Self {
        Self {
            nuance_code,
            vertex,
            vertex_time: None,
            neutrino,
            daughters,
        }
    }

    pub fn nuance_code(&self) -> i32 {
        self.nuance_code
    }

    pub fn vertex(&self) -> [f64; 3] {
        self.vertex
    }

    /// Optional fourth `vertex` token
    pub fn vertex_time(&self) -> Option<f64> {
        self.vertex_time
    }

    pub fn neutrino_track(&self) -> &Track {
        &self.neutrino
    }

    /// Daughters whose tracking status was `0`, in file order
    pub fn daughter_tracks(&self) -> &[Track] {
        &self.daughters
    }
}

/// Position of the loader inside a `begin ... end` block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingBegin,
    HaveNuance,
    HaveVertex,
    HaveNeutrinoTrack,
    AccumulatingDaughters,
}

impl fmt::Display for ParserState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ParserState::AwaitingBegin => "AwaitingBegin",
            ParserState::HaveNuance => "HaveNuance",
            ParserState::HaveVertex => "HaveVertex",
            ParserState::HaveNeutrinoTrack => "HaveNeutrinoTrack",
            ParserState::AccumulatingDaughters => "AccumulatingDaughters",
        };
        f.write_str(name)
    }
}

/// Result of parsing a tracker stream
///
/// `errors` holds every reported [`Error::GenieParse`]; they never abort parsing.
#[derive(Debug, Default)]
pub struct GenieLoad {
    pub events: Vec<GenieEvent>,
    pub errors: Vec<Error>,
    /// Whether a `stop` line was seen
    pub reached_stop: bool,
}

/// Split a tracker line on runs of spaces and `$`
pub fn tokenise_line(line: &str) -> Vec<&str> {
    line.trim_end_matches(['\r', '\n'])
        .split([' ', '$'])
        .filter(|token| !token.is_empty())
        .collect()
}

/// Load every event of a genie tracker file
///
/// # Errors
///
/// Returns [`Error::FileUnreadable`] if the file cannot be opened or read.
/// Malformed content is not an error here; see [`GenieLoad::errors`].
pub fn load_genie_events(path: &Path) -> Result<GenieLoad> {
    let file = File::open(path).map_err(|source| Error::FileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let load = parse_genie_events(BufReader::new(file)).map_err(|e| match e {
        Error::Io(source) => Error::FileUnreadable {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;

    info!(
        "Finished reading genie tracker file {:?}: {} events, {} malformed lines",
        path,
        load.events.len(),
        load.errors.len()
    );
    Ok(load)
}

/// Parse tracker content from any buffered reader
pub fn parse_genie_events<R: BufRead>(reader: R) -> Result<GenieLoad> {
    let mut parser = GenieParser::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if parser.feed(index + 1, &line) {
            break;
        }
    }

    Ok(parser.finish())
}

#[derive(Debug, Default)]
struct PartialEvent {
    nuance_code: i32,
    vertex: [f64; 3],
    vertex_time: Option<f64>,
    neutrino: Option<Track>,
    daughters: Vec<Track>,
}

struct GenieParser {
    state: ParserState,
    current: Option<PartialEvent>,
    // Set after an event is abandoned; suppresses noise until the next `begin`
    discarding: bool,
    load: GenieLoad,
}

impl GenieParser {
    fn new() -> Self {
        Self {
            state: ParserState::AwaitingBegin,
            current: None,
            discarding: false,
            load: GenieLoad::default(),
        }
    }

    /// Consume one line; returns true once `stop` is reached
    fn feed(&mut self, line_number: usize, line: &str) -> bool {
        let tokens = tokenise_line(line);

        let Some(&keyword) = tokens.first() else {
            self.report(line_number, line, "empty line".to_string());
            return false;
        };

        match (self.state, keyword) {
            (ParserState::AwaitingBegin, "begin") => self.start_event(),
            (ParserState::AwaitingBegin, "stop") => {
                debug!("Genie tracker stop marker at line {}", line_number);
                self.load.reached_stop = true;
                return true;
            }
            (ParserState::AwaitingBegin, _) if self.discarding => {}
            (ParserState::HaveNuance, "nuance") => match tokens.get(1).map(|t| t.parse::<i32>()) {
                Some(Ok(code)) => {
                    self.event_mut().nuance_code = code;
                    self.state = ParserState::HaveVertex;
                }
                Some(Err(e)) => self.abandon(line_number, line, format!("invalid nuance code: {}", e)),
                None => self.abandon(line_number, line, "missing nuance code".to_string()),
            },
            (ParserState::HaveVertex, "vertex") => match parse_vertex(&tokens) {
                Ok((vertex, time)) => {
                    let event = self.event_mut();
                    event.vertex = vertex;
                    event.vertex_time = time;
                    self.state = ParserState::HaveNeutrinoTrack;
                }
                Err(reason) => self.abandon(line_number, line, reason),
            },
            (ParserState::HaveNeutrinoTrack, "track") => match Track::from_tokens(&tokens) {
                // Neutrino is kept whatever its status token says
                Ok(track) => {
                    self.event_mut().neutrino = Some(track);
                    self.state = ParserState::AccumulatingDaughters;
                }
                Err(reason) => self.abandon(line_number, line, reason),
            },
            (ParserState::AccumulatingDaughters, "track") => match tokens.get(6) {
                Some(&"0") => match Track::from_tokens(&tokens) {
                    Ok(track) => self.event_mut().daughters.push(track),
                    Err(reason) => self.abandon(line_number, line, reason),
                },
                Some(_) => {}
                None => self.abandon(line_number, line, "missing tracking status".to_string()),
            },
            (ParserState::AccumulatingDaughters, "end") => self.complete_event(),
            (_, "begin") => {
                self.report(
                    line_number,
                    line,
                    "begin inside an open event; previous event dropped".to_string(),
                );
                self.start_event();
            }
            (_, other) => {
                self.report(line_number, line, format!("unexpected token {:?}", other));
            }
        }

        false
    }

    fn finish(mut self) -> GenieLoad {
        if self.state != ParserState::AwaitingBegin {
            warn!("Genie tracker input ended inside an event (state {}); event dropped", self.state);
        } else if !self.load.reached_stop {
            debug!("Genie tracker input ended without a stop marker");
        }
        self.current = None;
        self.load
    }

    fn start_event(&mut self) {
        self.current = Some(PartialEvent::default());
        self.discarding = false;
        self.state = ParserState::HaveNuance;
    }

    fn complete_event(&mut self) {
        self.state = ParserState::AwaitingBegin;
        let Some(partial) = self.current.take() else {
            return;
        };
        if let Some(neutrino) = partial.neutrino {
            self.load.events.push(GenieEvent {
                nuance_code: partial.nuance_code,
                vertex: partial.vertex,
                vertex_time: partial.vertex_time,
                neutrino,
                daughters: partial.daughters,
            });
        }
    }

    fn event_mut(&mut self) -> &mut PartialEvent {
        self.current.get_or_insert_with(PartialEvent::default)
    }

    fn abandon(&mut self, line_number: usize, line: &str, reason: String) {
        self.report(line_number, line, format!("{}; event dropped", reason));
        self.current = None;
        self.discarding = true;
        self.state = ParserState::AwaitingBegin;
    }

    fn report(&mut self, line_number: usize, line: &str, reason: String) {
        let error = Error::GenieParse {
            line_number,
            line: line.to_string(),
            state: self.state.to_string(),
            reason,
        };
        warn!("{}", error);
        self.load.errors.push(error);
    }
}

fn parse_f64(token: &str, what: &str) -> std::result::Result<f64, String> {
    token
        .parse::<f64>()
        .map_err(|e| format!("invalid {} {:?}: {}", what, token, e))
}

fn parse_vertex(tokens: &[&str]) -> std::result::Result<([f64; 3], Option<f64>), String> {
    if tokens.len() < 4 {
        return Err(format!("vertex line needs 3 coordinates, found {}", tokens.len().saturating_sub(1)));
    }
    let vertex = [
        parse_f64(tokens[1], "vertex x")?,
        parse_f64(tokens[2], "vertex y")?,
        parse_f64(tokens[3], "vertex z")?,
    ];
    let time = match tokens.get(4) {
        Some(token) => Some(parse_f64(token, "vertex time")?),
        None => None,
    };
    Ok((vertex, time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
$ begin
$ nuance 1
$ vertex 0 0 0 0
$ track 14 3244 0 0 1 -1
$ track 18040 37215.5 -999 -999 -999 -1
$ track 2112 909.404 -0.303744 0.348279 0.886815 -1
$ track 2212 997.185 0.278017 0.437414 0.855205 -2
$ track 13 3156.22 -0.0508622 -0.0226286 0.998449 0
$ track 2212 943.662 -0.802833 -0.171477 0.571012 0
$ track 2212 1014.54 0.0325571 0.760753 0.648224 0
$ end
$ stop
";

    fn parse(text: &str) -> GenieLoad {
        parse_genie_events(Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_tokenise_collapses_delimiters() {
        assert_eq!(tokenise_line("$ track  14$$3244 "), vec!["track", "14", "3244"]);
        assert_eq!(tokenise_line("begin"), vec!["begin"]);
        assert!(tokenise_line(" $ $ ").is_empty());
        assert_eq!(tokenise_line("end\r"), vec!["end"]);
    }

    #[test]
    fn test_sample_block() {
        let load = parse(SAMPLE);
        assert!(load.errors.is_empty(), "{:?}", load.errors);
        assert!(load.reached_stop);
        assert_eq!(load.events.len(), 1);

        let event = &load.events[0];
        assert_eq!(event.nuance_code(), 1);
        assert_eq!(event.vertex(), [0.0, 0.0, 0.0]);
        assert_eq!(event.vertex_time(), Some(0.0));
        assert_eq!(event.neutrino_track().pdg(), 14);
        assert!((event.neutrino_track().energy() - 3.244).abs() < 1e-9);

        let pdgs: Vec<i32> = event.daughter_tracks().iter().map(Track::pdg).collect();
        assert_eq!(pdgs, vec![13, 2212, 2212]);
    }

    #[test]
    fn test_argon_remap() {
        let track = Track::from_tokens(&["track", "18040", "37215.5", "-999", "-999", "-999", "0"]).unwrap();
        assert_eq!(track.pdg(), ARGON_PDG);
        assert_eq!(Track::new(18040, 1.0, [0.0, 0.0, 1.0]).pdg(), 1000180400);
        assert_eq!(normalize_pdg(13), 13);
    }

    #[test]
    fn test_track_energy_converted_to_gev() {
        let track = Track::from_tokens(&["track", "13", "1500", "1", "0", "0"]).unwrap();
        assert!((track.energy() - 1.5).abs() < 1e-12);
        // Programmatic constructor takes GeV directly
        assert_eq!(Track::new(13, 1.5, [1.0, 0.0, 0.0]).energy(), 1.5);
    }

    #[test]
    fn test_unit_direction() {
        let track = Track::new(13, 1.0, [0.0, 3.0, 4.0]);
        let unit = track.unit_direction().unwrap();
        assert!((unit[1] - 0.6).abs() < 1e-12);
        assert!((unit[2] - 0.8).abs() < 1e-12);
        assert!(Track::new(13, 1.0, [0.0, 0.0, 0.0]).unit_direction().is_none());
    }

    #[test]
    fn test_multiple_blocks_counted() {
        let block = "begin\nnuance 1\nvertex 1 2 3\ntrack 14 1000 0 0 1 -1\ntrack 13 500 0 0 1 0\nend\n";
        let text = format!("{}{}{}stop\n", block, block, block);
        let load = parse(&text);
        assert_eq!(load.events.len(), 3);
        for event in &load.events {
            assert_eq!(event.daughter_tracks().len(), 1);
            assert_eq!(event.vertex(), [1.0, 2.0, 3.0]);
            assert_eq!(event.vertex_time(), None);
        }
    }

    #[test]
    fn test_lines_after_stop_ignored() {
        let text = "begin\nnuance 1\nvertex 0 0 0\ntrack 14 1000 0 0 1 -1\nend\nstop\nbegin\nnuance 2\n";
        let load = parse(text);
        assert_eq!(load.events.len(), 1);
        assert!(load.errors.is_empty());
    }

    #[test]
    fn test_unexpected_token_reported_and_parsing_continues() {
        let text = "begin\nvertex 0 0 0\nnuance 4\nvertex 0 0 0\ntrack 14 1000 0 0 1 -1\nend\nstop\n";
        let load = parse(text);
        assert_eq!(load.errors.len(), 1);
        match &load.errors[0] {
            Error::GenieParse { line_number, state, .. } => {
                assert_eq!(*line_number, 2);
                assert_eq!(state, "HaveNuance");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(load.events.len(), 1);
        assert_eq!(load.events[0].nuance_code(), 4);
    }

    #[test]
    fn test_malformed_vertex_drops_event_and_resyncs() {
        let text = "\
begin
nuance 1
vertex 0 zero 0
track 14 1000 0 0 1 -1
end
begin
nuance 2
vertex 0 0 0
track 14 2000 0 0 1 -1
end
stop
";
        let load = parse(text);
        assert_eq!(load.errors.len(), 1);
        assert_eq!(load.events.len(), 1);
        assert_eq!(load.events[0].nuance_code(), 2);
    }

    #[test]
    fn test_empty_line_is_reported() {
        let text = "begin\n\nnuance 1\nvertex 0 0 0\ntrack 14 1000 0 0 1 -1\nend\n";
        let load = parse(text);
        assert_eq!(load.errors.len(), 1);
        assert_eq!(load.events.len(), 1);
    }

    #[test]
    fn test_begin_inside_event_restarts() {
        let text = "begin\nnuance 1\nbegin\nnuance 2\nvertex 0 0 0\ntrack 14 1000 0 0 1 -1\nend\n";
        let load = parse(text);
        assert_eq!(load.errors.len(), 1);
        assert_eq!(load.events.len(), 1);
        assert_eq!(load.events[0].nuance_code(), 2);
    }

    #[test]
    fn test_unterminated_event_dropped() {
        let load = parse("begin\nnuance 1\nvertex 0 0 0\ntrack 14 1000 0 0 1 -1\n");
        assert!(load.events.is_empty());
        assert!(!load.reached_stop);
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let result = load_genie_events(Path::new("/nonexistent/genie/tracker.txt"));
        assert!(matches!(result, Err(Error::FileUnreadable { .. })));
    }
}
