//! Integration tests for genie tracker file loading
//!
//! Tests cover:
//! - Event counting over N well-formed blocks
//! - Status-0 daughter filtering and the neutrino exemption
//! - MeV → GeV conversion and argon PDG remapping
//! - Missing files reported as FileUnreadable

use g4tpc_common::genie::{load_genie_events, parse_genie_events, ARGON_PDG};
use g4tpc_common::Error;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

fn block(nuance: i32, daughters: &[(i32, &str)]) -> String {
    let mut text = format!("$ begin\n$ nuance {}\n$ vertex 10 -20 30 0\n$ track 14 3244 0 0 1 -1\n", nuance);
    for (pdg, status) in daughters {
        text.push_str(&format!("$ track {} 1000 0 1 0 {}\n", pdg, status));
    }
    text.push_str("$ end\n");
    text
}

#[test]
fn test_single_event_scenario() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "$ begin\n$ nuance 1\n$ vertex 0 0 0\n$ track 14 3244 0 0 1 -1\n$ track 13 3156.22 0 0 1 0\n$ end\n$ stop\n"
    )
    .unwrap();

    let load = load_genie_events(file.path()).unwrap();
    assert_eq!(load.events.len(), 1);

    let event = &load.events[0];
    assert_eq!(event.daughter_tracks().len(), 1);
    assert_eq!(event.daughter_tracks()[0].pdg(), 13);
    assert!((event.neutrino_track().energy() - 3.244).abs() < 1e-9);
    assert_eq!(event.neutrino_track().direction(), [0.0, 0.0, 1.0]);
}

#[test]
fn test_n_blocks_yield_n_events() {
    for n in [0usize, 1, 2, 5, 17] {
        let mut text = String::new();
        for i in 0..n {
            text.push_str(&block(i as i32, &[(13, "0"), (2212, "1"), (211, "0"), (2112, "-1")]));
        }
        text.push_str("$ stop\n");

        let load = parse_genie_events(Cursor::new(text)).unwrap();
        assert_eq!(load.events.len(), n);
        assert!(load.errors.is_empty());

        for (i, event) in load.events.iter().enumerate() {
            assert_eq!(event.nuance_code(), i as i32);
            assert_eq!(event.neutrino_track().pdg(), 14);
            let pdgs: Vec<i32> = event.daughter_tracks().iter().map(|t| t.pdg()).collect();
            assert_eq!(pdgs, vec![13, 211]);
        }
    }
}

#[test]
fn test_neutrino_status_ignored() {
    let text = "begin\nnuance 1\nvertex 0 0 0\ntrack 14 3244 0 0 1 7\nend\n";
    let load = parse_genie_events(Cursor::new(text)).unwrap();
    assert_eq!(load.events.len(), 1);
    assert!(load.events[0].daughter_tracks().is_empty());
}

#[test]
fn test_argon_daughter_remapped() {
    let text = block(1, &[(18040, "0")]);
    let load = parse_genie_events(Cursor::new(text)).unwrap();
    assert_eq!(load.events[0].daughter_tracks()[0].pdg(), ARGON_PDG);
}

#[test]
fn test_dollar_only_separators() {
    let text = "$begin$\n$nuance$2\n$vertex$1$2$3\n$track$14$500$0$0$1$-1\n$track$13$250$1$0$0$0\n$end\n$stop\n";
    let load = parse_genie_events(Cursor::new(text)).unwrap();
    assert_eq!(load.events.len(), 1);
    assert_eq!(load.events[0].vertex(), [1.0, 2.0, 3.0]);
    assert!((load.events[0].daughter_tracks()[0].energy() - 0.25).abs() < 1e-12);
}

#[test]
fn test_missing_file_reported() {
    let dir = tempfile::TempDir::new().unwrap();
    let missing = dir.path().join("absent.tracker");
    match load_genie_events(&missing) {
        Err(Error::FileUnreadable { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected FileUnreadable, got {:?}", other),
    }
}
