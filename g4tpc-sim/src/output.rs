//! Run document writers
//!
//! XML is the default layout: a `Run` root holding one `Event` per simulated
//! event, each with `Cell`, `MCParticle` and optional `LArTPCHit` children.
//! Paths ending in `.json` get the same content as JSON instead.

use crate::record::{CellRecord, EventRecord, ParticleRecord, RunDocument};
use crate::readout::ProtoHit;
use g4tpc_common::{Error, Result};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use xmltree::{Element, EmitterConfig, XMLNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xml,
    Json,
}

impl OutputFormat {
    /// JSON for a `.json` extension (any case), XML otherwise
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => OutputFormat::Json,
            _ => OutputFormat::Xml,
        }
    }
}

fn element(name: &str, attributes: &[(&str, String)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element.attributes.insert((*key).to_string(), value.clone());
    }
    element
}

fn cell_element(cell: &CellRecord) -> Element {
    element(
        "Cell",
        &[
            ("Id", cell.id.to_string()),
            ("MCId", cell.mc_id.to_string()),
            ("X", cell.x.to_string()),
            ("Y", cell.y.to_string()),
            ("Z", cell.z.to_string()),
            ("Energy", cell.energy.to_string()),
        ],
    )
}

fn particle_element(particle: &ParticleRecord) -> Element {
    let [start_x, start_y, start_z] = particle.start;
    let [end_x, end_y, end_z] = particle.end;
    let [px, py, pz] = particle.momentum;

    element(
        "MCParticle",
        &[
            ("Id", particle.id.to_string()),
            ("PDG", particle.pdg.to_string()),
            ("ParentId", particle.parent_id.to_string()),
            ("Mass", particle.mass.to_string()),
            ("Energy", particle.energy.to_string()),
            ("StartX", start_x.to_string()),
            ("StartY", start_y.to_string()),
            ("StartZ", start_z.to_string()),
            ("EndX", end_x.to_string()),
            ("EndY", end_y.to_string()),
            ("EndZ", end_z.to_string()),
            ("MomentumX", px.to_string()),
            ("MomentumY", py.to_string()),
            ("MomentumZ", pz.to_string()),
        ],
    )
}

fn hit_element(hit: &ProtoHit) -> Element {
    element(
        "LArTPCHit",
        &[
            ("View", hit.view.to_string()),
            ("Id", hit.id.to_string()),
            ("MCId", hit.mc_id.to_string()),
            ("DriftX", hit.drift_x.to_string()),
            ("WireCoord", hit.wire.to_string()),
            ("Energy", hit.energy.to_string()),
        ],
    )
}

fn event_element(event: &EventRecord) -> Element {
    let mut element = element("Event", &[("Number", event.number.to_string())]);

    let children = event
        .cells
        .iter()
        .map(cell_element)
        .chain(event.particles.iter().map(particle_element))
        .chain(event.hits.iter().map(hit_element));
    element.children.extend(children.map(XMLNode::Element));

    element
}

/// Build the XML tree for a run
pub fn to_xml(document: &RunDocument) -> Element {
    let mut run = Element::new("Run");
    run.children
        .extend(document.events.iter().map(event_element).map(XMLNode::Element));
    run
}

/// Serialize a run document into `writer`
pub fn render<W: Write>(document: &RunDocument, format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Xml => to_xml(document)
            .write_with_config(writer, EmitterConfig::new().perform_indent(true))
            .map_err(|e| Error::Output(format!("XML serialization failed: {}", e))),
        OutputFormat::Json => serde_json::to_writer_pretty(writer, document)
            .map_err(|e| Error::Output(format!("JSON serialization failed: {}", e))),
    }
}

/// Write a run document to `path`, creating parent directories as needed
pub fn write_document(document: &RunDocument, path: &Path, format: OutputFormat) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Output(format!("Failed to create {:?}: {}", parent, e)))?;
    }

    let file = File::create(path).map_err(|e| Error::Output(format!("Failed to create {:?}: {}", path, e)))?;
    let mut writer = BufWriter::new(file);
    render(document, format, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readout::WireView;

    fn document() -> RunDocument {
        RunDocument {
            events: vec![EventRecord {
                number: 3,
                cells: vec![CellRecord {
                    id: 12,
                    mc_id: 1,
                    x: 0.5,
                    y: -1.0,
                    z: 2.0,
                    energy: 0.25,
                }],
                particles: vec![ParticleRecord {
                    id: 1,
                    pdg: 13,
                    parent_id: 0,
                    mass: 0.1057,
                    energy: 1.2,
                    start: [0.0, 0.0, 0.0],
                    end: [0.0, 0.0, 10.0],
                    momentum: [0.0, 0.0, 1.195],
                }],
                hits: vec![ProtoHit {
                    view: WireView::V,
                    id: 12,
                    mc_id: 1,
                    drift_x: 0.5,
                    wire: 4.79,
                    energy: 0.25,
                }],
            }],
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("run.json")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("run.JSON")), OutputFormat::Json);
        assert_eq!(OutputFormat::from_path(Path::new("run.xml")), OutputFormat::Xml);
        assert_eq!(OutputFormat::from_path(Path::new("run")), OutputFormat::Xml);
    }

    #[test]
    fn test_xml_layout() {
        let run = to_xml(&document());
        assert_eq!(run.name, "Run");

        let event = run.get_child("Event").unwrap();
        assert_eq!(event.attributes.get("Number").map(String::as_str), Some("3"));

        let cell = event.get_child("Cell").unwrap();
        assert_eq!(cell.attributes.get("MCId").map(String::as_str), Some("1"));
        assert_eq!(cell.attributes.get("Energy").map(String::as_str), Some("0.25"));

        let particle = event.get_child("MCParticle").unwrap();
        assert_eq!(particle.attributes.get("PDG").map(String::as_str), Some("13"));
        assert_eq!(particle.attributes.get("EndZ").map(String::as_str), Some("10"));

        let hit = event.get_child("LArTPCHit").unwrap();
        assert_eq!(hit.attributes.get("View").map(String::as_str), Some("V"));
    }

    #[test]
    fn test_json_layout() {
        let mut buffer = Vec::new();
        render(&document(), OutputFormat::Json, &mut buffer).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();

        let event = &value["Events"][0];
        assert_eq!(event["Number"], 3);
        assert_eq!(event["Cells"][0]["MCId"], 1);
        let particle = &event["MCParticles"][0];
        assert_eq!(particle["ParentId"], 0);
        assert_eq!(particle["StartX"], 0.0);
        assert_eq!(particle["EndZ"], 10.0);
        assert_eq!(particle["MomentumZ"], 1.195);
        assert!(particle.get("Start").is_none());
        assert!(particle.get("Momentum").is_none());
        assert_eq!(event["LArTPCHits"][0]["WireCoord"], 4.79);
        assert_eq!(event["LArTPCHits"][0]["View"], "V");
    }
}
