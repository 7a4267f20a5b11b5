//! Projection of cell deposits onto angled-wire readout planes
//!
//! Each view has a wire angle θ (from the vertical) and a pitch. A deposit at
//! (x, y, z) lands on wire coordinate `z·cos θ − y·sin θ` with drift
//! coordinate x. Hits sharing a wire are merged while they sit closer in
//! drift than the configured width.

use crate::record::CellRecord;
use g4tpc_common::config::LArTpcConfig;
use g4tpc_common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum WireView {
    U,
    V,
    W,
}

impl fmt::Display for WireView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WireView::U => "U",
            WireView::V => "V",
            WireView::W => "W",
        };
        f.write_str(name)
    }
}

/// Wire coordinate of a point for a plane at angle `theta` (radians)
pub fn wire_coordinate(theta: f64, y: f64, z: f64) -> f64 {
    z * theta.cos() - y * theta.sin()
}

/// A deposit seen by one readout view
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProtoHit {
    pub view: WireView,
    /// Originating cell id
    pub id: i64,
    #[serde(rename = "MCId")]
    pub mc_id: i32,
    pub drift_x: f64,
    #[serde(rename = "WireCoord")]
    pub wire: f64,
    pub energy: f64,
}

impl ProtoHit {
    /// Combine two hits on the same wire
    ///
    /// Drift position is the energy-weighted mean; view and ids come from
    /// the more energetic hit, the second one on a tie.
    pub fn merge(first: ProtoHit, second: ProtoHit) -> ProtoHit {
        let energy = first.energy + second.energy;
        let drift_x = if energy.abs() < f64::EPSILON {
            0.5 * (first.drift_x + second.drift_x)
        } else {
            (first.drift_x * first.energy + second.drift_x * second.energy) / energy
        };
        let dominant = if first.energy > second.energy { first } else { second };

        ProtoHit {
            drift_x,
            energy,
            ..dominant
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewGeometry {
    pub view: WireView,
    /// Radians from the vertical
    pub angle: f64,
    /// mm
    pub pitch: f64,
}

/// Readout planes configured for a run
#[derive(Debug, Clone, PartialEq)]
pub struct ReadoutProjector {
    views: Vec<ViewGeometry>,
    drift_time_width: f64,
    hit_energy_threshold: f64,
    write_hits: bool,
}

impl ReadoutProjector {
    /// Dual-phase readout has U and W only; single phase has U, V and W
    pub fn from_config(config: &LArTpcConfig) -> Result<Self> {
        let mut views = vec![ViewGeometry {
            view: WireView::U,
            angle: config.wire_angle_u,
            pitch: config.wire_pitch_u,
        }];

        if !config.dual_phase {
            match (config.wire_angle_v, config.wire_pitch_v) {
                (Some(angle), Some(pitch)) => views.push(ViewGeometry {
                    view: WireView::V,
                    angle,
                    pitch,
                }),
                _ => {
                    return Err(Error::Readout(
                        "V view needs wire_angle_v and wire_pitch_v".to_string(),
                    ))
                }
            }
        }

        views.push(ViewGeometry {
            view: WireView::W,
            angle: config.wire_angle_w,
            pitch: config.wire_pitch_w,
        });

        Ok(Self {
            views,
            drift_time_width: config.drift_time_width,
            hit_energy_threshold: config.hit_energy_threshold,
            write_hits: config.write_hits,
        })
    }

    pub fn views(&self) -> &[ViewGeometry] {
        &self.views
    }

    pub fn write_hits(&self) -> bool {
        self.write_hits
    }

    fn geometry(&self, view: WireView) -> Result<&ViewGeometry> {
        self.views
            .iter()
            .find(|g| g.view == view)
            .ok_or_else(|| Error::Readout(format!("view {} not configured", view)))
    }

    /// One proto-hit per cell for every configured view
    pub fn project_cells(&self, cells: &[CellRecord]) -> Vec<ProtoHit> {
        self.views
            .iter()
            .flat_map(|geometry| {
                cells.iter().map(move |cell| ProtoHit {
                    view: geometry.view,
                    id: cell.id,
                    mc_id: cell.mc_id,
                    drift_x: cell.x,
                    wire: wire_coordinate(geometry.angle, cell.y, cell.z),
                    energy: cell.energy,
                })
            })
            .collect()
    }

    /// Bin hits of one view by wire and merge close neighbours in drift
    ///
    /// Output is ordered by wire bin, then drift coordinate.
    pub fn downsample(&self, hits: Vec<ProtoHit>) -> Result<Vec<ProtoHit>> {
        let Some(view) = hits.first().map(|h| h.view) else {
            return Ok(Vec::new());
        };
        if hits.iter().any(|h| h.view != view) {
            return Err(Error::Readout("cannot downsample hits from mixed views".to_string()));
        }

        let pitch = self.geometry(view)?.pitch;
        if pitch < f64::EPSILON {
            return Err(Error::Readout(format!("wire pitch for view {} is {}", view, pitch)));
        }

        let mut bins: BTreeMap<i64, Vec<ProtoHit>> = BTreeMap::new();
        for mut hit in hits {
            let bin = ((hit.wire + 0.5 * pitch) / pitch).floor() as i64;
            hit.wire = bin as f64 * pitch;
            bins.entry(bin).or_default().push(hit);
        }

        let mut merged = Vec::new();
        for (_, mut wire_hits) in bins {
            wire_hits.sort_by(|a, b| {
                a.drift_x
                    .total_cmp(&b.drift_x)
                    .then(a.energy.total_cmp(&b.energy))
            });
            self.merge_close_hits(&mut wire_hits);
            merged.extend(wire_hits);
        }

        Ok(merged)
    }

    fn merge_close_hits(&self, hits: &mut Vec<ProtoHit>) {
        while let Some(i) = (1..hits.len())
            .find(|&i| (hits[i].drift_x - hits[i - 1].drift_x).abs() < self.drift_time_width)
        {
            let second = hits.remove(i);
            let first = hits.remove(i - 1);
            let combined = ProtoHit::merge(first, second);
            let at = hits.partition_point(|h| h.drift_x <= combined.drift_x);
            hits.insert(at, combined);
        }
    }

    /// Merged hits above threshold for every view, in view order
    pub fn hits_for_event(&self, cells: &[CellRecord]) -> Result<Vec<ProtoHit>> {
        let mut by_view: BTreeMap<WireView, Vec<ProtoHit>> = BTreeMap::new();
        for hit in self.project_cells(cells) {
            by_view.entry(hit.view).or_default().push(hit);
        }

        let mut hits = Vec::new();
        for (view, proto_hits) in by_view {
            let projected = proto_hits.len();
            let merged = self.downsample(proto_hits)?;
            debug!("View {}: {} proto-hits merged into {}", view, projected, merged.len());
            hits.extend(
                merged
                    .into_iter()
                    .filter(|h| h.energy >= self.hit_energy_threshold),
            );
        }

        Ok(hits)
    }
}
