//! Detector volume and 3D energy binning

use g4tpc_common::config::DetectorConfig;
use tracing::warn;

/// Axis-aligned liquid argon box split into `n_layers` bins per axis
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorGeometry {
    center: [f64; 3],
    width: [f64; 3],
    n_layers: i64,
}

impl DetectorGeometry {
    pub fn new(center: [f64; 3], width: [f64; 3], n_layers: i64) -> Self {
        Self {
            center,
            width,
            n_layers: n_layers.max(1),
        }
    }

    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    pub fn width(&self) -> [f64; 3] {
        self.width
    }

    pub fn n_layers(&self) -> i64 {
        self.n_layers
    }

    /// Lower corner of the box
    pub fn low_corner(&self) -> [f64; 3] {
        [0, 1, 2].map(|axis| self.center[axis] - 0.5 * self.width[axis])
    }

    pub fn high_corner(&self) -> [f64; 3] {
        [0, 1, 2].map(|axis| self.center[axis] + 0.5 * self.width[axis])
    }

    pub fn contains(&self, position: [f64; 3]) -> bool {
        let low = self.low_corner();
        let high = self.high_corner();
        (0..3).all(|axis| position[axis] >= low[axis] && position[axis] <= high[axis])
    }

    /// Cell index and bin-centre position for a point, `None` outside the box
    ///
    /// Index is `ix + n·iy + n²·iz`. Points on the upper face fall in the last bin.
    /// An index that would not fit in an i64 is reported and yields `None`.
    pub fn cell_for(&self, position: [f64; 3]) -> Option<(i64, [f64; 3])> {
        if !self.contains(position) {
            return None;
        }

        let n = self.n_layers;
        let low = self.low_corner();
        let mut bins = [0i64; 3];
        let mut centre = [0.0; 3];

        for axis in 0..3 {
            let size = self.width[axis] / n as f64;
            let bin = (((position[axis] - low[axis]) / size).floor() as i64).clamp(0, n - 1);
            bins[axis] = bin;
            centre[axis] = low[axis] + (bin as f64 + 0.5) * size;
        }

        let index = n
            .checked_mul(n)
            .and_then(|n2| n2.checked_mul(bins[2]))
            .and_then(|z| n.checked_mul(bins[1]).and_then(|y| z.checked_add(y)))
            .and_then(|zy| zy.checked_add(bins[0]));
        if index.is_none() {
            warn!("Cell index for bins {:?} with {} layers overflows; deposit dropped", bins, n);
        }
        index.map(|index| (index, centre))
    }
}

impl From<&DetectorConfig> for DetectorGeometry {
    fn from(config: &DetectorConfig) -> Self {
        Self::new(config.center, config.width, config.n_layers)
    }
}
