//! Per-cell energy accumulation with provenance
//!
//! Deposits are keyed by cell index. Each cell remembers who deposited what,
//! in arrival order, so the dominant contributor can be found at write time.

use serde::Serialize;
use std::collections::BTreeMap;

/// One deposit into a cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contribution {
    pub track_id: i32,
    /// GeV
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    index: i64,
    position: [f64; 3],
    energy: f64,
    contributions: Vec<Contribution>,
}

impl Cell {
    fn new(index: i64, position: [f64; 3]) -> Self {
        Self {
            index,
            position,
            energy: 0.0,
            contributions: Vec::new(),
        }
    }

    pub fn index(&self) -> i64 {
        self.index
    }

    /// Position recorded by the first deposit
    pub fn position(&self) -> [f64; 3] {
        self.position
    }

    /// Total deposited energy in GeV
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// One entry per deposit, in arrival order; repeated tracks are not merged
    pub fn contributions(&self) -> &[Contribution] {
        &self.contributions
    }

    /// Largest contribution; earliest entry wins ties
    ///
    /// `None` when nothing above `f64::EPSILON` was deposited.
    pub fn dominant_contributor(&self) -> Option<Contribution> {
        let mut best: Option<Contribution> = None;
        for contribution in &self.contributions {
            if best.map_or(true, |b| contribution.energy > b.energy) {
                best = Some(*contribution);
            }
        }
        best.filter(|b| b.energy >= f64::EPSILON)
    }

    fn add(&mut self, track_id: i32, energy: f64) {
        self.energy += energy;
        self.contributions.push(Contribution { track_id, energy });
    }
}

/// Cells hit during the event in progress
#[derive(Debug, Clone, Default)]
pub struct CellAggregator {
    cells: BTreeMap<i64, Cell>,
}

impl CellAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `energy` (GeV) deposited by `track_id` to a cell
    ///
    /// The first deposit fixes the cell position; later positions are ignored.
    pub fn add_energy_deposit(&mut self, cell_index: i64, position: [f64; 3], energy: f64, track_id: i32) {
        self.cells
            .entry(cell_index)
            .or_insert_with(|| Cell::new(cell_index, position))
            .add(track_id, energy);
    }

    pub fn dominant_contributor(&self, cell_index: i64) -> Option<Contribution> {
        self.cells.get(&cell_index)?.dominant_contributor()
    }

    pub fn cell(&self, cell_index: i64) -> Option<&Cell> {
        self.cells.get(&cell_index)
    }

    /// Cells in ascending index order
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn total_energy(&self) -> f64 {
        self.cells.values().map(Cell::energy).sum()
    }

    pub fn clear_for_next_event(&mut self) {
        self.cells.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deposits_accumulate() {
        let mut cells = CellAggregator::new();
        cells.add_energy_deposit(3, [1.0, 2.0, 3.0], 2.0, 3);
        cells.add_energy_deposit(3, [9.0, 9.0, 9.0], 1.5, 3);

        assert_eq!(cells.len(), 1);
        let cell = cells.cell(3).unwrap();
        assert_eq!(cell.energy(), 3.5);
        assert_eq!(cell.position(), [1.0, 2.0, 3.0]);
        assert_eq!(cell.contributions().len(), 2);
        assert_eq!(cells.dominant_contributor(3).unwrap().track_id, 3);
    }

    #[test]
    fn test_dominant_first_maximum_wins() {
        let mut cells = CellAggregator::new();
        cells.add_energy_deposit(0, [0.0; 3], 1.0, 5);
        cells.add_energy_deposit(0, [0.0; 3], 3.0, 7);
        cells.add_energy_deposit(0, [0.0; 3], 3.0, 9);

        let dominant = cells.dominant_contributor(0).unwrap();
        assert_eq!(dominant.track_id, 7);
        assert_eq!(dominant.energy, 3.0);
    }

    #[test]
    fn test_dominant_uses_single_deposits() {
        let mut cells = CellAggregator::new();
        cells.add_energy_deposit(0, [0.0; 3], 1.0, 5);
        cells.add_energy_deposit(0, [0.0; 3], 1.5, 7);
        cells.add_energy_deposit(0, [0.0; 3], 1.0, 5);

        let cell = cells.cell(0).unwrap();
        assert_eq!(cell.contributions().len(), 3);
        assert_eq!(cell.energy(), 3.5);
        // Track 5 deposited 2.0 in total, but no single deposit beats 1.5
        let dominant = cells.dominant_contributor(0).unwrap();
        assert_eq!((dominant.track_id, dominant.energy), (7, 1.5));
    }

    #[test]
    fn test_negligible_cell_has_no_contributor() {
        let mut cells = CellAggregator::new();
        cells.add_energy_deposit(1, [0.0; 3], 0.0, 4);
        assert!(cells.dominant_contributor(1).is_none());
        assert!(cells.dominant_contributor(2).is_none());
    }

    #[test]
    fn test_cells_ordered_by_index() {
        let mut cells = CellAggregator::new();
        for index in [40, 2, 17] {
            cells.add_energy_deposit(index, [0.0; 3], 0.5, 1);
        }
        let order: Vec<i64> = cells.cells().map(Cell::index).collect();
        assert_eq!(order, vec![2, 17, 40]);
        assert!((cells.total_energy() - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut cells = CellAggregator::new();
        cells.add_energy_deposit(1, [0.0; 3], 1.0, 1);
        cells.clear_for_next_event();
        assert!(cells.is_empty());
        cells.clear_for_next_event();
        assert!(cells.is_empty());
        assert_eq!(cells.total_energy(), 0.0);
    }
}
