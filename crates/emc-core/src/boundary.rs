//! Boundary model: per-edge-segment classification and contact values
//! (spec §3 "Mesh" boundary descriptor, §4.3).

use serde::{Deserialize, Serialize};

use crate::mesh::Direction;

/// Classification of one outer-edge segment (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryKind {
    Insulator,
    Ohmic,
    Schottky,
    Vacuum,
}

/// Contact-prescribed values for one edge segment (spec §4.3 `edge`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSegment {
    pub kind: BoundaryKind,
    pub potential: f64,
    pub electron_density: f64,
    pub hole_density: f64,
}

impl EdgeSegment {
    pub fn insulator() -> Self {
        Self { kind: BoundaryKind::Insulator, potential: 0.0, electron_density: 0.0, hole_density: 0.0 }
    }

    pub fn is_contact(&self) -> bool {
        matches!(self.kind, BoundaryKind::Ohmic | BoundaryKind::Schottky)
    }
}

/// Per-direction list of edge segments, one entry per cell along that
/// edge (spec §4.3 query API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryModel {
    left: Vec<EdgeSegment>,
    right: Vec<EdgeSegment>,
    bottom: Vec<EdgeSegment>,
    top: Vec<EdgeSegment>,
}

impl BoundaryModel {
    pub fn new(left: Vec<EdgeSegment>, right: Vec<EdgeSegment>, bottom: Vec<EdgeSegment>, top: Vec<EdgeSegment>) -> Self {
        Self { left, right, bottom, top }
    }

    fn side(&self, dir: Direction) -> &[EdgeSegment] {
        match dir {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
            Direction::Bottom => &self.bottom,
            Direction::Top => &self.top,
        }
    }

    pub fn edge(&self, dir: Direction, index: usize) -> &EdgeSegment {
        let side = self.side(dir);
        &side[index.min(side.len() - 1)]
    }

    pub fn is_insulator(&self, dir: Direction, index: usize) -> bool {
        self.edge(dir, index).kind == BoundaryKind::Insulator
    }

    pub fn is_ohmic(&self, dir: Direction, index: usize) -> bool {
        self.edge(dir, index).kind == BoundaryKind::Ohmic
    }

    pub fn is_schottky(&self, dir: Direction, index: usize) -> bool {
        self.edge(dir, index).kind == BoundaryKind::Schottky
    }

    pub fn is_vacuum(&self, dir: Direction, index: usize) -> bool {
        self.edge(dir, index).kind == BoundaryKind::Vacuum
    }

    pub fn is_contact(&self, dir: Direction, index: usize) -> bool {
        self.edge(dir, index).is_contact()
    }

    pub fn len(&self, dir: Direction) -> usize {
        self.side(dir).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_is_ohmic_or_schottky_not_insulator() {
        let model = BoundaryModel::new(
            vec![EdgeSegment { kind: BoundaryKind::Ohmic, potential: 1.0, electron_density: 1e23, hole_density: 0.0 }],
            vec![EdgeSegment::insulator()],
            vec![EdgeSegment::insulator()],
            vec![EdgeSegment::insulator()],
        );
        assert!(model.is_contact(Direction::Left, 0));
        assert!(!model.is_contact(Direction::Right, 0));
        assert!(!model.is_insulator(Direction::Left, 0));
    }
}
