//! The structured rectangular mesh (spec §3 "Mesh", §3 "Node", §4.2).

use emc_materials::MaterialId;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Direction of one of the mesh's four outer edges, also used to index
/// `for_each_node` ordering and the boundary model (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Left,
    Right,
    Bottom,
    Top,
}

/// Running sums for one carrier species at one node (spec §3 "Node").
/// Reset every `MEDIA`-step reporting window by
/// [`crate::moments::finalize_window`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CarrierInfo {
    pub density: f64,
    pub sum_vx: f64,
    pub sum_vy: f64,
    pub sum_energy: f64,
    pub count: u64,
}

impl CarrierInfo {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn add_sample(&mut self, vx: f64, vy: f64, energy: f64) {
        self.count += 1;
        self.sum_vx += vx;
        self.sum_vy += vy;
        self.sum_energy += energy;
    }
}

/// One dielectric overlay region (spec §6 "dielectric overlays", at most
/// two), coupled additively into the Poisson right-hand side (SPEC_FULL.md
/// §4.2 expansion; flagged as an Open Question against the intended
/// physics in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DielectricOverlay {
    pub eps_initial: f64,
    pub eps_final: f64,
    pub thickness: f64,
    pub potential: Option<f64>,
}

/// One mesh node, located at integer indices `(i, j)` (spec §3 "Node").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub i: usize,
    pub j: usize,
    pub material: MaterialId,
    pub donor_conc: f64,
    pub acceptor_conc: f64,
    pub electrons: CarrierInfo,
    pub holes: CarrierInfo,
    pub potential: f64,
    pub efield: (f64, f64),
    pub magnetic_field: f64,
    pub quantum_potential: f64,
    /// Last finalized (valid) carrier state, restored on a numerical
    /// pathology per spec §7 kind 5 (SPEC_FULL.md §4.9 expansion).
    checkpoint: Option<(CarrierInfo, CarrierInfo)>,
}

impl Node {
    pub fn new(i: usize, j: usize, material: MaterialId) -> Self {
        Self {
            i,
            j,
            material,
            donor_conc: 0.0,
            acceptor_conc: 0.0,
            electrons: CarrierInfo::default(),
            holes: CarrierInfo::default(),
            potential: 0.0,
            efield: (0.0, 0.0),
            magnetic_field: 0.0,
            quantum_potential: 0.0,
            checkpoint: None,
        }
    }

    pub fn net_doping(&self) -> f64 {
        self.donor_conc - self.acceptor_conc
    }

    /// Saves the current carrier state as the last-known-good snapshot,
    /// called once a reporting window finalizes cleanly.
    pub fn checkpoint(&mut self) {
        self.checkpoint = Some((self.electrons, self.holes));
    }

    /// Detects a numerical pathology (NaN moments, negative density from
    /// round-off) and reverts to the last checkpoint if found, returning
    /// whether a restore happened so the caller can bump its pathology
    /// counter (spec §7 kind 5).
    pub fn restore_if_invalid(&mut self) -> bool {
        let invalid = |c: &CarrierInfo| c.density.is_nan() || c.density < 0.0 || c.sum_energy.is_nan();
        if invalid(&self.electrons) || invalid(&self.holes) {
            if let Some((e, h)) = self.checkpoint {
                self.electrons = e;
                self.holes = h;
            } else {
                self.electrons.reset();
                self.holes.reset();
            }
            true
        } else {
            false
        }
    }
}

/// Rectangular, axis-aligned structured mesh (spec §3 "Mesh", §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mesh {
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    nodes: Vec<Node>,
    pub dielectric_overlays: Vec<DielectricOverlay>,
}

impl Mesh {
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64, default_material: MaterialId) -> Self {
        let mut nodes = Vec::with_capacity((nx + 1) * (ny + 1));
        for j in 0..=ny {
            for i in 0..=nx {
                nodes.push(Node::new(i, j, default_material));
            }
        }
        Self { nx, ny, dx, dy, nodes, dielectric_overlays: Vec::new() }
    }

    pub fn width(&self) -> f64 {
        self.nx as f64 * self.dx
    }

    pub fn height(&self) -> f64 {
        self.ny as f64 * self.dy
    }

    fn index(&self, i: usize, j: usize) -> usize {
        j * (self.nx + 1) + i
    }

    pub fn node(&self, i: usize, j: usize) -> &Node {
        &self.nodes[self.index(i, j)]
    }

    pub fn node_mut(&mut self, i: usize, j: usize) -> &mut Node {
        let idx = self.index(i, j);
        &mut self.nodes[idx]
    }

    /// Maps a continuous coordinate to its host node, O(1) via integer
    /// division, clamped to the mesh's node range (spec §4.2 `node_at`).
    pub fn node_at(&self, x: f64, y: f64) -> &Node {
        let i = (((x + 0.5 * self.dx) / self.dx) as isize).clamp(0, self.nx as isize) as usize;
        let j = (((y + 0.5 * self.dy) / self.dy) as isize).clamp(0, self.ny as isize) as usize;
        self.node(i, j)
    }

    pub fn node_indices_at(&self, x: f64, y: f64) -> (usize, usize) {
        let i = (((x + 0.5 * self.dx) / self.dx) as isize).clamp(0, self.nx as isize) as usize;
        let j = (((y + 0.5 * self.dy) / self.dy) as isize).clamp(0, self.ny as isize) as usize;
        (i, j)
    }

    /// Uniform random location inside node `(i, j)`'s cell, used for
    /// injection and initial seeding (spec §4.2 `random_point_in`).
    pub fn random_point_in<R: Rng + ?Sized>(&self, i: usize, j: usize, rng: &mut R) -> (f64, f64) {
        let x0 = (i as f64 - 0.5) * self.dx;
        let y0 = (j as f64 - 0.5) * self.dy;
        (x0 + rng.gen::<f64>() * self.dx, y0 + rng.gen::<f64>() * self.dy)
    }

    /// Ordered scan over all nodes, used by the field solver and
    /// accumulator (spec §4.2 `for_each_node`).
    pub fn for_each_node_mut(&mut self, mut f: impl FnMut(usize, usize, &mut Node)) {
        for node in self.nodes.iter_mut() {
            f(node.i, node.j, node);
        }
    }

    pub fn for_each_node(&self, mut f: impl FnMut(usize, usize, &Node)) {
        for node in self.nodes.iter() {
            f(node.i, node.j, node);
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}
