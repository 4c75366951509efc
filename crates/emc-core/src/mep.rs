//! Parabolic Maximum Entropy Principle hydrodynamic solver (spec §4.10):
//! a deterministic, moment-based sibling of the Monte Carlo transport path
//! over the same mesh and boundary model.
//!
//! Four conserved moments per node per species: `(rho, rho*vx, rho*vy,
//! energy)`. Halo cells are "logical" per spec §9's design note (not a
//! storage mandate) — ghost values are computed on demand by
//! [`ghost_value`] rather than carried in an oversized array.

use emc_materials::constants::Q;
use emc_materials::mep::RelaxationModel;
use emc_materials::Material;

use crate::boundary::BoundaryModel;
use crate::mesh::{Direction, Mesh};

/// One node's conserved MEP state: density, x/y momentum density, energy
/// density (spec §4.10 "Four conserved moments").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Conserved {
    pub rho: f64,
    pub mx: f64,
    pub my: f64,
    pub energy: f64,
}

impl Conserved {
    fn vx(&self) -> f64 {
        if self.rho > 0.0 {
            self.mx / self.rho
        } else {
            0.0
        }
    }

    fn vy(&self) -> f64 {
        if self.rho > 0.0 {
            self.my / self.rho
        } else {
            0.0
        }
    }
}

/// Dense per-node state for one species, laid out like [`Mesh`]'s node
/// array so indices line up directly.
#[derive(Debug, Clone)]
pub struct MepState {
    nx: usize,
    ny: usize,
    cells: Vec<Conserved>,
}

impl MepState {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self { nx, ny, cells: vec![Conserved::default(); (nx + 1) * (ny + 1)] }
    }

    fn index(&self, i: isize, j: isize) -> Option<usize> {
        if i < 0 || j < 0 || i as usize > self.nx || j as usize > self.ny {
            None
        } else {
            Some(j as usize * (self.nx + 1) + i as usize)
        }
    }

    pub fn get(&self, i: usize, j: usize) -> Conserved {
        self.cells[j * (self.nx + 1) + i]
    }

    pub fn set(&mut self, i: usize, j: usize, value: Conserved) {
        self.cells[j * (self.nx + 1) + i] = value;
    }

    /// Seeds the conserved state from a mesh's current `Carrier_Info`
    /// (density/velocity/energy moments), used once when MEP is selected
    /// as the transport model and the mesh still carries whatever initial
    /// condition the mesher collaborator supplied.
    pub fn seed_from_mesh(mesh: &Mesh, electrons: bool) -> Self {
        let mut state = Self::new(mesh.nx, mesh.ny);
        mesh.for_each_node(|i, j, node| {
            let info = if electrons { &node.electrons } else { &node.holes };
            let rho = info.density;
            state.set(
                i,
                j,
                Conserved { rho, mx: rho * info.sum_vx, my: rho * info.sum_vy, energy: rho * info.sum_energy.max(0.0) },
            );
        });
        state
    }

    /// Writes the finalized primitive moments back into the mesh's
    /// `Carrier_Info`, the same aggregate the Monte Carlo path populates,
    /// so the Poisson charge assignment and snapshot emission do not need
    /// to know which transport model produced them.
    pub fn write_back(&self, mesh: &mut Mesh, electrons: bool) {
        mesh.for_each_node_mut(|i, j, node| {
            let c = self.get(i, j);
            let info = if electrons { &mut node.electrons } else { &mut node.holes };
            info.density = c.rho;
            info.sum_vx = c.vx();
            info.sum_vy = c.vy();
            info.sum_energy = if c.rho > 0.0 { c.energy / c.rho } else { 0.0 };
        });
    }
}

/// Ghost value at `(i, j)` outside `[0, nx] x [0, ny]`, applying the §4.3
/// boundary rules at halo depth (spec §4.10 step 1): insulators mirror the
/// interior row/column, contacts clamp to the prescribed density/energy
/// with zero transverse velocity, and the two non-insulator/non-contact
/// kinds (Schottky/vacuum carry no MEP-specific rule in spec.md) fall back
/// to the insulator mirror.
fn ghost_value(state: &MepState, mesh: &Mesh, boundary: &BoundaryModel, i: isize, j: isize) -> Conserved {
    let nx = mesh.nx as isize;
    let ny = mesh.ny as isize;

    if i >= 0 && i <= nx && j >= 0 && j <= ny {
        return state.get(i as usize, j as usize);
    }

    let (dir, clamp_i, clamp_j, mirror_i, mirror_j) = if i < 0 {
        (Direction::Left, 0, j.clamp(0, ny), -i, j.clamp(0, ny))
    } else if i > nx {
        (Direction::Right, nx, j.clamp(0, ny), 2 * nx - i, j.clamp(0, ny))
    } else if j < 0 {
        (Direction::Bottom, i.clamp(0, nx), 0, i.clamp(0, nx), -j)
    } else {
        (Direction::Top, i.clamp(0, nx), ny, i.clamp(0, nx), 2 * ny - j)
    };

    let along = match dir {
        Direction::Left | Direction::Right => clamp_j as usize,
        Direction::Bottom | Direction::Top => clamp_i as usize,
    };
    let edge = boundary.edge(dir, along);

    if edge.is_contact() {
        let n_prescribed = edge.electron_density;
        Conserved { rho: n_prescribed, mx: 0.0, my: 0.0, energy: n_prescribed * 1.5 * emc_materials::constants::KB * 300.0 }
    } else {
        let mi = mirror_i.clamp(0, nx) as usize;
        let mj = mirror_j.clamp(0, ny) as usize;
        let mut mirrored = state.get(mi, mj);
        match dir {
            Direction::Left | Direction::Right => mirrored.mx = -mirrored.mx,
            Direction::Bottom | Direction::Top => mirrored.my = -mirrored.my,
        }
        mirrored
    }
}

/// MinMod slope limiter, used componentwise on the conserved vector (spec
/// §4.10 step 2).
fn minmod(a: f64, b: f64) -> f64 {
    if a * b <= 0.0 {
        0.0
    } else if a.abs() < b.abs() {
        a
    } else {
        b
    }
}

fn minmod_conserved(left: Conserved, center: Conserved, right: Conserved) -> Conserved {
    Conserved {
        rho: minmod(center.rho - left.rho, right.rho - center.rho),
        mx: minmod(center.mx - left.mx, right.mx - center.mx),
        my: minmod(center.my - left.my, right.my - center.my),
        energy: minmod(center.energy - left.energy, right.energy - center.energy),
    }
}

/// Parabolic-closure flux in the x direction (spec §4.10 step 3):
/// `f = [rho*vx, (2/3)*eps/m*, 0, (4/3)*eps*vx]`.
fn flux_x(c: Conserved, effective_mass: f64) -> Conserved {
    Conserved {
        rho: c.rho * c.vx(),
        mx: (2.0 / 3.0) * c.energy / effective_mass,
        my: 0.0,
        energy: (4.0 / 3.0) * c.energy * c.vx(),
    }
}

/// Parabolic-closure flux in the y direction, the x/y-swapped analogue of
/// [`flux_x`] per spec §4.10 ("analogously for g").
fn flux_y(c: Conserved, effective_mass: f64) -> Conserved {
    Conserved {
        rho: c.rho * c.vy(),
        mx: 0.0,
        my: (2.0 / 3.0) * c.energy / effective_mass,
        energy: (4.0 / 3.0) * c.energy * c.vy(),
    }
}

fn add(a: Conserved, b: Conserved) -> Conserved {
    Conserved { rho: a.rho + b.rho, mx: a.mx + b.mx, my: a.my + b.my, energy: a.energy + b.energy }
}

fn scale(a: Conserved, s: f64) -> Conserved {
    Conserved { rho: a.rho * s, mx: a.mx * s, my: a.my * s, energy: a.energy * s }
}

fn sub(a: Conserved, b: Conserved) -> Conserved {
    add(a, scale(b, -1.0))
}

/// MinMod-limited slopes of a cell's conserved state in x and y, built from
/// its immediate neighbors (spec §4.10 step 2). Used below to reconstruct a
/// face-biased value for the "near" side of each flux difference instead of
/// the raw cell-center value, so the limiter actually damps the oscillation
/// a steep gradient would otherwise feed into the predictor/corrector
/// update.
fn cell_slopes(source: &MepState, mesh: &Mesh, boundary: &BoundaryModel, i: usize, j: usize) -> (Conserved, Conserved) {
    let c = source.get(i, j);
    let left = ghost_value(source, mesh, boundary, i as isize - 1, j as isize);
    let right = ghost_value(source, mesh, boundary, i as isize + 1, j as isize);
    let bottom = ghost_value(source, mesh, boundary, i as isize, j as isize - 1);
    let top = ghost_value(source, mesh, boundary, i as isize, j as isize + 1);
    (minmod_conserved(left, c, right), minmod_conserved(bottom, c, top))
}

/// Two-stage (predictor/corrector) explicit flux update of one species'
/// conserved state over the whole mesh (spec §4.10 steps 1-4): a
/// MacCormack-style scheme where the predictor takes a forward-difference
/// half step and the corrector re-evaluates fluxes and averages back onto
/// the original grid ("the opposite sub-grid" of the predictor). Each
/// stage reconstructs its own cell's near-face value with a MinMod-limited
/// half-slope extrapolation ([`cell_slopes`]) before evaluating the flux
/// there, rather than using the raw cell-center state.
pub fn flux_step(state: &mut MepState, mesh: &Mesh, boundary: &BoundaryModel, effective_mass: f64, dt: f64) {
    let nx = mesh.nx;
    let ny = mesh.ny;
    let dx = mesh.dx;
    let dy = mesh.dy;

    let mut predicted = state.cells.clone();
    for j in 0..=ny {
        for i in 0..=nx {
            let c = state.get(i, j);
            let (slope_x, slope_y) = cell_slopes(state, mesh, boundary, i, j);
            let right = ghost_value(state, mesh, boundary, i as isize + 1, j as isize);
            let top = ghost_value(state, mesh, boundary, i as isize, j as isize + 1);
            let c_face_x = add(c, scale(slope_x, 0.5));
            let c_face_y = add(c, scale(slope_y, 0.5));
            let fx = flux_x(c_face_x, effective_mass);
            let fx_r = flux_x(right, effective_mass);
            let fy = flux_y(c_face_y, effective_mass);
            let fy_t = flux_y(top, effective_mass);

            let dfdx = scale(sub(fx_r, fx), 1.0 / dx);
            let dfdy = scale(sub(fy_t, fy), 1.0 / dy);
            let update = scale(add(dfdx, dfdy), -dt);
            predicted[j * (nx + 1) + i] = add(c, update);
        }
    }
    let predicted_state = MepState { nx, ny, cells: predicted };

    let mut corrected = state.cells.clone();
    for j in 0..=ny {
        for i in 0..=nx {
            let c_old = state.get(i, j);
            let c_pred = predicted_state.get(i, j);
            let (slope_x, slope_y) = cell_slopes(&predicted_state, mesh, boundary, i, j);
            let left = ghost_value(&predicted_state, mesh, boundary, i as isize - 1, j as isize);
            let bottom = ghost_value(&predicted_state, mesh, boundary, i as isize, j as isize - 1);
            let c_face_x = sub(c_pred, scale(slope_x, 0.5));
            let c_face_y = sub(c_pred, scale(slope_y, 0.5));
            let fx = flux_x(c_face_x, effective_mass);
            let fx_l = flux_x(left, effective_mass);
            let fy = flux_y(c_face_y, effective_mass);
            let fy_b = flux_y(bottom, effective_mass);

            let dfdx = scale(sub(fx, fx_l), 1.0 / dx);
            let dfdy = scale(sub(fy, fy_b), 1.0 / dy);
            let update = scale(add(dfdx, dfdy), -dt);
            let half_step = add(c_pred, update);
            corrected[j * (nx + 1) + i] = scale(add(c_old, half_step), 0.5);
        }
    }

    state.cells = corrected;
    clamp_physical(state);
}

fn clamp_physical(state: &mut MepState) {
    for c in state.cells.iter_mut() {
        if !c.rho.is_finite() || c.rho < 0.0 {
            *c = Conserved::default();
        }
        if !c.energy.is_finite() || c.energy < 0.0 {
            c.energy = 0.0;
        }
    }
}

/// Local exponential relaxation sub-step (spec §4.10): 50 explicit Euler
/// sub-iterations of
/// `u += -(dt/50) * (drift terms + (u - u_eq)/tau)`,
/// where the drift term is the Lorentz-force acceleration on momentum (no
/// analogue on density/energy) and `u_eq` is the local-lattice-temperature
/// equilibrium state. `tau_p`/`tau_w` come from the per-material
/// [`RelaxationModel`] (spec §4.10's closing paragraph).
pub fn relax_step(
    state: &mut MepState,
    mesh: &Mesh,
    material: &Material,
    relaxation: &RelaxationModel,
    effective_mass: f64,
    lattice_temperature: f64,
    dt: f64,
) {
    const SUBSTEPS: usize = 50;
    let sub_dt = dt / SUBSTEPS as f64;
    let kb = emc_materials::constants::KB;

    for j in 0..=mesh.ny {
        for i in 0..=mesh.nx {
            let mut c = state.get(i, j);
            let (ex, ey) = mesh.node(i, j).efield;
            for _ in 0..SUBSTEPS {
                if c.rho <= 0.0 {
                    break;
                }
                let carrier_temperature = (2.0 / 3.0) * (c.energy / c.rho) / kb;
                let tau_p = relaxation.tau_p(effective_mass, lattice_temperature, carrier_temperature.max(1.0));
                let mean_energy = c.energy / c.rho;
                let tau_w = relaxation.tau_w(mean_energy);

                let energy_eq = c.rho * 1.5 * kb * lattice_temperature;

                let force_x = -Q * ex * c.rho;
                let force_y = -Q * ey * c.rho;

                let d_mx = force_x - c.mx / tau_p;
                let d_my = force_y - c.my / tau_p;
                let d_energy = -(c.energy - energy_eq) / tau_w;

                c.mx += sub_dt * d_mx;
                c.my += sub_dt * d_my;
                c.energy = (c.energy + sub_dt * d_energy).max(0.0);
            }
            let _ = material;
            state.set(i, j, c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryKind, EdgeSegment};
    use emc_materials::{base_material, mep::relaxation_model, AlloyBlend, Elemental, MaterialId, MaterialTable};

    fn flat_setup() -> (Mesh, BoundaryModel) {
        let mesh = Mesh::new(6, 6, 1e-8, 1e-8, MaterialId::Pure(Elemental::GaAs));
        let insulator = EdgeSegment::insulator();
        let boundary = BoundaryModel::new(vec![insulator; 7], vec![insulator; 7], vec![insulator; 7], vec![insulator; 7]);
        (mesh, boundary)
    }

    #[test]
    fn flux_step_conserves_density_in_a_closed_box() {
        let (mesh, boundary) = flat_setup();
        let mut state = MepState::new(mesh.nx, mesh.ny);
        for j in 2..=4 {
            for i in 2..=4 {
                state.set(i, j, Conserved { rho: 1e23, mx: 0.0, my: 0.0, energy: 1e23 * 0.05 * emc_materials::constants::Q });
            }
        }
        let total_before: f64 = state.cells.iter().map(|c| c.rho).sum();
        flux_step(&mut state, &mesh, &boundary, 0.067 * emc_materials::constants::M0, 1e-16);
        let total_after: f64 = state.cells.iter().map(|c| c.rho).sum();
        assert!((total_after - total_before).abs() / total_before < 1e-6);
    }

    #[test]
    fn relaxation_drives_momentum_toward_zero_with_no_field() {
        let (mesh, _boundary) = flat_setup();
        let mut state = MepState::new(mesh.nx, mesh.ny);
        state.set(3, 3, Conserved { rho: 1e23, mx: 1e10, my: 0.0, energy: 1e23 * 0.1 * emc_materials::constants::Q });
        let material = base_material(Elemental::GaAs);
        let table = MaterialTable::build(&[Elemental::GaAs], &[] as &[AlloyBlend]).unwrap();
        let relax = relaxation_model(MaterialId::Pure(Elemental::GaAs), &table).unwrap();
        let before = state.get(3, 3).mx;
        relax_step(&mut state, &mesh, &material, &relax, material.valleys[0].effective_mass, 300.0, 1e-13);
        let after = state.get(3, 3).mx;
        assert!(after.abs() < before.abs());
    }
}
