//! Poisson and Faraday field solvers (spec §4.4).

use emc_materials::constants::{EPS0, Q};
use emc_materials::MaterialTable;

use crate::boundary::BoundaryModel;
use crate::mesh::{Direction, Mesh};

/// Non-fatal solver degradation (spec §7 kind 3): Poisson iterations
/// exhausted without reaching `tolerance`; the last iterate is accepted
/// and this is surfaced as an observable counter rather than an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonReport {
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

/// Successive-over-relaxation Poisson solve over the 5-point Laplacian
/// (spec §4.4 "Poisson"). Dirichlet at ohmic/Schottky edges, Neumann
/// (zero normal gradient) at insulators; dielectric overlays are folded
/// additively into the local permittivity at the RHS per SPEC_FULL.md's
/// §4.2 expansion (flagged as an Open Question against the intended
/// physics in DESIGN.md).
pub fn solve_poisson(
    mesh: &mut Mesh,
    boundary: &BoundaryModel,
    materials: &MaterialTable,
    omega: f64,
    tolerance: f64,
    max_iterations: usize,
) -> PoissonReport {
    apply_dirichlet(mesh, boundary);

    let nx = mesh.nx;
    let ny = mesh.ny;
    let dx2 = mesh.dx * mesh.dx;
    let dy2 = mesh.dy * mesh.dy;

    let mut iterations = 0;
    let mut residual = f64::INFINITY;
    let mut converged = false;

    while iterations < max_iterations {
        let mut max_correction = 0.0f64;
        for j in 0..=ny {
            for i in 0..=nx {
                if is_dirichlet(boundary, mesh, i, j) {
                    continue;
                }
                let eps_local = local_permittivity(mesh, materials, i, j);
                let rhs = charge_rhs(mesh, i, j, eps_local);

                let (im1, ip1) = neighbor_x(mesh, boundary, i, j);
                let (jm1, jp1) = neighbor_y(mesh, boundary, i, j);

                let psi_im1 = mesh.node(im1, j).potential;
                let psi_ip1 = mesh.node(ip1, j).potential;
                let psi_jm1 = mesh.node(i, jm1).potential;
                let psi_jp1 = mesh.node(i, jp1).potential;

                let laplacian_rhs = (psi_im1 + psi_ip1) / dx2 + (psi_jm1 + psi_jp1) / dy2 - rhs;
                let denom = 2.0 / dx2 + 2.0 / dy2;
                let psi_new = laplacian_rhs / denom;

                let node = mesh.node_mut(i, j);
                let correction = omega * (psi_new - node.potential);
                node.potential += correction;
                max_correction = max_correction.max(correction.abs());
            }
        }
        iterations += 1;
        residual = max_correction;
        if max_correction < tolerance {
            converged = true;
            break;
        }
    }

    compute_efield(mesh);

    PoissonReport { iterations, residual, converged }
}

fn is_dirichlet(boundary: &BoundaryModel, mesh: &Mesh, i: usize, j: usize) -> bool {
    (i == 0 && boundary.edge(Direction::Left, j).is_contact())
        || (i == mesh.nx && boundary.edge(Direction::Right, j).is_contact())
        || (j == 0 && boundary.edge(Direction::Bottom, i).is_contact())
        || (j == mesh.ny && boundary.edge(Direction::Top, i).is_contact())
}

fn apply_dirichlet(mesh: &mut Mesh, boundary: &BoundaryModel) {
    let nx = mesh.nx;
    let ny = mesh.ny;
    for j in 0..=ny {
        let edge = boundary.edge(Direction::Left, j);
        if edge.is_contact() {
            mesh.node_mut(0, j).potential = edge.potential;
        }
        let edge = boundary.edge(Direction::Right, j);
        if edge.is_contact() {
            mesh.node_mut(nx, j).potential = edge.potential;
        }
    }
    for i in 0..=nx {
        let edge = boundary.edge(Direction::Bottom, i);
        if edge.is_contact() {
            mesh.node_mut(i, 0).potential = edge.potential;
        }
        let edge = boundary.edge(Direction::Top, i);
        if edge.is_contact() {
            mesh.node_mut(i, ny).potential = edge.potential;
        }
    }
}

/// Neumann (zero normal gradient) reflects the interior neighbor back at
/// insulating edges; a one-sided fallback, matching §4.4's field
/// central-difference note.
fn neighbor_x(mesh: &Mesh, boundary: &BoundaryModel, i: usize, j: usize) -> (usize, usize) {
    let im1 = if i == 0 {
        if boundary.edge(Direction::Left, j).is_contact() { 0 } else { 1 }
    } else {
        i - 1
    };
    let ip1 = if i == mesh.nx {
        if boundary.edge(Direction::Right, j).is_contact() { mesh.nx } else { mesh.nx - 1 }
    } else {
        i + 1
    };
    (im1, ip1)
}

fn neighbor_y(mesh: &Mesh, boundary: &BoundaryModel, i: usize, j: usize) -> (usize, usize) {
    let jm1 = if j == 0 {
        if boundary.edge(Direction::Bottom, i).is_contact() { 0 } else { 1 }
    } else {
        j - 1
    };
    let jp1 = if j == mesh.ny {
        if boundary.edge(Direction::Top, i).is_contact() { mesh.ny } else { mesh.ny - 1 }
    } else {
        j + 1
    };
    (jm1, jp1)
}

fn local_permittivity(mesh: &Mesh, materials: &MaterialTable, i: usize, j: usize) -> f64 {
    let node = mesh.node(i, j);
    materials.get(node.material).map(|m| m.eps_static).unwrap_or(1.0) * EPS0
}

/// Dielectric-overlay contribution to the RHS (spec §6 "dielectric
/// overlays", SPEC_FULL.md §4.2 expansion): each overlay's
/// thickness-scaled potential couples additively into the charge term,
/// an interface condition flagged as an Open Question against the
/// intended physics in DESIGN.md rather than a load-bearing derivation.
fn overlay_rhs(mesh: &Mesh, eps_local: f64) -> f64 {
    mesh.dielectric_overlays
        .iter()
        .filter_map(|overlay| overlay.potential.map(|v| (v, overlay)))
        .map(|(potential, overlay)| {
            let eps_overlay = 0.5 * (overlay.eps_initial + overlay.eps_final) * EPS0;
            potential * eps_overlay / (eps_local * overlay.thickness.max(1e-12))
        })
        .sum()
}

fn charge_rhs(mesh: &Mesh, i: usize, j: usize, eps_local: f64) -> f64 {
    let node = mesh.node(i, j);
    let n_e = node.electrons.density;
    let n_h = node.holes.density;
    Q * (n_h - n_e + node.net_doping()) / eps_local + overlay_rhs(mesh, eps_local)
}

fn total_potential(mesh: &Mesh, i: usize, j: usize) -> f64 {
    let node = mesh.node(i, j);
    node.potential + node.quantum_potential
}

/// `E = -grad(psi + quantum_potential)` by central differences, one-sided
/// fallback at edges (spec §4.4). The quantum effective potential is zero
/// unless [`apply_quantum_correction`] has populated it, so this reduces
/// to the classical field when the quantum-flag is off.
pub fn compute_efield(mesh: &mut Mesh) {
    let nx = mesh.nx;
    let ny = mesh.ny;
    let dx = mesh.dx;
    let dy = mesh.dy;
    let mut fields = vec![(0.0, 0.0); (nx + 1) * (ny + 1)];

    for j in 0..=ny {
        for i in 0..=nx {
            let ex = if i == 0 {
                -(total_potential(mesh, 1, j) - total_potential(mesh, 0, j)) / dx
            } else if i == nx {
                -(total_potential(mesh, nx, j) - total_potential(mesh, nx - 1, j)) / dx
            } else {
                -(total_potential(mesh, i + 1, j) - total_potential(mesh, i - 1, j)) / (2.0 * dx)
            };
            let ey = if j == 0 {
                -(total_potential(mesh, i, 1) - total_potential(mesh, i, 0)) / dy
            } else if j == ny {
                -(total_potential(mesh, i, ny) - total_potential(mesh, i, ny - 1)) / dy
            } else {
                -(total_potential(mesh, i, j + 1) - total_potential(mesh, i, j - 1)) / (2.0 * dy)
            };
            fields[j * (nx + 1) + i] = (ex, ey);
        }
    }

    mesh.for_each_node_mut(|i, j, node| {
        node.efield = fields[j * (nx + 1) + i];
    });
}

/// Bohm quantum effective potential correction (spec §3 "quantum
/// effective potential", §6 "quantum-flag"): `V_Q = -(hbar^2 / 6 m*) *
/// laplacian(sqrt(n)) / sqrt(n)`, the standard density-gradient
/// first-order quantum-confinement correction, evaluated from the
/// electron density and folded additively into the node's
/// `quantum_potential` field. One-sided differences at the mesh edges,
/// matching [`compute_efield`]'s edge handling.
pub fn apply_quantum_correction(mesh: &mut Mesh, effective_mass: f64) {
    let nx = mesh.nx;
    let ny = mesh.ny;
    let dx2 = mesh.dx * mesh.dx;
    let dy2 = mesh.dy * mesh.dy;
    let hbar = emc_materials::constants::HBAR;

    let sqrt_n: Vec<f64> = {
        let mut v = vec![0.0; (nx + 1) * (ny + 1)];
        mesh.for_each_node(|i, j, node| {
            v[j * (nx + 1) + i] = node.electrons.density.max(0.0).sqrt();
        });
        v
    };
    let at = |i: usize, j: usize| sqrt_n[j * (nx + 1) + i];

    let mut corrections = vec![0.0; (nx + 1) * (ny + 1)];
    for j in 0..=ny {
        for i in 0..=nx {
            let center = at(i, j);
            if center <= 0.0 {
                continue;
            }
            let im1 = if i == 0 { center } else { at(i - 1, j) };
            let ip1 = if i == nx { center } else { at(i + 1, j) };
            let jm1 = if j == 0 { center } else { at(i, j - 1) };
            let jp1 = if j == ny { center } else { at(i, j + 1) };
            let laplacian = (im1 + ip1 - 2.0 * center) / dx2 + (jm1 + jp1 - 2.0 * center) / dy2;
            corrections[j * (nx + 1) + i] = -(hbar * hbar / (6.0 * effective_mass)) * laplacian / center;
        }
    }

    mesh.for_each_node_mut(|i, j, node| {
        node.quantum_potential = corrections[j * (nx + 1) + i];
    });
}

/// Explicit finite-difference update of the out-of-plane magnetic field,
/// driven by the time derivative of in-plane current density (spec §4.4
/// "Faraday (optional)"). Gated by the config's Faraday flag at the call
/// site (`emc-core::engine::Engine::step`).
pub fn update_faraday(mesh: &mut Mesh, dt: f64, mu0: f64) {
    let nx = mesh.nx;
    let ny = mesh.ny;
    let dx = mesh.dx;
    let dy = mesh.dy;
    let mut updates = vec![0.0; (nx + 1) * (ny + 1)];

    for j in 1..ny {
        for i in 1..nx {
            // curl(E) drives dB/dt = -curl(E); current density enters via
            // the electron/hole drift already baked into `efield` by the
            // preceding Poisson solve, so this reduces to a curl-E update
            // of the existing field (explicit Euler).
            let dex_dy = (mesh.node(i, j + 1).efield.0 - mesh.node(i, j - 1).efield.0) / (2.0 * dy);
            let dey_dx = (mesh.node(i + 1, j).efield.1 - mesh.node(i - 1, j).efield.1) / (2.0 * dx);
            let curl_e = dey_dx - dex_dy;
            updates[j * (nx + 1) + i] = -dt * curl_e / mu0;
        }
    }

    mesh.for_each_node_mut(|i, j, node| {
        node.magnetic_field += updates[j * (nx + 1) + i];
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryKind, EdgeSegment};
    use emc_materials::{AlloyBlend, Elemental, MaterialId};

    #[test]
    fn linear_potential_between_dirichlet_edges() {
        let materials = MaterialTable::build(&[Elemental::Silicon], &[] as &[AlloyBlend]).unwrap();
        let mut mesh = Mesh::new(20, 2, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        let insulator = EdgeSegment::insulator();
        let left = EdgeSegment { kind: BoundaryKind::Ohmic, potential: 0.0, electron_density: 0.0, hole_density: 0.0 };
        let right = EdgeSegment { kind: BoundaryKind::Ohmic, potential: 1.0, electron_density: 0.0, hole_density: 0.0 };
        let boundary = BoundaryModel::new(vec![left; 3], vec![right; 3], vec![insulator; 21], vec![insulator; 21]);

        let report = solve_poisson(&mut mesh, &boundary, &materials, 1.8, 1e-9, 20000);
        assert!(report.converged);

        let width = mesh.width();
        for i in 0..=mesh.nx {
            let expected = (i as f64 * mesh.dx) / width;
            let got = mesh.node(i, 1).potential;
            assert!((got - expected).abs() < 1e-4, "i={i} got={got} expected={expected}");
        }
    }
}
