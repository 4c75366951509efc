//! Ballistic free-flight advance of one particle (spec §4.6).
//!
//! Sign convention (spec §9 Open Question, resolved against
//! `original_source/drift.h`): the Lorentz force on an electron is
//! `hbar dk/dt = -q(E + v x B)` with `q = +Q` (the elementary charge) and
//! `B` the scalar out-of-plane field, so `v x B` reduces to
//! `(+v_y B, -v_x B)`. That is the sign baked into `dk` below.

use serde::{Deserialize, Serialize};

use emc_materials::constants::{HBAR, Q};
use emc_materials::{Material, MaterialTable};

use crate::boundary::BoundaryModel;
use crate::mesh::{Direction, Mesh};
use crate::particle::Particle;

/// Selected conduction-band dispersion (spec §4.6, §6 "selected band
/// model").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandModel {
    Parabolic,
    Kane,
    FullBand,
}

/// One vacuum emission event (spec §6 "Emitted-particle log").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmittedParticle {
    pub id: u64,
    pub t_emit: f64,
    pub residual_energy: f64,
}

/// Outcome of a drift step, distinguishing the common "stayed alive, more
/// flight time remains" case from completion/removal/emission so the EMC
/// driver (§4.8) can decide whether to scatter next.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftOutcome {
    /// Drifted for the full requested `tau`; free flight may continue.
    Continued,
    /// Left through an ohmic/Schottky contact; already marked dead.
    Removed,
    /// Emitted through a vacuum boundary; already marked dead.
    Emitted(EmittedParticle),
    /// Reflected off an edge; remaining free-flight time is unchanged
    /// (spec §4.6 step 5: "a reflected particle retains remaining
    /// free-flight time").
    Reflected,
}

/// Advances one alive particle by sub-timestep `tau` under the local
/// field at its host node, then resolves boundary interactions in order
/// `{left, right, bottom, top}` (spec §4.6 steps 1-5). The particle's
/// host material and valley constants are looked up fresh each call so a
/// particle drifting across a material boundary sees its current node's
/// constants, per spec §3 "material-of-residence derived from position".
pub fn drift(
    particle: &mut Particle,
    mesh: &Mesh,
    boundary: &BoundaryModel,
    materials: &MaterialTable,
    band_model: BandModel,
    tau: f64,
    now: f64,
) -> DriftOutcome {
    if !particle.is_alive() {
        return DriftOutcome::Removed;
    }
    let Some(valley_idx) = particle.valley.index() else {
        return DriftOutcome::Removed;
    };

    let (i0, j0) = mesh.node_indices_at(particle.x, particle.y);
    let node = mesh.node(i0, j0);
    let Some(material) = materials.get(node.material) else {
        particle.kill();
        return DriftOutcome::Removed;
    };
    let valley = &material.valleys[valley_idx.min(material.valleys.len() - 1)];
    let (ex, ey) = node.efield;
    let b = node.magnetic_field;

    match band_model {
        BandModel::Parabolic => {
            let hm = HBAR / valley.effective_mass;
            let vx = particle.kx * hm;
            let vy = particle.ky * hm;
            let dkx = -Q * (ex + vy * b) * tau / HBAR;
            let dky = -Q * (ey - vx * b) * tau / HBAR;
            particle.x += hm * tau * (particle.kx + 0.5 * dkx);
            particle.y += hm * tau * (particle.ky + 0.5 * dky);
            particle.kx += dkx;
            particle.ky += dky;
        }
        BandModel::Kane => {
            let hm = HBAR / valley.effective_mass;
            let gk = HBAR * HBAR * particle.k_squared() / (2.0 * valley.effective_mass);
            let s = (1.0 + 4.0 * valley.alpha * gk).sqrt();
            let vx = particle.kx * hm / s;
            let vy = particle.ky * hm / s;
            let dkx = -Q * (ex + vy * b) * tau / HBAR;
            let dky = -Q * (ey - vx * b) * tau / HBAR;
            particle.x += hm * tau * (particle.kx + 0.5 * dkx) / s;
            particle.y += hm * tau * (particle.ky + 0.5 * dky) / s;
            particle.kx += dkx;
            particle.ky += dky;
        }
        BandModel::FullBand => {
            let hm = HBAR / valley.effective_mass;
            let vx = particle.kx * hm;
            let vy = particle.ky * hm;
            let dkx = -Q * (ex + vy * b) * tau / HBAR;
            let dky = -Q * (ey - vx * b) * tau / HBAR;

            let kx_half = particle.kx + 0.5 * dkx;
            let ky_half = particle.ky + 0.5 * dky;
            let k2 = kx_half * kx_half + ky_half * ky_half + particle.kz * particle.kz;
            // Scaled |k| units per spec §4.6: `|k| * 1e-12 / (2*pi)`.
            let ks = k2.sqrt() * 1e-12 / (2.0 * std::f64::consts::PI);
            let d_dks = full_band_derivative(&material.full_band_coeffs, ks);
            // Rescale dE/dks back to dE/d|k| with the inverse of the
            // factor used to build `ks` from `|k|`, matching
            // `original_source/drift.h`'s `d *= 1e-12 * 0.5 / PI`.
            let d_dk = d_dks * (1e-12 * 0.5 / std::f64::consts::PI);
            let ks_unscaled = ks * 1e12 * 2.0 * std::f64::consts::PI;
            let step = Q * d_dk * tau / (ks_unscaled.max(1e-30) * HBAR);

            particle.x += step * kx_half;
            particle.y += step * ky_half;
            particle.kx += dkx;
            particle.ky += dky;
        }
    }

    resolve_boundaries(particle, mesh, boundary, material, valley_idx, now)
}

/// Derivative `dE/dks` of the fitted 10-coefficient polynomial at scaled
/// `|k|` (spec §4.6 "full band" branch), matching `CB_FULL`'s exponents:
/// `E(ks) = sum_{n=0}^{9} c[n] * ks^(10-n)`, so `dE/dks = sum_{n=0}^{9}
/// (10-n) * c[n] * ks^(9-n)`. The lowest-degree term (`n=9`) is
/// `1 * c[9] * ks^0`, a real constant term the original always carries,
/// not a dropped one.
fn full_band_derivative(coeffs: &[f64; 10], ks: f64) -> f64 {
    let mut d = 0.0;
    for (n, &c) in coeffs.iter().enumerate() {
        let multiplier = (10 - n) as f64;
        let exponent = (9 - n) as i32;
        d += multiplier * c * ks.powi(exponent);
    }
    d
}

fn resolve_boundaries(
    particle: &mut Particle,
    mesh: &Mesh,
    boundary: &BoundaryModel,
    material: &Material,
    valley_idx: usize,
    now: f64,
) -> DriftOutcome {
    let width = mesh.width();
    let height = mesh.height();
    let valley = &material.valleys[valley_idx.min(material.valleys.len() - 1)];

    if particle.x <= 0.0 {
        let (_, j) = mesh.node_indices_at(particle.x, particle.y);
        if boundary.is_insulator(Direction::Left, j) {
            particle.x *= -1.0;
            particle.kx *= -1.0;
            return DriftOutcome::Reflected;
        } else if boundary.is_contact(Direction::Left, j) {
            particle.kill();
            return DriftOutcome::Removed;
        } else if boundary.is_vacuum(Direction::Left, j) {
            return vacuum_edge(particle, material, valley, now, particle.kx, 0.0, true);
        }
    }
    if particle.x >= width {
        let (_, j) = mesh.node_indices_at(particle.x, particle.y);
        if boundary.is_insulator(Direction::Right, j) {
            particle.x = width - (particle.x - width);
            particle.kx *= -1.0;
            return DriftOutcome::Reflected;
        } else if boundary.is_contact(Direction::Right, j) {
            particle.kill();
            return DriftOutcome::Removed;
        } else if boundary.is_vacuum(Direction::Right, j) {
            return vacuum_edge(particle, material, valley, now, particle.kx, width, true);
        }
    }
    if particle.y <= 0.0 {
        let (i, _) = mesh.node_indices_at(particle.x, particle.y);
        if boundary.is_insulator(Direction::Bottom, i) {
            particle.y *= -1.0;
            particle.ky *= -1.0;
            return DriftOutcome::Reflected;
        } else if boundary.is_contact(Direction::Bottom, i) {
            particle.kill();
            return DriftOutcome::Removed;
        } else if boundary.is_vacuum(Direction::Bottom, i) {
            return vacuum_edge(particle, material, valley, now, particle.ky, 0.0, false);
        }
    }
    if particle.y >= height {
        let (i, _) = mesh.node_indices_at(particle.x, particle.y);
        if boundary.is_insulator(Direction::Top, i) {
            particle.y = height - (particle.y - height);
            particle.ky *= -1.0;
            return DriftOutcome::Reflected;
        } else if boundary.is_contact(Direction::Top, i) {
            particle.kill();
            return DriftOutcome::Removed;
        } else if boundary.is_vacuum(Direction::Top, i) {
            return vacuum_edge(particle, material, valley, now, particle.ky, height, false);
        }
    }

    DriftOutcome::Continued
}

/// Vacuum boundary rule (spec §4.3): `E_out = affinity - (normal kinetic
/// energy + valley minimum)`; emit if `E_out <= 0`, else reflect
/// specularly with the normal momentum component negated.
fn vacuum_edge(
    particle: &mut Particle,
    material: &Material,
    valley: &emc_materials::material::Valley,
    now: f64,
    k_normal: f64,
    edge_value: f64,
    is_x: bool,
) -> DriftOutcome {
    let e_kinetic_normal = HBAR * HBAR * k_normal * k_normal / (2.0 * valley.effective_mass);
    let e_out = material.electron_affinity - (e_kinetic_normal + valley.emin);

    if e_out <= 0.0 {
        if is_x {
            particle.x = edge_value;
        } else {
            particle.y = edge_value;
        }
        particle.kill();
        DriftOutcome::Emitted(EmittedParticle { id: particle.id, t_emit: now, residual_energy: -e_out })
    } else {
        if is_x {
            particle.x *= -1.0;
            particle.kx *= -1.0;
        } else {
            particle.y *= -1.0;
            particle.ky *= -1.0;
        }
        DriftOutcome::Reflected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryKind, BoundaryModel, EdgeSegment};
    use crate::mesh::Mesh;
    use crate::particle::ValleyState;
    use emc_materials::{Elemental, MaterialId};

    fn flat_mesh() -> (Mesh, BoundaryModel, MaterialTable) {
        let materials = MaterialTable::build(&[Elemental::GaAs], &[] as &[emc_materials::AlloyBlend]).unwrap();
        let mesh = Mesh::new(10, 1, 1e-8, 1e-8, MaterialId::Pure(Elemental::GaAs));
        let insulator = EdgeSegment { kind: BoundaryKind::Insulator, potential: 0.0, electron_density: 0.0, hole_density: 0.0 };
        let boundary = BoundaryModel::new(vec![insulator; 2], vec![insulator; 2], vec![insulator; 11], vec![insulator; 11]);
        (mesh, boundary, materials)
    }

    #[test]
    fn zero_field_drift_is_pure_translation() {
        let (mesh, boundary, materials) = flat_mesh();
        let mut p = Particle { id: 0, x: 5e-8, y: 0.5e-8, kx: 1e8, ky: 0.0, kz: 0.0, valley: ValleyState::Alive(0), t_next: 0.0 };
        let x0 = p.x;
        let tau = 1e-14;
        let material = materials.get(MaterialId::Pure(Elemental::GaAs)).unwrap();
        let hm = HBAR / material.valleys[0].effective_mass;
        drift(&mut p, &mesh, &boundary, &materials, BandModel::Parabolic, tau, 0.0);
        assert!((p.x - (x0 + hm * tau * 1e8)).abs() < 1e-20);
    }

    #[test]
    fn insulator_reflection_is_involutive() {
        let (mesh, boundary, materials) = flat_mesh();
        let mut p = Particle { id: 0, x: -1e-10, y: 0.5e-8, kx: -1e7, ky: 0.0, kz: 0.0, valley: ValleyState::Alive(0), t_next: 0.0 };
        let before = p;
        let outcome = resolve_boundaries(
            &mut p,
            &mesh,
            &boundary,
            materials.get(MaterialId::Pure(Elemental::GaAs)).unwrap(),
            0,
            0.0,
        );
        assert_eq!(outcome, DriftOutcome::Reflected);
        let outcome2 = resolve_boundaries(
            &mut p,
            &mesh,
            &boundary,
            materials.get(MaterialId::Pure(Elemental::GaAs)).unwrap(),
            0,
            0.0,
        );
        assert_eq!(outcome2, DriftOutcome::Reflected);
        assert!((p.x - before.x).abs() < 1e-30);
        assert!((p.kx - before.kx).abs() < 1e-30);
    }

    #[test]
    fn full_band_drift_matches_closed_form_for_the_quadratic_fit() {
        // GaAs's `full_band_coeffs` carry a single nonzero term at index 8
        // (exponent 1 on `dE/dks`, i.e. `E(ks) = ks^2`), which makes `|k|`
        // cancel out of the displacement formula entirely — a convenient
        // closed form that the earlier mis-scaled/mis-indexed derivative
        // would have missed by many orders of magnitude.
        let (mesh, boundary, materials) = flat_mesh();
        let mut p = Particle { id: 0, x: 5e-8, y: 0.5e-8, kx: 1e9, ky: 0.0, kz: 0.0, valley: ValleyState::Alive(0), t_next: 0.0 };
        let x0 = p.x;
        let tau = 1e-14;
        drift(&mut p, &mesh, &boundary, &materials, BandModel::FullBand, tau, 0.0);

        let expected_step = Q * tau * 0.5e-24 / (std::f64::consts::PI.powi(2) * HBAR);
        let expected_dx = expected_step * 1e9;
        let dx = p.x - x0;
        assert!(dx.is_finite() && dx > 0.0, "displacement should be finite and positive, got {dx}");
        assert!((dx - expected_dx).abs() / expected_dx < 1e-9, "dx={dx}, expected={expected_dx}");
    }

    #[test]
    fn kane_nonparabolicity_slows_a_particle_down_relative_to_parabolic() {
        let (mesh, boundary, materials) = flat_mesh();
        let kx = 2e8;
        let mut p_parabolic = Particle { id: 0, x: 5e-8, y: 0.5e-8, kx, ky: 0.0, kz: 0.0, valley: ValleyState::Alive(0), t_next: 0.0 };
        let mut p_kane = p_parabolic;
        let tau = 1e-15;
        drift(&mut p_parabolic, &mesh, &boundary, &materials, BandModel::Parabolic, tau, 0.0);
        drift(&mut p_kane, &mesh, &boundary, &materials, BandModel::Kane, tau, 0.0);

        let dx_parabolic = p_parabolic.x - 5e-8;
        let dx_kane = p_kane.x - 5e-8;
        assert!(dx_kane > 0.0 && dx_kane < dx_parabolic, "dx_kane={dx_kane}, dx_parabolic={dx_parabolic}");
        // `kx` itself is unaffected by the nonparabolicity factor, only velocity is.
        assert!((p_kane.kx - p_parabolic.kx).abs() < 1e-30);
    }
}
