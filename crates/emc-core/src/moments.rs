//! Moment accumulation and window finalization (spec §4.9).

use crate::mesh::Mesh;
use crate::particle::Particle;
use emc_materials::constants::HBAR;
use emc_materials::MaterialTable;

/// Which species a particle belongs to, for routing into the right
/// [`crate::mesh::CarrierInfo`] (spec §3 "Node": "for electrons and for
/// holes a Carrier_Info").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Species {
    Electron,
    Hole,
}

/// Adds `(1, v, eps)` to the host node's running sums for one alive
/// particle (spec §4.9, first bullet).
pub fn accumulate_particle(mesh: &mut Mesh, materials: &MaterialTable, particle: &Particle, species: Species) {
    if !particle.is_alive() {
        return;
    }
    let Some(valley_idx) = particle.valley.index() else { return };
    let (i, j) = mesh.node_indices_at(particle.x, particle.y);
    let material_id = mesh.node(i, j).material;
    let Some(material) = materials.get(material_id) else { return };
    let valley = &material.valleys[valley_idx.min(material.valleys.len() - 1)];

    let hm = HBAR / valley.effective_mass;
    let vx = particle.kx * hm;
    let vy = particle.ky * hm;
    let eps = crate::particle::kinetic_energy(particle.k_squared(), valley.effective_mass, valley.alpha);

    let node = mesh.node_mut(i, j);
    let info = match species {
        Species::Electron => &mut node.electrons,
        Species::Hole => &mut node.holes,
    };
    info.add_sample(vx, vy, eps);
}

/// Accumulates every alive particle in a pool for one species (spec §4.9
/// "For each alive particle, add ...").
pub fn accumulate_pool<'a>(
    mesh: &mut Mesh,
    materials: &MaterialTable,
    particles: impl Iterator<Item = &'a Particle>,
    species: Species,
) {
    for particle in particles {
        accumulate_particle(mesh, materials, particle, species);
    }
}

/// Report of any node whose carrier state had to be rolled back this
/// window (spec §7 kind 5).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathologyReport {
    pub nodes_restored: u64,
}

/// Finalizes one `MEDIA`-step reporting window: averages the running
/// sums, converts particle counts to physical density, checkpoints (or
/// restores) each node, and resets the sums for the next window (spec
/// §4.9 "Every MEDIA steps, finalize averages ...").
pub fn finalize_window(mesh: &mut Mesh, media_steps: u32, epp: f64) -> PathologyReport {
    let cell_area = mesh.dx * mesh.dy;
    let mut report = PathologyReport::default();

    mesh.for_each_node_mut(|_i, _j, node| {
        for info in [&mut node.electrons, &mut node.holes] {
            if info.count > 0 {
                let n = media_steps.max(1) as f64;
                info.sum_vx /= n;
                info.sum_vy /= n;
                info.sum_energy /= n;
                info.density = (info.count as f64) * epp / (cell_area * n);
            } else {
                info.density = 0.0;
            }
        }

        if node.restore_if_invalid() {
            report.nodes_restored += 1;
        } else {
            node.checkpoint();
        }

        node.electrons.count = 0;
        node.holes.count = 0;
        node.electrons.sum_vx = 0.0;
        node.electrons.sum_vy = 0.0;
        node.electrons.sum_energy = 0.0;
        node.holes.sum_vx = 0.0;
        node.holes.sum_vy = 0.0;
        node.holes.sum_energy = 0.0;
    });

    report
}

/// Asserts that contact nodes carry their prescribed density (spec I5),
/// called by the EMC driver after injection restores contact densities.
pub fn assign_contact_density(mesh: &mut Mesh, i: usize, j: usize, species: Species, density: f64) {
    let node = mesh.node_mut(i, j);
    match species {
        Species::Electron => node.electrons.density = density,
        Species::Hole => node.holes.density = density,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::ValleyState;
    use emc_materials::{AlloyBlend, Elemental, MaterialId};

    #[test]
    fn window_finalize_converts_count_to_density() {
        let materials = MaterialTable::build(&[Elemental::Silicon], &[] as &[AlloyBlend]).unwrap();
        let mut mesh = Mesh::new(4, 1, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        let particle = Particle { id: 0, x: 1e-8, y: 0.5e-8, kx: 1e8, ky: 0.0, kz: 0.0, valley: ValleyState::Alive(0), t_next: 0.0 };
        accumulate_particle(&mut mesh, &materials, &particle, Species::Electron);
        let report = finalize_window(&mut mesh, 1, 1e18);
        assert_eq!(report.nodes_restored, 0);
        let (i, j) = mesh.node_indices_at(1e-8, 0.5e-8);
        assert!(mesh.node(i, j).electrons.density > 0.0);
    }
}
