//! The initial mesh supplied by the mesher collaborator (spec §6: "nx,
//! ny, dx, dy, and per-node material ID plus doping").

use serde::{Deserialize, Serialize};

use emc_core::mesh::Mesh;
use emc_materials::MaterialId;

/// Overrides the default material/doping at one node; anything not
/// listed keeps `MeshSource::default_material` and zero (intrinsic)
/// doping, per spec §3 "Node" ("donor and acceptor concentrations
/// default to intrinsic").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeOverride {
    pub i: usize,
    pub j: usize,
    pub material: Option<MaterialId>,
    pub donor: f64,
    pub acceptor: f64,
}

/// Mesher collaborator output (spec §6 "Initial mesh"): grid dimensions
/// plus a sparse list of per-node material/doping overrides over an
/// otherwise-uniform default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSource {
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
    pub default_material: MaterialId,
    pub overrides: Vec<NodeOverride>,
}

impl MeshSource {
    /// A uniform mesh with no per-node overrides, the common case for the
    /// bulk/transient test scenarios (spec §8 scenario 2).
    pub fn uniform(nx: usize, ny: usize, dx: f64, dy: f64, default_material: MaterialId) -> Self {
        Self { nx, ny, dx, dy, default_material, overrides: Vec::new() }
    }

    /// Materializes a [`Mesh`], applying overrides in listed order (later
    /// entries for the same `(i, j)` win).
    pub fn build(&self) -> Mesh {
        let mut mesh = Mesh::new(self.nx, self.ny, self.dx, self.dy, self.default_material);
        for ov in &self.overrides {
            let node = mesh.node_mut(ov.i, ov.j);
            if let Some(material) = ov.material {
                node.material = material;
            }
            node.donor_conc = ov.donor;
            node.acceptor_conc = ov.acceptor;
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emc_materials::Elemental;

    #[test]
    fn overrides_apply_doping_and_material() {
        let mut source = MeshSource::uniform(4, 1, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        source.overrides.push(NodeOverride { i: 2, j: 0, material: None, donor: 1e23, acceptor: 0.0 });
        let mesh = source.build();
        assert_eq!(mesh.node(2, 0).donor_conc, 1e23);
        assert_eq!(mesh.node(0, 0).donor_conc, 0.0);
    }
}
