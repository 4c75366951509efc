//! The validated configuration object (spec §6 "External Interfaces"):
//! everything the input-deck parser collaborator is responsible for
//! producing, deserialized here from JSON rather than parsed from a
//! netlist-style grammar (SPEC_FULL.md's "Workspace layout" note: this
//! crate is explicitly not input-deck parsing).

use serde::{Deserialize, Serialize};

use emc_core::boundary::{BoundaryModel, EdgeSegment};
use emc_core::drift::BandModel;
use emc_core::engine::{EngineConfig, TransportModel};
use emc_core::mesh::{Direction, DielectricOverlay};
use emc_materials::rates::RateTableConfig;
use emc_materials::{AlloyBlend, Elemental, MaterialId, MaterialTable};

use crate::errors::ConfigError;
use crate::mesh_source::MeshSource;

/// Per-edge boundary spec for one side of the mesh: one [`EdgeSegment`]
/// per cell along that edge (spec §6 "per-edge segment boundary spec").
pub type EdgeSpec = Vec<EdgeSegment>;

/// One alloy entry (spec §6 "per-material x-mole fractions"): blends two
/// elemental endpoints at the given mole fraction of `b` into a
/// [`MaterialId::Alloy`] slot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlloySpec {
    pub id: u8,
    pub a: Elemental,
    pub b: Elemental,
    pub mole_fraction: f64,
}

/// Top-level validated configuration object (spec §6): the complete input
/// the parser/CLI-flag collaborators hand to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub t_final: f64,
    pub dt: f64,
    pub itmax: usize,
    pub lattice_temperature: f64,
    pub seed: u64,
    pub transport_model: TransportModel,
    pub band_model: BandModel,
    pub quantum_flag: bool,
    pub faraday_flag: bool,
    pub media: u32,
    pub npmax: usize,
    pub epp: f64,
    pub poisson_omega: f64,
    pub poisson_tolerance: f64,
    pub poisson_itmax: usize,
    pub rate_table: RateTableConfig,

    pub pure_materials: Vec<Elemental>,
    pub alloys: Vec<AlloySpec>,

    /// At most 2, per spec §6 "dielectric overlays ... (at most 2)".
    pub dielectric_overlays: Vec<DielectricOverlay>,

    pub boundary_left: EdgeSpec,
    pub boundary_right: EdgeSpec,
    pub boundary_bottom: EdgeSpec,
    pub boundary_top: EdgeSpec,
}

/// The engine inputs assembled from a [`Config`] plus a [`MeshSource`]
/// (spec §6: "supplied by the parser" / "supplied by the mesher
/// collaborator").
pub struct EngineInputs {
    pub engine_config: EngineConfig,
    pub materials: MaterialTable,
    pub mesh: emc_core::mesh::Mesh,
    pub boundary: BoundaryModel,
}

impl Config {
    /// Validates and assembles this configuration plus a mesh source into
    /// the inputs `Engine::new` expects, surfacing §7 kind-1 configuration
    /// errors (unknown material ids, mismatched boundary segment counts)
    /// before engine construction is attempted.
    pub fn assemble(&self, mesh_source: &MeshSource) -> Result<EngineInputs, ConfigError> {
        for ov in &mesh_source.overrides {
            if ov.i > mesh_source.nx || ov.j > mesh_source.ny {
                return Err(ConfigError::NodeOutOfRange { i: ov.i, j: ov.j, nx: mesh_source.nx, ny: mesh_source.ny });
            }
        }

        let alloys: Vec<AlloyBlend> = self
            .alloys
            .iter()
            .map(|spec| AlloyBlend { id: MaterialId::Alloy(spec.id), a: spec.a, b: spec.b, mole_fraction: spec.mole_fraction })
            .collect();
        let materials = MaterialTable::build(&self.pure_materials, &alloys)?;

        let mut mesh = mesh_source.build();
        mesh.dielectric_overlays = self.dielectric_overlays.clone();

        check_edge_len(Direction::Left, &self.boundary_left, mesh_source.ny + 1)?;
        check_edge_len(Direction::Right, &self.boundary_right, mesh_source.ny + 1)?;
        check_edge_len(Direction::Bottom, &self.boundary_bottom, mesh_source.nx + 1)?;
        check_edge_len(Direction::Top, &self.boundary_top, mesh_source.nx + 1)?;
        let boundary = BoundaryModel::new(
            self.boundary_left.clone(),
            self.boundary_right.clone(),
            self.boundary_bottom.clone(),
            self.boundary_top.clone(),
        );

        let engine_config = EngineConfig {
            dt: self.dt,
            t_final: self.t_final,
            itmax: self.itmax,
            lattice_temperature: self.lattice_temperature,
            seed: self.seed,
            transport_model: self.transport_model,
            band_model: self.band_model,
            quantum_flag: self.quantum_flag,
            faraday_flag: self.faraday_flag,
            media: self.media,
            npmax: self.npmax,
            epp: self.epp,
            poisson_omega: self.poisson_omega,
            poisson_tolerance: self.poisson_tolerance,
            poisson_itmax: self.poisson_itmax,
            rate_table: self.rate_table.clone(),
        };

        Ok(EngineInputs { engine_config, materials, mesh, boundary })
    }
}

fn check_edge_len(dir: Direction, edge: &EdgeSpec, expected: usize) -> Result<(), ConfigError> {
    if edge.len() != expected {
        return Err(ConfigError::InconsistentBoundary { dir, got: edge.len(), expected });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use emc_core::boundary::BoundaryKind;

    fn minimal_config(nx: usize, ny: usize) -> Config {
        Config {
            t_final: 5e-12,
            dt: 1e-15,
            itmax: 5000,
            lattice_temperature: 300.0,
            seed: 1,
            transport_model: TransportModel::Mce,
            band_model: BandModel::Parabolic,
            quantum_flag: false,
            faraday_flag: false,
            media: 10,
            npmax: 5000,
            epp: 1e6,
            poisson_omega: 1.8,
            poisson_tolerance: 1e-6,
            poisson_itmax: 2000,
            rate_table: RateTableConfig {
                acoustic_enabled: true,
                optical_enabled: true,
                impurity_enabled: true,
                intervalley_enabled: true,
                d_eps: 1e-3 * emc_materials::constants::Q,
                dime: 200,
                lattice_temperature: 300.0,
                n_impurity: 1e23,
            },
            pure_materials: vec![Elemental::Silicon],
            alloys: vec![],
            dielectric_overlays: vec![],
            boundary_left: vec![EdgeSegment { kind: BoundaryKind::Ohmic, potential: 0.0, electron_density: 1e23, hole_density: 0.0 }; ny + 1],
            boundary_right: vec![EdgeSegment { kind: BoundaryKind::Ohmic, potential: 1.0, electron_density: 1e23, hole_density: 0.0 }; ny + 1],
            boundary_bottom: vec![EdgeSegment::insulator(); nx + 1],
            boundary_top: vec![EdgeSegment::insulator(); nx + 1],
        }
    }

    #[test]
    fn assembles_engine_inputs_from_a_flat_mesh() {
        let mesh_source = MeshSource::uniform(40, 2, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        let config = minimal_config(40, 2);
        let inputs = config.assemble(&mesh_source).unwrap();
        assert_eq!(inputs.mesh.nx, 40);
        assert!(inputs.materials.get(MaterialId::Pure(Elemental::Silicon)).is_some());
    }

    #[test]
    fn rejects_mismatched_boundary_length() {
        let mesh_source = MeshSource::uniform(10, 2, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        let mut config = minimal_config(10, 2);
        config.boundary_left.pop();
        assert!(matches!(config.assemble(&mesh_source), Err(ConfigError::InconsistentBoundary { .. })));
    }

    #[test]
    fn rejects_out_of_range_node_override() {
        let mut mesh_source = MeshSource::uniform(10, 2, 1e-8, 1e-8, MaterialId::Pure(Elemental::Silicon));
        mesh_source.overrides.push(crate::mesh_source::NodeOverride {
            i: 99,
            j: 0,
            material: None,
            donor: 0.0,
            acceptor: 0.0,
        });
        let config = minimal_config(10, 2);
        assert!(matches!(config.assemble(&mesh_source), Err(ConfigError::NodeOutOfRange { .. })));
    }
}
