//! Integration test: assembles a `Config` + `MeshSource` the way
//! `emc-cli` would after deserializing them from JSON, then drives a
//! few macro-timesteps end to end (spec §8 scenario 1's shape, at a
//! size small enough to run as a unit test rather than the full 0.4um
//! channel).

use emc_core::boundary::{BoundaryKind, EdgeSegment};
use emc_core::drift::BandModel;
use emc_core::engine::{Engine, TransportModel};
use emc_io::{Config, MeshSource};
use emc_materials::rates::RateTableConfig;
use emc_materials::{constants::Q, Elemental, MaterialId};

fn small_channel_config(nx: usize, ny: usize) -> Config {
    let ohmic = |potential: f64| EdgeSegment { kind: BoundaryKind::Ohmic, potential, electron_density: 1e23, hole_density: 0.0 };
    Config {
        t_final: 2e-13,
        dt: 1e-15,
        itmax: 300,
        lattice_temperature: 300.0,
        seed: 7,
        transport_model: TransportModel::Mce,
        band_model: BandModel::Parabolic,
        quantum_flag: false,
        faraday_flag: false,
        media: 10,
        npmax: 2000,
        epp: 1e6,
        poisson_omega: 1.8,
        poisson_tolerance: 1e-6,
        poisson_itmax: 2000,
        rate_table: RateTableConfig {
            acoustic_enabled: true,
            optical_enabled: true,
            impurity_enabled: true,
            intervalley_enabled: true,
            d_eps: 1e-3 * Q,
            dime: 200,
            lattice_temperature: 300.0,
            n_impurity: 1e23,
        },
        pure_materials: vec![Elemental::Silicon],
        alloys: vec![],
        dielectric_overlays: vec![],
        boundary_left: vec![ohmic(0.0); ny + 1],
        boundary_right: vec![ohmic(1.0); ny + 1],
        boundary_bottom: vec![EdgeSegment::insulator(); nx + 1],
        boundary_top: vec![EdgeSegment::insulator(); nx + 1],
    }
}

#[test]
fn config_round_trips_through_json_and_runs() {
    let nx = 20;
    let ny = 2;
    let config = small_channel_config(nx, ny);
    let json = serde_json::to_string(&config).unwrap();
    let config: Config = serde_json::from_str(&json).unwrap();

    let mesh_source = MeshSource::uniform(nx, ny, 0.01e-6, 0.01e-6, MaterialId::Pure(Elemental::Silicon));
    let mesh_json = serde_json::to_string(&mesh_source).unwrap();
    let mesh_source: MeshSource = serde_json::from_str(&mesh_json).unwrap();

    let inputs = config.assemble(&mesh_source).unwrap();
    let mut engine = Engine::new(inputs.engine_config, inputs.materials, inputs.mesh, inputs.boundary).unwrap();

    let mut last_report = None;
    for _ in 0..50 {
        last_report = Some(engine.step());
    }
    let report = last_report.unwrap();
    assert!(report.t > 0.0);

    let snapshot = engine.snapshot();
    assert!(snapshot.mesh.nx == nx);
    assert!(snapshot.t > 0.0);

    let snapshot_json = serde_json::to_string(&snapshot).unwrap();
    assert!(!snapshot_json.is_empty());
}
