//! Thin harness binary (SPEC_FULL.md "Workspace layout" `emc-cli`): loads
//! a validated [`emc_io::Config`] and [`emc_io::MeshSource`] from JSON,
//! drives `Engine` to `T_final`/`ITMAX`, and writes the snapshot and
//! emitted-particle streams to stdout as JSON Lines.
//!
//! This is explicitly not input-deck parsing or CLI flag handling (spec
//! §1's scope boundary) — it is the same "load a struct from a file and
//! call the library" binary as the teacher's `sim-cli`, scoped down to
//! two positional JSON paths instead of a netlist grammar.

use std::fs;
use std::io;
use std::path::Path;

use emc_core::engine::Engine;
use emc_io::{Cadence, Config, EmissionLog, JsonLinesSink, MeshSource, SnapshotSink};

fn main() {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(mesh_path)) = (args.next(), args.next()) else {
        eprintln!("usage: emc-cli <config.json> <mesh.json>");
        std::process::exit(2);
    };

    match run(&config_path, &mesh_path) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("emc-cli: {err}");
            std::process::exit(1);
        }
    }
}

fn run(config_path: &str, mesh_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config: Config = read_json(config_path)?;
    let mesh_source: MeshSource = read_json(mesh_path)?;

    let inputs = config.assemble(&mesh_source)?;
    let mut engine = Engine::new(inputs.engine_config, inputs.materials, inputs.mesh, inputs.boundary)?;

    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(stdout.lock());
    let cadence = Cadence { every_steps: config.media as usize };

    let mut step = 0usize;
    let mut emitted_cursor = 0usize;
    let mut emitted_final_snapshot = false;
    while engine.t() < config.t_final && step < config.itmax {
        let report = engine.step();
        step += 1;

        for emitted in &engine.emitted_particles()[emitted_cursor..] {
            sink.record(emitted)?;
        }
        emitted_cursor = engine.emitted_particles().len();

        let is_final = engine.t() >= config.t_final || step >= config.itmax;
        if report.window_finalized && cadence.should_emit(step, is_final) {
            sink.emit(&engine.snapshot())?;
            emitted_final_snapshot = is_final;
        }
    }

    if emitted_cursor < engine.emitted_particles().len() {
        for emitted in &engine.emitted_particles()[emitted_cursor..] {
            sink.record(emitted)?;
        }
    }
    if !emitted_final_snapshot {
        sink.emit(&engine.snapshot())?;
    }

    tracing::info!(t = engine.t(), steps = step, "run complete");
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, Box<dyn std::error::Error>> {
    let path = Path::new(path);
    let content = fs::read_to_string(path).map_err(|err| format!("reading {}: {err}", path.display()))?;
    let value = serde_json::from_str(&content).map_err(|err| format!("parsing {}: {err}", path.display()))?;
    Ok(value)
}
