//! The snapshot and emitted-particle-log output collaborators (spec §6):
//! format-agnostic per spec.md, implemented here as a generic JSON Lines
//! writer since output-file formatting (Gnuplot/mesh dumps) is explicitly
//! out of scope (spec.md §1 "Explicitly OUT of scope").

use std::io::{self, Write};

use emc_core::drift::EmittedParticle;
use emc_core::engine::Snapshot;

/// Receives one mesh snapshot per reporting cadence (spec §6 "Snapshot
/// stream"). Implementations outside this crate may re-render a
/// [`Snapshot`] into Gnuplot/mesh-dump formats; this crate only provides
/// the JSON Lines default used by tests and `emc-cli`.
pub trait SnapshotSink {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()>;
}

/// Receives vacuum-emission events as they occur (spec §6 "Emitted-
/// particle log").
pub trait EmissionLog {
    fn record(&mut self, emitted: &EmittedParticle) -> io::Result<()>;
}

/// Writes one JSON object per line, the generic serialization named in
/// SPEC_FULL.md's "Workspace layout" (`emc-io`) section.
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> SnapshotSink for JsonLinesSink<W> {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, snapshot)?;
        self.writer.write_all(b"\n")
    }
}

impl<W: Write> EmissionLog for JsonLinesSink<W> {
    fn record(&mut self, emitted: &EmittedParticle) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, emitted)?;
        self.writer.write_all(b"\n")
    }
}

/// Reporting cadence (spec §4.9 "Emit a snapshot to the output
/// collaborator at the configured cadence; also emit final snapshot at
/// `t = T_final`").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cadence {
    pub every_steps: usize,
}

impl Cadence {
    pub fn should_emit(&self, step: usize, is_final: bool) -> bool {
        is_final || (self.every_steps > 0 && step % self.every_steps == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cadence_always_fires_on_final_step() {
        let cadence = Cadence { every_steps: 1000 };
        assert!(!cadence.should_emit(1, false));
        assert!(cadence.should_emit(7, true));
    }

    #[test]
    fn json_lines_sink_writes_one_object_per_line() {
        let mut buf = Vec::new();
        {
            let mut sink = JsonLinesSink::new(&mut buf);
            sink.record(&EmittedParticle { id: 3, t_emit: 1e-12, residual_energy: 0.1 }).unwrap();
            sink.record(&EmittedParticle { id: 4, t_emit: 2e-12, residual_energy: 0.2 }).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
