//! External interfaces (spec §6): the validated configuration object,
//! the mesher collaborator's initial mesh, and the snapshot/emission-log
//! output collaborators.
//!
//! Deliberately thin: input-deck parsing, CLI flag handling, and output
//! file formatting stay external per spec.md §1's explicit scope
//! boundary. What lives here is the typed bridge between JSON on disk and
//! the `emc-core`/`emc-materials` types, plus the generic JSON Lines
//! serialization SPEC_FULL.md calls out as the one file format this
//! crate owns.

pub mod config;
pub mod errors;
pub mod mesh_source;
pub mod snapshot;

pub use config::{AlloySpec, Config, EdgeSpec, EngineInputs};
pub use errors::ConfigError;
pub use mesh_source::{MeshSource, NodeOverride};
pub use snapshot::{Cadence, EmissionLog, JsonLinesSink, SnapshotSink};
