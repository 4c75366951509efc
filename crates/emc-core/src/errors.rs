//! Error and warning types for the transport/field coupling kernel
//! (spec §7).
//!
//! Kinds 1-2 (configuration, table-build) are fatal and abort
//! [`crate::engine::Engine::new`]; kinds 3-5 (solver non-convergence,
//! capacity exhaustion, numerical pathology) are non-fatal and are folded
//! into running counters on [`crate::engine::Engine`] / the snapshot
//! instead of propagating as `Err` (§7 "Recovery policy").

use emc_materials::TableError;

/// Fatal error raised while constructing an [`crate::engine::Engine`]
/// (spec §7 kinds 1-2).
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("mesh node ({i}, {j}) references unknown material id")]
    UnknownMaterial { i: usize, j: usize },
    #[error("boundary model edge length does not match mesh dimension on {0:?}")]
    InconsistentBoundary(crate::mesh::Direction),
    #[error("transport model requests holes but no hole pool was configured")]
    HolesNotConfigured,
    #[error("rate table build/validate failed: {0}")]
    Table(#[from] TableError),
    #[error("NPMAX must be positive")]
    InvalidCapacity,
    #[error("MEDIA window must be positive")]
    InvalidMediaWindow,
    #[error("timestep must be positive")]
    InvalidTimestep,
}
