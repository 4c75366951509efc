//! Fatal configuration errors (spec §7 kind 1), raised while assembling
//! an [`crate::config::Config`] into the engine inputs it bootstraps.

use emc_core::mesh::Direction;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("mesh override references node ({i}, {j}) outside the nx={nx} ny={ny} grid")]
    NodeOutOfRange { i: usize, j: usize, nx: usize, ny: usize },
    #[error("boundary segment list for {dir:?} has length {got}, expected {expected}")]
    InconsistentBoundary { dir: Direction, got: usize, expected: usize },
    #[error("material table build failed: {0}")]
    Materials(#[from] emc_materials::TableError),
    #[error("engine construction failed: {0}")]
    Engine(#[from] emc_core::EngineError),
}
