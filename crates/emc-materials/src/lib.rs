//! Material records, compound blending, scattering-rate tables and the
//! MEP relaxation-time model (spec §3 "Material", §3 "Rate Tables", §4.1,
//! §4.10).
//!
//! Pure physics/data: no dependency on the mesh, particle pool or field
//! solvers in `emc-core`. Everything here is built once at startup and
//! read-only for the rest of a run (spec §5 "Shared resources").

pub mod constants;
pub mod material;
pub mod mep;
pub mod rates;

pub use material::{
    base_material, blend, AlloyBlend, Elemental, IntervalleyCoupling, Material, MaterialId,
    MaterialTable, OpticalMode, Valley,
};
pub use rates::{Mechanism, RateTable, RateTableConfig};

/// Fatal configuration and table-build errors (spec §7 kinds 1-2).
#[derive(Debug, Clone, thiserror::Error)]
pub enum TableError {
    #[error("alloy blend endpoints disagree on {field}: {a} vs {b}")]
    MismatchedTopology {
        field: &'static str,
        a: usize,
        b: usize,
    },
    #[error("alloy id must be MaterialId::Alloy(_)")]
    InvalidAlloyId,
    #[error("mole fraction {0} outside [0, 1]")]
    InvalidMoleFraction(f64),
    #[error("unknown material id")]
    UnknownMaterial,
    #[error("non-positive energy bin width")]
    NonPositiveEnergyStep,
    #[error("negative scattering rate for valley {valley} mechanism {mechanism} at bin {bin}: {rate}")]
    NegativeRate {
        valley: usize,
        mechanism: usize,
        bin: usize,
        rate: f64,
    },
    #[error("rate table row not monotone non-decreasing: valley {valley} bin {bin}")]
    NonMonotoneRow { valley: usize, bin: usize },
    #[error(
        "gamma ceiling {gamma} does not dominate summed physical rate {physical} for valley {valley} at bin {bin}"
    )]
    GammaTooSmall {
        valley: usize,
        bin: usize,
        gamma: f64,
        physical: f64,
    },
    #[error("valley index {0} out of range")]
    InvalidValley(usize),
}
