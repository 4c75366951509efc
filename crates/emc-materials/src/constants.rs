//! Physical constants shared by the rate-table and relaxation-time models.
//!
//! Values match the CODATA set used throughout the III-V Monte Carlo
//! literature (and the original archimedes source), in SI units unless
//! noted.

/// Elementary charge \[C\]
pub const Q: f64 = 1.602_176_634e-19;
/// Reduced Planck constant \[J s\]
pub const HBAR: f64 = 1.054_571_817e-34;
/// Boltzmann constant \[J/K\]
pub const KB: f64 = 1.380_649e-23;
/// Vacuum permittivity \[F/m\]
pub const EPS0: f64 = 8.854_187_82e-12;
/// Free electron mass \[kg\]
pub const M0: f64 = 9.109_383_70e-31;
/// pi, kept local so formulas read the same as the reference source
pub const PI: f64 = std::f64::consts::PI;
