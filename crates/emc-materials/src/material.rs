//! Material records: immutable per-(material, valley) constants plus
//! mole-fraction compound blending.
//!
//! Mirrors the teacher's `sim-devices::bsim::params` module: plain data
//! structs with documented physical units, built once and handed to the
//! rate-table and drift code as read-only references.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::{EPS0, Q};
use crate::TableError;

/// One elemental (non-alloyed) semiconductor carried by the built-in table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Elemental {
    Silicon,
    Germanium,
    GaAs,
    AlAs,
    InP,
    InAs,
}

/// Identifies a fully materialized [`Material`] record.
///
/// `Alloy` indexes into the [`AlloyBlend`] list supplied at
/// [`MaterialTable::build`] time; pure elements are looked up directly.
/// Keeping mole fraction out of the enum (rather than `Alloy(f64)`) is what
/// lets `MaterialId` be `Copy + Eq + Hash` and used as a plain array/map
/// key by the mesh and rate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaterialId {
    Pure(Elemental),
    Alloy(u8),
}

/// One optical-phonon mode: energy, Fr\u{f6}hlich/deformation-potential
/// coupling strength, and the number of equivalent final valleys (Z-factor).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpticalMode {
    /// Phonon energy \u{2127}ω \[J\]
    pub energy: f64,
    /// Coupling constant (mode-dependent units: \[J/m\] for non-polar
    /// deformation-potential coupling, dimensionless Fr\u{f6}hlich constant
    /// for polar modes)
    pub coupling: f64,
    /// Number of equivalent final valleys reachable through this mode
    pub z_factor: f64,
}

/// Intervalley coupling to one destination valley via one phonon branch
/// (the DTK/HWO/ZF triple of the original source).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalleyCoupling {
    pub to_valley: usize,
    /// Deformation potential \[J/m\]
    pub deformation_potential: f64,
    /// Phonon energy \[J\]
    pub phonon_energy: f64,
    /// Number of equivalent final valleys
    pub z_factor: f64,
}

/// Per-valley conduction-band constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valley {
    /// Effective mass \[kg\]
    pub effective_mass: f64,
    /// Non-parabolicity α \[1/J\]
    pub alpha: f64,
    /// Minimum energy offset of this valley above the conduction band edge \[J\]
    pub emin: f64,
    pub intervalley: Vec<IntervalleyCoupling>,
}

/// Fully materialized, immutable material record (§3 "Material").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub eps_static: f64,
    pub eps_high_freq: f64,
    /// Up to six optical-phonon modes.
    pub optical_modes: Vec<OpticalMode>,
    /// Acoustic deformation potential \[J\]
    pub acoustic_deformation_potential: f64,
    /// Crystal density \[kg/m^3\]
    pub density: f64,
    /// Longitudinal sound velocity \[m/s\]
    pub sound_velocity: f64,
    /// Band gap at 0K \[J\], Varshni-parameterized in temperature
    pub band_gap_0k: f64,
    /// Varshni α \[J/K\]
    pub varshni_alpha: f64,
    /// Varshni β \[K\]
    pub varshni_beta: f64,
    /// Lattice constant \[m\]
    pub lattice_constant: f64,
    /// Electron affinity χ \[J\]
    pub electron_affinity: f64,
    /// Conduction-band valleys, 1..=3 of them.
    pub valleys: Vec<Valley>,
    /// 10-coefficient polynomial fitting E(|k|) for the full-band model,
    /// evaluated in scaled units (see `emc_core::drift::full_band`).
    pub full_band_coeffs: [f64; 10],
}

impl Material {
    pub fn band_gap(&self, lattice_temperature: f64) -> f64 {
        let t = lattice_temperature;
        self.band_gap_0k - self.varshni_alpha * t * t / (t + self.varshni_beta)
    }

    pub fn num_valleys(&self) -> usize {
        self.valleys.len()
    }
}

fn silicon() -> Material {
    Material {
        eps_static: 11.7,
        eps_high_freq: 11.7,
        optical_modes: vec![OpticalMode {
            energy: 0.063 * Q,
            coupling: 1.0e11 * Q,
            z_factor: 1.0,
        }],
        acoustic_deformation_potential: 9.0 * Q,
        density: 2329.0,
        sound_velocity: 9040.0,
        band_gap_0k: 1.17 * Q,
        varshni_alpha: 4.73e-4 * Q,
        varshni_beta: 636.0,
        lattice_constant: 5.431e-10,
        electron_affinity: 4.05 * Q,
        valleys: vec![Valley {
            effective_mass: 0.32 * crate::constants::M0,
            alpha: 0.5 / Q,
            emin: 0.0,
            intervalley: vec![IntervalleyCoupling {
                to_valley: 0,
                deformation_potential: 5.0e10 * Q,
                phonon_energy: 0.063 * Q,
                z_factor: 4.0,
            }],
        }],
        full_band_coeffs: [0.0; 10],
    }
}

fn gaas() -> Material {
    Material {
        eps_static: 12.9,
        eps_high_freq: 10.92,
        optical_modes: vec![OpticalMode {
            energy: 0.03536 * Q,
            coupling: 1.0,
            z_factor: 1.0,
        }],
        acoustic_deformation_potential: 7.0 * Q,
        density: 5360.0,
        sound_velocity: 5240.0,
        band_gap_0k: 1.519 * Q,
        varshni_alpha: 5.405e-4 * Q,
        varshni_beta: 204.0,
        lattice_constant: 5.6533e-10,
        electron_affinity: 4.07 * Q,
        valleys: vec![
            Valley {
                effective_mass: 0.067 * crate::constants::M0,
                alpha: 0.610 / Q,
                emin: 0.0,
                intervalley: vec![
                    IntervalleyCoupling {
                        to_valley: 1,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0299 * Q,
                        z_factor: 4.0,
                    },
                    IntervalleyCoupling {
                        to_valley: 2,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0293 * Q,
                        z_factor: 3.0,
                    },
                ],
            },
            Valley {
                effective_mass: 0.222 * crate::constants::M0,
                alpha: 0.461 / Q,
                emin: 0.29 * Q,
                intervalley: vec![
                    IntervalleyCoupling {
                        to_valley: 0,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0299 * Q,
                        z_factor: 1.0,
                    },
                    IntervalleyCoupling {
                        to_valley: 2,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0293 * Q,
                        z_factor: 3.0,
                    },
                ],
            },
            Valley {
                effective_mass: 0.58 * crate::constants::M0,
                alpha: 0.204 / Q,
                emin: 0.48 * Q,
                intervalley: vec![
                    IntervalleyCoupling {
                        to_valley: 0,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0293 * Q,
                        z_factor: 1.0,
                    },
                    IntervalleyCoupling {
                        to_valley: 1,
                        deformation_potential: 1.0e11 * Q,
                        phonon_energy: 0.0293 * Q,
                        z_factor: 3.0,
                    },
                ],
            },
        ],
        full_band_coeffs: [
            0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0,
        ],
    }
}

fn alas() -> Material {
    let mut m = gaas();
    m.eps_static = 10.06;
    m.eps_high_freq = 8.16;
    m.band_gap_0k = 2.168 * Q;
    m.density = 3760.0;
    m.lattice_constant = 5.6611e-10;
    m.electron_affinity = 2.62 * Q;
    m.valleys[0].effective_mass = 0.124 * crate::constants::M0;
    m.valleys[0].alpha = 0.30 / Q;
    m
}

fn inp() -> Material {
    let mut m = gaas();
    m.eps_static = 12.5;
    m.eps_high_freq = 9.61;
    m.band_gap_0k = 1.423 * Q;
    m.density = 4810.0;
    m.lattice_constant = 5.8697e-10;
    m.electron_affinity = 4.38 * Q;
    m.valleys[0].effective_mass = 0.08 * crate::constants::M0;
    m.valleys[0].alpha = 0.83 / Q;
    m
}

fn inas() -> Material {
    let mut m = gaas();
    m.eps_static = 15.15;
    m.eps_high_freq = 12.3;
    m.band_gap_0k = 0.417 * Q;
    m.density = 5667.0;
    m.lattice_constant = 6.0583e-10;
    m.electron_affinity = 4.9 * Q;
    m.valleys[0].effective_mass = 0.023 * crate::constants::M0;
    m.valleys[0].alpha = 2.93 / Q;
    m
}

fn germanium() -> Material {
    let mut m = silicon();
    m.eps_static = 16.2;
    m.eps_high_freq = 16.2;
    m.band_gap_0k = 0.661 * Q;
    m.density = 5323.0;
    m.lattice_constant = 5.658e-10;
    m.electron_affinity = 4.0 * Q;
    m.valleys[0].effective_mass = 0.12 * crate::constants::M0;
    m
}

pub fn base_material(element: Elemental) -> Material {
    match element {
        Elemental::Silicon => silicon(),
        Elemental::Germanium => germanium(),
        Elemental::GaAs => gaas(),
        Elemental::AlAs => alas(),
        Elemental::InP => inp(),
        Elemental::InAs => inas(),
    }
}

fn lerp(a: f64, b: f64, x: f64) -> f64 {
    a * (1.0 - x) + b * x
}

/// A compound material derived from two elemental endpoints by linear
/// interpolation on mole fraction `x` of component `b` (Vegard's law for
/// the structural constants, linear blending for everything else per
/// §3's "Material" data model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlloyBlend {
    pub id: MaterialId,
    pub a: Elemental,
    pub b: Elemental,
    /// Mole fraction of component `b`, in `[0, 1]`.
    pub mole_fraction: f64,
}

/// Blend two materials with identical valley/optical-mode topology.
///
/// Returns [`TableError::MismatchedTopology`] if the two endpoints disagree
/// on valley count or optical-mode count, since componentwise blending of
/// differently-shaped valley/mode lists has no well-defined meaning.
pub fn blend(a: &Material, b: &Material, x: f64) -> Result<Material, TableError> {
    if a.valleys.len() != b.valleys.len() {
        return Err(TableError::MismatchedTopology {
            field: "valleys",
            a: a.valleys.len(),
            b: b.valleys.len(),
        });
    }
    if a.optical_modes.len() != b.optical_modes.len() {
        return Err(TableError::MismatchedTopology {
            field: "optical_modes",
            a: a.optical_modes.len(),
            b: b.optical_modes.len(),
        });
    }

    let valleys = a
        .valleys
        .iter()
        .zip(b.valleys.iter())
        .map(|(va, vb)| Valley {
            effective_mass: lerp(va.effective_mass, vb.effective_mass, x),
            alpha: lerp(va.alpha, vb.alpha, x),
            emin: lerp(va.emin, vb.emin, x),
            intervalley: va
                .intervalley
                .iter()
                .zip(vb.intervalley.iter())
                .map(|(ia, ib)| IntervalleyCoupling {
                    to_valley: ia.to_valley,
                    deformation_potential: lerp(
                        ia.deformation_potential,
                        ib.deformation_potential,
                        x,
                    ),
                    phonon_energy: lerp(ia.phonon_energy, ib.phonon_energy, x),
                    z_factor: lerp(ia.z_factor, ib.z_factor, x),
                })
                .collect(),
        })
        .collect();

    let optical_modes = a
        .optical_modes
        .iter()
        .zip(b.optical_modes.iter())
        .map(|(ma, mb)| OpticalMode {
            energy: lerp(ma.energy, mb.energy, x),
            coupling: lerp(ma.coupling, mb.coupling, x),
            z_factor: lerp(ma.z_factor, mb.z_factor, x),
        })
        .collect();

    let mut full_band_coeffs = [0.0; 10];
    for i in 0..10 {
        full_band_coeffs[i] = lerp(a.full_band_coeffs[i], b.full_band_coeffs[i], x);
    }

    Ok(Material {
        eps_static: lerp(a.eps_static, b.eps_static, x),
        eps_high_freq: lerp(a.eps_high_freq, b.eps_high_freq, x),
        optical_modes,
        acoustic_deformation_potential: lerp(
            a.acoustic_deformation_potential,
            b.acoustic_deformation_potential,
            x,
        ),
        density: lerp(a.density, b.density, x),
        sound_velocity: lerp(a.sound_velocity, b.sound_velocity, x),
        band_gap_0k: lerp(a.band_gap_0k, b.band_gap_0k, x),
        varshni_alpha: lerp(a.varshni_alpha, b.varshni_alpha, x),
        varshni_beta: lerp(a.varshni_beta, b.varshni_beta, x),
        lattice_constant: lerp(a.lattice_constant, b.lattice_constant, x),
        electron_affinity: lerp(a.electron_affinity, b.electron_affinity, x),
        valleys,
        full_band_coeffs,
    })
}

/// All materialized records for a run, keyed by [`MaterialId`].
///
/// Built once at startup (§4.1 design rationale: "no run-time branching
/// on compound-vs-pure"); read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct MaterialTable {
    materials: HashMap<MaterialId, Material>,
}

impl MaterialTable {
    /// Materializes every pure element used directly (passed in `pure`) plus
    /// every alloy described by `alloys`.
    pub fn build(pure: &[Elemental], alloys: &[AlloyBlend]) -> Result<Self, TableError> {
        let mut materials = HashMap::new();
        for &element in pure {
            materials
                .entry(MaterialId::Pure(element))
                .or_insert_with(|| base_material(element));
        }
        for blend_spec in alloys {
            if !matches!(blend_spec.id, MaterialId::Alloy(_)) {
                return Err(TableError::InvalidAlloyId);
            }
            if !(0.0..=1.0).contains(&blend_spec.mole_fraction) {
                return Err(TableError::InvalidMoleFraction(blend_spec.mole_fraction));
            }
            let a = base_material(blend_spec.a);
            let b = base_material(blend_spec.b);
            let material = blend(&a, &b, blend_spec.mole_fraction)?;
            materials.insert(blend_spec.id, material);
        }
        Ok(Self { materials })
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(&id)
    }

    pub fn debye_length_squared(&self, id: MaterialId, n_impurity: f64, lattice_temperature: f64) -> Option<f64> {
        let material = self.get(id)?;
        Some(Q * n_impurity / (material.eps_static * EPS0 * crate::constants::KB * lattice_temperature))
    }
}
