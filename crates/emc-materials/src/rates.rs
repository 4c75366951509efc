//! Scattering-rate tables (spec §3 "Rate Tables", §4.1).
//!
//! Builds, for one (material, valley) pair, a cumulative-rate row indexed
//! by discrete energy bin `i = floor(eps / d_eps)`. Each row ends in the
//! self-scatter ceiling Gamma, so that sampling a mechanism at a given
//! energy is a single binary search (`select_mechanism`) rather than a
//! renormalized per-energy distribution.

use serde::{Deserialize, Serialize};

use crate::constants::{HBAR, KB, PI, Q};
use crate::material::{Material, Valley};
use crate::TableError;

/// One tabulated scattering mechanism slot. The row layout is:
/// `[Acoustic, Optical(0) absorption, Optical(0) emission, ..., Impurity,
/// Intervalley(0), ..., SelfScatter]`, matching the up-to-14 slots of
/// spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mechanism {
    Acoustic,
    OpticalAbsorption(usize),
    OpticalEmission(usize),
    Impurity,
    Intervalley(usize),
    SelfScatter,
}

/// Per-run toggles for which mechanisms are built into the table (§6
/// "scattering-enable flags").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateTableConfig {
    pub acoustic_enabled: bool,
    pub optical_enabled: bool,
    pub impurity_enabled: bool,
    pub intervalley_enabled: bool,
    /// Energy bin width `d_eps` \[J\]
    pub d_eps: f64,
    /// Number of energy bins (`DIME` in the original source)
    pub dime: usize,
    pub lattice_temperature: f64,
    /// Ionized impurity concentration used for the Brooks-Herring rate \[m^-3\]
    pub n_impurity: f64,
}

/// One row per mechanism slot, one column per energy bin, plus the
/// per-valley Gamma ceiling (spec §3 invariant: last entry of a row is
/// Gamma for all valleys).
#[derive(Debug, Clone)]
pub struct RateTable {
    pub dime: usize,
    pub d_eps: f64,
    /// `slots[valley][mechanism_index][bin] -> cumulative rate`
    slots: Vec<Vec<Vec<f64>>>,
    mechanisms: Vec<Vec<Mechanism>>,
    gamma: Vec<f64>,
}

fn dos_nonparabolic(eps: f64, alpha: f64) -> f64 {
    // Shared non-parabolicity shape used by the acoustic rate in spec §4.1
    // and reused here for the optical/intervalley final-state density, per
    // SPEC_FULL.md's "§4.1 Material & Rate Tables — expanded" supplement.
    if eps <= 0.0 {
        return 0.0;
    }
    (eps * (1.0 + alpha * eps)).sqrt() * (1.0 + 2.0 * alpha * eps)
}

fn acoustic_rate(material: &Material, valley: &Valley, eps: f64, cfg: &RateTableConfig) -> f64 {
    if !cfg.acoustic_enabled || eps <= 0.0 {
        return 0.0;
    }
    let da = material.acoustic_deformation_potential;
    let a_ac = (2.0 * PI * da * da * KB * cfg.lattice_temperature)
        / (HBAR * material.sound_velocity)
        * (2.0 * valley.effective_mass * Q).powf(1.5)
        / (4.0 * PI * PI * HBAR.powi(3));
    a_ac * dos_nonparabolic(eps, valley.alpha)
}

fn optical_rate(valley: &Valley, mode_energy: f64, coupling: f64, z_factor: f64, eps_final: f64) -> f64 {
    if eps_final <= 0.0 {
        return 0.0;
    }
    // Density-of-final-states form shared with the acoustic rate; the
    // mode coupling and phonon occupation enter as a prefactor.
    coupling * z_factor * mode_energy.recip().max(0.0).min(f64::MAX)
        * dos_nonparabolic(eps_final, valley.alpha)
}

fn bose_einstein(energy: f64, lattice_temperature: f64) -> f64 {
    let x = energy / (KB * lattice_temperature);
    1.0 / (x.exp() - 1.0)
}

fn impurity_rate(material: &Material, valley: &Valley, eps: f64, cfg: &RateTableConfig) -> f64 {
    if !cfg.impurity_enabled || eps <= 0.0 || cfg.n_impurity <= 0.0 {
        return 0.0;
    }
    let q_d2 = Q * cfg.n_impurity / (material.eps_static * crate::constants::EPS0 * KB * cfg.lattice_temperature);
    let gk = 2.0 * valley.effective_mass * eps * (1.0 + valley.alpha * eps) / (HBAR * HBAR);
    let k = gk.max(0.0).sqrt();
    if k <= 0.0 {
        return 0.0;
    }
    // Brooks-Herring: rate ~ N_I / k^3 * [ln(1+b) - b/(1+b)], b = 4k^2/q_D^2
    let b = 4.0 * k * k / q_d2;
    let bracket = (1.0 + b).ln() - b / (1.0 + b);
    let prefactor = (Q.powi(4) * cfg.n_impurity)
        / (8.0 * PI * (material.eps_static * crate::constants::EPS0).powi(2) * HBAR)
        * dos_nonparabolic(eps, valley.alpha) / k.powi(3).max(1e-300);
    (prefactor * bracket).max(0.0)
}

impl RateTable {
    /// Builds `SWK[valley][mech][i]` for `i in 0..=dime` per spec §4.1,
    /// returning a fatal [`TableError`] on a negative rate (§7 kind 2).
    pub fn build(cfg: &RateTableConfig, material: &Material) -> Result<Self, TableError> {
        if cfg.d_eps <= 0.0 {
            return Err(TableError::NonPositiveEnergyStep);
        }
        let n_valleys = material.num_valleys();
        let mut slots = Vec::with_capacity(n_valleys);
        let mut mechanisms = Vec::with_capacity(n_valleys);
        let mut gamma = Vec::with_capacity(n_valleys);

        for v in 0..n_valleys {
            let valley = &material.valleys[v];
            let mut row_mechanisms = vec![Mechanism::Acoustic];
            for m in 0..material.optical_modes.len() {
                row_mechanisms.push(Mechanism::OpticalAbsorption(m));
                row_mechanisms.push(Mechanism::OpticalEmission(m));
            }
            row_mechanisms.push(Mechanism::Impurity);
            for (iv, _) in valley.intervalley.iter().enumerate() {
                row_mechanisms.push(Mechanism::Intervalley(iv));
            }
            row_mechanisms.push(Mechanism::SelfScatter);

            let mut rows = vec![vec![0.0f64; cfg.dime + 1]; row_mechanisms.len()];
            let mut v_gamma = 0.0f64;

            for i in 0..=cfg.dime {
                let eps = (i as f64) * cfg.d_eps;
                let mut cumulative = 0.0f64;
                let mut slot = 0usize;

                cumulative += acoustic_rate(material, valley, eps, cfg);
                if cumulative < 0.0 {
                    return Err(TableError::NegativeRate { valley: v, mechanism: slot, bin: i, rate: cumulative });
                }
                rows[slot][i] = cumulative;
                slot += 1;

                if cfg.optical_enabled {
                    for mode in &material.optical_modes {
                        let n_occ = bose_einstein(mode.energy, cfg.lattice_temperature).max(0.0);
                        let eps_abs = eps + mode.energy;
                        let r_abs = optical_rate(valley, mode.energy, mode.coupling, mode.z_factor, eps_abs) * n_occ;
                        cumulative += r_abs.max(0.0);
                        rows[slot][i] = cumulative;
                        slot += 1;

                        let eps_em = eps - mode.energy;
                        let r_em = if eps_em > 0.0 {
                            optical_rate(valley, mode.energy, mode.coupling, mode.z_factor, eps_em) * (n_occ + 1.0)
                        } else {
                            0.0
                        };
                        cumulative += r_em.max(0.0);
                        rows[slot][i] = cumulative;
                        slot += 1;
                    }
                } else {
                    for _ in &material.optical_modes {
                        rows[slot][i] = cumulative;
                        slot += 1;
                        rows[slot][i] = cumulative;
                        slot += 1;
                    }
                }

                let r_imp = impurity_rate(material, valley, eps, cfg);
                if r_imp < 0.0 {
                    return Err(TableError::NegativeRate { valley: v, mechanism: slot, bin: i, rate: r_imp });
                }
                cumulative += r_imp;
                rows[slot][i] = cumulative;
                slot += 1;

                if cfg.intervalley_enabled {
                    for coupling in &valley.intervalley {
                        let n_occ = bose_einstein(coupling.phonon_energy, cfg.lattice_temperature).max(0.0);
                        let final_valley = &material.valleys[coupling.to_valley];
                        let dem = coupling.deformation_potential;
                        let prefactor = (PI * dem * dem * coupling.z_factor)
                            / (material.density * coupling.phonon_energy)
                            * (2.0 * final_valley.effective_mass * Q).powf(1.5)
                            / (4.0 * PI * PI * HBAR.powi(3));
                        let eps_abs = eps + coupling.phonon_energy - final_valley.emin + valley.emin;
                        let r_abs = prefactor * dos_nonparabolic(eps_abs.max(0.0), final_valley.alpha) * n_occ;
                        let eps_em = eps - coupling.phonon_energy - final_valley.emin + valley.emin;
                        let r_em = if eps_em > 0.0 {
                            prefactor * dos_nonparabolic(eps_em, final_valley.alpha) * (n_occ + 1.0)
                        } else {
                            0.0
                        };
                        cumulative += (r_abs + r_em).max(0.0);
                        rows[slot][i] = cumulative;
                        slot += 1;
                    }
                } else {
                    for _ in &valley.intervalley {
                        rows[slot][i] = cumulative;
                        slot += 1;
                    }
                }

                v_gamma = v_gamma.max(cumulative);
                let _ = slot;
            }

            // Gamma must dominate the summed physical rate everywhere
            // (spec invariant I4); pad by 10% as the original source's
            // self-scatter margin.
            v_gamma *= 1.1;
            let self_slot = rows.len() - 1;
            for i in 0..=cfg.dime {
                rows[self_slot][i] = v_gamma;
            }

            for i in 0..=cfg.dime {
                let mut prev = 0.0;
                for (m, row) in rows.iter().enumerate() {
                    if row[i] + 1e-9 < prev {
                        return Err(TableError::NonMonotoneRow { valley: v, bin: i });
                    }
                    prev = row[i];
                    let _ = m;
                }
            }

            slots.push(rows);
            mechanisms.push(row_mechanisms);
            gamma.push(v_gamma);
        }

        Ok(Self { dime: cfg.dime, d_eps: cfg.d_eps, slots, mechanisms, gamma })
    }

    pub fn gamma(&self, valley: usize) -> f64 {
        self.gamma[valley]
    }

    pub fn mechanism_count(&self, valley: usize) -> usize {
        self.mechanisms[valley].len()
    }

    /// Binary search in the row for `u * Gamma` (spec §4.1
    /// `select_mechanism`). Returns `None` for the self-scatter slot.
    pub fn select_mechanism(&self, valley: usize, eps: f64, u: f64) -> Option<Mechanism> {
        let bin = ((eps / self.d_eps) as usize).min(self.dime);
        let target = u * self.gamma[valley];
        let rows = &self.slots[valley];
        let idx = rows.partition_point(|row| row[bin] < target);
        self.mechanisms[valley].get(idx).copied().filter(|m| !matches!(m, Mechanism::SelfScatter))
    }

    /// Validates the §3 Rate Tables invariant: every row is monotone
    /// non-decreasing and its last mechanism slot equals Gamma, exposed so
    /// `emc-core::Engine::new` can surface a fatal error at startup rather
    /// than trust the builder silently (SPEC_FULL.md §4.1 expansion).
    pub fn validate(&self) -> Result<(), TableError> {
        for (v, rows) in self.slots.iter().enumerate() {
            let self_slot = rows.len() - 1;
            for i in 0..=self.dime {
                let mut prev = 0.0;
                for row in rows.iter() {
                    if row[i] + 1e-9 < prev {
                        return Err(TableError::NonMonotoneRow { valley: v, bin: i });
                    }
                    prev = row[i];
                }
                if (rows[self_slot][i] - self.gamma[v]).abs() > 1e-6 * self.gamma[v].max(1.0) {
                    return Err(TableError::GammaTooSmall {
                        valley: v,
                        bin: i,
                        gamma: self.gamma[v],
                        physical: rows[self_slot][i],
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::base_material;
    use crate::material::Elemental;

    fn test_config() -> RateTableConfig {
        RateTableConfig {
            acoustic_enabled: true,
            optical_enabled: true,
            impurity_enabled: true,
            intervalley_enabled: true,
            d_eps: 1.0e-3 * Q,
            dime: 200,
            lattice_temperature: 300.0,
            n_impurity: 1.0e23,
        }
    }

    #[test]
    fn rows_are_monotone_and_terminate_at_gamma() {
        let material = base_material(Elemental::GaAs);
        let cfg = test_config();
        let table = RateTable::build(&cfg, &material).unwrap();
        table.validate().unwrap();
    }

    #[test]
    fn all_mechanisms_disabled_leaves_only_self_scatter() {
        let material = base_material(Elemental::Silicon);
        let mut cfg = test_config();
        cfg.acoustic_enabled = false;
        cfg.optical_enabled = false;
        cfg.impurity_enabled = false;
        cfg.intervalley_enabled = false;
        let table = RateTable::build(&cfg, &material).unwrap();
        assert!(table.gamma(0) > 0.0);
        for i in 0..=cfg.dime {
            let eps = i as f64 * cfg.d_eps;
            assert_eq!(table.select_mechanism(0, eps, 0.0), None);
            assert_eq!(table.select_mechanism(0, eps, 0.999), None);
        }
    }

    #[test]
    fn non_positive_energy_step_is_rejected() {
        let material = base_material(Elemental::Silicon);
        let mut cfg = test_config();
        cfg.d_eps = 0.0;
        assert!(matches!(
            RateTable::build(&cfg, &material),
            Err(TableError::NonPositiveEnergyStep)
        ));
    }
}
