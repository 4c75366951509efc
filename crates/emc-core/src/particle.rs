//! Super-particle pool (spec §3 "Particle", §4.5).
//!
//! The dead marker (valley index 9 in the original source) is re-expressed
//! as an explicit [`ValleyState::Dead`] variant per spec §9's design note,
//! rather than carried as a magic valley index.

use emc_materials::constants::{HBAR, KB, Q};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Which valley an alive particle currently occupies, or the dead
/// tombstone (spec §3 "Particle" lifecycle, I2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValleyState {
    Alive(u8),
    Dead,
}

impl ValleyState {
    pub fn index(self) -> Option<usize> {
        match self {
            ValleyState::Alive(v) => Some(v as usize),
            ValleyState::Dead => None,
        }
    }
}

/// One super-particle: position, crystal momentum, valley, and the
/// shared-clock-relative free-flight deadline (spec §3 "Particle").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub kx: f64,
    pub ky: f64,
    pub kz: f64,
    pub valley: ValleyState,
    /// Absolute simulation time of the next scattering event.
    pub t_next: f64,
}

impl Particle {
    pub fn is_alive(&self) -> bool {
        matches!(self.valley, ValleyState::Alive(_))
    }

    pub fn k_squared(&self) -> f64 {
        self.kx * self.kx + self.ky * self.ky + self.kz * self.kz
    }

    pub fn kill(&mut self) {
        self.valley = ValleyState::Dead;
    }
}

/// Fixed-capacity collection of super-particles (spec §4.5). Dead slots
/// are reused by the next `spawn` call rather than compacted, so a
/// particle's index is not stable across calls that spawn into a freed
/// slot.
#[derive(Debug, Clone)]
pub struct ParticlePool {
    particles: Vec<Particle>,
    capacity: usize,
    next_id: u64,
    dropped_on_full: u64,
}

impl ParticlePool {
    pub fn new(capacity: usize) -> Self {
        Self { particles: Vec::with_capacity(capacity), capacity, next_id: 0, dropped_on_full: 0 }
    }

    pub fn len(&self) -> usize {
        self.particles.iter().filter(|p| p.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dropped_on_full(&self) -> u64 {
        self.dropped_on_full
    }

    pub fn iter(&self) -> impl Iterator<Item = &Particle> {
        self.particles.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Particle> {
        self.particles.iter_mut()
    }

    fn free_slot(&mut self) -> Option<&mut Particle> {
        if let Some(slot) = self.particles.iter_mut().find(|p| !p.is_alive()) {
            return Some(slot);
        }
        if self.particles.len() < self.capacity {
            self.particles.push(Particle {
                id: 0,
                x: 0.0,
                y: 0.0,
                kx: 0.0,
                ky: 0.0,
                kz: 0.0,
                valley: ValleyState::Dead,
                t_next: 0.0,
            });
            return self.particles.last_mut();
        }
        None
    }

    /// Creates a particle at a uniform position within `(x, y)` with a
    /// Maxwell-Boltzmann sampled `|k|`, isotropic direction, and a
    /// free-flight deadline `t - ln(u)/Gamma` (spec §4.5 `spawn`). Returns
    /// `None` (incrementing the dropped-particle counter) if the pool is
    /// at `NPMAX` capacity, per spec §4.5 and §7 kind 4.
    pub fn spawn<R: Rng + ?Sized>(
        &mut self,
        x: f64,
        y: f64,
        valley: u8,
        effective_mass: f64,
        lattice_temperature: f64,
        now: f64,
        gamma: f64,
        rng: &mut R,
    ) -> Option<u64> {
        let id = self.next_id;
        let k_mag = maxwell_boltzmann_k(effective_mass, lattice_temperature, rng);
        let (kx, ky, kz) = isotropic_direction(k_mag, rng);
        let u: f64 = Uniform::new(f64::EPSILON, 1.0).sample(rng);
        let t_next = now - u.ln() / gamma;

        let slot = self.free_slot();
        let Some(slot) = slot else {
            self.dropped_on_full += 1;
            return None;
        };
        *slot = Particle { id, x, y, kx, ky, kz, valley: ValleyState::Alive(valley), t_next };
        self.next_id += 1;
        Some(id)
    }

    pub fn remove(&mut self, particle: &mut Particle) {
        particle.kill();
    }
}

/// Samples `|k|` from a Maxwell-Boltzmann distribution at
/// `lattice_temperature` for a carrier of the given effective mass
/// (spec §3 "Particle" lifecycle: "created ... with Maxwell-Boltzmann
/// distributed k").
pub fn maxwell_boltzmann_k<R: Rng + ?Sized>(effective_mass: f64, lattice_temperature: f64, rng: &mut R) -> f64 {
    let sigma = (effective_mass * KB * lattice_temperature).sqrt() / HBAR;
    let normal = rand_distr::Normal::new(0.0, sigma).expect("positive sigma");
    let kx = normal.sample(rng);
    let ky = normal.sample(rng);
    let kz = normal.sample(rng);
    (kx * kx + ky * ky + kz * kz).sqrt()
}

/// Resamples an isotropic direction for a given `|k|` magnitude.
pub fn isotropic_direction<R: Rng + ?Sized>(k_mag: f64, rng: &mut R) -> (f64, f64, f64) {
    let cos_theta = Uniform::new_inclusive(-1.0, 1.0).sample(rng);
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi: f64 = Uniform::new(0.0, 2.0 * std::f64::consts::PI).sample(rng);
    (k_mag * sin_theta * phi.cos(), k_mag * sin_theta * phi.sin(), k_mag * cos_theta)
}

/// Kinetic energy from `|k|` under the Kane dispersion
/// `eps(1 + alpha*eps) = hbar^2 k^2 / (2 m*)`, solved for `eps`; reduces
/// to the parabolic form as `alpha -> 0` (spec §4.6/§4.7 shared dispersion).
pub fn kinetic_energy(k_squared: f64, effective_mass: f64, alpha: f64) -> f64 {
    let gk = HBAR * HBAR * k_squared / (2.0 * effective_mass);
    if alpha.abs() < 1e-30 {
        gk
    } else {
        (-1.0 + (1.0 + 4.0 * alpha * gk).sqrt()) / (2.0 * alpha)
    }
}

/// Inverse of [`kinetic_energy`]: `|k|` such that the Kane dispersion
/// yields energy `eps`.
pub fn k_magnitude_from_energy(eps: f64, effective_mass: f64, alpha: f64) -> f64 {
    let gk = eps * (1.0 + alpha * eps);
    (2.0 * effective_mass * gk).max(0.0).sqrt() / HBAR
}

pub use emc_materials::constants::Q as ELEMENTARY_CHARGE;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn spawn_respects_capacity() {
        let mut pool = ParticlePool::new(2);
        let mut rng = StdRng::seed_from_u64(42);
        assert!(pool.spawn(0.0, 0.0, 1, 9.1e-31, 300.0, 0.0, 1e13, &mut rng).is_some());
        assert!(pool.spawn(0.0, 0.0, 1, 9.1e-31, 300.0, 0.0, 1e13, &mut rng).is_some());
        assert!(pool.spawn(0.0, 0.0, 1, 9.1e-31, 300.0, 0.0, 1e13, &mut rng).is_none());
        assert_eq!(pool.dropped_on_full(), 1);
    }

    #[test]
    fn removed_slot_is_reused() {
        let mut pool = ParticlePool::new(1);
        let mut rng = StdRng::seed_from_u64(42);
        pool.spawn(0.0, 0.0, 1, 9.1e-31, 300.0, 0.0, 1e13, &mut rng);
        let p = pool.iter_mut().next().unwrap();
        p.kill();
        assert_eq!(pool.len(), 0);
        assert!(pool.spawn(0.0, 0.0, 1, 9.1e-31, 300.0, 0.0, 1e13, &mut rng).is_some());
    }
}
