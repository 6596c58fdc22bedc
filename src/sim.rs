//! Geometric Brownian Motion stepping and standard-normal draws.
//!
//! The random source is a trait so tests can replay a fixed z sequence
//! and assert exact prices.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Minutes in a simulated year (365 days).
pub const MINUTES_PER_YEAR: u64 = 365 * 24 * 60;

/// One-minute step expressed as a fraction of a year.
pub const DT_MINUTE: f64 = 1.0 / MINUTES_PER_YEAR as f64;

/// Precomputed per-step GBM terms for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct GbmParams {
    pub drift: f64,
    pub sig_sqrt_dt: f64,
}

impl GbmParams {
    pub fn new(mu: f64, sigma: f64, dt_years: f64) -> Self {
        Self {
            drift: (mu - 0.5 * sigma * sigma) * dt_years,
            sig_sqrt_dt: sigma * dt_years.sqrt(),
        }
    }

    /// Live-tick parameters: one minute of simulated time.
    pub fn per_minute(mu: f64, sigma: f64) -> Self {
        Self::new(mu, sigma, DT_MINUTE)
    }

    /// Backfill parameters: `step_minutes` of simulated time per step.
    pub fn per_step_minutes(mu: f64, sigma: f64, step_minutes: u32) -> Self {
        Self::new(mu, sigma, step_minutes as f64 / MINUTES_PER_YEAR as f64)
    }
}

/// One GBM step: `last * exp(drift + sigma * sqrt(dt) * z)`.
pub fn gbm_step(last: f64, params: &GbmParams, z: f64) -> f64 {
    last * (params.drift + params.sig_sqrt_dt * z).exp()
}

/// Smallest representable price at the given precision.
pub fn min_tick(decimals: u32) -> f64 {
    10f64.powi(-(decimals as i32))
}

/// Round to `decimals` fractional digits.
pub fn round_dp(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Injectable source of standard-normal draws.
pub trait NormalSource: Send {
    fn next_normal(&mut self) -> f64;
}

/// Box-Muller transform over a seedable PRNG.
pub struct BoxMuller {
    rng: StdRng,
}

impl BoxMuller {
    /// Reproducible source for seeded runs and tests.
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    /// Production wiring: OS entropy.
    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }
}

impl NormalSource for BoxMuller {
    fn next_normal(&mut self) -> f64 {
        loop {
            let u1: f64 = self.rng.gen();
            let u2: f64 = self.rng.gen();
            // gen() can yield exactly 0.0; redraw to keep ln() finite.
            if u1 > 0.0 && u2 > 0.0 {
                return (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
            }
        }
    }
}

/// Replays a fixed z sequence, cycling when exhausted.
pub struct FixedNormals {
    values: Vec<f64>,
    idx: usize,
}

impl FixedNormals {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values, idx: 0 }
    }

    /// Every draw is the same z.
    pub fn constant(z: f64) -> Self {
        Self::new(vec![z])
    }
}

impl NormalSource for FixedNormals {
    fn next_normal(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let z = self.values[self.idx % self.values.len()];
        self.idx += 1;
        z
    }
}
