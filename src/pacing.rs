//! Think-time pacing between flow steps.
//!
//! Real users do not fire dependent requests back to back, and a fleet of
//! virtual users sleeping for identical fixed delays produces lock-step
//! request bursts. The pacing policy is `base * factor` with `factor` drawn
//! uniformly from `[1 - variance, 1 + variance]`; the factor computation is
//! a pure function of the draw so it can be tested with injected values.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub base: Duration,
    /// Fractional spread around the base, e.g. `0.3` for ±30%.
    pub variance: f64,
}

impl Pacing {
    pub fn new(base: Duration, variance: f64) -> Self {
        Self { base, variance }
    }

    pub fn jittered<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        self.base.mul_f64(jitter_factor(rng.gen::<f64>(), self.variance))
    }
}

/// Map a uniform draw in `[0, 1)` to a factor in `[1 - variance, 1 + variance]`.
pub fn jitter_factor(draw: f64, variance: f64) -> f64 {
    (1.0 + (draw - 0.5) * 2.0 * variance).max(0.0)
}
