//! Perturbation fallback for failed extractions.
//!
//! When no score can be read for an agent, its prior opinion is nudged by a
//! uniform draw from `[-bound, bound]` and clamped back onto the scale.

use rand::Rng;

use crate::agent::Opinion;

/// Default half-width of the perturbation range.
pub const DEFAULT_BOUND: f64 = 0.1;

/// Bounded uniform perturbation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Perturbation {
    bound: f64,
}

impl Default for Perturbation {
    fn default() -> Self {
        Self {
            bound: DEFAULT_BOUND,
        }
    }
}

impl Perturbation {
    /// Perturbation of at most `bound` in either direction.
    ///
    /// Negative or non-finite bounds collapse to zero.
    pub fn new(bound: f64) -> Self {
        let bound = if bound.is_finite() { bound.abs() } else { 0.0 };
        Self { bound }
    }

    /// Half-width of the range.
    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Perturb `prior`.
    pub fn apply<R: Rng>(&self, prior: Opinion, rng: &mut R) -> Opinion {
        if self.bound == 0.0 {
            return prior;
        }
        let delta = rng.gen_range(-self.bound..=self.bound);
        Opinion::new(prior.value() + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_stays_within_bound() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let p = Perturbation::default();
        for _ in 0..1000 {
            let prior = Opinion::new(0.3);
            let next = p.apply(prior, &mut rng);
            assert!(next.distance(prior) <= 0.1 + 1e-12);
        }
    }

    #[test]
    fn test_clamps_at_edges() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let p = Perturbation::new(0.5);
        for _ in 0..200 {
            let v = p.apply(Opinion::new(1.0), &mut rng).value();
            assert!((-1.0..=1.0).contains(&v));
            let v = p.apply(Opinion::new(-1.0), &mut rng).value();
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_zero_bound_is_identity() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let p = Perturbation::new(0.0);
        assert_eq!(p.apply(Opinion::new(0.42), &mut rng).value(), 0.42);
        assert_eq!(Perturbation::new(f64::NAN).bound(), 0.0);
        assert_eq!(Perturbation::new(-0.2).bound(), 0.2);
    }

    #[test]
    fn test_deterministic_with_seed() {
        let p = Perturbation::default();
        let a = p.apply(Opinion::new(0.0), &mut ChaCha8Rng::seed_from_u64(9));
        let b = p.apply(Opinion::new(0.0), &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
