use rand::Rng;
use serde::Deserialize;

/// Normal distribution restricted to `[low, high]`, sampled by rejection.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TruncatedNormal {
    #[serde(rename = "@mean")]
    pub mean: f64,
    #[serde(rename = "@std_dev")]
    pub std_dev: f64,
    #[serde(rename = "@low")]
    pub low: f64,
    #[serde(rename = "@high")]
    pub high: f64,
}

const MAX_REJECTIONS: usize = 10_000;

impl TruncatedNormal {
    #[must_use]
    pub const fn new(mean: f64, std_dev: f64, low: f64, high: f64) -> Self {
        Self {
            mean,
            std_dev,
            low,
            high,
        }
    }

    /// One sample in `[low, high]`. A zero spread, or an interval the
    /// rejection loop keeps missing, yields the mean clamped to the bounds.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let fallback = self.mean.clamp(self.low.min(self.high), self.high.max(self.low));
        if !(self.std_dev > 0.0) || !(self.high > self.low) {
            return fallback;
        }
        for _ in 0..MAX_REJECTIONS {
            let value = self.mean + self.std_dev * standard_normal(rng);
            if (self.low..=self.high).contains(&value) {
                return value;
            }
        }
        log::warn!(
            "truncated normal N({}, {}) on [{}, {}] kept missing, using {fallback}",
            self.mean,
            self.std_dev,
            self.low,
            self.high
        );
        fallback
    }
}

/// Box-Muller.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn samples_stay_in_bounds_and_repeat_per_seed() {
        let dist = TruncatedNormal::new(0.25, 0.1, 0.1, 0.4);
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..200).map(|_| dist.sample(&mut rng)).collect::<Vec<_>>()
        };
        let first = draw(7);
        assert!(first.iter().all(|v| (0.1..=0.4).contains(v)));
        assert_eq!(first, draw(7));
        let mean = first.iter().sum::<f64>() / first.len() as f64;
        assert!((mean - 0.25).abs() < 0.03);
    }

    #[test]
    fn degenerate_spread_returns_clamped_mean() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(TruncatedNormal::new(5.0, 0.0, 0.0, 1.0).sample(&mut rng), 1.0);
        assert_eq!(TruncatedNormal::new(0.5, 1.0, 0.7, 0.7).sample(&mut rng), 0.7);
    }
}
