//! Robust Soliton degree distribution.
//!
//! The encoder draws each packet's degree from this distribution; the degree
//! travels in the packet, so the decoder never re-samples it. Low degrees
//! dominate (singletons and pairs keep the peeling process alive) while the
//! spike near K/R and the tail up to K guarantee that late chunks get
//! covered.

use crate::rng::PacketRng;

/// Default spike parameter.
pub const DEFAULT_C: f64 = 0.03;
/// Default decode failure bound.
pub const DEFAULT_DELTA: f64 = 0.5;

/// Precomputed cumulative distribution over degrees `1..=K`.
pub struct DegreeDistribution {
    cdf: Vec<f64>,
    k: u32,
}

impl DegreeDistribution {
    pub fn new(k: u32) -> Self {
        Self::with_params(k, DEFAULT_C, DEFAULT_DELTA)
    }

    pub fn with_params(k: u32, c: f64, delta: f64) -> Self {
        assert!(k > 0, "degree distribution needs at least one chunk");
        if k == 1 {
            return Self {
                cdf: vec![1.0],
                k,
            };
        }

        let kf = k as f64;
        let r = c * (kf / delta).ln() * kf.sqrt();
        let spike = if r > 0.0 {
            ((kf / r).round() as u32).clamp(1, k)
        } else {
            k
        };

        // Ideal soliton rho plus the robust correction tau, then normalize.
        let mut weights = vec![0.0f64; k as usize];
        weights[0] = 1.0 / kf;
        for d in 2..=k {
            weights[(d - 1) as usize] = 1.0 / (d as f64 * (d as f64 - 1.0));
        }
        if r > 0.0 {
            for d in 1..spike {
                weights[(d - 1) as usize] += r / (d as f64 * kf);
            }
            let spike_mass = r * (r / delta).ln() / kf;
            if spike_mass.is_finite() && spike_mass > 0.0 {
                weights[(spike - 1) as usize] += spike_mass;
            }
        }

        let total: f64 = weights.iter().sum();
        let mut cdf = Vec::with_capacity(k as usize);
        let mut acc = 0.0;
        for w in &weights {
            acc += w / total;
            cdf.push(acc);
        }
        // Guard against accumulated rounding at the top end.
        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        Self { cdf, k }
    }

    pub fn chunks_count(&self) -> u32 {
        self.k
    }

    /// Draw a degree for the packet with the given `seed_base`.
    pub fn sample(&self, seed_base: u32) -> u16 {
        let mut rng = PacketRng::new(seed_base);
        let r = rng.next_f64();
        let idx = match self.cdf.iter().position(|&p| r < p) {
            Some(idx) => idx,
            None => self.cdf.len() - 1,
        };
        ((idx as u32 + 1).min(self.k).min(u16::MAX as u32)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_always_degree_one() {
        let dist = DegreeDistribution::new(1);
        for seed in 0..50 {
            assert_eq!(dist.sample(seed), 1);
        }
    }

    #[test]
    fn samples_stay_in_range() {
        for k in [2u32, 3, 4, 10, 64, 500] {
            let dist = DegreeDistribution::new(k);
            for seed in 0..500 {
                let d = dist.sample(seed) as u32;
                assert!(d >= 1 && d <= k, "k={k} produced degree {d}");
            }
        }
    }

    #[test]
    fn sampling_is_deterministic() {
        let dist = DegreeDistribution::new(128);
        for seed in 0..200 {
            assert_eq!(dist.sample(seed), dist.sample(seed));
        }
    }

    #[test]
    fn low_degrees_dominate() {
        let dist = DegreeDistribution::new(100);
        let mut low = 0usize;
        let mut total_degree = 0u64;
        let samples = 2000;
        for seed in 0..samples {
            let d = dist.sample(seed);
            if d <= 2 {
                low += 1;
            }
            total_degree += d as u64;
        }
        // Roughly half the mass sits on degrees 1 and 2; leave a wide margin.
        assert!(low * 4 > samples as usize, "only {low} low-degree draws");
        let mean = total_degree as f64 / samples as f64;
        assert!(mean < 20.0, "mean degree {mean} too high");
    }

    #[test]
    fn tail_reaches_past_the_pairs() {
        let dist = DegreeDistribution::new(64);
        let mut seen_high = false;
        for seed in 0..2000 {
            if dist.sample(seed) > 4 {
                seen_high = true;
                break;
            }
        }
        assert!(seen_high, "distribution never sampled a high degree");
    }

    #[test]
    fn cdf_is_monotone_and_complete() {
        let dist = DegreeDistribution::with_params(256, DEFAULT_C, DEFAULT_DELTA);
        for w in dist.cdf.windows(2) {
            assert!(w[1] >= w[0]);
        }
        assert_eq!(*dist.cdf.last().unwrap(), 1.0);
    }
}
