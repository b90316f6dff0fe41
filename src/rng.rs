//! Deterministic PRNG and chunk index selection.
//!
//! Both sides of the transport regenerate the same index sets from the seed
//! carried in each packet, so this sequence is part of the wire contract and
//! must never change. The generator is a splitmix-style seed scrambler
//! followed by xorshift64* stepping; no external randomness crate is involved
//! because reproducibility across builds matters more than statistical
//! quality here.

use std::collections::BTreeSet;

/// Deterministic generator used for index selection and degree draws.
pub struct PacketRng {
    state: u64,
}

impl PacketRng {
    pub fn new(seed: u32) -> Self {
        let mut state = seed as u64;
        state = state.wrapping_add(0x9E3779B97F4A7C15);
        state ^= state >> 30;
        state = state.wrapping_mul(0xBF58476D1CE4E5B9);
        state ^= state >> 27;
        state = state.wrapping_mul(0x94D049BB133111EB);
        state ^= state >> 31;
        // The scrambler cannot emit 0 for any u32 seed, so xorshift never sticks.
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545F4914F6CDD1D)
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    /// Uniform in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Select `degree` distinct chunk indices in `[0, chunks_count)`, ascending.
///
/// The first index is always `seed % chunks_count`; a degree-1 packet with
/// seed `n < K` therefore addresses chunk `n`, which is what lets systematic
/// packets round-trip through the same selector as fountain packets. The
/// remaining indices are drawn modulo K, discarding duplicates, until the set
/// is full.
pub fn select_chunk_indices(seed: u32, degree: u16, chunks_count: u32) -> Vec<u32> {
    debug_assert!(chunks_count > 0);
    let degree = (degree as u32).min(chunks_count);

    let mut picked = BTreeSet::new();
    picked.insert(seed % chunks_count);

    let mut rng = PacketRng::new(seed);
    while (picked.len() as u32) < degree {
        picked.insert(rng.next_u32() % chunks_count);
    }

    picked.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_deterministic() {
        for seed in [0u32, 1, 7, 4096, u32::MAX] {
            for (degree, k) in [(1u16, 1u32), (1, 64), (3, 64), (17, 64), (64, 64), (5, 10_000)] {
                let a = select_chunk_indices(seed, degree, k);
                let b = select_chunk_indices(seed, degree, k);
                assert_eq!(a, b, "seed={seed} degree={degree} k={k}");
            }
        }
    }

    #[test]
    fn selection_is_sorted_distinct_and_in_range() {
        for seed in 0..200u32 {
            let indices = select_chunk_indices(seed, 9, 40);
            assert_eq!(indices.len(), 9);
            for w in indices.windows(2) {
                assert!(w[0] < w[1]);
            }
            assert!(indices.iter().all(|&i| i < 40));
        }
    }

    #[test]
    fn degree_one_addresses_seed_modulo_k() {
        for seed in 0..128u32 {
            assert_eq!(select_chunk_indices(seed, 1, 64), vec![seed % 64]);
        }
    }

    #[test]
    fn full_degree_selects_every_chunk() {
        let indices = select_chunk_indices(99, 16, 16);
        assert_eq!(indices, (0..16).collect::<Vec<u32>>());
    }

    #[test]
    fn different_seeds_diverge() {
        let mut distinct = 0;
        let baseline = select_chunk_indices(0, 4, 1000);
        for seed in 1..50u32 {
            if select_chunk_indices(seed, 4, 1000) != baseline {
                distinct += 1;
            }
        }
        assert!(distinct > 40, "only {distinct} of 49 seeds diverged");
    }

    #[test]
    fn zero_seed_terminates_for_high_degree() {
        let indices = select_chunk_indices(0, 32, 32);
        assert_eq!(indices.len(), 32);
    }
}
