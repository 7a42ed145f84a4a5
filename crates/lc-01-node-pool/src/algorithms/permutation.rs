//! # Miner Permutation
//!
//! A round's random seed fixes a permutation of miner set indices; a miner's
//! rank in the round is its position in that permutation.

use sha3::{Digest, Keccak256};

fn next_state(state: &[u8; 32], step: u64) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(state);
    hasher.update(step.to_le_bytes());
    hasher.finalize().into()
}

/// Fisher-Yates over `0..n` driven by a Keccak-256 hash chain of `seed`.
///
/// `result[set_index]` is the rank of the miner with that set index.
pub fn miner_permutation(seed: u64, n: usize) -> Vec<usize> {
    let mut ranks: Vec<usize> = (0..n).collect();
    if n <= 1 {
        return ranks;
    }

    let mut state: [u8; 32] = Keccak256::digest(seed.to_le_bytes()).into();
    for i in (1..n).rev() {
        state = next_state(&state, i as u64);
        let mut word = [0u8; 8];
        word.copy_from_slice(&state[..8]);
        let j = (u64::from_le_bytes(word) % (i as u64 + 1)) as usize;
        ranks.swap(i, j);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permutation_is_deterministic() {
        assert_eq!(miner_permutation(42, 16), miner_permutation(42, 16));
    }

    #[test]
    fn test_permutation_covers_all_ranks() {
        let mut ranks = miner_permutation(7, 25);
        ranks.sort_unstable();
        assert_eq!(ranks, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn test_seed_changes_order() {
        let a = miner_permutation(1, 32);
        let differs = (2..10).any(|seed| miner_permutation(seed, 32) != a);
        assert!(differs);
    }

    #[test]
    fn test_small_pools() {
        assert!(miner_permutation(9, 0).is_empty());
        assert_eq!(miner_permutation(9, 1), vec![0]);
    }
}
