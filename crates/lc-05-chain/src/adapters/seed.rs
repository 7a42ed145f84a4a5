use crate::ports::SeedSource;
use shared_types::{hash_bytes, Hash, RoundNumber};

/// Seeds derived from `SHA-256(lfb_hash || round || timeout_count)`.
///
/// Every node computes the same seed, so it stands in for a randomness
/// beacon on devnet and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashSeedSource;

impl SeedSource for HashSeedSource {
    fn round_seed(&self, round: RoundNumber, lfb_hash: &Hash, timeout_count: u32) -> u64 {
        let mut input = Vec::with_capacity(44);
        input.extend_from_slice(lfb_hash);
        input.extend_from_slice(&round.to_be_bytes());
        input.extend_from_slice(&timeout_count.to_be_bytes());
        let digest = hash_bytes(&input);
        let mut word = [0u8; 8];
        word.copy_from_slice(&digest[..8]);
        // Zero is reserved for "no seed".
        u64::from_be_bytes(word).max(1)
    }
}
