use serde::{Deserialize, Serialize};

// =============================================================================
// NIBBLES: Half-byte path representation
// =============================================================================

/// Nibble path for trie traversal.
///
/// Keys are split into half-bytes (0-15); a 32-byte key becomes 64 nibbles.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nibbles(pub Vec<u8>);

impl Nibbles {
    /// Create nibbles from arbitrary key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut nibbles = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0F);
        }
        Nibbles(nibbles)
    }

    /// Nibbles from a slice of already-split half-bytes.
    pub fn from_slice(nibbles: &[u8]) -> Self {
        Nibbles(nibbles.to_vec())
    }

    /// `prefix || self`.
    pub fn prepend(&self, prefix: &[u8]) -> Self {
        let mut joined = Vec::with_capacity(prefix.len() + self.len());
        joined.extend_from_slice(prefix);
        joined.extend_from_slice(&self.0);
        Nibbles(joined)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Length of the shared prefix of two nibble paths.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nibbles_from_bytes() {
        let nibbles = Nibbles::from_bytes(&[0xAB, 0xCD]);
        assert_eq!(nibbles.as_slice(), &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_common_prefix() {
        assert_eq!(common_prefix_len(&[1, 2, 3], &[1, 2, 4]), 2);
        assert_eq!(common_prefix_len(&[1], &[]), 0);
        assert_eq!(common_prefix_len(&[5, 6], &[5, 6]), 2);
    }

    #[test]
    fn test_prepend() {
        let tail = Nibbles(vec![3, 4]);
        assert_eq!(tail.prepend(&[1, 2]), Nibbles(vec![1, 2, 3, 4]));
    }
}
