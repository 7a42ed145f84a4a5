use crate::error::ChainResult;
use crate::ports::StateNodeSource;
use async_trait::async_trait;
use lc_02_state_trie::{StateError, StateTrie};
use shared_types::{Context, Hash};

/// Serves trie nodes out of another node's trie. Stands in for a peer on
/// devnet and in tests.
pub struct TrieStateNodeSource {
    trie: StateTrie,
}

impl TrieStateNodeSource {
    pub fn new(trie: StateTrie) -> Self {
        Self { trie }
    }
}

#[async_trait]
impl StateNodeSource for TrieStateNodeSource {
    async fn fetch_state_nodes(&self, ctx: &Context, hashes: &[Hash]) -> ChainResult<Vec<(Hash, Vec<u8>)>> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let mut nodes = Vec::with_capacity(hashes.len());
        for hash in hashes {
            match self.trie.get_encoded_node(hash) {
                Ok(encoded) => nodes.push((*hash, encoded)),
                Err(StateError::NodeNotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(nodes)
    }
}
