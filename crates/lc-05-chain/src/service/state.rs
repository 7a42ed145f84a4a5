//! Block state: path reads and materializing a state root from peers.

use super::Chain;
use crate::error::{ChainError, ChainResult};
use shared_types::{short_hex, to_hex, Block, Context};
use tracing::{debug, info};

impl Chain {
    /// Value stored at `path` in the block's state.
    pub fn get_block_state_node(&self, block: &Block, path: &[u8]) -> ChainResult<Vec<u8>> {
        self.trie
            .get(&block.state_root, path)?
            .ok_or_else(|| {
                ChainError::StateNodeNotFound(format!("{}:{}", short_hex(&block.state_root), hex::encode(path)))
            })
    }

    /// Make sure every trie node under the block's state root is stored,
    /// fetching missing ones from the state-node source.
    pub async fn init_block_state(&self, ctx: &Context, block: &Block) -> ChainResult<()> {
        let root = block.state_root;
        let mut missing = self.trie.missing_nodes(&root)?;
        if missing.is_empty() {
            return Ok(());
        }
        let source = self
            .hooks
            .read()
            .state_nodes
            .clone()
            .ok_or_else(|| ChainError::StateNodeNotFound(to_hex(&missing[0])))?;

        let ctx = ctx.with_timeout(self.config.state_sync_timeout);
        info!(round = block.round, root = %short_hex(&root), missing = missing.len(), "Syncing block state");

        while !missing.is_empty() {
            let fetched = tokio::select! {
                biased;
                err = ctx.cancelled() => return Err(err.into()),
                fetched = source.fetch_state_nodes(&ctx, &missing) => fetched?,
            };
            if fetched.is_empty() {
                return Err(ChainError::StateNodeNotFound(to_hex(&missing[0])));
            }
            for (hash, encoded) in fetched {
                self.trie.import_node(&hash, encoded)?;
            }
            let remaining = self.trie.missing_nodes(&root)?;
            if remaining == missing {
                return Err(ChainError::StateNodeNotFound(to_hex(&missing[0])));
            }
            debug!(round = block.round, remaining = remaining.len(), "State sync progress");
            missing = remaining;
        }
        Ok(())
    }
}
