//! # Node Registry
//!
//! Process-wide index of known nodes. Magic blocks are canonicalised
//! against it before publication, so a node listed unchanged in successive
//! snapshots is one `Arc<Node>` and a liveness update reaches all of them.

use crate::domain::{NodePoolError, NodePoolResult};
use parking_lot::RwLock;
use shared_types::{MagicBlock, Node, NodeId, NodePool, NodeStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of nodes keyed by id.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node.
    pub fn get(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Canonical handle for `node`.
    ///
    /// An identical registered node is returned as is. A node whose pool
    /// position or address changed replaces the entry and inherits the last
    /// known status.
    pub fn register(&self, node: &Arc<Node>) -> NodePoolResult<Arc<Node>> {
        let mut nodes = self.nodes.write();
        let existing = nodes.get(&node.id).cloned();
        match existing {
            Some(existing) if !existing.same_identity(node) => {
                warn!(node = %node.id, "Public key changed for registered node");
                Err(NodePoolError::KeyMismatch(node.id))
            }
            Some(existing) if *existing == **node => Ok(existing),
            Some(existing) => {
                node.set_status(existing.status());
                nodes.insert(node.id, node.clone());
                debug!(node = %node.id, set_index = node.set_index, "Node entry refreshed");
                Ok(node.clone())
            }
            None => {
                nodes.insert(node.id, node.clone());
                Ok(node.clone())
            }
        }
    }

    /// Swap every node in the pool for its canonical handle.
    pub fn canonicalize_pool(&self, pool: &mut NodePool) -> NodePoolResult<()> {
        if let Some(node) = pool.nodes().iter().find(|n| {
            self.get(&n.id)
                .is_some_and(|existing| !existing.same_identity(n))
        }) {
            return Err(NodePoolError::KeyMismatch(node.id));
        }

        let mut result = Ok(());
        pool.canonicalize(|node| match self.register(node) {
            Ok(canonical) => canonical,
            Err(e) => {
                result = Err(e);
                node.clone()
            }
        });
        result
    }

    /// Canonicalise both pools of a magic block.
    pub fn canonicalize_magic_block(&self, mb: &mut MagicBlock) -> NodePoolResult<()> {
        self.canonicalize_pool(&mut mb.miners)?;
        self.canonicalize_pool(&mut mb.sharders)
    }

    /// Record a liveness observation.
    pub fn mark_status(&self, id: &NodeId, status: NodeStatus) -> NodePoolResult<()> {
        let node = self.get(id).ok_or(NodePoolError::UnknownNode(*id))?;
        if node.status() != status {
            debug!(node = %id, ?status, "Node status changed");
        }
        node.set_status(status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{NodeType, ZERO_HASH};

    fn miner(tag: u8, port: u16) -> Node {
        Node::new(NodeType::Miner, vec![tag; 32], "m.local", port)
    }

    fn magic_block(number: u64, nodes: Vec<Node>) -> MagicBlock {
        MagicBlock::new(
            number,
            number * 100,
            ZERO_HASH,
            NodePool::from_nodes(NodeType::Miner, nodes),
            NodePool::new(NodeType::Sharder),
        )
    }

    #[test]
    fn test_status_shared_across_magic_blocks() {
        let registry = NodeRegistry::new();
        let mut mb1 = magic_block(1, vec![miner(1, 7001), miner(2, 7002)]);
        let mut mb2 = magic_block(2, vec![miner(1, 7001), miner(2, 7002)]);
        registry.canonicalize_magic_block(&mut mb1).unwrap();
        registry.canonicalize_magic_block(&mut mb2).unwrap();

        let id = mb1.miners.nodes()[0].id;
        registry.mark_status(&id, NodeStatus::Inactive).unwrap();

        assert_eq!(mb1.miners.active_count(), 1);
        assert_eq!(mb2.miners.active_count(), 1);
        assert!(Arc::ptr_eq(&mb1.miners.nodes()[0], &mb2.miners.nodes()[0]));
    }

    #[test]
    fn test_moved_node_inherits_status() {
        let registry = NodeRegistry::new();
        let mut mb1 = magic_block(1, vec![miner(1, 7001), miner(2, 7002)]);
        registry.canonicalize_magic_block(&mut mb1).unwrap();
        let id = mb1.miners.nodes()[1].id;
        registry.mark_status(&id, NodeStatus::Inactive).unwrap();

        // Node 2 moves to set index 0.
        let mut mb2 = magic_block(2, vec![miner(2, 7002), miner(3, 7003)]);
        registry.canonicalize_magic_block(&mut mb2).unwrap();
        assert!(!mb2.miners.nodes()[0].is_active());
        assert_eq!(mb2.miners.nodes()[0].set_index, 0);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_key_mismatch_rejected() {
        let registry = NodeRegistry::new();
        let original = Arc::new(miner(1, 7001));
        registry.register(&original).unwrap();

        let mut impostor = miner(9, 7001);
        impostor.id = original.id;
        let mut pool = NodePool::new(NodeType::Miner);
        pool.add_node(impostor);
        assert_eq!(
            registry.canonicalize_pool(&mut pool),
            Err(NodePoolError::KeyMismatch(original.id))
        );
    }

    #[test]
    fn test_mark_unknown_node() {
        let registry = NodeRegistry::new();
        let id = NodeId([3; 32]);
        assert_eq!(
            registry.mark_status(&id, NodeStatus::Active),
            Err(NodePoolError::UnknownNode(id))
        );
    }
}
