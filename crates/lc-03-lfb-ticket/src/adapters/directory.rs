use crate::ports::SharderDirectory;
use lc_01_node_pool::NodeRegistry;
use shared_types::{Node, NodeId, NodeType};
use std::sync::Arc;

impl SharderDirectory for NodeRegistry {
    fn sharder(&self, id: &NodeId) -> Option<Arc<Node>> {
        self.get(id).filter(|node| node.node_type == NodeType::Sharder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_only_yields_sharders() {
        let registry = NodeRegistry::new();
        let sharder = Arc::new(Node::new(NodeType::Sharder, vec![1; 32], "s.local", 7171));
        let miner = Arc::new(Node::new(NodeType::Miner, vec![2; 32], "m.local", 7071));
        registry.register(&sharder).unwrap();
        registry.register(&miner).unwrap();

        assert!(registry.sharder(&sharder.id).is_some());
        assert!(registry.sharder(&miner.id).is_none());
        assert!(registry.sharder(&NodeId([9; 32])).is_none());
    }
}
