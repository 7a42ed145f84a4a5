//! # Persistent Merkle-Patricia Trie
//!
//! Nodes are immutable and addressed by hash, so every root ever produced
//! stays readable until a prune sweeps the nodes no retained root reaches.
//! Updates write only the nodes on the changed path.

use super::nibbles::{common_prefix_len, Nibbles};
use super::node::{node_hash, TrieNode};
use super::{Hash, PruneStats, StateError, StateResult, EMPTY_ROOT};
use crate::ports::TrieDatabase;
use shared_types::{short_hex, RoundNumber};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Nodes written by one update, flushed in a single batch.
#[derive(Default)]
struct PendingNodes {
    nodes: HashMap<Hash, Vec<u8>>,
}

/// State trie over a node database.
#[derive(Clone)]
pub struct StateTrie {
    db: Arc<dyn TrieDatabase>,
}

impl StateTrie {
    pub fn new(db: Arc<dyn TrieDatabase>) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Arc<dyn TrieDatabase> {
        &self.db
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Decoded node by hash.
    pub fn get_node(&self, hash: &Hash) -> StateResult<TrieNode> {
        self.load(hash, None)
    }

    /// Raw encoded node by hash, for serving state sync.
    pub fn get_encoded_node(&self, hash: &Hash) -> StateResult<Vec<u8>> {
        self.db.get_node(hash)?.ok_or(StateError::NodeNotFound(*hash))
    }

    /// Whether the root node is stored locally. The empty root always is.
    pub fn has_root(&self, root: &Hash) -> StateResult<bool> {
        if *root == EMPTY_ROOT {
            return Ok(true);
        }
        self.db.contains(root)
    }

    /// Value stored under `key` in the trie rooted at `root`.
    ///
    /// Fails with `NodeNotFound` if a node on the path is absent locally.
    pub fn get(&self, root: &Hash, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        if *root == EMPTY_ROOT {
            return Ok(None);
        }
        let path = Nibbles::from_bytes(key);
        let mut remaining = path.as_slice();
        let mut node = self.load(root, None)?;

        loop {
            match node {
                TrieNode::Leaf { path, value } => {
                    return Ok((path.as_slice() == remaining).then_some(value));
                }
                TrieNode::Extension { path, child } => {
                    if !remaining.starts_with(path.as_slice()) {
                        return Ok(None);
                    }
                    remaining = &remaining[path.len()..];
                    node = self.load(&child, None)?;
                }
                TrieNode::Branch { children, value } => {
                    let Some((&first, rest)) = remaining.split_first() else {
                        return Ok(value);
                    };
                    match children[first as usize] {
                        Some(child) => {
                            remaining = rest;
                            node = self.load(&child, None)?;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Insert or overwrite; returns the new root.
    pub fn insert(&self, root: &Hash, key: &[u8], value: Vec<u8>) -> StateResult<Hash> {
        self.apply(root, vec![(key.to_vec(), Some(value))])
    }

    /// Remove a key; returns the new root (unchanged if absent).
    pub fn delete(&self, root: &Hash, key: &[u8]) -> StateResult<Hash> {
        self.apply(root, vec![(key.to_vec(), None)])
    }

    /// Apply a batch of changes in order. `None` deletes the key.
    pub fn apply(&self, root: &Hash, changes: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> StateResult<Hash> {
        let mut pending = PendingNodes::default();
        let mut current = *root;

        for (key, change) in changes {
            let path = Nibbles::from_bytes(&key);
            let node = self.load_root(&current, &pending)?;
            let updated = match change {
                Some(value) => Some(self.insert_at(node, path.as_slice(), value, &mut pending)?),
                None => match node {
                    Some(node) if self.contains_key(&node, path.as_slice(), &pending)? => {
                        self.delete_at(node, path.as_slice(), &mut pending)?
                    }
                    other => other,
                },
            };
            current = match updated {
                Some(node) => self.store(&node, &mut pending)?,
                None => EMPTY_ROOT,
            };
        }

        if !pending.nodes.is_empty() {
            self.db.batch_put(pending.nodes.into_iter().collect())?;
        }
        Ok(current)
    }

    /// Store a node received from a peer after checking its hash.
    pub fn import_node(&self, expected: &Hash, encoded: Vec<u8>) -> StateResult<()> {
        let actual = node_hash(&encoded);
        if actual != *expected {
            return Err(StateError::HashMismatch {
                expected: *expected,
                actual,
            });
        }
        TrieNode::decode(&encoded)?;
        self.db.put_node(actual, encoded)
    }

    // =========================================================================
    // REACHABILITY / PRUNING
    // =========================================================================

    /// Nodes referenced under `root` that are not stored locally.
    ///
    /// The walk does not descend below a missing node, so a full sync may
    /// need several rounds of fetch-and-recheck.
    pub fn missing_nodes(&self, root: &Hash) -> StateResult<Vec<Hash>> {
        let (_, missing) = self.reachable(std::slice::from_ref(root))?;
        Ok(missing)
    }

    /// Stored nodes reachable from `roots`, plus referenced-but-absent ones.
    pub fn reachable(&self, roots: &[Hash]) -> StateResult<(HashSet<Hash>, Vec<Hash>)> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        let mut stack: Vec<Hash> = roots.iter().copied().filter(|r| *r != EMPTY_ROOT).collect();

        while let Some(hash) = stack.pop() {
            if seen.contains(&hash) || missing.contains(&hash) {
                continue;
            }
            match self.db.get_node(&hash)? {
                Some(bytes) => {
                    let node = TrieNode::decode(&bytes)?;
                    seen.insert(hash);
                    stack.extend(node.child_hashes());
                }
                None => missing.push(hash),
            }
        }
        Ok((seen, missing))
    }

    /// Delete every node not reachable from `retain_roots`.
    pub fn prune(&self, retain_roots: &[Hash], round: RoundNumber) -> StateResult<PruneStats> {
        let started = Instant::now();
        let (keep, missing) = self.reachable(retain_roots)?;

        let mut deleted = 0u64;
        for hash in self.db.node_hashes()? {
            if !keep.contains(&hash) {
                self.db.delete_node(&hash)?;
                deleted += 1;
            }
        }

        let stats = PruneStats {
            round,
            visited: (keep.len() + missing.len()) as u64,
            retained: keep.len() as u64,
            deleted,
            missing: missing.len() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            round,
            retained = stats.retained,
            deleted = stats.deleted,
            missing = stats.missing,
            "State trie pruned"
        );
        Ok(stats)
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn load(&self, hash: &Hash, pending: Option<&PendingNodes>) -> StateResult<TrieNode> {
        if let Some(bytes) = pending.and_then(|p| p.nodes.get(hash)) {
            return TrieNode::decode(bytes);
        }
        match self.db.get_node(hash)? {
            Some(bytes) => TrieNode::decode(&bytes),
            None => {
                debug!(node = %short_hex(hash), "Trie node missing");
                Err(StateError::NodeNotFound(*hash))
            }
        }
    }

    fn load_root(&self, root: &Hash, pending: &PendingNodes) -> StateResult<Option<TrieNode>> {
        if *root == EMPTY_ROOT {
            return Ok(None);
        }
        self.load(root, Some(pending)).map(Some)
    }

    fn store(&self, node: &TrieNode, pending: &mut PendingNodes) -> StateResult<Hash> {
        let encoded = node.encode()?;
        let hash = node_hash(&encoded);
        pending.nodes.insert(hash, encoded);
        Ok(hash)
    }

    fn contains_key(&self, node: &TrieNode, path: &[u8], pending: &PendingNodes) -> StateResult<bool> {
        let mut node = node.clone();
        let mut remaining = path;
        loop {
            match node {
                TrieNode::Leaf { path, .. } => return Ok(path.as_slice() == remaining),
                TrieNode::Extension { path, child } => {
                    if !remaining.starts_with(path.as_slice()) {
                        return Ok(false);
                    }
                    remaining = &remaining[path.len()..];
                    node = self.load(&child, Some(pending))?;
                }
                TrieNode::Branch { children, value } => {
                    let Some((&first, rest)) = remaining.split_first() else {
                        return Ok(value.is_some());
                    };
                    let Some(child) = children[first as usize] else {
                        return Ok(false);
                    };
                    remaining = rest;
                    node = self.load(&child, Some(pending))?;
                }
            }
        }
    }

    /// Attach `value` at `path` below an optional existing node.
    fn leaf_or_branch_value(
        &self,
        children: &mut [Option<Hash>; 16],
        branch_value: &mut Option<Vec<u8>>,
        rest: &[u8],
        leaf: Vec<u8>,
        pending: &mut PendingNodes,
    ) -> StateResult<()> {
        match rest.split_first() {
            None => *branch_value = Some(leaf),
            Some((&first, tail)) => {
                let node = TrieNode::Leaf {
                    path: Nibbles::from_slice(tail),
                    value: leaf,
                };
                children[first as usize] = Some(self.store(&node, pending)?);
            }
        }
        Ok(())
    }

    fn wrap_extension(&self, prefix: &[u8], branch: TrieNode, pending: &mut PendingNodes) -> StateResult<TrieNode> {
        if prefix.is_empty() {
            return Ok(branch);
        }
        Ok(TrieNode::Extension {
            path: Nibbles::from_slice(prefix),
            child: self.store(&branch, pending)?,
        })
    }

    fn insert_at(
        &self,
        node: Option<TrieNode>,
        path: &[u8],
        value: Vec<u8>,
        pending: &mut PendingNodes,
    ) -> StateResult<TrieNode> {
        let Some(node) = node else {
            return Ok(TrieNode::Leaf {
                path: Nibbles::from_slice(path),
                value,
            });
        };

        match node {
            TrieNode::Leaf {
                path: leaf_path,
                value: leaf_value,
            } => {
                if leaf_path.as_slice() == path {
                    return Ok(TrieNode::Leaf {
                        path: leaf_path,
                        value,
                    });
                }
                let common = common_prefix_len(leaf_path.as_slice(), path);
                let mut children = [None; 16];
                let mut branch_value = None;
                self.leaf_or_branch_value(
                    &mut children,
                    &mut branch_value,
                    &leaf_path.as_slice()[common..],
                    leaf_value,
                    pending,
                )?;
                self.leaf_or_branch_value(&mut children, &mut branch_value, &path[common..], value, pending)?;
                let branch = TrieNode::Branch {
                    children: Box::new(children),
                    value: branch_value,
                };
                self.wrap_extension(&path[..common], branch, pending)
            }

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let common = common_prefix_len(ext_path.as_slice(), path);
                if common == ext_path.len() {
                    let child_node = self.load(&child, Some(&*pending))?;
                    let updated = self.insert_at(Some(child_node), &path[common..], value, pending)?;
                    return Ok(TrieNode::Extension {
                        path: ext_path,
                        child: self.store(&updated, pending)?,
                    });
                }

                let mut children = [None; 16];
                let mut branch_value = None;
                let ext_rest = &ext_path.as_slice()[common..];
                let slot = ext_rest[0] as usize;
                children[slot] = Some(if ext_rest.len() == 1 {
                    child
                } else {
                    self.store(
                        &TrieNode::Extension {
                            path: Nibbles::from_slice(&ext_rest[1..]),
                            child,
                        },
                        pending,
                    )?
                });
                self.leaf_or_branch_value(&mut children, &mut branch_value, &path[common..], value, pending)?;
                let branch = TrieNode::Branch {
                    children: Box::new(children),
                    value: branch_value,
                };
                self.wrap_extension(&path[..common], branch, pending)
            }

            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                let Some((&first, rest)) = path.split_first() else {
                    return Ok(TrieNode::Branch {
                        children,
                        value: Some(value),
                    });
                };
                let slot = first as usize;
                let child = match children[slot] {
                    Some(hash) => Some(self.load(&hash, Some(&*pending))?),
                    None => None,
                };
                let updated = self.insert_at(child, rest, value, pending)?;
                children[slot] = Some(self.store(&updated, pending)?);
                Ok(TrieNode::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    /// Remove `path`, which must be present. `None` means the subtree is gone.
    fn delete_at(&self, node: TrieNode, path: &[u8], pending: &mut PendingNodes) -> StateResult<Option<TrieNode>> {
        match node {
            TrieNode::Leaf { .. } => Ok(None),

            TrieNode::Extension {
                path: ext_path,
                child,
            } => {
                let child_node = self.load(&child, Some(&*pending))?;
                let updated = self.delete_at(child_node, &path[ext_path.len()..], pending)?;
                Ok(match updated {
                    None => None,
                    Some(TrieNode::Leaf { path: tail, value }) => Some(TrieNode::Leaf {
                        path: tail.prepend(ext_path.as_slice()),
                        value,
                    }),
                    Some(TrieNode::Extension { path: tail, child }) => Some(TrieNode::Extension {
                        path: tail.prepend(ext_path.as_slice()),
                        child,
                    }),
                    Some(branch) => Some(TrieNode::Extension {
                        path: ext_path,
                        child: self.store(&branch, pending)?,
                    }),
                })
            }

            TrieNode::Branch {
                mut children,
                mut value,
            } => {
                match path.split_first() {
                    None => value = None,
                    Some((&first, rest)) => {
                        let slot = first as usize;
                        if let Some(hash) = children[slot] {
                            let child_node = self.load(&hash, Some(&*pending))?;
                            children[slot] = match self.delete_at(child_node, rest, pending)? {
                                Some(updated) => Some(self.store(&updated, pending)?),
                                None => None,
                            };
                        }
                    }
                }
                self.collapse_branch(children, value, pending)
            }
        }
    }

    /// Restore the canonical shape of a branch after a removal.
    fn collapse_branch(
        &self,
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
        pending: &mut PendingNodes,
    ) -> StateResult<Option<TrieNode>> {
        let occupied: Vec<(usize, Hash)> = children
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.map(|h| (i, h)))
            .collect();

        match (occupied.as_slice(), value) {
            ([], None) => Ok(None),
            ([], Some(value)) => Ok(Some(TrieNode::Leaf {
                path: Nibbles::default(),
                value,
            })),
            ([(slot, hash)], None) => {
                let prefix = [*slot as u8];
                Ok(Some(match self.load(hash, Some(&*pending))? {
                    TrieNode::Leaf { path, value } => TrieNode::Leaf {
                        path: path.prepend(&prefix),
                        value,
                    },
                    TrieNode::Extension { path, child } => TrieNode::Extension {
                        path: path.prepend(&prefix),
                        child,
                    },
                    TrieNode::Branch { .. } => TrieNode::Extension {
                        path: Nibbles::from_slice(&prefix),
                        child: *hash,
                    },
                }))
            }
            (_, value) => Ok(Some(TrieNode::Branch { children, value })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTrieDb;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    fn trie() -> (StateTrie, Arc<InMemoryTrieDb>) {
        let db = Arc::new(InMemoryTrieDb::new());
        (StateTrie::new(db.clone()), db)
    }

    fn entries() -> Vec<(Vec<u8>, Vec<u8>)> {
        vec![
            (b"do".to_vec(), b"verb".to_vec()),
            (b"dog".to_vec(), b"puppy".to_vec()),
            (b"doge".to_vec(), b"coin".to_vec()),
            (b"horse".to_vec(), b"stallion".to_vec()),
            (vec![0xAB; 32], vec![1]),
            (vec![0xAB, 0xCD], vec![2]),
        ]
    }

    fn build(trie: &StateTrie, items: &[(Vec<u8>, Vec<u8>)]) -> Hash {
        items
            .iter()
            .try_fold(EMPTY_ROOT, |root, (k, v)| trie.insert(&root, k, v.clone()))
            .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let (trie, _) = trie();
        let root = build(&trie, &entries());
        for (k, v) in entries() {
            assert_eq!(trie.get(&root, &k).unwrap(), Some(v));
        }
        assert_eq!(trie.get(&root, b"d").unwrap(), None);
        assert_eq!(trie.get(&root, b"dogs").unwrap(), None);
        assert_eq!(trie.get(&EMPTY_ROOT, b"do").unwrap(), None);
    }

    #[test]
    fn test_root_independent_of_insert_order() {
        let (trie, _) = trie();
        let mut items = entries();
        let expected = build(&trie, &items);

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for _ in 0..5 {
            items.shuffle(&mut rng);
            assert_eq!(build(&trie, &items), expected);
        }
    }

    #[test]
    fn test_delete_restores_previous_root() {
        let (trie, _) = trie();
        let items = entries();
        let without_last = build(&trie, &items[..items.len() - 1]);
        let full = build(&trie, &items);

        let (k, _) = items.last().unwrap();
        assert_eq!(trie.delete(&full, k).unwrap(), without_last);

        let emptied = items
            .iter()
            .try_fold(full, |root, (k, _)| trie.delete(&root, k))
            .unwrap();
        assert_eq!(emptied, EMPTY_ROOT);
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let (trie, _) = trie();
        let root = build(&trie, &entries());
        assert_eq!(trie.delete(&root, b"cat").unwrap(), root);
    }

    #[test]
    fn test_old_roots_stay_readable() {
        let (trie, _) = trie();
        let r1 = trie.insert(&EMPTY_ROOT, b"k", b"v1".to_vec()).unwrap();
        let r2 = trie.insert(&r1, b"k", b"v2".to_vec()).unwrap();
        assert_eq!(trie.get(&r1, b"k").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(trie.get(&r2, b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_prune_keeps_only_retained_roots() {
        let (trie, db) = trie();
        let r1 = build(&trie, &entries()[..3]);
        let r2 = trie.insert(&r1, b"zebra", b"stripes".to_vec()).unwrap();
        let before = db.len() as u64;

        let stats = trie.prune(&[r2], 10).unwrap();
        assert_eq!(stats.round, 10);
        assert!(stats.deleted > 0);
        assert_eq!(stats.retained + stats.deleted, before);
        assert_eq!(stats.missing, 0);

        assert!(trie.has_root(&r2).unwrap());
        assert!(!trie.has_root(&r1).unwrap());
        assert_eq!(trie.get(&r2, b"dog").unwrap(), Some(b"puppy".to_vec()));
    }

    #[test]
    fn test_missing_nodes_and_import() {
        let (source, _) = trie();
        let root = build(&source, &entries());

        let (target, _) = trie();
        assert_eq!(target.missing_nodes(&root).unwrap(), vec![root]);
        assert!(matches!(target.get(&root, b"do"), Err(StateError::NodeNotFound(_))));

        // Sync top-down until nothing is missing.
        loop {
            let missing = target.missing_nodes(&root).unwrap();
            if missing.is_empty() {
                break;
            }
            for hash in missing {
                let bytes = source.get_encoded_node(&hash).unwrap();
                target.import_node(&hash, bytes).unwrap();
            }
        }
        assert_eq!(target.get(&root, b"doge").unwrap(), Some(b"coin".to_vec()));
    }

    #[test]
    fn test_import_rejects_wrong_hash() {
        let (trie, _) = trie();
        let leaf = TrieNode::Leaf {
            path: Nibbles(vec![1]),
            value: vec![2],
        };
        let result = trie.import_node(&[0u8; 32], leaf.encode().unwrap());
        assert!(matches!(result, Err(StateError::HashMismatch { .. })));
    }
}
