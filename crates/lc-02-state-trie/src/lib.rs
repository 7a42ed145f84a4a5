//! # lc-02-state-trie
//!
//! Merkle-Patricia trie over account state.
//!
//! ## Role in System
//!
//! - **Root pointer owner**: the chain coordinator; only finalization and
//!   magic-block application move it
//! - **Path reads**: `GetBlockStateNode` resolves a key against a block's
//!   state root
//! - **State sync**: `missing_nodes` + `import_node` let a node materialize
//!   a root it has never computed
//! - **Pruning**: mark from the retained roots, sweep the rest
//!
//! ```text
//!   root ──► Extension [6,4,6,f]
//!                 │
//!                 ▼
//!            Branch (value: "verb")
//!              │ [6]
//!              ▼
//!            Leaf [7] "puppy"
//! ```
//!
//! Nodes are bincode-encoded and stored under their Keccak-256 hash, so
//! structurally shared subtrees are stored once across all roots.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::*;
pub use domain::*;
pub use ports::*;
