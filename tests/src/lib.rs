//! # Ledger-Chain Test Suite
//!
//! Unified test crate containing:
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── chain_benchmarks.rs   # Scoring, block insertion, trie updates
//! └── src/
//!     └── integration/          # Cross-crate scenarios
//!         ├── scenarios.rs      # Genesis to view change, end to end
//!         └── fetch.rs          # Chain + block fetcher over a mock peer
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p lc-tests
//! cargo test -p lc-tests integration::fetch::
//! cargo bench -p lc-tests
//! ```

pub mod integration;
