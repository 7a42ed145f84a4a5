//! Cross-crate integration tests. Everything runs in memory against the
//! deterministic fixtures of `lc_05_chain::test_utils`.

mod fetch;
mod scenarios;
