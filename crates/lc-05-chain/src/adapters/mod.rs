pub mod entity_store;
pub mod fetch;
pub mod magic_block_saver;
pub mod round_storage;
pub mod seed;
pub mod state_source;

pub use entity_store::InMemoryEntityStore;
pub use fetch::{ChainFetchCompletion, ChainFetchTargets};
pub use magic_block_saver::EntityStoreMagicBlockSaver;
pub use round_storage::InMemoryRoundStorage;
pub use seed::HashSeedSource;
pub use state_source::TrieStateNodeSource;
