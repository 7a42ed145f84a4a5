pub mod database;

pub use database::TrieDatabase;
