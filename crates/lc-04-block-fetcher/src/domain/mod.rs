pub mod config;
pub mod errors;
pub mod request;

pub use config::FetcherConfig;
pub use errors::{FetchError, FetchResult};
pub use request::{FetchQueueStats, FetchRequest};
