pub mod broadcaster;
pub mod directory;

pub use broadcaster::{LocalBroadcaster, NullBroadcaster};
