//! # LC-03 LFB Ticket
//!
//! Gossip of the latest finalized block (LFB) tip.
//!
//! A sharder signs a ticket `(round, sharder_id, lfb_hash)` whenever it
//! finalizes a block and sends it to every miner and sharder of the magic
//! block covering that round. Receivers verify the ticket and use its round
//! as a hint of how far behind they are: the block fetcher routes requests
//! for rounds at or below it straight to sharders.
//!
//! ## Worker
//!
//! ```text
//!  handle.receive() ─┐
//!  handle.bump()     ├──► Command ──► ┌──────────────┐ ──► subscriber sinks
//!  handle.broadcast()┤    (mpsc)      │ ticket worker│     (try_send)
//!  handle.subscribe()┤                │  latest: T   │ ──► TicketBroadcaster
//!  handle.latest()  ─┘                └──────────────┘     (spawned send)
//!                                          │   ▲
//!                                   done ◄─┘   └─ rebroadcast timer
//! ```
//!
//! One task owns the latest ticket and the subscriber set. It only moves
//! forward: tickets at or below the latest round are dropped. Sharders
//! re-send their latest ticket after `rebroadcast_interval` of silence.
//!
//! Subscribing twice with the same sink is a no-op. Once the worker has
//! stopped, `subscribe` reports `ServiceStopped` and `unsubscribe` does
//! nothing.

#![warn(clippy::all)]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{LocalBroadcaster, NullBroadcaster};
pub use domain::{LfbTicket, LfbTicketConfig, LfbTicketError, LfbTicketResult};
pub use ports::{SharderDirectory, TicketBroadcaster};
pub use service::{LfbTicketHandle, LfbTicketService, SubscribeOutcome, TicketVerifier};
