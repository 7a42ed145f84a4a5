//! # Shared Types Crate
//!
//! Domain entities shared by every chain subsystem.
//!
//! ## Clusters
//!
//! - **Chain**: `Block`, `BlockBuilder`, `Transaction`, `NotarizationProof`
//! - **Membership**: `Node`, `NodePool`, `MagicBlock`
//! - **Runtime**: `Context` (cancellation + deadline for suspending calls)
//!
//! ## Design Principles
//!
//! - **Identities over pointers**: blocks reference their predecessor by hash,
//!   rounds by number and magic blocks by starting round. Stores resolve the
//!   identities, so no entity owns another.
//! - **Content addressing**: a block's hash is a pure function of its header
//!   fields and is recomputed on every insert.

pub mod codec;
pub mod context;
pub mod entities;
pub mod errors;
pub mod membership;

pub use codec::{decode, encode};
pub use context::{CancelHandle, Context, ContextError};
pub use entities::*;
pub use errors::*;
pub use membership::*;
