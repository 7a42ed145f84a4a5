//! Signed LFB ticket.

use super::errors::{LfbTicketError, LfbTicketResult};
use serde::{Deserialize, Serialize};
use shared_crypto::{SignatureScheme, SigningKeyPair};
use shared_types::{short_hex, Hash, NodeId, RoundNumber};
use std::fmt;

/// Claim by a sharder that it has finalized `lfb_hash` at `round`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfbTicket {
    pub round: RoundNumber,
    pub sharder_id: NodeId,
    pub lfb_hash: Hash,
    /// Empty for a local bump, which is never sent anywhere.
    pub sign: Vec<u8>,
}

impl LfbTicket {
    /// Ticket for a block this node finalized, signed with its key.
    pub fn signed(
        round: RoundNumber,
        lfb_hash: Hash,
        signer: &dyn SigningKeyPair,
    ) -> LfbTicketResult<Self> {
        let sharder_id = NodeId::from_public_key(&signer.public_key_bytes());
        let payload = Self::signing_payload(round, &sharder_id, &lfb_hash)?;
        Ok(Self {
            round,
            sharder_id,
            lfb_hash,
            sign: signer.sign(&payload),
        })
    }

    /// Unsigned ticket that only raises the local round.
    pub fn bump(round: RoundNumber) -> Self {
        Self {
            round,
            sharder_id: NodeId::default(),
            lfb_hash: shared_types::ZERO_HASH,
            sign: Vec::new(),
        }
    }

    /// Unsigned ticket describing a block this node holds but cannot sign for.
    pub fn unsigned(round: RoundNumber, sharder_id: NodeId, lfb_hash: Hash) -> Self {
        Self {
            round,
            sharder_id,
            lfb_hash,
            sign: Vec::new(),
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.sign.is_empty()
    }

    /// Bytes covered by the signature.
    pub fn signing_payload(
        round: RoundNumber,
        sharder_id: &NodeId,
        lfb_hash: &Hash,
    ) -> LfbTicketResult<Vec<u8>> {
        shared_types::encode(&(round, sharder_id, lfb_hash))
            .map_err(|e| LfbTicketError::Codec(e.to_string()))
    }

    /// Check the signature against the issuer's public key.
    pub fn verify(&self, scheme: &dyn SignatureScheme, public_key: &[u8]) -> LfbTicketResult<()> {
        if !self.is_signed() {
            return Err(LfbTicketError::Unsigned(self.sharder_id));
        }
        let payload = Self::signing_payload(self.round, &self.sharder_id, &self.lfb_hash)?;
        scheme
            .verify(public_key, &payload, &self.sign)
            .map_err(LfbTicketError::InvalidSignature)
    }
}

impl fmt::Debug for LfbTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LfbTicket")
            .field("round", &self.round)
            .field("sharder_id", &self.sharder_id)
            .field("lfb_hash", &short_hex(&self.lfb_hash))
            .field("signed", &self.is_signed())
            .finish()
    }
}
