//! Core type definitions for sealed-bid auctions.
//!
//! This crate provides the shared data structures used across the auction
//! engine: participant identities, ciphertext handles for the confidential
//! compute capability, lifecycle states and observable events.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

// =========================
// IDENTITIES
// =========================

/// Generic address type (32 bytes)
pub type Address = [u8; 32];

/// The null address, used as the initial running-best bidder.
pub const NULL_ADDRESS: Address = [0u8; 32];

/// Auction identifier, assigned monotonically by the registry.
pub type AuctionId = u64;

/// Reference to an asset held by the external asset registry.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset#{}", self.0)
    }
}

// =========================
// CIPHERTEXT HANDLES
// =========================

/// Opaque reference to a value held by the confidential compute capability.
///
/// The bytes carry no information about the value; they only name it.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Handle(pub [u8; 32]);

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({})", self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(&self.0[..8]))
    }
}

/// Kind of plaintext a handle refers to.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum ValueKind {
    /// Unsigned integer (bid amounts, reserve prices, ranks)
    Uint,
    /// Boolean (comparison results)
    Bool,
    /// Participant address
    Address,
}

/// A value before encryption or after an authorized reveal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum Plaintext {
    Uint(u128),
    Bool(bool),
    Address(Address),
}

impl Plaintext {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Plaintext::Uint(_) => ValueKind::Uint,
            Plaintext::Bool(_) => ValueKind::Bool,
            Plaintext::Address(_) => ValueKind::Address,
        }
    }

    /// Fixed-width encoding: one tag byte followed by 32 value bytes.
    pub fn to_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        match self {
            Plaintext::Uint(v) => {
                out[0] = 0;
                out[1..17].copy_from_slice(&v.to_le_bytes());
            }
            Plaintext::Bool(b) => {
                out[0] = 1;
                out[1] = *b as u8;
            }
            Plaintext::Address(a) => {
                out[0] = 2;
                out[1..].copy_from_slice(a);
            }
        }
        out
    }

    /// Decode the encoding produced by [`Plaintext::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != 33 {
            return None;
        }
        match bytes[0] {
            0 => {
                let mut v = [0u8; 16];
                v.copy_from_slice(&bytes[1..17]);
                Some(Plaintext::Uint(u128::from_le_bytes(v)))
            }
            1 => match bytes[1] {
                0 => Some(Plaintext::Bool(false)),
                1 => Some(Plaintext::Bool(true)),
                _ => None,
            },
            2 => {
                let mut a = [0u8; 32];
                a.copy_from_slice(&bytes[1..]);
                Some(Plaintext::Address(a))
            }
            _ => None,
        }
    }
}

/// An encrypted value: a handle plus the kind of plaintext behind it.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EncryptedValue {
    pub handle: Handle,
    pub kind: ValueKind,
}

/// Encrypted boolean produced by comparisons.
///
/// It cannot be read directly; it is only usable as a `select` condition or
/// as a `select` operand of kind [`ValueKind::Bool`].
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct EncryptedBool(EncryptedValue);

impl EncryptedBool {
    /// Wrap a value of kind `Bool`. Returns `None` for other kinds.
    pub fn from_value(value: EncryptedValue) -> Option<Self> {
        (value.kind == ValueKind::Bool).then_some(Self(value))
    }

    /// The underlying encrypted value.
    pub fn as_value(&self) -> &EncryptedValue {
        &self.0
    }

    pub fn handle(&self) -> Handle {
        self.0.handle
    }
}

// =========================
// AUCTION TYPES
// =========================

/// Auction lifecycle state
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum AuctionStatus {
    /// Being set up; never observable once creation commits
    Created,
    /// Accepting bids
    Open,
    /// Bidding closed, winner not yet computed
    Ended,
    /// Winner public, claims in progress
    WinnerRevealed,
    /// Asset claimed, seller paid and all losing bids refunded
    Settled,
}

impl AuctionStatus {
    /// Whether the outcome is public (claims may run).
    pub fn is_revealed(&self) -> bool {
        matches!(self, AuctionStatus::WinnerRevealed | AuctionStatus::Settled)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuctionStatus::Created => "created",
            AuctionStatus::Open => "open",
            AuctionStatus::Ended => "ended",
            AuctionStatus::WinnerRevealed => "winner_revealed",
            AuctionStatus::Settled => "settled",
        };
        f.write_str(s)
    }
}

// =========================
// EVENTS
// =========================

/// State transitions observable by external consumers.
///
/// No event carries a bid amount.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum AuctionEvent {
    AuctionCreated {
        auction_id: AuctionId,
        seller: Address,
        asset: AssetId,
        end_time: u64,
    },
    BidPlaced {
        auction_id: AuctionId,
        bidder: Address,
    },
    AuctionEnded {
        auction_id: AuctionId,
    },
    WinnerRevealed {
        auction_id: AuctionId,
        winner: Address,
    },
    AssetClaimed {
        auction_id: AuctionId,
        winner: Address,
    },
    RefundClaimed {
        auction_id: AuctionId,
        bidder: Address,
    },
    SellerPaid {
        auction_id: AuctionId,
    },
    AuctionSettled {
        auction_id: AuctionId,
    },
    /// The encrypted running best disagreed with the bid records. The
    /// auction can now only be unwound.
    RevealBlocked {
        auction_id: AuctionId,
    },
    /// Unsold asset returned to the seller.
    AssetReturned {
        auction_id: AuctionId,
        seller: Address,
    },
}

impl AuctionEvent {
    /// The auction this event belongs to.
    pub fn auction_id(&self) -> AuctionId {
        match self {
            AuctionEvent::AuctionCreated { auction_id, .. }
            | AuctionEvent::BidPlaced { auction_id, .. }
            | AuctionEvent::AuctionEnded { auction_id }
            | AuctionEvent::WinnerRevealed { auction_id, .. }
            | AuctionEvent::AssetClaimed { auction_id, .. }
            | AuctionEvent::RefundClaimed { auction_id, .. }
            | AuctionEvent::SellerPaid { auction_id }
            | AuctionEvent::AuctionSettled { auction_id }
            | AuctionEvent::RevealBlocked { auction_id }
            | AuctionEvent::AssetReturned { auction_id, .. } => *auction_id,
        }
    }

    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            AuctionEvent::AuctionCreated { .. } => "auction_created",
            AuctionEvent::BidPlaced { .. } => "bid_placed",
            AuctionEvent::AuctionEnded { .. } => "auction_ended",
            AuctionEvent::WinnerRevealed { .. } => "winner_revealed",
            AuctionEvent::AssetClaimed { .. } => "asset_claimed",
            AuctionEvent::RefundClaimed { .. } => "refund_claimed",
            AuctionEvent::SellerPaid { .. } => "seller_paid",
            AuctionEvent::AuctionSettled { .. } => "auction_settled",
            AuctionEvent::RevealBlocked { .. } => "reveal_blocked",
            AuctionEvent::AssetReturned { .. } => "asset_returned",
        }
    }
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Short hex form of an address for log fields.
pub fn short_address(address: &Address) -> String {
    hex::encode(&address[..8])
}
