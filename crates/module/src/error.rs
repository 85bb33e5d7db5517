//! Auction module error types.

use thiserror::Error;

use auction_crypto::ComputeError;
use auction_types::AuctionStatus;

use crate::collaborators::TransferError;

/// Errors that can occur in the auction module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    #[error("Auction not found: {0}")]
    AuctionNotFound(u64),

    #[error("Invalid state. Expected: {expected}, Got: {got}")]
    InvalidState {
        expected: AuctionStatus,
        got: AuctionStatus,
    },

    #[error("Outcome not revealed yet (status: {0})")]
    NotRevealed(AuctionStatus),

    #[error("Invalid auction duration: {0}")]
    InvalidDuration(u64),

    #[error("Asset transfer failed: {0}")]
    AssetTransferFailed(TransferError),

    #[error("Funds transfer failed: {0}")]
    FundsTransferFailed(TransferError),

    #[error("Bidding period ended")]
    AuctionClosed,

    #[error("Seller cannot bid on own auction")]
    SellerCannotBid,

    #[error("Bid amount must be positive")]
    ZeroBid,

    #[error("Repeat bid must not lower the standing bid")]
    BidNotRaised,

    #[error("Auction end time not reached")]
    TooEarly,

    #[error("Not authorized")]
    NotAuthorized,

    #[error("Auction has no bids")]
    NoBids,

    #[error("Auction has bids")]
    AuctionHasBids,

    #[error("Asset already claimed")]
    AlreadyClaimed,

    #[error("Refund already claimed")]
    AlreadyRefunded,

    #[error("Seller already paid")]
    AlreadyPaid,

    #[error("No bid record")]
    NoBidRecord,

    #[error("Winner cannot claim a refund")]
    WinnerCannotRefund,

    #[error("No winning bid")]
    NoWinningBid,

    #[error("Confidential compute failed: {0}")]
    Compute(#[from] ComputeError),

    #[error("Encrypted running best disagrees with bid records in auction {auction_id}")]
    ConsistencyViolation { auction_id: u64 },
}

/// Broad classes of [`AuctionError`], for callers deciding how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad arguments or wrong lifecycle state. Nothing was mutated.
    Validation,
    /// Caller lacks the role or view grant. Nothing was mutated.
    Authorization,
    /// An external collaborator failed. State was rolled back.
    Collaborator,
    /// Internal disagreement between the encrypted and plaintext paths.
    Consistency,
    NotFound,
}

impl AuctionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuctionError::AuctionNotFound(_) => ErrorKind::NotFound,
            AuctionError::NotAuthorized | AuctionError::Compute(ComputeError::NotAuthorized) => {
                ErrorKind::Authorization
            }
            AuctionError::AssetTransferFailed(_)
            | AuctionError::FundsTransferFailed(_)
            | AuctionError::Compute(_) => ErrorKind::Collaborator,
            AuctionError::ConsistencyViolation { .. } => ErrorKind::Consistency,
            AuctionError::InvalidState { .. }
            | AuctionError::NotRevealed(_)
            | AuctionError::InvalidDuration(_)
            | AuctionError::AuctionClosed
            | AuctionError::SellerCannotBid
            | AuctionError::ZeroBid
            | AuctionError::BidNotRaised
            | AuctionError::TooEarly
            | AuctionError::NoBids
            | AuctionError::AuctionHasBids
            | AuctionError::AlreadyClaimed
            | AuctionError::AlreadyRefunded
            | AuctionError::AlreadyPaid
            | AuctionError::NoBidRecord
            | AuctionError::WinnerCannotRefund
            | AuctionError::NoWinningBid => ErrorKind::Validation,
        }
    }

    /// Whether retrying the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Collaborator
    }
}
