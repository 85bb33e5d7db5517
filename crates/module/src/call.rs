//! Call message types for the auction module.

use auction_types::{Address, AssetId, AuctionId, EncryptedValue};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Call messages for the auction module.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum AuctionCall {
    // === Auction Lifecycle ===
    /// List an asset. The sender must own it.
    CreateAuction {
        asset: AssetId,
        duration: u64,
        reserve_price: u64,
    },

    /// Deposit `amount` and submit its ciphertext. Replaces any earlier bid
    /// by the sender.
    PlaceBid {
        auction_id: AuctionId,
        amount: u64,
        encrypted_amount: EncryptedValue,
    },

    /// Close bidding (seller only).
    EndAuction { auction_id: AuctionId },

    /// Compute and publish the winner (seller only).
    RevealWinner { auction_id: AuctionId },

    // === Settlement ===
    /// Take the asset (winner only).
    ClaimAsset { auction_id: AuctionId },

    /// Recover a losing bid.
    ClaimRefund { auction_id: AuctionId },

    /// Collect the winning bid (seller only).
    ClaimSellerPayment { auction_id: AuctionId },

    /// Take back the asset of an auction that ended without bids.
    ReclaimUnsoldAsset { auction_id: AuctionId },
}

impl AuctionCall {
    /// Target auction, if the call addresses an existing one.
    pub fn auction_id(&self) -> Option<AuctionId> {
        match self {
            AuctionCall::CreateAuction { .. } => None,
            AuctionCall::PlaceBid { auction_id, .. }
            | AuctionCall::EndAuction { auction_id }
            | AuctionCall::RevealWinner { auction_id }
            | AuctionCall::ClaimAsset { auction_id }
            | AuctionCall::ClaimRefund { auction_id }
            | AuctionCall::ClaimSellerPayment { auction_id }
            | AuctionCall::ReclaimUnsoldAsset { auction_id } => Some(*auction_id),
        }
    }
}

/// Result of a successfully dispatched call.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum CallOutcome {
    Created { auction_id: AuctionId },
    BidAccepted,
    Ended,
    WinnerRevealed { winner: Address, winning_bid: u64 },
    AssetClaimed,
    Refunded { amount: u64 },
    SellerPaid { amount: u64 },
    AssetReturned,
}
