//! Query handlers for the auction module.
//!
//! These functions provide read-only access to auction state. Queries that
//! expose a bid or a running-best handle are restricted to the principals
//! allowed to see it; a rejected query reveals nothing, not even whether
//! the record exists.

use auction_types::{Address, AssetId, AuctionId, AuctionStatus, EncryptedValue};
use serde::{Deserialize, Serialize};

use crate::error::AuctionError;
use crate::handlers::HandlerResult;
use crate::ledger;
use crate::registry::AuctionRegistry;
use crate::state::Auction;

/// Query request types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionQuery {
    /// Get auction details by ID.
    GetAuction { auction_id: AuctionId },

    /// Get all auctions (paginated).
    ListAuctions { offset: u64, limit: u64 },

    /// Get auctions accepting bids at `now`.
    ActiveAuctions { now: u64 },

    /// Get bidders in first-bid order.
    GetBidders { auction_id: AuctionId },

    /// Check whether an address has bid.
    HasBid { auction_id: AuctionId, bidder: Address },

    /// Get a bidder's deposited amount (that bidder or the seller).
    GetBidAmount { auction_id: AuctionId, bidder: Address },

    /// Get a bidder's ciphertext (that bidder or the seller).
    GetBidCiphertext { auction_id: AuctionId, bidder: Address },

    /// Get the running-best handles (seller only).
    GetRunningBest { auction_id: AuctionId },

    /// Get the reserve price handle (seller only).
    GetReservePrice { auction_id: AuctionId },

    /// Check whether a bidder's refund was claimed.
    GetRefundStatus { auction_id: AuctionId, bidder: Address },

    /// Check whether the seller was paid.
    GetSellerPaid { auction_id: AuctionId },

    /// Get funds held in escrow for the auction (seller only).
    GetEscrowedTotal { auction_id: AuctionId },
}

/// Query response types.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionQueryResponse {
    /// Auction details.
    Auction(AuctionSummary),

    /// List of auctions.
    AuctionList(Vec<AuctionSummary>),

    /// Bidders in first-bid order.
    Bidders(Vec<Address>),

    HasBid(bool),

    BidAmount(u64),

    BidCiphertext(EncryptedValue),

    RunningBest {
        bid: EncryptedValue,
        bidder: EncryptedValue,
    },

    ReservePrice(EncryptedValue),

    Refunded(bool),

    SellerPaid(bool),

    EscrowedTotal(u64),
}

/// Summary of an auction for listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionSummary {
    pub auction_id: AuctionId,
    pub seller: Address,
    pub asset: AssetId,
    pub status: AuctionStatus,
    pub created_at: u64,
    pub end_time: u64,
    pub num_bids: usize,
    /// Set once the winner is revealed
    pub winner: Option<Address>,
    /// Set once the winner is revealed
    pub winning_bid: Option<u64>,
    pub asset_claimed: bool,
    pub seller_paid: bool,
    /// Reveal refused, auction can only be unwound
    pub reveal_blocked: bool,
}

impl AuctionSummary {
    /// Create summary from auction state.
    pub fn from_auction(auction: &Auction) -> Self {
        Self {
            auction_id: auction.auction_id,
            seller: auction.seller,
            asset: auction.asset,
            status: auction.status,
            created_at: auction.created_at,
            end_time: auction.end_time,
            num_bids: auction.bids.len(),
            winner: auction.winner,
            winning_bid: auction.winning_bid,
            asset_claimed: auction.asset_claimed,
            seller_paid: auction.seller_paid,
            reveal_blocked: auction.reveal_blocked,
        }
    }
}

fn require_seller(auction: &Auction, caller: &Address) -> HandlerResult<()> {
    if auction.seller != *caller {
        return Err(AuctionError::NotAuthorized);
    }
    Ok(())
}

fn require_bidder_or_seller(
    auction: &Auction,
    caller: &Address,
    bidder: &Address,
) -> HandlerResult<()> {
    if caller != bidder && auction.seller != *caller {
        return Err(AuctionError::NotAuthorized);
    }
    Ok(())
}

/// Handle a query on behalf of `caller`.
pub fn handle_query(
    registry: &AuctionRegistry,
    caller: &Address,
    query: AuctionQuery,
) -> HandlerResult<AuctionQueryResponse> {
    match query {
        AuctionQuery::GetAuction { auction_id } => registry
            .read_auction(auction_id, AuctionSummary::from_auction)
            .map(AuctionQueryResponse::Auction),

        AuctionQuery::ListAuctions { offset, limit } => Ok(AuctionQueryResponse::AuctionList(
            get_auction_summaries(registry, offset as usize, limit as usize),
        )),

        AuctionQuery::ActiveAuctions { now } => Ok(AuctionQueryResponse::AuctionList(
            get_active_auctions(registry, now),
        )),

        AuctionQuery::GetBidders { auction_id } => registry
            .read_auction(auction_id, |auction| auction.bids.roster().to_vec())
            .map(AuctionQueryResponse::Bidders),

        AuctionQuery::HasBid { auction_id, bidder } => registry
            .read_auction(auction_id, |auction| auction.bids.contains(&bidder))
            .map(AuctionQueryResponse::HasBid),

        AuctionQuery::GetBidAmount { auction_id, bidder } => {
            registry.read_auction(auction_id, |auction| {
                require_bidder_or_seller(auction, caller, &bidder)?;
                auction
                    .bids
                    .get(&bidder)
                    .map(|record| AuctionQueryResponse::BidAmount(record.amount))
                    .ok_or(AuctionError::NoBidRecord)
            })?
        }

        AuctionQuery::GetBidCiphertext { auction_id, bidder } => {
            registry.read_auction(auction_id, |auction| {
                require_bidder_or_seller(auction, caller, &bidder)?;
                auction
                    .bids
                    .get(&bidder)
                    .map(|record| AuctionQueryResponse::BidCiphertext(record.encrypted_amount))
                    .ok_or(AuctionError::NoBidRecord)
            })?
        }

        AuctionQuery::GetRunningBest { auction_id } => {
            registry.read_auction(auction_id, |auction| {
                require_seller(auction, caller)?;
                Ok(AuctionQueryResponse::RunningBest {
                    bid: auction.best.bid,
                    bidder: auction.best.bidder,
                })
            })?
        }

        AuctionQuery::GetReservePrice { auction_id } => {
            registry.read_auction(auction_id, |auction| {
                require_seller(auction, caller)?;
                Ok(AuctionQueryResponse::ReservePrice(auction.reserve_price))
            })?
        }

        AuctionQuery::GetRefundStatus { auction_id, bidder } => {
            registry.read_auction(auction_id, |auction| {
                auction
                    .bids
                    .get(&bidder)
                    .map(|record| AuctionQueryResponse::Refunded(record.refunded))
                    .ok_or(AuctionError::NoBidRecord)
            })?
        }

        AuctionQuery::GetSellerPaid { auction_id } => registry
            .read_auction(auction_id, |auction| auction.seller_paid)
            .map(AuctionQueryResponse::SellerPaid),

        AuctionQuery::GetEscrowedTotal { auction_id } => {
            registry.read_auction(auction_id, |auction| {
                require_seller(auction, caller)?;
                Ok(AuctionQueryResponse::EscrowedTotal(ledger::escrowed_total(
                    auction,
                )))
            })?
        }
    }
}

/// Get auction summaries for listing.
pub fn get_auction_summaries(
    registry: &AuctionRegistry,
    offset: usize,
    limit: usize,
) -> Vec<AuctionSummary> {
    let mut summaries = Vec::new();
    let mut index = 0usize;
    registry.for_each_auction(|auction| {
        if index >= offset && summaries.len() < limit {
            summaries.push(AuctionSummary::from_auction(auction));
        }
        index += 1;
    });
    summaries
}

/// Get active auctions (currently accepting bids).
pub fn get_active_auctions(registry: &AuctionRegistry, now: u64) -> Vec<AuctionSummary> {
    let mut summaries = Vec::new();
    registry.for_each_auction(|auction| {
        if auction.is_open_at(now) {
            summaries.push(AuctionSummary::from_auction(auction));
        }
    });
    summaries
}
