//! In-memory state structures for a single auction.

use std::collections::HashMap;

use auction_types::{Address, AssetId, AuctionId, AuctionStatus, EncryptedValue};

use crate::error::AuctionError;

/// One bidder's current standing bid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidRecord {
    pub bidder: Address,
    /// Amount actually deposited into escrow
    pub amount: u64,
    pub encrypted_amount: EncryptedValue,
    pub refunded: bool,
    /// Position of the bidder's first bid; the tie-break key
    pub rank: u32,
    /// Timestamp of the latest bid
    pub placed_at: u64,
    /// Number of times the bid was replaced
    pub revision: u32,
}

/// Bid records keyed by bidder, plus the roster in first-bid order.
#[derive(Clone, Debug, Default)]
pub struct BidBook {
    records: HashMap<Address, BidRecord>,
    roster: Vec<Address>,
}

impl BidBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, bidder: &Address) -> Option<&BidRecord> {
        self.records.get(bidder)
    }

    pub fn get_mut(&mut self, bidder: &Address) -> Option<&mut BidRecord> {
        self.records.get_mut(bidder)
    }

    pub fn contains(&self, bidder: &Address) -> bool {
        self.records.contains_key(bidder)
    }

    /// Rank the next first-time bidder will receive.
    pub fn next_rank(&self) -> u32 {
        self.roster.len() as u32
    }

    /// Insert a first-time bidder's record and append them to the roster.
    ///
    /// Returns `false` and leaves the book untouched if the bidder already
    /// has a record.
    pub fn insert_new(&mut self, record: BidRecord) -> bool {
        if self.records.contains_key(&record.bidder) {
            return false;
        }
        self.roster.push(record.bidder);
        self.records.insert(record.bidder, record);
        true
    }

    /// Bidders in first-bid order.
    pub fn roster(&self) -> &[Address] {
        &self.roster
    }

    /// Records in first-bid order.
    pub fn iter(&self) -> impl Iterator<Item = &BidRecord> + '_ {
        self.roster
            .iter()
            .filter_map(move |bidder| self.records.get(bidder))
    }

    /// Records whose funds are still held in escrow.
    pub fn active(&self) -> impl Iterator<Item = &BidRecord> + '_ {
        self.iter().filter(|record| !record.refunded)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn len(&self) -> usize {
        self.roster.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }
}

/// Encrypted running-best triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunningBest {
    pub bid: EncryptedValue,
    pub bidder: EncryptedValue,
    /// Rank of the running-best bidder, `u32::MAX` before any bid
    pub rank: EncryptedValue,
}

impl RunningBest {
    pub fn handles(&self) -> [EncryptedValue; 3] {
        [self.bid, self.bidder, self.rank]
    }
}

/// Id carried by an auction until the registry assigns one.
pub const UNASSIGNED_AUCTION_ID: AuctionId = 0;

/// A single auction owned by the registry.
#[derive(Clone, Debug)]
pub struct Auction {
    pub auction_id: AuctionId,
    pub seller: Address,
    pub asset: AssetId,
    pub created_at: u64,
    pub end_time: u64,
    pub reserve_price: EncryptedValue,
    pub status: AuctionStatus,
    pub best: RunningBest,
    /// Set at reveal
    pub winner: Option<Address>,
    /// Set at reveal
    pub winning_bid: Option<u64>,
    pub asset_claimed: bool,
    pub seller_paid: bool,
    /// Set when the encrypted running best disagreed with the bid records.
    /// The auction can then only be unwound: every deposit is refundable
    /// and the seller may take the asset back.
    pub reveal_blocked: bool,
    pub bids: BidBook,
}

impl Auction {
    /// Fail with [`AuctionError::InvalidState`] unless the auction is in
    /// `expected`.
    pub fn require_status(&self, expected: AuctionStatus) -> Result<(), AuctionError> {
        if self.status != expected {
            return Err(AuctionError::InvalidState {
                expected,
                got: self.status,
            });
        }
        Ok(())
    }

    /// Fail unless the outcome has been revealed.
    pub fn require_revealed(&self) -> Result<(), AuctionError> {
        if !self.status.is_revealed() {
            return Err(AuctionError::NotRevealed(self.status));
        }
        Ok(())
    }

    /// Fail unless deposits may be reclaimed: after reveal, or once a
    /// blocked reveal has put the auction into unwinding.
    pub fn require_refundable(&self) -> Result<(), AuctionError> {
        if self.is_unwinding() {
            return Ok(());
        }
        self.require_revealed()
    }

    /// Ended with a blocked reveal.
    pub fn is_unwinding(&self) -> bool {
        self.reveal_blocked && self.status == AuctionStatus::Ended
    }

    /// Whether bids are accepted at `now`.
    pub fn is_open_at(&self, now: u64) -> bool {
        self.status == AuctionStatus::Open && now < self.end_time
    }

    pub fn is_winner(&self, address: &Address) -> bool {
        self.winner.as_ref() == Some(address)
    }

    /// Whether every non-winning bidder has been refunded.
    pub fn losers_refunded(&self) -> bool {
        self.bids
            .active()
            .all(|record| self.is_winner(&record.bidder))
    }
}
