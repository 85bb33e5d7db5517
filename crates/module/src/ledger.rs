//! Money-side bookkeeping for a single auction.
//!
//! The ledger owns bid records and the refund/payment/claim flags, and
//! drives the funds collaborator. Flags that guard an outgoing transfer are
//! set through a [`FlagTxn`] so that a failed transfer never leaves them
//! set.

use auction_types::{short_address, Address, EncryptedValue};
use tracing::{debug, error, warn};

use crate::collaborators::FundsLedger;
use crate::error::AuctionError;
use crate::handlers::HandlerResult;
use crate::state::{Auction, BidRecord};

/// Scoped update of a boolean flag.
///
/// The flag is set when the transaction begins and reset on drop unless
/// [`commit`](FlagTxn::commit) was called.
#[must_use = "the flag is rolled back unless the transaction is committed"]
pub struct FlagTxn<'a> {
    flag: &'a mut bool,
    committed: bool,
}

impl<'a> FlagTxn<'a> {
    fn begin(flag: &'a mut bool) -> Self {
        *flag = true;
        Self {
            flag,
            committed: false,
        }
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for FlagTxn<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *self.flag = false;
        }
    }
}

/// Record a bid, moving funds into escrow.
///
/// A repeat bid first refunds the bidder's previous amount, then debits the
/// new one, so the old and new amounts are never escrowed together. If the
/// debit fails the refund is reversed. On any error the auction is left as
/// it was, except when the reversal itself fails: the record is then marked
/// refunded, since the funds are back with the bidder.
pub fn record_bid(
    auction: &mut Auction,
    funds: &dyn FundsLedger,
    escrow: &Address,
    bidder: Address,
    amount: u64,
    encrypted_amount: EncryptedValue,
    now: u64,
) -> HandlerResult<BidRecord> {
    let auction_id = auction.auction_id;
    let previous = auction
        .bids
        .get(&bidder)
        .filter(|record| !record.refunded)
        .map(|record| record.amount);

    if let Some(previous) = previous {
        funds
            .transfer(escrow, &bidder, previous)
            .map_err(AuctionError::FundsTransferFailed)?;
        debug!(
            auction_id,
            bidder = short_address(&bidder),
            "Previous bid refunded"
        );
    }

    if let Err(e) = funds.transfer(&bidder, escrow, amount) {
        if let Some(previous) = previous {
            warn!(
                auction_id,
                bidder = short_address(&bidder),
                error = %e,
                "Bid debit failed, restoring previous bid"
            );
            if let Err(compensation) = funds.transfer(&bidder, escrow, previous) {
                error!(
                    auction_id,
                    bidder = short_address(&bidder),
                    error = %compensation,
                    "Could not restore previous bid; record marked refunded"
                );
                if let Some(record) = auction.bids.get_mut(&bidder) {
                    record.refunded = true;
                }
            }
        }
        return Err(AuctionError::FundsTransferFailed(e));
    }

    let record = match auction.bids.get_mut(&bidder) {
        Some(record) => {
            record.amount = amount;
            record.encrypted_amount = encrypted_amount;
            record.refunded = false;
            record.placed_at = now;
            record.revision += 1;
            record.clone()
        }
        None => {
            let record = BidRecord {
                bidder,
                amount,
                encrypted_amount,
                refunded: false,
                rank: auction.bids.next_rank(),
                placed_at: now,
                revision: 0,
            };
            auction.bids.insert_new(record.clone());
            record
        }
    };

    debug!(
        auction_id,
        bidder = short_address(&bidder),
        revision = record.revision,
        "Bid escrowed"
    );
    Ok(record)
}

/// Begin marking `bidder`'s record refunded. Returns the amount to send
/// back and the pending flag update.
pub fn mark_refunded<'a>(
    auction: &'a mut Auction,
    bidder: &Address,
) -> HandlerResult<(u64, FlagTxn<'a>)> {
    if !auction.bids.contains(bidder) {
        return Err(AuctionError::NoBidRecord);
    }
    if auction.is_winner(bidder) {
        return Err(AuctionError::WinnerCannotRefund);
    }

    let record = auction
        .bids
        .get_mut(bidder)
        .ok_or(AuctionError::NoBidRecord)?;
    if record.refunded {
        return Err(AuctionError::AlreadyRefunded);
    }

    let amount = record.amount;
    Ok((amount, FlagTxn::begin(&mut record.refunded)))
}

/// Begin marking the seller paid. Returns the winning amount and the
/// pending flag update.
pub fn mark_seller_paid(auction: &mut Auction) -> HandlerResult<(u64, FlagTxn<'_>)> {
    if auction.seller_paid {
        return Err(AuctionError::AlreadyPaid);
    }
    let amount = match auction.winning_bid {
        Some(amount) if amount > 0 => amount,
        _ => return Err(AuctionError::NoWinningBid),
    };
    Ok((amount, FlagTxn::begin(&mut auction.seller_paid)))
}

/// Begin marking the asset released from escrow.
pub fn mark_asset_claimed(auction: &mut Auction) -> HandlerResult<FlagTxn<'_>> {
    if auction.asset_claimed {
        return Err(AuctionError::AlreadyClaimed);
    }
    Ok(FlagTxn::begin(&mut auction.asset_claimed))
}

/// Funds currently held in escrow for this auction.
pub fn escrowed_total(auction: &Auction) -> u64 {
    let held = auction
        .bids
        .active()
        .fold(0u64, |total, record| total.saturating_add(record.amount));
    match (auction.seller_paid, auction.winning_bid) {
        (true, Some(paid)) => held.saturating_sub(paid),
        _ => held,
    }
}
