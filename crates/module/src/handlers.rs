//! Call handlers for the auction module.
//!
//! These functions implement the lifecycle of a single auction:
//! `Created -> Open -> Ended -> WinnerRevealed -> Settled`. Each handler
//! validates its preconditions before touching any collaborator, so
//! validation and authorization failures never mutate anything. Collaborator
//! failures leave the auction as it was before the call.
//!
//! The caller (normally [`AuctionRegistry`](crate::registry::AuctionRegistry))
//! must hold the auction's lock for the duration of a handler.

use auction_crypto::{ComputeError, ConfidentialCompute};
use auction_types::{
    short_address, Address, AssetId, AuctionEvent, AuctionStatus, EncryptedBool, EncryptedValue,
    Plaintext, ValueKind, NULL_ADDRESS,
};
use tracing::{debug, error, info, warn};

use crate::collaborators::{Collaborators, TransferError};
use crate::config::EngineConfig;
use crate::error::AuctionError;
use crate::ledger;
use crate::state::{Auction, BidBook, RunningBest, UNASSIGNED_AUCTION_ID};

/// Context provided by the runtime for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallContext {
    /// Sender of the call
    pub sender: Address,
    /// Current timestamp (seconds)
    pub timestamp: u64,
}

impl CallContext {
    pub fn new(sender: Address, timestamp: u64) -> Self {
        Self { sender, timestamp }
    }
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, AuctionError>;

/// Handles created during a call, released unless kept.
#[derive(Default)]
struct Scratch {
    handles: Vec<EncryptedValue>,
}

impl Scratch {
    fn track(&mut self, value: EncryptedValue) -> EncryptedValue {
        self.handles.push(value);
        value
    }

    fn track_bool(&mut self, value: EncryptedBool) -> EncryptedBool {
        self.handles.push(*value.as_value());
        value
    }

    /// Stop tracking `kept`; they outlive the call.
    fn keep(&mut self, kept: &[EncryptedValue]) {
        self.handles.retain(|value| !kept.contains(value));
    }

    fn release_all(self, compute: &dyn ConfidentialCompute) {
        release_best_effort(compute, &self.handles);
    }
}

/// Release handles, logging failures. Releasing a handle also drops its
/// view grants.
fn release_best_effort(compute: &dyn ConfidentialCompute, values: &[EncryptedValue]) {
    for value in values {
        if let Err(e) = compute.release(value) {
            debug!(handle = %value.handle, error = %e, "Could not release handle");
        }
    }
}

/// Encrypt the reserve and the empty running best, and grant the seller
/// and the engine their views.
fn initial_encrypted_state(
    compute: &dyn ConfidentialCompute,
    scratch: &mut Scratch,
    reserve_price: u64,
    seller: Address,
    escrow: Address,
) -> Result<(EncryptedValue, RunningBest), ComputeError> {
    let reserve = scratch.track(compute.encrypt_amount(reserve_price)?);
    let best = RunningBest {
        bid: scratch.track(compute.encrypt_amount(0)?),
        bidder: scratch.track(compute.encrypt_address(NULL_ADDRESS)?),
        rank: scratch.track(compute.encrypt(Plaintext::Uint(u32::MAX as u128))?),
    };

    compute.grant_view(&reserve, seller)?;
    grant_running_best(compute, &best, seller, escrow)?;
    Ok((reserve, best))
}

/// Seller sees the running-best bid and bidder; the engine also sees the rank.
fn grant_running_best(
    compute: &dyn ConfidentialCompute,
    best: &RunningBest,
    seller: Address,
    escrow: Address,
) -> Result<(), ComputeError> {
    compute.grant_view(&best.bid, seller)?;
    compute.grant_view(&best.bidder, seller)?;
    compute.grant_view(&best.bid, escrow)?;
    compute.grant_view(&best.bidder, escrow)?;
    compute.grant_view(&best.rank, escrow)?;
    Ok(())
}

/// Handle CreateAuction call.
///
/// Returns the new auction in state `Open`, carrying
/// [`UNASSIGNED_AUCTION_ID`] until the registry gives it an id. The asset is
/// in escrow once this returns `Ok`; on error it is still with the seller.
pub fn handle_create_auction(
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
    asset: AssetId,
    duration: u64,
    reserve_price: u64,
) -> HandlerResult<Auction> {
    let seller = ctx.sender;
    let escrow = config.escrow_account;

    // Validate duration
    if duration == 0 || duration < config.min_duration || duration > config.max_duration {
        return Err(AuctionError::InvalidDuration(duration));
    }
    let end_time = ctx
        .timestamp
        .checked_add(duration)
        .ok_or(AuctionError::InvalidDuration(duration))?;

    if seller == escrow {
        return Err(AuctionError::NotAuthorized);
    }

    // Check ownership before anything is encrypted
    match collaborators.assets.owner_of(asset) {
        Some(owner) if owner == seller => {}
        Some(_) => return Err(AuctionError::AssetTransferFailed(TransferError::NotOwner)),
        None => {
            return Err(AuctionError::AssetTransferFailed(
                TransferError::UnknownAsset(asset),
            ))
        }
    }

    // Initial encrypted state, prepared before taking custody
    let compute = collaborators.compute.as_ref();
    let mut scratch = Scratch::default();
    let prepared = initial_encrypted_state(compute, &mut scratch, reserve_price, seller, escrow);

    let (reserve_price, best) = match prepared {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!(%asset, error = %e, "Auction creation aborted by compute failure");
            scratch.release_all(compute);
            return Err(e.into());
        }
    };

    // Take custody of the asset
    if let Err(e) = collaborators.assets.transfer(&seller, &escrow, asset) {
        warn!(%asset, error = %e, "Asset custody transfer failed");
        scratch.release_all(compute);
        return Err(AuctionError::AssetTransferFailed(e));
    }

    let mut auction = Auction {
        auction_id: UNASSIGNED_AUCTION_ID,
        seller,
        asset,
        created_at: ctx.timestamp,
        end_time,
        reserve_price,
        status: AuctionStatus::Created,
        best,
        winner: None,
        winning_bid: None,
        asset_claimed: false,
        seller_paid: false,
        reveal_blocked: false,
        bids: BidBook::new(),
    };
    auction.status = AuctionStatus::Open;

    debug!(seller = short_address(&seller), %asset, end_time, "Auction prepared");

    Ok(auction)
}

/// Compute the running-best triple after a bid of `amount` by the bidder
/// with `rank`, without ever branching on a secret.
///
/// The bid wins if it is strictly greater than the current best, or equal
/// to it with an earlier rank. Every handle created, the new triple
/// included, is recorded in `scratch`.
fn next_running_best(
    compute: &dyn ConfidentialCompute,
    scratch: &mut Scratch,
    current: &RunningBest,
    amount: &EncryptedValue,
    bidder: Address,
    rank: u32,
) -> Result<RunningBest, ComputeError> {
    let enc_bidder = scratch.track(compute.encrypt_address(bidder)?);
    let enc_rank = scratch.track(compute.encrypt(Plaintext::Uint(rank as u128))?);
    let yes = scratch.track_bool(compute.encrypt_bool(true)?);
    let no = scratch.track_bool(compute.encrypt_bool(false)?);

    let is_greater = scratch.track_bool(compute.greater_than(amount, &current.bid)?);
    let is_lower = scratch.track_bool(compute.greater_than(&current.bid, amount)?);
    let not_lower = scratch.track_bool(compute.select_bool(&is_lower, &no, &yes)?);
    let is_tie = scratch.track_bool(compute.select_bool(&is_greater, &no, &not_lower)?);
    let is_earlier = scratch.track_bool(compute.greater_than(&current.rank, &enc_rank)?);
    let wins_tie = scratch.track_bool(compute.select_bool(&is_tie, &is_earlier, &no)?);
    let wins = scratch.track_bool(compute.select_bool(&is_greater, &yes, &wins_tie)?);

    Ok(RunningBest {
        bid: scratch.track(compute.select(&wins, amount, &current.bid)?),
        bidder: scratch.track(compute.select(&wins, &enc_bidder, &current.bidder)?),
        rank: scratch.track(compute.select(&wins, &enc_rank, &current.rank)?),
    })
}

/// Handle PlaceBid call.
///
/// `amount` is deposited into escrow; `encrypted_amount` is the bidder's
/// ciphertext of the same value and feeds the encrypted running best. The
/// bidder must already hold a view grant on it, i.e. it must be their own
/// input (see [`ConfidentialCompute::encrypt_amount_for`]).
pub fn handle_place_bid(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
    amount: u64,
    encrypted_amount: EncryptedValue,
) -> HandlerResult<()> {
    let auction_id = auction.auction_id;
    let bidder = ctx.sender;
    let escrow = config.escrow_account;

    if !auction.is_open_at(ctx.timestamp) {
        return Err(AuctionError::AuctionClosed);
    }
    if bidder == auction.seller {
        return Err(AuctionError::SellerCannotBid);
    }
    if bidder == escrow {
        return Err(AuctionError::NotAuthorized);
    }
    if amount == 0 {
        return Err(AuctionError::ZeroBid);
    }

    let standing = auction.bids.get(&bidder);
    if let Some(record) = standing {
        if amount < record.amount {
            return Err(AuctionError::BidNotRaised);
        }
    }
    if encrypted_amount.kind != ValueKind::Uint {
        return Err(ComputeError::KindMismatch {
            expected: ValueKind::Uint,
            got: encrypted_amount.kind,
        }
        .into());
    }
    let rank = standing
        .map(|record| record.rank)
        .unwrap_or_else(|| auction.bids.next_rank());

    let compute = collaborators.compute.as_ref();
    if !compute.can_view(&encrypted_amount, bidder)? {
        warn!(
            auction_id,
            bidder = short_address(&bidder),
            handle = %encrypted_amount.handle,
            "Bid ciphertext is not the bidder's own"
        );
        return Err(AuctionError::NotAuthorized);
    }

    // Encrypted update first: nothing below runs unless it fully succeeds.
    let mut scratch = Scratch::default();
    let staged = next_running_best(
        compute,
        &mut scratch,
        &auction.best,
        &encrypted_amount,
        bidder,
        rank,
    )
    .and_then(|next| {
        grant_running_best(compute, &next, auction.seller, escrow)?;
        Ok(next)
    });
    let next = match staged {
        Ok(next) => next,
        Err(e) => {
            warn!(
                auction_id,
                bidder = short_address(&bidder),
                error = %e,
                "Bid rejected by compute failure"
            );
            scratch.release_all(compute);
            return Err(e.into());
        }
    };
    scratch.keep(&next.handles());
    scratch.release_all(compute);
    debug!(auction_id, best_bid = %next.bid.handle, "Running best computed");

    let record = match ledger::record_bid(
        auction,
        collaborators.funds.as_ref(),
        &escrow,
        bidder,
        amount,
        encrypted_amount,
        ctx.timestamp,
    ) {
        Ok(record) => record,
        Err(e) => {
            warn!(
                auction_id,
                bidder = short_address(&bidder),
                error = %e,
                "Bid rejected by funds failure"
            );
            release_best_effort(compute, &next.handles());
            return Err(e);
        }
    };

    let replaced = std::mem::replace(&mut auction.best, next);
    release_best_effort(compute, &replaced.handles());

    info!(
        auction_id,
        bidder = short_address(&bidder),
        revision = record.revision,
        "Bid placed"
    );
    collaborators
        .events
        .emit(&AuctionEvent::BidPlaced { auction_id, bidder });

    Ok(())
}

/// Handle EndAuction call.
pub fn handle_end_auction(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
) -> HandlerResult<()> {
    if ctx.timestamp < auction.end_time {
        return Err(AuctionError::TooEarly);
    }
    auction.require_status(AuctionStatus::Open)?;
    if ctx.sender != auction.seller {
        return Err(AuctionError::NotAuthorized);
    }

    auction.status = AuctionStatus::Ended;

    info!(
        auction_id = auction.auction_id,
        bidders = auction.bids.len(),
        "Auction ended"
    );
    collaborators.events.emit(&AuctionEvent::AuctionEnded {
        auction_id: auction.auction_id,
    });

    Ok(())
}

/// Highest amount among bids still in escrow, ties broken in favor of the
/// earliest bidder.
pub fn determine_winner(bids: &BidBook) -> Option<(Address, u64)> {
    let mut best: Option<(Address, u64)> = None;
    for record in bids.active() {
        match best {
            Some((_, amount)) if record.amount <= amount => {}
            _ => best = Some((record.bidder, record.amount)),
        }
    }
    best
}

/// Handle RevealWinner call.
///
/// The winner comes from the bid records. The engine then reveals the
/// encrypted running best and refuses to proceed if the two disagree. A
/// disagreement blocks the reveal for good and puts the auction into
/// unwinding: every bidder may reclaim their deposit and the seller their
/// asset.
pub fn handle_reveal_winner(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> HandlerResult<(Address, u64)> {
    let auction_id = auction.auction_id;

    auction.require_status(AuctionStatus::Ended)?;
    if ctx.sender != auction.seller {
        return Err(AuctionError::NotAuthorized);
    }
    if auction.reveal_blocked {
        return Err(AuctionError::ConsistencyViolation { auction_id });
    }
    let (winner, winning_bid) = determine_winner(&auction.bids).ok_or(AuctionError::NoBids)?;

    let compute = collaborators.compute.as_ref();
    let engine = config.escrow_account;
    let encrypted_bid = compute.reveal_amount(&auction.best.bid, engine)?;
    let encrypted_bidder = compute.reveal_address(&auction.best.bidder, engine)?;

    if encrypted_bid != winning_bid as u128 || encrypted_bidder != winner {
        auction.reveal_blocked = true;
        error!(
            auction_id,
            "Encrypted running best disagrees with bid records, reveal blocked"
        );
        collaborators
            .events
            .emit(&AuctionEvent::RevealBlocked { auction_id });
        return Err(AuctionError::ConsistencyViolation { auction_id });
    }

    auction.winner = Some(winner);
    auction.winning_bid = Some(winning_bid);
    auction.status = AuctionStatus::WinnerRevealed;

    info!(
        auction_id,
        winner = short_address(&winner),
        winning_bid,
        "Winner revealed"
    );
    collaborators
        .events
        .emit(&AuctionEvent::WinnerRevealed { auction_id, winner });

    Ok((winner, winning_bid))
}

/// Handle ClaimAsset call.
pub fn handle_claim_asset(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> HandlerResult<()> {
    let auction_id = auction.auction_id;
    let asset = auction.asset;

    auction.require_revealed()?;
    let winner = match auction.winner {
        Some(winner) if winner == ctx.sender => winner,
        _ => return Err(AuctionError::NotAuthorized),
    };

    let txn = ledger::mark_asset_claimed(auction)?;
    collaborators
        .assets
        .transfer(&config.escrow_account, &winner, asset)
        .map_err(|e| {
            warn!(auction_id, %asset, error = %e, "Asset claim transfer failed");
            AuctionError::AssetTransferFailed(e)
        })?;
    txn.commit();

    info!(auction_id, winner = short_address(&winner), %asset, "Asset claimed");
    collaborators
        .events
        .emit(&AuctionEvent::AssetClaimed { auction_id, winner });

    maybe_settle(auction, collaborators);
    Ok(())
}

/// Handle ClaimRefund call. Returns the refunded amount.
pub fn handle_claim_refund(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> HandlerResult<u64> {
    let auction_id = auction.auction_id;
    let bidder = ctx.sender;

    auction.require_refundable()?;

    let (amount, txn) = ledger::mark_refunded(auction, &bidder)?;
    collaborators
        .funds
        .transfer(&config.escrow_account, &bidder, amount)
        .map_err(|e| {
            warn!(
                auction_id,
                bidder = short_address(&bidder),
                error = %e,
                "Refund transfer failed"
            );
            AuctionError::FundsTransferFailed(e)
        })?;
    txn.commit();

    info!(auction_id, bidder = short_address(&bidder), "Refund claimed");
    collaborators
        .events
        .emit(&AuctionEvent::RefundClaimed { auction_id, bidder });

    maybe_settle(auction, collaborators);
    Ok(amount)
}

/// Handle ClaimSellerPayment call. Returns the amount paid.
pub fn handle_claim_seller_payment(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> HandlerResult<u64> {
    let auction_id = auction.auction_id;
    let seller = auction.seller;

    auction.require_revealed()?;
    if ctx.sender != seller {
        return Err(AuctionError::NotAuthorized);
    }

    let (amount, txn) = ledger::mark_seller_paid(auction)?;
    collaborators
        .funds
        .transfer(&config.escrow_account, &seller, amount)
        .map_err(|e| {
            warn!(auction_id, error = %e, "Seller payment transfer failed");
            AuctionError::FundsTransferFailed(e)
        })?;
    txn.commit();

    info!(auction_id, seller = short_address(&seller), "Seller paid");
    collaborators
        .events
        .emit(&AuctionEvent::SellerPaid { auction_id });

    maybe_settle(auction, collaborators);
    Ok(amount)
}

/// Handle ReclaimUnsoldAsset call.
///
/// Returns the asset of an ended auction to its seller. Allowed when the
/// auction received no bids, or when its reveal was blocked. The auction
/// settles once no deposit is left in escrow.
pub fn handle_reclaim_unsold_asset(
    auction: &mut Auction,
    ctx: &CallContext,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> HandlerResult<()> {
    let auction_id = auction.auction_id;
    let seller = auction.seller;
    let asset = auction.asset;

    auction.require_status(AuctionStatus::Ended)?;
    if ctx.sender != seller {
        return Err(AuctionError::NotAuthorized);
    }
    if !auction.reveal_blocked && auction.bids.active_count() > 0 {
        return Err(AuctionError::AuctionHasBids);
    }

    let txn = ledger::mark_asset_claimed(auction)?;
    collaborators
        .assets
        .transfer(&config.escrow_account, &seller, asset)
        .map_err(|e| {
            warn!(auction_id, %asset, error = %e, "Unsold asset return failed");
            AuctionError::AssetTransferFailed(e)
        })?;
    txn.commit();

    info!(auction_id, seller = short_address(&seller), %asset, "Unsold asset returned");
    collaborators
        .events
        .emit(&AuctionEvent::AssetReturned { auction_id, seller });

    maybe_settle(auction, collaborators);
    Ok(())
}

/// Move an auction to `Settled` once nothing is left in escrow.
fn maybe_settle(auction: &mut Auction, collaborators: &Collaborators) {
    let done = match auction.status {
        AuctionStatus::WinnerRevealed => {
            auction.asset_claimed && auction.seller_paid && auction.losers_refunded()
        }
        // Unsold or unwound: the asset went back to the seller
        AuctionStatus::Ended => auction.asset_claimed && auction.bids.active_count() == 0,
        _ => false,
    };
    if !done {
        return;
    }

    auction.status = AuctionStatus::Settled;
    info!(auction_id = auction.auction_id, "Auction settled");
    collaborators.events.emit(&AuctionEvent::AuctionSettled {
        auction_id: auction.auction_id,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use auction_crypto::LocalCoprocessor;

    use crate::collaborators::{
        AssetRegistry, FundsLedger, InMemoryAssetRegistry, InMemoryFundsLedger,
    };
    use crate::events::EventLog;

    const SELLER: Address = [1u8; 32];
    const ALICE: Address = [2u8; 32];
    const BOB: Address = [3u8; 32];
    const CAROL: Address = [4u8; 32];
    const ASSET: AssetId = AssetId(7);

    struct TestEnv {
        compute: Arc<LocalCoprocessor>,
        assets: Arc<InMemoryAssetRegistry>,
        funds: Arc<InMemoryFundsLedger>,
        events: Arc<EventLog>,
        collaborators: Collaborators,
        config: EngineConfig,
    }

    fn setup() -> TestEnv {
        let compute = Arc::new(LocalCoprocessor::from_seed([9u8; 32]));
        let assets = Arc::new(InMemoryAssetRegistry::new());
        let funds = Arc::new(InMemoryFundsLedger::new());
        let events = Arc::new(EventLog::new());

        assets.mint(ASSET, SELLER);
        for bidder in [ALICE, BOB, CAROL] {
            funds.credit(bidder, 1_000);
        }

        let collaborators = Collaborators {
            compute: compute.clone(),
            assets: assets.clone(),
            funds: funds.clone(),
            events: events.clone(),
        };

        TestEnv {
            compute,
            assets,
            funds,
            events,
            collaborators,
            config: EngineConfig::default(),
        }
    }

    fn test_context(sender: Address, timestamp: u64) -> CallContext {
        CallContext::new(sender, timestamp)
    }

    fn open_auction(env: &TestEnv) -> Auction {
        let mut auction = handle_create_auction(
            &test_context(SELLER, 0),
            &env.collaborators,
            &env.config,
            ASSET,
            1000,
            50,
        )
        .unwrap();
        auction.auction_id = 1;
        auction
    }

    fn bid(env: &TestEnv, auction: &mut Auction, bidder: Address, amount: u64) -> HandlerResult<()> {
        let encrypted = env.compute.encrypt_amount_for(amount, bidder).unwrap();
        handle_place_bid(
            auction,
            &test_context(bidder, 10),
            &env.collaborators,
            &env.config,
            amount,
            encrypted,
        )
    }

    fn end_and_reveal(env: &TestEnv, auction: &mut Auction) -> HandlerResult<(Address, u64)> {
        handle_end_auction(auction, &test_context(SELLER, 1000), &env.collaborators)?;
        handle_reveal_winner(
            auction,
            &test_context(SELLER, 1001),
            &env.collaborators,
            &env.config,
        )
    }

    fn engine_view(env: &TestEnv, auction: &Auction) -> (u128, Address) {
        let engine = env.config.escrow_account;
        (
            env.compute.reveal_amount(&auction.best.bid, engine).unwrap(),
            env.compute
                .reveal_address(&auction.best.bidder, engine)
                .unwrap(),
        )
    }

    #[test]
    fn test_create_auction() {
        let env = setup();
        let auction = open_auction(&env);

        assert_eq!(auction.status, AuctionStatus::Open);
        assert_eq!(auction.end_time, 1000);
        assert_eq!(env.assets.owner_of(ASSET), Some(env.config.escrow_account));
        assert_eq!(
            env.compute
                .reveal_amount(&auction.reserve_price, SELLER)
                .unwrap(),
            50
        );
        assert_eq!(engine_view(&env, &auction), (0, NULL_ADDRESS));
    }

    #[test]
    fn test_create_auction_invalid_duration() {
        let env = setup();
        let ctx = test_context(SELLER, 0);

        let result = handle_create_auction(&ctx, &env.collaborators, &env.config, ASSET, 0, 50);
        assert!(matches!(result, Err(AuctionError::InvalidDuration(0))));

        let ctx = test_context(SELLER, u64::MAX - 1);
        let result = handle_create_auction(&ctx, &env.collaborators, &env.config, ASSET, 10, 50);
        assert!(matches!(result, Err(AuctionError::InvalidDuration(10))));

        let config = EngineConfig {
            max_duration: 100,
            ..EngineConfig::default()
        };
        let result = handle_create_auction(&ctx, &env.collaborators, &config, ASSET, 101, 50);
        assert!(matches!(result, Err(AuctionError::InvalidDuration(101))));

        assert_eq!(env.assets.owner_of(ASSET), Some(SELLER));
    }

    #[test]
    fn test_create_auction_requires_owner() {
        let env = setup();
        let result = handle_create_auction(
            &test_context(ALICE, 0),
            &env.collaborators,
            &env.config,
            ASSET,
            1000,
            50,
        );
        assert!(matches!(
            result,
            Err(AuctionError::AssetTransferFailed(TransferError::NotOwner))
        ));
    }

    #[test]
    fn test_create_auction_compute_failure_keeps_asset() {
        let env = setup();
        env.compute.set_available(false);

        let result = handle_create_auction(
            &test_context(SELLER, 0),
            &env.collaborators,
            &env.config,
            ASSET,
            1000,
            50,
        );
        assert!(matches!(
            result,
            Err(AuctionError::Compute(ComputeError::Unavailable))
        ));
        assert_eq!(env.assets.owner_of(ASSET), Some(SELLER));
    }

    #[test]
    fn test_create_auction_asset_failure() {
        let env = setup();
        env.assets.fail_next_transfers(1);

        let result = handle_create_auction(
            &test_context(SELLER, 0),
            &env.collaborators,
            &env.config,
            ASSET,
            1000,
            50,
        );
        assert!(matches!(result, Err(AuctionError::AssetTransferFailed(_))));
        assert_eq!(env.assets.owner_of(ASSET), Some(SELLER));
    }

    #[test]
    fn test_place_bid_validation() {
        let env = setup();
        let mut auction = open_auction(&env);

        assert!(matches!(
            bid(&env, &mut auction, SELLER, 10),
            Err(AuctionError::SellerCannotBid)
        ));
        assert!(matches!(
            bid(&env, &mut auction, ALICE, 0),
            Err(AuctionError::ZeroBid)
        ));

        let flag = env.compute.encrypt_bool(true).unwrap();
        let result = handle_place_bid(
            &mut auction,
            &test_context(ALICE, 10),
            &env.collaborators,
            &env.config,
            10,
            *flag.as_value(),
        );
        assert!(matches!(
            result,
            Err(AuctionError::Compute(ComputeError::KindMismatch { .. }))
        ));

        let encrypted = env.compute.encrypt_amount_for(10, ALICE).unwrap();
        let result = handle_place_bid(
            &mut auction,
            &test_context(ALICE, 1000),
            &env.collaborators,
            &env.config,
            10,
            encrypted,
        );
        assert!(matches!(result, Err(AuctionError::AuctionClosed)));

        assert!(auction.bids.is_empty());
        assert!(env.events.for_auction(1).is_empty());
    }

    #[test]
    fn test_repeat_bid_must_not_lower() {
        let env = setup();
        let mut auction = open_auction(&env);

        bid(&env, &mut auction, ALICE, 100).unwrap();
        assert!(matches!(
            bid(&env, &mut auction, ALICE, 99),
            Err(AuctionError::BidNotRaised)
        ));
        bid(&env, &mut auction, ALICE, 100).unwrap();
        assert_eq!(auction.bids.get(&ALICE).unwrap().revision, 1);
    }

    #[test]
    fn test_running_best_tracks_max() {
        let env = setup();
        let mut auction = open_auction(&env);

        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 80).unwrap();
        assert_eq!(engine_view(&env, &auction), (100, ALICE));

        bid(&env, &mut auction, ALICE, 120).unwrap();
        assert_eq!(engine_view(&env, &auction), (120, ALICE));

        bid(&env, &mut auction, CAROL, 121).unwrap();
        assert_eq!(engine_view(&env, &auction), (121, CAROL));
    }

    #[test]
    fn test_running_best_tie_goes_to_earliest() {
        let env = setup();
        let mut auction = open_auction(&env);

        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 100).unwrap();
        assert_eq!(engine_view(&env, &auction), (100, ALICE));

        // Bob raises, then Alice matches: Alice's first bid came earlier.
        bid(&env, &mut auction, BOB, 150).unwrap();
        bid(&env, &mut auction, ALICE, 150).unwrap();
        assert_eq!(engine_view(&env, &auction), (150, ALICE));
        assert_eq!(determine_winner(&auction.bids), Some((ALICE, 150)));
    }

    #[test]
    fn test_view_grants() {
        let env = setup();
        let mut auction = open_auction(&env);

        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 80).unwrap();

        let alice_bid = auction.bids.get(&ALICE).unwrap().encrypted_amount;
        let bob_bid = auction.bids.get(&BOB).unwrap().encrypted_amount;

        assert_eq!(env.compute.reveal_amount(&alice_bid, ALICE).unwrap(), 100);
        assert!(matches!(
            env.compute.reveal_amount(&alice_bid, BOB),
            Err(ComputeError::NotAuthorized)
        ));
        assert!(matches!(
            env.compute.reveal_amount(&bob_bid, SELLER),
            Err(ComputeError::NotAuthorized)
        ));
        assert_eq!(
            env.compute.reveal_amount(&auction.best.bid, SELLER).unwrap(),
            100
        );
        assert!(matches!(
            env.compute.reveal_amount(&auction.best.bid, BOB),
            Err(ComputeError::NotAuthorized)
        ));
    }

    #[test]
    fn test_compute_failure_leaves_auction_unchanged() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 100).unwrap();
        let best_before = auction.best;

        let encrypted = env.compute.encrypt_amount_for(200, BOB).unwrap();
        env.compute.fail_after(5);
        let result = handle_place_bid(
            &mut auction,
            &test_context(BOB, 10),
            &env.collaborators,
            &env.config,
            200,
            encrypted,
        );
        assert!(matches!(
            result,
            Err(AuctionError::Compute(ComputeError::Unavailable))
        ));
        assert_eq!(auction.best, best_before);
        assert!(!auction.bids.contains(&BOB));
        assert_eq!(env.funds.balance_of(&BOB), 1_000);

        env.compute.set_available(true);
        bid(&env, &mut auction, BOB, 200).unwrap();
        assert_eq!(engine_view(&env, &auction), (200, BOB));
    }

    #[test]
    fn test_funds_failure_leaves_running_best() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 100).unwrap();
        let best_before = auction.best;

        env.funds.fail_next_transfers(1);
        assert!(matches!(
            bid(&env, &mut auction, BOB, 200),
            Err(AuctionError::FundsTransferFailed(_))
        ));
        assert_eq!(auction.best, best_before);
        assert_eq!(engine_view(&env, &auction), (100, ALICE));
    }

    #[test]
    fn test_end_auction_rules() {
        let env = setup();
        let mut auction = open_auction(&env);

        assert!(matches!(
            handle_end_auction(&mut auction, &test_context(SELLER, 999), &env.collaborators),
            Err(AuctionError::TooEarly)
        ));
        assert!(matches!(
            handle_end_auction(&mut auction, &test_context(ALICE, 1000), &env.collaborators),
            Err(AuctionError::NotAuthorized)
        ));
        handle_end_auction(&mut auction, &test_context(SELLER, 1000), &env.collaborators).unwrap();
        assert_eq!(auction.status, AuctionStatus::Ended);
        assert!(matches!(
            handle_end_auction(&mut auction, &test_context(SELLER, 1000), &env.collaborators),
            Err(AuctionError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_reveal_requires_bids() {
        let env = setup();
        let mut auction = open_auction(&env);

        assert!(matches!(
            end_and_reveal(&env, &mut auction),
            Err(AuctionError::NoBids)
        ));
        assert_eq!(auction.status, AuctionStatus::Ended);
        assert!(auction.winner.is_none());
    }

    #[test]
    fn test_reveal_blocked_on_mismatch() {
        let env = setup();
        let mut auction = open_auction(&env);

        // Deposits 100 but encrypts 500.
        let encrypted = env.compute.encrypt_amount_for(500, ALICE).unwrap();
        handle_place_bid(
            &mut auction,
            &test_context(ALICE, 10),
            &env.collaborators,
            &env.config,
            100,
            encrypted,
        )
        .unwrap();

        assert!(matches!(
            end_and_reveal(&env, &mut auction),
            Err(AuctionError::ConsistencyViolation { auction_id: 1 })
        ));
        assert_eq!(auction.status, AuctionStatus::Ended);
        assert!(auction.winner.is_none());
    }

    #[test]
    fn test_blocked_reveal_unwinds_escrow() {
        let env = setup();
        let mut auction = open_auction(&env);
        let ctx = |who| test_context(who, 2000);

        bid(&env, &mut auction, ALICE, 500).unwrap();
        // Deposits 1 but encrypts far more.
        let oversized = env.compute.encrypt_amount_for(900, BOB).unwrap();
        handle_place_bid(
            &mut auction,
            &test_context(BOB, 10),
            &env.collaborators,
            &env.config,
            1,
            oversized,
        )
        .unwrap();

        assert!(matches!(
            end_and_reveal(&env, &mut auction),
            Err(AuctionError::ConsistencyViolation { auction_id: 1 })
        ));
        assert!(auction.reveal_blocked);

        // Stays blocked without consulting the coprocessor again.
        env.compute.set_available(false);
        assert!(matches!(
            handle_reveal_winner(&mut auction, &ctx(SELLER), &env.collaborators, &env.config),
            Err(AuctionError::ConsistencyViolation { auction_id: 1 })
        ));
        env.compute.set_available(true);

        assert!(matches!(
            handle_claim_asset(&mut auction, &ctx(ALICE), &env.collaborators, &env.config),
            Err(AuctionError::NotRevealed(AuctionStatus::Ended))
        ));
        assert!(matches!(
            handle_claim_seller_payment(&mut auction, &ctx(SELLER), &env.collaborators, &env.config),
            Err(AuctionError::NotRevealed(AuctionStatus::Ended))
        ));

        assert_eq!(
            handle_claim_refund(&mut auction, &ctx(ALICE), &env.collaborators, &env.config)
                .unwrap(),
            500
        );
        handle_reclaim_unsold_asset(&mut auction, &ctx(SELLER), &env.collaborators, &env.config)
            .unwrap();
        assert_eq!(env.assets.owner_of(ASSET), Some(SELLER));
        assert_eq!(auction.status, AuctionStatus::Ended);

        assert_eq!(
            handle_claim_refund(&mut auction, &ctx(BOB), &env.collaborators, &env.config).unwrap(),
            1
        );
        assert_eq!(auction.status, AuctionStatus::Settled);
        assert_eq!(env.funds.balance_of(&ALICE), 1_000);
        assert_eq!(env.funds.balance_of(&BOB), 1_000);
        assert_eq!(env.funds.balance_of(&env.config.escrow_account), 0);

        let names: Vec<&str> = env
            .events
            .for_auction(1)
            .iter()
            .map(|event| event.name())
            .collect();
        assert!(names.contains(&"reveal_blocked"));
        assert_eq!(names.last(), Some(&"auction_settled"));
    }

    #[test]
    fn test_bid_with_foreign_ciphertext_rejected() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 700).unwrap();
        let alice_bid = auction.bids.get(&ALICE).unwrap().encrypted_amount;
        let best_before = auction.best;

        let result = handle_place_bid(
            &mut auction,
            &test_context(CAROL, 10),
            &env.collaborators,
            &env.config,
            1,
            alice_bid,
        );
        assert!(matches!(result, Err(AuctionError::NotAuthorized)));
        assert!(matches!(
            env.compute.reveal_amount(&alice_bid, CAROL),
            Err(ComputeError::NotAuthorized)
        ));
        assert!(!auction.bids.contains(&CAROL));
        assert_eq!(auction.best, best_before);
        assert_eq!(env.funds.balance_of(&CAROL), 1_000);

        // A ciphertext nobody was granted is rejected as well.
        let orphan = env.compute.encrypt_amount(5).unwrap();
        let result = handle_place_bid(
            &mut auction,
            &test_context(BOB, 10),
            &env.collaborators,
            &env.config,
            5,
            orphan,
        );
        assert!(matches!(result, Err(AuctionError::NotAuthorized)));
    }

    #[test]
    fn test_bids_release_intermediate_handles() {
        let env = setup();
        let mut auction = open_auction(&env);
        // Reserve plus the running-best triple
        assert_eq!(env.compute.len(), 4);

        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 80).unwrap();
        bid(&env, &mut auction, ALICE, 120).unwrap();
        // One submitted ciphertext per bid survives
        assert_eq!(env.compute.len(), 7);

        env.funds.fail_next_transfers(1);
        assert!(bid(&env, &mut auction, CAROL, 130).is_err());
        assert_eq!(env.compute.len(), 8);
        assert_eq!(engine_view(&env, &auction), (120, ALICE));
    }

    #[test]
    fn test_reveal_compute_failure_is_retryable() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 100).unwrap();
        handle_end_auction(&mut auction, &test_context(SELLER, 1000), &env.collaborators).unwrap();

        env.compute.set_available(false);
        let err = handle_reveal_winner(
            &mut auction,
            &test_context(SELLER, 1000),
            &env.collaborators,
            &env.config,
        )
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(auction.status, AuctionStatus::Ended);

        env.compute.set_available(true);
        let outcome = handle_reveal_winner(
            &mut auction,
            &test_context(SELLER, 1000),
            &env.collaborators,
            &env.config,
        )
        .unwrap();
        assert_eq!(outcome, (ALICE, 100));
    }

    #[test]
    fn test_full_settlement() {
        let env = setup();
        let mut auction = open_auction(&env);
        let escrow = env.config.escrow_account;

        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 80).unwrap();
        bid(&env, &mut auction, ALICE, 120).unwrap();
        assert_eq!(env.funds.balance_of(&escrow), 200);

        assert_eq!(end_and_reveal(&env, &mut auction).unwrap(), (ALICE, 120));
        assert_eq!(auction.status, AuctionStatus::WinnerRevealed);

        let ctx = |who| test_context(who, 2000);
        assert!(matches!(
            handle_claim_refund(&mut auction, &ctx(ALICE), &env.collaborators, &env.config),
            Err(AuctionError::WinnerCannotRefund)
        ));
        assert!(matches!(
            handle_claim_asset(&mut auction, &ctx(BOB), &env.collaborators, &env.config),
            Err(AuctionError::NotAuthorized)
        ));

        let refund =
            handle_claim_refund(&mut auction, &ctx(BOB), &env.collaborators, &env.config).unwrap();
        assert_eq!(refund, 80);
        assert!(matches!(
            handle_claim_refund(&mut auction, &ctx(BOB), &env.collaborators, &env.config),
            Err(AuctionError::AlreadyRefunded)
        ));

        handle_claim_asset(&mut auction, &ctx(ALICE), &env.collaborators, &env.config).unwrap();
        assert_eq!(env.assets.owner_of(ASSET), Some(ALICE));
        assert_eq!(auction.status, AuctionStatus::WinnerRevealed);

        let paid =
            handle_claim_seller_payment(&mut auction, &ctx(SELLER), &env.collaborators, &env.config)
                .unwrap();
        assert_eq!(paid, 120);
        assert_eq!(auction.status, AuctionStatus::Settled);

        assert!(matches!(
            handle_claim_seller_payment(&mut auction, &ctx(SELLER), &env.collaborators, &env.config),
            Err(AuctionError::AlreadyPaid)
        ));
        assert!(matches!(
            handle_claim_asset(&mut auction, &ctx(ALICE), &env.collaborators, &env.config),
            Err(AuctionError::AlreadyClaimed)
        ));

        assert_eq!(env.funds.balance_of(&SELLER), 120);
        assert_eq!(env.funds.balance_of(&BOB), 1_000);
        assert_eq!(env.funds.balance_of(&ALICE), 880);
        assert_eq!(env.funds.balance_of(&escrow), 0);

        let events = env.events.for_auction(1);
        assert_eq!(
            events.last(),
            Some(&AuctionEvent::AuctionSettled { auction_id: 1 })
        );
    }

    #[test]
    fn test_failed_claims_roll_back_flags() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 100).unwrap();
        bid(&env, &mut auction, BOB, 80).unwrap();
        end_and_reveal(&env, &mut auction).unwrap();
        let ctx = |who| test_context(who, 2000);

        env.funds.fail_next_transfers(1);
        assert!(matches!(
            handle_claim_refund(&mut auction, &ctx(BOB), &env.collaborators, &env.config),
            Err(AuctionError::FundsTransferFailed(_))
        ));
        assert!(!auction.bids.get(&BOB).unwrap().refunded);

        env.funds.fail_next_transfers(1);
        assert!(handle_claim_seller_payment(
            &mut auction,
            &ctx(SELLER),
            &env.collaborators,
            &env.config
        )
        .is_err());
        assert!(!auction.seller_paid);

        env.assets.fail_next_transfers(1);
        assert!(
            handle_claim_asset(&mut auction, &ctx(ALICE), &env.collaborators, &env.config).is_err()
        );
        assert!(!auction.asset_claimed);

        assert_eq!(
            handle_claim_refund(&mut auction, &ctx(BOB), &env.collaborators, &env.config).unwrap(),
            80
        );
    }

    #[test]
    fn test_claims_require_reveal() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, BOB, 80).unwrap();

        assert!(matches!(
            handle_claim_refund(
                &mut auction,
                &test_context(BOB, 10),
                &env.collaborators,
                &env.config
            ),
            Err(AuctionError::NotRevealed(AuctionStatus::Open))
        ));
    }

    #[test]
    fn test_reclaim_unsold_asset() {
        let env = setup();
        let mut auction = open_auction(&env);
        handle_end_auction(&mut auction, &test_context(SELLER, 1000), &env.collaborators).unwrap();

        assert!(matches!(
            handle_reclaim_unsold_asset(
                &mut auction,
                &test_context(ALICE, 1000),
                &env.collaborators,
                &env.config
            ),
            Err(AuctionError::NotAuthorized)
        ));
        handle_reclaim_unsold_asset(
            &mut auction,
            &test_context(SELLER, 1000),
            &env.collaborators,
            &env.config,
        )
        .unwrap();

        assert_eq!(auction.status, AuctionStatus::Settled);
        assert_eq!(env.assets.owner_of(ASSET), Some(SELLER));
    }

    #[test]
    fn test_reclaim_rejected_with_bids() {
        let env = setup();
        let mut auction = open_auction(&env);
        bid(&env, &mut auction, ALICE, 100).unwrap();
        handle_end_auction(&mut auction, &test_context(SELLER, 1000), &env.collaborators).unwrap();

        assert!(matches!(
            handle_reclaim_unsold_asset(
                &mut auction,
                &test_context(SELLER, 1000),
                &env.collaborators,
                &env.config
            ),
            Err(AuctionError::AuctionHasBids)
        ));
    }
}
