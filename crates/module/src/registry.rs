//! The auction registry.
//!
//! The registry owns every auction and is the only way to mutate one. Each
//! auction sits behind its own mutex, held for the whole of a transition, so
//! calls on the same auction are linearized while calls on different
//! auctions run in parallel. The map lock is only held long enough to look
//! up or insert an auction.

use std::collections::BTreeMap;
use std::sync::Arc;

use auction_types::{short_address, Address, AssetId, AuctionEvent, AuctionId, EncryptedValue};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::call::{AuctionCall, CallOutcome};
use crate::collaborators::Collaborators;
use crate::config::{ConfigError, EngineConfig};
use crate::error::AuctionError;
use crate::handlers::{self, CallContext, HandlerResult};
use crate::state::Auction;

type AuctionCell = Arc<Mutex<Auction>>;

/// Owner of all auctions and sole mutation point.
pub struct AuctionRegistry {
    config: EngineConfig,
    collaborators: Collaborators,
    auctions: RwLock<BTreeMap<AuctionId, AuctionCell>>,
    /// Taken only once an auction is fully built, so ids are consumed on insert
    next_auction_id: Mutex<AuctionId>,
}

impl AuctionRegistry {
    /// Create an empty registry.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self, ConfigError> {
        config.validate()?;
        info!(
            first_auction_id = config.first_auction_id,
            min_duration = config.min_duration,
            "Auction registry initialized"
        );
        Ok(Self {
            next_auction_id: Mutex::new(config.first_auction_id),
            config,
            collaborators,
            auctions: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Apply a call on behalf of `ctx.sender`.
    pub fn dispatch(&self, ctx: &CallContext, call: AuctionCall) -> HandlerResult<CallOutcome> {
        debug!(auction_id = ?call.auction_id(), "Dispatching call");
        match call {
            AuctionCall::CreateAuction {
                asset,
                duration,
                reserve_price,
            } => self
                .create_auction(ctx, asset, duration, reserve_price)
                .map(|auction_id| CallOutcome::Created { auction_id }),

            AuctionCall::PlaceBid {
                auction_id,
                amount,
                encrypted_amount,
            } => self
                .place_bid(ctx, auction_id, amount, encrypted_amount)
                .map(|()| CallOutcome::BidAccepted),

            AuctionCall::EndAuction { auction_id } => self
                .end_auction(ctx, auction_id)
                .map(|()| CallOutcome::Ended),

            AuctionCall::RevealWinner { auction_id } => self
                .reveal_winner(ctx, auction_id)
                .map(|(winner, winning_bid)| CallOutcome::WinnerRevealed {
                    winner,
                    winning_bid,
                }),

            AuctionCall::ClaimAsset { auction_id } => self
                .claim_asset(ctx, auction_id)
                .map(|()| CallOutcome::AssetClaimed),

            AuctionCall::ClaimRefund { auction_id } => self
                .claim_refund(ctx, auction_id)
                .map(|amount| CallOutcome::Refunded { amount }),

            AuctionCall::ClaimSellerPayment { auction_id } => self
                .claim_seller_payment(ctx, auction_id)
                .map(|amount| CallOutcome::SellerPaid { amount }),

            AuctionCall::ReclaimUnsoldAsset { auction_id } => self
                .reclaim_unsold_asset(ctx, auction_id)
                .map(|()| CallOutcome::AssetReturned),
        }
    }

    /// Create an auction and return its id.
    pub fn create_auction(
        &self,
        ctx: &CallContext,
        asset: AssetId,
        duration: u64,
        reserve_price: u64,
    ) -> HandlerResult<AuctionId> {
        let mut auction = handlers::handle_create_auction(
            ctx,
            &self.collaborators,
            &self.config,
            asset,
            duration,
            reserve_price,
        )?;

        let mut next_id = self.next_auction_id.lock();
        let auction_id = *next_id;
        auction.auction_id = auction_id;
        let event = AuctionEvent::AuctionCreated {
            auction_id,
            seller: auction.seller,
            asset: auction.asset,
            end_time: auction.end_time,
        };
        let end_time = auction.end_time;
        self.auctions
            .write()
            .insert(auction_id, Arc::new(Mutex::new(auction)));
        *next_id += 1;
        drop(next_id);

        info!(
            auction_id,
            seller = short_address(&ctx.sender),
            %asset,
            end_time,
            "Auction created"
        );
        self.collaborators.events.emit(&event);
        Ok(auction_id)
    }

    pub fn place_bid(
        &self,
        ctx: &CallContext,
        auction_id: AuctionId,
        amount: u64,
        encrypted_amount: EncryptedValue,
    ) -> HandlerResult<()> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_place_bid(
                auction,
                ctx,
                &self.collaborators,
                &self.config,
                amount,
                encrypted_amount,
            )
        })
    }

    pub fn end_auction(&self, ctx: &CallContext, auction_id: AuctionId) -> HandlerResult<()> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_end_auction(auction, ctx, &self.collaborators)
        })
    }

    pub fn reveal_winner(
        &self,
        ctx: &CallContext,
        auction_id: AuctionId,
    ) -> HandlerResult<(Address, u64)> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_reveal_winner(auction, ctx, &self.collaborators, &self.config)
        })
    }

    pub fn claim_asset(&self, ctx: &CallContext, auction_id: AuctionId) -> HandlerResult<()> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_claim_asset(auction, ctx, &self.collaborators, &self.config)
        })
    }

    pub fn claim_refund(&self, ctx: &CallContext, auction_id: AuctionId) -> HandlerResult<u64> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_claim_refund(auction, ctx, &self.collaborators, &self.config)
        })
    }

    pub fn claim_seller_payment(
        &self,
        ctx: &CallContext,
        auction_id: AuctionId,
    ) -> HandlerResult<u64> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_claim_seller_payment(auction, ctx, &self.collaborators, &self.config)
        })
    }

    pub fn reclaim_unsold_asset(
        &self,
        ctx: &CallContext,
        auction_id: AuctionId,
    ) -> HandlerResult<()> {
        self.with_auction(auction_id, |auction| {
            handlers::handle_reclaim_unsold_asset(auction, ctx, &self.collaborators, &self.config)
        })
    }

    fn cell(&self, auction_id: AuctionId) -> HandlerResult<AuctionCell> {
        self.auctions
            .read()
            .get(&auction_id)
            .cloned()
            .ok_or(AuctionError::AuctionNotFound(auction_id))
    }

    /// Run `f` with exclusive access to one auction.
    fn with_auction<R>(
        &self,
        auction_id: AuctionId,
        f: impl FnOnce(&mut Auction) -> HandlerResult<R>,
    ) -> HandlerResult<R> {
        let cell = self.cell(auction_id)?;
        let mut auction = cell.lock();
        f(&mut *auction)
    }

    /// Run `f` with read access to one auction.
    pub fn read_auction<R>(
        &self,
        auction_id: AuctionId,
        f: impl FnOnce(&Auction) -> R,
    ) -> HandlerResult<R> {
        let cell = self.cell(auction_id)?;
        let auction = cell.lock();
        Ok(f(&*auction))
    }

    /// Apply `f` to every auction in id order, one lock at a time.
    pub fn for_each_auction(&self, mut f: impl FnMut(&Auction)) {
        let cells: Vec<AuctionCell> = self.auctions.read().values().cloned().collect();
        for cell in cells {
            f(&*cell.lock());
        }
    }

    /// Ids of all auctions, ascending.
    pub fn auction_ids(&self) -> Vec<AuctionId> {
        self.auctions.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.auctions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.auctions.read().is_empty()
    }
}
