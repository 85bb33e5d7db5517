//! Sealed-bid auction settlement engine.
//!
//! Sellers list an asset, bidders deposit funds together with a ciphertext
//! of their bid, and the engine keeps an encrypted running maximum using
//! only the `greater_than` and `select` operations of the confidential
//! compute capability. At reveal time the winner is taken from the
//! plaintext bid records and cross-checked against the encrypted result.
//!
//! # Architecture
//!
//! - `call`: Message types for state-changing operations
//! - `handlers`: Lifecycle transitions of a single auction
//! - `ledger`: Bid records, escrow movements and claim flags
//! - `registry`: Ownership of all auctions and per-auction locking
//! - `queries`: Read-only, authorization-gated state access
//! - `events`: Sinks for committed transitions
//! - `collaborators`: Asset registry and funds ledger interfaces
//! - `config`: Engine configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```ignore
//! use auction_module::{AuctionCall, AuctionRegistry, CallContext, EngineConfig};
//!
//! let registry = AuctionRegistry::new(EngineConfig::default(), collaborators)?;
//!
//! // Create an auction
//! let ctx = CallContext::new(seller, now);
//! let auction_id = registry.create_auction(&ctx, asset, 1000, reserve)?;
//!
//! // Place a bid
//! let call = AuctionCall::PlaceBid { auction_id, amount, encrypted_amount };
//! registry.dispatch(&CallContext::new(bidder, now), call)?;
//! ```

pub mod call;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod ledger;
pub mod queries;
pub mod registry;
pub mod state;

pub use call::{AuctionCall, CallOutcome};
pub use collaborators::{
    AssetRegistry, Collaborators, FundsLedger, InMemoryAssetRegistry, InMemoryFundsLedger,
    TransferError,
};
pub use config::{ConfigError, EngineConfig};
pub use error::{AuctionError, ErrorKind};
pub use events::{EventLog, EventSink, MultiSink, NoopSink, RecordedEvent, TracingSink};
pub use handlers::{CallContext, HandlerResult};
pub use queries::{handle_query, AuctionQuery, AuctionQueryResponse, AuctionSummary};
pub use registry::AuctionRegistry;
pub use state::{Auction, BidBook, BidRecord, RunningBest};
