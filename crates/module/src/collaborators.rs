//! External collaborators consumed by the engine.
//!
//! The asset registry and funds ledger are capability interfaces; the engine
//! assumes they are correct and only orchestrates them. The in-memory
//! implementations are used by tests and by embedders that keep custody in
//! process.

use std::collections::HashMap;
use std::sync::Arc;

use auction_crypto::ConfidentialCompute;
use auction_types::{short_address, Address, AssetId};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::events::EventSink;

/// Errors returned by the asset registry or funds ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("Insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("Sender does not own the asset")]
    NotOwner,

    #[error("Unknown asset {0}")]
    UnknownAsset(AssetId),

    #[error("Balance overflow")]
    Overflow,

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
}

/// Custody of the auctioned assets.
pub trait AssetRegistry: Send + Sync {
    fn transfer(&self, from: &Address, to: &Address, asset: AssetId) -> Result<(), TransferError>;

    fn owner_of(&self, asset: AssetId) -> Option<Address>;
}

/// Custody of funds, including the engine's escrow account.
pub trait FundsLedger: Send + Sync {
    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), TransferError>;

    fn balance_of(&self, account: &Address) -> u64;
}

/// Everything the engine talks to outside its own state.
#[derive(Clone)]
pub struct Collaborators {
    pub compute: Arc<dyn ConfidentialCompute>,
    pub assets: Arc<dyn AssetRegistry>,
    pub funds: Arc<dyn FundsLedger>,
    pub events: Arc<dyn EventSink>,
}

// =========================
// IN-MEMORY COLLABORATORS
// =========================

#[derive(Default)]
struct AssetBook {
    owners: HashMap<AssetId, Address>,
    fail_next: u32,
}

/// Asset registry kept in process memory.
#[derive(Default)]
pub struct InMemoryAssetRegistry {
    inner: Mutex<AssetBook>,
}

impl InMemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new asset owned by `owner`.
    pub fn mint(&self, asset: AssetId, owner: Address) {
        self.inner.lock().owners.insert(asset, owner);
    }

    /// Fail the next `count` transfers with [`TransferError::Unavailable`].
    pub fn fail_next_transfers(&self, count: u32) {
        self.inner.lock().fail_next = count;
    }
}

impl AssetRegistry for InMemoryAssetRegistry {
    fn transfer(&self, from: &Address, to: &Address, asset: AssetId) -> Result<(), TransferError> {
        let mut book = self.inner.lock();

        if book.fail_next > 0 {
            book.fail_next -= 1;
            return Err(TransferError::Unavailable("injected asset failure".into()));
        }

        let owner = book
            .owners
            .get_mut(&asset)
            .ok_or(TransferError::UnknownAsset(asset))?;
        if *owner != *from {
            return Err(TransferError::NotOwner);
        }
        *owner = *to;

        debug!(%asset, from = short_address(from), to = short_address(to), "Asset transferred");
        Ok(())
    }

    fn owner_of(&self, asset: AssetId) -> Option<Address> {
        self.inner.lock().owners.get(&asset).copied()
    }
}

/// One successful funds movement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub from: Address,
    pub to: Address,
    pub amount: u64,
}

#[derive(Default)]
struct Balances {
    accounts: HashMap<Address, u64>,
    history: Vec<TransferRecord>,
    fail_next: u32,
}

/// Funds ledger kept in process memory.
#[derive(Default)]
pub struct InMemoryFundsLedger {
    inner: Mutex<Balances>,
}

impl InMemoryFundsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint funds into an account.
    pub fn credit(&self, account: Address, amount: u64) {
        let mut balances = self.inner.lock();
        let balance = balances.accounts.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Fail the next `count` transfers with [`TransferError::Unavailable`].
    pub fn fail_next_transfers(&self, count: u32) {
        self.inner.lock().fail_next = count;
    }

    /// All successful transfers, oldest first.
    pub fn history(&self) -> Vec<TransferRecord> {
        self.inner.lock().history.clone()
    }
}

impl FundsLedger for InMemoryFundsLedger {
    fn transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), TransferError> {
        let mut balances = self.inner.lock();

        if balances.fail_next > 0 {
            balances.fail_next -= 1;
            return Err(TransferError::Unavailable("injected funds failure".into()));
        }

        let available = balances.accounts.get(from).copied().unwrap_or(0);
        if available < amount {
            return Err(TransferError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        if from != to {
            let receiving = balances.accounts.get(to).copied().unwrap_or(0);
            let credited = receiving
                .checked_add(amount)
                .ok_or(TransferError::Overflow)?;
            balances.accounts.insert(*from, available - amount);
            balances.accounts.insert(*to, credited);
        }

        balances.history.push(TransferRecord {
            from: *from,
            to: *to,
            amount,
        });
        Ok(())
    }

    fn balance_of(&self, account: &Address) -> u64 {
        self.inner.lock().accounts.get(account).copied().unwrap_or(0)
    }
}
