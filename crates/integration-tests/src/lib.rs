//! End-to-end integration tests for the sealed-bid auction engine.
//!
//! These tests drive the full auction lifecycle through the registry:
//! 1. Auction creation with the asset taken into escrow
//! 2. Bids with deposits and ciphertexts
//! 3. Ending and revealing the winner
//! 4. Claims and settlement
//!
//! The collaborators are the in-memory asset registry and funds ledger and
//! the local AES-GCM coprocessor.
