//! Confidential compute capability for sealed-bid auctions.
//!
//! Bid amounts, reserve prices and the running-best bidder live only as
//! ciphertext handles. The capability exposes a small instruction set over
//! those handles:
//!
//! 1. **Encrypt**: turn a plaintext into a fresh handle with no view grants.
//! 2. **Compare**: `greater_than(a, b)` yields an encrypted boolean that can
//!    only feed a `select`.
//! 3. **Select**: `select(cond, a, b)` is the encrypted ternary, a branchless
//!    conditional assignment over opaque values.
//! 4. **Reveal**: a principal holding a view grant on one specific handle
//!    may request its plaintext. Derived handles never inherit grants.
//!
//! [`LocalCoprocessor`] is an in-process implementation that seals every
//! value with AES-256-GCM. Callers that talk to a remote compute service
//! implement [`ConfidentialCompute`] themselves and own the timeout and
//! retry policy at that boundary.

pub mod capability;
pub mod coprocessor;
pub mod error;

pub use capability::ConfidentialCompute;
pub use coprocessor::LocalCoprocessor;
pub use error::ComputeError;
