//! In-process confidential compute backed by AES-256-GCM.
//!
//! Every value is stored sealed under a coprocessor key derived with
//! HKDF-SHA256 from a random seed:
//!
//! 1. Encode the plaintext as a fixed-width 33-byte record
//! 2. Sample a fresh 96-bit nonce
//! 3. Derive the handle as H(domain || sequence || nonce)
//! 4. Encrypt the record with AES-GCM, binding handle and kind as AAD
//!
//! Operations unseal their operands, compute, and seal the result under a
//! new handle. Plaintexts leave the coprocessor only through
//! [`request_reveal`](ConfidentialCompute::request_reveal), which checks the
//! per-handle view grants and audits the reveal.

use std::collections::{HashMap, HashSet};

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use auction_types::{
    short_address, Address, EncryptedBool, EncryptedValue, Handle, Plaintext, ValueKind,
};

use crate::capability::ConfidentialCompute;
use crate::error::ComputeError;

const HANDLE_DOMAIN: &[u8] = b"AUCTION_HANDLE_V1:";
const KDF_SALT: &[u8] = b"AUCTION_COPROCESSOR_SALT_V1";
const KDF_INFO: &[u8] = b"aes-256-gcm sealing key";

/// A sealed value and the principals allowed to reveal it.
struct SealedEntry {
    kind: ValueKind,
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
    viewers: HashSet<Address>,
}

struct Inner {
    entries: HashMap<Handle, SealedEntry>,
    sequence: u64,
    available: bool,
    /// Operations left before the service goes down, if limited.
    remaining_ops: Option<u64>,
}

impl Inner {
    fn admit(&mut self) -> Result<(), ComputeError> {
        if !self.available {
            return Err(ComputeError::Unavailable);
        }
        if let Some(remaining) = self.remaining_ops.as_mut() {
            if *remaining == 0 {
                self.available = false;
                return Err(ComputeError::Unavailable);
            }
            *remaining -= 1;
        }
        Ok(())
    }
}

/// In-process coprocessor holding sealed values.
pub struct LocalCoprocessor {
    key: [u8; 32],
    inner: Mutex<Inner>,
}

impl Default for LocalCoprocessor {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCoprocessor {
    /// Create a coprocessor with a random sealing seed.
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Create a coprocessor from a fixed seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), &seed);
        let mut key = [0u8; 32];
        if hk.expand(KDF_INFO, &mut key).is_err() {
            // Unreachable for a 32-byte output
            key = Sha256::digest(seed).into();
        }

        Self {
            key,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                sequence: 0,
                available: true,
                remaining_ops: None,
            }),
        }
    }

    /// Simulate the compute service going down or coming back.
    ///
    /// Bringing the service back also clears any [`fail_after`](Self::fail_after) budget.
    pub fn set_available(&self, available: bool) {
        let mut inner = self.inner.lock();
        inner.available = available;
        inner.remaining_ops = None;
        info!(available, "Coprocessor availability changed");
    }

    /// Allow `ops` more operations, then fail every call with
    /// [`ComputeError::Unavailable`].
    pub fn fail_after(&self, ops: u64) {
        self.inner.lock().remaining_ops = Some(ops);
    }

    /// Number of handles held.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cipher(&self) -> Result<Aes256Gcm, ComputeError> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|e| ComputeError::Sealing(format!("Failed to create cipher: {}", e)))
    }

    fn seal(&self, inner: &mut Inner, value: Plaintext) -> Result<EncryptedValue, ComputeError> {
        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);

        inner.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(HANDLE_DOMAIN);
        hasher.update(inner.sequence.to_le_bytes());
        hasher.update(nonce_bytes);
        let handle = Handle(hasher.finalize().into());

        let kind = value.kind();
        let aad = associated_data(&handle, kind);
        let ciphertext = self
            .cipher()?
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &value.to_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|e| ComputeError::Sealing(format!("AES-GCM encryption failed: {}", e)))?;

        inner.entries.insert(
            handle,
            SealedEntry {
                kind,
                nonce: nonce_bytes,
                ciphertext,
                viewers: HashSet::new(),
            },
        );

        Ok(EncryptedValue { handle, kind })
    }

    fn unseal(&self, inner: &Inner, value: &EncryptedValue) -> Result<Plaintext, ComputeError> {
        let entry = inner
            .entries
            .get(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?;

        if entry.kind != value.kind {
            return Err(ComputeError::KindMismatch {
                expected: entry.kind,
                got: value.kind,
            });
        }

        let aad = associated_data(&value.handle, entry.kind);
        let bytes = self
            .cipher()?
            .decrypt(
                Nonce::from_slice(&entry.nonce),
                Payload {
                    msg: &entry.ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| ComputeError::Sealing("Authentication failed".into()))?;

        Plaintext::from_bytes(&bytes)
            .ok_or_else(|| ComputeError::Sealing("Malformed plaintext record".into()))
    }
}

fn associated_data(handle: &Handle, kind: ValueKind) -> [u8; 33] {
    let mut aad = [0u8; 33];
    aad[..32].copy_from_slice(&handle.0);
    aad[32] = match kind {
        ValueKind::Uint => 0,
        ValueKind::Bool => 1,
        ValueKind::Address => 2,
    };
    aad
}

fn expect_uint(value: Plaintext) -> Result<u128, ComputeError> {
    match value {
        Plaintext::Uint(v) => Ok(v),
        other => Err(ComputeError::KindMismatch {
            expected: ValueKind::Uint,
            got: other.kind(),
        }),
    }
}

/// Branchless byte-wise choice between two encodings of the same kind.
fn choose(cond: bool, if_true: &[u8; 33], if_false: &[u8; 33]) -> [u8; 33] {
    let mask = 0u8.wrapping_sub(cond as u8);
    let mut out = [0u8; 33];
    for (o, (t, f)) in out.iter_mut().zip(if_true.iter().zip(if_false.iter())) {
        *o = (t & mask) | (f & !mask);
    }
    out
}

impl ConfidentialCompute for LocalCoprocessor {
    fn encrypt(&self, value: Plaintext) -> Result<EncryptedValue, ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;
        let encrypted = self.seal(&mut inner, value)?;
        debug!(handle = %encrypted.handle, kind = ?encrypted.kind, "Encrypted value");
        Ok(encrypted)
    }

    fn greater_than(
        &self,
        lhs: &EncryptedValue,
        rhs: &EncryptedValue,
    ) -> Result<EncryptedBool, ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;

        let a = expect_uint(self.unseal(&inner, lhs)?)?;
        let b = expect_uint(self.unseal(&inner, rhs)?)?;

        let result = self.seal(&mut inner, Plaintext::Bool(a > b))?;
        debug!(lhs = %lhs.handle, rhs = %rhs.handle, result = %result.handle, "Computed greater_than");

        EncryptedBool::from_value(result).ok_or(ComputeError::KindMismatch {
            expected: ValueKind::Bool,
            got: result.kind,
        })
    }

    fn select(
        &self,
        cond: &EncryptedBool,
        if_true: &EncryptedValue,
        if_false: &EncryptedValue,
    ) -> Result<EncryptedValue, ComputeError> {
        if if_true.kind != if_false.kind {
            return Err(ComputeError::KindMismatch {
                expected: if_true.kind,
                got: if_false.kind,
            });
        }

        let mut inner = self.inner.lock();
        inner.admit()?;

        let c = match self.unseal(&inner, cond.as_value())? {
            Plaintext::Bool(c) => c,
            other => {
                return Err(ComputeError::KindMismatch {
                    expected: ValueKind::Bool,
                    got: other.kind(),
                })
            }
        };
        let t = self.unseal(&inner, if_true)?.to_bytes();
        let f = self.unseal(&inner, if_false)?.to_bytes();

        let chosen = Plaintext::from_bytes(&choose(c, &t, &f))
            .ok_or_else(|| ComputeError::Sealing("Malformed plaintext record".into()))?;

        let result = self.seal(&mut inner, chosen)?;
        debug!(cond = %cond.handle(), result = %result.handle, "Computed select");
        Ok(result)
    }

    fn grant_view(&self, value: &EncryptedValue, principal: Address) -> Result<(), ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;
        let entry = inner
            .entries
            .get_mut(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?;
        entry.viewers.insert(principal);
        debug!(handle = %value.handle, principal = short_address(&principal), "Granted view");
        Ok(())
    }

    fn revoke_view(
        &self,
        value: &EncryptedValue,
        principal: Address,
    ) -> Result<(), ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;
        let entry = inner
            .entries
            .get_mut(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?;
        entry.viewers.remove(&principal);
        debug!(handle = %value.handle, principal = short_address(&principal), "Revoked view");
        Ok(())
    }

    fn can_view(&self, value: &EncryptedValue, principal: Address) -> Result<bool, ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;
        let entry = inner
            .entries
            .get(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?;
        Ok(entry.kind == value.kind && entry.viewers.contains(&principal))
    }

    fn release(&self, value: &EncryptedValue) -> Result<(), ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;
        inner
            .entries
            .remove(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?;
        debug!(handle = %value.handle, "Released value");
        Ok(())
    }

    fn request_reveal(
        &self,
        value: &EncryptedValue,
        principal: Address,
    ) -> Result<Plaintext, ComputeError> {
        let mut inner = self.inner.lock();
        inner.admit()?;

        let authorized = inner
            .entries
            .get(&value.handle)
            .ok_or(ComputeError::UnknownHandle(value.handle))?
            .viewers
            .contains(&principal);

        if !authorized {
            warn!(
                handle = %value.handle,
                principal = short_address(&principal),
                "Rejected reveal request"
            );
            return Err(ComputeError::NotAuthorized);
        }

        let plaintext = self.unseal(&inner, value)?;
        info!(
            handle = %value.handle,
            principal = short_address(&principal),
            "Revealed value"
        );
        Ok(plaintext)
    }
}
