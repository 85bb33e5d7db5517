//! The confidential compute capability interface.

use auction_types::{Address, EncryptedBool, EncryptedValue, Plaintext, ValueKind};

use crate::error::ComputeError;

/// Operations permitted on encrypted values.
///
/// Implementations may be backed by a remote service, so every call is
/// potentially slow and may fail with [`ComputeError::Unavailable`]. The
/// core never retries or times out these calls itself.
pub trait ConfidentialCompute: Send + Sync {
    /// Encrypt a plaintext into a fresh handle. No principal may view it
    /// until a grant is issued.
    fn encrypt(&self, value: Plaintext) -> Result<EncryptedValue, ComputeError>;

    /// Encrypted `lhs > rhs`. Both operands must be of kind `Uint`.
    fn greater_than(
        &self,
        lhs: &EncryptedValue,
        rhs: &EncryptedValue,
    ) -> Result<EncryptedBool, ComputeError>;

    /// Encrypted ternary: `cond ? if_true : if_false`.
    ///
    /// Both branches must share a kind. The result is a new handle with no
    /// view grants.
    fn select(
        &self,
        cond: &EncryptedBool,
        if_true: &EncryptedValue,
        if_false: &EncryptedValue,
    ) -> Result<EncryptedValue, ComputeError>;

    /// Allow `principal` to reveal `value`.
    fn grant_view(&self, value: &EncryptedValue, principal: Address) -> Result<(), ComputeError>;

    /// Withdraw a grant issued by [`grant_view`](Self::grant_view).
    fn revoke_view(&self, value: &EncryptedValue, principal: Address)
        -> Result<(), ComputeError>;

    /// Whether `principal` holds a grant on `value`.
    fn can_view(&self, value: &EncryptedValue, principal: Address) -> Result<bool, ComputeError>;

    /// Drop a handle the caller no longer needs. Later uses of it fail with
    /// [`ComputeError::UnknownHandle`].
    fn release(&self, value: &EncryptedValue) -> Result<(), ComputeError>;

    /// Reveal the plaintext of `value` to `principal`.
    ///
    /// Fails with [`ComputeError::NotAuthorized`] unless the principal holds
    /// a grant on this exact handle.
    fn request_reveal(
        &self,
        value: &EncryptedValue,
        principal: Address,
    ) -> Result<Plaintext, ComputeError>;

    fn encrypt_amount(&self, amount: u64) -> Result<EncryptedValue, ComputeError> {
        self.encrypt(Plaintext::Uint(amount as u128))
    }

    /// Encrypt an amount as `owner`'s input: only `owner` may view it.
    ///
    /// This is how a bidder produces the ciphertext submitted with a bid.
    fn encrypt_amount_for(
        &self,
        amount: u64,
        owner: Address,
    ) -> Result<EncryptedValue, ComputeError> {
        let encrypted = self.encrypt_amount(amount)?;
        self.grant_view(&encrypted, owner)?;
        Ok(encrypted)
    }

    fn encrypt_address(&self, address: Address) -> Result<EncryptedValue, ComputeError> {
        self.encrypt(Plaintext::Address(address))
    }

    fn encrypt_bool(&self, value: bool) -> Result<EncryptedBool, ComputeError> {
        let encrypted = self.encrypt(Plaintext::Bool(value))?;
        EncryptedBool::from_value(encrypted).ok_or(ComputeError::KindMismatch {
            expected: ValueKind::Bool,
            got: encrypted.kind,
        })
    }

    /// [`select`](Self::select) over encrypted booleans.
    fn select_bool(
        &self,
        cond: &EncryptedBool,
        if_true: &EncryptedBool,
        if_false: &EncryptedBool,
    ) -> Result<EncryptedBool, ComputeError> {
        let selected = self.select(cond, if_true.as_value(), if_false.as_value())?;
        EncryptedBool::from_value(selected).ok_or(ComputeError::KindMismatch {
            expected: ValueKind::Bool,
            got: selected.kind,
        })
    }

    fn reveal_amount(
        &self,
        value: &EncryptedValue,
        principal: Address,
    ) -> Result<u128, ComputeError> {
        match self.request_reveal(value, principal)? {
            Plaintext::Uint(v) => Ok(v),
            other => Err(ComputeError::KindMismatch {
                expected: ValueKind::Uint,
                got: other.kind(),
            }),
        }
    }

    fn reveal_address(
        &self,
        value: &EncryptedValue,
        principal: Address,
    ) -> Result<Address, ComputeError> {
        match self.request_reveal(value, principal)? {
            Plaintext::Address(a) => Ok(a),
            other => Err(ComputeError::KindMismatch {
                expected: ValueKind::Address,
                got: other.kind(),
            }),
        }
    }
}
