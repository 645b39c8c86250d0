//! # Managing Coupons
//!
//! A coupon authorizes exactly one (organization, coordinator, proposal id,
//! proposal, configs, nonce, chain id) tuple.
//!
//! The canonical encoding is defined once, in [`ManagingCoupon::digest`]:
//! the postcard encoding of the whole tuple, hashed with BLAKE3 in
//! derive-key mode under [`COUPON_CONTEXT`]. Signing and verification both
//! go through that digest, so there is no second encoder to drift.
//!
//! Ed25519 does not recover a public key from a signature. The coupon
//! therefore names its signer, and the verifier checks the signature under
//! that key; the coordinator then compares the signer with the
//! organization's authorizer.

use crate::error::{GuildError, GuildResult};
use crate::manager::ProposalDetails;
use crate::primitives::{Address, ChainId, Configuration, ProposalId};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

/// Domain separation context for coupon digests.
pub const COUPON_CONTEXT: &str = "guildhall 2026-10 managing coupon v1";

// =============================================================================
// MESSAGE
// =============================================================================

/// The structured message a coupon signs.
#[derive(Debug, Clone, Serialize)]
pub struct ManagingCoupon<'a> {
    pub chain_id: ChainId,
    pub organization: Address,
    pub coordinator: Address,
    pub proposal_id: &'a ProposalId,
    pub proposal: &'a ProposalDetails,
    pub configs: &'a [Configuration],
    pub nonce: u64,
}

/// 32-byte digest of a [`ManagingCoupon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CouponDigest(pub [u8; 32]);

impl ManagingCoupon<'_> {
    /// Canonical digest of the message.
    pub fn digest(&self) -> GuildResult<CouponDigest> {
        let encoded = postcard::to_stdvec(self)?;
        Ok(CouponDigest(blake3::derive_key(COUPON_CONTEXT, &encoded)))
    }
}

// =============================================================================
// COUPON
// =============================================================================

/// Signature over a coupon digest, with the claimed signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub signer: Address,
    pub signature: Signature,
}

// =============================================================================
// VERIFICATION
// =============================================================================

/// Trust boundary for coupon checking.
pub trait CouponVerifier {
    /// Return the signer address if `coupon` is a valid signature over
    /// `digest`, `InvalidSignature` otherwise.
    fn recover(&self, digest: &CouponDigest, coupon: &Coupon) -> GuildResult<Address>;
}

/// Ed25519 verification with strict (non-malleable) signature checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl CouponVerifier for Ed25519Verifier {
    fn recover(&self, digest: &CouponDigest, coupon: &Coupon) -> GuildResult<Address> {
        let key = VerifyingKey::from_bytes(coupon.signer.as_bytes())
            .map_err(|_| GuildError::InvalidSignature)?;
        key.verify_strict(&digest.0, &coupon.signature)
            .map_err(|_| GuildError::InvalidSignature)?;
        Ok(coupon.signer)
    }
}

// =============================================================================
// SIGNING
// =============================================================================

/// Off-line coupon issuer holding the authorizer's key.
pub struct CouponSigner {
    key: SigningKey,
}

impl CouponSigner {
    #[must_use]
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self {
            key: SigningKey::from_bytes(secret),
        }
    }

    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Address under which this signer's coupons verify.
    #[must_use]
    pub fn address(&self) -> Address {
        Address::new(self.key.verifying_key().to_bytes())
    }

    #[must_use]
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    pub fn sign(&self, message: &ManagingCoupon<'_>) -> GuildResult<Coupon> {
        let digest = message.digest()?;
        Ok(Coupon {
            signer: self.address(),
            signature: self.key.sign(&digest.0),
        })
    }
}

impl std::fmt::Debug for CouponSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CouponSigner")
            .field("address", &self.address())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
