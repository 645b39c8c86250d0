//! # Primitives
//!
//! Identifier, amount and permission types shared by every Guildhall module.
//!
//! All identifiers are totally ordered so they can key `BTreeMap`s.
//! Amounts are exact-width `u128`; there is no floating point anywhere.

use crate::error::GuildError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

// =============================================================================
// SCALARS
// =============================================================================

/// Token amounts and ownership units.
pub type Amount = u128;

/// Logical block counter of an organization.
pub type BlockNumber = u64;

/// Network / domain identifier bound into every coupon.
pub type ChainId = u64;

/// Default cap on the number of external assets the bank tracks.
pub const DEFAULT_MAX_EXTERNAL_TOKENS: u128 = 200;

// =============================================================================
// ADDRESS
// =============================================================================

/// A 32-byte account / module / asset address.
///
/// Signer addresses are Ed25519 public keys, so an authorizer's address is
/// directly usable as a verifying key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The null address. A proposal targeting it requests removal.
    pub const ZERO: Self = Self([0u8; 32]);

    /// Pooled treasury account.
    pub const GUILD: Self = Self::reserved(0xdead);
    /// Escrow account held by adapters between steps.
    pub const ESCROW: Self = Self::reserved(0x4bec);
    /// Account tracking the totals of internal tokens.
    pub const TOTAL: Self = Self::reserved(0xbabe);
    /// Internal token: voting shares.
    pub const UNITS: Self = Self::reserved(0xff1c);
    /// Internal token: non-voting loot.
    pub const LOOT: Self = Self::reserved(0xb105f00d);
    /// Internal token: loot locked by an adapter.
    pub const LOCKED_LOOT: Self = Self::reserved(0xbb105f00d);
    /// Counter account for the member count.
    pub const MEMBER_COUNT: Self = Self::reserved(0xdecafbad);

    const RESERVED: [Self; 7] = [
        Self::GUILD,
        Self::ESCROW,
        Self::TOTAL,
        Self::UNITS,
        Self::LOOT,
        Self::LOCKED_LOOT,
        Self::MEMBER_COUNT,
    ];

    /// Reserved sentinel addresses are all-zero except for a low tag.
    const fn reserved(tag: u64) -> Self {
        let tag = tag.to_be_bytes();
        let mut bytes = [0u8; 32];
        let mut i = 0;
        while i < 8 {
            bytes[24 + i] = tag[i];
            i += 1;
        }
        Self(bytes)
    }

    /// Create an address from raw bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Deterministically derive an address from a label.
    ///
    /// Used for module and asset addresses that are not key-backed.
    #[must_use]
    pub fn derive(label: &str) -> Self {
        let hash = blake3::derive_key("guildhall 2026-10 address", label.as_bytes());
        Self(hash)
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// True for the sentinel accounts that can never be a module address.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        Self::RESERVED.contains(self)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering without prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.to_hex();
        write!(f, "Address(0x{}..{})", &digits[..8], &digits[56..])
    }
}

impl FromStr for Address {
    type Err = GuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|_| GuildError::InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let text = String::deserialize(deserializer)?;
            text.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier of a registered module, e.g. `"bank"` or `"ragequit"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl ModuleId {
    /// Bank extension.
    pub const BANK: &'static str = "bank";
    /// Signed-update coordinator adapter.
    pub const MANAGER: &'static str = "manager";
    /// Exit engine adapter.
    pub const RAGEQUIT: &'static str = "ragequit";

    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-chosen identifier of a proposal. Single use per organization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(pub String);

impl ProposalId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ProposalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// CONFIGURATION VALUES
// =============================================================================

/// Key of a configuration entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(pub String);

impl ConfigKey {
    /// Address of the coupon authorizer.
    pub const SIGNER_ADDRESS: &'static str = "manager.signerAddress";
    /// Cap on registered external tokens.
    pub const MAX_EXTERNAL_TOKENS: &'static str = "bank.maxExternalTokens";

    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tagged configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    Numeric(u128),
    Address(Address),
}

/// A single configuration write carried beside a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub key: ConfigKey,
    pub value: ConfigValue,
}

impl Configuration {
    #[must_use]
    pub fn numeric(key: impl Into<String>, value: u128) -> Self {
        Self {
            key: ConfigKey::new(key),
            value: ConfigValue::Numeric(value),
        }
    }

    #[must_use]
    pub fn address(key: impl Into<String>, value: Address) -> Self {
        Self {
            key: ConfigKey::new(key),
            value: ConfigValue::Address(value),
        }
    }
}

// =============================================================================
// ACCESS FLAGS
// =============================================================================

/// A permission bitset.
///
/// Organization-level bits live in [`dao_acl`], per-extension bits for the
/// bank live in [`bank_acl`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclFlags(pub u64);

impl AclFlags {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u64::MAX);

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True when every bit of `flag` is set.
    #[must_use]
    pub const fn contains(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for AclFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for AclFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for AclFlags {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Organization-level permission bits.
pub mod dao_acl {
    use super::AclFlags;

    pub const REPLACE_ADAPTER: AclFlags = AclFlags(1 << 0);
    pub const SUBMIT_PROPOSAL: AclFlags = AclFlags(1 << 1);
    pub const UPDATE_DELEGATE_KEY: AclFlags = AclFlags(1 << 2);
    pub const SET_CONFIGURATION: AclFlags = AclFlags(1 << 3);
    pub const ADD_EXTENSION: AclFlags = AclFlags(1 << 4);
    pub const REMOVE_EXTENSION: AclFlags = AclFlags(1 << 5);
    pub const NEW_MEMBER: AclFlags = AclFlags(1 << 6);
    pub const JAIL_MEMBER: AclFlags = AclFlags(1 << 7);
}

/// Bank extension permission bits.
pub mod bank_acl {
    use super::AclFlags;

    pub const ADD_TO_BALANCE: AclFlags = AclFlags(1 << 0);
    pub const SUB_FROM_BALANCE: AclFlags = AclFlags(1 << 1);
    pub const INTERNAL_TRANSFER: AclFlags = AclFlags(1 << 2);
    pub const WITHDRAW: AclFlags = AclFlags(1 << 3);
    pub const REGISTER_NEW_TOKEN: AclFlags = AclFlags(1 << 4);
    pub const REGISTER_NEW_INTERNAL_TOKEN: AclFlags = AclFlags(1 << 5);
    pub const UPDATE_TOKEN: AclFlags = AclFlags(1 << 6);
}

// =============================================================================
// TESTS
// =============================================================================
