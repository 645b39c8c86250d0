//! # Errors
//!
//! Every rejected precondition surfaces a distinct, stable variant.
//! [`GuildError::kind`] groups variants into the coarse taxonomy callers
//! branch on.

use crate::primitives::{Address, Amount, ModuleId, ProposalId};
use crate::registry::ModuleKind;
use thiserror::Error;

/// Result alias used across the core.
pub type GuildResult<T> = Result<T, GuildError>;

/// Coarse classification of a [`GuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural shape of the input is violated.
    MalformedProposal,
    /// Invalid coupon, wrong signer, missing permission.
    Unauthorized,
    /// Nonce not fresh, proposal id reused.
    ReplayOrOrdering,
    /// Operation conflicts with current state.
    StateConflict,
    /// A referenced entity does not exist.
    NotFound,
    /// Internal invariant broken. Not user-correctable.
    StructuralInvariantViolation,
    /// Snapshot encoding or backing store failure.
    Storage,
}

/// Errors from the Guildhall core.
#[derive(Debug, Error)]
pub enum GuildError {
    // -------------------------------------------------------------------------
    // Malformed input
    // -------------------------------------------------------------------------
    #[error("malformed proposal: {0}")]
    MalformedProposal(&'static str),

    #[error("unknown update type")]
    UnknownUpdateType,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    // -------------------------------------------------------------------------
    // Authorization
    // -------------------------------------------------------------------------
    #[error("address is reserved: {0}")]
    ReservedAddress(Address),

    #[error("invalid coupon signature")]
    InvalidSignature,

    #[error("access denied: {module} lacks flags {required:#x}")]
    AccessDenied { module: Address, required: u64 },

    #[error("native asset transfers are not accepted")]
    NativeTransferRejected,

    // -------------------------------------------------------------------------
    // Replay and ordering
    // -------------------------------------------------------------------------
    #[error("coupon already redeemed: nonce {nonce} is not above {last}")]
    CouponAlreadyRedeemed { nonce: u64, last: u64 },

    #[error("proposal id already used: {0}")]
    DuplicateProposalId(ProposalId),

    #[error("index too low: {to_index} is below cursor {cursor}")]
    IndexTooLow { to_index: u64, cursor: u64 },

    // -------------------------------------------------------------------------
    // State conflicts
    // -------------------------------------------------------------------------
    #[error("address already in use: {address} is registered as {existing}")]
    AddressAlreadyInUse { address: Address, existing: ModuleId },

    #[error("module kind conflict: {id} is registered as {existing}")]
    ModuleKindConflict { id: ModuleId, existing: ModuleKind },

    #[error("not a member: {0}")]
    NotAMember(Address),

    #[error("member already exists: {0}")]
    MemberAlreadyExists(Address),

    #[error("exit already in progress for {0}")]
    ExitAlreadyInProgress(Address),

    #[error("exit not in progress for {0}")]
    ExitNotInProgress(Address),

    #[error("insufficient shares: has {available}, requested {requested}")]
    InsufficientShares { available: Amount, requested: Amount },

    #[error("insufficient loot: has {available}, requested {requested}")]
    InsufficientLoot { available: Amount, requested: Amount },

    #[error("insufficient balance of {asset} for {account}: has {available}, requested {requested}")]
    InsufficientBalance {
        account: Address,
        asset: Address,
        available: Amount,
        requested: Amount,
    },

    #[error("balance overflow for {account}")]
    BalanceOverflow { account: Address },

    #[error("token already registered: {0}")]
    TokenAlreadyRegistered(Address),

    #[error("token limit reached: {limit}")]
    TooManyTokens { limit: u128 },

    #[error("token not registered: {0}")]
    TokenNotRegistered(Address),

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    // -------------------------------------------------------------------------
    // Invariants
    // -------------------------------------------------------------------------
    #[error("structural invariant violated: {0}")]
    StructuralInvariantViolation(&'static str),

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("snapshot error: {0}")]
    Snapshot(&'static str),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GuildError {
    /// Taxonomy bucket of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedProposal(_) | Self::UnknownUpdateType | Self::InvalidAddress(_) => {
                ErrorKind::MalformedProposal
            }
            Self::ReservedAddress(_)
            | Self::InvalidSignature
            | Self::AccessDenied { .. }
            | Self::NativeTransferRejected => ErrorKind::Unauthorized,
            Self::CouponAlreadyRedeemed { .. }
            | Self::DuplicateProposalId(_)
            | Self::IndexTooLow { .. } => ErrorKind::ReplayOrOrdering,
            Self::AddressAlreadyInUse { .. }
            | Self::ModuleKindConflict { .. }
            | Self::NotAMember(_)
            | Self::MemberAlreadyExists(_)
            | Self::ExitAlreadyInProgress(_)
            | Self::ExitNotInProgress(_)
            | Self::InsufficientShares { .. }
            | Self::InsufficientLoot { .. }
            | Self::InsufficientBalance { .. }
            | Self::BalanceOverflow { .. }
            | Self::TokenAlreadyRegistered(_)
            | Self::TooManyTokens { .. } => ErrorKind::StateConflict,
            Self::ModuleNotFound(_) | Self::TokenNotRegistered(_) => ErrorKind::NotFound,
            Self::StructuralInvariantViolation(_) => ErrorKind::StructuralInvariantViolation,
            Self::Serialization(_) | Self::Snapshot(_) | Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<postcard::Error> for GuildError {
    fn from(err: postcard::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<redb::Error> for GuildError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
