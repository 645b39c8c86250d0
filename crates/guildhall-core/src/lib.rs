//! # Guildhall Core
//!
//! Deterministic governance and settlement engine for a member-owned
//! organization.
//!
//! Two subsystems share one organization ledger:
//!
//! - [`Manager`]: applies registry, access-control and configuration changes
//!   authorized by an off-line signed coupon, with nonce and proposal-id
//!   replay protection.
//! - [`Ragequit`]: lets a member burn ownership units and withdraw a
//!   proportional share of every pooled asset over bounded steps.
//!
//! ## Architecture
//!
//! - No async, no network, no floats, `BTreeMap` only.
//! - Every operation takes `&mut Organization` and either commits fully or
//!   leaves the organization untouched (except the documented proposal-id
//!   consumption).
//! - Persistence is a checksummed postcard snapshot, stored by the app in a
//!   redb database.

pub mod acl;
pub mod coupon;
pub mod error;
pub mod formats;
pub mod ledger;
pub mod manager;
pub mod organization;
pub mod primitives;
pub mod ragequit;
pub mod registry;
pub mod storage;

pub use acl::AccessTable;
pub use coupon::{
    COUPON_CONTEXT, Coupon, CouponDigest, CouponSigner, CouponVerifier, Ed25519Verifier,
    ManagingCoupon,
};
pub use error::{ErrorKind, GuildError, GuildResult};
pub use formats::{OrganizationSnapshot, from_snapshot_bytes, to_snapshot_bytes};
pub use ledger::{Bank, Ledger, MemberFlags, Members};
pub use manager::{CoordinatorState, Manager, ProposalDetails, UpdateType};
pub use organization::{Bootstrapped, Organization, OrganizationBuilder};
pub use primitives::{
    AclFlags, Address, Amount, BlockNumber, ChainId, ConfigKey, ConfigValue, Configuration,
    DEFAULT_MAX_EXTERNAL_TOKENS, ModuleId, ProposalId, bank_acl, dao_acl,
};
pub use ragequit::{ExitRecord, ExitStatus, Ragequit, fair_share};
pub use registry::{ConfigStore, ModuleEntry, ModuleKind, ModuleRegistry};
pub use storage::RedbStore;
