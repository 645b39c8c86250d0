//! # Update Coordinator
//!
//! Applies signed registry mutations.
//!
//! A call to [`Manager::process_signed_proposal`] is checked in this order:
//!
//! 1. proposal shape (parallel lists of equal length)
//! 2. target address is not a reserved sentinel
//! 3. coupon signer is the organization's authorizer
//! 4. nonce strictly above the last consumed nonce
//! 5. proposal id never used before
//!
//! then the coordinator's own permissions are checked and the mutation is
//! applied to a staged copy of registry, configuration and access table,
//! committed only when every step succeeded.
//!
//! The proposal id is consumed by any call that presents a fresh id, even
//! when that call fails afterwards.

use crate::acl::AccessTable;
use crate::coupon::{Coupon, CouponVerifier, Ed25519Verifier, ManagingCoupon};
use crate::error::{GuildError, GuildResult};
use crate::organization::Organization;
use crate::primitives::{
    AclFlags, Address, ConfigKey, ConfigValue, Configuration, ModuleId, ProposalId, dao_acl,
};
use crate::registry::{ConfigStore, ModuleKind, ModuleRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// =============================================================================
// PROPOSAL
// =============================================================================

/// What a proposal changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UpdateType {
    /// Placeholder tag; always rejected.
    Unknown = 0,
    Adapter = 1,
    Extension = 2,
    /// Configuration (and access wiring) only, no registry change.
    Configs = 3,
}

/// A proposed registry mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalDetails {
    pub module_id: ModuleId,
    /// `Address::ZERO` requests removal of `module_id`.
    pub module_address: Address,
    pub update_type: UpdateType,
    /// Organization-level flags written for the target module.
    pub flags: AclFlags,
    pub keys: Vec<ConfigKey>,
    pub values: Vec<ConfigValue>,
    pub extension_addresses: Vec<Address>,
    pub extension_acl_flags: Vec<AclFlags>,
}

impl ProposalDetails {
    fn empty(module_id: ModuleId, module_address: Address, update_type: UpdateType) -> Self {
        Self {
            module_id,
            module_address,
            update_type,
            flags: AclFlags::NONE,
            keys: Vec::new(),
            values: Vec::new(),
            extension_addresses: Vec::new(),
            extension_acl_flags: Vec::new(),
        }
    }

    /// Add or replace an adapter.
    #[must_use]
    pub fn adapter(module_id: ModuleId, address: Address, flags: AclFlags) -> Self {
        Self {
            flags,
            ..Self::empty(module_id, address, UpdateType::Adapter)
        }
    }

    /// Add or replace an extension.
    #[must_use]
    pub fn extension(module_id: ModuleId, address: Address, flags: AclFlags) -> Self {
        Self {
            flags,
            ..Self::empty(module_id, address, UpdateType::Extension)
        }
    }

    /// Remove the module registered under `module_id` as `kind`.
    #[must_use]
    pub fn removal(module_id: ModuleId, kind: ModuleKind) -> Self {
        let update_type = match kind {
            ModuleKind::Adapter => UpdateType::Adapter,
            ModuleKind::Extension => UpdateType::Extension,
        };
        Self::empty(module_id, Address::ZERO, update_type)
    }

    /// Configuration-only update.
    #[must_use]
    pub fn configs() -> Self {
        Self::empty(ModuleId::new(""), Address::ZERO, UpdateType::Configs)
    }

    /// Append a configuration write to the proposal's own key/value lists.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.keys.push(ConfigKey::new(key));
        self.values.push(value);
        self
    }

    /// Grant the target `flags` against `extension`.
    #[must_use]
    pub fn with_extension_access(mut self, extension: Address, flags: AclFlags) -> Self {
        self.extension_addresses.push(extension);
        self.extension_acl_flags.push(flags);
        self
    }

    #[must_use]
    pub fn is_removal(&self) -> bool {
        self.module_address.is_zero()
    }

    fn check_shape(&self) -> GuildResult<()> {
        if self.keys.len() != self.values.len() {
            return Err(GuildError::MalformedProposal(
                "config keys and values differ in length",
            ));
        }
        if self.extension_addresses.len() != self.extension_acl_flags.len() {
            return Err(GuildError::MalformedProposal(
                "extension addresses and acl flags differ in length",
            ));
        }
        Ok(())
    }

    fn writes_configuration(&self, configs: &[Configuration]) -> bool {
        !self.keys.is_empty() || !configs.is_empty()
    }
}

// =============================================================================
// COORDINATOR STATE
// =============================================================================

/// Replay protection owned by the coordinator, one per organization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorState {
    last_nonce: u64,
    used_proposal_ids: BTreeSet<ProposalId>,
}

impl CoordinatorState {
    /// Highest nonce consumed so far.
    #[must_use]
    pub fn last_nonce(&self) -> u64 {
        self.last_nonce
    }

    #[must_use]
    pub fn is_used(&self, id: &ProposalId) -> bool {
        self.used_proposal_ids.contains(id)
    }

    #[must_use]
    pub fn used_count(&self) -> usize {
        self.used_proposal_ids.len()
    }
}

/// Registry, configuration and access table, mutated together.
#[derive(Debug, Clone)]
struct Staged {
    registry: ModuleRegistry,
    config: ConfigStore,
    acl: AccessTable,
}

// =============================================================================
// MANAGER
// =============================================================================

/// The signed-update coordinator adapter.
#[derive(Debug, Clone)]
pub struct Manager<V = Ed25519Verifier> {
    address: Address,
    verifier: V,
}

impl Manager {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self::with_verifier(address, Ed25519Verifier)
    }
}

impl<V: CouponVerifier> Manager<V> {
    #[must_use]
    pub fn with_verifier(address: Address, verifier: V) -> Self {
        Self { address, verifier }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The coordinator holds no funds.
    pub fn receive_native(&self, _amount: u128) -> GuildResult<()> {
        Err(GuildError::NativeTransferRejected)
    }

    /// The message an authorizer signs for a call to this coordinator.
    #[must_use]
    pub fn coupon_message<'a>(
        &self,
        org: &Organization,
        proposal_id: &'a ProposalId,
        proposal: &'a ProposalDetails,
        configs: &'a [Configuration],
        nonce: u64,
    ) -> ManagingCoupon<'a> {
        ManagingCoupon {
            chain_id: org.chain_id(),
            organization: org.address(),
            coordinator: self.address,
            proposal_id,
            proposal,
            configs,
            nonce,
        }
    }

    /// Verify `coupon` and apply `proposal` plus `configs` to `org`.
    pub fn process_signed_proposal(
        &self,
        org: &mut Organization,
        proposal_id: ProposalId,
        proposal: &ProposalDetails,
        configs: &[Configuration],
        nonce: u64,
        coupon: &Coupon,
    ) -> GuildResult<()> {
        let fresh_id = !org.coordinator.is_used(&proposal_id);

        let outcome = self
            .validate(org, &proposal_id, proposal, configs, nonce, coupon)
            .and_then(|()| {
                if fresh_id {
                    Ok(())
                } else {
                    Err(GuildError::DuplicateProposalId(proposal_id.clone()))
                }
            })
            .and_then(|()| self.stage(org, proposal, configs));

        if fresh_id {
            org.coordinator
                .used_proposal_ids
                .insert(proposal_id.clone());
        }

        match outcome {
            Ok(staged) => {
                org.registry = staged.registry;
                org.config = staged.config;
                org.acl = staged.acl;
                org.coordinator.last_nonce = nonce;
                info!(
                    proposal = %proposal_id,
                    module = %proposal.module_id,
                    update = ?proposal.update_type,
                    removal = proposal.is_removal(),
                    nonce,
                    "signed proposal applied"
                );
                Ok(())
            }
            Err(err) => {
                warn!(proposal = %proposal_id, error = %err, "signed proposal rejected");
                Err(err)
            }
        }
    }

    fn validate(
        &self,
        org: &Organization,
        proposal_id: &ProposalId,
        proposal: &ProposalDetails,
        configs: &[Configuration],
        nonce: u64,
        coupon: &Coupon,
    ) -> GuildResult<()> {
        proposal.check_shape()?;

        if proposal.module_address.is_reserved() {
            return Err(GuildError::ReservedAddress(proposal.module_address));
        }

        let digest = self
            .coupon_message(org, proposal_id, proposal, configs, nonce)
            .digest()?;
        let signer = self.verifier.recover(&digest, coupon)?;
        let authorizer = org.address_configuration(ConfigKey::SIGNER_ADDRESS);
        if authorizer != Some(signer) {
            return Err(GuildError::InvalidSignature);
        }

        let last = org.coordinator.last_nonce;
        if nonce <= last {
            return Err(GuildError::CouponAlreadyRedeemed { nonce, last });
        }

        Ok(())
    }

    /// Check permissions against the current table, then build the mutated
    /// copy.
    fn stage(
        &self,
        org: &Organization,
        proposal: &ProposalDetails,
        configs: &[Configuration],
    ) -> GuildResult<Staged> {
        let acl = &org.acl;
        acl.require(self.address, dao_acl::SUBMIT_PROPOSAL)?;

        let mut staged = Staged {
            registry: org.registry.clone(),
            config: org.config.clone(),
            acl: org.acl.clone(),
        };

        match proposal.update_type {
            UpdateType::Unknown => return Err(GuildError::UnknownUpdateType),
            UpdateType::Adapter => {
                acl.require(self.address, dao_acl::REPLACE_ADAPTER)?;
                replace_module(&mut staged, proposal, ModuleKind::Adapter)?;
            }
            UpdateType::Extension => {
                let existing = org
                    .registry
                    .get_kind(&proposal.module_id, ModuleKind::Extension)
                    .is_some();
                if existing || proposal.is_removal() {
                    acl.require(self.address, dao_acl::REMOVE_EXTENSION)?;
                }
                if !proposal.is_removal() {
                    acl.require(self.address, dao_acl::ADD_EXTENSION)?;
                }
                replace_module(&mut staged, proposal, ModuleKind::Extension)?;
            }
            UpdateType::Configs => {}
        }

        if !proposal.extension_addresses.is_empty() {
            acl.require(self.address, dao_acl::ADD_EXTENSION)?;
            grant_extension_access(&mut staged, proposal);
        }

        if proposal.writes_configuration(configs) {
            acl.require(self.address, dao_acl::SET_CONFIGURATION)?;
            for (key, value) in proposal.keys.iter().zip(&proposal.values) {
                staged.config.set(key.clone(), *value);
            }
            for config in configs {
                staged.config.apply(config);
            }
        }

        Ok(staged)
    }
}

/// Remove, add or replace the proposal's target module.
fn replace_module(
    staged: &mut Staged,
    proposal: &ProposalDetails,
    kind: ModuleKind,
) -> GuildResult<()> {
    let id = &proposal.module_id;

    if proposal.is_removal() {
        match staged.registry.remove(id, kind) {
            Some(entry) => {
                staged.acl.revoke(entry.address);
                debug!(module = %id, %kind, "module removed");
            }
            None => debug!(module = %id, %kind, "removal of absent module ignored"),
        }
        return Ok(());
    }

    let address = proposal.module_address;
    let previous = staged.registry.upsert(id.clone(), address, kind)?;
    if let Some(prev) = previous {
        if prev.address != address {
            staged.acl.revoke(prev.address);
        }
    }
    staged.acl.set_flags(address, proposal.flags);
    debug!(module = %id, %kind, flags = proposal.flags.bits(), "module registered");
    Ok(())
}

/// Overwrite the target's per-extension grants.
fn grant_extension_access(staged: &mut Staged, proposal: &ProposalDetails) {
    // Removals and config-only updates have no target address to grant to.
    if proposal.is_removal() {
        return;
    }
    for (extension, flags) in proposal
        .extension_addresses
        .iter()
        .zip(&proposal.extension_acl_flags)
    {
        staged
            .acl
            .set_extension_flags(proposal.module_address, *extension, *flags);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::coupon::CouponSigner;
    use crate::error::ErrorKind;
    use crate::organization::OrganizationBuilder;

    struct Fixture {
        org: Organization,
        manager: Manager,
        signer: CouponSigner,
    }

    fn fixture() -> Fixture {
        let signer = CouponSigner::from_bytes(&[42u8; 32]);
        let built = OrganizationBuilder::new("test-dao")
            .chain_id(7)
            .signer(signer.address())
            .build()
            .unwrap();
        Fixture {
            org: built.organization,
            manager: built.manager,
            signer,
        }
    }

    impl Fixture {
        fn submit(
            &mut self,
            id: &str,
            proposal: &ProposalDetails,
            configs: &[Configuration],
            nonce: u64,
        ) -> GuildResult<()> {
            let id = ProposalId::new(id);
            let message = self
                .manager
                .coupon_message(&self.org, &id, proposal, configs, nonce);
            let coupon = self.signer.sign(&message).unwrap();
            self.manager
                .process_signed_proposal(&mut self.org, id, proposal, configs, nonce, &coupon)
        }
    }

    fn onboarding() -> ProposalDetails {
        ProposalDetails::adapter(
            ModuleId::new("onboarding"),
            Address::derive("onboarding-v1"),
            dao_acl::NEW_MEMBER,
        )
    }

    #[test]
    fn adds_adapter_with_flags() {
        let mut fx = fixture();
        assert!(fx.submit("p1", &onboarding(), &[], 1).is_ok());

        let addr = Address::derive("onboarding-v1");
        assert_eq!(
            fx.org.adapter_address(&ModuleId::new("onboarding")).ok(),
            Some(addr)
        );
        assert!(fx.org.acl().has_access(addr, dao_acl::NEW_MEMBER));
        assert_eq!(fx.org.coordinator_state().last_nonce(), 1);
    }

    #[test]
    fn mismatched_keys_are_malformed() {
        let mut fx = fixture();
        let mut proposal = onboarding();
        proposal.keys.push(ConfigKey::new("orphan"));

        let err = fx.submit("p1", &proposal, &[], 1).unwrap_err();
        assert!(matches!(err, GuildError::MalformedProposal(_)));
    }

    #[test]
    fn reserved_target_rejected() {
        let mut fx = fixture();
        let proposal =
            ProposalDetails::adapter(ModuleId::new("evil"), Address::GUILD, AclFlags::ALL);

        let err = fx.submit("p1", &proposal, &[], 1).unwrap_err();
        assert!(matches!(err, GuildError::ReservedAddress(_)));
    }

    #[test]
    fn stale_nonce_rejected() {
        let mut fx = fixture();
        assert!(fx.submit("p1", &onboarding(), &[], 5).is_ok());

        let other = ProposalDetails::adapter(
            ModuleId::new("voting"),
            Address::derive("voting-v1"),
            AclFlags::NONE,
        );
        let err = fx.submit("p2", &other, &[], 5).unwrap_err();
        assert!(matches!(
            err,
            GuildError::CouponAlreadyRedeemed { nonce: 5, last: 5 }
        ));

        // Gaps are allowed, only strict increase is required.
        assert!(fx.submit("p3", &other, &[], 9).is_ok());
    }

    #[test]
    fn failed_call_still_burns_proposal_id() {
        let mut fx = fixture();
        let mut bad = onboarding();
        bad.keys.push(ConfigKey::new("orphan"));
        assert!(fx.submit("p1", &bad, &[], 1).is_err());

        let err = fx.submit("p1", &onboarding(), &[], 2).unwrap_err();
        assert!(matches!(err, GuildError::DuplicateProposalId(_)));
        assert_eq!(err.kind(), ErrorKind::ReplayOrOrdering);
        assert!(fx.org.adapter_address(&ModuleId::new("onboarding")).is_err());
    }

    #[test]
    fn address_in_use_under_other_id() {
        let mut fx = fixture();
        assert!(fx.submit("p1", &onboarding(), &[], 1).is_ok());

        let clash = ProposalDetails::adapter(
            ModuleId::new("onboarding-copy"),
            Address::derive("onboarding-v1"),
            AclFlags::NONE,
        );
        let err = fx.submit("p2", &clash, &[], 2).unwrap_err();
        assert!(matches!(err, GuildError::AddressAlreadyInUse { .. }));
        // Nonce is not consumed by a failed call.
        assert_eq!(fx.org.coordinator_state().last_nonce(), 1);
    }

    #[test]
    fn replacement_revokes_old_address() {
        let mut fx = fixture();
        assert!(fx.submit("p1", &onboarding(), &[], 1).is_ok());

        let v2 = ProposalDetails::adapter(
            ModuleId::new("onboarding"),
            Address::derive("onboarding-v2"),
            dao_acl::NEW_MEMBER,
        );
        assert!(fx.submit("p2", &v2, &[], 2).is_ok());

        assert!(!fx
            .org
            .acl()
            .has_access(Address::derive("onboarding-v1"), dao_acl::NEW_MEMBER));
        assert!(fx
            .org
            .acl()
            .has_access(Address::derive("onboarding-v2"), dao_acl::NEW_MEMBER));
    }

    #[test]
    fn removal_of_absent_module_is_noop() {
        let mut fx = fixture();
        let removal = ProposalDetails::removal(ModuleId::new("ghost"), ModuleKind::Adapter);
        let before = fx.org.registry().len();

        assert!(fx.submit("p1", &removal, &[], 1).is_ok());
        assert_eq!(fx.org.registry().len(), before);
    }

    #[test]
    fn removal_drops_entry_and_flags() {
        let mut fx = fixture();
        assert!(fx.submit("p1", &onboarding(), &[], 1).is_ok());

        let removal = ProposalDetails::removal(ModuleId::new("onboarding"), ModuleKind::Adapter);
        assert!(fx.submit("p2", &removal, &[], 2).is_ok());

        assert!(fx.org.adapter_address(&ModuleId::new("onboarding")).is_err());
        assert!(fx.org.acl().flags(Address::derive("onboarding-v1")).is_empty());
    }

    #[test]
    fn unknown_update_type_rejected() {
        let mut fx = fixture();
        let mut proposal = onboarding();
        proposal.update_type = UpdateType::Unknown;

        let err = fx.submit("p1", &proposal, &[], 1).unwrap_err();
        assert!(matches!(err, GuildError::UnknownUpdateType));

        // Tags past the last variant never decode.
        assert!(postcard::from_bytes::<UpdateType>(&[9]).is_err());
        assert_eq!(
            postcard::from_bytes::<UpdateType>(&[2]).ok(),
            Some(UpdateType::Extension)
        );
    }

    #[test]
    fn configs_are_written_by_tag() {
        let mut fx = fixture();
        let target = Address::derive("treasurer");
        let proposal = ProposalDetails::configs()
            .with_config("voting.period", ConfigValue::Numeric(600));
        let configs = [Configuration::address("treasury.owner", target)];

        assert!(fx.submit("p1", &proposal, &configs, 1).is_ok());
        assert_eq!(fx.org.configuration("voting.period"), Some(600));
        assert_eq!(fx.org.address_configuration("treasury.owner"), Some(target));
    }

    #[test]
    fn extension_access_is_overwritten() {
        let mut fx = fixture();
        let bank = fx.org.extension_address(&ModuleId::new(ModuleId::BANK)).unwrap();
        let first = onboarding().with_extension_access(bank, AclFlags(0b11));
        assert!(fx.submit("p1", &first, &[], 1).is_ok());

        let second = onboarding().with_extension_access(bank, AclFlags(0b100));
        assert!(fx.submit("p2", &second, &[], 2).is_ok());

        let addr = Address::derive("onboarding-v1");
        assert_eq!(fx.org.acl().extension_flags(addr, bank), AclFlags(0b100));
    }

    #[test]
    fn native_transfers_refused() {
        let fx = fixture();
        assert!(matches!(
            fx.manager.receive_native(1),
            Err(GuildError::NativeTransferRejected)
        ));
    }
}
