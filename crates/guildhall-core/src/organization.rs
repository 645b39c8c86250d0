//! # Organization Context
//!
//! All state of one organization instance: registry, configuration, access
//! table, bank, membership, coordinator replay protection and exit records.
//!
//! Every coordinator or exit-engine operation takes `&mut Organization`, so
//! calls against one organization are serialized by the borrow checker and
//! independent organizations never share state.

use crate::acl::AccessTable;
use crate::error::{GuildError, GuildResult};
use crate::ledger::{Bank, Ledger, Members};
use crate::manager::{CoordinatorState, Manager};
use crate::primitives::{
    AclFlags, Address, Amount, BlockNumber, ChainId, ConfigKey, ConfigValue,
    DEFAULT_MAX_EXTERNAL_TOKENS, ModuleId, bank_acl, dao_acl,
};
use crate::ragequit::{ExitRecord, Ragequit};
use crate::registry::{ConfigStore, ModuleKind, ModuleRegistry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Flags the coordinator needs to apply every kind of proposal.
pub const MANAGER_FLAGS: AclFlags = AclFlags(
    dao_acl::SUBMIT_PROPOSAL.0
        | dao_acl::REPLACE_ADAPTER.0
        | dao_acl::ADD_EXTENSION.0
        | dao_acl::REMOVE_EXTENSION.0
        | dao_acl::SET_CONFIGURATION.0,
);

/// Organization-level flags of the exit engine.
pub const RAGEQUIT_FLAGS: AclFlags = dao_acl::JAIL_MEMBER;

/// Bank flags of the exit engine.
pub const RAGEQUIT_BANK_FLAGS: AclFlags = AclFlags(
    bank_acl::SUB_FROM_BALANCE.0 | bank_acl::INTERNAL_TRANSFER.0,
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub(crate) name: String,
    pub(crate) address: Address,
    pub(crate) chain_id: ChainId,
    pub(crate) block: BlockNumber,
    pub(crate) registry: ModuleRegistry,
    pub(crate) config: ConfigStore,
    pub(crate) acl: AccessTable,
    pub(crate) bank: Bank,
    pub(crate) members: Members,
    pub(crate) coordinator: CoordinatorState,
    pub(crate) exits: BTreeMap<Address, ExitRecord>,
}

impl Organization {
    /// Create an empty organization. Use [`OrganizationBuilder`] to get one
    /// with its bank, coordinator and exit engine installed.
    #[must_use]
    pub fn new(name: impl Into<String>, chain_id: ChainId) -> Self {
        let name = name.into();
        let address = Address::derive(&format!("organization:{name}"));
        Self {
            name,
            address,
            chain_id,
            block: 0,
            registry: ModuleRegistry::new(),
            config: ConfigStore::new(),
            acl: AccessTable::new(),
            bank: Bank::new(),
            members: Members::new(),
            coordinator: CoordinatorState::default(),
            exits: BTreeMap::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Identity and clock
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    #[must_use]
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    #[must_use]
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    /// Advance the logical block counter by one.
    pub fn advance_block(&mut self) -> BlockNumber {
        self.block = self.block.saturating_add(1);
        self.block
    }

    // -------------------------------------------------------------------------
    // Read accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    #[must_use]
    pub fn acl(&self) -> &AccessTable {
        &self.acl
    }

    #[must_use]
    pub fn bank(&self) -> &Bank {
        &self.bank
    }

    #[must_use]
    pub fn members(&self) -> &Members {
        &self.members
    }

    #[must_use]
    pub fn coordinator_state(&self) -> &CoordinatorState {
        &self.coordinator
    }

    /// Exit record of `member`, if one was ever started.
    #[must_use]
    pub fn exit_record(&self, member: Address) -> Option<&ExitRecord> {
        self.exits.get(&member)
    }

    pub fn exit_records(&self) -> impl Iterator<Item = (&Address, &ExitRecord)> {
        self.exits.iter()
    }

    pub fn adapter_address(&self, id: &ModuleId) -> GuildResult<Address> {
        self.registry.adapter_address(id)
    }

    pub fn extension_address(&self, id: &ModuleId) -> GuildResult<Address> {
        self.registry.extension_address(id)
    }

    #[must_use]
    pub fn configuration(&self, key: &str) -> Option<u128> {
        self.config.configuration(key)
    }

    #[must_use]
    pub fn address_configuration(&self, key: &str) -> Option<Address> {
        self.config.address_configuration(key)
    }

    #[must_use]
    pub fn has_adapter_access_to_extension(
        &self,
        module: Address,
        extension: Address,
        flag: AclFlags,
    ) -> bool {
        self.acl.has_adapter_access_to_extension(module, extension, flag)
    }

    #[must_use]
    pub fn balance_of(&self, account: Address, asset: Address) -> Amount {
        self.bank.balance_of(account, asset)
    }

    // -------------------------------------------------------------------------
    // Collaborator paths (onboarding, deposits, token listing)
    // -------------------------------------------------------------------------

    /// Admit a member holding `shares` and `loot`.
    pub fn add_member(&mut self, member: Address, shares: Amount, loot: Amount) -> GuildResult<()> {
        self.members.add(member)?;
        let mut bank = self.bank.clone();
        bank.add_to_balance(member, Address::UNITS, shares)?;
        bank.add_to_balance(member, Address::LOOT, loot)?;
        self.bank = bank;
        info!(%member, shares, loot, "member admitted");
        Ok(())
    }

    /// Mint additional ownership units for an existing member.
    pub fn mint_units(
        &mut self,
        member: Address,
        unit: Address,
        amount: Amount,
    ) -> GuildResult<()> {
        if !self.members.is_member(member) {
            return Err(GuildError::NotAMember(member));
        }
        if !self.bank.is_internal_token(unit) {
            return Err(GuildError::TokenNotRegistered(unit));
        }
        self.bank.add_to_balance(member, unit, amount)
    }

    /// List an external asset, capped by `bank.maxExternalTokens`.
    pub fn register_token(&mut self, asset: Address) -> GuildResult<()> {
        let limit = self
            .configuration(ConfigKey::MAX_EXTERNAL_TOKENS)
            .unwrap_or(DEFAULT_MAX_EXTERNAL_TOKENS);
        self.bank.register_token(asset, limit)?;
        info!(%asset, "token registered");
        Ok(())
    }

    /// Credit the pooled treasury.
    pub fn fund(&mut self, asset: Address, amount: Amount) -> GuildResult<()> {
        self.bank.add_to_balance(Address::GUILD, asset, amount)
    }

    /// Debit the pooled treasury, e.g. a payment made by another adapter.
    pub fn spend(&mut self, asset: Address, amount: Amount) -> GuildResult<()> {
        self.bank.subtract_from_balance(Address::GUILD, asset, amount)
    }

    pub fn jail_member(&mut self, member: Address) -> GuildResult<()> {
        self.members.jail(member)
    }

    pub fn unjail_member(&mut self, member: Address) -> GuildResult<()> {
        self.members.unjail(member)
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// An organization with its core modules installed.
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub organization: Organization,
    pub manager: Manager,
    pub ragequit: Ragequit,
}

/// Genesis configuration of an organization.
#[derive(Debug, Clone)]
pub struct OrganizationBuilder {
    name: String,
    chain_id: ChainId,
    signer: Option<Address>,
    max_external_tokens: u128,
    configs: Vec<(ConfigKey, ConfigValue)>,
}

impl OrganizationBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain_id: 1,
            signer: None,
            max_external_tokens: DEFAULT_MAX_EXTERNAL_TOKENS,
            configs: Vec::new(),
        }
    }

    #[must_use]
    pub fn chain_id(mut self, chain_id: ChainId) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Address of the coupon authorizer.
    #[must_use]
    pub fn signer(mut self, signer: Address) -> Self {
        self.signer = Some(signer);
        self
    }

    #[must_use]
    pub fn max_external_tokens(mut self, limit: u128) -> Self {
        self.max_external_tokens = limit;
        self
    }

    #[must_use]
    pub fn config(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.configs.push((ConfigKey::new(key), value));
        self
    }

    /// Install the bank extension, the coordinator and the exit engine.
    ///
    /// Module addresses are derived from the organization name.
    pub fn build(self) -> GuildResult<Bootstrapped> {
        let mut org = Organization::new(self.name, self.chain_id);
        let label = org.name.clone();

        let bank = Address::derive(&format!("{label}:{}", ModuleId::BANK));
        let manager = Address::derive(&format!("{label}:{}", ModuleId::MANAGER));
        let ragequit = Address::derive(&format!("{label}:{}", ModuleId::RAGEQUIT));

        org.registry
            .upsert(ModuleId::new(ModuleId::BANK), bank, ModuleKind::Extension)?;
        org.registry
            .upsert(ModuleId::new(ModuleId::MANAGER), manager, ModuleKind::Adapter)?;
        org.registry
            .upsert(ModuleId::new(ModuleId::RAGEQUIT), ragequit, ModuleKind::Adapter)?;

        org.acl.set_flags(manager, MANAGER_FLAGS);
        org.acl.set_flags(ragequit, RAGEQUIT_FLAGS);
        org.acl.set_extension_flags(ragequit, bank, RAGEQUIT_BANK_FLAGS);

        org.config.set(
            ConfigKey::new(ConfigKey::MAX_EXTERNAL_TOKENS),
            ConfigValue::Numeric(self.max_external_tokens),
        );
        if let Some(signer) = self.signer {
            org.config.set(
                ConfigKey::new(ConfigKey::SIGNER_ADDRESS),
                ConfigValue::Address(signer),
            );
        }
        for (key, value) in self.configs {
            org.config.set(key, value);
        }

        info!(
            organization = %org.address,
            name = %org.name,
            chain_id = org.chain_id,
            "organization created"
        );

        Ok(Bootstrapped {
            organization: org,
            manager: Manager::new(manager),
            ragequit: Ragequit::new(ragequit),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builder_installs_core_modules() {
        let signer = Address::derive("signer");
        let built = OrganizationBuilder::new("guild").signer(signer).build().unwrap();
        let org = &built.organization;

        assert_eq!(
            org.adapter_address(&ModuleId::new(ModuleId::MANAGER)).ok(),
            Some(built.manager.address())
        );
        assert_eq!(
            org.adapter_address(&ModuleId::new(ModuleId::RAGEQUIT)).ok(),
            Some(built.ragequit.address())
        );
        let bank = org.extension_address(&ModuleId::new(ModuleId::BANK)).unwrap();
        assert!(org.has_adapter_access_to_extension(
            built.ragequit.address(),
            bank,
            bank_acl::INTERNAL_TRANSFER
        ));
        assert_eq!(org.address_configuration(ConfigKey::SIGNER_ADDRESS), Some(signer));
        assert_eq!(
            org.configuration(ConfigKey::MAX_EXTERNAL_TOKENS),
            Some(DEFAULT_MAX_EXTERNAL_TOKENS)
        );
    }

    #[test]
    fn organizations_are_independent() {
        let a = OrganizationBuilder::new("a").build().unwrap();
        let b = OrganizationBuilder::new("b").build().unwrap();
        assert_ne!(a.organization.address(), b.organization.address());
        assert_ne!(a.manager.address(), b.manager.address());
    }

    #[test]
    fn add_member_credits_units() {
        let mut org = OrganizationBuilder::new("guild").build().unwrap().organization;
        let alice = Address::derive("alice");

        org.add_member(alice, 100, 10).unwrap();

        assert!(org.members().is_member(alice));
        assert_eq!(org.balance_of(alice, Address::UNITS), 100);
        assert_eq!(org.bank().total_units(), 110);
        assert!(matches!(
            org.add_member(alice, 1, 0),
            Err(GuildError::MemberAlreadyExists(_))
        ));
    }

    #[test]
    fn token_cap_comes_from_configuration() {
        let mut org = OrganizationBuilder::new("guild")
            .max_external_tokens(1)
            .build()
            .unwrap()
            .organization;

        org.register_token(Address::derive("asset:a")).unwrap();
        assert!(matches!(
            org.register_token(Address::derive("asset:b")),
            Err(GuildError::TooManyTokens { limit: 1 })
        ));
    }

    #[test]
    fn advance_block_is_monotonic() {
        let mut org = Organization::new("guild", 1);
        assert_eq!(org.block(), 0);
        assert_eq!(org.advance_block(), 1);
        assert_eq!(org.advance_block(), 2);
    }
}
