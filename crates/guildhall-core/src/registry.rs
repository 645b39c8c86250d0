//! # Module Registry and Configuration Store
//!
//! The registry maps a [`ModuleId`] to an address and a [`ModuleKind`].
//! Both the id and the address are unique: an address can be registered
//! under at most one id, kept in sync through a reverse index.
//!
//! The configuration store is a typed key/value map, numeric and address
//! values kept apart.

use crate::error::{GuildError, GuildResult};
use crate::primitives::{Address, ConfigKey, ConfigValue, Configuration, ModuleId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// MODULE REGISTRY
// =============================================================================

/// Type tag of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    /// Behavior-extending module, holds organization-level flags.
    Adapter,
    /// State-extending module, adapters are granted access to it.
    Extension,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adapter => f.write_str("adapter"),
            Self::Extension => f.write_str("extension"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub address: Address,
    pub kind: ModuleKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRegistry {
    /// id -> entry
    modules: BTreeMap<ModuleId, ModuleEntry>,

    /// Reverse lookup: address -> id
    address_index: BTreeMap<Address, ModuleId>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: &ModuleId) -> Option<&ModuleEntry> {
        self.modules.get(id)
    }

    /// Entry registered under `id` with the given kind.
    #[must_use]
    pub fn get_kind(&self, id: &ModuleId, kind: ModuleKind) -> Option<&ModuleEntry> {
        self.modules.get(id).filter(|entry| entry.kind == kind)
    }

    pub fn adapter_address(&self, id: &ModuleId) -> GuildResult<Address> {
        self.get_kind(id, ModuleKind::Adapter)
            .map(|entry| entry.address)
            .ok_or_else(|| GuildError::ModuleNotFound(id.clone()))
    }

    pub fn extension_address(&self, id: &ModuleId) -> GuildResult<Address> {
        self.get_kind(id, ModuleKind::Extension)
            .map(|entry| entry.address)
            .ok_or_else(|| GuildError::ModuleNotFound(id.clone()))
    }

    /// Id registered at `address`, if any.
    #[must_use]
    pub fn id_of(&self, address: Address) -> Option<&ModuleId> {
        self.address_index.get(&address)
    }

    #[must_use]
    pub fn is_adapter(&self, address: Address) -> bool {
        self.kind_of(address) == Some(ModuleKind::Adapter)
    }

    #[must_use]
    pub fn is_extension(&self, address: Address) -> bool {
        self.kind_of(address) == Some(ModuleKind::Extension)
    }

    fn kind_of(&self, address: Address) -> Option<ModuleKind> {
        let id = self.address_index.get(&address)?;
        self.modules.get(id).map(|entry| entry.kind)
    }

    /// Insert or replace the entry for `id`.
    ///
    /// Returns the replaced entry. Fails with `AddressAlreadyInUse` when the
    /// address is already registered under a different id, and with
    /// `ModuleKindConflict` when `id` is registered as the other kind. The
    /// registry is unchanged in both cases.
    pub fn upsert(
        &mut self,
        id: ModuleId,
        address: Address,
        kind: ModuleKind,
    ) -> GuildResult<Option<ModuleEntry>> {
        if let Some(current) = self.modules.get(&id) {
            if current.kind != kind {
                return Err(GuildError::ModuleKindConflict {
                    id,
                    existing: current.kind,
                });
            }
        }
        if let Some(existing) = self.address_index.get(&address) {
            if *existing != id {
                return Err(GuildError::AddressAlreadyInUse {
                    address,
                    existing: existing.clone(),
                });
            }
        }

        let previous = self.modules.insert(id.clone(), ModuleEntry { address, kind });
        if let Some(prev) = previous {
            if prev.address != address {
                self.address_index.remove(&prev.address);
            }
        }
        self.address_index.insert(address, id);
        Ok(previous)
    }

    /// Remove the entry for `id` if it exists with the given kind.
    ///
    /// Absent ids (or ids of the other kind) are a no-op.
    pub fn remove(&mut self, id: &ModuleId, kind: ModuleKind) -> Option<ModuleEntry> {
        if self.get_kind(id, kind).is_none() {
            return None;
        }
        let entry = self.modules.remove(id)?;
        self.address_index.remove(&entry.address);
        Some(entry)
    }

    /// All modules in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&ModuleId, &ModuleEntry)> {
        self.modules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

// =============================================================================
// CONFIGURATION STORE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStore {
    numeric: BTreeMap<ConfigKey, u128>,
    addresses: BTreeMap<ConfigKey, Address>,
}

impl ConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert, dispatching on the value tag.
    pub fn set(&mut self, key: ConfigKey, value: ConfigValue) {
        match value {
            ConfigValue::Numeric(n) => {
                self.numeric.insert(key, n);
            }
            ConfigValue::Address(a) => {
                self.addresses.insert(key, a);
            }
        }
    }

    pub fn apply(&mut self, config: &Configuration) {
        self.set(config.key.clone(), config.value);
    }

    #[must_use]
    pub fn configuration(&self, key: &str) -> Option<u128> {
        self.numeric.get(&ConfigKey::new(key)).copied()
    }

    #[must_use]
    pub fn address_configuration(&self, key: &str) -> Option<Address> {
        self.addresses.get(&ConfigKey::new(key)).copied()
    }

    /// All entries, numeric first, each in key order.
    pub fn entries(&self) -> impl Iterator<Item = Configuration> + '_ {
        let numeric = self.numeric.iter().map(|(k, v)| Configuration {
            key: k.clone(),
            value: ConfigValue::Numeric(*v),
        });
        let addresses = self.addresses.iter().map(|(k, v)| Configuration {
            key: k.clone(),
            value: ConfigValue::Address(*v),
        });
        numeric.chain(addresses)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.numeric.len() + self.addresses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numeric.is_empty() && self.addresses.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_and_lookup() {
        let mut registry = ModuleRegistry::new();
        let id = ModuleId::new("onboarding");
        let addr = Address::derive("onboarding-v1");

        let prev = registry.upsert(id.clone(), addr, ModuleKind::Adapter);
        assert!(matches!(prev, Ok(None)));
        assert_eq!(registry.adapter_address(&id).ok(), Some(addr));
        assert!(registry.extension_address(&id).is_err());
        assert_eq!(registry.id_of(addr), Some(&id));
        assert!(registry.is_adapter(addr));
    }

    #[test]
    fn replace_moves_reverse_index() {
        let mut registry = ModuleRegistry::new();
        let id = ModuleId::new("onboarding");
        let v1 = Address::derive("onboarding-v1");
        let v2 = Address::derive("onboarding-v2");

        assert!(registry.upsert(id.clone(), v1, ModuleKind::Adapter).is_ok());
        let prev = registry.upsert(id.clone(), v2, ModuleKind::Adapter);

        assert_eq!(prev.ok().flatten().map(|e| e.address), Some(v1));
        assert_eq!(registry.id_of(v1), None);
        assert_eq!(registry.id_of(v2), Some(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn address_unique_across_ids() {
        let mut registry = ModuleRegistry::new();
        let addr = Address::derive("shared");

        assert!(registry.upsert(ModuleId::new("a"), addr, ModuleKind::Adapter).is_ok());
        let result = registry.upsert(ModuleId::new("b"), addr, ModuleKind::Extension);

        assert!(matches!(result, Err(GuildError::AddressAlreadyInUse { .. })));
        assert!(registry.get(&ModuleId::new("b")).is_none());
    }

    #[test]
    fn upsert_keeps_kind() {
        let mut registry = ModuleRegistry::new();
        let bank = Address::derive("bank");
        assert!(registry.upsert(ModuleId::new("bank"), bank, ModuleKind::Extension).is_ok());

        let result =
            registry.upsert(ModuleId::new("bank"), Address::derive("evil"), ModuleKind::Adapter);
        assert!(matches!(
            result,
            Err(GuildError::ModuleKindConflict {
                existing: ModuleKind::Extension,
                ..
            })
        ));
        assert_eq!(registry.extension_address(&ModuleId::new("bank")).ok(), Some(bank));
        assert_eq!(registry.id_of(Address::derive("evil")), None);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.remove(&ModuleId::new("ghost"), ModuleKind::Adapter).is_none());

        let addr = Address::derive("bank");
        assert!(registry.upsert(ModuleId::new("bank"), addr, ModuleKind::Extension).is_ok());
        // Wrong kind leaves the entry alone.
        assert!(registry.remove(&ModuleId::new("bank"), ModuleKind::Adapter).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&ModuleId::new("bank"), ModuleKind::Extension).is_some());
        assert_eq!(registry.id_of(addr), None);
    }

    #[test]
    fn config_store_dispatches_on_tag() {
        let mut store = ConfigStore::new();
        let signer = Address::derive("signer");

        store.apply(&Configuration::numeric("voting.period", 10));
        store.apply(&Configuration::address("manager.signerAddress", signer));

        assert_eq!(store.configuration("voting.period"), Some(10));
        assert_eq!(store.address_configuration("manager.signerAddress"), Some(signer));
        assert_eq!(store.configuration("manager.signerAddress"), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn config_store_upserts() {
        let mut store = ConfigStore::new();
        store.apply(&Configuration::numeric("quorum", 10));
        store.apply(&Configuration::numeric("quorum", 20));
        assert_eq!(store.configuration("quorum"), Some(20));
        assert_eq!(store.entries().count(), 1);
    }
}
