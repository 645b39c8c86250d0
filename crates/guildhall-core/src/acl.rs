//! # Access Control Table
//!
//! Two tables:
//! - organization-level flags per module address (`dao_acl` bits)
//! - per-(module, extension) flags (`bank_acl` bits for the bank)
//!
//! A missing entry reads as [`AclFlags::NONE`]. Writes overwrite, they never
//! merge with a prior grant.

use crate::error::{GuildError, GuildResult};
use crate::primitives::{AclFlags, Address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTable {
    /// module address -> organization-level flags
    dao: BTreeMap<Address, AclFlags>,

    /// (module address, extension address) -> flags
    extensions: BTreeMap<(Address, Address), AclFlags>,
}

impl AccessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Organization-level flags of a module.
    #[must_use]
    pub fn flags(&self, module: Address) -> AclFlags {
        self.dao.get(&module).copied().unwrap_or(AclFlags::NONE)
    }

    /// Overwrite a module's organization-level flags.
    ///
    /// Writing `NONE` drops the entry.
    pub fn set_flags(&mut self, module: Address, flags: AclFlags) {
        if flags.is_empty() {
            self.dao.remove(&module);
        } else {
            self.dao.insert(module, flags);
        }
    }

    /// Drop a module's organization-level flags.
    pub fn revoke(&mut self, module: Address) {
        self.dao.remove(&module);
    }

    #[must_use]
    pub fn has_access(&self, module: Address, flag: AclFlags) -> bool {
        self.flags(module).contains(flag)
    }

    /// Fail with `AccessDenied` unless `module` holds every bit of `flag`.
    pub fn require(&self, module: Address, flag: AclFlags) -> GuildResult<()> {
        if self.has_access(module, flag) {
            Ok(())
        } else {
            Err(GuildError::AccessDenied {
                module,
                required: flag.bits(),
            })
        }
    }

    /// Flags `module` holds against `extension`.
    #[must_use]
    pub fn extension_flags(&self, module: Address, extension: Address) -> AclFlags {
        self.extensions
            .get(&(module, extension))
            .copied()
            .unwrap_or(AclFlags::NONE)
    }

    /// Overwrite the flags `module` holds against `extension`.
    pub fn set_extension_flags(&mut self, module: Address, extension: Address, flags: AclFlags) {
        if flags.is_empty() {
            self.extensions.remove(&(module, extension));
        } else {
            self.extensions.insert((module, extension), flags);
        }
    }

    #[must_use]
    pub fn has_adapter_access_to_extension(
        &self,
        module: Address,
        extension: Address,
        flag: AclFlags,
    ) -> bool {
        self.extension_flags(module, extension).contains(flag)
    }

    /// Fail with `AccessDenied` unless `module` holds `flag` against `extension`.
    pub fn require_extension(
        &self,
        module: Address,
        extension: Address,
        flag: AclFlags,
    ) -> GuildResult<()> {
        if self.has_adapter_access_to_extension(module, extension, flag) {
            Ok(())
        } else {
            Err(GuildError::AccessDenied {
                module,
                required: flag.bits(),
            })
        }
    }

    /// Number of modules with organization-level flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dao.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dao.is_empty()
    }
}
