//! # Balance Ledger and Membership
//!
//! The [`Ledger`] trait is the narrow interface the exit engine consumes:
//! balances per (account, asset), credit/debit/transfer, and the ordered
//! list of external assets. [`Bank`] is the in-memory implementation used
//! by an organization.
//!
//! Credits and debits also move the [`Address::TOTAL`] account so the
//! organization-wide supply of every asset is a single lookup. Transfers
//! between accounts leave totals untouched.

use crate::error::{GuildError, GuildResult};
use crate::primitives::{Address, Amount};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// LEDGER TRAIT
// =============================================================================

pub trait Ledger {
    /// Balance of `asset` held by `account`. Unknown pairs read as zero.
    fn balance_of(&self, account: Address, asset: Address) -> Amount;

    /// Credit `account` (and the asset total).
    fn add_to_balance(&mut self, account: Address, asset: Address, amount: Amount)
    -> GuildResult<()>;

    /// Debit `account` (and the asset total).
    fn subtract_from_balance(
        &mut self,
        account: Address,
        asset: Address,
        amount: Amount,
    ) -> GuildResult<()>;

    /// Move `amount` of `asset` between two accounts.
    fn internal_transfer(
        &mut self,
        from: Address,
        to: Address,
        asset: Address,
        amount: Amount,
    ) -> GuildResult<()>;

    /// External assets in registration order.
    fn tokens(&self) -> &[Address];

    /// Ownership-unit assets (shares, loot, locked loot).
    fn is_internal_token(&self, asset: Address) -> bool;
}

// =============================================================================
// BANK
// =============================================================================

/// In-memory balance ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bank {
    /// (account, asset) -> balance
    balances: BTreeMap<(Address, Address), Amount>,

    /// External assets, registration order. Drained in this order.
    tokens: Vec<Address>,

    /// Ownership-unit assets.
    internal_tokens: Vec<Address>,
}

impl Default for Bank {
    fn default() -> Self {
        Self::new()
    }
}

impl Bank {
    /// Create a bank with shares, loot and locked loot registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            balances: BTreeMap::new(),
            tokens: Vec::new(),
            internal_tokens: vec![Address::UNITS, Address::LOOT, Address::LOCKED_LOOT],
        }
    }

    /// Register an external asset, appending it to the drain order.
    pub fn register_token(&mut self, asset: Address, max_tokens: u128) -> GuildResult<()> {
        if asset.is_zero() || asset.is_reserved() {
            return Err(GuildError::ReservedAddress(asset));
        }
        if self.is_token(asset) {
            return Err(GuildError::TokenAlreadyRegistered(asset));
        }
        if self.tokens.len() as u128 >= max_tokens {
            return Err(GuildError::TooManyTokens { limit: max_tokens });
        }
        self.tokens.push(asset);
        Ok(())
    }

    /// True for registered external or internal assets.
    #[must_use]
    pub fn is_token(&self, asset: Address) -> bool {
        self.tokens.contains(&asset) || self.internal_tokens.contains(&asset)
    }

    /// Organization-wide supply of `asset`.
    #[must_use]
    pub fn total(&self, asset: Address) -> Amount {
        self.balance_of(Address::TOTAL, asset)
    }

    /// Shares + loot + locked loot outstanding across the organization.
    #[must_use]
    pub fn total_units(&self) -> Amount {
        self.total(Address::UNITS)
            .saturating_add(self.total(Address::LOOT))
            .saturating_add(self.total(Address::LOCKED_LOOT))
    }

    fn credit(&mut self, account: Address, asset: Address, amount: Amount) -> GuildResult<()> {
        let balance = self.balances.entry((account, asset)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(GuildError::BalanceOverflow { account })?;
        Ok(())
    }

    fn debit(&mut self, account: Address, asset: Address, amount: Amount) -> GuildResult<()> {
        let available = self.balance_of(account, asset);
        let remaining = available
            .checked_sub(amount)
            .ok_or(GuildError::InsufficientBalance {
                account,
                asset,
                available,
                requested: amount,
            })?;
        if remaining == 0 {
            self.balances.remove(&(account, asset));
        } else {
            self.balances.insert((account, asset), remaining);
        }
        Ok(())
    }

    fn require_token(&self, asset: Address) -> GuildResult<()> {
        if self.is_token(asset) {
            Ok(())
        } else {
            Err(GuildError::TokenNotRegistered(asset))
        }
    }
}

impl Ledger for Bank {
    fn balance_of(&self, account: Address, asset: Address) -> Amount {
        self.balances.get(&(account, asset)).copied().unwrap_or(0)
    }

    fn add_to_balance(
        &mut self,
        account: Address,
        asset: Address,
        amount: Amount,
    ) -> GuildResult<()> {
        self.require_token(asset)?;
        // Check the total first so a failed credit leaves no partial write.
        self.total(asset)
            .checked_add(amount)
            .ok_or(GuildError::BalanceOverflow {
                account: Address::TOTAL,
            })?;
        self.credit(account, asset, amount)?;
        self.credit(Address::TOTAL, asset, amount)
    }

    fn subtract_from_balance(
        &mut self,
        account: Address,
        asset: Address,
        amount: Amount,
    ) -> GuildResult<()> {
        if self.total(asset) < amount {
            return Err(GuildError::StructuralInvariantViolation(
                "asset total below account balance",
            ));
        }
        self.debit(account, asset, amount)?;
        self.debit(Address::TOTAL, asset, amount)
    }

    fn internal_transfer(
        &mut self,
        from: Address,
        to: Address,
        asset: Address,
        amount: Amount,
    ) -> GuildResult<()> {
        self.require_token(asset)?;
        self.balance_of(to, asset)
            .checked_add(amount)
            .ok_or(GuildError::BalanceOverflow { account: to })?;
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    fn tokens(&self) -> &[Address] {
        &self.tokens
    }

    fn is_internal_token(&self, asset: Address) -> bool {
        self.internal_tokens.contains(&asset)
    }
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFlags {
    pub jailed: bool,
}

/// Membership registry with the jailing side effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    members: BTreeMap<Address, MemberFlags>,
}

impl Members {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member: Address) -> GuildResult<()> {
        if member.is_zero() || member.is_reserved() {
            return Err(GuildError::ReservedAddress(member));
        }
        if self.members.contains_key(&member) {
            return Err(GuildError::MemberAlreadyExists(member));
        }
        self.members.insert(member, MemberFlags::default());
        Ok(())
    }

    #[must_use]
    pub fn is_member(&self, member: Address) -> bool {
        self.members.contains_key(&member)
    }

    #[must_use]
    pub fn is_jailed(&self, member: Address) -> bool {
        self.members.get(&member).is_some_and(|flags| flags.jailed)
    }

    /// Member and not jailed: may take part in governance.
    #[must_use]
    pub fn is_active_member(&self, member: Address) -> bool {
        self.members.get(&member).is_some_and(|flags| !flags.jailed)
    }

    pub fn jail(&mut self, member: Address) -> GuildResult<()> {
        let flags = self
            .members
            .get_mut(&member)
            .ok_or(GuildError::NotAMember(member))?;
        flags.jailed = true;
        Ok(())
    }

    pub fn unjail(&mut self, member: Address) -> GuildResult<()> {
        let flags = self
            .members
            .get_mut(&member)
            .ok_or(GuildError::NotAMember(member))?;
        flags.jailed = false;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &MemberFlags)> {
        self.members.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
