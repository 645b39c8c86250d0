//! # Exit Engine
//!
//! A member burns ownership units and receives a proportional share of every
//! pooled asset:
//!
//! ```text
//! NotStarted --start_exit--> InProgress --drain_exit (to end)--> Done
//! ```
//!
//! Starting an exit snapshots the organization's total units, burns the
//! member's units and jails the member. Payouts are made asset by asset,
//! in registration order, across as many `drain_exit` calls as needed; the
//! record's cursor is the resume point. The snapshot stays fixed for the
//! whole exit while each asset's balance is read at drain time.

use crate::error::{GuildError, GuildResult};
use crate::ledger::Ledger;
use crate::organization::Organization;
use crate::primitives::{Address, Amount, BlockNumber, ModuleId, bank_acl, dao_acl};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

// =============================================================================
// EXIT RECORD
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::InProgress => f.write_str("in progress"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Per-member exit progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub status: ExitStatus,
    /// Block at which the exit started.
    pub started_at: BlockNumber,
    /// Shares + loot + locked loot across the organization before the burn.
    pub initial_total_units: Amount,
    /// Units burned by this exit.
    pub units_to_burn: Amount,
    /// Next asset to pay out, as an index into the asset list.
    pub current_index: u64,
}

// =============================================================================
// FAIR SHARE
// =============================================================================

/// `balance * units / total_units`, rounded down.
///
/// When the product overflows, falls back to
/// `(balance / total_units) * units`, which loses precision instead of
/// failing.
pub fn fair_share(balance: Amount, units: Amount, total_units: Amount) -> GuildResult<Amount> {
    if total_units == 0 {
        return Err(GuildError::StructuralInvariantViolation(
            "total units must be greater than zero",
        ));
    }
    if balance == 0 {
        return Ok(0);
    }
    let product = balance.wrapping_mul(units);
    if product / balance == units {
        Ok(product / total_units)
    } else {
        Ok((balance / total_units).wrapping_mul(units))
    }
}

// =============================================================================
// RAGEQUIT
// =============================================================================

/// The exit-engine adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ragequit {
    address: Address,
}

impl Ragequit {
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// The exit engine holds no funds.
    pub fn receive_native(&self, _amount: u128) -> GuildResult<()> {
        Err(GuildError::NativeTransferRejected)
    }

    /// Burn `shares` and `loot` of `caller` and open an exit for them.
    ///
    /// `caller` is taken as already authenticated by the embedding layer.
    pub fn start_exit(
        &self,
        org: &mut Organization,
        caller: Address,
        shares: Amount,
        loot: Amount,
    ) -> GuildResult<()> {
        if !org.members.is_member(caller) {
            return Err(GuildError::NotAMember(caller));
        }
        if org
            .exits
            .get(&caller)
            .is_some_and(|record| record.status == ExitStatus::InProgress)
        {
            return Err(GuildError::ExitAlreadyInProgress(caller));
        }

        let available_shares = org.bank.balance_of(caller, Address::UNITS);
        if available_shares < shares {
            return Err(GuildError::InsufficientShares {
                available: available_shares,
                requested: shares,
            });
        }
        let available_loot = org.bank.balance_of(caller, Address::LOOT);
        if available_loot < loot {
            return Err(GuildError::InsufficientLoot {
                available: available_loot,
                requested: loot,
            });
        }

        self.require_access(org)?;

        let initial_total_units = org.bank.total_units();
        if initial_total_units == 0 {
            return Err(GuildError::StructuralInvariantViolation(
                "total units must be greater than zero",
            ));
        }
        let units_to_burn = shares
            .checked_add(loot)
            .ok_or(GuildError::StructuralInvariantViolation("units to burn overflow"))?;

        let mut bank = org.bank.clone();
        bank.subtract_from_balance(caller, Address::UNITS, shares)?;
        bank.subtract_from_balance(caller, Address::LOOT, loot)?;
        org.members.jail(caller)?;
        org.bank = bank;

        org.exits.insert(
            caller,
            ExitRecord {
                status: ExitStatus::InProgress,
                started_at: org.block,
                initial_total_units,
                units_to_burn,
                current_index: 0,
            },
        );

        info!(
            member = %caller,
            shares,
            loot,
            initial_total_units,
            block = org.block,
            "exit started"
        );
        Ok(())
    }

    /// Pay out `member`'s share of assets `[cursor, to_index)`.
    ///
    /// `to_index` is clamped at the asset-list length. Reaching the end of
    /// the list completes the exit and releases the member from jail.
    pub fn drain_exit(
        &self,
        org: &mut Organization,
        member: Address,
        to_index: u64,
    ) -> GuildResult<ExitStatus> {
        let mut record = match org.exits.get(&member) {
            Some(record) if record.status == ExitStatus::InProgress => *record,
            _ => return Err(GuildError::ExitNotInProgress(member)),
        };
        if to_index < record.current_index {
            return Err(GuildError::IndexTooLow {
                to_index,
                cursor: record.current_index,
            });
        }

        self.require_access(org)?;

        let mut bank = org.bank.clone();
        let upper = settle(&mut bank, member, &record, to_index)?;
        let finished = upper as usize >= bank.tokens().len();

        if finished {
            org.members.unjail(member)?;
            record.status = ExitStatus::Done;
        }
        record.current_index = upper;
        org.bank = bank;
        org.exits.insert(member, record);

        if finished {
            info!(member = %member, "exit completed");
        } else {
            debug!(member = %member, cursor = upper, "exit drained");
        }
        Ok(record.status)
    }

    fn require_access(&self, org: &Organization) -> GuildResult<()> {
        org.acl.require(self.address, dao_acl::JAIL_MEMBER)?;
        let bank = org.extension_address(&ModuleId::new(ModuleId::BANK))?;
        org.acl
            .require_extension(self.address, bank, bank_acl::SUB_FROM_BALANCE)?;
        org.acl
            .require_extension(self.address, bank, bank_acl::INTERNAL_TRANSFER)
    }
}

/// Transfer the fair share of each asset in `[cursor, to_index)` from the
/// treasury to `member`. Returns the clamped upper bound.
fn settle<L: Ledger>(
    ledger: &mut L,
    member: Address,
    record: &ExitRecord,
    to_index: u64,
) -> GuildResult<u64> {
    let assets: Vec<Address> = ledger.tokens().to_vec();
    let upper = to_index.min(assets.len() as u64);

    for index in record.current_index..upper {
        let Some(&asset) = assets.get(index as usize) else {
            break;
        };
        let balance = ledger.balance_of(Address::GUILD, asset);
        let payout = fair_share(balance, record.units_to_burn, record.initial_total_units)?;
        if payout > 0 {
            ledger.internal_transfer(Address::GUILD, member, asset, payout)?;
        }
        debug!(member = %member, %asset, index, balance, payout, "asset paid out");
    }

    Ok(upper)
}

// =============================================================================
// TESTS
// =============================================================================
