//! # CLI Commands
//!
//! One `cmd_*` function per subcommand. Each opens the organization store,
//! loads the named organization, applies one operation and saves it back.
//!
//! Key material and coupons are exchanged as files:
//! - key file: base64 of the 32-byte Ed25519 secret
//! - request file: JSON [`ProposalRequest`]
//! - coupon file: JSON [`CouponFile`]
//!
//! Only `process` is authenticated (by the coupon). The member, treasury and
//! exit commands act with operator authority: whoever can write the database
//! is trusted to speak for the members named on the command line.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signature, SigningKey};
use guildhall_core::{
    Address, Amount, Configuration, Coupon, CouponSigner, ExitStatus, GuildError, GuildResult,
    Ledger, Manager, ModuleId, Organization, OrganizationBuilder, ProposalDetails, ProposalId,
    Ragequit, RedbStore,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] GuildError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("organization already exists: {0} (use --force to overwrite)")]
    AlreadyExists(String),

    #[error("organization not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0} (use --force to overwrite)")]
    FileExists(PathBuf),
}

pub type CliResult<T> = Result<T, CliError>;

// =============================================================================
// FILE FORMATS
// =============================================================================

/// A proposal to be signed by the authorizer and then processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    pub proposal_id: ProposalId,
    pub nonce: u64,
    pub proposal: ProposalDetails,
    #[serde(default)]
    pub configs: Vec<Configuration>,
}

/// JSON form of a [`Coupon`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponFile {
    pub signer: Address,
    /// Base64 of the 64-byte signature.
    pub signature: String,
}

impl From<&Coupon> for CouponFile {
    fn from(coupon: &Coupon) -> Self {
        Self {
            signer: coupon.signer,
            signature: STANDARD.encode(coupon.signature.to_bytes()),
        }
    }
}

impl TryFrom<CouponFile> for Coupon {
    type Error = CliError;

    fn try_from(file: CouponFile) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(file.signature.trim())
            .map_err(|e| CliError::Key(format!("signature is not base64: {e}")))?;
        let bytes: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CliError::Key("signature must be 64 bytes".to_string()))?;
        Ok(Coupon {
            signer: file.signer,
            signature: Signature::from_bytes(&bytes),
        })
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Parse an address argument.
///
/// Accepts 64 hex digits (optionally `0x`-prefixed) or `@label`, which
/// derives a deterministic address from the label.
pub fn parse_address(arg: &str) -> Result<Address, String> {
    match arg.strip_prefix('@') {
        Some(label) if !label.is_empty() => Ok(Address::derive(label)),
        Some(_) => Err("empty label".to_string()),
        None => arg.parse().map_err(|e: GuildError| e.to_string()),
    }
}

fn read_file(path: &Path) -> CliResult<String> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, content: &str, force: bool) -> CliResult<()> {
    if path.exists() && !force {
        return Err(CliError::FileExists(path.to_path_buf()));
    }
    std::fs::write(path, content).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> CliResult<T> {
    let content = read_file(path)?;
    serde_json::from_str(&content).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T, force: bool) -> CliResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_file(path, &content, force)
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to render JSON: {e}"),
    }
}

pub fn open_store(db_path: &Path) -> CliResult<RedbStore> {
    Ok(RedbStore::open(db_path)?)
}

pub fn load_organization(store: &RedbStore, name: &str) -> CliResult<Organization> {
    store
        .get(name)?
        .ok_or_else(|| CliError::NotFound(name.to_string()))
}

/// The coordinator registered in `org`.
fn manager_of(org: &Organization) -> GuildResult<Manager> {
    org.adapter_address(&ModuleId::new(ModuleId::MANAGER))
        .map(Manager::new)
}

/// The exit engine registered in `org`.
fn ragequit_of(org: &Organization) -> GuildResult<Ragequit> {
    org.adapter_address(&ModuleId::new(ModuleId::RAGEQUIT))
        .map(Ragequit::new)
}

pub fn read_key(path: &Path) -> CliResult<CouponSigner> {
    let content = read_file(path)?;
    let bytes = STANDARD
        .decode(content.trim())
        .map_err(|e| CliError::Key(format!("key is not base64: {e}")))?;
    let secret: [u8; 32] = bytes
        .try_into()
        .map_err(|_| CliError::Key("key must be 32 bytes".to_string()))?;
    Ok(CouponSigner::from_bytes(&secret))
}

/// Load, mutate, save. The organization is saved even when `apply` fails,
/// so a proposal id consumed by a failed call stays consumed.
fn with_organization<T>(
    db_path: &Path,
    name: &str,
    apply: impl FnOnce(&mut Organization) -> Result<T, GuildError>,
) -> CliResult<T> {
    let store = open_store(db_path)?;
    let mut org = load_organization(&store, name)?;
    org.advance_block();
    let result = apply(&mut org);
    store.save(&org)?;
    Ok(result?)
}

// =============================================================================
// COMMANDS
// =============================================================================

/// Create an organization with its bank, coordinator and exit engine.
pub fn cmd_init(
    db_path: &Path,
    name: &str,
    chain_id: u64,
    signer: Option<Address>,
    max_tokens: Option<u128>,
    force: bool,
    json_mode: bool,
) -> CliResult<()> {
    let store = open_store(db_path)?;
    if store.contains(name) && !force {
        return Err(CliError::AlreadyExists(name.to_string()));
    }

    let mut builder = OrganizationBuilder::new(name).chain_id(chain_id);
    if let Some(signer) = signer {
        builder = builder.signer(signer);
    }
    if let Some(limit) = max_tokens {
        builder = builder.max_external_tokens(limit);
    }
    let built = builder.build()?;
    store.save(&built.organization)?;

    info!(name, "organization initialized");
    if json_mode {
        print_json(&json!({
            "name": name,
            "address": built.organization.address(),
            "chain_id": chain_id,
            "manager": built.manager.address(),
            "ragequit": built.ragequit.address(),
        }));
    } else {
        println!("Initialized organization '{}' at {}", name, built.organization.address());
        println!("  manager:  {}", built.manager.address());
        println!("  ragequit: {}", built.ragequit.address());
    }
    Ok(())
}

/// Generate an authorizer key and write it to `out`.
pub fn cmd_keygen(out: &Path, force: bool, json_mode: bool) -> CliResult<Address> {
    let signer = CouponSigner::new(SigningKey::generate(&mut rand::rngs::OsRng));
    write_file(out, &STANDARD.encode(signer.secret_bytes()), force)?;

    let address = signer.address();
    if json_mode {
        print_json(&json!({ "address": address, "key_file": out }));
    } else {
        println!("Wrote key to {}", out.display());
        println!("  signer address: {address}");
    }
    Ok(address)
}

/// Sign the request in `request_path` for organization `name`.
pub fn cmd_sign(
    db_path: &Path,
    name: &str,
    request_path: &Path,
    key_path: &Path,
    out: &Path,
    force: bool,
    json_mode: bool,
) -> CliResult<()> {
    let store = open_store(db_path)?;
    let org = load_organization(&store, name)?;
    let request: ProposalRequest = read_json(request_path)?;
    let signer = read_key(key_path)?;
    let manager = manager_of(&org)?;

    let message = manager.coupon_message(
        &org,
        &request.proposal_id,
        &request.proposal,
        &request.configs,
        request.nonce,
    );
    let coupon = signer.sign(&message)?;
    write_json(out, &CouponFile::from(&coupon), force)?;

    if json_mode {
        print_json(&json!({
            "proposal_id": request.proposal_id,
            "nonce": request.nonce,
            "signer": coupon.signer,
            "coupon_file": out,
        }));
    } else {
        println!(
            "Signed proposal '{}' (nonce {}) as {}",
            request.proposal_id, request.nonce, coupon.signer
        );
    }
    Ok(())
}

/// Verify and apply a signed request.
pub fn cmd_process(
    db_path: &Path,
    name: &str,
    request_path: &Path,
    coupon_path: &Path,
    json_mode: bool,
) -> CliResult<()> {
    let request: ProposalRequest = read_json(request_path)?;
    let coupon: Coupon = read_json::<CouponFile>(coupon_path)?.try_into()?;

    with_organization(db_path, name, |org| {
        manager_of(org)?.process_signed_proposal(
            org,
            request.proposal_id.clone(),
            &request.proposal,
            &request.configs,
            request.nonce,
            &coupon,
        )
    })?;

    if json_mode {
        print_json(&json!({ "applied": request.proposal_id, "nonce": request.nonce }));
    } else {
        println!("Applied proposal '{}'", request.proposal_id);
    }
    Ok(())
}

pub fn cmd_add_member(
    db_path: &Path,
    name: &str,
    member: Address,
    shares: Amount,
    loot: Amount,
    json_mode: bool,
) -> CliResult<()> {
    with_organization(db_path, name, |org| org.add_member(member, shares, loot))?;

    if json_mode {
        print_json(&json!({ "member": member, "shares": shares, "loot": loot }));
    } else {
        println!("Added member {member} with {shares} shares and {loot} loot");
    }
    Ok(())
}

/// Credit the treasury with `amount` of `asset`.
pub fn cmd_fund(
    db_path: &Path,
    name: &str,
    asset: Address,
    amount: Amount,
    json_mode: bool,
) -> CliResult<()> {
    let balance = with_organization(db_path, name, |org| {
        org.fund(asset, amount)?;
        Ok(org.balance_of(Address::GUILD, asset))
    })?;

    if json_mode {
        print_json(&json!({ "asset": asset, "treasury_balance": balance }));
    } else {
        println!("Treasury now holds {balance} of {asset}");
    }
    Ok(())
}

pub fn cmd_register_token(
    db_path: &Path,
    name: &str,
    asset: Address,
    json_mode: bool,
) -> CliResult<()> {
    let count = with_organization(db_path, name, |org| {
        org.register_token(asset)?;
        Ok(org.bank().tokens().len())
    })?;

    if json_mode {
        print_json(&json!({ "asset": asset, "index": count - 1 }));
    } else {
        println!("Registered {asset} at index {}", count - 1);
    }
    Ok(())
}

/// Open an exit for `member`, burning the given shares and loot.
///
/// The operator is trusted to act for `member`; the CLI does not ask the
/// member for proof. Embedders that expose exits to members directly must
/// authenticate the caller before calling [`Ragequit::start_exit`].
pub fn cmd_exit_start(
    db_path: &Path,
    name: &str,
    member: Address,
    shares: Amount,
    loot: Amount,
    json_mode: bool,
) -> CliResult<()> {
    with_organization(db_path, name, |org| {
        ragequit_of(org)?.start_exit(org, member, shares, loot)
    })?;

    if json_mode {
        print_json(&json!({ "member": member, "status": ExitStatus::InProgress }));
    } else {
        println!("Exit started for {member}: burned {shares} shares and {loot} loot");
    }
    Ok(())
}

pub fn cmd_exit_drain(
    db_path: &Path,
    name: &str,
    member: Address,
    to_index: u64,
    json_mode: bool,
) -> CliResult<ExitStatus> {
    let status = with_organization(db_path, name, |org| {
        ragequit_of(org)?.drain_exit(org, member, to_index)
    })?;

    if json_mode {
        print_json(&json!({ "member": member, "status": status }));
    } else {
        println!("Exit for {member}: {status}");
    }
    Ok(status)
}

/// Print one organization, or list all when `name` is `None`.
pub fn cmd_status(db_path: &Path, name: Option<&str>, json_mode: bool) -> CliResult<()> {
    let store = open_store(db_path)?;

    let Some(name) = name else {
        let names = store.list()?;
        if json_mode {
            print_json(&json!({ "organizations": names }));
        } else if names.is_empty() {
            println!("No organizations");
        } else {
            for name in names {
                println!("{name}");
            }
        }
        return Ok(());
    };

    let org = load_organization(&store, name)?;
    let bank = org.bank();

    if json_mode {
        let modules: Vec<_> = org
            .registry()
            .iter()
            .map(|(id, entry)| {
                json!({
                    "id": id,
                    "kind": entry.kind,
                    "address": entry.address,
                    "flags": org.acl().flags(entry.address).bits(),
                })
            })
            .collect();
        let members: Vec<_> = org
            .members()
            .iter()
            .map(|(member, flags)| {
                json!({
                    "address": member,
                    "shares": bank.balance_of(*member, Address::UNITS),
                    "loot": bank.balance_of(*member, Address::LOOT),
                    "jailed": flags.jailed,
                })
            })
            .collect();
        let treasury: Vec<_> = bank
            .tokens()
            .iter()
            .map(|asset| json!({ "asset": asset, "balance": bank.balance_of(Address::GUILD, *asset) }))
            .collect();
        let exits: Vec<_> = org
            .exit_records()
            .map(|(member, record)| json!({ "member": member, "record": record }))
            .collect();
        let configs: Vec<_> = org.config().entries().collect();

        print_json(&json!({
            "name": org.name(),
            "address": org.address(),
            "chain_id": org.chain_id(),
            "block": org.block(),
            "last_nonce": org.coordinator_state().last_nonce(),
            "used_proposal_ids": org.coordinator_state().used_count(),
            "total_units": bank.total_units(),
            "modules": modules,
            "configs": configs,
            "members": members,
            "treasury": treasury,
            "exits": exits,
        }));
        return Ok(());
    }

    println!("Organization '{}' ({})", org.name(), org.address());
    println!("  chain id:   {}", org.chain_id());
    println!("  block:      {}", org.block());
    println!("  last nonce: {}", org.coordinator_state().last_nonce());
    println!("  total units: {}", bank.total_units());

    println!("Modules:");
    for (id, entry) in org.registry().iter() {
        println!(
            "  {:<12} {:<9} {} flags={:#x}",
            id.to_string(),
            entry.kind.to_string(),
            entry.address,
            org.acl().flags(entry.address).bits()
        );
    }

    println!("Members: {}", org.members().len());
    for (member, flags) in org.members().iter() {
        println!(
            "  {} shares={} loot={}{}",
            member,
            bank.balance_of(*member, Address::UNITS),
            bank.balance_of(*member, Address::LOOT),
            if flags.jailed { " (jailed)" } else { "" }
        );
    }

    println!("Treasury:");
    for asset in bank.tokens() {
        println!("  {} {}", asset, bank.balance_of(Address::GUILD, *asset));
    }

    for (member, record) in org.exit_records() {
        println!(
            "Exit {}: {} at asset {} (burned {} of {})",
            member,
            record.status,
            record.current_index,
            record.units_to_burn,
            record.initial_total_units
        );
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_accepts_hex_and_labels() {
        let derived = Address::derive("usdc");
        assert_eq!(parse_address("@usdc"), Ok(derived));
        assert_eq!(parse_address(&derived.to_string()), Ok(derived));
        assert_eq!(parse_address(&derived.to_hex()), Ok(derived));
        assert!(parse_address("@").is_err());
        assert!(parse_address("0x1234").is_err());
    }

    #[test]
    fn coupon_file_round_trips_signature() {
        let signer = CouponSigner::from_bytes(&[5u8; 32]);
        let signature = Signature::from_bytes(&[9u8; 64]);
        let coupon = Coupon {
            signer: signer.address(),
            signature,
        };
        let restored = Coupon::try_from(CouponFile::from(&coupon));
        assert!(matches!(restored, Ok(c) if c == coupon));
    }

    #[test]
    fn coupon_file_rejects_short_signature() {
        let file = CouponFile {
            signer: Address::derive("x"),
            signature: STANDARD.encode([1u8; 10]),
        };
        assert!(matches!(Coupon::try_from(file), Err(CliError::Key(_))));
    }
}
