//! Integration tests for Guildhall CLI commands.
//!
//! Uses tempfile for testing database and key files.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use guildhall::cli::{
    CliError, ProposalRequest, cmd_add_member, cmd_exit_drain, cmd_exit_start, cmd_fund,
    cmd_init, cmd_keygen, cmd_process, cmd_register_token, cmd_sign, cmd_status,
    load_organization, open_store, read_key,
};
use guildhall_core::{
    Address, ConfigValue, ExitStatus, GuildError, ModuleId, ProposalDetails, ProposalId, dao_acl,
};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Create a temporary directory for tests.
fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Initialize an organization "dao" governed by a freshly generated key.
fn init_dao(temp: &TempDir) -> (PathBuf, PathBuf) {
    let db_path = temp.path().join("guildhall.redb");
    let key_path = temp.path().join("authorizer.key");
    let signer = cmd_keygen(&key_path, false, false).unwrap();
    cmd_init(&db_path, "dao", 1, Some(signer), None, false, false).unwrap();
    (db_path, key_path)
}

/// Write a request file for `proposal`.
fn write_request(temp: &TempDir, id: &str, nonce: u64, proposal: ProposalDetails) -> PathBuf {
    let path = temp.path().join(format!("{id}.request.json"));
    let request = ProposalRequest {
        proposal_id: ProposalId::new(id),
        nonce,
        proposal,
        configs: Vec::new(),
    };
    std::fs::write(&path, serde_json::to_string_pretty(&request).unwrap()).unwrap();
    path
}

fn sign_and_process(
    db_path: &Path,
    key_path: &Path,
    request: &Path,
) -> Result<(), CliError> {
    let coupon = request.with_extension("coupon");
    cmd_sign(db_path, "dao", request, key_path, &coupon, true, false)?;
    cmd_process(db_path, "dao", request, &coupon, false)
}

fn onboarding() -> ProposalDetails {
    ProposalDetails::adapter(
        ModuleId::new("onboarding"),
        Address::derive("onboarding-v1"),
        dao_acl::NEW_MEMBER,
    )
}

// =============================================================================
// INIT / KEYGEN
// =============================================================================

#[test]
fn test_init_creates_organization() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);

    assert!(db_path.exists());
    let store = open_store(&db_path).unwrap();
    let org = load_organization(&store, "dao").unwrap();
    assert!(org.adapter_address(&ModuleId::new(ModuleId::MANAGER)).is_ok());
    assert!(org.extension_address(&ModuleId::new(ModuleId::BANK)).is_ok());
}

#[test]
fn test_init_fails_if_exists_without_force() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);

    let result = cmd_init(&db_path, "dao", 1, None, None, false, false);
    assert!(matches!(result, Err(CliError::AlreadyExists(_))));

    let result = cmd_init(&db_path, "dao", 1, None, None, true, false);
    assert!(result.is_ok());
}

#[test]
fn test_keygen_refuses_overwrite() {
    let temp = create_temp_dir();
    let key_path = temp.path().join("k.key");

    let address = cmd_keygen(&key_path, false, true).unwrap();
    assert_eq!(read_key(&key_path).unwrap().address(), address);
    assert!(matches!(
        cmd_keygen(&key_path, false, false),
        Err(CliError::FileExists(_))
    ));
}

#[test]
fn test_read_key_rejects_garbage() {
    let temp = create_temp_dir();
    let key_path = temp.path().join("bad.key");
    std::fs::write(&key_path, "not base64 at all!").unwrap();
    assert!(matches!(read_key(&key_path), Err(CliError::Key(_))));
}

#[test]
fn test_unknown_organization() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    let result = cmd_fund(&db_path, "ghost", Address::derive("usdc"), 1, false);
    assert!(matches!(result, Err(CliError::NotFound(_))));
}

// =============================================================================
// SIGN / PROCESS
// =============================================================================

#[test]
fn test_sign_and_process_adds_adapter() {
    let temp = create_temp_dir();
    let (db_path, key_path) = init_dao(&temp);
    let request = write_request(&temp, "p1", 1, onboarding());

    sign_and_process(&db_path, &key_path, &request).unwrap();

    let store = open_store(&db_path).unwrap();
    let org = load_organization(&store, "dao").unwrap();
    assert_eq!(
        org.adapter_address(&ModuleId::new("onboarding")).ok(),
        Some(Address::derive("onboarding-v1"))
    );
    assert_eq!(org.coordinator_state().last_nonce(), 1);
}

#[test]
fn test_process_rejects_coupon_from_other_key() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    let rogue_key = temp.path().join("rogue.key");
    cmd_keygen(&rogue_key, false, false).unwrap();
    let request = write_request(&temp, "p1", 1, onboarding());

    let result = sign_and_process(&db_path, &rogue_key, &request);
    assert!(matches!(
        result,
        Err(CliError::Core(GuildError::InvalidSignature))
    ));
}

#[test]
fn test_failed_process_persists_burned_id() {
    let temp = create_temp_dir();
    let (db_path, key_path) = init_dao(&temp);

    let mut bad = onboarding();
    bad.module_address = Address::GUILD;
    let request = write_request(&temp, "p1", 1, bad);
    assert!(sign_and_process(&db_path, &key_path, &request).is_err());

    let request = write_request(&temp, "p1", 2, onboarding());
    let result = sign_and_process(&db_path, &key_path, &request);
    assert!(matches!(
        result,
        Err(CliError::Core(GuildError::DuplicateProposalId(_)))
    ));
}

#[test]
fn test_process_writes_configuration() {
    let temp = create_temp_dir();
    let (db_path, key_path) = init_dao(&temp);
    let proposal =
        ProposalDetails::configs().with_config("voting.period", ConfigValue::Numeric(86_400));
    let request = write_request(&temp, "cfg", 1, proposal);

    sign_and_process(&db_path, &key_path, &request).unwrap();

    let store = open_store(&db_path).unwrap();
    let org = load_organization(&store, "dao").unwrap();
    assert_eq!(org.configuration("voting.period"), Some(86_400));
}

// =============================================================================
// MEMBERS / TREASURY / EXIT
// =============================================================================

#[test]
fn test_full_exit_flow() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    let alice = Address::derive("alice");
    let usdc = Address::derive("usdc");

    cmd_add_member(&db_path, "dao", alice, 100, 0, false).unwrap();
    cmd_add_member(&db_path, "dao", Address::derive("bob"), 900, 0, false).unwrap();
    cmd_register_token(&db_path, "dao", usdc, false).unwrap();
    cmd_fund(&db_path, "dao", usdc, 500, false).unwrap();

    cmd_exit_start(&db_path, "dao", alice, 40, 0, false).unwrap();
    let status = cmd_exit_drain(&db_path, "dao", alice, 1, true).unwrap();
    assert_eq!(status, ExitStatus::Done);

    let store = open_store(&db_path).unwrap();
    let org = load_organization(&store, "dao").unwrap();
    assert_eq!(org.balance_of(alice, usdc), 20);
    assert!(org.members().is_active_member(alice));
    assert!(org.block() >= 6);
}

#[test]
fn test_operator_exit_requires_membership() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    let stranger = Address::derive("stranger");

    let result = cmd_exit_start(&db_path, "dao", stranger, 1, 0, false);
    assert!(matches!(
        result,
        Err(CliError::Core(GuildError::NotAMember(member))) if member == stranger
    ));

    let store = open_store(&db_path).unwrap();
    let org = load_organization(&store, "dao").unwrap();
    assert!(org.exit_record(stranger).is_none());
}

#[test]
fn test_exit_drain_without_start() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    let alice = Address::derive("alice");
    cmd_add_member(&db_path, "dao", alice, 100, 0, false).unwrap();

    let result = cmd_exit_drain(&db_path, "dao", alice, 1, false);
    assert!(matches!(
        result,
        Err(CliError::Core(GuildError::ExitNotInProgress(_)))
    ));
}

#[test]
fn test_status_modes() {
    let temp = create_temp_dir();
    let (db_path, _) = init_dao(&temp);
    cmd_add_member(&db_path, "dao", Address::derive("alice"), 1, 0, false).unwrap();

    assert!(cmd_status(&db_path, Some("dao"), false).is_ok());
    assert!(cmd_status(&db_path, Some("dao"), true).is_ok());
    assert!(cmd_status(&db_path, None, false).is_ok());
    assert!(cmd_status(&db_path, None, true).is_ok());
    assert!(cmd_status(&db_path, Some("ghost"), false).is_err());
}
