//! # Guildhall
//!
//! Command-line front end for the Guildhall governance core.
//!
//! Organizations live in a redb database (`--db`, or `GUILDHALL_DB`).
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use clap::{Parser, Subcommand};
use guildhall::cli::{
    self, cmd_add_member, cmd_exit_drain, cmd_exit_start, cmd_fund, cmd_init, cmd_keygen,
    cmd_process, cmd_register_token, cmd_sign, cmd_status,
};
use guildhall_core::{Address, Amount};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "guildhall", version, about = "Guildhall DAO governance core")]
struct Cli {
    /// Path to the organization database
    #[arg(long, global = true, env = "GUILDHALL_DB", default_value = "guildhall.redb")]
    db: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an organization
    Init {
        name: String,
        #[arg(long, default_value_t = 1)]
        chain_id: u64,
        /// Coupon authorizer address
        #[arg(long, value_parser = cli::parse_address)]
        signer: Option<Address>,
        /// Cap on registered external assets
        #[arg(long)]
        max_tokens: Option<u128>,
        /// Overwrite an existing organization
        #[arg(long)]
        force: bool,
    },
    /// Generate an authorizer key file
    Keygen {
        #[arg(long, short)]
        out: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Sign a proposal request with an authorizer key
    Sign {
        #[arg(long)]
        org: String,
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        key: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Apply a signed proposal request
    Process {
        #[arg(long)]
        org: String,
        #[arg(long)]
        request: PathBuf,
        #[arg(long)]
        coupon: PathBuf,
    },
    /// Admit a member
    AddMember {
        #[arg(long)]
        org: String,
        #[arg(long, value_parser = cli::parse_address)]
        member: Address,
        #[arg(long, default_value_t = 0)]
        shares: Amount,
        #[arg(long, default_value_t = 0)]
        loot: Amount,
    },
    /// Credit the treasury
    Fund {
        #[arg(long)]
        org: String,
        #[arg(long, value_parser = cli::parse_address)]
        asset: Address,
        #[arg(long)]
        amount: Amount,
    },
    /// Register an external asset
    RegisterToken {
        #[arg(long)]
        org: String,
        #[arg(long, value_parser = cli::parse_address)]
        asset: Address,
    },
    /// Member exits
    Exit {
        #[command(subcommand)]
        action: ExitCommand,
    },
    /// Show an organization, or list all of them
    Status {
        #[arg(long)]
        org: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ExitCommand {
    /// Burn units and open an exit
    Start {
        #[arg(long)]
        org: String,
        #[arg(long, value_parser = cli::parse_address)]
        member: Address,
        #[arg(long, default_value_t = 0)]
        shares: Amount,
        #[arg(long, default_value_t = 0)]
        loot: Amount,
    },
    /// Pay out assets up to an index
    Drain {
        #[arg(long)]
        org: String,
        #[arg(long, value_parser = cli::parse_address)]
        member: Address,
        #[arg(long)]
        to_index: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("guildhall=info,guildhall_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> cli::CliResult<()> {
    let db = cli.db.as_path();
    let json = cli.json;

    match cli.command {
        Command::Init {
            name,
            chain_id,
            signer,
            max_tokens,
            force,
        } => cmd_init(db, &name, chain_id, signer, max_tokens, force, json),
        Command::Keygen { out, force } => cmd_keygen(&out, force, json).map(|_| ()),
        Command::Sign {
            org,
            request,
            key,
            out,
            force,
        } => cmd_sign(db, &org, &request, &key, &out, force, json),
        Command::Process {
            org,
            request,
            coupon,
        } => cmd_process(db, &org, &request, &coupon, json),
        Command::AddMember {
            org,
            member,
            shares,
            loot,
        } => cmd_add_member(db, &org, member, shares, loot, json),
        Command::Fund { org, asset, amount } => cmd_fund(db, &org, asset, amount, json),
        Command::RegisterToken { org, asset } => cmd_register_token(db, &org, asset, json),
        Command::Exit { action } => match action {
            ExitCommand::Start {
                org,
                member,
                shares,
                loot,
            } => cmd_exit_start(db, &org, member, shares, loot, json),
            ExitCommand::Drain {
                org,
                member,
                to_index,
            } => cmd_exit_drain(db, &org, member, to_index, json).map(|_| ()),
        },
        Command::Status { org } => cmd_status(db, org.as_deref(), json),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
