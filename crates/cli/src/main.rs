mod config;
mod error;

use std::path::PathBuf;

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use policy::{Address, Calldata, Decision, Policy, TransactionRequest, wei};
use runtime::{Expectation, Outcome, Pipeline, PolicyDecisionClient, TransactionExecutor};
use storage::{Event, EventKind, EventStore, RequestId};
use tracing_subscriber::{EnvFilter, fmt};

use config::Config;
use error::{Error, Result};

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(about = "Policy firewall for on-chain transactions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// The call being checked or submitted.
#[derive(clap::Args)]
struct CallArgs {
    /// Sending account
    #[arg(long)]
    from: Address,
    /// Target contract or account
    #[arg(long)]
    to: Address,
    /// Hex calldata
    #[arg(long, default_value = "0x")]
    data: Calldata,
    /// Value in wei (decimal or 0x hex)
    #[arg(long, default_value = "0", value_parser = wei::parse)]
    value: u128,
}

impl CallArgs {
    fn request(&self) -> TransactionRequest {
        TransactionRequest::new(self.from, self.to)
            .with_data(self.data.clone())
            .with_value(self.value)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a call against the local firewall
    Check {
        #[command(flatten)]
        call: CallArgs,
    },
    /// List the active policies of a consumer
    Policies {
        #[arg(long)]
        consumer: Address,
    },
    /// Approve, execute and record a call
    Submit {
        #[command(flatten)]
        call: CallArgs,
        /// Treat a revert whose reason contains PATTERN as success
        #[arg(long, value_name = "PATTERN")]
        expect_revert: Option<String>,
        /// Resume or replay an existing request
        #[arg(long)]
        id: Option<RequestId>,
    },
    /// List recorded requests
    History {
        /// Show only the last N requests
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Show the ledger of one request
    Show {
        /// Request ID (prefix match supported)
        #[arg(short, long)]
        request: String,
        /// Filter by event kind (approved, rejected, submitted, ...)
        #[arg(short, long)]
        kind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { call } => cmd_check(&call),
        Commands::Policies { consumer } => cmd_policies(consumer),
        Commands::Submit {
            call,
            expect_revert,
            id,
        } => cmd_submit(&call, expect_revert, id).await,
        Commands::History { limit } => cmd_history(limit),
        Commands::Show { request, kind } => cmd_show(&request, kind.as_deref()),
    }
}

fn cmd_check(call: &CallArgs) -> Result<()> {
    let config = Config::discover()?;
    let firewall = config.firewall()?.build()?;

    let request = call.request();
    match firewall.registry.evaluate(&request) {
        Decision::Allow => println!("ALLOW {} -> {}", request.from, request.to),
        Decision::Deny { reason } => println!("DENY {reason}"),
    }
    Ok(())
}

fn cmd_policies(consumer: Address) -> Result<()> {
    let config = Config::discover()?;
    let firewall = config.firewall()?.build()?;

    let active = firewall.registry.get_active_global_policies(consumer);
    if active.is_empty() {
        println!("No policies attached to {consumer}.");
        return Ok(());
    }

    println!("{:<4}  {:<16}  {:<42}  NAME", "#", "KIND", "ADDRESS");
    println!("{}", "-".repeat(80));
    for (i, policy) in active.iter().enumerate() {
        let name = firewall
            .policies
            .iter()
            .find(|(_, handle)| handle.as_policy().policy_ref() == *policy)
            .map(|(name, _)| name.as_str())
            .unwrap_or("-");
        println!(
            "{:<4}  {:<16}  {:<42}  {name}",
            i + 1,
            policy.kind.to_string(),
            policy.address.to_string()
        );
    }
    Ok(())
}

async fn cmd_submit(
    call: &CallArgs,
    expect_revert: Option<String>,
    id: Option<RequestId>,
) -> Result<()> {
    let config = Config::discover()?;

    let mut client = PolicyDecisionClient::new(config.endpoint()?).with_retry(config.retry());
    if let Some(policy_address) = config.endpoint.policy_address {
        client = client.with_policy_address(policy_address);
    }
    let executor = TransactionExecutor::new(config.network());

    std::fs::create_dir_all(data_dir())?;
    let store = EventStore::open(ledger_path())?;

    let pipeline = Pipeline::new(store, client, executor);
    let expectation = match expect_revert {
        Some(pattern) => Expectation::Revert(pattern),
        None => Expectation::Success,
    };

    let id = id.unwrap_or_default();
    println!("Request ID: {id}");
    match pipeline.submit_with_id(id, call.request(), expectation).await? {
        Outcome::Confirmed { hash, block_number } => match block_number {
            Some(block) => println!("Confirmed: {hash} (block {block})"),
            None => println!("Confirmed: {hash}"),
        },
        Outcome::ExpectedRevert { hash, reason } => match hash {
            Some(hash) => println!("Reverted as expected: {reason} ({hash})"),
            None => println!("Reverted as expected before broadcast: {reason}"),
        },
    }
    Ok(())
}

fn cmd_history(limit: usize) -> Result<()> {
    let store = open_store()?;
    let requests = store.list_requests()?;

    if requests.is_empty() {
        println!("No requests found.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<16}  {:<17}  {:<42}  HASH",
        "REQUEST ID", "CREATED", "STATE", "TO"
    );
    println!("{}", "-".repeat(132));

    for summary in requests.into_iter().take(limit) {
        let created = Local
            .from_utc_datetime(&summary.created_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let to = summary.to.map(|a| a.to_string()).unwrap_or_default();
        let hash = summary.hash.unwrap_or_else(|| "-".to_string());
        println!(
            "{:<36}  {:<16}  {:<17}  {:<42}  {hash}",
            summary.id,
            created.to_string(),
            summary.state.to_string(),
            to
        );
    }

    Ok(())
}

fn cmd_show(request_prefix: &str, kind_filter: Option<&str>) -> Result<()> {
    let store = open_store()?;
    let request_id = find_request(&store, request_prefix)?;

    let events = store.load_events(request_id, kind_filter)?;
    if events.is_empty() {
        println!("No events found for request {request_id}");
        return Ok(());
    }

    println!("Request: {request_id}\n");
    for event in &events {
        print_event(event);
    }
    Ok(())
}

/// Resolve a unique request id from a prefix of it.
fn find_request(store: &EventStore, prefix: &str) -> Result<RequestId> {
    let mut matches: Vec<RequestId> = store
        .list_requests()?
        .into_iter()
        .map(|summary| summary.id)
        .filter(|id| id.to_string().starts_with(prefix))
        .collect();

    match (matches.pop(), matches.is_empty()) {
        (Some(id), true) => Ok(id),
        (None, _) => Err(Error::RequestNotFound {
            prefix: prefix.to_string(),
        }),
        (Some(last), false) => {
            matches.push(last);
            Err(Error::AmbiguousRequest {
                prefix: prefix.to_string(),
                matches: matches.iter().map(RequestId::to_string).collect(),
            })
        }
    }
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%H:%M:%S");

    match &event.kind {
        EventKind::Composed { request } => {
            println!(
                "[{time}] COMPOSED: {} -> {} value={} data={}",
                request.from, request.to, request.value, request.data
            );
        }
        EventKind::ApprovalRequested { endpoint } => {
            println!("[{time}] APPROVAL REQUESTED: {endpoint}");
        }
        EventKind::Approved { transaction } => {
            println!("[{time}] APPROVED: {transaction}");
        }
        EventKind::Rejected { reason } => {
            println!("[{time}] REJECTED: {reason}");
        }
        EventKind::Broadcasting => {
            println!("[{time}] BROADCASTING");
        }
        EventKind::BroadcastRefused { reason } => {
            println!("[{time}] BROADCAST REFUSED: {reason}");
        }
        EventKind::Submitted { hash } => {
            println!("[{time}] SUBMITTED: {hash}");
        }
        EventKind::Reverted {
            hash,
            reason,
            expected,
        } => {
            let label = if *expected { "REVERTED (expected)" } else { "REVERTED" };
            println!("[{time}] {label}: {reason} ({hash})");
        }
        EventKind::Confirmed { hash, block_number } => match block_number {
            Some(block) => println!("[{time}] CONFIRMED: {hash} (block {block})"),
            None => println!("[{time}] CONFIRMED: {hash}"),
        },
    }
}

fn ledger_path() -> PathBuf {
    data_dir().join("requests.db")
}

fn open_store() -> Result<EventStore> {
    let path = ledger_path();
    if !path.exists() {
        return Err(Error::DatabaseNotFound { path });
    }
    Ok(EventStore::open(&path)?)
}

/// Platform data directory for the ledger, or `.gatekeeper` when unknown.
fn data_dir() -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "linux") {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
    } else {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share"))
    };
    base.map(|dir| dir.join("gatekeeper"))
        .unwrap_or_else(|| PathBuf::from(".gatekeeper"))
}
