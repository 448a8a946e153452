#![forbid(unsafe_code)]
//! Drives a submission through a canned scenario against the in-process transport

use chainwatch::config::load_config_from;
use chainwatch::crypto::KeyPair;
use chainwatch::criteria::{extrinsic_failed, ResolvePhase};
use chainwatch::dispatch::{MetadataRegistry, ModuleErrorMeta};
use chainwatch::extrinsic::UnsignedCall;
use chainwatch::status::{ChainEvent, DispatchError, ModuleError, StatusUpdate, TxPhase};
use chainwatch::{LocalTransport, SubmitError, SubmitOptions, Submitter};
use clap::{Parser, ValueEnum};
use colored::*;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const BALANCES_PALLET: u8 = 5;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario to simulate
    #[arg(value_enum, default_value_t = Scenario::Finalized)]
    scenario: Scenario,
    /// Resolve point, overriding the config file
    #[arg(long)]
    resolve_on: Option<ResolvePhase>,
    /// Local timeout such as "500ms" or "2s"
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,
    /// Delay between simulated status updates
    #[arg(long, default_value = "150ms", value_parser = humantime::parse_duration)]
    step: Duration,
    /// Treat a dropped connection as terminal (disconnect scenario only)
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    reject_on_transport_error: bool,
    #[arg(long, default_value = "config.toml")]
    config: String,
    /// Print the final status update as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Ready, InBlock, Finalized
    Finalized,
    /// InBlock carries ExtrinsicFailed with a Balances module error
    Failed,
    /// The chain never gets past Ready
    Stalled,
    /// The connection drops after Broadcast
    Disconnect,
    /// The transport has no subscription support
    Unsupported,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config_from(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    println!("{}", "chainwatch submission simulator".bright_cyan().bold());
    println!("{}", "-------------------------------".bright_cyan());
    println!("Scenario: {}", format!("{:?}", cli.scenario).bright_yellow());

    let transport = Arc::new(build_transport(cli.scenario));
    let mut submit_config = config.submit.clone();
    if let Some(phase) = cli.resolve_on {
        submit_config.resolve_on = Some(phase);
    }
    let submitter = Submitter::new(transport.clone()).with_config(&submit_config);

    let mut options = SubmitOptions::new();
    if let Some(timeout) = cli.timeout {
        options = options.timeout(timeout);
    } else if cli.scenario == Scenario::Stalled && submit_config.timeout.is_zero() {
        options = options.timeout(Duration::from_secs(2));
    }
    if cli.scenario == Scenario::Disconnect && !cli.reject_on_transport_error {
        options = options.reject_on(extrinsic_failed);
        if options.timeout.is_none() {
            options = options.timeout(Duration::from_secs(2));
        }
    }

    let feeder = tokio::spawn(feed(transport.clone(), cli.scenario, cli.step));

    let alice = KeyPair::from_dev_uri("//Alice")?;
    let call = UnsignedCall::new(
        "balances",
        "transfer",
        serde_json::json!({ "dest": hex::encode(KeyPair::from_dev_uri("//Bob")?.account_id()), "value": 1_000_000_000_000u64 }),
    );
    let result = submitter.sign_and_submit(call, &alice, options).await;
    feeder.abort();

    report(result, cli.json)?;
    println!(
        "Cleanup: {} unsubscribe, {} listener removal",
        transport.unsubscribe_calls(),
        transport.off_disconnect_calls()
    );
    Ok(())
}

fn build_transport(scenario: Scenario) -> LocalTransport {
    if scenario == Scenario::Unsupported {
        return LocalTransport::without_subscriptions();
    }
    let registry = MetadataRegistry::new().with(
        BALANCES_PALLET,
        3,
        ModuleErrorMeta::new(
            "Balances",
            "InsufficientBalance",
            &["Balance too low to send value."],
        ),
    );
    LocalTransport::new().with_registry(registry)
}

fn steps(scenario: Scenario) -> Vec<StatusUpdate> {
    let at = |phase| StatusUpdate::new(phase, [0u8; 32]);
    match scenario {
        Scenario::Finalized => vec![
            at(TxPhase::Ready),
            at(TxPhase::InBlock).with_event(ChainEvent::new("system", "ExtrinsicSuccess")),
            at(TxPhase::Finalized).with_event(ChainEvent::new("system", "ExtrinsicSuccess")),
        ],
        Scenario::Failed => vec![
            at(TxPhase::Ready),
            at(TxPhase::InBlock)
                .with_event(ChainEvent::new("system", "ExtrinsicFailed"))
                .with_dispatch_error(DispatchError::Module(ModuleError {
                    pallet_index: BALANCES_PALLET,
                    error_index: 3,
                })),
            at(TxPhase::Finalized),
        ],
        Scenario::Stalled => vec![at(TxPhase::Ready)],
        Scenario::Disconnect => vec![at(TxPhase::Ready), at(TxPhase::Broadcast)],
        Scenario::Unsupported => Vec::new(),
    }
}

async fn feed(transport: Arc<LocalTransport>, scenario: Scenario, step: Duration) {
    if scenario == Scenario::Unsupported {
        return;
    }
    transport.wait_for_subscription().await;
    for update in steps(scenario) {
        tokio::time::sleep(step).await;
        println!("  → {}", update.phase.to_string().bright_white());
        transport.push_all(update);
    }
    if scenario == Scenario::Disconnect {
        tokio::time::sleep(step).await;
        println!("  ✂ {}", "connection dropped".bright_red());
        transport.disconnect();
    }
}

fn report(
    result: Result<StatusUpdate, SubmitError>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(update) => {
            println!(
                "{} {} at {}",
                "✅ Resolved".bright_green().bold(),
                update.tx_hash_hex().bright_white(),
                update.phase
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&update)?);
            }
        }
        Err(e) => {
            let scope = if e.is_local() { "local" } else { "on-chain" };
            println!("{} ({}): {}", "❌ Failed".bright_red().bold(), scope, e);
            if let Some(code) = e.module_error() {
                println!(
                    "   pallet {} error {}",
                    code.pallet_index.to_string().yellow(),
                    code.error_index.to_string().yellow()
                );
            }
        }
    }
    Ok(())
}
