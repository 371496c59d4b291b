// splitter - command line front-end for a persisted splitter deployment

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use splitter::config::{DeployConfig, NodeConfig};
use splitter::custody::{Amount, MemoryCustody};
use splitter::identity::{Address, Keypair};
use splitter::splitter::Splitter;
use splitter::storage::SplitterStore;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "splitter", version, about = "Three-way splitter ledger")]
struct Cli {
    /// Data directory (defaults to $SPLITTER_DATA_DIR or .splitter)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter (defaults to $SPLITTER_LOG or info)
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage local account keypairs
    #[command(subcommand)]
    Account(AccountCommand),
    /// Mint value into an account
    Faucet { account: String, amount: Amount },
    /// Deploy the splitter; recipients fall back to RECIPIENT{1,2,3}_ADDRESS
    Deploy {
        #[arg(long)]
        owner: String,
        /// Give exactly three times
        #[arg(long)]
        recipient: Vec<String>,
    },
    /// Send value to the splitter through the deposit path
    Deposit {
        #[arg(long)]
        from: String,
        amount: Amount,
    },
    /// Push value into custody without triggering a split
    Inject {
        #[arg(long)]
        from: String,
        amount: Amount,
    },
    ManualSplit {
        #[arg(long)]
        from: String,
    },
    WithdrawRefund {
        #[arg(long)]
        from: String,
    },
    UpdateRecipient {
        #[arg(long)]
        from: String,
        slot: usize,
        recipient: String,
    },
    EmergencyWithdraw {
        #[arg(long)]
        from: String,
        destination: String,
    },
    /// Make an address refuse incoming value
    Reject { account: String },
    /// Undo `reject`
    Accept { account: String },
    /// Deployment summary as JSON
    Status,
    /// Pending refund credit of an address
    Refund { account: String },
    /// Outside balance of an address
    BalanceOf { account: String },
    /// Event history
    Events,
}

#[derive(Subcommand)]
enum AccountCommand {
    New { label: String },
    List,
}

fn init_logging(filter: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::new(filter))
        .init();
}

/// A label of a stored account, or a literal address
fn resolve(store: &SplitterStore, name: &str) -> Result<Address> {
    if let Some(keypair) = store.load_account(name)? {
        return Ok(keypair.address());
    }
    Address::parse(name).with_context(|| format!("`{}` is neither an account label nor an address", name))
}

/// Callers must hold the key: only stored accounts can act
fn caller(store: &SplitterStore, label: &str) -> Result<Address> {
    store
        .load_account(label)?
        .map(|kp| kp.address())
        .ok_or_else(|| anyhow!("no local account labelled `{}`", label))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(filter) = cli.log {
        config = config.with_log_filter(filter);
    }
    config.validate()?;
    init_logging(&config.log_filter);

    let store = SplitterStore::open(&config.data_dir)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;

    run(&store, cli.command)?;

    if config.flush_on_write {
        store.flush()?;
    }
    Ok(())
}

fn run(store: &SplitterStore, command: Command) -> Result<()> {
    match command {
        Command::Account(AccountCommand::New { label }) => {
            if store.load_account(&label)?.is_some() {
                bail!("account `{}` already exists", label);
            }
            let keypair = Keypair::generate();
            store.save_account(&label, &keypair)?;
            println!("{} {}", label, keypair.address());
        }
        Command::Account(AccountCommand::List) => {
            for (label, address) in store.list_accounts()? {
                println!("{:<16} {}", label, address);
            }
        }
        Command::Faucet { account, amount } => {
            let who = resolve(store, &account)?;
            with_custody(store, |custody| Ok(custody.fund(&who, amount)?))?;
            println!("funded {} with {}", who, amount);
        }
        Command::Deploy { owner, recipient } => {
            let owner = caller(store, &owner)?;
            let deploy = match recipient.len() {
                0 => DeployConfig::from_env()?,
                3 => DeployConfig {
                    recipients: [
                        resolve(store, &recipient[0])?,
                        resolve(store, &recipient[1])?,
                        resolve(store, &recipient[2])?,
                    ],
                },
                n => bail!("expected 3 --recipient values, got {}", n),
            };
            if store.deployment()?.is_some() {
                bail!("a splitter is already deployed in this data directory");
            }

            let splitter = Splitter::deploy(owner, deploy.recipients, store.load_custody()?)?;
            let record = store.save_deployment(&splitter)?;
            info!(owner = %record.owner, "deployment saved");
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "owner": record.owner.to_string(),
                    "recipients": {
                        "recipient1": record.recipients[0].to_string(),
                        "recipient2": record.recipients[1].to_string(),
                        "recipient3": record.recipients[2].to_string(),
                    },
                    "deployedAt": record.deployed_at.to_rfc3339(),
                }))?
            );
        }
        Command::Deposit { from, amount } => {
            let sender = caller(store, &from)?;
            let outcome = with_splitter(store, |s| Ok(s.deposit(&sender, amount)?))?;
            println!(
                "split {} -> {} each, refund credit +{}",
                amount,
                outcome.share(),
                outcome.remainder()
            );
        }
        Command::Inject { from, amount } => {
            let sender = caller(store, &from)?;
            with_splitter(store, |s| Ok(s.custody_mut().force_send(&sender, amount)?))?;
            println!("injected {} without splitting", amount);
        }
        Command::ManualSplit { from } => {
            let who = caller(store, &from)?;
            let outcome = with_splitter(store, |s| Ok(s.manual_split(&who)?))?;
            println!(
                "split {} -> {} each, refund credit +{}",
                outcome.plan.amount(),
                outcome.share(),
                outcome.remainder()
            );
        }
        Command::WithdrawRefund { from } => {
            let who = caller(store, &from)?;
            let amount = with_splitter(store, |s| Ok(s.withdraw_refund(&who)?))?;
            println!("withdrew refund of {}", amount);
        }
        Command::UpdateRecipient {
            from,
            slot,
            recipient,
        } => {
            let who = caller(store, &from)?;
            let new_recipient = resolve(store, &recipient)?;
            let previous = with_splitter(store, |s| Ok(s.update_recipient(&who, slot, &new_recipient)?))?;
            println!("slot {}: {} -> {}", slot, previous, new_recipient);
        }
        Command::EmergencyWithdraw { from, destination } => {
            let who = caller(store, &from)?;
            let destination = resolve(store, &destination)?;
            let amount = with_splitter(store, |s| Ok(s.emergency_withdraw(&who, &destination)?))?;
            println!("sent {} to {}", amount, destination);
        }
        Command::Reject { account } => {
            let who = resolve(store, &account)?;
            with_custody(store, |custody| {
                custody.set_rejecting(&who, true);
                Ok(())
            })?;
        }
        Command::Accept { account } => {
            let who = resolve(store, &account)?;
            with_custody(store, |custody| {
                custody.set_rejecting(&who, false);
                Ok(())
            })?;
        }
        Command::Status => {
            let record = store
                .deployment()?
                .ok_or_else(|| anyhow!("no splitter deployed"))?;
            let splitter = store.load_splitter()?;
            let recipients = splitter.recipients();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "owner": splitter.owner().to_string(),
                    "recipients": recipients.iter().map(|r| r.to_string()).collect::<Vec<_>>(),
                    "balance": splitter.balance().to_string(),
                    "availableToSplit": splitter.available_to_split().to_string(),
                    "outstandingRefunds": splitter.outstanding_refunds().to_string(),
                    "totalReceived": splitter.total_received().to_string(),
                    "totalSplit": splitter.total_split().to_string(),
                    "deployedAt": record.deployed_at.to_rfc3339(),
                }))?
            );
        }
        Command::Refund { account } => {
            let who = resolve(store, &account)?;
            let splitter = store.load_splitter()?;
            println!("{}", splitter.pending_refund(&who));
        }
        Command::BalanceOf { account } => {
            let who = resolve(store, &account)?;
            println!("{}", store.load_custody()?.balance_of(&who));
        }
        Command::Events => {
            for record in store.events()? {
                println!("#{:<6} {}", record.sequence, record.event);
            }
        }
    }
    Ok(())
}

/// Load the deployment, run one operation, persist on success
fn with_splitter<T>(
    store: &SplitterStore,
    f: impl FnOnce(&mut Splitter<MemoryCustody>) -> Result<T>,
) -> Result<T> {
    store.transact(f)
}

/// Host-side custody edits, with or without a deployment
fn with_custody<T>(store: &SplitterStore, f: impl FnOnce(&mut MemoryCustody) -> Result<T>) -> Result<T> {
    if store.deployment()?.is_some() {
        return with_splitter(store, |s| f(s.custody_mut()));
    }
    let mut custody = store.load_custody()?;
    let value = f(&mut custody)?;
    store.save_custody(&custody)?;
    Ok(value)
}
