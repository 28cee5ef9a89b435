use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ledger_core::{crypto::KeyPair, Account, ConsensusParams, Ledger};
use ledger_storage::{keyfile, SledStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "Account tools for a ledger store")]
struct Cli {
    /// Data directory for sled
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,
    /// Ledger identifier within the store
    #[arg(long, global = true, default_value = "main")]
    ledger_id: String,
    /// JSON file with consensus parameters
    #[arg(long, global = true)]
    params: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a key file
    Keygen {
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the address of a key file
    Address {
        #[arg(long)]
        key: PathBuf,
    },
    /// Sign a transfer and queue it in the mempool
    Send {
        /// Sender key file
        #[arg(long)]
        key: PathBuf,
        /// Recipient address
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value_t = 0)]
        fee: u64,
    },
    /// Confirmed balance of an address or key file
    Balance {
        #[arg(long, conflicts_with = "key")]
        address: Option<String>,
        #[arg(long)]
        key: Option<PathBuf>,
        /// Only count blocks below this height
        #[arg(long)]
        height: Option<usize>,
    },
    /// Print the chain height
    Height,
    /// Check the whole chain against the consensus rules
    Validate,
    /// Print the latest blocks
    Show {
        #[arg(long, default_value_t = 5)]
        last: usize,
    },
    /// List pending transactions
    Mempool,
}

fn open_ledger(cli: &Cli) -> Result<Ledger<SledStore>> {
    let params = match &cli.params {
        Some(path) => ConsensusParams::from_json_file(path)?,
        None => ConsensusParams::default(),
    };
    let store = SledStore::open(&cli.data_dir, cli.ledger_id.clone())?;
    Ok(Ledger::new(Arc::new(store)).with_params(params))
}

/// The debit of a transfer when it exceeds `balance`.
fn overspend(amount: u64, fee: u64, balance: i128) -> Option<i128> {
    let debit = i128::from(amount) + i128::from(fee);
    (debit > balance).then_some(debit)
}

fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    match &cli.cmd {
        Command::Keygen { out } => {
            let keys = KeyPair::generate();
            keyfile::save(out, &keys)?;
            println!("{}", keys.address());
        }
        Command::Address { key } => {
            println!("{}", keyfile::load(key)?.address());
        }
        Command::Send {
            key,
            to,
            amount,
            fee,
        } => {
            let account = Account::from_keys(keyfile::load(key)?, open_ledger(&cli)?);
            let balance = account.balance()?;
            if let Some(debit) = overspend(*amount, *fee, balance) {
                eprintln!(
                    "warning: {debit} exceeds confirmed balance {balance}; miners will drop it"
                );
            }
            let tx = account.submit_transaction(to, *amount, *fee)?;
            println!("{tx}");
        }
        Command::Balance {
            address,
            key,
            height,
        } => {
            let address = match (address, key) {
                (Some(address), _) => address.clone(),
                (None, Some(key)) => keyfile::load(key)?.address(),
                (None, None) => bail!("pass --address or --key"),
            };
            println!("{}", open_ledger(&cli)?.get_balance(&address, *height)?);
        }
        Command::Height => {
            println!("{}", open_ledger(&cli)?.height()?);
        }
        Command::Validate => match open_ledger(&cli)?.first_invalid()? {
            None => println!("chain valid"),
            Some(invalid) => {
                println!("chain invalid: {invalid}");
                std::process::exit(1);
            }
        },
        Command::Show { last } => {
            let chain = open_ledger(&cli)?.snapshot()?;
            let skip = chain.blocks.len().saturating_sub(*last);
            for (index, block) in chain.blocks.iter().enumerate().skip(skip) {
                println!("#{index}\n{block}");
            }
        }
        Command::Mempool => {
            for tx in open_ledger(&cli)?.snapshot()?.mempool {
                println!("{tx}");
            }
        }
    }
    Ok(())
}
