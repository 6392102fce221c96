// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vela Wallet Node
//!
//! Entry point for the `vela-node` binary. Parses CLI arguments, initializes
//! logging, loads the wallet configuration, opens the account database, and
//! dispatches the subcommand.
//!
//! - `run`      — keep the reservation sweeper alive until interrupted
//! - `account`  — create and list accounts
//! - `address`  — issue receive or change addresses
//! - `utxo`     — import and list unspent outputs
//! - `build`    — turn a list of actions into a template
//! - `sign`     — add signatures to a template
//! - `estimate` — gas estimate for a template
//! - `finalize` — fee and commitment checks, then hand-off to the ledger

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use vela_protocol::account::dpos::NoDelegates;
use vela_protocol::account::{
    merge_spend_actions, Account, AccountManager, AccountStore, Owner, SledAccountStore, Utxo,
};
use vela_protocol::chain::StaticChain;
use vela_protocol::config::{WalletConfig, NATIVE_ASSET_ID};
use vela_protocol::crypto::{XPrv, XPub};
use vela_protocol::txbuilder::{
    self, estimate_tx_gas, finalize_tx, sign, sign_progress, Action, BuildContext, KeyRing,
    Template,
};

use cli::{AccountCommand, Commands, GlobalArgs, ListUtxoArgs, UtxoCommand, VelaNodeCli};
use logging::LogFormat;

/// Everything a subcommand works against.
struct Node {
    config: WalletConfig,
    chain: StaticChain,
    store: Arc<SledAccountStore>,
    accounts: AccountManager,
}

impl Node {
    fn open(global: &GlobalArgs) -> Result<Self> {
        let config = load_config(global.config.as_deref())?;
        let chain = StaticChain {
            height: global.height,
        };

        std::fs::create_dir_all(&global.db)
            .with_context(|| format!("failed to create database directory: {}", global.db.display()))?;
        let store = Arc::new(
            SledAccountStore::open(&global.db)
                .with_context(|| format!("failed to open database at {}", global.db.display()))?,
        );
        tracing::info!(path = %global.db.display(), height = chain.height, "account database opened");

        let accounts = AccountManager::new(
            store.clone(),
            Arc::new(chain),
            config.network_hrp.clone(),
        );
        Ok(Self {
            config,
            chain,
            store,
            accounts,
        })
    }

    fn ctx(&self) -> BuildContext<'_> {
        BuildContext {
            accounts: &self.accounts,
            config: &self.config,
            dpos: &NoDelegates,
        }
    }

    /// Resolve an account by id, falling back to alias.
    fn account(&self, key: &str) -> Result<Account> {
        match self.accounts.find_by_id(key) {
            Ok(account) => Ok(account),
            Err(_) => self
                .accounts
                .find_by_alias(key)
                .with_context(|| format!("no account with id or alias {key:?}")),
        }
    }

    fn flush(&self) -> Result<()> {
        self.store.flush().context("failed to flush account database")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VelaNodeCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from(cli.global.log_format));

    let node = Node::open(&cli.global)?;
    match cli.command {
        Commands::Run => run_node(node).await,
        Commands::Account(AccountCommand::Create(args)) => {
            let xpubs = args
                .xpubs
                .iter()
                .map(|s| s.parse::<XPub>().with_context(|| format!("invalid xpub {s}")))
                .collect::<Result<Vec<_>>>()?;
            let account = node
                .accounts
                .create(xpubs, args.quorum, &args.alias, args.rule.into())?;
            node.flush()?;
            print_json(&account)
        }
        Commands::Account(AccountCommand::List) => print_json(&node.accounts.list_accounts()?),
        Commands::Address(args) => {
            let account = node.account(&args.account)?;
            let program = node.accounts.create_address(&account.id, args.change)?;
            node.flush()?;
            print_json(&program)
        }
        Commands::Utxo(UtxoCommand::Import(args)) => {
            let utxos: Vec<Utxo> = read_json(&args.file)?;
            for utxo in &utxos {
                if args.contract {
                    node.store.set_contract_utxo(utxo)?;
                } else {
                    node.store.set_standard_utxo(utxo)?;
                }
            }
            node.flush()?;
            tracing::info!(count = utxos.len(), contract = args.contract, "imported utxos");
            Ok(())
        }
        Commands::Utxo(UtxoCommand::List(args)) => list_utxos(&node, args),
        Commands::Build(args) => {
            let actions: Vec<Action> = read_json(&args.actions)?;
            let ttl = args
                .ttl_secs
                .map(std::time::Duration::from_secs)
                .unwrap_or_else(|| node.config.build_ttl());
            let max_time = Utc::now() + chrono::Duration::from_std(ttl)?;
            let template = txbuilder::build(
                &node.ctx(),
                &merge_spend_actions(actions)?,
                max_time,
                args.time_range,
            )?;
            node.flush()?;
            print_json(&template)
        }
        Commands::Sign(args) => {
            let mut template: Template = read_json(&args.template)?;
            let keys = args
                .xprvs
                .iter()
                .map(|s| s.parse::<XPrv>().context("invalid xprv"))
                .collect::<Result<Vec<_>>>()?;
            sign(&mut template, &KeyRing::from_keys(keys))?;
            tracing::info!(complete = sign_progress(&template), "signing round done");
            print_json(&template)
        }
        Commands::Estimate(args) => {
            let template: Template = read_json(&args.template)?;
            print_json(&estimate_tx_gas(&template)?)
        }
        Commands::Finalize(args) => {
            let template: Template = read_json(&args.template)?;
            if !sign_progress(&template) {
                bail!("template is not fully signed");
            }
            let Some(mut tx) = template.transaction else {
                bail!("template has no transaction");
            };
            finalize_tx(&node.chain, &node.config, &mut tx)?;
            println!("{}", tx.id);
            Ok(())
        }
    }
}

/// Spendable outputs of one account, as the keeper sees them.
#[derive(Debug, Serialize)]
struct AccountUtxos {
    utxos: Vec<Utxo>,
    immature: u64,
}

fn list_utxos(node: &Node, args: ListUtxoArgs) -> Result<()> {
    let Some(key) = args.account else {
        return print_json(&node.store.list_utxos()?);
    };
    let account = node.account(&key)?;
    let (utxos, immature) = node.accounts.keeper().find_utxos(
        &Owner::Account(account.id),
        args.asset.unwrap_or(NATIVE_ASSET_ID),
        args.unconfirmed,
        None,
    )?;
    print_json(&AccountUtxos { utxos, immature })
}

/// Keep the expiry sweeper running until SIGINT or SIGTERM.
async fn run_node(node: Node) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        hrp = %node.config.network_hrp,
        sweep_interval_ms = node.config.expire_interval_ms,
        "starting vela-node"
    );

    let sweeper = node
        .accounts
        .keeper()
        .spawn_expire_worker(node.config.expire_interval());

    shutdown_signal().await;
    tracing::info!("shutdown signal received");

    sweeper.abort();
    node.flush()?;
    tracing::info!("vela-node stopped");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<WalletConfig> {
    match path {
        Some(path) => read_json(path),
        None => Ok(WalletConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
