//! # CLI Interface
//!
//! Defines the command-line argument structure for `vela-node` using
//! `clap` derive. `run` keeps the reservation sweeper alive; the other
//! subcommands are offline tooling over the same account store.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use vela_protocol::account::DeriveRule;
use vela_protocol::transaction::AssetId;

/// Vela wallet node.
///
/// Manages accounts and their unspent outputs, builds transaction
/// templates from actions, signs them, and checks them for finalization.
#[derive(Parser, Debug)]
#[command(
    name = "vela-node",
    about = "Vela wallet node",
    version,
    propagate_version = true
)]
pub struct VelaNodeCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by every subcommand.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Wallet configuration file (JSON). Defaults apply when omitted.
    #[arg(long, short = 'c', global = true, env = "VELA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of the account database.
    #[arg(long, global = true, env = "VELA_DB", default_value = "vela-db")]
    pub db: PathBuf,

    /// Ledger height used to judge UTXO maturity.
    #[arg(long, global = true, env = "VELA_HEIGHT", default_value_t = 0)]
    pub height: u64,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the node until interrupted, sweeping expired reservations.
    Run,
    /// Manage accounts.
    #[command(subcommand)]
    Account(AccountCommand),
    /// Issue a new address for an account.
    Address(AddressArgs),
    /// Manage unspent outputs.
    #[command(subcommand)]
    Utxo(UtxoCommand),
    /// Build a transaction template from a JSON list of actions.
    Build(BuildArgs),
    /// Add signatures to a template.
    Sign(SignArgs),
    /// Estimate the gas a template will cost once signed.
    Estimate(TemplateArgs),
    /// Check a signed template and hand it to the ledger.
    Finalize(TemplateArgs),
}

#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Create an account from one or more xpubs.
    Create(CreateAccountArgs),
    /// List every account.
    List,
}

#[derive(Args, Debug)]
pub struct CreateAccountArgs {
    #[arg(long)]
    pub alias: String,

    /// Hex-encoded xpub. Repeat for multisig accounts.
    #[arg(long = "xpub", required = true)]
    pub xpubs: Vec<String>,

    #[arg(long, default_value_t = 1)]
    pub quorum: usize,

    #[arg(long, value_enum, default_value_t = RuleArg::Bip44)]
    pub rule: RuleArg,
}

#[derive(Args, Debug)]
pub struct AddressArgs {
    /// Account id or alias.
    #[arg(long)]
    pub account: String,

    /// Issue a change address instead of a receive address.
    #[arg(long)]
    pub change: bool,
}

#[derive(Subcommand, Debug)]
pub enum UtxoCommand {
    /// Import UTXOs from a JSON array.
    Import(ImportArgs),
    /// List stored UTXOs, or the spendable ones of a single account.
    List(ListUtxoArgs),
}

#[derive(Args, Debug)]
pub struct ListUtxoArgs {
    /// Account id or alias. Without it every stored UTXO is listed.
    #[arg(long)]
    pub account: Option<String>,

    /// Asset to filter on. Defaults to the native asset.
    #[arg(long, requires = "account")]
    pub asset: Option<AssetId>,

    /// Include outputs from the unconfirmed pool.
    #[arg(long, requires = "account")]
    pub unconfirmed: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub file: PathBuf,

    /// Store them as contract UTXOs instead of standard ones.
    #[arg(long)]
    pub contract: bool,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// JSON file holding an array of actions.
    pub actions: PathBuf,

    /// Reservation lifetime in seconds. Overrides the configured value.
    #[arg(long)]
    pub ttl_secs: Option<u64>,

    /// Time range copied into the transaction.
    #[arg(long, default_value_t = 0)]
    pub time_range: u64,
}

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Template JSON file.
    pub template: PathBuf,

    /// Hex-encoded root xprv. Repeat to sign with several keys.
    #[arg(long = "xprv", required = true, env = "VELA_XPRV")]
    pub xprvs: Vec<String>,
}

#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Template JSON file.
    pub template: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleArg {
    Bip32,
    Bip44,
}

impl From<RuleArg> for DeriveRule {
    fn from(rule: RuleArg) -> Self {
        match rule {
            RuleArg::Bip32 => DeriveRule::Bip32,
            RuleArg::Bip44 => DeriveRule::Bip44,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VelaNodeCli::command().debug_assert();
    }

    #[test]
    fn parses_multisig_account() {
        let cli = VelaNodeCli::try_parse_from([
            "vela-node", "--height", "7", "account", "create", "--alias", "vault", "--xpub", "aa",
            "--xpub", "bb", "--quorum", "2", "--rule", "bip32",
        ])
        .unwrap();
        assert_eq!(cli.global.height, 7);
        match cli.command {
            Commands::Account(AccountCommand::Create(args)) => {
                assert_eq!(args.xpubs, vec!["aa", "bb"]);
                assert_eq!(args.quorum, 2);
                assert_eq!(DeriveRule::from(args.rule), DeriveRule::Bip32);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_account_utxo_listing() {
        let asset = "11".repeat(32);
        let cli = VelaNodeCli::try_parse_from([
            "vela-node", "utxo", "list", "--account", "alice", "--asset", &asset,
        ])
        .unwrap();
        match cli.command {
            Commands::Utxo(UtxoCommand::List(args)) => {
                assert_eq!(args.account.as_deref(), Some("alice"));
                assert_eq!(args.asset, Some(AssetId::new([0x11; 32])));
                assert!(!args.unconfirmed);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(VelaNodeCli::try_parse_from(["vela-node", "utxo", "list", "--unconfirmed"]).is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = VelaNodeCli::try_parse_from(["vela-node", "build", "a.json", "--db", "/tmp/x"])
            .unwrap();
        assert_eq!(cli.global.db, PathBuf::from("/tmp/x"));
    }
}
