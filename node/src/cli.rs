//! # CLI Interface
//!
//! Defines the command-line argument structure for `linkchain-node` using
//! `clap` derive. Chain-wide options (data directory, hash algorithm, config
//! file, log format) are global and may appear before or after the
//! subcommand.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use linkchain_protocol::crypto::HashAlgorithm;

use crate::logging::LogFormat;

/// linkchain: a tamper-evident, hash-linked block log.
///
/// Appends payloads as blocks, reads them back, validates the chain, and
/// serves the same operations over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "linkchain-node",
    about = "Tamper-evident block log: append, inspect, validate, serve",
    version,
    propagate_version = true
)]
pub struct LinkchainCli {
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand that opens a chain.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// Path to a JSON configuration file.
    ///
    /// Flags and environment variables override values from the file.
    #[arg(long, short = 'c', global = true, env = "LINKCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the chain database. Created if missing.
    #[arg(long, short = 'd', global = true, env = "LINKCHAIN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Hash algorithm for block digests: sha256 or blake3.
    ///
    /// Fixed when a chain is created; reopening with another algorithm fails.
    #[arg(long = "hash", global = true, env = "LINKCHAIN_HASH")]
    pub hash_algorithm: Option<HashAlgorithm>,

    /// Validate heights one at a time instead of in parallel.
    #[arg(long, global = true)]
    pub sequential: bool,

    /// Log output format.
    #[arg(
        long,
        global = true,
        env = "LINKCHAIN_LOG_FORMAT",
        value_enum,
        ignore_case = true,
        default_value_t = LogFormat::Pretty
    )]
    pub log_format: LogFormat,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data directory and the genesis block.
    Init,
    /// Append a block carrying PAYLOAD.
    Add(AddArgs),
    /// Print the block at HEIGHT as JSON.
    Get(GetArgs),
    /// Print the current chain height.
    Height,
    /// Print a range of blocks, one JSON object per line.
    Print(PrintArgs),
    /// Validate one block or the whole chain. Exits non-zero on failure.
    Validate(ValidateArgs),
    /// Serve the HTTP API and Prometheus metrics.
    Serve(ServeArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `add` subcommand.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Data to record in the new block.
    pub payload: String,
}

/// Arguments for the `get` subcommand.
#[derive(Parser, Debug)]
pub struct GetArgs {
    pub height: u64,
}

/// Arguments for the `print` subcommand.
#[derive(Parser, Debug)]
pub struct PrintArgs {
    /// First height to print.
    #[arg(long, default_value_t = 0)]
    pub from: u64,

    /// Last height to print. Defaults to the chain tip.
    #[arg(long)]
    pub to: Option<u64>,
}

/// Arguments for the `validate` subcommand.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Validate only this height instead of the whole chain.
    #[arg(long)]
    pub height: Option<u64>,
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind both listeners on.
    #[arg(long, env = "LINKCHAIN_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// Port for the REST API.
    #[arg(long, env = "LINKCHAIN_RPC_PORT", default_value_t = 9741)]
    pub rpc_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LINKCHAIN_METRICS_PORT", default_value_t = 9742)]
    pub metrics_port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        LinkchainCli::command().debug_assert();
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = LinkchainCli::try_parse_from([
            "linkchain-node",
            "add",
            "hello",
            "--hash",
            "blake3",
            "-d",
            "/tmp/chain",
        ])
        .unwrap();
        assert_eq!(cli.chain.hash_algorithm, Some(HashAlgorithm::Blake3));
        assert_eq!(cli.chain.data_dir, Some(PathBuf::from("/tmp/chain")));
        match cli.command {
            Commands::Add(args) => assert_eq!(args.payload, "hello"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_hash_is_rejected() {
        assert!(LinkchainCli::try_parse_from(["linkchain-node", "--hash", "md5", "height"]).is_err());
    }

    #[test]
    fn log_format_is_a_closed_set() {
        let cli =
            LinkchainCli::try_parse_from(["linkchain-node", "height", "--log-format", "json"])
                .unwrap();
        assert_eq!(cli.chain.log_format, LogFormat::Json);
        assert!(
            LinkchainCli::try_parse_from(["linkchain-node", "height", "--log-format", "xml"])
                .is_err()
        );
    }

    #[test]
    fn validate_height_is_optional() {
        let cli = LinkchainCli::try_parse_from(["linkchain-node", "validate"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate(ValidateArgs { height: None })));

        let cli =
            LinkchainCli::try_parse_from(["linkchain-node", "validate", "--height", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Validate(ValidateArgs { height: Some(3) })
        ));
    }
}
