use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "twinsync",
    about = "Keep a legacy system in step with its replacement",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "TWINSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server with in-memory collaborators
    Serve(ServeArgs),
    /// Reconcile two JSON snapshots offline
    Reconcile(ReconcileArgs),
    /// Validate the configuration and print what it sets up
    CheckConfig,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Override the configured bind address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Seed the source system from a snapshot
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Seed the target system from a snapshot
    #[arg(long)]
    pub target: Option<PathBuf>,
    /// Seed the mapping store
    #[arg(long)]
    pub mappings: Option<PathBuf>,
}

#[derive(Args)]
pub struct ReconcileArgs {
    /// Entity type to sweep
    pub entity: String,
    /// Source snapshot (JSON)
    #[arg(long)]
    pub source: PathBuf,
    /// Target snapshot (JSON)
    #[arg(long)]
    pub target: PathBuf,
    /// Mapping file (JSON)
    #[arg(long)]
    pub mappings: PathBuf,
    /// Override the configured page size
    #[arg(long)]
    pub page_size: Option<usize>,
    /// Exit with an error when mismatches are found
    #[arg(long)]
    pub fail_on_mismatch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reconcile() {
        let cli = Cli::parse_from([
            "twinsync",
            "reconcile",
            "contact",
            "--source",
            "s.json",
            "--target",
            "t.json",
            "--mappings",
            "m.json",
            "--page-size",
            "50",
            "--format",
            "json",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Reconcile(args) => {
                assert_eq!(args.entity, "contact");
                assert_eq!(args.page_size, Some(50));
                assert!(!args.fail_on_mismatch);
            }
            _ => panic!("expected reconcile"),
        }
    }
}
