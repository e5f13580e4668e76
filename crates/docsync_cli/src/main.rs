//! docsync CLI
//!
//! Replicates JSON document store files.
//!
//! # Commands
//!
//! - `push` - Send local documents and deletions to the peer file
//! - `pull` - Apply the peer file's documents and deletions locally
//! - `sync` - Pull, then push
//! - `pending` - List local documents a push would transfer

mod commands;
mod error;
mod store_file;

use clap::{Args, Parser, Subcommand};
use commands::ScopeArgs;
use docsync_replicator::ReplicatorType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Replicate docsync JSON document stores.
#[derive(Parser)]
#[command(name = "docsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ReplicateArgs {
    /// Local store file
    local: PathBuf,

    /// Peer store file (created if missing)
    peer: PathBuf,

    #[command(flatten)]
    scope: ScopeArgs,

    /// Give up if the session has not stopped after this many seconds
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Send local documents and deletions to the peer file
    Push(ReplicateArgs),

    /// Apply the peer file's documents and deletions locally
    Pull(ReplicateArgs),

    /// Pull, then push
    Sync(ReplicateArgs),

    /// List local documents a push would transfer
    Pending {
        /// Local store file
        local: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn replicate(args: &ReplicateArgs, replicator_type: ReplicatorType) -> error::CliResult<()> {
    let report = commands::replicate::run(
        &args.local,
        &args.peer,
        replicator_type,
        &args.scope,
        args.timeout,
    )?;
    commands::replicate::print(&report, &args.format)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Push(args) => replicate(&args, ReplicatorType::Push)?,
        Commands::Pull(args) => replicate(&args, ReplicatorType::Pull)?,
        Commands::Sync(args) => replicate(&args, ReplicatorType::PushAndPull)?,
        Commands::Pending {
            local,
            scope,
            format,
        } => {
            let pending = commands::pending::run(&local, &scope)?;
            commands::pending::print(&pending, &format)?;
        }
        Commands::Version => {
            println!("docsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
