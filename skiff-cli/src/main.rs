//! Skiff CLI - Command line interface for Skiff
//!
//! Hosts the background router on a Unix socket and exposes the temporary
//! mirror lifecycle as one-shot commands.

mod commands;
mod context;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use skiff_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{CleanupArgs, ImportArgs, ListArgs, OperationsArgs, ServeArgs};

/// Skiff: short-lived public mirrors of private repositories
#[derive(Parser, Debug)]
#[command(name = "skiff")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Account owning the source repositories (overrides config and env)
    #[arg(long, global = true, env = "SKIFF_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Host the background router on a Unix socket
    Serve(ServeArgs),

    /// Mirror a private repository into a temporary public one
    #[command(visible_alias = "i")]
    Import(ImportArgs),

    /// Delete expired temporary mirrors
    Cleanup(CleanupArgs),

    /// List tracked temporary mirrors
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show recent tracked operations
    #[command(visible_alias = "ops")]
    Operations(OperationsArgs),

    /// Show current configuration
    Config,

    /// Write an empty secrets file to fill in
    InitSecrets,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let socket = match &cli.command {
        Some(Commands::Serve(args)) => args.socket.clone(),
        _ => None,
    };
    let config = Config::load_with_overrides(cli.owner.clone(), socket)?;

    if cli.verbose {
        tracing::info!(
            owner = ?config.github.owner,
            max_age = ?config.lifecycle.max_age,
            cleanup_interval = ?config.lifecycle.cleanup_interval,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("skiff {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Import(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Cleanup(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::List(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Operations(args)) => {
            args.execute().await?;
        }
        Some(Commands::Config) => print_config(&config)?,
        Some(Commands::InitSecrets) => {
            let path = skiff_core::Secrets::create_template()?;
            println!("Created {}", path.display());
            println!("Add a GitHub token with the `repo` and `delete_repo` scopes.");
        }
        None => {
            println!("Skiff - short-lived public mirrors of private repositories");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}

fn print_config(config: &Config) -> anyhow::Result<()> {
    println!("Skiff Configuration");
    println!("===================");
    println!();
    println!("GitHub:");
    println!(
        "  owner: {}",
        config
            .github
            .owner
            .as_deref()
            .unwrap_or("(from token)")
    );
    println!();
    println!("Lifecycle:");
    println!("  max_age: {}", humanize(config.lifecycle.max_age));
    println!(
        "  cleanup_interval: {}",
        humanize(config.lifecycle.cleanup_interval)
    );
    println!("  tab_host: {}", config.lifecycle.tab_host);
    println!();
    println!("Upload:");
    println!(
        "  default_commit_message: {}",
        config.upload.default_commit_message
    );
    if !config.projects.is_empty() {
        let mut ids: Vec<&String> = config.projects.keys().collect();
        ids.sort();
        for id in ids {
            let target = config.project_target(id);
            println!("  project {}: {}@{}", id, target.repo, target.branch);
        }
    }
    println!();
    println!("Server:");
    let socket: PathBuf = config.server.resolved_socket_path()?;
    println!("  socket_path: {}", socket.display());
    println!();
    if let Some(path) = Config::default_config_path() {
        println!("Config file: {}", path.display());
        if path.exists() {
            println!("  (exists)");
        } else {
            println!("  (not found - using defaults)");
        }
    }
    Ok(())
}

fn humanize(duration: std::time::Duration) -> String {
    let secs = duration.as_secs();
    if secs % 60 == 0 && secs > 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
