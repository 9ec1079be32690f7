//! Herald CLI - Command line interface for Herald
//!
//! Runs the Slack webhook server with its reminder and report schedules, and
//! offers one-shot commands for operators.

mod commands;
mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{ListArgs, ReportArgs, ServeArgs, ShowArgs};

/// Herald: code review requests, tracked in Slack
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Review channel id (overrides config and env)
    #[arg(long, global = true)]
    channel: Option<String>,

    /// Database file (overrides config and env)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show version information
    Version,

    /// Run the Slack webhook server and the schedules
    Serve(ServeArgs),

    /// Send reminders for open requests now
    Remind,

    /// Publish the weekly report now
    Report(ReportArgs),

    /// List recent review requests
    #[command(visible_alias = "ls")]
    List(ListArgs),

    /// Show one review request
    Show(ShowArgs),

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let port = match &cli.command {
        Some(Commands::Serve(args)) => args.port,
        _ => None,
    };

    // Load configuration with overrides
    let config = Config::load_with_overrides(cli.channel.clone(), cli.database.clone(), port)?;

    if cli.verbose {
        tracing::debug!(
            channel = ?config.slack.channel,
            database = ?config.database.path,
            "Configuration loaded"
        );
    }

    match cli.command {
        Some(Commands::Version) => {
            println!("herald {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Serve(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Remind) => {
            commands::remind::execute(&config).await?;
        }
        Some(Commands::Report(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::List(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Show(args)) => {
            args.execute(&config).await?;
        }
        Some(Commands::Config) => {
            commands::config::print(&config);
        }
        None => {
            println!("Herald - code review requests, tracked in Slack");
            println!();
            println!("Use --help for usage information");
        }
    }

    Ok(())
}
