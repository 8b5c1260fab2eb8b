//! CLI commands implementation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::config::Settings;
use crate::server::AppState;
use crate::services::RunOutcome;

#[derive(Parser)]
#[command(name = "ledgerfeed")]
#[command(about = "External document feed connectors and sync")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and write a config file with persistent secrets
    Init,

    /// Start the HTTP server
    Serve {
        /// Host to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage document sources
    Source {
        #[command(subcommand)]
        command: SourceCommands,
    },

    /// Manage automation credentials
    Cron {
        #[command(subcommand)]
        command: CronCommands,
    },
}

#[derive(Subcommand)]
enum SourceCommands {
    /// List a tenant's sources
    List {
        /// Tenant ID
        tenant_id: String,
    },
    /// Run a scheduled sync for one source now
    Sync {
        /// Source ID
        source_id: String,
    },
}

#[derive(Subcommand)]
enum CronCommands {
    /// Rotate a tenant's cron secret and print the new one (shown only once)
    Rotate {
        /// Tenant ID
        tenant_id: String,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load(cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Init => {
            let path = settings.persist()?;
            println!(
                "{} wrote {}",
                style("initialized").green().bold(),
                path.display()
            );
            Ok(())
        }

        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| settings.listen_host.clone());
            let port = port.unwrap_or(settings.listen_port);
            crate::server::serve(&settings, &host, port).await
        }

        Commands::Source { command } => match command {
            SourceCommands::List { tenant_id } => {
                let state = AppState::new(&settings).await?;
                let sources = state.sources.get_for_tenant(&tenant_id).await?;
                if sources.is_empty() {
                    println!("no sources for tenant {}", tenant_id);
                    return Ok(());
                }
                for source in sources {
                    let connected = state.vault.is_connected(&source.id).await?;
                    let connection = if connected {
                        style("connected").green()
                    } else {
                        style("disconnected").red()
                    };
                    let enabled = if source.enabled { "enabled" } else { "disabled" };
                    println!(
                        "{}  {}  {}  {}  every {}m  {}",
                        style(&source.id).cyan(),
                        source.name,
                        source.provider.as_str(),
                        enabled,
                        source.schedule_minutes,
                        connection,
                    );
                    if let Some(err) = &source.last_error {
                        println!("    last error: {}", style(err).yellow());
                    }
                }
                Ok(())
            }

            SourceCommands::Sync { source_id } => {
                let state = AppState::new(&settings).await?;
                let source = state
                    .sources
                    .get(&source_id)
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("source {} not found", source_id))?;

                match state.engine.run_scheduled(&source).await? {
                    RunOutcome::AlreadyRunning => {
                        println!("{}", style("another run holds the lease").yellow());
                    }
                    RunOutcome::Completed(report) => {
                        println!(
                            "{} {} imported, {} total",
                            style("done:").green().bold(),
                            report.inserted,
                            report.results.len()
                        );
                        for result in report.results {
                            if let Some(message) = result.message {
                                println!("  {} {}: {}", style("error").red(), result.id, message);
                            }
                        }
                    }
                }
                Ok(())
            }
        },

        Commands::Cron { command } => match command {
            CronCommands::Rotate { tenant_id } => {
                let state = AppState::new(&settings).await?;
                let secret = state.cron.rotate(&tenant_id).await?;
                println!(
                    "{} new cron secret for {} (shown once, store it now):",
                    style("rotated").green().bold(),
                    tenant_id
                );
                println!("{}", secret);
                Ok(())
            }
        },
    }
}
