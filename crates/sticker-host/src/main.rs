use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;

use sticker_core::{MetadataRow, PackDescription};
use sticker_host::config::HostConfig;
use sticker_host::{HostServer, boot, telemetry};

#[derive(Debug, Parser)]
#[command(name = "sticker-host", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the provider, build and share endpoints over HTTP
    Serve {
        /// YAML configuration; STICKER_* variables are used when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port override for the HTTP server
        #[arg(long)]
        port: Option<u16>,
    },
    /// Build and commit one pack description, then print its metadata row
    Build {
        /// JSON pack description
        #[arg(long)]
        description: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print every committed pack
    List {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    telemetry::init();
    if let Err(err) = run().await {
        tracing::error!(error = %err, "sticker host failed");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    match Cli::parse().command {
        Command::Serve { config, port } => {
            let mut host_config =
                HostConfig::load(config.as_deref()).context("failed to load configuration")?;
            if let Some(port) = port {
                host_config.http.port = port;
            }
            let state = boot::start(&host_config)?;
            let server = HostServer::bind(host_config.socket_addr(), state).await?;
            server
                .serve(async {
                    if signal::ctrl_c().await.is_ok() {
                        tracing::info!("received shutdown signal");
                    }
                })
                .await?;
        }
        Command::Build {
            description,
            config,
        } => {
            let host_config =
                HostConfig::load(config.as_deref()).context("failed to load configuration")?;
            let raw = tokio::fs::read(&description)
                .await
                .with_context(|| format!("failed to read description {:?}", description))?;
            let parsed: PackDescription = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse description {:?}", description))?;
            let state = boot::start(&host_config)?;
            let pack = state.builder.build(parsed).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&MetadataRow::from(pack.as_ref()))?
            );
        }
        Command::List { config } => {
            let host_config =
                HostConfig::load(config.as_deref()).context("failed to load configuration")?;
            let state = boot::start(&host_config)?;
            println!("{}", serde_json::to_string_pretty(&state.query.list())?);
        }
    }
    Ok(())
}
