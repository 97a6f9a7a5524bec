// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SPP link command line tool.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spp_link::bluetooth::{BluezAdapter, BluezChannels};
use spp_link::{ChannelListener, Config, ConnectionManager, ConnectionState, LinkEvent};

#[derive(Parser)]
#[command(name = "spp-link")]
#[command(about = "Bluetooth Classic SPP link to a wearable", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover nearby devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Connect and bridge stdin/stdout over the link
    Connect { address: String },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("spp_link={level}").parse()?),
        )
        .init();

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    match cli.command {
        Commands::Scan { seconds } => {
            let seconds = seconds.unwrap_or(config.bluetooth.scan_duration_secs);
            scan(&config, Duration::from_secs(seconds)).await
        }
        Commands::Connect { address } => connect(&config, &address).await,
        Commands::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn open_manager(config: &Config) -> Result<ConnectionManager> {
    let adapter = BluezAdapter::new(config.bluetooth.adapter.as_deref())
        .await
        .context("Failed to open Bluetooth adapter")?;

    Ok(ConnectionManager::new(
        Arc::new(adapter),
        Arc::new(BluezChannels),
        config.link.clone(),
    ))
}

async fn scan(config: &Config, duration: Duration) -> Result<()> {
    let manager = open_manager(config).await?;

    info!("Scanning for {:?}...", duration);
    manager.start_scan().await?;
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => info!("Scan interrupted"),
    }
    manager.stop_scan().await;

    for device in manager.get_scanned_devices() {
        println!(
            "{}  {}",
            device.address,
            device.name.as_deref().unwrap_or("N/A")
        );
    }
    Ok(())
}

async fn connect(config: &Config, address: &str) -> Result<()> {
    let manager = open_manager(config).await?;

    let (listener, mut events) = ChannelListener::new();
    manager.set_data_listener(Arc::new(listener));

    let target = address.to_string();
    manager.on_connected(move || info!("Link to {} ready", target));

    manager
        .connect(address)
        .await
        .with_context(|| format!("Failed to connect to {address}"))?;

    let mut state = manager.subscribe_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let mut payload = line.into_bytes();
                    payload.push(b'\n');
                    manager.send(payload);
                }
                None => stdin_open = false,
            },
            event = events.recv() => match event {
                Some(LinkEvent::Data(bytes)) => {
                    println!("<- {} | {}", hex::encode(&bytes), String::from_utf8_lossy(&bytes));
                }
                Some(LinkEvent::Error(e)) => error!("Link error: {}", e),
                None => break,
            },
            changed = state.changed() => {
                if changed.is_err() || *state.borrow_and_update() == ConnectionState::Disconnected {
                    warn!("Link lost");
                    break;
                }
            }
        }
    }

    manager.disconnect();
    Ok(())
}
