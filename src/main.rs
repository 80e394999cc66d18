use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use futures_util::StreamExt;
use log::{error, info};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use chippy_ble_lib::cli::{Cli, Command};
use chippy_ble_lib::commands;
use chippy_ble_lib::config::AppConfig;
use chippy_ble_lib::core::ChatHandle;
use chippy_ble_lib::core::bluetooth::{Direction, PeerIdentity};
use chippy_ble_lib::logging;
use chippy_ble_lib::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir).await?;
    let level = if cli.verbose {
        "debug"
    } else {
        config.link.log_level.as_str()
    };
    logging::init(level, cli.json)?;

    let app_state = AppState::new(config).await?;
    let handle = app_state.handle();

    let result = match cli.command {
        Command::Scan { seconds } => scan(&handle, cli.json, seconds).await,
        Command::Chat {
            device,
            scan_seconds,
        } => match find(&handle, &device, scan_seconds).await {
            Ok(()) => chat(&handle, cli.json).await,
            Err(e) => Err(e),
        },
        Command::Serve => match commands::start_advertise(&handle).await {
            Ok(()) => chat(&handle, cli.json).await,
            Err(e) => Err(anyhow!(e)),
        },
    };

    handle.shutdown().await;
    if let Err(e) = &result {
        error!("{}", e);
    }
    info!("Chippy exited");
    result
}

/// Prints every peer found within `seconds`
async fn scan(handle: &ChatHandle, json: bool, seconds: u64) -> Result<()> {
    commands::start_scan(handle).await.map_err(|e| anyhow!(e))?;
    let mut found = handle.discovered_peers();
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            next = found.next() => match next {
                Some(peer) => print_peer(&peer, json),
                None => break,
            },
        }
    }
    commands::stop_scan(handle).await.map_err(|e| anyhow!(e))
}

/// Scans until `device` shows up and connects to it
async fn find(handle: &ChatHandle, device: &str, seconds: u64) -> Result<()> {
    commands::start_scan(handle).await.map_err(|e| anyhow!(e))?;
    let mut peers = handle.peers();
    let wanted = |peers: &Vec<PeerIdentity>| {
        peers.iter().any(|p| {
            p.address.eq_ignore_ascii_case(device) || p.name.as_deref() == Some(device)
        })
    };

    let seen = tokio::time::timeout(Duration::from_secs(seconds), peers.wait_for(wanted))
        .await
        .is_ok_and(|found| found.is_ok());
    if !seen {
        commands::stop_scan(handle).await.map_err(|e| anyhow!(e))?;
        return Err(anyhow!("Device not found with ID: {}", device));
    }
    commands::connect_to_device(handle, device)
        .await
        .map_err(|e| anyhow!(e))
}

/// Relays stdin lines to the peer and prints everything that happens until
/// the link goes back to idle or stdin closes
async fn chat(handle: &ChatHandle, json: bool) -> Result<()> {
    let mut notices = handle.notices();
    let mut messages = handle.messages();
    let mut states = handle.connection_state();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut printed = messages.borrow_and_update().len();
    if states.borrow_and_update().is_idle() {
        return Ok(());
    }

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => emit(&notice, json),
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            changed = messages.changed() => {
                if changed.is_err() {
                    break;
                }
                let log = messages.borrow_and_update().clone();
                for record in log.iter().skip(printed) {
                    if record.direction == Direction::Received {
                        emit(record, json);
                    }
                }
                printed = log.len();
            }
            changed = states.changed() => {
                if changed.is_err() || states.borrow_and_update().is_idle() {
                    break;
                }
            }
            line = lines.next_line() => match line? {
                Some(line) if line.trim() == "/quit" => break,
                Some(line) => {
                    if let Err(e) = commands::send_message(handle, &line).await {
                        error!("{}", e);
                    }
                }
                None => break,
            },
        }
    }

    if !handle.connection_state().borrow().is_idle() {
        commands::disconnect(handle).await.map_err(|e| anyhow!(e))?;
    }
    Ok(())
}

fn print_peer(peer: &PeerIdentity, json: bool) {
    if json {
        emit(peer, true);
    } else {
        println!("{}\t{}", peer.address, peer.name.as_deref().unwrap_or("Unknown"));
    }
}

fn emit<T: Serialize + std::fmt::Display>(value: &T, json: bool) {
    if !json {
        println!("{}", value);
        return;
    }
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}
