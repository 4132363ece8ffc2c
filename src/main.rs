use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::oneshot;
use tracing::{info, warn};

use hcilink::config::AppConfig;
use hcilink::protocol::consts::{OP_READ_BD_ADDR, OP_RESET};
use hcilink::{CommandChannel, CommandPacket, DeviceAddress, Dispatcher, HciSocket};

#[derive(Parser)]
#[command(
    name = "hcilink",
    about = "HCI transaction-layer probe for Linux Bluetooth controllers"
)]
struct Cli {
    /// Adapter index (hciN) to open; overrides the config file
    #[arg(long)]
    adapter: Option<u16>,
    /// Exit after one controller session instead of reopening
    #[arg(long)]
    oneshot: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("hcilink=debug".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    info!("hcilink starting");

    let mut config = AppConfig::load();
    if let Some(adapter) = cli.adapter {
        config.adapter = adapter;
    }
    if cli.oneshot {
        config.reconnect = false;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_with_restart(config));
    Ok(())
}

/// Run probe sessions with auto-restart. Retries with exponential backoff
/// when the controller goes away or bring-up fails.
async fn run_with_restart(config: AppConfig) {
    let start = Duration::from_secs(config.backoff_start_secs);
    let max = Duration::from_secs(config.backoff_max_secs);
    let mut backoff = start;

    loop {
        match run_probe(config.adapter).await {
            Ok(()) => {
                info!("Controller session ended");
                backoff = start;
            }
            Err(e) => {
                warn!("Probe error: {:#}", e);
            }
        }

        if !config.reconnect {
            return;
        }
        info!("Reopening hci{} in {:?}...", config.adapter, backoff);
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max);
    }
}

/// One controller session: open the user channel, reset the controller,
/// read its address, then log events until the socket dies.
async fn run_probe(adapter: u16) -> Result<()> {
    let socket = HciSocket::open(adapter).await?;
    let (event_rx, out_tx, read_task, write_task) = socket.into_split();
    let channel = CommandChannel::new(event_rx, out_tx);
    let dispatcher = Dispatcher::spawned();

    let (reset_tx, reset_rx) = oneshot::channel();
    channel.send_command_complete(CommandPacket::new(OP_RESET), &dispatcher, move |_, event| {
        let _ = reset_tx.send(event);
    })?;
    let event = reset_rx.await.context("reset completion dropped")?;
    match event.to_command_complete()?.status() {
        Some(status) if status.is_success() => info!("Controller reset"),
        Some(status) => warn!("Controller reset failed: {}", status),
        None => warn!("Controller reset returned no status"),
    }

    let (addr_tx, addr_rx) = oneshot::channel();
    channel.send_command_complete(
        CommandPacket::new(OP_READ_BD_ADDR),
        &dispatcher,
        move |_, event| {
            let _ = addr_tx.send(event);
        },
    )?;
    let event = addr_rx.await.context("address completion dropped")?;
    let complete = event.to_command_complete()?;
    if complete.return_params.len() >= 7 {
        let mut wire = [0u8; 6];
        wire.copy_from_slice(&complete.return_params[1..7]);
        info!("Local address: {}", DeviceAddress::from_wire(wire));
    } else {
        warn!("Short Read_BD_ADDR response");
    }

    info!("Monitoring hci{} (unhandled events are logged at debug)", adapter);
    let _ = read_task.await;

    channel.shut_down();
    write_task.abort();
    Ok(())
}
