use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wavelink::model::IceServerConfig;
use wavelink::server::{
    BridgeConfig, BridgeTransport, DEFAULT_STUN_SERVER, Demultiplexer, TransportConfig,
    WebRtcEngine,
};

#[derive(Parser)]
#[command(name = "wavelink")]
#[command(about = "Answers WebRTC offers from room members and routes their signaling")]
struct Cli {
    /// Room to join.
    #[arg(long, default_value = "lobby")]
    room: String,

    /// Interpreter used to run the room bridge.
    #[arg(long, default_value = "node")]
    program: String,

    /// Room bridge script.
    #[arg(long, default_value = "room-bridge.js")]
    script: PathBuf,

    /// STUN server URL. May be repeated.
    #[arg(long = "stun", default_value = DEFAULT_STUN_SERVER)]
    stun: Vec<String>,

    /// TURN server URL.
    #[arg(long)]
    turn: Option<String>,

    #[arg(long, requires = "turn")]
    turn_username: Option<String>,

    #[arg(long, requires = "turn")]
    turn_credential: Option<String>,

    /// How long to wait for queued output to drain on shutdown.
    #[arg(long, default_value_t = 300)]
    flush_timeout_ms: u64,
}

impl Cli {
    fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            program: self.program.clone(),
            script: self.script.clone(),
            room: self.room.clone(),
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
            ..BridgeConfig::default()
        }
    }

    fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::host_only();
        for url in &self.stun {
            config = config.with_ice_server(IceServerConfig::stun(url.clone()));
        }
        if let Some(turn) = &self.turn {
            config = config.with_ice_server(IceServerConfig {
                urls: vec![turn.clone()],
                username: self.turn_username.clone(),
                credential: self.turn_credential.clone(),
            });
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    println!(
        "{} {}",
        "📡 Wavelink joining room".green().bold(),
        cli.room.cyan()
    );

    let (bridge, room_rx) = BridgeTransport::spawn(&cli.bridge_config())
        .with_context(|| format!("Failed to start room bridge {}", cli.script.display()))?;

    let engine = Arc::new(WebRtcEngine::new(cli.transport_config()));
    let (fault_tx, mut fault_rx) = mpsc::unbounded_channel();
    let router = Demultiplexer::new(room_rx, engine, bridge.output()).with_fault_reporter(fault_tx);
    let registry = router.registry();
    let mut router_task = tokio::spawn(router.run());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut router_task => {
                if let Err(e) = result {
                    error!("Router task failed: {}", e);
                }
                break;
            }

            Some(fault) = fault_rx.recv() => {
                // A fatal fault is the last event; the router stops right after.
                if fault.is_fatal() {
                    error!("Room transport lost: {}", fault);
                } else {
                    warn!("Room transport fault: {}", fault);
                }
            }

            _ = &mut ctrl_c => {
                info!("Interrupted; closing sessions");
                // Stop taking events first so nothing new is created behind
                // the sweep.
                router_task.abort();
                let _ = (&mut router_task).await;
                registry.close_all().await;
                break;
            }
        }
    }

    bridge.shutdown().await;
    println!("{}", "👋 Wavelink stopped".green().bold());
    Ok(())
}
