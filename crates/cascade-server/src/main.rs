//! Cascade multiplayer server
//!
//! Authoritative room server: one logical thread handles every connection event.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use renet::{RenetServer, ServerEvent};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cascade_server::{
    channel_for, channel_id, connection_config,
    protocol::{deserialize_client_message, serialize_server_message},
    InMemoryRoomStore, Outbound, ServerConfig, ServerRunner, SyncService, PROTOCOL_ID,
};

#[derive(Parser)]
#[command(name = "cascade-server")]
#[command(about = "Authoritative multiplayer server for Cascade", version)]
struct Cli {
    /// YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

struct Server {
    renet: RenetServer,
    sync: SyncService<InMemoryRoomStore>,
}

impl Server {
    fn new(config: ServerConfig) -> Self {
        Self {
            renet: RenetServer::new(connection_config()),
            sync: SyncService::new(InMemoryRoomStore::new(), config),
        }
    }

    fn update(&mut self, now: Instant) {
        while let Some(event) = self.renet.get_event() {
            match event {
                ServerEvent::ClientConnected { client_id } => {
                    self.sync.handle_connect(client_id, now);
                }
                ServerEvent::ClientDisconnected { client_id, reason } => {
                    info!("Client {} disconnected: {:?}", client_id, reason);
                    let out = self.sync.handle_disconnect(client_id, now);
                    self.deliver(out);
                }
            }
        }

        for client_id in self.renet.clients_id() {
            for channel in [channel_id::COMMANDS, channel_id::HEARTBEAT] {
                while let Some(data) = self.renet.receive_message(client_id, channel) {
                    let message = match deserialize_client_message(&data) {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!("Failed to deserialize message from {}: {}", client_id, e);
                            continue;
                        }
                    };
                    let out = self.sync.handle_message(client_id, message, now);
                    self.deliver(out);
                }
            }
        }

        let out = self.sync.tick(now);
        self.deliver(out);
    }

    fn deliver(&mut self, out: Vec<Outbound>) {
        for Outbound { client_id, message } in out {
            if !self.renet.is_connected(client_id) {
                continue;
            }
            let channel = channel_for(&message);
            match serialize_server_message(&message) {
                Ok(data) => self.renet.send_message(client_id, channel, data),
                Err(e) => warn!("Failed to serialize message for {}: {}", client_id, e),
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("cascade_server=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cascade_server=info"))
    };
    fmt().with_env_filter(filter).init();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    config.validate().context("Invalid server config")?;

    let mut transport = ServerRunner::bind(&config).context("Failed to create transport")?;

    info!("Cascade server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(addr) = transport.local_addr() {
        info!("Listening on {}", addr);
    }
    info!("Protocol ID: {:016x}", PROTOCOL_ID);
    info!(
        "Board {}x{}, {}-{} players, {}s disconnect grace",
        config.board_rows,
        config.board_columns,
        config.min_players,
        config.max_players,
        config.disconnect_grace_secs
    );

    let tick = config.tick_interval();
    let mut server = Server::new(config);
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_tick = Instant::now();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                let delta: Duration = now.duration_since(last_tick);
                last_tick = now;

                transport.receive(&mut server.renet, delta);
                server.update(now);
                transport.send(&mut server.renet);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                transport.disconnect_all(&mut server.renet);
                break;
            }
        }
    }

    Ok(())
}
