//! Netcode UDP transport in front of the renet server.

use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use renet::RenetServer;
use renet_netcode::{NetcodeServerTransport, ServerAuthentication, ServerConfig as NetcodeConfig};
use tracing::{error, info};

use crate::config::ServerConfig;

/// Netcode protocol id; clients built against another id are refused.
pub const PROTOCOL_ID: u64 = 0xCA5_CADE_001;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to configure socket: {0}")]
    Socket(#[from] std::io::Error),
    #[error("Failed to start netcode transport: {0}")]
    Netcode(String),
}

/// Owns the bound socket and moves packets in and out of a [`RenetServer`].
pub struct ServerRunner {
    transport: NetcodeServerTransport,
}

impl ServerRunner {
    /// Bind `config.bind_address` with unsecure netcode authentication.
    pub fn bind(config: &ServerConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.bind_address).map_err(|source| TransportError::Bind {
            addr: config.bind_address,
            source,
        })?;
        let bound = socket.local_addr()?;
        socket.set_nonblocking(true)?;

        let netcode = NetcodeConfig {
            current_time: since_epoch(),
            max_clients: config.max_clients,
            protocol_id: PROTOCOL_ID,
            public_addresses: vec![bound],
            authentication: ServerAuthentication::Unsecure,
        };
        let transport = NetcodeServerTransport::new(netcode, socket)
            .map_err(|e| TransportError::Netcode(e.to_string()))?;

        info!(
            "Transport bound to {} (max {} clients, protocol {:016x})",
            bound, config.max_clients, PROTOCOL_ID
        );
        Ok(Self { transport })
    }

    /// Advance renet by `delta` and pull in whatever arrived on the socket.
    pub fn receive(&mut self, renet: &mut RenetServer, delta: Duration) {
        renet.update(delta);
        if let Err(e) = self.transport.update(delta, renet) {
            error!("Transport update error: {}", e);
        }
    }

    pub fn send(&mut self, renet: &mut RenetServer) {
        self.transport.send_packets(renet);
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.addresses().first().copied()
    }

    pub fn disconnect_all(&mut self, renet: &mut RenetServer) {
        self.transport.disconnect_all(renet);
    }
}

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
