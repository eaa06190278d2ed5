use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use crate::config::ServerConfig;

/// Fixed port used in development mode.
pub const DEV_PORT: u16 = 2601;

/// How the port of a new endpoint is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelection {
    Explicit(u16),
    /// [`DEV_PORT`].
    Development,
    /// Whatever the OS hands out for a loopback bind on port 0.
    Ephemeral,
}

impl PortSelection {
    /// Explicit port if configured, otherwise the dev port in dev mode, otherwise ephemeral.
    #[must_use]
    pub fn from_config(server: &ServerConfig) -> Self {
        match server.port {
            Some(port) => PortSelection::Explicit(port),
            None if server.dev_mode => PortSelection::Development,
            None => PortSelection::Ephemeral,
        }
    }

    /// # Errors
    /// Returns the I/O error of the probe bind for [`PortSelection::Ephemeral`].
    pub fn resolve(self) -> std::io::Result<u16> {
        match self {
            PortSelection::Explicit(port) => Ok(port),
            PortSelection::Development => Ok(DEV_PORT),
            PortSelection::Ephemeral => {
                // Probe then release; the port is rebound by the worker.
                let probe = TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?;
                Ok(probe.local_addr()?.port())
            }
        }
    }
}
