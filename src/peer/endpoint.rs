//! Opening the peer's socket endpoint.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum EndpointError {
    #[error("Client endpoint needs a host")]
    MissingHost,

    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No {family:?} address for {host}")]
    NoAddress { host: String, family: AddressFamily },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to accept a connection: {0}")]
    Accept(#[source] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// TCP.
    Stream,
    /// UDP.
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Server,
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    Inet,
    Inet6,
}

impl AddressFamily {
    pub fn unspecified(self, port: u16) -> SocketAddr {
        match self {
            Self::Inet => SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            Self::Inet6 => SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
        }
    }

    pub fn matches(self, addr: &SocketAddr) -> bool {
        matches!(
            (self, addr),
            (Self::Inet, SocketAddr::V4(_)) | (Self::Inet6, SocketAddr::V6(_))
        )
    }
}

/// Where and how the peer opens its socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub transport: Transport,
    pub role: Role,
    pub family: AddressFamily,
    /// Remote host for clients; optional local address for servers.
    #[serde(default)]
    pub host: Option<String>,
    /// Local port for servers (0 = ephemeral), remote port for clients.
    pub port: u16,
}

impl EndpointSpec {
    pub fn server(transport: Transport, family: AddressFamily, port: u16) -> Self {
        Self {
            transport,
            role: Role::Server,
            family,
            host: None,
            port,
        }
    }

    pub fn client(transport: Transport, family: AddressFamily, host: &str, port: u16) -> Self {
        Self {
            transport,
            role: Role::Client,
            family,
            host: Some(host.to_string()),
            port,
        }
    }
}

/// Peer tuning carried in the launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOptions {
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
    /// Extra bytes read past an expected chunk to detect surplus data.
    pub overflow_window: usize,
}

impl Default for PeerOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 1,
            connect_delay_ms: 50,
            overflow_window: 255,
        }
    }
}

/// An endpoint that is open but may still need to accept its connection.
#[derive(Debug)]
pub enum Opened {
    Listener(TcpListener),
    Stream(TcpStream),
    Datagram(UdpSocket),
}

impl Opened {
    pub fn local_port(&self) -> io::Result<u16> {
        let addr = match self {
            Self::Listener(l) => l.local_addr()?,
            Self::Stream(s) => s.local_addr()?,
            Self::Datagram(d) => d.local_addr()?,
        };
        Ok(addr.port())
    }
}

/// Open the endpoint described by `spec`.
///
/// Servers bind and, for streams, listen. Clients resolve the host, keep
/// the addresses of the requested family, and connect (datagram clients
/// associate a default destination instead).
pub async fn open(spec: &EndpointSpec, options: &PeerOptions) -> Result<Opened, EndpointError> {
    match spec.role {
        Role::Server => {
            let addr = match &spec.host {
                Some(host) => resolve(host, spec.port, spec.family).await?[0],
                None => spec.family.unspecified(spec.port),
            };
            let opened = match spec.transport {
                Transport::Stream => TcpListener::bind(addr).await.map(Opened::Listener),
                Transport::Datagram => UdpSocket::bind(addr).await.map(Opened::Datagram),
            }
            .map_err(|source| EndpointError::Bind { addr, source })?;
            info!(%addr, transport = ?spec.transport, "server endpoint bound");
            Ok(opened)
        }
        Role::Client => {
            let host = spec.host.as_deref().ok_or(EndpointError::MissingHost)?;
            let addrs = resolve(host, spec.port, spec.family).await?;
            let opened = match spec.transport {
                Transport::Stream => Opened::Stream(connect_stream(&addrs, options).await?),
                Transport::Datagram => Opened::Datagram(connect_datagram(&addrs, spec.family).await?),
            };
            info!(host, port = spec.port, transport = ?spec.transport, "client endpoint connected");
            Ok(opened)
        }
    }
}

async fn resolve(
    host: &str,
    port: u16,
    family: AddressFamily,
) -> Result<Vec<SocketAddr>, EndpointError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| EndpointError::Resolve {
            host: host.to_string(),
            source,
        })?
        .filter(|a| family.matches(a))
        .collect();
    if addrs.is_empty() {
        return Err(EndpointError::NoAddress {
            host: host.to_string(),
            family,
        });
    }
    Ok(addrs)
}

async fn connect_stream(
    addrs: &[SocketAddr],
    options: &PeerOptions,
) -> Result<TcpStream, EndpointError> {
    let attempts = options.connect_attempts.max(1);
    let mut last = None;
    for attempt in 1..=attempts {
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(source) => {
                    debug!(%addr, attempt, error = %source, "connect failed");
                    last = Some(EndpointError::Connect {
                        addr: *addr,
                        source,
                    });
                }
            }
        }
        if attempt < attempts {
            tokio::time::sleep(Duration::from_millis(options.connect_delay_ms)).await;
        }
    }
    // addrs is never empty here, so at least one attempt was recorded.
    Err(last.unwrap_or(EndpointError::MissingHost))
}

async fn connect_datagram(
    addrs: &[SocketAddr],
    family: AddressFamily,
) -> Result<UdpSocket, EndpointError> {
    let local = family.unspecified(0);
    let socket = UdpSocket::bind(local)
        .await
        .map_err(|source| EndpointError::Bind {
            addr: local,
            source,
        })?;
    let addr = addrs[0];
    socket
        .connect(addr)
        .await
        .map_err(|source| EndpointError::Connect { addr, source })?;
    Ok(socket)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_on_port_zero_gets_ephemeral_port() {
        let spec = EndpointSpec::server(Transport::Stream, AddressFamily::Inet, 0);
        let opened = open(&spec, &PeerOptions::default()).await.unwrap();
        assert!(matches!(opened, Opened::Listener(_)));
        assert_ne!(opened.local_port().unwrap(), 0);
    }

    #[tokio::test]
    async fn client_without_listener_fails_to_connect() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let spec = EndpointSpec::client(Transport::Stream, AddressFamily::Inet, "127.0.0.1", port);
        let options = PeerOptions {
            connect_attempts: 2,
            connect_delay_ms: 1,
            ..PeerOptions::default()
        };
        assert!(matches!(
            open(&spec, &options).await,
            Err(EndpointError::Connect { .. })
        ));
    }

    #[tokio::test]
    async fn family_filter_rejects_mismatched_host() {
        let spec = EndpointSpec::client(Transport::Datagram, AddressFamily::Inet6, "127.0.0.1", 9);
        assert!(matches!(
            open(&spec, &PeerOptions::default()).await,
            Err(EndpointError::NoAddress { .. })
        ));
    }

    #[test]
    fn spec_serializes_lowercase() {
        let spec = EndpointSpec::server(Transport::Datagram, AddressFamily::Inet6, 7);
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"datagram\""));
        assert!(json.contains("\"inet6\""));
    }
}
