//! UDP command channel plus the two TCP response streams.
//!
//! Responses are length-validated only. There are no sequence numbers, so a
//! caller must pair every request with exactly one receive on its channel.

use std::fmt;
use std::io::{ErrorKind, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::{EndpointConfig, ProtocolConfig};
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Udp,
    Screen,
    Ram,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Udp => "udp",
            Channel::Screen => "screen",
            Channel::Ram => "ram",
        })
    }
}

/// Where the emulator's connector script listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoint {
    host: String,
    udp_port: u16,
    tcp_port_screen: u16,
    tcp_port_ram: u16,
}

impl SessionEndpoint {
    pub fn new(host: impl Into<String>, udp_port: u16, tcp_port_screen: u16, tcp_port_ram: u16) -> Self {
        Self {
            host: host.into(),
            udp_port,
            tcp_port_screen,
            tcp_port_ram,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    pub fn tcp_port_screen(&self) -> u16 {
        self.tcp_port_screen
    }

    pub fn tcp_port_ram(&self) -> u16 {
        self.tcp_port_ram
    }
}

impl From<&EndpointConfig> for SessionEndpoint {
    fn from(cfg: &EndpointConfig) -> Self {
        Self::new(cfg.host.clone(), cfg.udp_port, cfg.tcp_port_screen, cfg.tcp_port_ram)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub read_timeout: Duration,
    pub padding_length: usize,
    pub screen_chunk_size: usize,
    pub ram_chunk_size: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::from(&ProtocolConfig::default())
    }
}

impl From<&ProtocolConfig> for TransportOptions {
    fn from(cfg: &ProtocolConfig) -> Self {
        Self {
            read_timeout: cfg.read_timeout(),
            padding_length: cfg.padding_length,
            screen_chunk_size: cfg.screen_chunk_size,
            ram_chunk_size: cfg.ram_chunk_size,
        }
    }
}

pub struct TransportSession {
    endpoint: SessionEndpoint,
    options: TransportOptions,
    udp: UdpSocket,
    udp_target: SocketAddr,
    screen: TcpStream,
    ram: TcpStream,
}

impl TransportSession {
    pub fn connect(endpoint: SessionEndpoint, options: TransportOptions) -> Result<Self> {
        info!(
            host = %endpoint.host,
            udp_port = endpoint.udp_port,
            tcp_port_screen = endpoint.tcp_port_screen,
            tcp_port_ram = endpoint.tcp_port_ram,
            "connecting to emulator"
        );
        let udp_target = resolve(&endpoint.host, endpoint.udp_port, Channel::Udp)?;
        let bind_addr = if udp_target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let udp = UdpSocket::bind(bind_addr).map_err(|source| BridgeError::Connection {
            channel: Channel::Udp,
            addr: bind_addr.to_string(),
            source,
        })?;
        let screen = connect_tcp(&endpoint.host, endpoint.tcp_port_screen, Channel::Screen, &options)?;
        info!("connected screen");
        let ram = connect_tcp(&endpoint.host, endpoint.tcp_port_ram, Channel::Ram, &options)?;
        info!("connected ram");
        Ok(Self {
            endpoint,
            options,
            udp,
            udp_target,
            screen,
            ram,
        })
    }

    pub fn endpoint(&self) -> &SessionEndpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Fire-and-forget. The whole command goes out as one datagram.
    pub fn send(&self, command: &Command) -> Result<()> {
        let bytes = command.encode();
        let sent = self.udp.send_to(&bytes, self.udp_target)?;
        if sent != bytes.len() {
            return Err(BridgeError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                format!("short udp write for {command}: {sent} of {} bytes", bytes.len()),
            )));
        }
        debug!(%command, "sent");
        Ok(())
    }

    /// Collects one response of `expected_len` bytes (plus symmetric padding).
    ///
    /// `Err(Timeout)` when a read times out. `Ok(None)` when the stream
    /// yields anything other than exactly the expected length.
    pub fn receive(&mut self, channel: Channel, expected_len: usize) -> Result<Option<Vec<u8>>> {
        let target = expected_len + 2 * self.options.padding_length;
        let (stream, chunk_size) = match channel {
            Channel::Screen => (&mut self.screen, self.options.screen_chunk_size),
            Channel::Ram => (&mut self.ram, self.options.ram_chunk_size),
            Channel::Udp => {
                return Err(BridgeError::Configuration(
                    "the udp channel carries no responses".to_string(),
                ));
            }
        };
        let package = collect_package(stream, channel, target, chunk_size)?;
        if package.len() != target {
            warn!(%channel, got = package.len(), expected = target, "skipped malformed response");
            return Ok(None);
        }
        Ok(Some(package))
    }
}

/// First resolved address, IPv4 preferred so `localhost` lands where the
/// connector script binds.
fn resolve(host: &str, port: u16, channel: Channel) -> Result<SocketAddr> {
    let to_conn_err = |source: std::io::Error| BridgeError::Connection {
        channel,
        addr: format!("{host}:{port}"),
        source,
    };
    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(to_conn_err)?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            to_conn_err(std::io::Error::new(ErrorKind::NotFound, "host resolved to no address"))
        })
}

fn connect_tcp(host: &str, port: u16, channel: Channel, options: &TransportOptions) -> Result<TcpStream> {
    let addr = resolve(host, port, channel)?;
    let to_conn_err = |source: std::io::Error| BridgeError::Connection {
        channel,
        addr: addr.to_string(),
        source,
    };
    let stream = TcpStream::connect(addr).map_err(to_conn_err)?;
    stream.set_nonblocking(false).map_err(to_conn_err)?;
    stream
        .set_read_timeout(Some(options.read_timeout))
        .map_err(to_conn_err)?;
    Ok(stream)
}

/// Reads chunks until `target` bytes arrived or the peer closed the stream.
/// A read never asks for more than the bytes still missing, so a response
/// queued right behind this one stays in the socket.
fn collect_package<R: Read>(
    stream: &mut R,
    channel: Channel,
    target: usize,
    chunk_size: usize,
) -> Result<Vec<u8>> {
    let mut package = Vec::with_capacity(target);
    let mut chunk = vec![0u8; chunk_size];
    while package.len() < target {
        let want = (target - package.len()).min(chunk_size);
        match stream.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(n) => package.extend_from_slice(&chunk[..n]),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(BridgeError::Timeout(channel));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(BridgeError::Io(e)),
        }
    }
    Ok(package)
}
