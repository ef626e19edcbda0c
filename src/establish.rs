//! Establishment Orchestrator (component design §4.4).
//!
//! Grounded directly on `antt/nat_traversal.py`'s `start_connection`/
//! `symm_shotgun`: given a local and remote [`ConnInfo`], optionally probe
//! for an already-reachable channel, then walk an ordered strategy list
//! until one proves the peer reachable — at which point, same as the
//! Python source closing its probe socket and handing a fresh
//! `SocketConnection` the same local port, this orchestrator drops the
//! probing socket and lets [`Endpoint::connect`] run its own verification
//! handshake on that port.

use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::EndpointConfig;
use crate::control::ControlByte;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};

/// How a peer can plausibly be reached; reported by [`crate::detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchType {
    Cone,
    Symmetric,
}

/// A single strategy in the attempt order, drawn from §4.4's set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Local,
    PunchCone,
    PunchSymmetric,
    UpnpConnect,
    UpnpOpen,
    Relay,
}

/// Describes one endpoint's reachability, mirroring `antt/nat_traversal.py`'s `ConnInfo`.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pub private_ip: IpAddr,
    pub private_port: u16,
    pub public_ip: IpAddr,
    pub public_port: u16,
    pub punch_type: PunchType,
    pub symmetric_range: (u16, u16),
    pub order: Vec<Strategy>,
}

impl ConnInfo {
    pub fn public_addr(&self) -> SocketAddr {
        SocketAddr::new(self.public_ip, self.public_port)
    }
}

/// Per-attempt tunables for the orchestrator, separate from [`EndpointConfig`]
/// because they govern the establishment phase, not the running endpoint.
#[derive(Debug, Clone, Copy)]
pub struct EstablishConfig {
    pub existing_probe_timeout: Duration,
    pub retry_count: u32,
    pub retry_timeout: Duration,
    /// Symmetric-NAT shotgun fires every `shotgun_every`th iteration (default 3, per §4.4).
    pub shotgun_every: u32,
}

impl Default for EstablishConfig {
    fn default() -> Self {
        Self {
            existing_probe_timeout: Duration::from_secs(1),
            retry_count: 6,
            retry_timeout: Duration::from_millis(500),
            shotgun_every: 3,
        }
    }
}

/// Walks `dest.order`, returning a started, verified [`Endpoint`] or a final
/// [`TransportError::ConnectionIssue`] once every strategy has failed.
pub fn start_connection(
    src: &ConnInfo,
    dest: &ConnInfo,
    endpoint_config: EndpointConfig,
    establish_config: EstablishConfig,
) -> Result<Endpoint> {
    start_connection_with_probe(src, dest, endpoint_config, establish_config, true)
}

/// As [`start_connection`], but lets callers skip the "already reachable?"
/// probe (§4.4 step 2) — useful in tests where both peers race the same
/// handshake bytes and the probe would otherwise consume the reply the
/// strategy loop is waiting for.
pub fn start_connection_with_probe(
    src: &ConnInfo,
    dest: &ConnInfo,
    endpoint_config: EndpointConfig,
    establish_config: EstablishConfig,
    probe_existing: bool,
) -> Result<Endpoint> {
    let socket = UdpSocket::bind((src.private_ip, src.private_port))?;
    socket.set_nonblocking(false)?;
    let local_port = socket.local_addr()?.port();
    let target = dest.public_addr();

    if probe_existing && probe_existing_channel(&socket, establish_config, target)? {
        debug!("establishment: existing channel confirmed");
        drop(socket);
        return Endpoint::connect(local_port, target, endpoint_config);
    }

    let mut last_err = TransportError::ConnectionIssue("no strategies configured".into());
    for strategy in &dest.order {
        info!(?strategy, "establishment: trying strategy");
        let attempt = match strategy {
            Strategy::Local => Ok(()),
            Strategy::PunchCone => try_punch(&socket, dest, target, establish_config, false),
            Strategy::PunchSymmetric => try_punch(&socket, dest, target, establish_config, true),
            Strategy::UpnpConnect | Strategy::UpnpOpen | Strategy::Relay => Err(TransportError::ConnectionIssue(
                format!("strategy {strategy:?} not implemented"),
            )),
        };
        match attempt {
            Ok(()) => {
                drop(socket);
                return Endpoint::connect(local_port, target, endpoint_config);
            }
            Err(e) => {
                warn!(?strategy, error = %e, "establishment: strategy failed, advancing");
                last_err = e;
            }
        }
    }

    Err(last_err)
}

/// §4.4 step 2: send `0x01` to the remote and wait briefly for `0x02`,
/// meaning a channel already exists (e.g. from a prior punch that's still live).
fn probe_existing_channel(socket: &UdpSocket, establish_config: EstablishConfig, target: SocketAddr) -> Result<bool> {
    socket.set_read_timeout(Some(establish_config.existing_probe_timeout))?;
    socket.send_to(&[ControlByte::AlivePing.as_byte()], target)?;

    let mut buf = [0u8; 16];
    match socket.recv_from(&mut buf) {
        Ok((n, _)) if n >= 1 && ControlByte::from_byte(buf[0]) == Some(ControlByte::AliveAck) => Ok(true),
        _ => Ok(false),
    }
}

/// `punch cone`/`punch symmetric`: synchronized `0x01`/`0x02` exchange
/// through each side's NAT. `symmetric` additionally fires a shotgun burst
/// every `shotgun_every`th iteration to prime a symmetric NAT's mapping.
fn try_punch(
    socket: &UdpSocket,
    dest: &ConnInfo,
    target: SocketAddr,
    establish_config: EstablishConfig,
    symmetric: bool,
) -> Result<()> {
    socket.set_read_timeout(Some(establish_config.retry_timeout))?;
    let mut buf = [0u8; 16];

    for attempt in 0..establish_config.retry_count {
        if symmetric && attempt % establish_config.shotgun_every == 0 {
            symmetric_shotgun(socket, dest);
        }

        if socket.send_to(&[ControlByte::AlivePing.as_byte()], target).is_err() {
            std::thread::sleep(establish_config.retry_timeout);
            continue;
        }

        match socket.recv_from(&mut buf) {
            Ok((n, _)) if n >= 1 && ControlByte::from_byte(buf[0]) == Some(ControlByte::AliveAck) => return Ok(()),
            Ok((n, _)) if n >= 1 && ControlByte::from_byte(buf[0]) == Some(ControlByte::AlivePing) => {
                let _ = socket.send_to(&[ControlByte::AliveAck.as_byte()], target);
                return Ok(());
            }
            _ => std::thread::sleep(establish_config.retry_timeout),
        }
    }

    Err(TransportError::ConnectionIssue(format!(
        "no response after {} tries ({:?} total)",
        establish_config.retry_count,
        establish_config.retry_count * establish_config.retry_timeout.as_millis() as u32,
    )))
}

/// A burst of `0x00` fillers across the peer's reported symmetric port
/// range, to prime its NAT's port mapping ahead of the real punch attempt.
fn symmetric_shotgun(socket: &UdpSocket, dest: &ConnInfo) {
    let (low, high) = dest.symmetric_range;
    for port in low..=high {
        let _ = socket.send_to(&[ControlByte::Heartbeat.as_byte()], (dest.public_ip, port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn conn_info(port: u16, order: Vec<Strategy>) -> ConnInfo {
        ConnInfo {
            private_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            private_port: port,
            public_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            public_port: port,
            punch_type: PunchType::Cone,
            symmetric_range: (0, 0),
            order,
        }
    }

    #[test]
    fn local_strategy_returns_verified_endpoint_on_both_sides() {
        let a_port = 33901;
        let b_port = 33902;
        let a = conn_info(a_port, vec![Strategy::Local]);
        let b = conn_info(b_port, vec![Strategy::Local]);

        let b_dest = ConnInfo { public_port: a_port, ..b.clone() };
        let handle = std::thread::spawn(move || {
            start_connection_with_probe(&b, &b_dest, EndpointConfig::default(), EstablishConfig::default(), false)
        });

        let a_dest = ConnInfo { public_port: b_port, ..a.clone() };
        let endpoint_a =
            start_connection_with_probe(&a, &a_dest, EndpointConfig::default(), EstablishConfig::default(), false)
                .unwrap();
        let endpoint_b = handle.join().unwrap().unwrap();

        assert!(endpoint_a.block_until_verified(Duration::from_secs(2)).is_ok());
        assert!(endpoint_b.block_until_verified(Duration::from_secs(2)).is_ok());

        endpoint_a.kill();
        endpoint_b.kill();
    }

    #[test]
    fn unimplemented_strategy_advances_to_next() {
        let a = conn_info(33903, vec![Strategy::Relay, Strategy::Local]);
        let b = conn_info(33904, vec![Strategy::Local]);

        let b_dest = ConnInfo { public_port: 33903, ..b.clone() };
        let handle = std::thread::spawn(move || {
            start_connection_with_probe(&b, &b_dest, EndpointConfig::default(), EstablishConfig::default(), false)
        });

        let a_dest = ConnInfo { public_port: 33904, ..a.clone() };
        let endpoint_a =
            start_connection_with_probe(&a, &a_dest, EndpointConfig::default(), EstablishConfig::default(), false)
                .unwrap();
        let endpoint_b = handle.join().unwrap().unwrap();

        endpoint_a.kill();
        endpoint_b.kill();
    }
}
