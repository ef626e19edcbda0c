//! NAT Detection Server and client-side probe (component design §4.5).
//!
//! Grounded on `antt/nat_traversal.py`'s `DetectionServer`/`ClientInfo` pair:
//! a root control port answers `discover`/`status`/`third` requests, two
//! echo ports (`A`, `B`) passively record the source-port behaviour of
//! probes sent by a client under test, and a "reverse-initiated" echo port
//! (`C`) sends one unsolicited packet back to test full-cone vs restricted
//! reachability. Unlike the Python source, the root protocol here is a small
//! `serde`-encoded request/response pair rather than overloading the §6
//! application [`crate::envelope::Envelope`] (which only has four slots —
//! not enough to carry a status reply's two source-port bounds and two
//! observed addresses).

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, TransportError};
use crate::flat_map::FlatMap;
use crate::ports::first_available_from;

/// The four ports a [`DetectionServer`] listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionPorts {
    pub root: u16,
    pub echo_a: u16,
    pub echo_b: u16,
    pub echo_c: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct EchoPorts {
    echo_a: u16,
    echo_b: u16,
    echo_c: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum DetectionRequest {
    Discover,
    Status { name: String },
    Third { name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum DetectionResponse {
    Echo(EchoPorts),
    Status(Option<PortRecord>),
}

/// Per-client-name bookkeeping: `(min_src_port, max_src_port, last_seen_on_A, last_seen_on_B)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub min_src_port: u16,
    pub max_src_port: u16,
    pub last_seen_a: Option<SocketAddr>,
    pub last_seen_b: Option<SocketAddr>,
}

impl PortRecord {
    fn observe(&mut self, on_a: bool, addr: SocketAddr) {
        self.min_src_port = self.min_src_port.min(addr.port());
        self.max_src_port = self.max_src_port.max(addr.port());
        if on_a {
            self.last_seen_a = Some(addr);
        } else {
            self.last_seen_b = Some(addr);
        }
    }
}

/// A running detection server: owns its four sockets and one scheduler
/// thread, mirroring the [`crate::endpoint::Endpoint`]/[`crate::stream::StreamEndpoint`]
/// kill contract.
pub struct DetectionServer {
    ports: DetectionPorts,
    alive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DetectionServer {
    /// Binds the root/echo-A/echo-B/echo-C ports starting from `root_port`,
    /// per `antt/nat_traversal.py`'s `DetectionServer.__init__` (`root`,
    /// `root+10`, `root+20`, `root+30`, each walked forward to the first free
    /// port — see [`crate::ports::first_available_from`]), and spawns the
    /// collector loop.
    pub fn bind(root_port: u16) -> Result<Self> {
        let root_port = first_available_from(root_port, root_port + 5000)?;
        let echo_a = first_available_from(root_port + 10, root_port + 5010)?;
        let echo_b = first_available_from(root_port + 20, root_port + 5020)?;
        let echo_c = first_available_from(root_port + 30, root_port + 5030)?;

        let root = UdpSocket::bind(("0.0.0.0", root_port))?;
        let sock_a = UdpSocket::bind(("0.0.0.0", echo_a))?;
        let sock_b = UdpSocket::bind(("0.0.0.0", echo_b))?;
        let sock_c = UdpSocket::bind(("0.0.0.0", echo_c))?;
        for s in [&root, &sock_a, &sock_b, &sock_c] {
            s.set_nonblocking(true)?;
        }

        let ports = DetectionPorts {
            root: root_port,
            echo_a,
            echo_b,
            echo_c,
        };
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let handle = std::thread::spawn(move || {
            run_server_loop(root, sock_a, sock_b, sock_c, ports, loop_alive);
        });

        Ok(Self {
            ports,
            alive,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn ports(&self) -> DetectionPorts {
        self.ports
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DetectionServer {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Release);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_server_loop(
    root: UdpSocket,
    sock_a: UdpSocket,
    sock_b: UdpSocket,
    sock_c: UdpSocket,
    ports: DetectionPorts,
    alive: Arc<AtomicBool>,
) {
    let mut records: FlatMap<Vec<u8>, PortRecord> = FlatMap::new();
    let mut buf = [0u8; 1024];

    while alive.load(Ordering::Acquire) {
        drain_echo(&sock_a, &mut buf, true, &mut records);
        drain_echo(&sock_b, &mut buf, false, &mut records);

        loop {
            match root.recv_from(&mut buf) {
                Ok((n, src)) => handle_root_request(&root, &sock_c, ports, &buf[..n], src, &records),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("detection root socket error: {e}");
                    break;
                }
            }
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}

fn drain_echo(sock: &UdpSocket, buf: &mut [u8], on_a: bool, records: &mut FlatMap<Vec<u8>, PortRecord>) {
    loop {
        match sock.recv_from(buf) {
            Ok((n, src)) => {
                let name = buf[..n].to_vec();
                let record = records.entry(name).or_insert_with(|| PortRecord {
                    min_src_port: u16::MAX,
                    max_src_port: 0,
                    last_seen_a: None,
                    last_seen_b: None,
                });
                record.observe(on_a, src);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("detection echo socket error: {e}");
                break;
            }
        }
    }
}

fn handle_root_request(
    root: &UdpSocket,
    sock_c: &UdpSocket,
    ports: DetectionPorts,
    datagram: &[u8],
    src: SocketAddr,
    records: &FlatMap<Vec<u8>, PortRecord>,
) {
    let request: DetectionRequest = match serde_json::from_slice(datagram) {
        Ok(r) => r,
        Err(e) => {
            warn!("dropped malformed detection request: {e}");
            return;
        }
    };
    match request {
        DetectionRequest::Discover => {
            let reply = DetectionResponse::Echo(EchoPorts {
                echo_a: ports.echo_a,
                echo_b: ports.echo_b,
                echo_c: ports.echo_c,
            });
            if let Ok(bytes) = serde_json::to_vec(&reply) {
                let _ = root.send_to(&bytes, src);
            }
        }
        DetectionRequest::Status { name } => {
            let record = records.get(name.as_bytes()).copied();
            if let Ok(bytes) = serde_json::to_vec(&DetectionResponse::Status(record)) {
                let _ = root.send_to(&bytes, src);
            }
        }
        DetectionRequest::Third { name: _ } => {
            let _ = sock_c.send_to(b"third-ack", src);
        }
    }
}

/// Classification produced by [`DetectionClient::detect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatType {
    Cone,
    Symmetric,
}

/// Outcome of a client-side detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionOutcome {
    pub nat_type: NatType,
    /// Whether an unsolicited packet from echo port C was received back,
    /// i.e. whether this NAT accepts return traffic from a new source.
    pub reachable: bool,
    /// This client's address as observed by the detection server.
    pub observed_addr: Option<SocketAddr>,
    pub symmetric_range: (u16, u16),
}

/// Client-side probe routine, grounded on `ClientInfo::detect_nat_type`.
pub struct DetectionClient;

impl DetectionClient {
    /// Runs the full discover → probe → status → third sequence against a
    /// [`DetectionServer`] at `root_addr`, identifying this run as `name`.
    pub fn detect(root_addr: SocketAddr, name: &str, probe_count: u16, timeout: Duration) -> Result<DetectionOutcome> {
        let base = UdpSocket::bind("0.0.0.0:0")?;
        base.set_read_timeout(Some(timeout))?;

        let echo = discover(&base, root_addr)?;
        let echo_a_addr = SocketAddr::new(root_addr.ip(), echo.echo_a);
        let echo_b_addr = SocketAddr::new(root_addr.ip(), echo.echo_b);

        // Several probes to A from distinct source ports, to widen the
        // observed min/max source-port range the way a symmetric NAT would.
        let mut probe_sockets = Vec::with_capacity(probe_count as usize);
        for _ in 0..probe_count {
            let s = UdpSocket::bind("0.0.0.0:0")?;
            s.send_to(name.as_bytes(), echo_a_addr)?;
            probe_sockets.push(s);
        }

        // One further source port probes both A and B: this is what lets the
        // server compare "same external port on A and B" (cone) against
        // "different external port" (symmetric).
        let further = UdpSocket::bind("0.0.0.0:0")?;
        further.send_to(name.as_bytes(), echo_a_addr)?;
        further.send_to(name.as_bytes(), echo_b_addr)?;

        std::thread::sleep(Duration::from_millis(50));

        let record = request_status(&base, root_addr, name)?
            .ok_or_else(|| TransportError::ConnectionIssue("detection server has no record for this name".into()))?;

        let nat_type = match (record.last_seen_a, record.last_seen_b) {
            (Some(a), Some(b)) if a.port() == b.port() => NatType::Cone,
            _ => NatType::Symmetric,
        };

        let reachable = request_third(&base, root_addr, name)?;

        Ok(DetectionOutcome {
            nat_type,
            reachable,
            observed_addr: record.last_seen_a.or(record.last_seen_b),
            symmetric_range: (record.min_src_port, record.max_src_port),
        })
    }
}

fn discover(base: &UdpSocket, root_addr: SocketAddr) -> Result<EchoPorts> {
    let req = serde_json::to_vec(&DetectionRequest::Discover)
        .map_err(|e| TransportError::InvalidData(e.to_string()))?;
    base.send_to(&req, root_addr)?;
    let mut buf = [0u8; 256];
    let (n, _) = base.recv_from(&mut buf)?;
    match serde_json::from_slice(&buf[..n]) {
        Ok(DetectionResponse::Echo(ports)) => Ok(ports),
        Ok(_) => Err(TransportError::InvalidData("expected Echo response to discover".into())),
        Err(e) => Err(TransportError::InvalidData(format!("malformed discover reply: {e}"))),
    }
}

fn request_status(base: &UdpSocket, root_addr: SocketAddr, name: &str) -> Result<Option<PortRecord>> {
    let req = serde_json::to_vec(&DetectionRequest::Status { name: name.to_string() })
        .map_err(|e| TransportError::InvalidData(e.to_string()))?;
    base.send_to(&req, root_addr)?;
    let mut buf = [0u8; 256];
    let (n, _) = base.recv_from(&mut buf)?;
    match serde_json::from_slice(&buf[..n]) {
        Ok(DetectionResponse::Status(record)) => Ok(record),
        Ok(_) => Err(TransportError::InvalidData("expected Status response".into())),
        Err(e) => Err(TransportError::InvalidData(format!("malformed status reply: {e}"))),
    }
}

fn request_third(base: &UdpSocket, root_addr: SocketAddr, name: &str) -> Result<bool> {
    let req = serde_json::to_vec(&DetectionRequest::Third { name: name.to_string() })
        .map_err(|e| TransportError::InvalidData(e.to_string()))?;
    base.send_to(&req, root_addr)?;
    let mut buf = [0u8; 64];
    match base.recv_from(&mut buf) {
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => Ok(false),
        Err(e) => Err(TransportError::SocketIssue(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn discover_reports_bound_echo_ports() {
        let server = DetectionServer::bind(35000).unwrap();
        let ports = server.ports();
        assert!(ports.echo_a > ports.root);
        assert!(ports.echo_b > ports.echo_a);
        server.kill();
    }

    #[test]
    fn cone_like_client_is_classified_cone() {
        let server = DetectionServer::bind(35100).unwrap();
        let root_addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), server.ports().root);

        // On loopback a single client source port always presents the same
        // way to both echo ports, which is exactly what a cone NAT looks like.
        let outcome = DetectionClient::detect(root_addr, "client-one", 3, Duration::from_secs(2)).unwrap();
        assert_eq!(outcome.nat_type, NatType::Cone);
        assert!(outcome.reachable);
        server.kill();
    }
}
