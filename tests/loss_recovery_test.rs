use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use holepunch_transport::{ControlByte, Endpoint, EndpointConfig};

/// A relay pair standing between two endpoints' real sockets. Each endpoint
/// connects to one of `relay_a`/`relay_b`'s addresses instead of the other
/// endpoint's real address; the relay forwards datagrams between them,
/// preserving source identity (forwarding *from* the other relay socket so
/// the peer's connected-UDP filter still accepts it), and can drop every
/// `drop_every`th data frame crossing from A to B to emulate a lossy link.
fn spawn_lossy_relay(relay_a: SocketAddr, relay_b: SocketAddr, a_real: SocketAddr, b_real: SocketAddr, drop_every: usize) -> Arc<AtomicBool> {
    let sock_a = Arc::new(UdpSocket::bind(relay_a).unwrap());
    let sock_b = Arc::new(UdpSocket::bind(relay_b).unwrap());
    sock_a.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
    sock_b.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

    let alive = Arc::new(AtomicBool::new(true));
    let dropped_count = Arc::new(AtomicUsize::new(0));

    // A -> relay_a -> (forwarded from relay_b's socket, so it looks like it
    // came from relay_b) -> b_real, dropping every `drop_every`th data frame.
    {
        let sock_a = sock_a.clone();
        let sock_b = sock_b.clone();
        let alive = alive.clone();
        let dropped_count = dropped_count.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 65536];
            while alive.load(Ordering::Acquire) {
                match sock_a.recv_from(&mut buf) {
                    Ok((n, src)) if src == a_real && n >= 1 => {
                        let is_data = matches!(
                            ControlByte::from_byte(buf[0]),
                            Some(ControlByte::Data) | Some(ControlByte::DataAlt)
                        );
                        if is_data {
                            let seq = dropped_count.fetch_add(1, Ordering::AcqRel);
                            if seq % drop_every == drop_every - 1 {
                                continue;
                            }
                        }
                        let _ = sock_b.send_to(&buf[..n], b_real);
                    }
                    _ => {}
                }
            }
        });
    }

    // B -> relay_b -> (forwarded from relay_a's socket) -> a_real, lossless:
    // control traffic (acks, heartbeats, request-missing) must always get through.
    {
        let alive = alive.clone();
        std::thread::spawn(move || {
            let mut buf = [0u8; 65536];
            while alive.load(Ordering::Acquire) {
                match sock_b.recv_from(&mut buf) {
                    Ok((n, src)) if src == b_real && n >= 1 => {
                        let _ = sock_a.send_to(&buf[..n], a_real);
                    }
                    _ => {}
                }
            }
        });
    }

    alive
}

#[test]
fn hundred_kb_message_survives_dropped_frames() {
    let a_real: SocketAddr = "127.0.0.1:33650".parse().unwrap();
    let b_real: SocketAddr = "127.0.0.1:33651".parse().unwrap();
    let relay_a: SocketAddr = "127.0.0.1:33652".parse().unwrap();
    let relay_b: SocketAddr = "127.0.0.1:33653".parse().unwrap();

    let relay_alive = spawn_lossy_relay(relay_a, relay_b, a_real, b_real, 5);

    let mut config = EndpointConfig::default();
    config.retransmit_latency = Duration::from_millis(150);

    let cfg_b = config;
    let b_thread = std::thread::spawn(move || Endpoint::connect(b_real.port(), relay_b, cfg_b));
    let endpoint_a = Endpoint::connect(a_real.port(), relay_a, config).unwrap();
    let endpoint_b = b_thread.join().unwrap().unwrap();

    let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    endpoint_a.submit(payload.clone()).unwrap();

    let received = endpoint_b
        .pop(config.retransmit_latency * 5)
        .expect("message should be fully recovered within 5 retransmit intervals");
    assert_eq!(received, payload);

    endpoint_a.kill();
    endpoint_b.kill();
    relay_alive.store(false, Ordering::Release);
}
