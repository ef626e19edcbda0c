use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use holepunch_transport::{Endpoint, EndpointConfig};

#[test]
fn sender_pauses_until_drain_ack_then_delivers_full_payload() {
    let mut config = EndpointConfig::default();
    config.peer_buffer_capacity = 64;

    let addr_a = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33556);
    let addr_b = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33776);

    let cfg_b = config;
    let b_thread = std::thread::spawn(move || Endpoint::connect(33776, addr_a, cfg_b));
    let endpoint_a = Endpoint::connect(33556, addr_b, config).unwrap();
    let endpoint_b = b_thread.join().unwrap().unwrap();

    let payload = vec![7u8; 1024];
    endpoint_a.submit(payload.clone()).unwrap();

    // The watermark is small enough that this 1 KB message cannot cross in
    // one send burst; it must still arrive complete once the drain-ack
    // handshake lets the rest of the frames through.
    let received = endpoint_b.pop(Duration::from_secs(5)).unwrap();
    assert_eq!(received, payload);

    endpoint_a.kill();
    endpoint_b.kill();
}
