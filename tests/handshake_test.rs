use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use holepunch_transport::{Endpoint, EndpointConfig};

#[test]
fn loopback_handshake_verifies_within_two_seconds() {
    let addr_a = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33553);
    let addr_b = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33773);

    let b_thread = std::thread::spawn(move || Endpoint::connect(33773, addr_a, EndpointConfig::default()));
    let endpoint_a = Endpoint::connect(33553, addr_b, EndpointConfig::default()).unwrap();
    let endpoint_b = b_thread.join().unwrap().unwrap();

    endpoint_a.block_until_verified(Duration::from_secs(2)).unwrap();
    endpoint_b.block_until_verified(Duration::from_secs(2)).unwrap();
    assert!(endpoint_a.is_alive());
    assert!(endpoint_b.is_alive());

    endpoint_a.kill();
    endpoint_b.kill();
}

#[test]
fn small_message_echo_arrives_within_three_seconds() {
    let addr_a = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33554);
    let addr_b = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33774);

    let b_thread = std::thread::spawn(move || Endpoint::connect(33774, addr_a, EndpointConfig::default()));
    let endpoint_a = Endpoint::connect(33554, addr_b, EndpointConfig::default()).unwrap();
    let endpoint_b = b_thread.join().unwrap().unwrap();

    endpoint_a.submit(b"Hello".to_vec()).unwrap();
    let received = endpoint_b.pop(Duration::from_secs(3)).unwrap();
    assert_eq!(received, b"Hello");

    endpoint_a.kill();
    endpoint_b.kill();
}
