use std::net::TcpListener;
use std::time::Duration;

use holepunch_transport::StreamEndpoint;

#[test]
fn stream_endpoints_verify_and_exchange_a_message() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let server_thread = std::thread::spawn(move || StreamEndpoint::accept(&listener).unwrap());
    let client = StreamEndpoint::connect(addr, Duration::from_secs(2)).unwrap();
    let server = server_thread.join().unwrap();

    assert!(client.is_alive());
    assert!(server.is_alive());

    client.submit(b"test text".to_vec()).unwrap();
    let received = server.pop(Duration::from_secs(2)).unwrap();
    assert_eq!(received, b"test text");

    client.kill();
    server.kill();
}
