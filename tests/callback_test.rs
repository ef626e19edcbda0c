use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use holepunch_transport::{Endpoint, EndpointConfig};

#[test]
fn on_message_callback_receives_delivered_message_without_pop() {
    let addr_a = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33557);
    let addr_b = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 33777);

    let b_thread = std::thread::spawn(move || Endpoint::connect(33777, addr_a, EndpointConfig::default()));
    let endpoint_a = Endpoint::connect(33557, addr_b, EndpointConfig::default()).unwrap();
    let endpoint_b = b_thread.join().unwrap().unwrap();

    let received: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
    let invoked = Arc::new(AtomicBool::new(false));
    let received_clone = received.clone();
    let invoked_clone = invoked.clone();
    endpoint_b.on_message(move |bytes| {
        *received_clone.lock().unwrap() = Some(bytes);
        invoked_clone.store(true, Ordering::Release);
    });

    endpoint_a.submit(b"callback path".to_vec()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(3);
    while !invoked.load(Ordering::Acquire) && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(invoked.load(Ordering::Acquire), "callback was never invoked");
    assert_eq!(received.lock().unwrap().as_deref(), Some(&b"callback path"[..]));

    // With a handler registered, the message was not also placed on the pop queue.
    assert!(endpoint_b.pop(Duration::from_millis(100)).is_err());

    endpoint_a.kill();
    endpoint_b.kill();
}
