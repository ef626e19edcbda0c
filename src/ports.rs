//! Port discovery helper (component design §6): "first port ≥ P not in use
//! by any process on this host".
//!
//! The Python source answers this with `psutil.net_connections()`, scanning
//! every socket on the host. That needs a third-party system-introspection
//! dependency and elevated privileges on some platforms for no benefit this
//! crate needs: the only thing that actually matters is whether *this*
//! process can bind the candidate port, so a bind-probe loop answers the
//! same question portably and without extra privileges.

use std::net::UdpSocket;

use crate::error::{Result, TransportError};

/// Returns the first port `>= start` (and `<= limit`) this process can bind
/// a UDP socket to, without holding the bind open.
pub fn first_available_from(start: u16, limit: u16) -> Result<u16> {
    for port in start..=limit {
        if UdpSocket::bind(("0.0.0.0", port)).is_ok() {
            return Ok(port);
        }
    }
    Err(TransportError::ConnectionIssue(format!(
        "no available port found in {start}..={limit}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_a_bindable_port() {
        let port = first_available_from(20000, 40000).unwrap();
        assert!(port >= 20000);
        // The port must actually be free: bind it ourselves to confirm.
        assert!(UdpSocket::bind(("0.0.0.0", port)).is_ok());
    }
}
