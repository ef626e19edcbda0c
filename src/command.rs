/// Application-facing commands fed into an endpoint's inbound queue.
///
/// Grounded on `antt/data_structures.py`'s `SocketConnection.run`, whose
/// command drain accepts the literal string `"kill"` or otherwise calls
/// `eval(val)` on whatever else arrives — flagged in that source as
/// "PROBABLY A MASSIVE SECURITY RISK". That path has no counterpart here:
/// this is a closed two-variant enum, not a string or reflective channel,
/// so there is no way to smuggle arbitrary code through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Reliably deliver this payload to the peer.
    Submit(Vec<u8>),
    /// Shut the endpoint down after the current tick.
    Kill,
}
