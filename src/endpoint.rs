use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::command::Command;
use crate::config::EndpointConfig;
use crate::control::ControlByte;
use crate::error::{Result, TransportError};
use crate::flat_map::FlatMap;
use crate::frame::{chunk, Frame, MessageId, PartIndex};
use crate::id_alloc::IdAllocator;
use crate::reassembly::{IncomingMessage, OutgoingMessage};

/// Snapshot of one message's reassembly/send progress, published once per
/// scheduler tick so `Endpoint::get_message_status` never reaches into the
/// loop thread's owned tables directly (see `EndpointConfig`'s component
/// design note on table ownership).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageProgress {
    pub total_parts: u32,
    pub known_parts: u32,
    pub done: bool,
}

/// The reliable datagram endpoint (component design §4.2).
///
/// Owns a single cooperative scheduler-loop thread. Grounded on
/// `antt/data_structures.py`'s `SocketConnection(threading.Thread)`: its
/// `run()` loop of `store_incoming` → `distribute_stored` → pop finished →
/// drain commands → heartbeat → `sleep(.1)` is this module's `run_loop`,
/// with the "kill"/`eval` command channel replaced by the closed
/// [`Command`] enum and the leading-byte dispatch replaced by
/// [`ControlByte`].
/// A user-supplied handler invoked synchronously from the loop thread for
/// every delivered message, per §4.2's `on_message = callback` surface.
pub type MessageCallback = Box<dyn Fn(Vec<u8>) + Send + 'static>;

pub struct Endpoint {
    config: EndpointConfig,
    cmd_tx: Sender<Command>,
    out_rx: Receiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
    outgoing_count: Arc<AtomicUsize>,
    progress: Arc<Mutex<Vec<(u32, MessageProgress)>>>,
    on_message: Arc<Mutex<Option<MessageCallback>>>,
    mtu: Arc<AtomicUsize>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Endpoint {
    /// Binds `src_port`, runs the verification handshake against `target`,
    /// then spawns the scheduler loop. Grounded on
    /// `antt/data_structures.py`'s `_setup_socket`.
    pub fn connect(src_port: u16, target: SocketAddr, config: EndpointConfig) -> Result<Self> {
        config.validate()?;
        let socket = UdpSocket::bind(("0.0.0.0", src_port))?;
        socket.connect(target)?;
        apply_recv_buffer_size(&socket, config.socket_recv_buffer_bytes);
        verify_handshake(&socket, &config)?;
        socket.set_nonblocking(true)?;
        Ok(Self::spawn(socket, target, config))
    }

    /// Wraps an already-verified socket (e.g. one handed over by
    /// [`crate::establish`] after a successful punch) into a running
    /// endpoint, skipping the handshake.
    pub fn from_verified_socket(socket: UdpSocket, target: SocketAddr, config: EndpointConfig) -> Result<Self> {
        config.validate()?;
        socket.connect(target)?;
        apply_recv_buffer_size(&socket, config.socket_recv_buffer_bytes);
        socket.set_nonblocking(true)?;
        Ok(Self::spawn(socket, target, config))
    }

    fn spawn(socket: UdpSocket, target: SocketAddr, config: EndpointConfig) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let (out_tx, out_rx) = bounded(config.out_queue_capacity);
        let alive = Arc::new(AtomicBool::new(true));
        let outgoing_count = Arc::new(AtomicUsize::new(0));
        let progress = Arc::new(Mutex::new(Vec::new()));
        let on_message = Arc::new(Mutex::new(None));
        let mtu = Arc::new(AtomicUsize::new(config.mtu));

        let loop_alive = alive.clone();
        let loop_count = outgoing_count.clone();
        let loop_progress = progress.clone();
        let loop_on_message = on_message.clone();
        let loop_mtu = mtu.clone();
        let loop_config = config;

        let handle = std::thread::spawn(move || {
            run_loop(
                socket,
                target,
                loop_config,
                cmd_rx,
                out_tx,
                loop_alive,
                loop_count,
                loop_progress,
                loop_on_message,
                loop_mtu,
            );
        });

        Self {
            config,
            cmd_tx,
            out_rx,
            alive,
            outgoing_count,
            progress,
            on_message,
            mtu,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Registers `f` as this endpoint's message handler. Once set, delivered
    /// messages are handed to `f` synchronously from the loop thread instead
    /// of being pushed to the `pop` queue — matching §4.2's "when set, pop is
    /// performed internally and the callback is invoked synchronously from
    /// the loop thread".
    pub fn on_message(&self, f: impl Fn(Vec<u8>) + Send + 'static) {
        *self.on_message.lock() = Some(Box::new(f));
    }

    /// Removes a previously registered message handler, reverting to
    /// queue-based delivery via `pop`.
    pub fn clear_on_message(&self) {
        *self.on_message.lock() = None;
    }

    /// Enqueues `payload` for reliable delivery. Non-blocking.
    pub fn submit(&self, payload: Vec<u8>) -> Result<()> {
        if self.outgoing_count.load(Ordering::Acquire) >= self.config.max_concurrent_outgoing {
            return Err(TransportError::QueueFull);
        }
        self.cmd_tx
            .send(Command::Submit(payload))
            .map_err(|_| TransportError::ConnectionIssue("endpoint loop has exited".into()))
    }

    /// Blocks until one fully reassembled message is available, or `timeout` elapses.
    pub fn pop(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self.out_rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout { waited: timeout }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::ConnectionIssue("endpoint loop has exited".into()))
            }
        }
    }

    /// Requests orderly shutdown and waits for the loop thread to exit.
    pub fn kill(&self) {
        let _ = self.cmd_tx.send(Command::Kill);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Blocks until the endpoint is verified and alive, or `timeout` elapses.
    /// Construction only succeeds post-verification, so this returns almost
    /// immediately; it exists to mirror the blocking-helper surface.
    pub fn block_until_verified(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_alive() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout { waited: timeout });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Returns `(known_parts, total_parts, done)` for an in-progress or
    /// recently completed message, from the most recent per-tick snapshot.
    pub fn get_message_status(&self, id: MessageId) -> Option<MessageProgress> {
        self.progress
            .lock()
            .iter()
            .find(|(k, _)| *k == id.0)
            .map(|(_, p)| *p)
    }

    /// Blocks until the loop thread has exited (after `kill` or a fatal
    /// error), or `timeout` elapses. A polled deadline at ~10 ms granularity,
    /// matching the other blocking helpers (§5 "Cancellation and timeouts").
    pub fn block_until_shutdown(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_alive() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout { waited: timeout });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Blocks until at least one reassembled message is waiting to be
    /// popped, or `timeout` elapses. Unlike `pop`, this does not consume the
    /// message — it only reports that one is ready, e.g. for a UI that wants
    /// to switch to a non-blocking drain loop once something has arrived.
    pub fn block_until_message(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.out_rx.is_empty() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout { waited: timeout });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Changes the MTU this endpoint chunks outgoing messages and sizes
    /// `0x07` request-missing frames against, taking effect from the next
    /// scheduler tick onward. Rejects a value too small to hold the
    /// configured header (§3 "header length is fixed per endpoint
    /// configuration" — only the payload split varies at runtime).
    pub fn set_buffer_size(&self, mtu: usize) -> Result<()> {
        let candidate = EndpointConfig { mtu, ..self.config };
        candidate.validate()?;
        self.mtu.store(mtu, Ordering::Release);
        Ok(())
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Kill);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn apply_recv_buffer_size(socket: &UdpSocket, bytes: usize) {
    let sock2 = socket2::SockRef::from(socket);
    if let Err(e) = sock2.set_recv_buffer_size(bytes) {
        warn!("failed to set socket receive buffer size: {e}");
    }
}

/// The bounded bidirectional handshake described in the component design's
/// "Verification (initial handshake)" subsection.
fn verify_handshake(socket: &UdpSocket, config: &EndpointConfig) -> Result<()> {
    socket.set_read_timeout(Some(config.connect_try_timeout))?;
    let start = Instant::now();
    let mut tries = 0u32;
    let mut buf = [0u8; 16];

    loop {
        if tries >= config.connect_try_limit {
            return Err(TransportError::ConnectionNoResponse {
                tries,
                elapsed: start.elapsed(),
            });
        }

        socket.send(&[ControlByte::Syn.as_byte()])?;

        match socket.recv(&mut buf) {
            Ok(n) if n >= 1 => match ControlByte::from_byte(buf[0]) {
                Some(ControlByte::Ack) => return Ok(()),
                Some(ControlByte::Syn) => {
                    socket.send(&[ControlByte::Ack.as_byte()])?;
                    return Ok(());
                }
                _ => tries += 1,
            },
            Ok(_) => tries += 1,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock
                        | std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                tries += 1;
            }
            Err(e) => return Err(TransportError::SocketIssue(e)),
        }
    }
}

struct RequestMissingCodec;

impl RequestMissingCodec {
    /// Packs `missing` part indices into one or more `0x07` frames, each
    /// sized to fit within one datagram of `config.mtu`.
    fn encode(id: MessageId, missing: &[u32], config: &EndpointConfig) -> Vec<Vec<u8>> {
        let per_frame_header = 1 + config.id_width;
        let per_index = config.part_width;
        let max_per_frame = (config.mtu.saturating_sub(per_frame_header) / per_index).max(1);

        missing
            .chunks(max_per_frame)
            .map(|group| {
                let mut out = Vec::with_capacity(per_frame_header + group.len() * per_index);
                out.push(ControlByte::RequestMissing.as_byte());
                push_be(&mut out, id.0 as u64, config.id_width);
                for &idx in group {
                    push_be(&mut out, idx as u64, per_index);
                }
                out
            })
            .collect()
    }

    fn decode(bytes: &[u8], config: &EndpointConfig) -> Option<(MessageId, Vec<u32>)> {
        let header = 1 + config.id_width;
        if bytes.len() < header {
            return None;
        }
        let id = be_get(&bytes[1..1 + config.id_width]) as u32;
        let rest = &bytes[header..];
        let mut parts = Vec::new();
        for group in rest.chunks(config.part_width) {
            if group.len() < config.part_width {
                break;
            }
            parts.push(be_get(group) as u32);
        }
        Some((MessageId(id), parts))
    }
}

fn push_be(out: &mut Vec<u8>, value: u64, width: usize) {
    for shift in (0..width).rev() {
        out.push(((value >> (shift * 8)) & 0xff) as u8);
    }
}

fn be_get(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn encode_id_only(control: ControlByte, id: MessageId, config: &EndpointConfig) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + config.id_width);
    out.push(control.as_byte());
    push_be(&mut out, id.0 as u64, config.id_width);
    out
}

struct OutboundItem {
    bytes: Vec<u8>,
    counts_against_buffer: bool,
}

#[allow(clippy::too_many_arguments)]
fn run_loop(
    socket: UdpSocket,
    target: SocketAddr,
    base_config: EndpointConfig,
    cmd_rx: Receiver<Command>,
    out_tx: Sender<Vec<u8>>,
    alive: Arc<AtomicBool>,
    outgoing_count: Arc<AtomicUsize>,
    progress: Arc<Mutex<Vec<(u32, MessageProgress)>>>,
    on_message: Arc<Mutex<Option<MessageCallback>>>,
    mtu: Arc<AtomicUsize>,
) {
    let mut outgoing: FlatMap<u32, OutgoingMessage> = FlatMap::new();
    let mut incoming: FlatMap<u32, IncomingMessage> = FlatMap::new();
    let mut id_alloc = IdAllocator::new(base_config.max_message_id() as u32);
    let mut outbound: std::collections::VecDeque<OutboundItem> = std::collections::VecDeque::new();
    let mut peer_buffer_estimated_fill: usize = 0;
    let mut awaiting_drain = false;
    let mut last_send_time = Instant::now();
    let mut recv_buf = vec![0u8; 65536];

    'outer: loop {
        // `set_buffer_size` takes effect from here: every tick rebuilds the
        // working config from the live MTU, so in-flight sizing (chunking,
        // request-missing packing) always reflects the latest call.
        let config = EndpointConfig {
            mtu: mtu.load(Ordering::Acquire),
            ..base_config
        };

        // 1. Receive drain + 2. Dispatch.
        let mut received_non_heartbeat = false;
        loop {
            match socket.recv(&mut recv_buf) {
                Ok(n) if n >= 1 => {
                    let datagram = &recv_buf[..n];
                    let control = ControlByte::from_byte(datagram[0]);
                    match control {
                        Some(ControlByte::Heartbeat) => {}
                        Some(ControlByte::AlivePing) => {
                            outbound.push_back(OutboundItem {
                                bytes: vec![ControlByte::AliveAck.as_byte()],
                                counts_against_buffer: false,
                            });
                            received_non_heartbeat = true;
                        }
                        Some(ControlByte::AliveAck) | Some(ControlByte::Ack) => {
                            peer_buffer_estimated_fill = 0;
                            awaiting_drain = false;
                            received_non_heartbeat = true;
                        }
                        Some(ControlByte::Syn) => {
                            outbound.push_back(OutboundItem {
                                bytes: vec![ControlByte::Ack.as_byte()],
                                counts_against_buffer: false,
                            });
                            received_non_heartbeat = true;
                        }
                        Some(ControlByte::Data) | Some(ControlByte::DataAlt) => {
                            received_non_heartbeat = true;
                            if let Ok(frame) = Frame::decode(datagram, &config) {
                                let id = frame.message_id;
                                if handle_data_frame(&mut incoming, frame) {
                                    outbound.push_back(OutboundItem {
                                        bytes: encode_id_only(ControlByte::ReceiverAck, id, &config),
                                        counts_against_buffer: false,
                                    });
                                }
                            } else {
                                warn!("dropped malformed data frame");
                            }
                        }
                        Some(ControlByte::RequestMissing) => {
                            received_non_heartbeat = true;
                            if let Some((id, parts)) = RequestMissingCodec::decode(datagram, &config) {
                                if let Some(msg) = outgoing.get(&id.0) {
                                    for idx in parts {
                                        if let Some(frame) = msg.frame_for(PartIndex(idx)) {
                                            if let Ok(bytes) = frame.encode(&config) {
                                                outbound.push_back(OutboundItem {
                                                    bytes,
                                                    counts_against_buffer: true,
                                                });
                                            }
                                        }
                                    }
                                }
                            }
                        }
                        Some(ControlByte::SenderDone) => {
                            received_non_heartbeat = true;
                            if datagram.len() >= 1 + config.id_width {
                                let id = be_get(&datagram[1..1 + config.id_width]) as u32;
                                if let Some(msg) = incoming.get_mut(&id) {
                                    let missing = msg.missing_parts();
                                    if !missing.is_empty() {
                                        for frame_bytes in
                                            RequestMissingCodec::encode(MessageId(id), &missing, &config)
                                        {
                                            outbound.push_back(OutboundItem {
                                                bytes: frame_bytes,
                                                counts_against_buffer: false,
                                            });
                                        }
                                    }
                                }
                            }
                        }
                        Some(ControlByte::ReceiverAck) => {
                            received_non_heartbeat = true;
                            if datagram.len() >= 1 + config.id_width {
                                let id = be_get(&datagram[1..1 + config.id_width]) as u32;
                                if outgoing.remove(&id).is_some() {
                                    outgoing_count.fetch_sub(1, Ordering::AcqRel);
                                }
                            }
                        }
                        None => {
                            warn!("dropped datagram with unknown control byte {:#04x}", datagram[0]);
                        }
                    }
                }
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => break,
                Err(e) => {
                    warn!("socket receive error: {e}");
                    break;
                }
            }
        }
        if received_non_heartbeat {
            outbound.push_front(OutboundItem {
                bytes: vec![ControlByte::Heartbeat.as_byte()],
                counts_against_buffer: false,
            });
        }

        // 3. Retransmit sweep.
        let now = Instant::now();
        let mut expired_requests = Vec::new();
        for (id, msg) in incoming.iter_mut() {
            if !msg.is_tombstone()
                && !msg.is_complete()
                && now.duration_since(msg.last_update) >= config.retransmit_latency
            {
                let missing = msg.missing_parts();
                if !missing.is_empty() {
                    expired_requests.push((MessageId(*id), missing));
                }
                msg.last_update = now;
            }
        }
        for (id, missing) in expired_requests {
            for frame_bytes in RequestMissingCodec::encode(id, &missing, &config) {
                outbound.push_back(OutboundItem {
                    bytes: frame_bytes,
                    counts_against_buffer: false,
                });
            }
        }

        // Tombstones only need to survive long enough to absorb a
        // duplicate post-delivery arrival; evict ones older than
        // `tombstone_ttl` so a long-lived endpoint doesn't accumulate one
        // entry per message ever received.
        incoming.retain(|_, msg| !(msg.is_tombstone() && now.duration_since(msg.last_update) >= config.tombstone_ttl));

        // 4. Send loop with flow control.
        while let Some(item) = outbound.front() {
            if item.counts_against_buffer {
                let len = item.bytes.len();
                // A single frame larger than the whole watermark must still
                // be allowed through once the buffer is empty, or it would
                // never make progress; the gate only holds back a frame that
                // would add to an already-nonzero estimated fill.
                if peer_buffer_estimated_fill > 0 && peer_buffer_estimated_fill + len >= config.peer_buffer_capacity {
                    if !awaiting_drain {
                        let _ = socket.send(&[ControlByte::AlivePing.as_byte()]);
                        awaiting_drain = true;
                        last_send_time = now;
                    }
                    break;
                }
                let item = outbound.pop_front().unwrap();
                if socket.send(&item.bytes).is_ok() {
                    peer_buffer_estimated_fill += len;
                    last_send_time = now;
                }
            } else {
                let item = outbound.pop_front().unwrap();
                if socket.send(&item.bytes).is_ok() {
                    last_send_time = now;
                }
            }
        }

        // 5. Completed-message delivery. When a handler is registered, it is
        // invoked synchronously here instead of pushing to the pop queue.
        for (id, msg) in incoming.iter_mut() {
            if msg.is_complete() && !msg.is_tombstone() {
                if let Some(assembled) = msg.take_and_tombstone() {
                    let handler = on_message.lock();
                    match handler.as_ref() {
                        Some(f) => f(assembled),
                        None => {
                            drop(handler);
                            if out_tx.try_send(assembled).is_err() {
                                // Caller isn't draining pop() fast enough; drop
                                // this tick's delivery attempt, the tombstone
                                // state still suppresses duplicate re-assembly.
                                warn!("outbound message queue full, dropping delivered message {id}");
                            }
                        }
                    }
                }
            }
        }

        // 6. Command intake.
        let mut should_exit = false;
        while let Ok(command) = cmd_rx.try_recv() {
            match command {
                Command::Submit(payload) => {
                    if outgoing.len() >= config.max_concurrent_outgoing {
                        warn!("dropping submit: outgoing table at max_concurrent_outgoing");
                        continue;
                    }
                    let ids_in_use: HashSet<u32> = outgoing.keys().copied().collect();
                    match id_alloc.allocate(&ids_in_use) {
                        Ok(id) => match chunk(id, &payload, ControlByte::Data, &config) {
                            Ok(frames) => {
                                for frame in &frames {
                                    if let Ok(bytes) = frame.encode(&config) {
                                        outbound.push_back(OutboundItem {
                                            bytes,
                                            counts_against_buffer: true,
                                        });
                                    }
                                }
                                outbound.push_back(OutboundItem {
                                    bytes: encode_id_only(ControlByte::SenderDone, id, &config),
                                    counts_against_buffer: false,
                                });
                                outgoing.insert(id, OutgoingMessage::new(id, frames, now));
                                outgoing_count.fetch_add(1, Ordering::AcqRel);
                            }
                            Err(e) => warn!("failed to chunk outgoing message: {e}"),
                        },
                        Err(e) => warn!("failed to allocate message id: {e}"),
                    }
                }
                Command::Kill => should_exit = true,
            }
        }

        // 7. Heartbeat.
        if now.duration_since(last_send_time) >= config.max_idle_before_heartbeat {
            let _ = socket.send(&[ControlByte::Heartbeat.as_byte()]);
            last_send_time = now;
        }

        // Publish progress snapshot.
        {
            let mut snapshot = Vec::with_capacity(incoming.len() + outgoing.len());
            for (id, msg) in incoming.iter() {
                snapshot.push((
                    *id,
                    MessageProgress {
                        total_parts: msg.total_parts,
                        known_parts: msg.total_parts - msg.missing_parts().len() as u32,
                        done: msg.is_complete(),
                    },
                ));
            }
            for (id, msg) in outgoing.iter() {
                snapshot.push((
                    *id,
                    MessageProgress {
                        total_parts: msg.total_parts,
                        known_parts: msg.total_parts,
                        // An outgoing entry is removed outright on `0x09`
                        // (see the ReceiverAck arm below), not tombstoned in
                        // place, so anything still in `outgoing` is by
                        // construction not yet acknowledged.
                        done: false,
                    },
                ));
            }
            *progress.lock() = snapshot;
        }

        if should_exit {
            break 'outer;
        }

        debug!(target = %target, "tick complete, sleeping");
        std::thread::sleep(config.idle_sleep);
    }

    alive.store(false, Ordering::Release);
}

/// Stores `frame` in the reassembly table, returning `true` exactly when
/// this frame completes the message (so the caller can enqueue a `0x09`
/// receiver-done acknowledgement immediately, per the component design's
/// receive-path reassembly rule rather than waiting for the next delivery
/// step to notice).
fn handle_data_frame(incoming: &mut FlatMap<u32, IncomingMessage>, frame: Frame) -> bool {
    let now = Instant::now();
    let id = frame.message_id.0;
    let total = frame.total_parts.0;
    let entry = incoming.entry(id);
    let msg = match entry {
        crate::flat_map::Entry::Occupied(e) => e.into_mut(),
        crate::flat_map::Entry::Vacant(e) => match IncomingMessage::new(frame.message_id, total, now) {
            Ok(m) => e.insert(m),
            Err(err) => {
                warn!("rejecting frame for message {id}: {err}");
                return false;
            }
        },
    };
    match msg.add_frame(&frame, now) {
        Ok(newly_complete) => newly_complete,
        Err(e) => {
            warn!("rejecting frame for message {id}: {e}");
            false
        }
    }
}
