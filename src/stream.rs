use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::warn;

use crate::command::Command;
use crate::control::ControlByte;
use crate::error::{Result, TransportError};

/// Length prefix width (bytes) for the stream variant's message framing.
const LEN_WIDTH: usize = 5;
const DEFAULT_OUT_QUEUE_CAPACITY: usize = 256;

/// The stream-endpoint companion (component design §4.3): reliable
/// byte-message delivery over a `TcpStream`, sharing the heartbeat/framing
/// contract with the datagram endpoint but needing none of its
/// retransmit/flow-control machinery because the stream is already
/// reliable. Grounded on the same `SocketConnection`-shaped loop as
/// [`crate::endpoint::Endpoint`], adapted to a blocking stream instead of a
/// non-blocking datagram socket.
pub struct StreamEndpoint {
    cmd_tx: Sender<Command>,
    out_rx: Receiver<Vec<u8>>,
    alive: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

use parking_lot::Mutex;

impl StreamEndpoint {
    /// Connects to `target` as a client: send `0x01`, expect `0x02`.
    pub fn connect(target: SocketAddr, connect_timeout: Duration) -> Result<Self> {
        let stream = TcpStream::connect_timeout(&target, connect_timeout)?;
        stream.set_read_timeout(Some(connect_timeout))?;
        stream.set_nodelay(true)?;
        let mut s = stream.try_clone()?;
        s.write_all(&[ControlByte::AlivePing.as_byte()])?;
        let mut reply = [0u8; 1];
        s.read_exact(&mut reply)?;
        if ControlByte::from_byte(reply[0]) != Some(ControlByte::AliveAck) {
            return Err(TransportError::ConnectionIssue(
                "peer did not reply 0x02 to client handshake".into(),
            ));
        }
        Ok(Self::spawn(stream))
    }

    /// Accepts a single client connection on `listener`: expect `0x01`, reply `0x02`.
    pub fn accept(listener: &TcpListener) -> Result<Self> {
        let (mut stream, _peer) = listener.accept()?;
        stream.set_nodelay(true)?;
        let mut probe = [0u8; 1];
        stream.read_exact(&mut probe)?;
        if ControlByte::from_byte(probe[0]) != Some(ControlByte::AlivePing) {
            return Err(TransportError::ConnectionIssue(
                "peer did not send 0x01 to open the server handshake".into(),
            ));
        }
        stream.write_all(&[ControlByte::AliveAck.as_byte()])?;
        Ok(Self::spawn(stream))
    }

    fn spawn(stream: TcpStream) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let (out_tx, out_rx) = bounded(DEFAULT_OUT_QUEUE_CAPACITY);
        let alive = Arc::new(AtomicBool::new(true));
        let loop_alive = alive.clone();

        let handle = std::thread::spawn(move || {
            run_stream_loop(stream, cmd_rx, out_tx, loop_alive);
        });

        Self {
            cmd_tx,
            out_rx,
            alive,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn submit(&self, payload: Vec<u8>) -> Result<()> {
        self.cmd_tx
            .send(Command::Submit(payload))
            .map_err(|_| TransportError::ConnectionIssue("endpoint loop has exited".into()))
    }

    pub fn pop(&self, timeout: Duration) -> Result<Vec<u8>> {
        match self.out_rx.recv_timeout(timeout) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout { waited: timeout }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(TransportError::ConnectionIssue("endpoint loop has exited".into()))
            }
        }
    }

    pub fn kill(&self) {
        let _ = self.cmd_tx.send(Command::Kill);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

impl Drop for StreamEndpoint {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Kill);
        if let Some(handle) = self.handle.lock().take() {
            let _ = handle.join();
        }
    }
}

fn run_stream_loop(mut stream: TcpStream, cmd_rx: Receiver<Command>, out_tx: Sender<Vec<u8>>, alive: Arc<AtomicBool>) {
    if let Err(e) = stream.set_read_timeout(Some(Duration::from_millis(50))) {
        warn!("failed to set stream read timeout: {e}");
    }

    'outer: loop {
        // Drain any complete framed messages currently available without blocking long.
        loop {
            let mut tag = [0u8; 1];
            match stream.read_exact(&mut tag) {
                Ok(()) => match ControlByte::from_byte(tag[0]) {
                    Some(ControlByte::Heartbeat) => continue,
                    Some(ControlByte::Data) => {
                        let mut len_buf = [0u8; LEN_WIDTH];
                        if stream.read_exact(&mut len_buf).is_err() {
                            break;
                        }
                        let len = len_buf.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64) as usize;
                        let mut payload = vec![0u8; len];
                        if stream.read_exact(&mut payload).is_err() {
                            break;
                        }
                        if out_tx.try_send(payload).is_err() {
                            warn!("stream endpoint outbound queue full, dropping message");
                        }
                    }
                    _ => warn!("dropped unexpected stream tag byte {:#04x}", tag[0]),
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    break
                }
                Err(_) => break 'outer,
            }
        }

        let mut should_exit = false;
        while let Ok(command) = cmd_rx.try_recv() {
            match command {
                Command::Submit(payload) => {
                    let mut framed = Vec::with_capacity(1 + LEN_WIDTH + payload.len());
                    framed.push(ControlByte::Data.as_byte());
                    let len = payload.len() as u64;
                    for shift in (0..LEN_WIDTH).rev() {
                        framed.push(((len >> (shift * 8)) & 0xff) as u8);
                    }
                    framed.extend_from_slice(&payload);
                    if stream.write_all(&framed).is_err() {
                        should_exit = true;
                    }
                }
                Command::Kill => should_exit = true,
            }
        }

        if should_exit {
            break;
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    alive.store(false, Ordering::Release);
}
