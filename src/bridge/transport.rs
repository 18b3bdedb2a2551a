//! Interactive peer transport
//!
//! The polling loop talks to the peer through [`PeerTransport`]: it drains
//! connect, disconnect, and data events, and hands back controller output
//! for the peer. [`ChannelTransport`] is the TCP implementation; a tokio
//! task owns the sockets and exchanges bytes with the loop over unbounded
//! channels. Only one peer is served; a new connection replaces the old
//! one.

use gcodelink_core::TransportError;
use std::collections::VecDeque;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const READ_BUFFER: usize = 1024;

/// Event from the peer side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// A peer attached
    Connected {
        /// Peer address or label
        peer: String,
    },
    /// The peer went away
    Disconnected,
    /// Bytes from the peer
    Data(Vec<u8>),
}

/// Non-blocking peer channel used by the polling loop
pub trait PeerTransport {
    /// Next pending event, if any
    fn poll_event(&mut self) -> Option<PeerEvent>;

    /// Send bytes to the current peer; dropped when nobody is connected
    fn broadcast(&mut self, bytes: &[u8]);

    /// Whether a peer is attached
    fn is_connected(&self) -> bool;
}

/// TCP transport backed by a tokio listener task
pub struct ChannelTransport {
    events: mpsc::UnboundedReceiver<PeerEvent>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    local_addr: SocketAddr,
    connected: bool,
}

impl ChannelTransport {
    /// Bind `addr` and spawn the listener task on the current runtime
    pub async fn bind(addr: &str) -> Result<(Self, JoinHandle<()>), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::Bind {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        let (event_tx, events) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        tracing::info!("Listening for peers on {}", local_addr);
        let task = tokio::spawn(serve(listener, event_tx, outbound_rx));

        Ok((
            Self {
                events,
                outbound,
                local_addr,
                connected: false,
            },
            task,
        ))
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl PeerTransport for ChannelTransport {
    fn poll_event(&mut self) -> Option<PeerEvent> {
        let event = self.events.try_recv().ok()?;
        match &event {
            PeerEvent::Connected { .. } => self.connected = true,
            PeerEvent::Disconnected => self.connected = false,
            PeerEvent::Data(_) => {}
        }
        Some(event)
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        if self.connected && !bytes.is_empty() {
            let _ = self.outbound.send(bytes.to_vec());
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

struct Peer {
    generation: u64,
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

async fn serve(
    listener: TcpListener,
    events: mpsc::UnboundedSender<PeerEvent>,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    let (read_tx, mut read_rx) = mpsc::unbounded_channel::<(u64, Option<Vec<u8>>)>();
    let mut current: Option<Peer> = None;
    let mut generation = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);

                if let Some(old) = current.take() {
                    tracing::info!("Peer replaced by {}", addr);
                    old.reader.abort();
                    if events.send(PeerEvent::Disconnected).is_err() {
                        break;
                    }
                }

                generation += 1;
                let (mut reader, writer) = stream.into_split();
                let tx = read_tx.clone();
                let this_generation = generation;
                let reader = tokio::spawn(async move {
                    let mut buf = [0u8; READ_BUFFER];
                    loop {
                        match reader.read(&mut buf).await {
                            Ok(0) | Err(_) => {
                                let _ = tx.send((this_generation, None));
                                break;
                            }
                            Ok(n) => {
                                if tx.send((this_generation, Some(buf[..n].to_vec()))).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });

                current = Some(Peer { generation, writer, reader });
                tracing::info!("Peer connected: {}", addr);
                if events.send(PeerEvent::Connected { peer: addr.to_string() }).is_err() {
                    break;
                }
            }

            Some((from, data)) = read_rx.recv() => {
                if current.as_ref().map(|p| p.generation) != Some(from) {
                    continue;
                }
                let event = match data {
                    Some(bytes) => PeerEvent::Data(bytes),
                    None => {
                        current = None;
                        tracing::info!("Peer disconnected");
                        PeerEvent::Disconnected
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }

            bytes = outbound.recv() => {
                let Some(bytes) = bytes else {
                    break;
                };
                let Some(peer) = current.as_mut() else {
                    continue;
                };
                if let Err(e) = peer.writer.write_all(&bytes).await {
                    tracing::warn!("Peer write failed: {}", e);
                    if let Some(old) = current.take() {
                        old.reader.abort();
                    }
                    if events.send(PeerEvent::Disconnected).is_err() {
                        break;
                    }
                }
            }
        }
    }

    if let Some(old) = current.take() {
        old.reader.abort();
    }
    tracing::debug!("Peer listener stopped");
}

/// In-memory transport with scripted peer events
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    inbound: VecDeque<PeerEvent>,
    sent: Vec<u8>,
    connected: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a peer event for the next polls
    pub fn push(&mut self, event: PeerEvent) {
        self.inbound.push_back(event);
    }

    /// Queue bytes from the peer
    pub fn push_data(&mut self, bytes: impl AsRef<[u8]>) {
        self.push(PeerEvent::Data(bytes.as_ref().to_vec()));
    }

    /// Drain everything broadcast to the peer
    pub fn take_sent(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }
}

impl PeerTransport for ScriptedTransport {
    fn poll_event(&mut self) -> Option<PeerEvent> {
        let event = self.inbound.pop_front()?;
        match &event {
            PeerEvent::Connected { .. } => self.connected = true,
            PeerEvent::Disconnected => self.connected = false,
            PeerEvent::Data(_) => {}
        }
        Some(event)
    }

    fn broadcast(&mut self, bytes: &[u8]) {
        if self.connected {
            self.sent.extend_from_slice(bytes);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
