//! DHCP server loop
//!
//! This module owns the UDP socket and turns datagrams into handler calls:
//! - Socket lifecycle (start, stop, fault reporting)
//! - The receive loop with its periodic read deadline
//! - Per-datagram dispatch to the registered [`Handler`]

use crate::{
    config::ServerConfig,
    error::{BoxError, LanternError},
    network,
    v4::Message,
};
use bytes::Bytes;
use std::{
    net::SocketAddr,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::{
    net::UdpSocket,
    sync::watch,
    task::{self, JoinHandle, JoinSet},
    time,
};

/// Decides how to answer one DHCP message.
///
/// All lease and address-assignment logic lives behind this trait. Returning
/// `Ok(None)` sends nothing back; an error is logged and also sends nothing.
/// Handlers run on Tokio's blocking pool, so they may block.
pub trait Handler: Send + Sync {
    fn handle(&self, request: Message) -> Result<Option<Message>, BoxError>;
}

impl<F> Handler for F
where
    F: Fn(Message) -> Result<Option<Message>, BoxError> + Send + Sync,
{
    fn handle(&self, request: Message) -> Result<Option<Message>, BoxError> {
        self(request)
    }
}

type HandlerSlot = Arc<RwLock<Option<Arc<dyn Handler>>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Listening,
    Stopped,
    /// The receive loop hit a socket error it could not recover from.
    Faulted,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Server {
    config: ServerConfig,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ServerState>>,
    local_addr: Option<SocketAddr>,
    running: Option<Running>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Created);
        Self {
            config,
            handler: Arc::new(RwLock::new(None)),
            state: Arc::new(state),
            local_addr: None,
            running: None,
        }
    }

    /// Binds the configured address and spawns the receive loop.
    ///
    /// Does nothing when already listening. On bind failure the state is left
    /// untouched. Must be called from within a Tokio runtime.
    pub async fn start(&mut self) -> Result<(), LanternError> {
        if self.listening() {
            return Ok(());
        }

        let socket = network::new_tokio_socket(
            self.config.bind_addr(),
            self.config.interface.as_deref(),
        )?;
        let local_addr = socket.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let receiver = ReceiveLoop {
            socket: Arc::new(socket),
            handler: Arc::clone(&self.handler),
            state: Arc::clone(&self.state),
            read_timeout: self.config.read_timeout,
            recv_buffer_size: self.config.recv_buffer_size,
        };

        // Set before spawning so a fault reported by the loop is never overwritten.
        self.state.send_replace(ServerState::Listening);
        let task = tokio::spawn(receiver.run(shutdown_rx));

        tracing::info!(addr = %local_addr, "DHCP server listening");
        self.local_addr = Some(local_addr);
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Signals the receive loop to stop and waits until the socket is closed.
    ///
    /// Does nothing unless listening. In-flight dispatches are cancelled, so no
    /// response is sent once this returns. Handler calls already running on the
    /// blocking pool are not awaited; their results are discarded.
    pub async fn stop(&mut self) -> Result<(), LanternError> {
        if !self.listening() {
            return Ok(());
        }
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        // The loop also exits if the receiver side sees the sender dropped.
        let _ = running.shutdown.send(true);
        let joined = running.task.await;

        self.state.send_replace(ServerState::Stopped);
        tracing::info!(addr = ?self.local_addr, "DHCP server stopped");
        joined.map_err(LanternError::from)
    }

    pub fn listening(&self) -> bool {
        self.state() == ServerState::Listening
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// Watches lifecycle transitions, including a loop fault.
    pub fn subscribe(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// The address the socket is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Replaces the message handler.
    ///
    /// Safe to call while the server is running; the new handler sees the
    /// next dispatched message. Calls already in flight keep the old handler.
    pub fn register_callback<H: Handler + 'static>(&self, handler: H) {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        let mut slot = self.handler.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(handler);
    }
}

struct ReceiveLoop {
    socket: Arc<UdpSocket>,
    handler: HandlerSlot,
    state: Arc<watch::Sender<ServerState>>,
    read_timeout: Duration,
    recv_buffer_size: usize,
}

impl ReceiveLoop {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; self.recv_buffer_size];
        let mut dispatches = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                // Fires on the stop signal or when the server is dropped.
                _ = shutdown.changed() => break,
                Some(_) = dispatches.join_next(), if !dispatches.is_empty() => {}
                result = time::timeout(self.read_timeout, self.socket.recv_from(&mut buf)) => {
                    match result {
                        // Read deadline: go round and look at the shutdown flag.
                        Err(_) => continue,
                        Ok(Ok((len, peer))) => {
                            if len == buf.len() {
                                tracing::warn!(
                                    peer = %peer,
                                    len,
                                    "Datagram fills the receive buffer and may be truncated"
                                );
                            } else {
                                tracing::debug!(peer = %peer, len, "Received datagram");
                            }
                            let data = Bytes::copy_from_slice(&buf[..len]);
                            self.spawn_dispatch(&mut dispatches, data, peer);
                        }
                        Ok(Err(e)) => {
                            tracing::error!(error = %e, "Socket receive failed, stopping receive loop");
                            self.state.send_replace(ServerState::Faulted);
                            break;
                        }
                    }
                }
            }
        }

        // Every dispatch holds a socket handle; cancel them so that dropping
        // `self` closes the socket.
        dispatches.shutdown().await;
        tracing::debug!("Receive loop finished");
    }

    fn spawn_dispatch(&self, dispatches: &mut JoinSet<()>, data: Bytes, peer: SocketAddr) {
        let socket = Arc::clone(&self.socket);
        let handler = Arc::clone(&self.handler);

        dispatches.spawn(async move {
            match dispatch(&socket, handler, data, peer).await {
                Ok(()) => {}
                Err(LanternError::Codec(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "Dropping malformed DHCP message");
                }
                Err(LanternError::Handler(e)) => {
                    tracing::warn!(peer = %peer, error = %e, "Handler failed, no response sent");
                }
                Err(e) => {
                    tracing::error!(peer = %peer, error = %e, "Failed to send DHCP response");
                }
            }
        });
    }
}

/// Decodes one datagram, runs the handler and sends back its response.
async fn dispatch(
    socket: &UdpSocket,
    handler: HandlerSlot,
    data: Bytes,
    peer: SocketAddr,
) -> Result<(), LanternError> {
    let request = Message::decode(&data)?;
    let xid = request.xid;
    tracing::debug!(
        peer = %peer,
        xid = format_args!("{xid:#010x}"),
        mac = %request.mac_string(),
        "Decoded DHCP message"
    );

    let response = task::spawn_blocking(move || invoke(&handler, request))
        .await
        .map_err(|e| LanternError::Handler(Box::new(e)))??;

    let Some(response) = response else {
        tracing::debug!(peer = %peer, xid = format_args!("{xid:#010x}"), "No response");
        return Ok(());
    };

    let payload = response.encode();
    socket.send_to(&payload, peer).await?;
    tracing::debug!(
        peer = %peer,
        xid = format_args!("{xid:#010x}"),
        len = payload.len(),
        "Sent response"
    );
    Ok(())
}

fn invoke(
    slot: &RwLock<Option<Arc<dyn Handler>>>,
    request: Message,
) -> Result<Option<Message>, LanternError> {
    let handler = slot
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    match handler {
        Some(handler) => handler.handle(request).map_err(LanternError::Handler),
        None => {
            tracing::debug!("No handler registered");
            Ok(None)
        }
    }
}
