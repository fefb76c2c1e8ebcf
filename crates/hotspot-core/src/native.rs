//! Host runtime on tokio
//!
//! Runs the responder on an ordinary TCP stack:
//! - Listening socket built with socket2 (SO_REUSEADDR, TCP_NODELAY, backlog from config)
//! - One I/O task per connection, driven by [`Command`]s from its [`TcpTransport`]
//! - One dispatcher task owning the [`Acceptor`] and the board, fed by [`Event`]s
//!
//! The dispatcher is the only place hooks run, so the board is never shared
//! between tasks and needs no lock.

use crate::config::ServerConfig;
use crate::device::{OutputPin, TemperatureSensor};
use crate::listener::Acceptor;
use crate::transport::{ConnectionId, Transport, TransportError};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use log::{debug, info, warn};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

/// Bytes requested from the socket per read
const READ_CHUNK: usize = 1024;

/// Open the listening socket on every local address.
///
/// Binds dual-stack where the host supports it, IPv4 only otherwise.
pub fn open(config: &ServerConfig) -> Result<TcpListener> {
    let socket = create_socket(config.port, config.backlog).map_err(|source| Error::Bind {
        port: config.port,
        source,
    })?;

    let listener = TcpListener::from_std(socket.into())?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

fn create_socket(port: u16, backlog: u32) -> std::io::Result<Socket> {
    let any_v6 = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    match bind_socket(Domain::IPV6, &any_v6, backlog) {
        Ok(socket) => Ok(socket),
        Err(e) => {
            debug!("Dual-stack bind failed ({e}), falling back to IPv4");
            bind_socket(Domain::IPV4, &SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), backlog)
        }
    }
}

fn bind_socket(domain: Domain, addr: &SocketAddr, backlog: u32) -> std::io::Result<Socket> {
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    if domain == Domain::IPV6 {
        socket.set_only_v6(false)?;
    }

    // SO_REUSEADDR - allow binding to address in TIME_WAIT
    socket.set_reuse_address(true)?;
    socket.set_nodelay(true)?;
    socket.bind(&(*addr).into())?;
    socket.listen(i32::try_from(backlog).unwrap_or(i32::MAX))?;
    socket.set_nonblocking(true)?;

    Ok(socket)
}

/// Request from a session to its connection's I/O task
#[derive(Debug)]
pub enum Command {
    Register(Duration),
    Unregister,
    Write(Bytes),
    Close,
    Abort,
}

/// Something the I/O task saw on the connection
#[derive(Debug)]
pub enum EventKind {
    /// Inbound bytes; `None` once the peer has closed
    Received(Option<Bytes>),
    Sent(usize),
    Poll,
    Error(TransportError),
}

#[derive(Debug)]
pub struct Event {
    pub id: ConnectionId,
    pub kind: EventKind,
}

/// [`Transport`] backed by a tokio [`TcpStream`] owned by an I/O task
#[derive(Debug)]
pub struct TcpTransport {
    peer: SocketAddr,
    commands: mpsc::UnboundedSender<Command>,
}

impl TcpTransport {
    fn send(&self, command: Command) -> std::result::Result<(), TransportError> {
        self.commands.send(command).map_err(|rejected| {
            debug!("I/O task for {} gone, dropped {:?}", self.peer, rejected.0);
            TransportError::Closed
        })
    }
}

impl Transport for TcpTransport {
    fn register(&mut self, poll_interval: Duration) {
        let _ = self.send(Command::Register(poll_interval));
    }

    fn unregister(&mut self) {
        let _ = self.send(Command::Unregister);
    }

    fn write(&mut self, data: &[u8]) -> std::result::Result<(), TransportError> {
        self.send(Command::Write(Bytes::copy_from_slice(data)))
    }

    fn recved(&mut self, _len: usize) {
        // Receive window is managed by the kernel
    }

    fn close(&mut self) -> std::result::Result<(), TransportError> {
        self.send(Command::Close)
    }

    fn abort(&mut self) {
        let _ = self.send(Command::Abort);
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }
}

/// Tracks live I/O tasks and the process-wide shutdown flag
#[derive(Debug)]
pub struct ConnectionTracker {
    /// Active connection count
    active: AtomicU64,
    shutdown: watch::Sender<bool>,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            active: AtomicU64::new(0),
            shutdown,
        }
    }

    #[inline]
    pub fn increment(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn decrement(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    /// Get current active connection count
    #[inline]
    pub fn count(&self) -> u64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Signal that shutdown is in progress
    pub fn start_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    #[inline]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once [`ConnectionTracker::start_shutdown`] has been called
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|down| *down).await;
    }
}

/// Run the dispatcher until shutdown.
///
/// A connection arriving while `max_sessions` sessions are live is refused:
/// it is accepted and closed at once instead of waiting in the backlog. On
/// shutdown every live session is closed and the acceptor is handed back.
pub async fn serve<S, O>(
    listener: TcpListener,
    mut acceptor: Acceptor<TcpTransport, S, O>,
    tracker: Arc<ConnectionTracker>,
) -> Acceptor<TcpTransport, S, O>
where
    S: TemperatureSensor,
    O: OutputPin,
{
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();

    loop {
        tokio::select! {
            biased;

            _ = tracker.wait_for_shutdown() => break,

            Some(event) = events_rx.recv() => dispatch(&mut acceptor, event),

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {e}");
                        continue;
                    }
                };

                let (commands_tx, commands_rx) = mpsc::unbounded_channel();
                let transport = TcpTransport {
                    peer,
                    commands: commands_tx,
                };
                let task = ConnectionTask::new(stream, commands_rx, events_tx.clone(), Arc::clone(&tracker));

                match acceptor.accept(transport) {
                    Ok(id) => task.spawn(id),
                    Err(e) => {
                        warn!("Connection from {peer} refused: {e}");
                        // Runs the close queued by the acceptor
                        task.spawn(ConnectionId(0));
                    }
                }
            }
        }
    }

    info!("Shutting down listener");
    acceptor.close_all();
    acceptor
}

fn dispatch<S, O>(acceptor: &mut Acceptor<TcpTransport, S, O>, event: Event)
where
    S: TemperatureSensor,
    O: OutputPin,
{
    let Event { id, kind } = event;
    let report = match kind {
        EventKind::Received(data) => acceptor.received(id, data.as_deref()),
        EventKind::Sent(len) => acceptor.sent(id, len),
        EventKind::Poll => acceptor.poll(id),
        EventKind::Error(err) => acceptor.error(id, err),
    };
    if let Some(report) = report {
        debug!("[{id}] Released with {}", report.signal);
    }
}

/// Owns one accepted stream and carries out its transport's commands
struct ConnectionTask {
    stream: TcpStream,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<Event>,
    tracker: Arc<ConnectionTracker>,
}

impl ConnectionTask {
    fn new(
        stream: TcpStream,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<Event>,
        tracker: Arc<ConnectionTracker>,
    ) -> Self {
        Self {
            stream,
            commands,
            events,
            tracker,
        }
    }

    fn spawn(self, id: ConnectionId) {
        self.tracker.increment();
        tokio::spawn(self.run(id));
    }

    async fn run(mut self, id: ConnectionId) {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut registered = false;
        let mut peer_open = true;
        let mut poll_interval = Duration::from_secs(5);
        let mut deadline = Instant::now() + poll_interval;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Register(interval)) => {
                        registered = true;
                        poll_interval = interval;
                        deadline = Instant::now() + poll_interval;
                    }
                    Some(Command::Unregister) => registered = false,
                    Some(Command::Write(data)) => {
                        let len = data.len();
                        if let Err(e) = self.stream.write_all(&data).await {
                            if registered {
                                self.emit(id, EventKind::Error(e.into()));
                            }
                            break;
                        }
                        deadline = Instant::now() + poll_interval;
                        if registered {
                            self.emit(id, EventKind::Sent(len));
                        }
                    }
                    Some(Command::Close) => {
                        if let Err(e) = self.stream.shutdown().await {
                            debug!("[{id}] Shutdown failed: {e}");
                        }
                        break;
                    }
                    Some(Command::Abort) | None => {
                        // Zero linger turns the drop into a reset
                        if let Err(e) = SockRef::from(&self.stream).set_linger(Some(Duration::ZERO)) {
                            debug!("[{id}] Failed to set linger: {e}");
                        }
                        break;
                    }
                },

                read = self.stream.read_buf(&mut buf), if registered && peer_open => match read {
                    Ok(0) => {
                        peer_open = false;
                        self.emit(id, EventKind::Received(None));
                    }
                    Ok(_) => {
                        deadline = Instant::now() + poll_interval;
                        let data = buf.split().freeze();
                        buf.reserve(READ_CHUNK);
                        self.emit(id, EventKind::Received(Some(data)));
                    }
                    Err(e) => {
                        self.emit(id, EventKind::Error(e.into()));
                        break;
                    }
                },

                _ = sleep_until(deadline), if registered => {
                    deadline = Instant::now() + poll_interval;
                    self.emit(id, EventKind::Poll);
                }
            }
        }

        self.tracker.decrement();
    }

    fn emit(&self, id: ConnectionId, kind: EventKind) {
        if self.events.send(Event { id, kind }).is_err() {
            debug!("[{id}] Dispatcher gone, event dropped");
        }
    }
}
