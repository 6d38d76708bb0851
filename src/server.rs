//! Single-threaded readiness loop.
//!
//! One listener and every accepted connection are registered with a single
//! `mio::Poll`. Readiness is edge-triggered, so the listener is drained on
//! each notification and every connection event performs its I/O right away.

use ahash::AHashMap as HashMap;
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::connection::{Connection, Outcome, ScrapeHandler, DEFAULT_READ_BUFFER_BYTES};

const LISTENER: Token = Token(0);

pub const DEFAULT_BACKLOG: i32 = 10;
pub const DEFAULT_MAX_EVENTS: usize = 10;

/// Setup and wait failures. All of them end the loop.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to create listening socket: {0}")]
    Socket(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to listen: {0}")]
    Listen(#[source] io::Error),

    #[error("failed to create poll instance: {0}")]
    Poll(#[source] io::Error),

    #[error("failed to register listener: {0}")]
    Register(#[source] io::Error),

    #[error("poll wait failed: {0}")]
    Wait(#[source] io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub bind: IpAddr,
    pub port: u16,
    pub backlog: i32,
    pub max_events: usize,
    pub read_buffer_bytes: usize,
}

impl ServerOptions {
    pub fn new(bind: IpAddr, port: u16) -> Self {
        Self {
            bind,
            port,
            backlog: DEFAULT_BACKLOG,
            max_events: DEFAULT_MAX_EVENTS,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }
}

/// Counters kept by the loop, logged at debug.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub accepted: u64,
    pub closed: u64,
    pub scrapes: u64,
}

pub struct Server<T> {
    poll: Poll,
    listener: TcpListener,
    connections: HashMap<Token, Connection<TcpStream>>,
    next_token: usize,
    handler: T,
    options: ServerOptions,
    stats: ServerStats,
}

/// Opens the listening socket: address and port reuse, bind, listen, then
/// non-blocking mode.
fn listen(options: &ServerOptions) -> Result<std::net::TcpListener, ServerError> {
    let addr = options.addr();
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(ServerError::Socket)?;

    socket.set_reuse_address(true).map_err(ServerError::Socket)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true).map_err(ServerError::Socket)?;

    socket
        .bind(&addr.into())
        .map_err(|source| ServerError::Bind { addr, source })?;
    socket.listen(options.backlog).map_err(ServerError::Listen)?;
    socket.set_nonblocking(true).map_err(ServerError::Socket)?;

    Ok(socket.into())
}

impl<T: ScrapeHandler> Server<T> {
    pub fn bind(options: ServerOptions, handler: T) -> Result<Self, ServerError> {
        let mut listener = TcpListener::from_std(listen(&options)?);
        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Register)?;

        Ok(Self {
            poll,
            listener,
            connections: HashMap::new(),
            next_token: LISTENER.0 + 1,
            handler,
            options,
            stats: ServerStats::default(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Runs the loop until a poll failure.
    pub fn run(&mut self) -> Result<(), ServerError> {
        match self.local_addr() {
            Ok(addr) => info!("Listening on {}", addr),
            Err(e) => warn!("Listening, local address unavailable: {}", e),
        }

        let mut events = Events::with_capacity(self.options.max_events);
        loop {
            self.turn(&mut events, None)?;
        }
    }

    /// Waits once for readiness and dispatches every delivered event.
    pub fn turn(&mut self, events: &mut Events, timeout: Option<Duration>) -> Result<(), ServerError> {
        match self.poll.poll(events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                trace!("Poll interrupted, retrying");
                return Ok(());
            }
            Err(e) => return Err(ServerError::Wait(e)),
        }

        for event in events.iter() {
            match event.token() {
                LISTENER => self.accept(),
                token => self.dispatch(token, event),
            }
        }
        Ok(())
    }

    fn accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;

                    if let Err(e) = self
                        .poll
                        .registry()
                        .register(&mut stream, token, Interest::READABLE)
                    {
                        warn!("Failed to register connection from {}: {}", peer, e);
                        continue;
                    }

                    self.stats.accepted += 1;
                    debug!("Accepted connection from {} as {:?}", peer, token);
                    self.connections.insert(
                        token,
                        Connection::new(stream, Some(peer), self.options.read_buffer_bytes),
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::ConnectionAborted
                    ) =>
                {
                    continue
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    break;
                }
            }
        }
    }

    fn dispatch(&mut self, token: Token, event: &Event) {
        let Some(conn) = self.connections.get_mut(&token) else {
            trace!("Event for unknown token {:?}", token);
            return;
        };

        let mut outcome = if conn.has_pending() {
            Outcome::PendingWrite
        } else {
            Outcome::Open
        };

        if event.is_writable() && conn.has_pending() {
            outcome = conn.on_writable();
        }
        if event.is_read_closed() {
            conn.mark_read_closed();
        }
        if outcome != Outcome::Close && (event.is_readable() || event.is_read_closed()) {
            let before = conn.responses();
            outcome = conn.on_readable(&self.handler);
            self.stats.scrapes += conn.responses() - before;
        }
        if outcome != Outcome::Close && event.is_error() {
            warn!("Socket error on {:?}", conn.peer());
            outcome = Outcome::Close;
        }

        match outcome {
            Outcome::Close => self.close(token),
            Outcome::PendingWrite if !conn.write_interest => {
                conn.write_interest = true;
                self.reregister(token, Interest::READABLE | Interest::WRITABLE);
            }
            Outcome::Open if conn.write_interest => {
                conn.write_interest = false;
                self.reregister(token, Interest::READABLE);
            }
            _ => {}
        }
    }

    fn reregister(&mut self, token: Token, interest: Interest) {
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        if let Err(e) = self
            .poll
            .registry()
            .reregister(conn.stream_mut(), token, interest)
        {
            warn!("Failed to update interest for {:?}: {}", conn.peer(), e);
            self.close(token);
        }
    }

    fn close(&mut self, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            if let Err(e) = self.poll.registry().deregister(conn.stream_mut()) {
                debug!("Deregister of {:?} failed: {}", conn.peer(), e);
            }
            self.stats.closed += 1;
            debug!(
                "Closed connection {:?} ({} open)",
                conn.peer(),
                self.connections.len()
            );
        }
    }
}
