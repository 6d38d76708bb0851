//! Connection handler.
//!
//! Any inbound bytes trigger one full collect→serialize→respond cycle; the
//! bytes themselves are never parsed. A zero-length read is the peer closing.
//! A peer that half-closes together with its request gets its response and
//! is then closed, since no further readiness edge will arrive for it.
//! Connections stay open between cycles so a scraper may poll over one socket.

use std::io::{self, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, trace, warn};

use crate::collector::StatsCollector;
use crate::exposition::render_envelope;
use crate::hypervisor::Hypervisor;

/// Default size of the per-connection read buffer.
pub const DEFAULT_READ_BUFFER_BYTES: usize = 4096;

/// Produces the full response for one scrape.
pub trait ScrapeHandler {
    fn respond(&self) -> Vec<u8>;
}

impl<H: Hypervisor> ScrapeHandler for StatsCollector<H> {
    fn respond(&self) -> Vec<u8> {
        render_envelope(&self.run_cycle().body)
    }
}

/// What the event loop should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Wait for the next readable event.
    Open,
    /// A response is partially written; wait for writability.
    PendingWrite,
    /// Deregister and drop the connection.
    Close,
}

/// State of one accepted connection.
pub struct Connection<S> {
    stream: S,
    peer: Option<SocketAddr>,
    read_buf: Vec<u8>,
    outbound: Vec<u8>,
    written: usize,
    responses: u64,
    read_closed: bool,
    pub(crate) write_interest: bool,
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S, peer: Option<SocketAddr>, read_buffer_bytes: usize) -> Self {
        Self {
            stream,
            peer,
            read_buf: vec![0; read_buffer_bytes.max(1)],
            outbound: Vec::new(),
            written: 0,
            responses: 0,
            read_closed: false,
            write_interest: false,
        }
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Number of scrape cycles run for this connection.
    pub fn responses(&self) -> u64 {
        self.responses
    }

    /// Records that the peer shut down its sending side.
    pub fn mark_read_closed(&mut self) {
        self.read_closed = true;
    }

    /// Whether part of the last response is still unsent.
    pub fn has_pending(&self) -> bool {
        self.written < self.outbound.len()
    }

    /// Handles a readable event with exactly one read.
    pub fn on_readable(&mut self, handler: &impl ScrapeHandler) -> Outcome {
        let n = loop {
            match self.stream.read(&mut self.read_buf) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!("Spurious readable event for {:?}", self.peer);
                    return self.settle(self.idle_outcome());
                }
                Err(e) => {
                    warn!("Read from {:?} failed: {}", self.peer, e);
                    return Outcome::Close;
                }
            }
        };

        if n == 0 {
            debug!("Connection {:?} closed by peer", self.peer);
            return Outcome::Close;
        }

        if self.has_pending() {
            debug!(
                "Ignoring {} bytes from {:?} while a response is pending",
                n, self.peer
            );
            return Outcome::PendingWrite;
        }

        trace!("Read {} bytes from {:?}, starting scrape", n, self.peer);
        self.outbound = handler.respond();
        self.written = 0;
        self.responses += 1;
        let outcome = self.flush();
        self.settle(outcome)
    }

    /// Handles a writable event by continuing the pending response.
    pub fn on_writable(&mut self) -> Outcome {
        let outcome = self.flush();
        self.settle(outcome)
    }

    /// Closes a half-closed connection once nothing is left to send.
    fn settle(&mut self, outcome: Outcome) -> Outcome {
        if outcome != Outcome::Open || !self.read_closed {
            return outcome;
        }
        self.discard_input();
        debug!("Connection {:?} half-closed by peer, response sent", self.peer);
        Outcome::Close
    }

    /// Reads and drops whatever the peer sent after its request.
    fn discard_input(&mut self) {
        loop {
            match self.stream.read(&mut self.read_buf) {
                Ok(0) => break,
                Ok(n) => trace!("Discarding {} bytes from {:?}", n, self.peer),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    }

    fn idle_outcome(&self) -> Outcome {
        if self.has_pending() {
            Outcome::PendingWrite
        } else {
            Outcome::Open
        }
    }

    fn flush(&mut self) -> Outcome {
        while self.has_pending() {
            match self.stream.write(&self.outbound[self.written..]) {
                Ok(0) => {
                    warn!("Connection {:?} stopped accepting data", self.peer);
                    return Outcome::Close;
                }
                Ok(n) => self.written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    trace!(
                        "Socket buffer full for {:?}, {} bytes pending",
                        self.peer,
                        self.outbound.len() - self.written
                    );
                    return Outcome::PendingWrite;
                }
                Err(e) => {
                    warn!("Write to {:?} failed: {}", self.peer, e);
                    return Outcome::Close;
                }
            }
        }

        self.outbound.clear();
        self.written = 0;
        Outcome::Open
    }
}
