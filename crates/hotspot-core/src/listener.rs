//! Connection acceptor
//!
//! Owns the board and every live [`Session`], and routes transport events to
//! them by [`ConnectionId`]. A session is removed from the table for the
//! duration of a hook and put back only if the hook left it open, so an event
//! for a closed connection finds nothing to act on.

use crate::config::ServerConfig;
use crate::connection::{CloseCause, CloseReport, Session, Step};
use crate::device::{Board, OutputPin, TemperatureSensor};
use crate::transport::{ConnectionId, Transport, TransportError};
use crate::{Error, Result};
use log::{debug, info, warn};
use std::collections::HashMap;

/// Running counters kept by the acceptor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptorStats {
    pub accepted: u64,
    /// Turned away at admission
    pub rejected: u64,
    /// Closed after the whole response was acknowledged
    pub completed: u64,
    /// Ended any other way
    pub dropped: u64,
}

/// Accepts connections and dispatches their events
pub struct Acceptor<T, S, O> {
    config: ServerConfig,
    board: Board<S, O>,
    sessions: HashMap<ConnectionId, Session<T>>,
    next_id: u32,
    stats: AcceptorStats,
}

impl<T, S, O> Acceptor<T, S, O>
where
    T: Transport,
    S: TemperatureSensor,
    O: OutputPin,
{
    pub fn new(config: ServerConfig, board: Board<S, O>) -> Self {
        Self {
            sessions: HashMap::with_capacity(config.max_sessions),
            config,
            board,
            next_id: 0,
            stats: AcceptorStats::default(),
        }
    }

    pub fn board(&self) -> &Board<S, O> {
        &self.board
    }

    pub fn stats(&self) -> AcceptorStats {
        self.stats
    }

    /// Number of live sessions
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Whether another session would be admitted
    pub fn has_capacity(&self) -> bool {
        self.sessions.len() < self.config.max_sessions
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Start a session on a new connection.
    ///
    /// When the session table is full the raw transport is closed (aborted if
    /// that fails) and `SessionLimit` is returned; the acceptor keeps going.
    pub fn accept(&mut self, mut transport: T) -> Result<ConnectionId> {
        if !self.has_capacity() {
            self.stats.rejected += 1;
            warn!(
                "Rejecting connection from {:?}: {} session(s) in use",
                transport.peer_addr(),
                self.sessions.len()
            );
            if let Err(err) = transport.close() {
                debug!("Close of rejected connection failed ({err}), aborting");
                transport.abort();
            }
            return Err(Error::SessionLimit {
                limit: self.config.max_sessions,
            });
        }

        self.next_id = self.next_id.wrapping_add(1);
        let id = ConnectionId(self.next_id);
        let session = Session::accept(id, transport, Some(self.config.gateway), self.config.poll_interval);
        self.sessions.insert(id, session);
        self.stats.accepted += 1;
        Ok(id)
    }

    /// Data arrived, or the peer closed when `data` is `None`
    pub fn received(&mut self, id: ConnectionId, data: Option<&[u8]>) -> Option<CloseReport> {
        let board = &mut self.board;
        Self::dispatch(&mut self.sessions, &mut self.stats, id, "received", |session| {
            session.on_received(data, board)
        })
    }

    /// `len` bytes were acknowledged by the peer
    pub fn sent(&mut self, id: ConnectionId, len: usize) -> Option<CloseReport> {
        Self::dispatch(&mut self.sessions, &mut self.stats, id, "sent", |session| {
            session.on_sent(len)
        })
    }

    /// Idle poll fired
    pub fn poll(&mut self, id: ConnectionId) -> Option<CloseReport> {
        Self::dispatch(&mut self.sessions, &mut self.stats, id, "poll", |session| {
            Step::Closed(session.on_poll())
        })
    }

    /// Transport discarded the connection
    pub fn error(&mut self, id: ConnectionId, err: TransportError) -> Option<CloseReport> {
        Self::dispatch(&mut self.sessions, &mut self.stats, id, "error", |session| {
            Step::Closed(session.on_error(err))
        })
    }

    /// Close every live session; part of listener shutdown
    pub fn close_all(&mut self) -> Vec<CloseReport> {
        if !self.sessions.is_empty() {
            info!("Closing {} open session(s)", self.sessions.len());
        }
        let mut reports: Vec<CloseReport> = self
            .sessions
            .drain()
            .map(|(_, session)| session.close(CloseCause::Shutdown))
            .collect();
        reports.sort_by_key(|report| report.id);
        for report in &reports {
            record(&mut self.stats, report);
        }
        reports
    }

    fn dispatch<F>(
        sessions: &mut HashMap<ConnectionId, Session<T>>,
        stats: &mut AcceptorStats,
        id: ConnectionId,
        event: &str,
        hook: F,
    ) -> Option<CloseReport>
    where
        F: FnOnce(Session<T>) -> Step<Session<T>>,
    {
        let Some(session) = sessions.remove(&id) else {
            debug!("[{id}] Dropping {event} event for released session");
            return None;
        };

        match hook(session) {
            Step::Open(session) => {
                sessions.insert(id, session);
                None
            }
            Step::Closed(report) => {
                record(stats, &report);
                Some(report)
            }
        }
    }
}

fn record(stats: &mut AcceptorStats, report: &CloseReport) {
    if report.cause == CloseCause::Completed {
        stats.completed += 1;
    } else {
        stats.dropped += 1;
    }
    debug!("[{}] Session released", report.id);
}
