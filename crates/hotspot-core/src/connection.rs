//! Per-connection state machine
//!
//! One [`Session`] exists per accepted connection. Each hook takes the session
//! by value and hands it back only while the connection is still open:
//!
//! ```text
//! ACCEPTED -> RECEIVING -> PARSED -> RESPONDING  -> SENT -> CLOSED
//!                                \-> REDIRECTING -/
//! ```
//!
//! Any phase can drop straight to CLOSED on a failure, an idle poll or a
//! transport error. Closing consumes the session, so a connection is closed
//! at most once and a released session cannot be reached by a later hook.

use crate::buffer::FixedBuffer;
use crate::content;
use crate::device::{Board, OutputPin, TemperatureSensor};
use crate::parser::{self, Malformed};
use crate::response;
use crate::transport::{CloseSignal, ConnectionId, Registration, Transport, TransportError};
use log::{debug, info, warn};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Header buffer size; also the scratch space for the raw request
pub const HEADER_CAPACITY: usize = 128;

/// Body buffer size
pub const BODY_CAPACITY: usize = 768;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accepted,
    Receiving,
    Parsed,
    Responding,
    Redirecting,
    Sent,
    Closed,
}

impl Phase {
    /// Whether the machine may move from `self` to `next`
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Accepted, Receiving)
            | (Receiving, Parsed)
            | (Parsed, Responding)
            | (Parsed, Redirecting)
            | (Responding, Sent)
            | (Redirecting, Sent) => true,
            _ => false,
        }
    }

    /// Response written and waiting for acknowledgment
    pub fn is_sending(self) -> bool {
        matches!(self, Phase::Responding | Phase::Redirecting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Accepted => "ACCEPTED",
            Phase::Receiving => "RECEIVING",
            Phase::Parsed => "PARSED",
            Phase::Responding => "RESPONDING",
            Phase::Redirecting => "REDIRECTING",
            Phase::Sent => "SENT",
            Phase::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCause {
    /// Whole response acknowledged
    Completed,
    /// Peer closed its side
    PeerClosed,
    Malformed(Malformed),
    /// Header or body did not fit its buffer
    Oversized,
    WriteFailed(TransportError),
    IdleTimeout,
    /// Transport discarded the connection
    TransportError(TransportError),
    /// Listener shutting down
    Shutdown,
}

impl CloseCause {
    /// Signal reported for an orderly close with this cause
    pub fn signal(self) -> CloseSignal {
        match self {
            CloseCause::Completed
            | CloseCause::PeerClosed
            | CloseCause::IdleTimeout
            | CloseCause::Shutdown => CloseSignal::Ok,
            CloseCause::Malformed(_) => CloseSignal::Argument,
            CloseCause::Oversized => CloseSignal::Closed,
            CloseCause::WriteFailed(err) => CloseSignal::Transport(err),
            CloseCause::TransportError(TransportError::Aborted) => CloseSignal::Aborted,
            CloseCause::TransportError(err) => CloseSignal::Transport(err),
        }
    }
}

impl fmt::Display for CloseCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseCause::Completed => f.write_str("response delivered"),
            CloseCause::PeerClosed => f.write_str("closed by client"),
            CloseCause::Malformed(reason) => write!(f, "malformed request: {reason}"),
            CloseCause::Oversized => f.write_str("response too large"),
            CloseCause::WriteFailed(err) => write!(f, "write failed: {err}"),
            CloseCause::IdleTimeout => f.write_str("idle timeout"),
            CloseCause::TransportError(err) => write!(f, "transport error: {err}"),
            CloseCause::Shutdown => f.write_str("server shutdown"),
        }
    }
}

/// What is left of a session after it ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReport {
    pub id: ConnectionId,
    pub cause: CloseCause,
    pub signal: CloseSignal,
    /// Phase the session was in when it ended
    pub phase: Phase,
    pub bytes_acknowledged: usize,
    /// Header plus body length, zero if no response was built
    pub response_length: usize,
}

/// Result of running a hook
#[derive(Debug)]
pub enum Step<T> {
    Open(T),
    Closed(CloseReport),
}

fn advance(phase: &mut Phase, id: ConnectionId, next: Phase) {
    debug_assert!(phase.can_advance_to(next), "{phase} -> {next}");
    debug!("[{id}] {phase} -> {next}");
    *phase = next;
}

/// Bookkeeping for one accepted connection
pub struct Session<T, const H: usize = HEADER_CAPACITY, const B: usize = BODY_CAPACITY> {
    id: ConnectionId,
    transport: T,
    registration: Registration,
    phase: Phase,
    /// Raw request first, then outgoing headers
    header: FixedBuffer<H>,
    body: FixedBuffer<B>,
    header_length: usize,
    body_length: usize,
    bytes_acknowledged: usize,
    gateway: Option<Ipv4Addr>,
}

impl<T: Transport, const H: usize, const B: usize> Session<T, H, B> {
    /// Start a session on a freshly accepted transport and install its hooks
    pub fn accept(
        id: ConnectionId,
        mut transport: T,
        gateway: Option<Ipv4Addr>,
        poll_interval: Duration,
    ) -> Self {
        let registration = Registration::register(&mut transport, id, poll_interval);
        match transport.peer_addr() {
            Some(peer) => info!("[{id}] Client connected: {peer}"),
            None => info!("[{id}] Client connected"),
        }

        Self {
            id,
            transport,
            registration,
            phase: Phase::Accepted,
            header: FixedBuffer::new(),
            body: FixedBuffer::new(),
            header_length: 0,
            body_length: 0,
            bytes_acknowledged: 0,
            gateway,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn body_length(&self) -> usize {
        self.body_length
    }

    /// Bytes the session waits to see acknowledged
    pub fn response_length(&self) -> usize {
        self.header_length + self.body_length
    }

    pub fn bytes_acknowledged(&self) -> usize {
        self.bytes_acknowledged
    }

    /// Data-received hook. `None` means the peer closed its side.
    ///
    /// Only the first non-empty delivery is treated as the request; later
    /// ones are acknowledged and dropped.
    pub fn on_received<S, O>(mut self, data: Option<&[u8]>, board: &mut Board<S, O>) -> Step<Self>
    where
        S: TemperatureSensor,
        O: OutputPin,
    {
        let Some(data) = data else {
            info!("[{}] Connection closed by client", self.id);
            return Step::Closed(self.close(CloseCause::PeerClosed));
        };
        if data.is_empty() {
            return Step::Open(self);
        }

        debug!("[{}] Received {} bytes", self.id, data.len());
        self.transport.recved(data.len());

        if self.phase != Phase::Accepted {
            debug!("[{}] Ignoring {} bytes in {} phase", self.id, data.len(), self.phase);
            return Step::Open(self);
        }

        match self.respond(data, board) {
            Ok(()) => Step::Open(self),
            Err(cause) => Step::Closed(self.close(cause)),
        }
    }

    /// Send-acknowledged hook
    pub fn on_sent(mut self, len: usize) -> Step<Self> {
        self.bytes_acknowledged += len;
        debug!(
            "[{}] Sent {} bytes ({}/{})",
            self.id,
            len,
            self.bytes_acknowledged,
            self.response_length()
        );

        if self.phase.is_sending() && self.bytes_acknowledged >= self.response_length() {
            info!("[{}] All data sent", self.id);
            advance(&mut self.phase, self.id, Phase::Sent);
            return Step::Closed(self.close(CloseCause::Completed));
        }
        Step::Open(self)
    }

    /// Idle-poll hook; always ends the connection
    pub fn on_poll(self) -> CloseReport {
        info!("[{}] Poll fired in {} phase, closing", self.id, self.phase);
        self.close(CloseCause::IdleTimeout)
    }

    /// Transport-error hook.
    ///
    /// The transport has already discarded the connection, so it is neither
    /// unregistered nor closed again; only the session is released.
    pub fn on_error(self, err: TransportError) -> CloseReport {
        let response_length = self.response_length();
        let Session {
            id,
            transport,
            registration,
            phase,
            bytes_acknowledged,
            ..
        } = self;

        if err == TransportError::Aborted {
            debug!("[{id}] Transport aborted the connection");
        } else {
            warn!("[{id}] Transport error: {err}");
        }
        registration.forfeit();
        drop(transport);
        info!("[{id}] Session released after transport error");

        let cause = CloseCause::TransportError(err);
        CloseReport {
            id,
            cause,
            signal: cause.signal(),
            phase,
            bytes_acknowledged,
            response_length,
        }
    }

    /// Close procedure.
    ///
    /// Hooks are unregistered before the transport is asked to close. A
    /// failed close is turned into an abort, reported as `Aborted`. The
    /// session is released when this returns.
    pub fn close(self, cause: CloseCause) -> CloseReport {
        let response_length = self.response_length();
        let Session {
            id,
            mut transport,
            registration,
            phase,
            bytes_acknowledged,
            ..
        } = self;

        registration.revoke(&mut transport);
        let signal = match transport.close() {
            Ok(()) => cause.signal(),
            Err(err) => {
                warn!("[{id}] Close failed ({err}), aborting");
                transport.abort();
                CloseSignal::Aborted
            }
        };
        drop(transport);

        debug!("[{id}] {phase} -> {}", Phase::Closed);
        match cause {
            CloseCause::Completed | CloseCause::PeerClosed => {
                info!("[{id}] Connection closed: {cause}")
            }
            _ => warn!("[{id}] Connection closed: {cause} ({signal})"),
        }

        CloseReport {
            id,
            cause,
            signal,
            phase,
            bytes_acknowledged,
            response_length,
        }
    }

    /// Parse the request, render it and queue the response
    fn respond<S, O>(&mut self, data: &[u8], board: &mut Board<S, O>) -> Result<(), CloseCause>
    where
        S: TemperatureSensor,
        O: OutputPin,
    {
        let id = self.id;
        advance(&mut self.phase, id, Phase::Receiving);

        let copied = self.header.copy_from(data);
        if copied < data.len() {
            debug!("[{id}] Request cut to {copied} of {} bytes", data.len());
        }

        let request = parser::parse(self.header.as_bytes()).map_err(|reason| {
            warn!("[{id}] Malformed request: {reason}");
            CloseCause::Malformed(reason)
        })?;
        advance(&mut self.phase, id, Phase::Parsed);

        let rendered = content::render(board, request.path, request.query, &mut self.body)
            .map_err(|err| {
                warn!("[{id}] Body does not fit: {err}");
                CloseCause::Oversized
            })?;
        info!("[{id}] Request: {}?{}", request.path.escape_ascii(), request.query.unwrap_or(""));
        info!("[{id}] Result length: {}", rendered.body_length);

        self.body_length = rendered.body_length;
        self.header_length = response::build_headers(&mut self.header, self.body_length, self.gateway)
            .map_err(|err| {
                warn!("[{id}] Headers do not fit: {err}");
                CloseCause::Oversized
            })?;
        if self.body_length == 0 {
            info!("[{id}] Sending redirect to {}", content::INFO_PATH);
        }

        self.bytes_acknowledged = 0;
        self.transport.write(self.header.as_bytes()).map_err(|err| {
            warn!("[{id}] Failed to write headers: {err}");
            CloseCause::WriteFailed(err)
        })?;
        if self.body_length > 0 {
            self.transport.write(self.body.as_bytes()).map_err(|err| {
                warn!("[{id}] Failed to write body: {err}");
                CloseCause::WriteFailed(err)
            })?;
        }

        let next = if self.body_length > 0 {
            Phase::Responding
        } else {
            Phase::Redirecting
        };
        advance(&mut self.phase, id, next);
        Ok(())
    }
}

impl<T, const H: usize, const B: usize> fmt::Debug for Session<T, H, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("header_length", &self.header_length)
            .field("body_length", &self.body_length)
            .field("bytes_acknowledged", &self.bytes_acknowledged)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{SimulatedPin, SimulatedSensor};
    use crate::transport::mock::{MockTransport, Probe};
    use std::cell::RefCell;
    use std::rc::Rc;

    type TestBoard = Board<SimulatedSensor, SimulatedPin>;

    const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

    fn board() -> TestBoard {
        Board::new(SimulatedSensor::new(876), SimulatedPin::new(13))
    }

    fn session() -> (Session<MockTransport>, Rc<RefCell<Probe>>) {
        let (transport, probe) = MockTransport::new();
        let session = Session::accept(ConnectionId(1), transport, Some(GATEWAY), Duration::from_secs(5));
        (session, probe)
    }

    fn get(path: &str) -> Vec<u8> {
        format!("GET {path} HTTP/1.1\r\nHost: 192.168.4.1\r\n\r\n").into_bytes()
    }

    fn open<T>(step: Step<T>) -> T {
        match step {
            Step::Open(session) => session,
            Step::Closed(report) => panic!("closed unexpectedly: {report:?}"),
        }
    }

    fn closed<T>(step: Step<T>) -> CloseReport {
        match step {
            Step::Open(_) => panic!("still open"),
            Step::Closed(report) => report,
        }
    }

    #[test]
    fn test_phase_transitions() {
        assert!(Phase::Accepted.can_advance_to(Phase::Receiving));
        assert!(Phase::Parsed.can_advance_to(Phase::Redirecting));
        assert!(Phase::Responding.can_advance_to(Phase::Sent));
        assert!(Phase::Receiving.can_advance_to(Phase::Closed));
        assert!(!Phase::Accepted.can_advance_to(Phase::Responding));
        assert!(!Phase::Sent.can_advance_to(Phase::Responding));
        assert!(!Phase::Closed.can_advance_to(Phase::Closed));
    }

    #[test]
    fn test_accept_registers_hooks() {
        let (session, probe) = session();
        assert_eq!(session.phase(), Phase::Accepted);
        assert_eq!(probe.borrow().calls, vec!["register"]);
        assert_eq!(probe.borrow().poll_interval, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_info_page_response() {
        let (session, probe) = session();
        let mut board = board();

        let session = open(session.on_received(Some(&get("/info")), &mut board));
        assert_eq!(session.phase(), Phase::Responding);
        assert!(session.body_length() > 0);

        let probe = probe.borrow();
        let written = probe.written_str();
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.contains(&format!("Content-Length: {}\r\n", session.body_length())));
        assert!(written.contains(">OFF</span>"));
        assert_eq!(written.len(), session.response_length());
        assert_eq!(probe.writes, 2);
    }

    #[test]
    fn test_routes() {
        let cases = [
            ("/info", "200 OK", Some(">OFF</span>")),
            ("/info?led=1", "200 OK", Some(">ON</span>")),
            ("/info?led=0", "200 OK", Some(">OFF</span>")),
            ("/other", "302 Found", None),
        ];
        let mut board = board();
        for (path, status, marker) in cases {
            let (session, probe) = session();
            let session = open(session.on_received(Some(&get(path)), &mut board));
            let probe = probe.borrow();
            let written = probe.written_str();
            assert!(written.starts_with(&format!("HTTP/1.1 {status}\r\n")), "{path}");
            match marker {
                Some(marker) => assert!(written.contains(marker), "{path}"),
                None => {
                    assert!(written.contains("Location: http://192.168.4.1/info\r\n"));
                    assert_eq!(session.phase(), Phase::Redirecting);
                    assert_eq!(session.body_length(), 0);
                    assert_eq!(probe.writes, 1);
                }
            }
        }
    }

    #[test]
    fn test_redirect_completes_on_header_ack() {
        let (session, probe) = session();
        let mut board = board();
        let session = open(session.on_received(Some(&get("/generate_204")), &mut board));
        let total = session.header_length();

        let report = closed(session.on_sent(total));
        assert_eq!(report.cause, CloseCause::Completed);
        assert_eq!(report.phase, Phase::Sent);
        assert_eq!(probe.borrow().closes, 1);
    }

    #[test]
    fn test_ack_split_across_two_events() {
        let (session, probe) = session();
        let mut board = board();
        let session = open(session.on_received(Some(&get("/info")), &mut board));
        let total = session.response_length();

        let session = open(session.on_sent(total - 100));
        assert_eq!(session.bytes_acknowledged(), total - 100);
        assert_eq!(probe.borrow().closes, 0);

        let report = closed(session.on_sent(100));
        assert_eq!(report.cause, CloseCause::Completed);
        assert_eq!(report.signal, CloseSignal::Ok);
        assert_eq!(report.bytes_acknowledged, total);
        assert_eq!(report.response_length, total);
        assert_eq!(probe.borrow().closes, 1);
    }

    #[test]
    fn test_malformed_method_writes_nothing() {
        let (session, probe) = session();
        let mut board = board();
        let request = b"POST /info HTTP/1.1\r\nContent-Length: 0\r\n\r\n";

        let report = closed(session.on_received(Some(request), &mut board));
        assert_eq!(
            report.cause,
            CloseCause::Malformed(Malformed::UnsupportedMethod(parser::Method::Post))
        );
        assert_eq!(report.signal, CloseSignal::Argument);
        assert_eq!(report.phase, Phase::Receiving);

        let probe = probe.borrow();
        assert!(probe.written.is_empty());
        assert_eq!(probe.recved, request.len());
        assert_eq!(probe.calls, vec!["register", "recved", "unregister", "close"]);
        assert!(probe.dropped);
    }

    #[test]
    fn test_oversized_body_closes_without_writing() {
        let (transport, probe) = MockTransport::new();
        let session: Session<MockTransport, 128, 256> =
            Session::accept(ConnectionId(2), transport, Some(GATEWAY), Duration::from_secs(5));
        let mut board = board();

        let report = closed(session.on_received(Some(&get("/info")), &mut board));
        assert_eq!(report.cause, CloseCause::Oversized);
        assert_eq!(report.signal, CloseSignal::Closed);
        assert_eq!(report.response_length, 0);
        assert!(probe.borrow().written.is_empty());
        assert_eq!(probe.borrow().closes, 1);
    }

    #[test]
    fn test_oversized_headers_close_without_writing() {
        let (transport, probe) = MockTransport::new();
        let session: Session<MockTransport, 48, 768> =
            Session::accept(ConnectionId(3), transport, Some(GATEWAY), Duration::from_secs(5));
        let mut board = board();

        let report = closed(session.on_received(Some(&get("/info")), &mut board));
        assert_eq!(report.cause, CloseCause::Oversized);
        assert!(probe.borrow().written.is_empty());
    }

    #[test]
    fn test_body_write_failure() {
        let (session, probe) = session();
        probe.borrow_mut().fail_write = Some(1);
        let mut board = board();

        let report = closed(session.on_received(Some(&get("/info")), &mut board));
        assert_eq!(report.cause, CloseCause::WriteFailed(TransportError::OutOfMemory));
        assert_eq!(report.signal, CloseSignal::Transport(TransportError::OutOfMemory));
        assert_eq!(probe.borrow().closes, 1);
    }

    #[test]
    fn test_failed_close_aborts() {
        let (session, probe) = session();
        probe.borrow_mut().fail_close = true;

        let report = session.on_poll();
        assert_eq!(report.cause, CloseCause::IdleTimeout);
        assert_eq!(report.signal, CloseSignal::Aborted);
        assert_eq!(probe.borrow().calls, vec!["register", "unregister", "close", "abort"]);
    }

    #[test]
    fn test_poll_closes_in_any_phase() {
        let (session, probe) = session();
        let mut board = board();
        let session = open(session.on_received(Some(&get("/info")), &mut board));
        let session = open(session.on_sent(10));

        let report = session.on_poll();
        assert_eq!(report.cause, CloseCause::IdleTimeout);
        assert_eq!(report.phase, Phase::Responding);
        assert_eq!(probe.borrow().closes, 1);
        assert_eq!(probe.borrow().unregistrations, 1);
    }

    #[test]
    fn test_transport_error_releases_without_closing() {
        let (session, probe) = session();
        let report = session.on_error(TransportError::Reset);

        assert_eq!(report.cause, CloseCause::TransportError(TransportError::Reset));
        let probe = probe.borrow();
        assert_eq!(probe.closes, 0);
        assert_eq!(probe.aborts, 0);
        assert_eq!(probe.unregistrations, 0);
        assert!(probe.dropped);
    }

    #[test]
    fn test_peer_close() {
        let (session, probe) = session();
        let mut board = board();
        let report = closed(session.on_received(None, &mut board));
        assert_eq!(report.cause, CloseCause::PeerClosed);
        assert_eq!(report.signal, CloseSignal::Ok);
        assert_eq!(probe.borrow().closes, 1);
    }

    #[test]
    fn test_later_deliveries_are_acknowledged_and_ignored() {
        let (session, probe) = session();
        let mut board = board();
        let first = get("/info?led=1");

        let session = open(session.on_received(Some(&first), &mut board));
        let written = probe.borrow().written.len();

        let session = open(session.on_received(Some(b"GET /info?led=0 HTTP/1.1\r\n\r\n"), &mut board));
        let session = open(session.on_received(Some(b""), &mut board));

        assert_eq!(session.phase(), Phase::Responding);
        assert!(board.output.output());
        assert_eq!(probe.borrow().written.len(), written);
        assert_eq!(probe.borrow().recved, first.len() + 28);
    }

    #[test]
    fn test_empty_delivery_keeps_waiting() {
        let (session, probe) = session();
        let mut board = board();
        let session = open(session.on_received(Some(b""), &mut board));
        assert_eq!(session.phase(), Phase::Accepted);

        let session = open(session.on_received(Some(&get("/info")), &mut board));
        assert_eq!(session.phase(), Phase::Responding);
        assert_eq!(probe.borrow().writes, 2);
    }

    #[test]
    fn test_long_request_parsed_from_first_segment() {
        let (session, _probe) = session();
        let mut board = board();
        let mut request = get("/info?led=1");
        request.extend_from_slice(&[b'x'; 600]);

        let session = open(session.on_received(Some(&request), &mut board));
        assert_eq!(session.phase(), Phase::Responding);
        assert!(board.output.output());
    }

    #[test]
    fn test_character_split_by_scratch_cut_is_redirected() {
        let (session, probe) = session();
        let mut board = board();
        // the two bytes of 'é' straddle the end of the scratch buffer
        let mut request = b"GET /".to_vec();
        request.extend_from_slice(&[b'a'; HEADER_CAPACITY - 7]);
        request.extend_from_slice("\u{e9} HTTP/1.1\r\n\r\n".as_bytes());
        assert_eq!(request[HEADER_CAPACITY - 2], 0xc3);

        let session = open(session.on_received(Some(&request), &mut board));
        assert_eq!(session.phase(), Phase::Redirecting);
        assert!(probe.borrow().written_str().starts_with("HTTP/1.1 302 Found\r\n"));
    }

    #[test]
    fn test_non_utf8_target_is_redirected() {
        let (session, probe) = session();
        let mut board = board();

        let session = open(session.on_received(Some(b"GET /caf\xe9 HTTP/1.1\r\n\r\n"), &mut board));
        assert_eq!(session.phase(), Phase::Redirecting);
        assert!(probe.borrow().written_str().starts_with("HTTP/1.1 302 Found\r\n"));
        assert_eq!(board.sensor.reads(), 0);
    }

    #[test]
    fn test_garbled_query_tail_still_switches_output() {
        let (session, _probe) = session();
        let mut board = board();

        let session = open(session.on_received(Some(b"GET /info?led=1\xff HTTP/1.1\r\n\r\n"), &mut board));
        assert_eq!(session.phase(), Phase::Responding);
        assert!(board.output.output());
    }

    #[test]
    fn test_ack_before_response_does_not_close() {
        let (session, probe) = session();
        let session = open(session.on_sent(0));
        assert_eq!(session.phase(), Phase::Accepted);
        assert_eq!(probe.borrow().closes, 0);
    }

    #[test]
    fn test_close_happens_once_across_ack_splits() {
        let mut board = board();
        let request = get("/info");
        for split in [1usize, 50, 200] {
            let (session, probe) = session();
            let session = open(session.on_received(Some(&request), &mut board));
            let mut step = session.on_received(Some(b"junk"), &mut board);

            let mut acks = 0;
            let report = loop {
                match step {
                    Step::Open(session) => {
                        let remaining = session.response_length() - session.bytes_acknowledged();
                        acks += 1;
                        step = session.on_sent(split.min(remaining));
                    }
                    Step::Closed(report) => break report,
                }
            };
            assert_eq!(report.cause, CloseCause::Completed);
            assert!(acks >= 1);
            let probe = probe.borrow();
            assert_eq!(probe.closes, 1);
            assert_eq!(probe.unregistrations, 1);
            assert_eq!(probe.calls_after_unregister, 0);
            assert!(probe.dropped);
        }
    }
}
