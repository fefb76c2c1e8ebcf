//! hotspot-core: HTTP responder for a wireless access point
//!
//! Serves one control page over a minimal subset of HTTP/1.1: a single GET
//! route that reports a temperature and switches one digital output, with every
//! other path redirected back to it. Each connection carries exactly one
//! request and is closed once its response is acknowledged.
//!
//! The protocol logic is platform independent. A tokio runtime for ordinary
//! TCP hosts is gated behind a feature flag.
//!
//! ## Features
//! - `native` - Listener and per-connection I/O on tokio/socket2

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod connection;
pub mod content;
pub mod device;
pub mod error;
pub mod listener;
pub mod parser;
pub mod response;
pub mod transport;

#[cfg(feature = "native")]
pub mod native;

// Re-exports
pub use buffer::FixedBuffer;
pub use config::{AccessPointConfig, AuthMode, ServerConfig};
pub use connection::{CloseCause, CloseReport, Phase, Session, Step, BODY_CAPACITY, HEADER_CAPACITY};
pub use content::{render, LedCommand, Rendered, INFO_PATH};
pub use device::{raw_to_celsius, Board, OutputPin, SimulatedPin, SimulatedSensor, TemperatureSensor};
pub use error::{Error, Result};
pub use listener::{Acceptor, AcceptorStats};
pub use parser::{Malformed, Method, RequestLine};
pub use response::{build_headers, StatusCode};
pub use transport::{CloseSignal, ConnectionId, Registration, Transport, TransportError};

#[cfg(feature = "native")]
pub use native::{open, serve, ConnectionTracker, TcpTransport};
