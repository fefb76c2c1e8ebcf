//! Request-line parser
//!
//! Recognizes the first line of an HTTP request and nothing else: method,
//! path and the raw query string. Headers are never read and the query is not
//! URL-decoded. The whole request line has to be present in the bytes handed
//! in; there is no reassembly across deliveries.

mod method;

pub use method::Method;

use memchr::{memchr, memchr2};
use thiserror::Error;

/// Why a request line was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("empty request line")]
    Empty,

    #[error("unknown method")]
    UnknownMethod,

    #[error("unsupported method {0}")]
    UnsupportedMethod(Method),

    #[error("missing request target")]
    MissingTarget,
}

/// Parsed request line, borrowing from the scratch buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: Method,
    /// Target up to the first `?`, raw bytes
    pub path: &'a [u8],
    /// Text after the first `?`, absent when empty
    pub query: Option<&'a str>,
}

/// Parse the request line at the start of `raw`.
///
/// Only the method has to be well formed. The path is kept as opaque bytes
/// and the query is cut at its first invalid UTF-8 sequence, so a garbled or
/// truncated target still parses.
pub fn parse(raw: &[u8]) -> Result<RequestLine<'_>, Malformed> {
    let line_end = memchr2(b'\r', b'\n', raw).unwrap_or(raw.len());
    let line = &raw[..line_end];

    if !line.starts_with(Method::Get.as_str().as_bytes()) {
        return Err(reject_method(line));
    }

    // Runs of spaces separate tokens, like strtok
    let mut tokens = line.split(|&b| b == b' ').filter(|token| !token.is_empty());
    let method_token = tokens.next().ok_or(Malformed::Empty)?;
    let method = Method::parse(method_token).ok_or(Malformed::UnknownMethod)?;
    if !method.is_retrieval() {
        return Err(Malformed::UnsupportedMethod(method));
    }

    let target = tokens.next().ok_or(Malformed::MissingTarget)?;
    let (path, query) = split_target(target);

    Ok(RequestLine {
        method,
        path,
        query: query.and_then(query_text),
    })
}

/// Split a request target on the first `?`
pub fn split_target(target: &[u8]) -> (&[u8], Option<&[u8]>) {
    match memchr(b'?', target) {
        Some(at) => {
            let query = &target[at + 1..];
            (&target[..at], (!query.is_empty()).then_some(query))
        }
        None => (target, None),
    }
}

/// Longest valid UTF-8 prefix of a query, absent when empty
fn query_text(query: &[u8]) -> Option<&str> {
    let text = match std::str::from_utf8(query) {
        Ok(text) => text,
        Err(e) => std::str::from_utf8(&query[..e.valid_up_to()]).ok()?,
    };
    (!text.is_empty()).then_some(text)
}

fn reject_method(line: &[u8]) -> Malformed {
    let token_end = memchr(b' ', line).unwrap_or(line.len());
    if token_end == 0 {
        return Malformed::Empty;
    }
    match Method::parse(&line[..token_end]) {
        Some(method) => Malformed::UnsupportedMethod(method),
        None => Malformed::UnknownMethod,
    }
}
