//! HTTP response headers
//!
//! A response is either the control page (`200` with a body) or a bounce back
//! to it (`302`, no body). Both always close the connection.

use crate::buffer::FixedBuffer;
use crate::content::INFO_PATH;
use crate::Result;
use std::net::Ipv4Addr;

/// Content type of the control page
pub const CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// HTTP Status Code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const FOUND: StatusCode = StatusCode(302);

    /// Get the reason phrase
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            302 => "Found",
            _ => "Unknown",
        }
    }

    /// Check if this is a redirect status (3xx)
    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.0)
    }

    /// Status sent for a rendered body of `body_length` bytes
    pub fn for_body(body_length: usize) -> Self {
        if body_length > 0 {
            StatusCode::OK
        } else {
            StatusCode::FOUND
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

/// Write response headers into `buf`, returning their length.
///
/// A non-empty body gets a `200` with its length; an empty one gets a `302`
/// to the control page, on the gateway when its address is known.
pub fn build_headers<const N: usize>(
    buf: &mut FixedBuffer<N>,
    body_length: usize,
    gateway: Option<Ipv4Addr>,
) -> Result<usize> {
    let status = StatusCode::for_body(body_length);
    if !status.is_redirect() {
        return buf.format(format_args!(
            "HTTP/1.1 {status}\r\n\
             Content-Length: {body_length}\r\n\
             Content-Type: {CONTENT_TYPE}\r\n\
             Connection: close\r\n\
             \r\n"
        ));
    }

    match gateway {
        Some(gateway) => buf.format(format_args!(
            "HTTP/1.1 {status}\r\n\
             Location: http://{gateway}{INFO_PATH}\r\n\
             Connection: close\r\n\
             \r\n"
        )),
        None => buf.format(format_args!(
            "HTTP/1.1 {status}\r\n\
             Location: {INFO_PATH}\r\n\
             Connection: close\r\n\
             \r\n"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn text<const N: usize>(buf: &FixedBuffer<N>) -> &str {
        std::str::from_utf8(buf.as_bytes()).unwrap()
    }

    #[test]
    fn test_status_code() {
        assert_eq!(StatusCode::for_body(10), StatusCode::OK);
        assert_eq!(StatusCode::for_body(0), StatusCode::FOUND);
        assert!(StatusCode::FOUND.is_redirect());
        assert_eq!(StatusCode::OK.to_string(), "200 OK");
    }

    #[test]
    fn test_content_headers() {
        let mut buf = FixedBuffer::<128>::new();
        let len = build_headers(&mut buf, 693, Some(Ipv4Addr::new(192, 168, 4, 1))).unwrap();
        assert_eq!(len, buf.len());
        assert_eq!(
            text(&buf),
            "HTTP/1.1 200 OK\r\nContent-Length: 693\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n"
        );
    }

    #[test]
    fn test_redirect_to_gateway() {
        let mut buf = FixedBuffer::<128>::new();
        build_headers(&mut buf, 0, Some(Ipv4Addr::new(192, 168, 4, 1))).unwrap();
        let s = text(&buf);
        assert!(s.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(s.contains("Location: http://192.168.4.1/info\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_redirect_without_gateway_is_relative() {
        let mut buf = FixedBuffer::<128>::new();
        build_headers(&mut buf, 0, None).unwrap();
        assert!(text(&buf).contains("Location: /info\r\n"));
    }

    #[test]
    fn test_headers_too_large() {
        let mut buf = FixedBuffer::<64>::new();
        let err = build_headers(&mut buf, 693, None).unwrap_err();
        assert!(matches!(err, Error::BufferTooSmall { capacity: 64, .. }));
        assert!(buf.is_empty());
    }
}
