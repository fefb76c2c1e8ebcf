//! HTTP Method enum
//!
//! Only `GET` is served; the other methods are recognized so a rejection can
//! say which one arrived.

/// HTTP Method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Connect,
    Trace,
}

impl Method {
    /// Parse method from bytes - optimized with early length check
    #[inline(always)]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        // Fast path: check first byte
        match bytes.first()? {
            b'G' if bytes == b"GET" => Some(Method::Get),
            b'P' => match bytes {
                b"POST" => Some(Method::Post),
                b"PUT" => Some(Method::Put),
                b"PATCH" => Some(Method::Patch),
                _ => None,
            },
            b'D' if bytes == b"DELETE" => Some(Method::Delete),
            b'H' if bytes == b"HEAD" => Some(Method::Head),
            b'O' if bytes == b"OPTIONS" => Some(Method::Options),
            b'C' if bytes == b"CONNECT" => Some(Method::Connect),
            b'T' if bytes == b"TRACE" => Some(Method::Trace),
            _ => None,
        }
    }

    /// Convert to string
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Connect => "CONNECT",
            Method::Trace => "TRACE",
        }
    }

    /// Whether this is the retrieval method the responder serves
    #[inline]
    pub fn is_retrieval(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
