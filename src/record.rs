//! Immutable capture data model

use std::fmt;

use bytes::{Bytes, BytesMut};
use hyper::header::HeaderMap;

/// Scheme of a captured request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plaintext transport
    Http,
    /// TLS transport
    Https,
}

impl Scheme {
    /// The scheme as it appears in a URI
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Default port for the scheme
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request line and headers as resolved at send time
///
/// Fields reflect what is actually transmitted, not what the caller supplied:
/// the scheme and host are filled in from the URI and the final header set
/// includes headers injected by the transport (e.g. `host`).
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// HTTP method
    pub method: String,
    /// Request scheme
    pub scheme: Scheme,
    /// Host, including the port when non-default for the scheme
    pub host: String,
    /// Path and query
    pub path: String,
    /// Header pairs in wire order; repeated names preserved
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// First value of a header, matched case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Status line and headers exactly as received
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// HTTP status code
    pub status: u16,
    /// Status message for the code.
    ///
    /// hyper drops the reason phrase as received during parsing, so this
    /// is the canonical text for the code, not the server's own phrase.
    pub status_message: String,
    /// Header pairs in wire order; repeated names preserved
    pub headers: Vec<(String, String)>,
}

impl ResponseHead {
    /// First value of a header, matched case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

/// Fully assembled capture of one completed exchange
///
/// Created exactly once, when both the request stream and the response
/// stream have completed; immutable thereafter. Bodies are the raw chunk
/// sequences as written/received — still content-encoded, never merged.
#[derive(Debug, Clone)]
pub struct Record {
    /// Request line and headers as sent
    pub request: RequestHead,
    /// Request body chunks in write order
    pub request_body: Vec<Bytes>,
    /// Status line and headers as received
    pub response: ResponseHead,
    /// Response body chunks in arrival order
    pub response_body: Vec<Bytes>,
}

impl Record {
    /// Request body concatenated into a single buffer
    #[must_use]
    pub fn request_body_bytes(&self) -> Bytes {
        concat_chunks(&self.request_body)
    }

    /// Response body concatenated into a single buffer
    #[must_use]
    pub fn response_body_bytes(&self) -> Bytes {
        concat_chunks(&self.response_body)
    }
}

/// First value for `name` in a header pair list, case-insensitive
#[must_use]
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// All values for `name` in a header pair list, in wire order
#[must_use]
pub fn header_values<'a>(headers: &'a [(String, String)], name: &str) -> Vec<&'a str> {
    headers
        .iter()
        .filter(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
        .collect()
}

/// Convert a hyper header map into ordered name/value pairs
///
/// Non-UTF-8 header values are preserved lossily rather than dropped.
#[must_use]
pub fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn concat_chunks(chunks: &[Bytes]) -> Bytes {
    let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
    for chunk in chunks {
        buf.extend_from_slice(chunk);
    }
    buf.freeze()
}
