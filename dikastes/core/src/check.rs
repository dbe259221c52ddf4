use crate::labels::Labels;
use std::fmt;

/// The attributes of a single authorization check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckRequest {
    pub source: Peer,
    pub http: Option<HttpRequest>,
}

/// The calling workload, as attested by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Peer {
    pub principal: String,
    pub labels: Labels,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
}

/// The outcome of a single check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    Ok,
    Denied,
    Internal,
}

// === impl CheckRequest ===

impl CheckRequest {
    /// The request's HTTP method, or an empty string when the request carries
    /// no HTTP attributes.
    pub fn method(&self) -> &str {
        self.http.as_ref().map(|h| h.method.as_str()).unwrap_or("")
    }
}

// === impl Decision ===

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Denied => "denied",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
