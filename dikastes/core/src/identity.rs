use regex::Regex;
use std::fmt;

/// Matches a SPIFFE ID issued to a Kubernetes service account, capturing the
/// namespace and the service account name.
pub const SPIFFE_ID_PATTERN: &str = "^spiffe://[^/]+/ns/([^/]+)/sa/([^/]+)$";

/// A caller's service account, as encoded in its attested principal.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ServiceAccountIdentity {
    pub name: String,
    pub namespace: String,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("expected match {pattern}, got {principal}")]
pub struct MalformedIdentity {
    pub principal: String,
    pub pattern: &'static str,
}

/// Parses attested principals into service account identities.
///
/// The pattern is compiled when the parser is built so that a single parser
/// may be shared by all concurrent checks.
#[derive(Clone, Debug)]
pub struct IdentityParser {
    spiffe_id: Regex,
}

// === impl IdentityParser ===

impl IdentityParser {
    pub fn new() -> Self {
        Self {
            spiffe_id: Regex::new(SPIFFE_ID_PATTERN).expect("SPIFFE ID pattern must compile"),
        }
    }

    pub fn parse(&self, principal: &str) -> Result<ServiceAccountIdentity, MalformedIdentity> {
        let caps = self
            .spiffe_id
            .captures(principal)
            .ok_or_else(|| MalformedIdentity {
                principal: principal.to_string(),
                pattern: SPIFFE_ID_PATTERN,
            })?;

        Ok(ServiceAccountIdentity {
            namespace: caps[1].to_string(),
            name: caps[2].to_string(),
        })
    }
}

impl Default for IdentityParser {
    fn default() -> Self {
        Self::new()
    }
}

// === impl ServiceAccountIdentity ===

impl fmt::Display for ServiceAccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
