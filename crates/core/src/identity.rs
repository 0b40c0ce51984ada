//! Node identity token parsing
//!
//! The controller hands every node a compact three-segment bearer token.
//! Only the middle segment is inspected here: it decodes (base64url,
//! padding-tolerant) to a JSON claims map carrying the organization
//! subject, the node identifier, and an optional private-network flag.
//! The token is otherwise treated as opaque bearer material; signature
//! verification is the controller's job, not ours.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use serde_json::Value;

use crate::{Error, Result};

/// Claim carrying the organization / subject identifier
const CLAIM_SUBJECT: &str = "sub";
/// Claim carrying the node identifier
const CLAIM_NODE_ID: &str = "rid";
/// Claim marking the node as reachable over the private network
const CLAIM_PRIVATE: &str = "prv";

/// A parsed node token
///
/// Holds the raw bearer string for transport metadata plus the typed
/// claims extracted from the middle segment.
#[derive(Debug, Clone)]
pub struct NodeToken {
    raw: String,
    subject: String,
    node_id: String,
    private: bool,
}

impl NodeToken {
    /// Parse a three-segment bearer token
    ///
    /// # Errors
    ///
    /// * `Error::InvalidInput` - wrong segment count, undecodable middle
    ///   segment, missing `sub`/`rid`, or a non-boolean `prv` claim
    pub fn parse(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();

        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(Error::InvalidInput(format!(
                "token must have 3 segments, got {}",
                segments.len()
            )));
        }

        let claims = decode_claims(segments[1])?;

        let subject = match claims.get(CLAIM_SUBJECT) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(Error::InvalidInput("token missing 'sub' claim".into())),
        };

        let node_id = match claims.get(CLAIM_NODE_ID) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(Error::InvalidInput("token missing 'rid' claim".into())),
        };

        // Absent means public; any non-boolean value is malformed.
        let private = match claims.get(CLAIM_PRIVATE) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(Error::InvalidInput(format!(
                    "token 'prv' claim must be a boolean, got {}",
                    other
                )))
            }
        };

        Ok(Self {
            raw,
            subject,
            node_id,
            private,
        })
    }

    /// Organization / subject identifier
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Node identifier for node-scoped operations
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Whether the token selects the private-network streaming transport
    pub fn is_private(&self) -> bool {
        self.private
    }

    /// The raw bearer string, for transport metadata
    pub fn bearer(&self) -> &str {
        &self.raw
    }
}

/// Decode the claims segment, tolerating stripped base64 padding
fn decode_claims(segment: &str) -> Result<HashMap<String, Value>> {
    let mut padded = segment.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }

    let bytes = URL_SAFE
        .decode(padded.as_bytes())
        .map_err(|e| Error::InvalidInput(format!("token claims segment is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidInput(format!("token claims segment is not a JSON map: {}", e)))
}
