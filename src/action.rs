//! The action surface: build outgoing request blocks from an action
//! name plus headers, and present both a blocking call and a
//! completion-callback call over the same correlator/transport mechanism.

use md5::{Digest, Md5};

use crate::error::AmiError;
use crate::shape::AmiValue;

/// An outgoing request, ready to hand to the [`crate::codec::AmiCodec`]
/// encoder. Header order is preserved on the wire.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub action: String,
    pub headers: Vec<(String, String)>,
}

/// Builder for an action's headers, used by every call site regardless of
/// call style (blocking or completion-callback).
#[derive(Debug, Clone)]
pub struct ActionCall {
    pub action: String,
    pub action_id: String,
    pub headers: Vec<(String, String)>,
}

impl ActionCall {
    pub fn new(action: impl Into<String>, action_id: impl Into<String>) -> Self {
        ActionCall {
            action: action.into(),
            action_id: action_id.into(),
            headers: Vec::new(),
        }
    }

    /// Add a header argument. `None`/empty values are omitted from the wire
    /// request, per the configuration surface's pass-through rule.
    pub fn header(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        if let Some(v) = value {
            let v = v.into();
            if !v.is_empty() {
                self.headers.push((name.into(), v));
            }
        }
        self
    }

    pub fn raw_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn into_request(self) -> OutgoingRequest {
        let mut headers = vec![("ActionID".to_owned(), self.action_id)];
        headers.extend(self.headers);
        OutgoingRequest {
            action: self.action,
            headers,
        }
    }
}

/// Result object handed to a completion sink in callback mode.
///
/// Mirrors the blocking call's `Result<AmiValue, AmiError>`, plus the
/// correlation token, so a caller juggling many in-flight callbacks can tell
/// them apart.
#[derive(Debug)]
pub struct CallResult {
    pub correlation_token: String,
    pub outcome: Result<AmiValue, AmiError>,
}

impl CallResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            Err(AmiError::ActionFailed { message }) => message.as_deref(),
            _ => None,
        }
    }
}

/// `key = md5(challenge || password)`, hex-encoded lowercase, as required
/// by `Login`'s `authType=md5` mode.
pub fn md5_challenge_key(challenge: &str, secret: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(challenge.as_bytes());
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
