//! Connect-time configuration.
//!
//! This is a library entry point rather than a deployed service: there is
//! no config file to parse, so `ConnectConfig` is an in-process typed
//! builder.

use crate::event_mask::EventMask;

/// `{host, port}` mandatory; `{username, secret, authType, eventMask}`
/// optional.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub secret: Option<String>,
    pub auth_type_md5: bool,
    pub event_mask: Option<EventMask>,
}

impl ConnectConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ConnectConfig {
            host: host.into(),
            port,
            username: None,
            secret: None,
            auth_type_md5: false,
            event_mask: None,
        }
    }

    /// Plain-secret login. Mutually exclusive with [`ConnectConfig::md5_login`].
    pub fn login(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.secret = Some(secret.into());
        self.auth_type_md5 = false;
        self
    }

    /// `authType=md5` login: `secret` is the plaintext password used to
    /// derive `key = md5(challenge || password)` against a freshly-fetched
    /// `Challenge` on each (re)connect.
    pub fn md5_login(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.secret = Some(secret.into());
        self.auth_type_md5 = true;
        self
    }

    pub fn event_mask(mut self, mask: EventMask) -> Self {
        self.event_mask = Some(mask);
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.secret.is_some()
    }
}
