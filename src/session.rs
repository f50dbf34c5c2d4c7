//! The session: connect/login/call glue wiring the transport, the
//! correlator, and the shape catalog into the action surface a caller
//! actually uses.
//!
//! `Ping` and `Events` are resolved here rather than in `catalog.rs`
//! because their ack literal is version- (and, for `Events`, mask-)
//! dependent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::action::{ActionCall, CallResult};
use crate::catalog;
use crate::config::ConnectConfig;
use crate::correlator::{CompletionSink, Correlator};
use crate::error::AmiError;
use crate::event_mask::EventMask;
use crate::shape::{AmiValue, ShapeSpec, ShapeState};
use crate::token;
use crate::transport::{ApiVersion, Credentials, EventSink, Transport};

/// An authenticated (or authenticating) AMI session: one TCP connection,
/// reconnected transparently underneath, with credentials remembered for
/// automatic re-login.
#[derive(Clone)]
pub struct Session {
    transport: Transport,
}

impl Session {
    /// Connect, then perform `Login` and `Events` if the config supplies
    /// credentials / an event mask.
    pub async fn connect(config: ConnectConfig, events: EventSink) -> Result<Session, AmiError> {
        let correlator = Arc::new(Correlator::new());
        let (transport, _version) =
            Transport::connect(config.host.clone(), config.port, correlator, events).await?;
        let session = Session { transport };

        if config.has_credentials() {
            let username = config.username.clone().expect("checked by has_credentials");
            let secret = config.secret.clone().expect("checked by has_credentials");
            session.login(&username, &secret, config.auth_type_md5).await?;
        }

        if let Some(mask) = &config.event_mask {
            session.set_events(mask.clone()).await?;
        }

        Ok(session)
    }

    pub fn api_version(&self) -> ApiVersion {
        self.transport.api_version()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// `Login`, with or without the MD5 challenge-response mode. On success
    /// the credentials are remembered so reconnects re-authenticate
    /// automatically.
    pub async fn login(&self, username: &str, secret: &str, use_md5: bool) -> Result<(), AmiError> {
        let mut headers = vec![("Username".to_owned(), Some(username.to_owned()))];
        if use_md5 {
            let challenge = self.challenge().await?;
            let key = crate::action::md5_challenge_key(&challenge, secret);
            headers.push(("Key".to_owned(), Some(key)));
            headers.push(("AuthType".to_owned(), Some("MD5".to_owned())));
        } else {
            headers.push(("Secret".to_owned(), Some(secret.to_owned())));
        }

        self.call_with_shape(
            "Login",
            headers,
            ShapeSpec::Ack {
                expected: "Success",
            },
            None,
        )
        .await?;

        self.transport.remember_credentials(Credentials {
            username: username.to_owned(),
            secret: secret.to_owned(),
            use_md5,
        });
        Ok(())
    }

    /// `Challenge`, extracting the `Challenge` field required by MD5 login.
    pub async fn challenge(&self) -> Result<String, AmiError> {
        let result = self
            .call_with_shape(
                "Challenge",
                vec![("AuthType".to_owned(), Some("MD5".to_owned()))],
                ShapeSpec::StringField { field: "Challenge" },
                None,
            )
            .await?;
        match result {
            AmiValue::Str(s) => Ok(s),
            other => Err(AmiError::Protocol(format!(
                "expected a Challenge string, got {other:?}"
            ))),
        }
    }

    /// `Events`, encoding `mask` per the negotiated API version.
    /// Disabling events (`EventMask::None`) expects `Events Off`; any other
    /// mask expects `Success`.
    pub async fn set_events(&self, mask: EventMask) -> Result<AmiValue, AmiError> {
        let encoded = mask.encode(self.api_version().is_new_api());
        let expected = if mask == EventMask::None {
            "Events Off"
        } else {
            "Success"
        };
        self.call_with_shape(
            "Events",
            vec![("EventMask".to_owned(), Some(encoded))],
            ShapeSpec::Ack { expected },
            None,
        )
        .await
    }

    /// `Logoff`, then idempotent local teardown.
    pub async fn logoff(&self) -> Result<(), AmiError> {
        let result = self
            .call_with_shape(
                "Logoff",
                Vec::new(),
                ShapeSpec::Ack {
                    expected: "Goodbye",
                },
                None,
            )
            .await;
        self.transport.close();
        result.map(|_| ())
    }

    /// Idempotent teardown without a graceful `Logoff` round-trip (e.g. the
    /// connection is already known to be gone).
    pub fn close(&self) {
        self.transport.close();
    }

    /// Blocking call: resolve `action`'s shape from the catalog (with the
    /// `Ping` version-dependent override), write the request, and wait for
    /// completion.
    pub async fn call(
        &self,
        action: &str,
        headers: Vec<(String, Option<String>)>,
    ) -> Result<AmiValue, AmiError> {
        self.call_with_deadline(action, headers, None).await
    }

    /// As [`Session::call`], failing with [`AmiError::Timeout`] if `deadline`
    /// elapses first.
    pub async fn call_with_deadline(
        &self,
        action: &str,
        headers: Vec<(String, Option<String>)>,
        deadline: Option<Duration>,
    ) -> Result<AmiValue, AmiError> {
        let shape = self.resolve_shape(action);
        self.call_with_shape(action, headers, shape, deadline).await
    }

    /// As [`Session::call`], but with an explicit shape rather than one
    /// resolved from the catalog — for actions the catalog doesn't know
    /// about, or to override its default.
    pub async fn call_with_shape(
        &self,
        action: &str,
        headers: Vec<(String, Option<String>)>,
        shape: ShapeSpec,
        deadline: Option<Duration>,
    ) -> Result<AmiValue, AmiError> {
        let token = token::generate();
        let mut call = ActionCall::new(action, token.clone());
        for (name, value) in headers {
            call = call.header(name, value);
        }

        let (tx, rx) = oneshot::channel();
        self.transport.correlator().register(
            token.clone(),
            ShapeState::new(shape),
            CompletionSink::Oneshot(tx),
        );
        self.transport.send(call.into_request())?;

        match deadline {
            Some(d) => match tokio::time::timeout(d, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(AmiError::Disconnected),
                Err(_) => {
                    self.transport.correlator().cancel(&token);
                    Err(AmiError::Timeout)
                }
            },
            None => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(AmiError::Disconnected),
            },
        }
    }

    /// Completion-callback call: returns as soon as the request is written;
    /// `sink` is invoked once, on the reader's dispatch context, when the
    /// action completes. Returns the correlation token (useful for
    /// [`Session::cancel`]).
    pub fn call_with<F>(
        &self,
        action: &str,
        headers: Vec<(String, Option<String>)>,
        sink: F,
    ) -> Result<String, AmiError>
    where
        F: FnOnce(CallResult) + Send + 'static,
    {
        let shape = self.resolve_shape(action);
        let token = token::generate();
        let mut call = ActionCall::new(action, token.clone());
        for (name, value) in headers {
            call = call.header(name, value);
        }

        self.transport.correlator().register(
            token.clone(),
            ShapeState::new(shape),
            CompletionSink::Callback(Box::new(sink)),
        );
        self.transport.send(call.into_request())?;
        Ok(token)
    }

    /// Cancel a pending action (blocking or callback). The request itself
    /// is not retracted; any future packets for `token` are dropped.
    pub fn cancel(&self, token: &str) {
        self.transport.correlator().cancel(token);
    }

    fn resolve_shape(&self, action: &str) -> ShapeSpec {
        if action.eq_ignore_ascii_case("Ping") {
            let expected = if self.api_version().is_new_api() {
                "Success"
            } else {
                "Pong"
            };
            return ShapeSpec::Ack { expected };
        }
        catalog::lookup(action).unwrap_or_else(catalog::default_shape)
    }
}
