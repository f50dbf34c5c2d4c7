//! Asterisk Manager Interface (AMI) protocol engine.
//!
//! A plain-text, header-oriented, line-framed request/response-plus-event
//! protocol over a persistent TCP connection. This crate owns the wire
//! format, correlation/dispatch, transport and reconnection, and typed
//! response shaping; it does not ship the several-hundred near-identical
//! per-action convenience wrappers (those belong in a higher-level crate
//! built on top of [`Session::call`]).
//!
//! ```no_run
//! use std::sync::Arc;
//! use ami_client::{ConnectConfig, Session};
//!
//! # async fn run() -> Result<(), ami_client::AmiError> {
//! let config = ConnectConfig::new("ami.example.org", 5038).login("admin", "secret");
//! let session = Session::connect(config, Arc::new(|event| {
//!     println!("event: {event:?}");
//! })).await?;
//!
//! let vars = session.call("GetVar", vec![("Variable".to_owned(), Some("CALLERID".to_owned()))]).await?;
//! println!("{vars:?}");
//! # Ok(())
//! # }
//! ```

mod action;
mod catalog;
mod codec;
mod config;
mod correlator;
mod error;
mod event_mask;
mod packet;
mod session;
mod shape;
mod token;
mod transport;

pub use action::{ActionCall, CallResult, OutgoingRequest};
pub use codec::AmiCodec;
pub use config::ConnectConfig;
pub use correlator::{CompletionSink, Correlator};
pub use error::AmiError;
pub use event_mask::{EventCategory, EventMask};
pub use packet::Packet;
pub use session::Session;
pub use shape::{AmiValue, QueueStatusEntry, ShapeOutcome, ShapeSpec, ShapeState};
pub use token::generate as generate_token;
pub use transport::{ApiVersion, Credentials, EventSink, Transport};
