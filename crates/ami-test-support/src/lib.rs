//! ami-test-support: a mock AMI server for integration testing of
//! `ami-client` without a real Asterisk instance.

mod mock_ami_server;

pub use mock_ami_server::{MockAmiConnection, MockAmiServer};

/// Default welcome line for a new-API (`1.x`) server.
pub const NEW_API_WELCOME: &str = "Asterisk Call Manager/1.1\r\n";

/// Default welcome line for an old-API (`0.x`) server.
pub const OLD_API_WELCOME: &str = "Asterisk Call Manager/0.1\r\n";
