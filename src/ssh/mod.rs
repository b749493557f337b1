//! SSH Module
//!
//! Password-authenticated SSH helpers built on russh:
//! - [`SshTool`]: reusable connection, optionally through a jump host
//! - [`run_on_switch`]: blind command entry into an interactive shell
//! - [`run_with_privilege`]: sudo command with the password fed over a PTY

mod backoff;
mod buffer;
mod client;
mod config;
mod error;
#[cfg(test)]
pub(crate) mod mock;
mod sudo;
mod switch;
mod tool;
pub mod transport;

pub use backoff::{ExponentialBackoff, FixedBackoff, PollBackoff};
pub use buffer::{ChannelReader, EXIT_STATUS_UNKNOWN};
pub use client::{ClientHandler, RusshChannel, RusshProvider, RusshTransport};
pub use config::{
    ConnectOptions, Credentials, Endpoint, EscalationSecret, HostKeyPolicy, JumpHost, PtyConfig,
};
pub use error::{Hop, SshError};
pub use sudo::{
    looks_like_sudo_failure, run_with_privilege, run_with_privilege_checked,
    run_with_privilege_checked_with, run_with_privilege_with, SUDO_FAILURE_PATTERNS,
};
pub use switch::{run_on_switch, run_on_switch_with, ReadMode, SwitchOptions};
pub use tool::{CommandResult, SshTool};
pub use transport::{ChannelEvent, SessionChannel, Transport, TransportProvider};
