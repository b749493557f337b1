//! sshtool - run commands over SSH
//!
//! Thin convenience layer over russh:
//! - [`SshTool`]: reusable connection, direct or through one jump host
//! - [`run_on_switch`]: feed command lines into a switch console shell
//! - [`run_with_privilege`]: answer a sudo prompt on a PTY-backed command
//!
//! Everything here is async. The [`blocking`] module wraps the same
//! operations for callers without a runtime.

pub mod blocking;
pub mod config;
pub mod ssh;

pub use config::ConfigError;
pub use ssh::{
    run_on_switch, run_with_privilege, run_with_privilege_checked, CommandResult, ConnectOptions,
    Credentials, Endpoint, EscalationSecret, Hop, HostKeyPolicy, JumpHost, ReadMode, SshError,
    SshTool, SwitchOptions,
};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging
///
/// Honours `RUST_LOG`, falls back to `info`. Calling it twice is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
