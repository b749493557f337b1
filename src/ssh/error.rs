//! SSH Error types

use std::fmt;

use thiserror::Error;

/// Which connection of a (possibly nested) tool an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hop {
    /// Plain single-hop connection to the target
    Direct,
    /// The intermediate jump host
    Jump,
    /// The target, reached through the jump host tunnel
    Tunneled,
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hop::Direct => f.write_str("host"),
            Hop::Jump => f.write_str("jump host"),
            Hop::Tunneled => f.write_str("target via jump host"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SshError {
    #[error("Connection to {hop} failed: {message}")]
    ConnectionFailed { hop: Hop, message: String },

    #[error("Authentication to {hop} failed: {message}")]
    AuthenticationFailed { hop: Hop, message: String },

    /// A session or forwarding channel could not be opened, or a channel
    /// request failed. `hop` is set for the `direct-tcpip` channel of a
    /// nested connection.
    #[error("Channel error: {message}")]
    ChannelError { hop: Option<Hop>, message: String },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Host key rejected for {host}:{port}: {reason}")]
    HostKeyRejected {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection is closed")]
    Closed,

    #[error("Privileged command failed with exit code {exit_code}")]
    PrivilegedCommandFailed { exit_code: i32, output: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),
}

impl SshError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        SshError::ConnectionFailed {
            hop: Hop::Direct,
            message: message.into(),
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        SshError::AuthenticationFailed {
            hop: Hop::Direct,
            message: message.into(),
        }
    }

    pub(crate) fn channel(message: impl Into<String>) -> Self {
        SshError::ChannelError {
            hop: None,
            message: message.into(),
        }
    }

    /// The hop a connect, authenticate or tunnel failure belongs to
    pub fn hop(&self) -> Option<Hop> {
        match self {
            SshError::ConnectionFailed { hop, .. } | SshError::AuthenticationFailed { hop, .. } => {
                Some(*hop)
            }
            SshError::ChannelError { hop, .. } => *hop,
            _ => None,
        }
    }

    /// Re-attribute a connect, authenticate or channel failure to `hop`
    pub(crate) fn at_hop(self, hop: Hop) -> Self {
        match self {
            SshError::ConnectionFailed { message, .. } => {
                SshError::ConnectionFailed { hop, message }
            }
            SshError::AuthenticationFailed { message, .. } => {
                SshError::AuthenticationFailed { hop, message }
            }
            SshError::ChannelError { message, .. } => SshError::ChannelError {
                hop: Some(hop),
                message,
            },
            SshError::Timeout(message) => SshError::Timeout(format!("{} ({})", message, hop)),
            other => other,
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}
