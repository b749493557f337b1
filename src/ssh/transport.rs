//! Transport provider seam
//!
//! The runners only talk to these traits. [`super::client::RusshProvider`]
//! is the production implementation; tests plug in a scripted one.

use async_trait::async_trait;

use super::config::{ConnectOptions, Endpoint, PtyConfig};
use super::error::SshError;

/// Something a session channel delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Standard output bytes
    Stdout(Vec<u8>),
    /// Standard error bytes (extended data type 1)
    Stderr(Vec<u8>),
    /// The remote process exited
    ExitStatus(u32),
    /// The remote process was killed by a signal
    ExitSignal(String),
    /// The remote side will send no more data
    Eof,
    /// The channel is gone; repeated reads keep returning this
    Closed,
}

/// One session channel (exec or shell)
#[async_trait]
pub trait SessionChannel: Send {
    async fn request_pty(&mut self, pty: &PtyConfig) -> Result<(), SshError>;

    async fn request_shell(&mut self) -> Result<(), SshError>;

    async fn exec(&mut self, command: &str) -> Result<(), SshError>;

    /// Write to the remote stdin
    async fn send(&mut self, data: &[u8]) -> Result<(), SshError>;

    /// Wait for the next event
    async fn recv(&mut self) -> ChannelEvent;

    /// Next event if one is already queued, without waiting
    fn try_recv(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self) -> Result<(), SshError>;
}

/// An established connection to one host
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Channel: SessionChannel + 'static;

    /// Forwarding channel that can carry a nested transport
    type Tunnel: Send + 'static;

    /// Returns false when the server rejected the credentials
    async fn authenticate_password(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<bool, SshError>;

    /// Open a `direct-tcpip` channel to `target`, claiming to originate from
    /// `originator`
    async fn open_direct_tcpip(
        &self,
        target: &Endpoint,
        originator: &Endpoint,
    ) -> Result<Self::Tunnel, SshError>;

    async fn open_session(&self) -> Result<Self::Channel, SshError>;

    async fn close(&mut self) -> Result<(), SshError>;
}

/// Factory for transports
#[async_trait]
pub trait TransportProvider: Send + Sync {
    type Transport: Transport;

    /// Open a TCP connection and complete the SSH handshake
    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<Self::Transport, SshError>;

    /// Complete an SSH handshake over a tunnel opened on another transport
    async fn connect_tunnel(
        &self,
        tunnel: <Self::Transport as Transport>::Tunnel,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<Self::Transport, SshError>;
}
