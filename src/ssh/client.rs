//! SSH Client implementation using russh
//!
//! Nested connections use the same trick as OpenSSH's ProxyJump:
//! ```text
//! Client --SSH--> [Jump] --direct-tcpip--> [Target]
//! ```
//! The `direct-tcpip` channel is wrapped as a `ChannelStream` and handed to
//! `russh::client::connect_stream()`, so the inner SSH session rides inside
//! the outer one.

use std::borrow::Cow;
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use russh::client::{self, Handle, Msg};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key::HashAlg;
use russh::keys::PublicKey;
use russh::{compression, Channel, ChannelMsg, Disconnect, Preferred};
use tracing::{debug, info, warn};

use super::config::{ConnectOptions, Endpoint, HostKeyPolicy, PtyConfig};
use super::error::SshError;
use super::transport::{ChannelEvent, SessionChannel, Transport, TransportProvider};

/// Compression preference when [`ConnectOptions::compression`] is set
const COMPRESSION_PREFERRED: &[compression::Name] = &[
    compression::ZLIB_LEGACY,
    compression::ZLIB,
    compression::NONE,
];

/// Transport provider backed by russh
#[derive(Debug, Clone, Copy, Default)]
pub struct RusshProvider;

impl RusshProvider {
    pub fn new() -> Self {
        Self
    }

    fn client_config(options: &ConnectOptions) -> Arc<client::Config> {
        let mut config = client::Config {
            inactivity_timeout: options.inactivity_timeout_secs.map(Duration::from_secs),
            keepalive_interval: options.keepalive_interval_secs.map(Duration::from_secs),
            keepalive_max: 3,
            ..Default::default()
        };

        if options.compression {
            config.preferred = Preferred {
                compression: Cow::Borrowed(COMPRESSION_PREFERRED),
                ..Preferred::default()
            };
        }

        Arc::new(config)
    }
}

/// A transport failure while authenticating is a connection problem, not a
/// rejected password
fn auth_exchange_error(endpoint: &Endpoint, err: russh::Error) -> SshError {
    SshError::connection(format!(
        "{}: connection lost during authentication: {}",
        endpoint, err
    ))
}

/// Turn a handshake failure into a connection error, keeping host key
/// rejections intact
fn handshake_error(err: SshError, addr: &str) -> SshError {
    match err {
        SshError::HostKeyRejected { .. } => err,
        other => SshError::connection(format!("{}: {}", addr, other)),
    }
}

#[async_trait]
impl TransportProvider for RusshProvider {
    type Transport = RusshTransport;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<RusshTransport, SshError> {
        let addr = endpoint.address();

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| SshError::connection(format!("Failed to resolve {}: {}", addr, e)))?
            .next()
            .ok_or_else(|| SshError::connection(format!("No address found for {}", addr)))?;

        info!("Connecting to SSH server at {}", addr);

        let handler = ClientHandler::new(endpoint.clone(), options.host_key_policy.clone());

        let handle = tokio::time::timeout(
            options.timeout(),
            client::connect(Self::client_config(options), socket_addr, handler),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} timed out", addr)))?
        .map_err(|e| handshake_error(e, &addr))?;

        debug!("SSH handshake with {} completed", addr);

        Ok(RusshTransport::new(handle, endpoint.clone()))
    }

    async fn connect_tunnel(
        &self,
        tunnel: Channel<Msg>,
        endpoint: &Endpoint,
        options: &ConnectOptions,
    ) -> Result<RusshTransport, SshError> {
        let addr = endpoint.address();

        info!("Connecting via stream to {} (SSH-over-SSH)", addr);

        let handler = ClientHandler::new(endpoint.clone(), options.host_key_policy.clone());

        let handle = tokio::time::timeout(
            options.timeout(),
            client::connect_stream(Self::client_config(options), tunnel.into_stream(), handler),
        )
        .await
        .map_err(|_| SshError::Timeout(format!("Connection to {} via stream timed out", addr)))?
        .map_err(|e| handshake_error(e, &addr))?;

        debug!("SSH handshake via stream with {} completed", addr);

        Ok(RusshTransport::new(handle, endpoint.clone()))
    }
}

/// One russh client connection
pub struct RusshTransport {
    handle: Handle<ClientHandler>,
    endpoint: Endpoint,
    closed: bool,
}

impl RusshTransport {
    fn new(handle: Handle<ClientHandler>, endpoint: Endpoint) -> Self {
        Self {
            handle,
            endpoint,
            closed: false,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for RusshTransport {
    type Channel = RusshChannel;
    type Tunnel = Channel<Msg>;

    async fn authenticate_password(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<bool, SshError> {
        debug!("Authenticating to {} as {} with password", self.endpoint, username);

        let result = self
            .handle
            .authenticate_password(username, password)
            .await
            .map_err(|e| auth_exchange_error(&self.endpoint, e))?;

        Ok(result.success())
    }

    async fn open_direct_tcpip(
        &self,
        target: &Endpoint,
        originator: &Endpoint,
    ) -> Result<Channel<Msg>, SshError> {
        self.handle
            .channel_open_direct_tcpip(
                target.host.as_str(),
                target.port as u32,
                originator.host.as_str(),
                originator.port as u32,
            )
            .await
            .map_err(|e| {
                SshError::channel(format!(
                    "Failed to open tunnel from {} to {}: {}",
                    self.endpoint, target, e
                ))
            })
    }

    async fn open_session(&self) -> Result<RusshChannel, SshError> {
        if self.closed {
            return Err(SshError::Closed);
        }

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::channel(format!("Failed to open session: {}", e)))?;

        Ok(RusshChannel { channel })
    }

    async fn close(&mut self) -> Result<(), SshError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        debug!("Disconnecting from {}", self.endpoint);
        self.handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(SshError::from)
    }
}

/// Map russh channel messages onto the events the runners care about
fn translate(msg: ChannelMsg) -> Option<ChannelEvent> {
    match msg {
        ChannelMsg::Data { data } => Some(ChannelEvent::Stdout(data.to_vec())),
        ChannelMsg::ExtendedData { data, ext: 1 } => Some(ChannelEvent::Stderr(data.to_vec())),
        ChannelMsg::ExitStatus { exit_status } => Some(ChannelEvent::ExitStatus(exit_status)),
        ChannelMsg::ExitSignal { signal_name, .. } => {
            Some(ChannelEvent::ExitSignal(format!("{:?}", signal_name)))
        }
        ChannelMsg::Eof => Some(ChannelEvent::Eof),
        ChannelMsg::Close => Some(ChannelEvent::Closed),
        _ => None,
    }
}

/// russh session channel
pub struct RusshChannel {
    channel: Channel<Msg>,
}

#[async_trait]
impl SessionChannel for RusshChannel {
    async fn request_pty(&mut self, pty: &PtyConfig) -> Result<(), SshError> {
        self.channel
            .request_pty(false, &pty.term, pty.cols, pty.rows, 0, 0, &[])
            .await
            .map_err(|e| SshError::channel(format!("PTY request failed: {}", e)))
    }

    async fn request_shell(&mut self) -> Result<(), SshError> {
        self.channel
            .request_shell(false)
            .await
            .map_err(|e| SshError::channel(format!("Shell request failed: {}", e)))
    }

    async fn exec(&mut self, command: &str) -> Result<(), SshError> {
        self.channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::channel(format!("Exec request failed: {}", e)))
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.channel
            .data(data)
            .await
            .map_err(|e| SshError::channel(format!("Failed to send data: {}", e)))
    }

    async fn recv(&mut self) -> ChannelEvent {
        loop {
            match self.channel.wait().await {
                Some(msg) => {
                    if let Some(event) = translate(msg) {
                        return event;
                    }
                }
                None => return ChannelEvent::Closed,
            }
        }
    }

    fn try_recv(&mut self) -> Option<ChannelEvent> {
        loop {
            match self.channel.wait().now_or_never() {
                Some(Some(msg)) => {
                    if let Some(event) = translate(msg) {
                        return Some(event);
                    }
                }
                Some(None) => return Some(ChannelEvent::Closed),
                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), SshError> {
        self.channel
            .close()
            .await
            .map_err(|e| SshError::channel(e.to_string()))
    }
}

/// Client handler for russh callbacks
///
/// Only host key verification is handled here.
pub struct ClientHandler {
    endpoint: Endpoint,
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(endpoint: Endpoint, policy: HostKeyPolicy) -> Self {
        Self { endpoint, policy }
    }

    fn rejected(&self, reason: String) -> SshError {
        SshError::HostKeyRejected {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            reason,
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);
        let host = self.endpoint.host.as_str();
        let port = self.endpoint.port;

        match &self.policy {
            HostKeyPolicy::AutoAccept => {
                debug!("Accepting host key for {}:{} ({})", host, port, fingerprint);
                Ok(true)
            }
            HostKeyPolicy::KnownHosts { path, accept_new } => {
                let known = match path {
                    Some(path) => check_known_hosts_path(host, port, server_public_key, path),
                    None => check_known_hosts(host, port, server_public_key),
                };

                match known {
                    Ok(true) => {
                        info!("Host key verified for {}:{}", host, port);
                        Ok(true)
                    }
                    Ok(false) if *accept_new => {
                        info!(
                            "New host {}:{}, adding to known_hosts (fingerprint: {})",
                            host, port, fingerprint
                        );
                        let learned = match path {
                            Some(path) => {
                                learn_known_hosts_path(host, port, server_public_key, path)
                            }
                            None => learn_known_hosts(host, port, server_public_key),
                        };
                        if let Err(e) = learned {
                            warn!("Failed to save host key: {}", e);
                        }
                        Ok(true)
                    }
                    Ok(false) => {
                        warn!(
                            "Unknown host key for {}:{} (fingerprint: {}), rejecting",
                            host, port, fingerprint
                        );
                        Err(self.rejected(format!("unknown host key {}", fingerprint)))
                    }
                    Err(e) => {
                        warn!(
                            "HOST KEY MISMATCH for {}:{} (fingerprint: {}): {}",
                            host, port, fingerprint, e
                        );
                        Err(self.rejected(format!(
                            "key {} does not match known_hosts: {}",
                            fingerprint, e
                        )))
                    }
                }
            }
        }
    }
}
