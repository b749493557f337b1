//! Reusable command runner
//!
//! [`SshTool`] holds one authenticated connection and runs commands on it,
//! one fresh session channel per command. Built with a [`JumpHost`] it owns
//! two transports:
//!
//! ```text
//! SshTool --SSH--> [Jump] --direct-tcpip--> [Target]
//!   jump: outer transport (keeps the tunnel alive)
//!   transport: inner transport (commands run here)
//! ```
//!
//! Closing goes inner first, then outer.

use std::time::Duration;

use tracing::{debug, info};

use super::buffer::ChannelReader;
use super::client::RusshProvider;
use super::config::{ConnectOptions, Credentials, Endpoint, JumpHost};
use super::error::{Hop, SshError};
use super::transport::{SessionChannel, Transport, TransportProvider};

/// Largest single read when draining command output
const READ_CHUNK: usize = 1024;

/// Source address claimed for the `direct-tcpip` tunnel; port 0 lets the
/// jump host pick
const TUNNEL_ORIGINATOR_HOST: &str = "127.0.0.1";

/// Exit code and combined stdout/stderr of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub output: Vec<u8>,
}

impl CommandResult {
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Connect to `endpoint` and log in with `credentials`
pub(crate) async fn connect_authenticated<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    options: &ConnectOptions,
) -> Result<P::Transport, SshError> {
    let transport = provider.connect(endpoint, options).await?;
    login(transport, endpoint, credentials).await
}

/// Log in with `credentials`
///
/// The credentials are dropped as soon as the server has answered. On
/// rejection the half-open transport is closed before returning.
async fn login<T: Transport>(
    mut transport: T,
    endpoint: &Endpoint,
    credentials: Credentials,
) -> Result<T, SshError> {
    let accepted = transport
        .authenticate_password(&credentials.username, credentials.password())
        .await;
    let username = credentials.username.clone();
    drop(credentials);

    match accepted {
        Ok(true) => {
            info!("Authenticated to {} as {}", endpoint, username);
            Ok(transport)
        }
        Ok(false) => {
            close_quietly(&mut transport).await;
            Err(SshError::authentication(format!(
                "Authentication to {} as {} rejected",
                endpoint, username
            )))
        }
        Err(e) => {
            close_quietly(&mut transport).await;
            Err(e)
        }
    }
}

/// Close a transport, logging instead of returning failures
pub(crate) async fn close_quietly<T: Transport>(transport: &mut T) {
    if let Err(e) = transport.close().await {
        debug!("Ignoring transport close error: {}", e);
    }
}

/// A connection that runs commands, directly or through one jump host
pub struct SshTool<P: TransportProvider = RusshProvider> {
    /// Transport commands run on; `None` once closed
    transport: Option<P::Transport>,
    /// Outer transport carrying the tunnel, nested connections only
    jump: Option<P::Transport>,
    target: Endpoint,
}

impl SshTool<RusshProvider> {
    /// Connect straight to `target`
    pub async fn connect(
        target: impl Into<Endpoint>,
        credentials: Credentials,
    ) -> Result<Self, SshError> {
        Self::connect_with(
            &RusshProvider,
            target.into(),
            credentials,
            None,
            &ConnectOptions::default(),
        )
        .await
    }

    /// Connect to `target` through `jump`
    pub async fn connect_via(
        target: impl Into<Endpoint>,
        credentials: Credentials,
        jump: JumpHost,
    ) -> Result<Self, SshError> {
        Self::connect_with(
            &RusshProvider,
            target.into(),
            credentials,
            Some(jump),
            &ConnectOptions::default(),
        )
        .await
    }
}

impl<P: TransportProvider> SshTool<P> {
    /// Connect with an explicit provider and options
    ///
    /// Errors carry the [`Hop`] they happened on: `Direct` without a jump
    /// host, otherwise `Jump` for the jump host and `Tunneled` for the
    /// target. A rejected jump login never reaches the target.
    pub async fn connect_with(
        provider: &P,
        target: Endpoint,
        credentials: Credentials,
        via: Option<JumpHost>,
        options: &ConnectOptions,
    ) -> Result<Self, SshError> {
        let Some(jump) = via else {
            info!("Connecting to {} as {}", target, credentials.username);
            let transport = connect_authenticated(provider, &target, credentials, options)
                .await
                .map_err(|e| e.at_hop(Hop::Direct))?;
            return Ok(Self {
                transport: Some(transport),
                jump: None,
                target,
            });
        };

        info!(
            "Connecting to {}@{} via jump host {}@{}",
            credentials.username, target, jump.credentials.username, jump.endpoint
        );

        let mut outer =
            connect_authenticated(provider, &jump.endpoint, jump.credentials, options)
                .await
                .map_err(|e| e.at_hop(Hop::Jump))?;

        match Self::connect_tunneled(provider, &outer, &target, credentials, options).await {
            Ok(inner) => {
                info!("Target {} reachable through {}", target, jump.endpoint);
                Ok(Self {
                    transport: Some(inner),
                    jump: Some(outer),
                    target,
                })
            }
            Err(e) => {
                close_quietly(&mut outer).await;
                Err(e.at_hop(Hop::Tunneled))
            }
        }
    }

    async fn connect_tunneled(
        provider: &P,
        outer: &P::Transport,
        target: &Endpoint,
        credentials: Credentials,
        options: &ConnectOptions,
    ) -> Result<P::Transport, SshError> {
        let originator = Endpoint::new(TUNNEL_ORIGINATOR_HOST, 0);
        debug!("Opening direct-tcpip tunnel to {}", target);
        let tunnel = outer.open_direct_tcpip(target, &originator).await?;

        let inner = provider.connect_tunnel(tunnel, target, options).await?;
        login(inner, target, credentials).await
    }

    /// Host commands run on
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Whether this tool tunnels through a jump host
    pub fn is_nested(&self) -> bool {
        self.jump.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_none()
    }

    /// Run `command` and return its exit code and combined stdout/stderr
    ///
    /// Waits for the exit status, then sleeps `pause` if given, then drains
    /// whatever output is ready in 1024-byte reads. A non-zero exit code is
    /// a normal result.
    pub async fn run(
        &mut self,
        command: &str,
        pause: Option<Duration>,
    ) -> Result<CommandResult, SshError> {
        let transport = self.transport.as_ref().ok_or(SshError::Closed)?;

        debug!("Executing on {}: {}", self.target, command);

        let channel = transport.open_session().await?;
        let mut reader = ChannelReader::new(channel).combine_stderr(true);

        if let Err(e) = reader.channel_mut().exec(command).await {
            reader.close().await;
            return Err(e);
        }

        let exit_code = reader.recv_exit_status().await;

        if let Some(pause) = pause {
            tokio::time::sleep(pause).await;
        }

        let output = reader.drain_ready(READ_CHUNK);
        reader.close().await;

        debug!(
            "Command on {} exited with {} ({} bytes)",
            self.target,
            exit_code,
            output.len()
        );

        Ok(CommandResult { exit_code, output })
    }

    /// Close the target transport, then the jump transport
    ///
    /// Safe to call more than once; close failures are logged and dropped.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            close_quietly(&mut transport).await;
        }
        if let Some(mut jump) = self.jump.take() {
            close_quietly(&mut jump).await;
        }
    }
}

impl<P: TransportProvider> Drop for SshTool<P> {
    /// Best-effort close when `close` was never called
    ///
    /// Inside a tokio runtime the close runs on a spawned task. Outside one
    /// the handles are simply dropped, which ends their sessions.
    fn drop(&mut self) {
        let transport = self.transport.take();
        let jump = self.jump.take();
        if transport.is_none() && jump.is_none() {
            return;
        }

        debug!("SshTool for {} dropped without close", self.target);

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Some(mut transport) = transport {
                    close_quietly(&mut transport).await;
                }
                if let Some(mut jump) = jump {
                    close_quietly(&mut jump).await;
                }
            });
        }
    }
}
