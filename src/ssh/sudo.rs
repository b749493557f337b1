//! Privileged command runner
//!
//! Runs one command on a PTY and answers the sudo password prompt by
//! writing the escalation secret to stdin right after `exec`. sudo reads
//! the password from the terminal, so the PTY is required.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::buffer::{ChannelReader, EXIT_STATUS_UNKNOWN};
use super::client::RusshProvider;
use super::config::{ConnectOptions, Credentials, Endpoint, EscalationSecret};
use super::error::{Hop, SshError};
use super::tool::{close_quietly, connect_authenticated, CommandResult};
use super::transport::{SessionChannel, Transport, TransportProvider};

/// Messages sudo prints when it refuses the password
pub const SUDO_FAILURE_PATTERNS: &[&str] = &[
    "sorry, try again",
    "incorrect password",
    "authentication failure",
    "sudo: 3 incorrect password attempts",
    "sudo: no password was provided",
    "is not in the sudoers file",
];

/// Check whether `text` contains a sudo authentication failure message
pub fn looks_like_sudo_failure(text: &str) -> bool {
    let lower = text.to_lowercase();
    SUDO_FAILURE_PATTERNS
        .iter()
        .any(|pattern| lower.contains(pattern))
}

struct Exchange {
    stdout: Bytes,
    stderr: Bytes,
    exit_code: Option<i32>,
}

impl Exchange {
    /// stderr when there is any, stdout otherwise
    fn output(&self) -> &[u8] {
        if self.stderr.is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run `command` with the default provider and options
pub async fn run_with_privilege(
    endpoint: impl Into<Endpoint>,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
) -> Result<String, SshError> {
    run_with_privilege_with(
        &RusshProvider,
        &endpoint.into(),
        credentials,
        command,
        secret,
        &ConnectOptions::default(),
    )
    .await
}

/// Run `command` on a PTY, feeding `secret` to the password prompt
///
/// Returns stderr if the command wrote any, stdout otherwise. The exit
/// status is not looked at; use [`run_with_privilege_checked_with`] for
/// that.
pub async fn run_with_privilege_with<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
    options: &ConnectOptions,
) -> Result<String, SshError> {
    let exchange = privileged(provider, endpoint, credentials, command, secret, options, false)
        .await?;
    let output = String::from_utf8_lossy(exchange.output()).into_owned();

    if looks_like_sudo_failure(&output) {
        warn!("sudo on {} appears to have rejected the password", endpoint);
    }
    Ok(output)
}

/// Run `command` with the default provider and options, checking the result
pub async fn run_with_privilege_checked(
    endpoint: impl Into<Endpoint>,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
) -> Result<CommandResult, SshError> {
    run_with_privilege_checked_with(
        &RusshProvider,
        &endpoint.into(),
        credentials,
        command,
        secret,
        &ConnectOptions::default(),
    )
    .await
}

/// Like [`run_with_privilege_with`], but a non-zero exit status or any
/// stderr output is an error
pub async fn run_with_privilege_checked_with<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
    options: &ConnectOptions,
) -> Result<CommandResult, SshError> {
    let exchange = privileged(provider, endpoint, credentials, command, secret, options, true)
        .await?;
    let exit_code = exchange.exit_code.unwrap_or(EXIT_STATUS_UNKNOWN);

    if exit_code != 0 || !exchange.stderr.is_empty() {
        return Err(SshError::PrivilegedCommandFailed {
            exit_code,
            output: String::from_utf8_lossy(exchange.output()).into_owned(),
        });
    }

    Ok(CommandResult {
        exit_code,
        output: exchange.stdout.to_vec(),
    })
}

async fn privileged<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
    options: &ConnectOptions,
    wait_for_exit: bool,
) -> Result<Exchange, SshError> {
    info!("Running privileged command on {}", endpoint);

    let mut transport = connect_authenticated(provider, endpoint, credentials, options)
        .await
        .map_err(|e| e.at_hop(Hop::Direct))?;

    let secret = secret.unwrap_or_default();
    let result = exchange(&transport, command, &secret, options, wait_for_exit).await;
    close_quietly(&mut transport).await;
    result
}

async fn exchange<T: Transport>(
    transport: &T,
    command: &str,
    secret: &EscalationSecret,
    options: &ConnectOptions,
    wait_for_exit: bool,
) -> Result<Exchange, SshError> {
    let channel = transport.open_session().await?;
    let mut reader = ChannelReader::new(channel);

    let result = talk(&mut reader, command, secret, options, wait_for_exit).await;
    reader.close().await;
    result
}

async fn talk<C: SessionChannel>(
    reader: &mut ChannelReader<C>,
    command: &str,
    secret: &EscalationSecret,
    options: &ConnectOptions,
    wait_for_exit: bool,
) -> Result<Exchange, SshError> {
    let channel = reader.channel_mut();
    channel.request_pty(&options.pty).await?;
    channel.exec(command).await?;
    channel.send(&secret.with_newline()).await?;

    let (stdout, stderr) = reader.read_to_end().await;
    let exit_code = if wait_for_exit {
        Some(reader.recv_exit_status().await)
    } else {
        reader.exit_status()
    };

    debug!(
        "Privileged command finished: {} bytes stdout, {} bytes stderr, exit {:?}",
        stdout.len(),
        stderr.len(),
        exit_code
    );

    Ok(Exchange {
        stdout,
        stderr,
        exit_code,
    })
}
