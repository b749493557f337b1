//! Interactive shell runner for network switches
//!
//! Many switch CLIs ignore `exec` requests and only work through an
//! interactive shell on a PTY. The runner types the command lines blind,
//! ends the session with `quit`, waits until the device has produced
//! output and collects it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::backoff::{FixedBackoff, PollBackoff};
use super::buffer::ChannelReader;
use super::client::RusshProvider;
use super::config::{ConnectOptions, Credentials, Endpoint};
use super::error::{Hop, SshError};
use super::tool::{close_quietly, connect_authenticated};
use super::transport::{SessionChannel, Transport, TransportProvider};

/// Line that ends the shell session, always sent last
const QUIT: &[u8] = b"quit\n";

/// How output is collected once the shell starts answering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// One read of at most `read_limit` bytes as soon as data is ready.
    /// Output arriving later is not seen.
    #[default]
    Single,
    /// Read until the shell closes the channel, up to `read_limit` bytes
    UntilClosed,
}

#[derive(Debug, Clone)]
pub struct SwitchOptions {
    /// Bound on the shell dialogue (writes, polling and the read)
    pub timeout: Duration,
    /// Maximum number of output bytes returned
    pub read_limit: usize,
    pub read_mode: ReadMode,
    /// Delay between readiness polls
    pub backoff: Arc<dyn PollBackoff>,
    pub connect: ConnectOptions,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            read_limit: 10_000,
            read_mode: ReadMode::default(),
            backoff: Arc::new(FixedBackoff::default()),
            connect: ConnectOptions::default(),
        }
    }
}

impl SwitchOptions {
    /// Bound the shell dialogue by `timeout`. The connect timeout is
    /// [`ConnectOptions::timeout_secs`] in `connect`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Run `commands` in an interactive shell on `endpoint`
///
/// `timeout` bounds the shell dialogue; everything else uses
/// [`SwitchOptions::default`]. Connecting is bounded separately by the
/// default [`ConnectOptions`] timeout.
pub async fn run_on_switch<S: AsRef<str>>(
    endpoint: impl Into<Endpoint>,
    credentials: Credentials,
    commands: &[S],
    timeout: Duration,
) -> Result<Vec<u8>, SshError> {
    run_on_switch_with(
        &RusshProvider,
        &endpoint.into(),
        credentials,
        &SwitchOptions::default().with_timeout(timeout),
        commands,
    )
    .await
}

/// Run `commands` in an interactive shell and return the raw output
///
/// `options.timeout` covers writing, polling and reading; connecting and
/// logging in are bounded by `options.connect` instead. The channel and
/// the transport are closed before returning, on success and on every
/// error.
pub async fn run_on_switch_with<P, S>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    options: &SwitchOptions,
    commands: &[S],
) -> Result<Vec<u8>, SshError>
where
    P: TransportProvider,
    S: AsRef<str>,
{
    info!("Running {} command(s) on switch {}", commands.len(), endpoint);

    let mut transport = connect_authenticated(provider, endpoint, credentials, &options.connect)
        .await
        .map_err(|e| e.at_hop(Hop::Direct))?;

    let result = shell_session(&transport, endpoint, options, commands).await;
    close_quietly(&mut transport).await;

    if let Ok(output) = &result {
        debug!("Switch {} returned {} bytes", endpoint, output.len());
    }
    result
}

async fn shell_session<T, S>(
    transport: &T,
    endpoint: &Endpoint,
    options: &SwitchOptions,
    commands: &[S],
) -> Result<Vec<u8>, SshError>
where
    T: Transport,
    S: AsRef<str>,
{
    let channel = transport.open_session().await?;
    let mut reader = ChannelReader::new(channel);

    let result = match tokio::time::timeout(
        options.timeout,
        converse(&mut reader, options, commands),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(SshError::Timeout(format!(
            "Switch {} did not answer within {}s",
            endpoint,
            options.timeout.as_secs()
        ))),
    };

    reader.close().await;
    result
}

async fn converse<C, S>(
    reader: &mut ChannelReader<C>,
    options: &SwitchOptions,
    commands: &[S],
) -> Result<Vec<u8>, SshError>
where
    C: SessionChannel,
    S: AsRef<str>,
{
    let channel = reader.channel_mut();
    channel.request_pty(&options.connect.pty).await?;
    channel.request_shell().await?;

    for line in commands {
        let line = line.as_ref();
        debug!("> {}", line);
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        channel.send(&bytes).await?;
    }
    channel.send(QUIT).await?;

    match options.read_mode {
        ReadMode::Single => {
            wait_until_ready(reader, options.backoff.as_ref()).await;
            Ok(reader.recv(options.read_limit).to_vec())
        }
        ReadMode::UntilClosed => Ok(reader.read_until_closed(options.read_limit).await.to_vec()),
    }
}

/// Poll until output is ready or the channel has ended
async fn wait_until_ready<C: SessionChannel>(
    reader: &mut ChannelReader<C>,
    backoff: &dyn PollBackoff,
) {
    let mut attempt = 0;
    while !reader.recv_ready() && !reader.is_finished() {
        let delay = backoff.delay(attempt);
        debug!("Switch output not ready, polling again in {:?}", delay);
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
