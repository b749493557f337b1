//! Blocking facade
//!
//! Same operations as the async API, for callers without a tokio runtime.
//! Each tool (and each one-shot call) owns a current-thread runtime and
//! drives the async code with `block_on`. Must not be called from inside
//! an async context.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::ssh::{
    self, CommandResult, ConnectOptions, Credentials, Endpoint, EscalationSecret, JumpHost,
    RusshProvider, SshError, SwitchOptions, TransportProvider,
};

fn runtime() -> Result<Runtime, SshError> {
    Ok(Builder::new_current_thread().enable_all().build()?)
}

/// Blocking wrapper around [`ssh::SshTool`]
pub struct SshTool<P: TransportProvider = RusshProvider> {
    // Dropped before the runtime that drives it
    inner: ssh::SshTool<P>,
    runtime: Runtime,
}

impl SshTool<RusshProvider> {
    pub fn connect(target: impl Into<Endpoint>, credentials: Credentials) -> Result<Self, SshError> {
        Self::connect_with(
            &RusshProvider,
            target.into(),
            credentials,
            None,
            &ConnectOptions::default(),
        )
    }

    pub fn connect_via(
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
    }
}

impl<P: TransportProvider> SshTool<P> {
    pub fn connect_with(
        provider: &P,
        target: Endpoint,
        credentials: Credentials,
        via: Option<JumpHost>,
        options: &ConnectOptions,
    ) -> Result<Self, SshError> {
        let runtime = runtime()?;
        let inner = runtime.block_on(ssh::SshTool::connect_with(
            provider,
            target,
            credentials,
            via,
            options,
        ))?;
        Ok(Self { inner, runtime })
    }

    /// See [`ssh::SshTool::run`]
    pub fn run(&mut self, command: &str, pause: Option<Duration>) -> Result<CommandResult, SshError> {
        self.runtime.block_on(self.inner.run(command, pause))
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.inner.close());
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn target(&self) -> &Endpoint {
        self.inner.target()
    }
}

impl<P: TransportProvider> Drop for SshTool<P> {
    fn drop(&mut self) {
        if self.inner.is_closed() {
            return;
        }
        // block_on panics inside another runtime; the inner Drop still
        // releases the transports there
        if tokio::runtime::Handle::try_current().is_ok() {
            return;
        }
        self.runtime.block_on(self.inner.close());
    }
}

/// Blocking [`ssh::run_on_switch`]
pub fn run_on_switch<S: AsRef<str>>(
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
}

/// Blocking [`ssh::run_on_switch_with`]
pub fn run_on_switch_with<P, S>(
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
    runtime()?.block_on(ssh::run_on_switch_with(
        provider,
        endpoint,
        credentials,
        options,
        commands,
    ))
}

/// Blocking [`ssh::run_with_privilege`]
pub fn run_with_privilege(
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
}

/// Blocking [`ssh::run_with_privilege_with`]
pub fn run_with_privilege_with<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
    options: &ConnectOptions,
) -> Result<String, SshError> {
    runtime()?.block_on(ssh::run_with_privilege_with(
        provider,
        endpoint,
        credentials,
        command,
        secret,
        options,
    ))
}

/// Blocking [`ssh::run_with_privilege_checked`]
pub fn run_with_privilege_checked(
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
}

/// Blocking [`ssh::run_with_privilege_checked_with`]
pub fn run_with_privilege_checked_with<P: TransportProvider>(
    provider: &P,
    endpoint: &Endpoint,
    credentials: Credentials,
    command: &str,
    secret: Option<EscalationSecret>,
    options: &ConnectOptions,
) -> Result<CommandResult, SshError> {
    runtime()?.block_on(ssh::run_with_privilege_checked_with(
        provider,
        endpoint,
        credentials,
        command,
        secret,
        options,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssh::mock::{MockHost, MockProvider};
    use crate::ssh::transport::ChannelEvent;

    fn host() -> Endpoint {
        Endpoint::new("127.0.0.1", 22)
    }

    fn provider() -> MockProvider {
        MockProvider::new().host(
            host(),
            MockHost::with_password("pass")
                .command(
                    "ls",
                    vec![
                        ChannelEvent::Stdout(b"ok\n".to_vec()),
                        ChannelEvent::ExitStatus(0),
                        ChannelEvent::Closed,
                    ],
                )
                .command(
                    "sudo id -u",
                    vec![
                        ChannelEvent::Stdout(b"0\n".to_vec()),
                        ChannelEvent::ExitStatus(0),
                        ChannelEvent::Closed,
                    ],
                )
                .shell(
                    vec![
                        ChannelEvent::Stdout(b"sw#show clock\n".to_vec()),
                        ChannelEvent::Closed,
                    ],
                    0,
                ),
        )
    }

    #[test]
    fn test_blocking_tool_runs_and_closes_on_drop() {
        let provider = provider();
        let mut tool = SshTool::connect_with(
            &provider,
            host(),
            Credentials::new("tmpuser", "pass"),
            None,
            &ConnectOptions::default(),
        )
        .unwrap();

        let result = tool.run("ls", None).unwrap();
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.output, b"ok\n");

        drop(tool);
        assert_eq!(provider.log().last().unwrap(), "close 127.0.0.1:22");
    }

    #[test]
    fn test_blocking_close_then_run() {
        let provider = provider();
        let mut tool = SshTool::connect_with(
            &provider,
            host(),
            Credentials::new("tmpuser", "pass"),
            None,
            &ConnectOptions::default(),
        )
        .unwrap();

        tool.close();
        tool.close();
        assert!(tool.is_closed());
        assert!(matches!(tool.run("ls", None), Err(SshError::Closed)));
    }

    #[test]
    fn test_blocking_one_shot_runners() {
        let provider = provider();

        let output = run_on_switch_with(
            &provider,
            &host(),
            Credentials::new("tmpuser", "pass"),
            &SwitchOptions::default(),
            &["show clock"],
        )
        .unwrap();
        assert_eq!(output, b"sw#show clock\n");

        let output = run_with_privilege_with(
            &provider,
            &host(),
            Credentials::new("tmpuser", "pass"),
            "sudo id -u",
            Some(EscalationSecret::new("pass")),
            &ConnectOptions::default(),
        )
        .unwrap();
        assert_eq!(output, "0\n");

        let result = run_with_privilege_checked_with(
            &provider,
            &host(),
            Credentials::new("tmpuser", "pass"),
            "sudo id -u",
            Some(EscalationSecret::new("pass")),
            &ConnectOptions::default(),
        )
        .unwrap();
        assert!(result.is_success());
    }
}
