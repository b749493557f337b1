//! Scripted transport provider for tests
//!
//! Every call is appended to a shared log so tests can assert on ordering.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::{ConnectOptions, Endpoint, PtyConfig};
use super::error::SshError;
use super::transport::{ChannelEvent, SessionChannel, Transport, TransportProvider};

/// Behaviour of one fake host
#[derive(Clone, Default)]
pub struct MockHost {
    pub password: String,
    pub unreachable: bool,
    pub refuse_tunnel: bool,
    /// Drop the connection while authenticating
    pub auth_drops: bool,
    /// command -> events delivered after `exec`
    pub commands: HashMap<String, Vec<ChannelEvent>>,
    /// events delivered after `request_shell`
    pub shell: Vec<ChannelEvent>,
    /// `try_recv` calls answered with "nothing yet" before shell output shows
    pub shell_delay_polls: usize,
}

impl MockHost {
    pub fn with_password(password: &str) -> Self {
        Self {
            password: password.to_string(),
            ..Default::default()
        }
    }

    pub fn command(mut self, command: &str, events: Vec<ChannelEvent>) -> Self {
        self.commands.insert(command.to_string(), events);
        self
    }

    pub fn shell(mut self, events: Vec<ChannelEvent>, delay_polls: usize) -> Self {
        self.shell = events;
        self.shell_delay_polls = delay_polls;
        self
    }
}

#[derive(Default)]
struct MockState {
    hosts: HashMap<Endpoint, MockHost>,
    log: Vec<String>,
    stdin: Vec<u8>,
}

#[derive(Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(self, endpoint: impl Into<Endpoint>, host: MockHost) -> Self {
        self.state.lock().hosts.insert(endpoint.into(), host);
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.state.lock().log.clone()
    }

    /// Everything written to any channel's stdin
    pub fn stdin(&self) -> Vec<u8> {
        self.state.lock().stdin.clone()
    }

    fn record(&self, entry: String) {
        self.state.lock().log.push(entry);
    }

    fn transport(&self, endpoint: &Endpoint) -> MockTransport {
        MockTransport {
            endpoint: endpoint.clone(),
            state: self.state.clone(),
            authenticated: false,
        }
    }
}

#[async_trait]
impl TransportProvider for MockProvider {
    type Transport = MockTransport;

    async fn connect(
        &self,
        endpoint: &Endpoint,
        _options: &ConnectOptions,
    ) -> Result<MockTransport, SshError> {
        self.record(format!("connect {}", endpoint));
        let reachable = self
            .state
            .lock()
            .hosts
            .get(endpoint)
            .map(|h| !h.unreachable)
            .unwrap_or(false);
        if !reachable {
            return Err(SshError::connection(format!("{}: connection refused", endpoint)));
        }
        Ok(self.transport(endpoint))
    }

    async fn connect_tunnel(
        &self,
        tunnel: MockTunnel,
        endpoint: &Endpoint,
        _options: &ConnectOptions,
    ) -> Result<MockTransport, SshError> {
        self.record(format!("connect_tunnel {} via {}", endpoint, tunnel.via));
        if &tunnel.target != endpoint {
            return Err(SshError::connection("tunnel leads elsewhere"));
        }
        if !self.state.lock().hosts.contains_key(endpoint) {
            return Err(SshError::connection(format!("{}: no route", endpoint)));
        }
        Ok(self.transport(endpoint))
    }
}

pub struct MockTunnel {
    via: Endpoint,
    target: Endpoint,
}

pub struct MockTransport {
    endpoint: Endpoint,
    state: Arc<Mutex<MockState>>,
    authenticated: bool,
}

impl MockTransport {
    fn record(&self, entry: String) {
        self.state.lock().log.push(entry);
    }

    fn host(&self) -> MockHost {
        self.state
            .lock()
            .hosts
            .get(&self.endpoint)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Channel = MockChannel;
    type Tunnel = MockTunnel;

    async fn authenticate_password(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<bool, SshError> {
        self.record(format!("auth {} {}", self.endpoint, username));
        if self.host().auth_drops {
            return Err(SshError::connection(format!(
                "{}: connection reset during authentication",
                self.endpoint
            )));
        }
        self.authenticated = self.host().password == password;
        Ok(self.authenticated)
    }

    async fn open_direct_tcpip(
        &self,
        target: &Endpoint,
        originator: &Endpoint,
    ) -> Result<MockTunnel, SshError> {
        self.record(format!(
            "direct-tcpip {} -> {} from {}",
            self.endpoint, target, originator
        ));
        if !self.authenticated || self.host().refuse_tunnel {
            return Err(SshError::channel("administratively prohibited"));
        }
        Ok(MockTunnel {
            via: self.endpoint.clone(),
            target: target.clone(),
        })
    }

    async fn open_session(&self) -> Result<MockChannel, SshError> {
        self.record(format!("open_session {}", self.endpoint));
        if !self.authenticated {
            return Err(SshError::channel("not authenticated"));
        }
        Ok(MockChannel {
            events: VecDeque::new(),
            pending_polls: 0,
            host: Some(self.host()),
            state: self.state.clone(),
        })
    }

    async fn close(&mut self) -> Result<(), SshError> {
        self.record(format!("close {}", self.endpoint));
        Ok(())
    }
}

pub struct MockChannel {
    events: VecDeque<ChannelEvent>,
    pending_polls: usize,
    host: Option<MockHost>,
    state: Arc<Mutex<MockState>>,
}

impl MockChannel {
    /// Standalone channel replaying `events`
    pub fn scripted(events: Vec<ChannelEvent>) -> Self {
        Self {
            events: events.into(),
            pending_polls: 0,
            host: None,
            state: Arc::default(),
        }
    }

    fn record(&self, entry: String) {
        self.state.lock().log.push(entry);
    }
}

#[async_trait]
impl SessionChannel for MockChannel {
    async fn request_pty(&mut self, pty: &PtyConfig) -> Result<(), SshError> {
        self.record(format!("pty {} {}x{}", pty.term, pty.cols, pty.rows));
        Ok(())
    }

    async fn request_shell(&mut self) -> Result<(), SshError> {
        self.record("shell".to_string());
        if let Some(host) = &self.host {
            self.events = host.shell.clone().into();
            self.pending_polls = host.shell_delay_polls;
        }
        Ok(())
    }

    async fn exec(&mut self, command: &str) -> Result<(), SshError> {
        self.record(format!("exec {}", command));
        if let Some(host) = &self.host {
            self.events = match host.commands.get(command) {
                Some(events) => events.clone().into(),
                None => vec![
                    ChannelEvent::Stderr(format!("{}: command not found\n", command).into_bytes()),
                    ChannelEvent::ExitStatus(127),
                    ChannelEvent::Eof,
                    ChannelEvent::Closed,
                ]
                .into(),
            };
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<(), SshError> {
        self.state.lock().stdin.extend_from_slice(data);
        Ok(())
    }

    async fn recv(&mut self) -> ChannelEvent {
        self.events.pop_front().unwrap_or(ChannelEvent::Closed)
    }

    fn try_recv(&mut self) -> Option<ChannelEvent> {
        if self.pending_polls > 0 {
            self.pending_polls -= 1;
            return None;
        }
        self.events.pop_front()
    }

    async fn close(&mut self) -> Result<(), SshError> {
        self.record("close_channel".to_string());
        Ok(())
    }
}
