//! SSH Configuration

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Host and port of an SSH service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used for address resolution
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address())
    }
}

impl From<(&str, u16)> for Endpoint {
    fn from((host, port): (&str, u16)) -> Self {
        Self::new(host, port)
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// Accepts `host`, `host:port` and `[v6addr]:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty endpoint".to_string());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("Unterminated IPv6 address: {}", s))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, s)?,
                None if tail.is_empty() => default_port(),
                None => return Err(format!("Unexpected text after address: {}", s)),
            };
            return Ok(Self::new(host, port));
        }

        match s.rsplit_once(':') {
            // more than one colon without brackets: bare IPv6 address
            Some((host, _)) if host.contains(':') => Ok(Self::new(s, default_port())),
            Some((host, port)) if !host.is_empty() => Ok(Self::new(host, parse_port(port, s)?)),
            Some(_) => Err(format!("Missing host: {}", s)),
            None => Ok(Self::new(s, default_port())),
        }
    }
}

fn parse_port(port: &str, whole: &str) -> Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("Invalid port in {}", whole))
}

/// Username and password for one hop
///
/// The password lives in a zeroizing buffer and is handed to the
/// authentication call by value.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Intermediate host a nested connection tunnels through
#[derive(Debug, Clone)]
pub struct JumpHost {
    pub endpoint: Endpoint,
    pub credentials: Credentials,
}

impl JumpHost {
    pub fn new(endpoint: impl Into<Endpoint>, credentials: Credentials) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
        }
    }
}

/// Password written to a privileged command's stdin
#[derive(Clone, Default)]
pub struct EscalationSecret(Zeroizing<String>);

impl EscalationSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Secret followed by the newline that submits it
    pub fn with_newline(&self) -> Zeroizing<Vec<u8>> {
        let mut bytes = self.0.as_bytes().to_vec();
        bytes.push(b'\n');
        Zeroizing::new(bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for EscalationSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EscalationSecret([REDACTED])")
    }
}

/// How server host keys are checked
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept any key, only log its fingerprint
    #[default]
    AutoAccept,

    /// Verify against an OpenSSH known_hosts file
    KnownHosts {
        /// Defaults to ~/.ssh/known_hosts
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
        /// Record unknown hosts instead of rejecting them. Changed keys are
        /// always rejected.
        #[serde(default)]
        accept_new: bool,
    },
}

/// Pseudo-terminal parameters for shell and privileged sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtyConfig {
    #[serde(default = "default_term")]
    pub term: String,
    #[serde(default = "default_cols")]
    pub cols: u32,
    #[serde(default = "default_rows")]
    pub rows: u32,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            term: default_term(),
            cols: default_cols(),
            rows: default_rows(),
        }
    }
}

/// Transport-level options shared by every runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Connect/handshake timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Drop the transport after this many idle seconds. Unset means a
    /// long-running command can keep the connection quiet indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout_secs: Option<u64>,

    /// Prefer zlib compression
    #[serde(default = "default_compression")]
    pub compression: bool,

    /// Send keepalives at this interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keepalive_interval_secs: Option<u64>,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    #[serde(default)]
    pub pty: PtyConfig,
}

impl ConnectOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            inactivity_timeout_secs: None,
            compression: default_compression(),
            keepalive_interval_secs: None,
            host_key_policy: HostKeyPolicy::default(),
            pty: PtyConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    30
}

fn default_compression() -> bool {
    true
}

fn default_term() -> String {
    "vt100".to_string()
}

fn default_cols() -> u32 {
    80
}

fn default_rows() -> u32 {
    24
}
