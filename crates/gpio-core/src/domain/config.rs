//! The device configuration record.
//!
//! One [`ConfigurationRecord`] parameterises every transport the bridge runs:
//! the persistent TCP session (regular or companion addressing), the one-shot
//! HTTP notifier, and the local event log.  The record is always replaced as a
//! whole; no component mutates individual fields of a live record.
//!
//! # Example TOML
//!
//! ```toml
//! config_flag = 170
//!
//! [network]
//! address = "10.168.0.177"
//! gateway = "10.168.0.1"
//! mask = "255.255.255.0"
//!
//! [companion]
//! address = "10.168.0.20"
//! port = 9567
//! enabled = true
//!
//! [tcp]
//! address = "0.0.0.0"
//! port = 0
//! enabled = false
//! ```
//!
//! Every field carries a serde default, so a partial file (or an empty one)
//! fills in from [`ConfigurationRecord::default`].

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Value of [`ConfigurationRecord::config_flag`] for a record that was
/// written by this software.  Anything else is treated as uninitialised.
pub const CONFIG_VALID_MARKER: u8 = 0xAA;

/// Longest user, password, or admin password accepted, in bytes.
pub const MAX_CREDENTIAL_LEN: usize = 31;

/// Longest HTTP URL accepted, in bytes.
pub const MAX_URL_LEN: usize = 63;

/// Port the companion controller listens on by default.
pub const DEFAULT_COMPANION_PORT: u16 = 9567;

/// Reasons a record is refused by [`ConfigurationRecord::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("{field} is {len} bytes long; at most {max} bytes are allowed")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("{field} contains a control character")]
    ControlCharacter { field: &'static str },

    #[error("{endpoint} endpoint is enabled but its port is 0")]
    ZeroPort { endpoint: &'static str },

    #[error("{endpoint} endpoint is enabled but its address is unspecified")]
    UnspecifiedAddress { endpoint: &'static str },

    #[error("HTTP URL {url:?} is not usable: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("validity marker {0:#04x} is not {CONFIG_VALID_MARKER:#04x}")]
    InvalidMarker(u8),
}

// ── Schema ────────────────────────────────────────────────────────────────────

/// Complete device configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRecord {
    /// Validity marker; [`CONFIG_VALID_MARKER`] for a usable record.
    #[serde(default = "default_config_flag")]
    pub config_flag: u8,
    #[serde(default)]
    pub network: NetworkIdentity,
    #[serde(default)]
    pub companion: CompanionEndpoint,
    #[serde(default)]
    pub tcp: SessionEndpoint,
    #[serde(default)]
    pub http: HttpEndpoint,
    #[serde(default)]
    pub local_log: LocalLogSettings,
    #[serde(default)]
    pub admin: AdminCredential,
}

/// Address identity of the device itself.  Carried for the network
/// bring-up collaborator; the bridge does not apply it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    #[serde(default = "default_device_address")]
    pub address: Ipv4Addr,
    #[serde(default = "default_gateway")]
    pub gateway: Ipv4Addr,
    #[serde(default = "default_mask")]
    pub mask: Ipv4Addr,
}

/// Companion-mode peer.  When enabled it takes priority over the regular
/// session and suppresses every other transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanionEndpoint {
    #[serde(default = "default_unspecified")]
    pub address: Ipv4Addr,
    #[serde(default = "default_companion_port")]
    pub port: u16,
    #[serde(default)]
    pub enabled: bool,
}

/// Regular persistent-session peer and the credentials forwarded in its
/// event envelopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndpoint {
    #[serde(default = "default_unspecified")]
    pub address: Ipv4Addr,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub enabled: bool,
    /// Carried and persisted; the raw session does not negotiate TLS.
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// One-shot HTTP notification target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpEndpoint {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub enabled: bool,
    /// `true` verifies the server certificate; `false` accepts self-signed.
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLogSettings {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminCredential {
    #[serde(default = "default_admin_password")]
    pub password: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_config_flag() -> u8 {
    CONFIG_VALID_MARKER
}
fn default_device_address() -> Ipv4Addr {
    Ipv4Addr::new(10, 168, 0, 177)
}
fn default_gateway() -> Ipv4Addr {
    Ipv4Addr::new(10, 168, 0, 1)
}
fn default_mask() -> Ipv4Addr {
    Ipv4Addr::new(255, 255, 255, 0)
}
fn default_unspecified() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}
fn default_companion_port() -> u16 {
    DEFAULT_COMPANION_PORT
}
fn default_admin_password() -> String {
    "admin".to_string()
}

impl Default for ConfigurationRecord {
    fn default() -> Self {
        Self {
            config_flag: default_config_flag(),
            network: NetworkIdentity::default(),
            companion: CompanionEndpoint::default(),
            tcp: SessionEndpoint::default(),
            http: HttpEndpoint::default(),
            local_log: LocalLogSettings::default(),
            admin: AdminCredential::default(),
        }
    }
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self {
            address: default_device_address(),
            gateway: default_gateway(),
            mask: default_mask(),
        }
    }
}

impl Default for CompanionEndpoint {
    fn default() -> Self {
        Self {
            address: default_unspecified(),
            port: default_companion_port(),
            enabled: false,
        }
    }
}

impl Default for SessionEndpoint {
    fn default() -> Self {
        Self {
            address: default_unspecified(),
            port: 0,
            enabled: false,
            secure: false,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for HttpEndpoint {
    fn default() -> Self {
        Self {
            url: String::new(),
            enabled: false,
            secure: false,
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for AdminCredential {
    fn default() -> Self {
        Self {
            password: default_admin_password(),
        }
    }
}

// ── Session mode ──────────────────────────────────────────────────────────────

/// Addressing mode of the persistent session, resolved once per (re)start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionMode {
    /// The regular session: events carry the TCP credentials.
    Regular(SocketAddrV4),
    /// The companion session: events carry empty credentials and no other
    /// transport runs.
    Companion(SocketAddrV4),
}

impl SessionMode {
    pub fn target(&self) -> SocketAddrV4 {
        match self {
            SessionMode::Regular(addr) | SessionMode::Companion(addr) => *addr,
        }
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionMode::Regular(_) => "regular",
            SessionMode::Companion(_) => "companion",
        }
    }

    pub fn is_companion(&self) -> bool {
        matches!(self, SessionMode::Companion(_))
    }
}

// ── Record behaviour ──────────────────────────────────────────────────────────

impl ConfigurationRecord {
    /// Resolves which session, if any, should be running.
    ///
    /// Companion mode wins when both companion and regular are enabled.
    /// Returns `None` when neither is enabled.
    pub fn session_mode(&self) -> Option<SessionMode> {
        if self.companion.enabled {
            Some(SessionMode::Companion(SocketAddrV4::new(
                self.companion.address,
                self.companion.port,
            )))
        } else if self.tcp.enabled {
            Some(SessionMode::Regular(SocketAddrV4::new(
                self.tcp.address,
                self.tcp.port,
            )))
        } else {
            None
        }
    }

    /// `true` if the record carries [`CONFIG_VALID_MARKER`].
    pub fn is_valid_marker(&self) -> bool {
        self.config_flag == CONFIG_VALID_MARKER
    }

    /// Compares `candidate` against the stored administrator password.
    pub fn admin_matches(&self, candidate: &str) -> bool {
        let stored = self.admin.password.as_bytes();
        let candidate = candidate.as_bytes();
        if stored.len() != candidate.len() {
            return false;
        }
        stored
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Checks every rule a record must satisfy before it may be applied.
    ///
    /// A record that passes always produces event envelopes within the codec's
    /// size bound: credentials are short and free of control characters, so
    /// their escaped JSON form is at most twice their length.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigValidationError`] found.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.is_valid_marker() {
            return Err(ConfigValidationError::InvalidMarker(self.config_flag));
        }

        check_credential("tcp.user", &self.tcp.user)?;
        check_credential("tcp.password", &self.tcp.password)?;
        check_credential("http.user", &self.http.user)?;
        check_credential("http.password", &self.http.password)?;
        check_credential("admin.password", &self.admin.password)?;

        if self.http.url.len() > MAX_URL_LEN {
            return Err(ConfigValidationError::FieldTooLong {
                field: "http.url",
                len: self.http.url.len(),
                max: MAX_URL_LEN,
            });
        }

        if self.companion.enabled {
            check_endpoint("companion", self.companion.address, self.companion.port)?;
        }
        if self.tcp.enabled {
            check_endpoint("tcp", self.tcp.address, self.tcp.port)?;
        }
        if self.http.enabled {
            check_http_url(&self.http.url)?;
        }
        Ok(())
    }
}

fn check_credential(field: &'static str, value: &str) -> Result<(), ConfigValidationError> {
    if value.len() > MAX_CREDENTIAL_LEN {
        return Err(ConfigValidationError::FieldTooLong {
            field,
            len: value.len(),
            max: MAX_CREDENTIAL_LEN,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ConfigValidationError::ControlCharacter { field });
    }
    Ok(())
}

fn check_endpoint(
    endpoint: &'static str,
    address: Ipv4Addr,
    port: u16,
) -> Result<(), ConfigValidationError> {
    if port == 0 {
        return Err(ConfigValidationError::ZeroPort { endpoint });
    }
    if address.is_unspecified() {
        return Err(ConfigValidationError::UnspecifiedAddress { endpoint });
    }
    Ok(())
}

fn check_http_url(raw: &str) -> Result<(), ConfigValidationError> {
    let invalid = |reason: String| ConfigValidationError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
