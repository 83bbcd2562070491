//! Server configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use imapd_wire::connection::MAX_COMMAND_SIZE;
use serde::Deserialize;
use thiserror::Error;

/// Default listen port (unprivileged stand-in for 143), bound on loopback.
pub const DEFAULT_PORT: u16 = 1143;

/// RFC 3501 autologout timer minimum.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How long a new connection may take to open with a TLS handshake
/// before the server greets it in cleartext.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_millis(300);

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "IMAPD_CONFIG";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Certificate and key locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsConfig {
    /// PEM certificate chain.
    pub cert_path: PathBuf,
    /// PEM private key.
    pub key_path: PathBuf,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// TLS material; `None` serves cleartext only.
    pub tls: Option<TlsConfig>,
    /// Text of the `* OK` greeting.
    pub greeting: String,
    /// Autologout timer.
    pub idle_timeout: Duration,
    /// Window for sniffing an implicit-TLS client before greeting.
    pub detect_timeout: Duration,
    /// Whether LOGIN is accepted before TLS is active.
    pub allow_plaintext_login: bool,
    /// Cap on one command line, literal payloads included.
    pub max_command_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Loads configuration from a JSON file, or defaults if `path` is
    /// `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses configuration from JSON text. Absent fields keep defaults.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let file: ConfigFile = serde_json::from_str(raw)?;
        Ok(file.into_builder().build())
    }

    /// Returns true if TLS is configured.
    #[must_use]
    pub const fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// On-disk form. Durations are whole seconds or milliseconds.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    listen: Option<SocketAddr>,
    tls: Option<TlsConfig>,
    greeting: Option<String>,
    idle_timeout_secs: Option<u64>,
    detect_timeout_ms: Option<u64>,
    allow_plaintext_login: Option<bool>,
    max_command_size: Option<usize>,
}

impl ConfigFile {
    fn into_builder(self) -> ConfigBuilder {
        let mut builder = ConfigBuilder::new();
        if let Some(listen) = self.listen {
            builder = builder.listen(listen);
        }
        if let Some(tls) = self.tls {
            builder = builder.tls(tls.cert_path, tls.key_path);
        }
        if let Some(greeting) = self.greeting {
            builder = builder.greeting(greeting);
        }
        if let Some(secs) = self.idle_timeout_secs {
            builder = builder.idle_timeout(Duration::from_secs(secs));
        }
        if let Some(ms) = self.detect_timeout_ms {
            builder = builder.detect_timeout(Duration::from_millis(ms));
        }
        if let Some(allow) = self.allow_plaintext_login {
            builder = builder.allow_plaintext_login(allow);
        }
        if let Some(limit) = self.max_command_size {
            builder = builder.max_command_size(limit);
        }
        builder
    }
}

/// Builder for server configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    listen: SocketAddr,
    tls: Option<TlsConfig>,
    greeting: String,
    idle_timeout: Duration,
    detect_timeout: Duration,
    allow_plaintext_login: bool,
    max_command_size: usize,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            tls: None,
            greeting: "imapd ready".to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
            allow_plaintext_login: false,
            max_command_size: MAX_COMMAND_SIZE,
        }
    }

    /// Sets the listen address.
    #[must_use]
    pub const fn listen(mut self, addr: SocketAddr) -> Self {
        self.listen = addr;
        self
    }

    /// Enables TLS with the given PEM files.
    #[must_use]
    pub fn tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// Sets the greeting text.
    #[must_use]
    pub fn greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = greeting.into();
        self
    }

    /// Sets the autologout timer.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the implicit-TLS sniffing window.
    #[must_use]
    pub const fn detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    /// Allows LOGIN before TLS.
    #[must_use]
    pub const fn allow_plaintext_login(mut self, allow: bool) -> Self {
        self.allow_plaintext_login = allow;
        self
    }

    /// Sets the cap on one command line, literal payloads included.
    #[must_use]
    pub const fn max_command_size(mut self, limit: usize) -> Self {
        self.max_command_size = limit;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        Config {
            listen: self.listen,
            tls: self.tls,
            greeting: self.greeting,
            idle_timeout: self.idle_timeout,
            detect_timeout: self.detect_timeout,
            allow_plaintext_login: self.allow_plaintext_login,
            max_command_size: self.max_command_size,
        }
    }
}
