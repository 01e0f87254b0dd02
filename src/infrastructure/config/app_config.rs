//! Application configuration.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::args::CliArgs;
use super::loader::ConfigError;
use crate::application::services::MimePolicy;
use crate::application::use_cases::GatewayConfig;
use crate::infrastructure::xmpp::SessionConfig;

pub(crate) const APP_NAME: &str = "xavatar";
pub(crate) const APP_QUALIFIER: &str = "org";
pub(crate) const APP_ORGANIZATION: &str = "xavatar";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Shared secret of the component handshake, wiped on drop and masked
/// when printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ComponentSecret(String);

impl ComponentSecret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ComponentSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("\"\"")
        } else {
            f.write_str("\"********\"")
        }
    }
}

/// Service configuration, from the TOML file with CLI and environment
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Address of this component on the XMPP network.
    #[serde(default)]
    pub jid: String,

    #[serde(default)]
    pub password: ComponentSecret,

    /// XMPP server accepting component connections.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Avatar cache directory.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Assume `image/png` when a vCard photo has no TYPE.
    #[serde(default)]
    pub guess_type: bool,

    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    #[serde(default = "default_reply_timeout_secs")]
    pub reply_timeout_secs: u64,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Log file path. Logs go to stderr only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    5347
}

fn default_directory() -> PathBuf {
    PathBuf::from("data")
}

fn default_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8032))
}

const fn default_max_age_secs() -> u64 {
    24 * 60 * 60
}

const fn default_reply_timeout_secs() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

const fn default_max_reconnect_attempts() -> u32 {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            jid: String::new(),
            password: ComponentSecret::default(),
            host: default_host(),
            port: default_port(),
            directory: default_directory(),
            guess_type: false,
            listen: default_listen(),
            max_age_secs: default_max_age_secs(),
            reply_timeout_secs: default_reply_timeout_secs(),
            log_level: LogLevel::Info,
            log_path: None,
            auto_reconnect: true,
            max_reconnect_attempts: default_max_reconnect_attempts(),
        }
    }
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: CliArgs) {
        if let Some(config_path) = args.config {
            self.config = Some(config_path);
        }
        if let Some(jid) = args.jid {
            self.jid = jid;
        }
        if let Some(password) = args.password {
            self.password = ComponentSecret::new(password);
        }
        if let Some(host) = args.host {
            self.host = host;
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(directory) = args.directory {
            self.directory = directory;
        }
        if let Some(guess_type) = args.guess_type {
            self.guess_type = guess_type;
        }
        if let Some(listen) = args.listen {
            self.listen = listen;
        }
        if let Some(max_age_secs) = args.max_age_secs {
            self.max_age_secs = max_age_secs;
        }
        if let Some(reply_timeout_secs) = args.reply_timeout_secs {
            self.reply_timeout_secs = reply_timeout_secs;
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(log_path) = args.log_path {
            self.log_path = Some(log_path);
        }
        if let Some(auto_reconnect) = args.auto_reconnect {
            self.auto_reconnect = auto_reconnect;
        }
        if let Some(attempts) = args.max_reconnect_attempts {
            self.max_reconnect_attempts = attempts;
        }
    }

    /// Checks the settings the service cannot start without.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jid.trim().is_empty() {
            return Err(ConfigError::invalid("jid", "must not be empty"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::invalid("password", "must not be empty"));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must not be zero"));
        }
        if self.max_age_secs == 0 {
            return Err(ConfigError::invalid("max_age_secs", "must not be zero"));
        }
        if self.reply_timeout_secs == 0 {
            return Err(ConfigError::invalid("reply_timeout_secs", "must not be zero"));
        }
        Ok(())
    }

    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default()
            .with_max_age(self.max_age())
            .with_reply_timeout(self.reply_timeout())
            .with_mime_policy(MimePolicy::from_guess_type(self.guess_type))
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_auto_reconnect(self.auto_reconnect)
            .with_max_reconnect_attempts(self.max_reconnect_attempts)
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }
}
