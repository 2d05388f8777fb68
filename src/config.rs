use std::env;
use std::fmt;
use std::net::{Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use ini::{Ini, ParseOption};
use crate::redact;

/// Environment variable the monitoring agent uses to point at its config directory
pub const CONFIG_DIR_ENV: &str = "MK_CONFDIR";

/// File name looked up inside the config directory
pub const CONFIG_FILE_NAME: &str = "teamspeak3.cfg";

/// INI section holding the ServerQuery credentials
pub const SECTION: &str = "serverquery";

/// ServerQuery raw TCP port used when the address carries none
pub const DEFAULT_QUERY_PORT: u16 = 10011;

/// Per-stage network timeout when the file does not set `timeout`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything needed to talk to one ServerQuery endpoint
#[derive(Clone, PartialEq)]
pub struct ServerQueryConfig {
    /// `host:port`
    pub server_address: String,
    pub username: String,
    pub password: String,
    /// Deadline applied to each network stage on its own
    pub timeout: Duration,
}

impl fmt::Debug for ServerQueryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerQueryConfig")
            .field("server_address", &self.server_address)
            .field("username", &redact::login_name(&self.username))
            .field("password", &redact::secret(&self.password))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ServerQueryConfig {
    /// Validate the required fields in reporting order and build the config.
    /// Empty values count as missing.
    pub fn build(
        address: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let address = required(address).ok_or(ConfigError::AddressMissing)?;
        let username = required(user).ok_or(ConfigError::UserMissing)?;
        let password = required(password).ok_or(ConfigError::PasswordMissing)?;

        Ok(Self {
            server_address: normalize_address(address),
            username: username.to_string(),
            password: password.to_string(),
            timeout,
        })
    }
}

fn required(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Fatal configuration problems. Each carries a stable code that ends up in
/// the report body so the monitoring server can tell them apart.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot load {}: {source}", .path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("section [serverquery] not found")]
    SectionMissing,

    #[error("key `address` missing in [serverquery]")]
    AddressMissing,

    #[error("key `user` missing in [serverquery]")]
    UserMissing,

    #[error("key `password` missing in [serverquery]")]
    PasswordMissing,
}

impl ConfigError {
    pub fn code(&self) -> u8 {
        match self {
            ConfigError::FileUnreadable { .. } => 1,
            ConfigError::SectionMissing => 2,
            ConfigError::AddressMissing => 3,
            ConfigError::UserMissing => 4,
            ConfigError::PasswordMissing => 5,
        }
    }
}

/// Source of the ServerQuery configuration
pub trait ConfigProvider {
    fn load(&self) -> Result<ServerQueryConfig, ConfigError>;
}

/// Resolve the configuration once for this run
pub fn resolve<P: ConfigProvider + ?Sized>(provider: &P) -> Result<ServerQueryConfig, ConfigError> {
    let config = provider.load()?;
    debug!("Configuration resolved: {:?}", config);
    Ok(config)
}

/// Reads `<base_dir>/teamspeak3.cfg`
#[derive(Debug, Clone)]
pub struct FileConfig {
    base_dir: PathBuf,
}

impl FileConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Locate the config directory from the process environment
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok(); // Load .env if present, ignore if missing
        Self::from_getter(|key| env::var(key).ok())
    }

    /// Locate the config directory from a custom getter (for testing)
    pub fn from_getter<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = get(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty());
        if base_dir.is_none() {
            warn!("{} not set, looking for {} in the working directory", CONFIG_DIR_ENV, CONFIG_FILE_NAME);
        }
        Self::new(base_dir.unwrap_or_else(|| ".".to_string()))
    }

    pub fn path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Extract the config from an already parsed document
    pub fn from_ini(ini: &Ini) -> Result<ServerQueryConfig, ConfigError> {
        if !ini.iter().any(|(name, _)| name == Some(SECTION)) {
            return Err(ConfigError::SectionMissing);
        }

        ServerQueryConfig::build(
            lookup(ini, "address"),
            lookup(ini, "user"),
            lookup(ini, "password"),
            parse_timeout(lookup(ini, "timeout")),
        )
    }
}

/// How `teamspeak3.cfg` is read: `=` or `:` delimiters, whole-line and
/// whitespace-prefixed inline `;`/`#` comments, quoted values unwrapped.
/// Backslashes stay literal so they survive in passwords.
pub fn parse_options() -> ParseOption {
    ParseOption {
        enabled_escape: false,
        ..ParseOption::default()
    }
}

/// Last value of `key` across every `[serverquery]` block
fn lookup<'a>(ini: &'a Ini, key: &str) -> Option<&'a str> {
    ini.iter()
        .filter(|(name, _)| *name == Some(SECTION))
        .flat_map(|(_, properties)| properties.iter())
        .filter(|(k, _)| *k == key)
        .map(|(_, value)| value)
        .last()
}

impl ConfigProvider for FileConfig {
    fn load(&self) -> Result<ServerQueryConfig, ConfigError> {
        let path = self.path();
        debug!("Loading configuration from {}", path.display());
        let ini = Ini::load_from_file_opt(&path, parse_options())
            .map_err(|source| ConfigError::FileUnreadable { path, source })?;
        Self::from_ini(&ini)
    }
}

/// Fixed credentials, for tests and developer builds
#[derive(Clone)]
pub struct FixedConfig {
    address: String,
    user: String,
    password: String,
    timeout: Duration,
}

impl FixedConfig {
    pub fn new(address: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            user: user.into(),
            password: password.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Credentials baked in at compile time from `TS3CHECK_DEV_ADDRESS`,
    /// `TS3CHECK_DEV_USER` and `TS3CHECK_DEV_PASSWORD`
    #[cfg(feature = "developer")]
    pub fn developer() -> Self {
        Self::new(
            option_env!("TS3CHECK_DEV_ADDRESS").unwrap_or_default(),
            option_env!("TS3CHECK_DEV_USER").unwrap_or_default(),
            option_env!("TS3CHECK_DEV_PASSWORD").unwrap_or_default(),
        )
    }
}

impl ConfigProvider for FixedConfig {
    fn load(&self) -> Result<ServerQueryConfig, ConfigError> {
        ServerQueryConfig::build(
            Some(&self.address),
            Some(&self.user),
            Some(&self.password),
            self.timeout,
        )
    }
}

/// Parse the optional `timeout` key (whole seconds, > 0)
fn parse_timeout(value: Option<&str>) -> Duration {
    let Some(raw) = value else {
        return DEFAULT_TIMEOUT;
    };
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Duration::from_secs(secs),
        _ => {
            warn!(
                "Invalid timeout {:?} in [{}], using {}s",
                raw,
                SECTION,
                DEFAULT_TIMEOUT.as_secs()
            );
            DEFAULT_TIMEOUT
        }
    }
}

/// Append the default ServerQuery port when the address has none.
/// Anything else carrying a port separator is passed through untouched.
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();

    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }

    // Bracketed IPv6 without a port
    if address.starts_with('[') && address.ends_with(']') {
        return format!("{}:{}", address, DEFAULT_QUERY_PORT);
    }

    // Bare IPv6 literal
    if address.parse::<Ipv6Addr>().is_ok() {
        return format!("[{}]:{}", address, DEFAULT_QUERY_PORT);
    }

    if address.contains(':') {
        return address.to_string();
    }
    format!("{}:{}", address, DEFAULT_QUERY_PORT)
}
