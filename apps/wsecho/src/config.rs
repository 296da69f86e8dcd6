//! Server configuration management.
//!
//! Configuration is stored as TOML:
//! - `$WSECHO_CONFIG` when set
//! - Linux: `~/.config/wsecho/server.toml`
//! - Windows: `%APPDATA%/wsecho/server.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsecho_protocol::constants::{DEFAULT_PORT, ECHO_SUFFIX, HANDSHAKE_BUFFER_SIZE};
use wsecho_server::ServerConfig;

/// Environment variable overriding the config file location.
const CONFIG_ENV: &str = "WSECHO_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind.
    #[serde(default = "default_bind")]
    pub bind: IpAddr,

    /// Listening port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bytes accepted in the single receive carrying the upgrade request.
    #[serde(default = "default_handshake_buffer")]
    pub handshake_buffer: usize,

    /// Idle deadline per receive/write in seconds (0 = wait forever).
    #[serde(default)]
    pub idle_timeout_secs: u64,

    /// Suffix appended to every echoed message.
    #[serde(default = "default_echo_suffix")]
    pub echo_suffix: String,
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_handshake_buffer() -> usize {
    HANDSHAKE_BUFFER_SIZE
}

fn default_echo_suffix() -> String {
    ECHO_SUFFIX.into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            handshake_buffer: default_handshake_buffer(),
            idle_timeout_secs: 0,
            echo_suffix: default_echo_suffix(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.handshake_buffer > 0,
            "handshake_buffer must be greater than zero"
        );
        Ok(())
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Converts to the server crate's runtime configuration.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            port: self.port,
            handshake_buffer: self.handshake_buffer,
            idle_timeout: match self.idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }
}

/// Returns the configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("wsecho")
            .join("server.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("wsecho").join("server.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/wsecho/server.toml"))
    }
}
