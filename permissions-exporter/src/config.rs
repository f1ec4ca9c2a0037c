//! Exporter configuration.
//!
//! Values are resolved, lowest precedence first, from built-in defaults, a
//! TOML file and `MPE_*` environment variables:
//!
//! ```toml
//! [mysql]
//! mysql_hostname = "localhost"
//! mysql_port = 3306
//! mysql_user = "root"
//! mysql_password = ""
//! mysql_use_socket = false
//! mysql_socket = "/var/lib/mysql/mysql.sock"
//!
//! [webserver]
//! webserver_port = 8000
//! refresh = 5
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use validator::Validate;

use crate::error::{ExporterError, Result};

/// Config file read when none is given explicitly.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mysql_permissions_exporter.toml";

/// Prefix of environment overrides, e.g. `MPE_MYSQL_HOSTNAME`.
pub const ENV_PREFIX: &str = "MPE_";

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct ExporterConfig {
    #[validate(nested)]
    pub mysql: MySqlConfig,

    #[validate(nested)]
    pub webserver: WebServerConfig
}

/// MySQL connection settings.
#[derive(Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct MySqlConfig {
    #[validate(length(min = 1, max = 255))]
    pub mysql_hostname: String,

    #[validate(range(min = 1, max = 65535))]
    pub mysql_port: u16,

    #[validate(length(min = 1, max = 255))]
    pub mysql_user: String,

    pub mysql_password: String,

    /// Connect through [`Self::mysql_socket`] instead of TCP.
    pub mysql_use_socket: bool,

    pub mysql_socket: PathBuf,

    /// Pool size; one connection serves the cycle loop.
    #[validate(range(min = 1, max = 16))]
    pub max_connections: u32,

    #[validate(range(min = 1, max = 300))]
    pub connect_timeout_seconds: u64
}

impl Default for MySqlConfig {
    fn default() -> Self {
        Self {
            mysql_hostname: "localhost".to_string(),
            mysql_port: 3306,
            mysql_user: "root".to_string(),
            mysql_password: String::new(),
            mysql_use_socket: false,
            mysql_socket: PathBuf::from("/var/lib/mysql/mysql.sock"),
            max_connections: 2,
            connect_timeout_seconds: 10
        }
    }
}

impl MySqlConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl fmt::Debug for MySqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MySqlConfig")
            .field("mysql_hostname", &self.mysql_hostname)
            .field("mysql_port", &self.mysql_port)
            .field("mysql_user", &self.mysql_user)
            .field("mysql_password", &"<redacted>")
            .field("mysql_use_socket", &self.mysql_use_socket)
            .field("mysql_socket", &self.mysql_socket)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .finish()
    }
}

/// HTTP endpoint and polling settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(default)]
pub struct WebServerConfig {
    pub listen_address: IpAddr,

    #[validate(range(min = 1, max = 65535))]
    pub webserver_port: u16,

    /// Seconds to sleep between cycles.
    #[validate(range(min = 1, max = 86400))]
    pub refresh: u64
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            webserver_port: 8000,
            refresh: 5
        }
    }
}

impl WebServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.webserver_port)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh)
    }
}

impl ExporterConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ExporterError::Configuration(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ExporterError::Configuration(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml(&contents)
    }

    /// Resolves the configuration for the binary.
    ///
    /// `path` is an explicitly requested file and must exist. Without it,
    /// [`DEFAULT_CONFIG_PATH`] is read if present and defaults are used
    /// otherwise. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_PATH);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    tracing::info!(
                        path = DEFAULT_CONFIG_PATH,
                        "No configuration file, using defaults"
                    );
                    Self::default()
                }
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Applies `MPE_<OPTION>` overrides looked up through `lookup`, then
    /// re-validates.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |option: &str| lookup(&format!("{ENV_PREFIX}{}", option.to_uppercase()));

        if let Some(v) = var("mysql_hostname") {
            self.mysql.mysql_hostname = v;
        }
        if let Some(v) = var("mysql_port") {
            self.mysql.mysql_port = parse_option("mysql_port", &v)?;
        }
        if let Some(v) = var("mysql_user") {
            self.mysql.mysql_user = v;
        }
        if let Some(v) = var("mysql_password") {
            self.mysql.mysql_password = v;
        }
        if let Some(v) = var("mysql_use_socket") {
            self.mysql.mysql_use_socket = parse_bool("mysql_use_socket", &v)?;
        }
        if let Some(v) = var("mysql_socket") {
            self.mysql.mysql_socket = PathBuf::from(v);
        }
        if let Some(v) = var("webserver_port") {
            self.webserver.webserver_port = parse_option("webserver_port", &v)?;
        }
        if let Some(v) = var("listen_address") {
            self.webserver.listen_address = parse_option("listen_address", &v)?;
        }
        if let Some(v) = var("refresh") {
            self.webserver.refresh = parse_option("refresh", &v)?;
        }

        self.validate()?;
        Ok(())
    }
}

fn parse_option<T>(option: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display
{
    value
        .trim()
        .parse()
        .map_err(|e| ExporterError::Configuration(format!("Invalid {option} '{value}': {e}")))
}

fn parse_bool(option: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ExporterError::Configuration(format!(
            "Invalid {option} '{value}': expected a boolean"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = ExporterConfig::default();
        assert_eq!(config.mysql.mysql_hostname, "localhost");
        assert_eq!(config.mysql.mysql_port, 3306);
        assert_eq!(config.mysql.mysql_user, "root");
        assert!(config.mysql.mysql_password.is_empty());
        assert!(!config.mysql.mysql_use_socket);
        assert_eq!(
            config.mysql.mysql_socket,
            PathBuf::from("/var/lib/mysql/mysql.sock")
        );
        assert_eq!(config.webserver.webserver_port, 8000);
        assert_eq!(config.webserver.refresh_interval(), Duration::from_secs(5));
        assert_eq!(
            config.webserver.socket_addr(),
            "0.0.0.0:8000".parse::<SocketAddr>().unwrap()
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ExporterConfig::from_toml(
            r#"
            [mysql]
            mysql_hostname = "db.internal"
            mysql_password = "s3cret"

            [webserver]
            refresh = 30
            "#
        )
        .unwrap();

        assert_eq!(config.mysql.mysql_hostname, "db.internal");
        assert_eq!(config.mysql.mysql_password, "s3cret");
        assert_eq!(config.mysql.mysql_port, 3306);
        assert_eq!(config.webserver.refresh, 30);
        assert_eq!(config.webserver.webserver_port, 8000);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(
            ExporterConfig::from_toml("").unwrap(),
            ExporterConfig::default()
        );
    }

    #[test]
    fn test_invalid_toml_type() {
        let result = ExporterConfig::from_toml("[webserver]\nwebserver_port = \"eight\"\n");
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[test]
    fn test_zero_refresh_rejected() {
        let result = ExporterConfig::from_toml("[webserver]\nrefresh = 0\n");
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[mysql]\nmysql_use_socket = true\nmysql_socket = \"/tmp/mysql.sock\"").unwrap();

        let config = ExporterConfig::from_file(file.path()).unwrap();
        assert!(config.mysql.mysql_use_socket);
        assert_eq!(config.mysql.mysql_socket, PathBuf::from("/tmp/mysql.sock"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let result = ExporterConfig::load(Some(Path::new("/nonexistent/exporter.toml")));
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ExporterConfig::default();
        config
            .apply_overrides(lookup(&[
                ("MPE_MYSQL_HOSTNAME", "replica"),
                ("MPE_MYSQL_PORT", "3307"),
                ("MPE_MYSQL_USE_SOCKET", "True"),
                ("MPE_WEBSERVER_PORT", "9104"),
                ("MPE_REFRESH", "60"),
                ("MPE_LISTEN_ADDRESS", "127.0.0.1"),
            ]))
            .unwrap();

        assert_eq!(config.mysql.mysql_hostname, "replica");
        assert_eq!(config.mysql.mysql_port, 3307);
        assert!(config.mysql.mysql_use_socket);
        assert_eq!(config.webserver.webserver_port, 9104);
        assert_eq!(config.webserver.refresh, 60);
        assert_eq!(
            config.webserver.socket_addr(),
            "127.0.0.1:9104".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_env_override_wins_over_file() {
        let mut config = ExporterConfig::from_toml("[mysql]\nmysql_user = \"exporter\"\n").unwrap();
        config
            .apply_overrides(lookup(&[("MPE_MYSQL_USER", "monitor")]))
            .unwrap();
        assert_eq!(config.mysql.mysql_user, "monitor");
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = ExporterConfig::default();
        let result = config.apply_overrides(lookup(&[("MPE_MYSQL_PORT", "not-a-port")]));
        assert!(matches!(result, Err(ExporterError::Configuration(_))));

        let result = config.apply_overrides(lookup(&[("MPE_MYSQL_USE_SOCKET", "maybe")]));
        assert!(matches!(result, Err(ExporterError::Configuration(_))));

        let result = config.apply_overrides(lookup(&[("MPE_REFRESH", "0")]));
        assert!(matches!(result, Err(ExporterError::Configuration(_))));
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = MySqlConfig {
            mysql_password: "hunter2".to_string(),
            ..MySqlConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
