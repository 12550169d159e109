//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides. The
//! configuration is read once at startup and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::hub::HubConfig;
use crate::watchable::{Kind, Value};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub hub: HubSettings,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Route table; built-in defaults are used when empty
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Watchables registered at startup
    #[serde(default)]
    pub watchables: Vec<WatchableConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory static and streamed files are served from
    #[serde(default = "default_document_root")]
    pub document_root: PathBuf,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Largest accepted request body
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,

    /// Size of each chunk when streaming a file
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_document_root() -> PathBuf {
    PathBuf::from("./public")
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_body() -> usize {
    1024 * 1024 // 1 MB
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64 KB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            document_root: default_document_root(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Live update hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Frames kept per subscribed path for a slow client
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,
}

fn default_max_connections() -> usize {
    1000
}

fn default_queue_capacity() -> usize {
    64
}

fn default_heartbeat() -> u64 {
    15
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            queue_capacity: default_queue_capacity(),
            heartbeat_secs: default_heartbeat(),
        }
    }
}

impl HubSettings {
    pub fn to_hub_config(&self) -> HubConfig {
        HubConfig {
            max_connections: self.max_connections,
            queue_capacity: self.queue_capacity,
            heartbeat: Duration::from_secs(self.heartbeat_secs),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// One entry of the route table
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Path prefix, or for dynamic routes an exact path or `{param}` pattern
    pub path: String,

    #[serde(flatten)]
    pub target: RouteTarget,

    /// Allowed methods; GET and HEAD when empty
    #[serde(default)]
    pub methods: Vec<String>,
}

/// What a route does
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RouteTarget {
    /// Files below `root` (document root when unset), with ETag support
    Static {
        #[serde(default)]
        root: Option<PathBuf>,
    },
    /// Files below `root` streamed in chunks, with byte ranges
    Stream {
        #[serde(default)]
        root: Option<PathBuf>,
    },
    /// A named content generator
    Dynamic { generator: String },
    /// Server-Sent Events following the watchable named by the rest of the path
    Live,
    /// Permanent redirect
    Redirect { location: String },
}

impl RouteConfig {
    pub fn new(path: impl Into<String>, target: RouteTarget) -> Self {
        Self {
            path: path.into(),
            target,
            methods: Vec::new(),
        }
    }
}

/// Route table used when the config file has none
pub fn default_routes() -> Vec<RouteConfig> {
    vec![
        RouteConfig::new(
            "/",
            RouteTarget::Dynamic {
                generator: "index".to_string(),
            },
        ),
        RouteConfig::new(
            "/values.json",
            RouteTarget::Dynamic {
                generator: "values".to_string(),
            },
        ),
        RouteConfig::new("/static", RouteTarget::Static { root: None }),
        RouteConfig::new("/files", RouteTarget::Stream { root: None }),
        RouteConfig::new("/live", RouteTarget::Live),
    ]
}

/// A watchable declared in the config file
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WatchableConfig {
    pub path: String,

    #[serde(flatten)]
    pub kind: Kind,

    /// Initial value; the kind's default when unset
    #[serde(default)]
    pub value: Option<Value>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;
        if config.routes.is_empty() {
            config.routes = default_routes();
        }
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("watchserv").join("config.toml")),
            Some(PathBuf::from("/etc/watchserv/config.toml")),
            Some(PathBuf::from("./watchserv.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("WATCHSERV_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("WATCHSERV_PORT") {
            match port.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid WATCHSERV_PORT"),
            }
        }
        if let Ok(root) = std::env::var("WATCHSERV_DOCUMENT_ROOT") {
            self.server.document_root = PathBuf::from(root);
        }

        if let Ok(level) = std::env::var("WATCHSERV_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("WATCHSERV_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Check values that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.chunk_size == 0 {
            return Err(ConfigError::Invalid("server.chunk_size must be positive".into()));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.request_timeout_secs must be positive".into(),
            ));
        }
        if self.hub.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid("hub.heartbeat_secs must be positive".into()));
        }
        if self.hub.queue_capacity == 0 {
            return Err(ConfigError::Invalid("hub.queue_capacity must be positive".into()));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        for route in &self.routes {
            if !route.path.starts_with('/') {
                return Err(ConfigError::Invalid(format!(
                    "route path '{}' must start with '/'",
                    route.path
                )));
            }
        }
        Ok(())
    }

    /// Route table, falling back to the built-in defaults
    pub fn routes(&self) -> Vec<RouteConfig> {
        if self.routes.is_empty() {
            default_routes()
        } else {
            self.routes.clone()
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A route or watchable could not be set up from its definition
    #[error("Invalid {what} '{path}': {reason}")]
    Definition {
        what: &'static str,
        path: String,
        reason: String,
    },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Watchserv Configuration
#
# Environment variables override these settings:
# - WATCHSERV_HOST
# - WATCHSERV_PORT
# - WATCHSERV_DOCUMENT_ROOT
# - WATCHSERV_LOG_LEVEL
# - WATCHSERV_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8080

# Directory static and streamed files are served from
document_root = "./public"

# Request timeout in seconds (does not apply to live connections)
request_timeout_secs = 30

# Largest accepted request body (bytes)
max_body_bytes = 1048576

# Chunk size when streaming files (bytes)
chunk_size = 65536

[hub]
# Maximum concurrent live connections (SSE + WebSocket)
max_connections = 1000

# Frames kept per path for a slow client; the oldest is dropped first
queue_capacity = 64

# Heartbeat interval for live connections (seconds)
heartbeat_secs = 15

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Route table. Kinds: static, stream, dynamic, live, redirect.
# Prefix routes match on whole path segments, longest prefix wins.
[[routes]]
path = "/"
kind = "dynamic"
generator = "index"

[[routes]]
path = "/values.json"
kind = "dynamic"
generator = "values"

[[routes]]
path = "/static"
kind = "static"

[[routes]]
path = "/files"
kind = "stream"

[[routes]]
path = "/live"
kind = "live"

# [[routes]]
# path = "/old"
# kind = "redirect"
# location = "/"

# Watchables registered at startup. Kinds: int, float, text, bool, choice.
[[watchables]]
path = "/app/counter"
kind = "int"
value = 0

[[watchables]]
path = "/app/mode"
kind = "choice"
options = ["idle", "running", "stopped"]
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.hub.queue_capacity, 64);
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.routes().len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let config = Config::parse(&generate_default_config()).unwrap();
        assert_eq!(config.routes, default_routes());
        assert_eq!(config.watchables.len(), 2);
        assert_eq!(config.watchables[0].kind, Kind::int());
        assert_eq!(config.watchables[0].value, Some(Value::Int(0)));
        assert_eq!(
            config.watchables[1].kind,
            Kind::choice(["idle", "running", "stopped"])
        );
    }

    #[test]
    fn test_route_kinds() {
        let config = Config::parse(
            r#"
            [[routes]]
            path = "/docs"
            kind = "static"
            root = "docs"

            [[routes]]
            path = "/old"
            kind = "redirect"
            location = "/new"

            [[routes]]
            path = "/api/echo"
            kind = "dynamic"
            generator = "echo"
            methods = ["GET", "POST"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.routes[0].target,
            RouteTarget::Static {
                root: Some(PathBuf::from("docs"))
            }
        );
        assert_eq!(
            config.routes[1].target,
            RouteTarget::Redirect {
                location: "/new".to_string()
            }
        );
        assert_eq!(config.routes[2].methods, vec!["GET", "POST"]);
    }

    #[test]
    fn test_float_bounds_accept_integers() {
        let config = Config::parse(
            r#"
            [[watchables]]
            path = "/gain"
            kind = "float"
            min = 0
            max = 1.5
            clamp = true
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.watchables[0].kind,
            Kind::Float { min: Some(m), clamp: true, .. } if m == 0.0
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::parse("[hub]\nheartbeat_secs = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[logging]\nformat = \"xml\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[[routes]]\npath = \"live\"\nkind = \"live\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::parse("[server\nport = 1"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchserv.toml");
        std::fs::write(&path, "[server]\nport = 9999\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");

        let missing = Config::load(&dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
