// SPDX-License-Identifier: MIT

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::error;

const DEFAULT_PORT: u16 = 4700;
const DEFAULT_MAX_CONNECTIONS: usize = 64;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_COMPACTION_MARGIN: f64 = 0.05;
const DEFAULT_CACHE_EXPIRATION_SECS: u64 = 300;

/// Protocol versions this server speaks, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["0.2.0", "0.1.0"];

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// WebSocket server port (default: 4700).
    port: Option<u16>,
    /// Maximum concurrent client connections (default: 64).
    max_connections: Option<usize>,
    /// Close connections idle longer than this many seconds (default: 300).
    idle_timeout_secs: Option<u64>,
    /// Response cache size limit in bytes. Omit for an unbounded cache.
    cache_size_limit: Option<u64>,
    /// Fraction of the cache freed past the limit on capacity eviction,
    /// 0.0–1.0 (default: 0.05).
    compaction_margin: Option<f64>,
    /// Default absolute expiration for cache entries, seconds (default: 300).
    cache_expiration_secs: Option<u64>,
    /// Protocol versions to advertise, newest first.
    protocol_versions: Option<Vec<String>>,
    /// Log level filter string, e.g. "debug", "info,flowd=trace" (default: "info").
    log: Option<String>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── ServerConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Accepts past this limit are rejected immediately.
    pub max_connections: usize,
    /// Connections idle past this are closed with reason "idle".
    pub idle_timeout: Duration,
    /// `None` means the response cache is unbounded.
    pub cache_size_limit: Option<u64>,
    pub compaction_margin: f64,
    pub cache_default_expiration: Duration,
    /// Newest first; the negotiator picks from these.
    pub protocol_versions: Vec<String>,
}

impl ServerConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        max_connections: Option<usize>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());
        let max_connections = max_connections
            .or(toml.max_connections)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        let idle_timeout = Duration::from_secs(
            toml.idle_timeout_secs
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
        );
        let compaction_margin = toml
            .compaction_margin
            .unwrap_or(DEFAULT_COMPACTION_MARGIN)
            .clamp(0.0, 1.0);
        let cache_default_expiration = Duration::from_secs(
            toml.cache_expiration_secs
                .unwrap_or(DEFAULT_CACHE_EXPIRATION_SECS),
        );
        let protocol_versions = toml
            .protocol_versions
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| {
                SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|v| v.to_string())
                    .collect()
            });

        Self {
            port,
            data_dir,
            log,
            max_connections,
            idle_timeout,
            cache_size_limit: toml.cache_size_limit,
            compaction_margin,
            cache_default_expiration,
            protocol_versions,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(".flowd"),
            log: "info".to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            cache_size_limit: None,
            compaction_margin: DEFAULT_COMPACTION_MARGIN,
            cache_default_expiration: Duration::from_secs(DEFAULT_CACHE_EXPIRATION_SECS),
            protocol_versions: SUPPORTED_PROTOCOL_VERSIONS
                .iter()
                .map(|v| v.to_string())
                .collect(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("flowd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("flowd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("flowd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("flowd");
        }
    }
    PathBuf::from(".flowd")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_connections, 64);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(300));
        assert!((cfg.compaction_margin - 0.05).abs() < 1e-9);
        assert_eq!(cfg.protocol_versions, vec!["0.2.0", "0.1.0"]);
    }

    #[test]
    fn toml_layer_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 9000\nmax_connections = 2\ncompaction_margin = 0.1\nprotocol_versions = [\"0.1.0\"]\n",
        )
        .unwrap();
        let cfg = ServerConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_connections, 2);
        assert!((cfg.compaction_margin - 0.1).abs() < 1e-9);
        assert_eq!(cfg.protocol_versions, vec!["0.1.0"]);
    }

    #[test]
    fn cli_beats_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = 9000\n").unwrap();
        let cfg = ServerConfig::new(Some(7000), Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 7000);
    }

    #[test]
    fn margin_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "compaction_margin = 3.5\n").unwrap();
        let cfg = ServerConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert!(cfg.compaction_margin <= 1.0);
    }
}
