use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 4800;
const DEFAULT_PRUNE_DAYS: u32 = 90;
const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── NotifyConfig ─────────────────────────────────────────────────────────────

/// Outbound notification configuration (`[notify]` in config.toml).
///
/// The daemon always broadcasts workflow events to connected clients; the
/// webhook sink is optional and fire-and-forget.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// POST every workflow event as JSON to this URL. None = disabled.
    pub webhook_url: Option<String>,
    /// Per-request timeout for webhook deliveries (seconds). Default: 5.
    pub webhook_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_timeout_secs: 5,
        }
    }
}

// ─── ObservabilityConfig ─────────────────────────────────────────────────────

/// Daemon observability configuration (`[observability]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log SQLite queries that exceed this threshold (milliseconds). Default: 100.
    /// Set to 0 to disable slow query logging.
    pub slow_query_threshold_ms: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            slow_query_threshold_ms: 100,
        }
    }
}

// ─── TomlConfig (file layer) ──────────────────────────────────────────────────

/// Optional `{data_dir}/config.toml` overrides. Every field falls back to the
/// CLI flag / env var / built-in default when absent.
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    /// WebSocket server port (default: 4800).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,nexusd=trace" (default: "info").
    log: Option<String>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Days of expired auth tokens / stale messages kept before pruning
    /// (default: 90; 0 = never).
    prune_days: Option<u32>,
    /// Lifetime of issued bearer tokens in hours (default: 72).
    token_ttl_hours: Option<i64>,
    /// Notification configuration (`[notify]`).
    notify: Option<NotifyConfig>,
    /// Observability configuration (`[observability]`).
    observability: Option<ObservabilityConfig>,
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

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

/// Resolved daemon configuration.
///
/// Priority per field: CLI flag > env var > config.toml > default.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// Bind address for the WebSocket server (NEXUSD_BIND env var).
    pub bind_address: String,
    /// How many days before expired tokens and swept records are pruned (0 = never).
    pub prune_days: u32,
    /// Lifetime of issued bearer tokens, in hours.
    pub token_ttl_hours: i64,
    /// Outbound notification settings.
    pub notify: NotifyConfig,
    /// Observability: slow query threshold.
    pub observability: ObservabilityConfig,
}

impl DaemonConfig {
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("NEXUSD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let prune_days = toml.prune_days.unwrap_or(DEFAULT_PRUNE_DAYS);
        let token_ttl_hours = toml.token_ttl_hours.unwrap_or(DEFAULT_TOKEN_TTL_HOURS);

        let notify = toml.notify.unwrap_or_default();
        let observability = toml.observability.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            bind_address,
            prune_days,
            token_ttl_hours,
            notify,
            observability,
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
                .join("nexusd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            if !xdg.is_empty() {
                return PathBuf::from(xdg).join("nexusd");
            }
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("nexusd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("nexusd");
        }
    }
    PathBuf::from(".nexusd")
}
