use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `DCO_CONSOLE__` and an optional TOML config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub dco: DcoConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub serving: ServingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_node_id() -> String {
    "node-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            dco: DcoConfig::default(),
            analytics: AnalyticsConfig::default(),
            serving: ServingConfig::default(),
        }
    }
}

// ─── DCO Config ─────────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct DcoConfig {
    /// Upper bound on combinations a single generate() may materialize.
    #[serde(default = "default_generation_cap")]
    pub generation_cap: u64,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    /// A generation lease older than this is treated as abandoned.
    #[serde(default = "default_generation_lease_ttl_secs")]
    pub generation_lease_ttl_secs: u64,
    /// Signals targetable in rules beyond the built-in catalog.
    #[serde(default)]
    pub extra_signals: Vec<String>,
}

fn default_generation_cap() -> u64 { 1000 }
fn default_preview_limit() -> usize { 50 }
fn default_generation_lease_ttl_secs() -> u64 { 300 }

impl Default for DcoConfig {
    fn default() -> Self {
        Self {
            generation_cap: default_generation_cap(),
            preview_limit: default_preview_limit(),
            generation_lease_ttl_secs: default_generation_lease_ttl_secs(),
            extra_signals: Vec::new(),
        }
    }
}

// ─── Analytics Config ───────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// JSON-lines file handed to the aggregator; `None` logs batches instead.
    #[serde(default)]
    pub output_path: Option<String>,
}

fn default_channel_capacity() -> usize { 100_000 }
fn default_batch_size() -> usize { 1000 }
fn default_flush_interval_ms() -> u64 { 1000 }

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            output_path: None,
        }
    }
}

// ─── Serving Config ─────────────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    #[serde(default = "default_click_base_path")]
    pub click_base_path: String,
}

fn default_click_base_path() -> String { "/api/analytics/click".to_string() }

impl Default for ServingConfig {
    fn default() -> Self {
        Self {
            click_base_path: default_click_base_path(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("DCO_CONSOLE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("dco.extra_signals"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}
