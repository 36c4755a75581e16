use serde::{Deserialize, Serialize};

use crate::ids::SessionUser;
use crate::models::Coordinates;

/// Main configuration structure loaded from ride_along.toml and environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub geocoding: GeocodingConfig,
    pub session: SessionConfig,
    pub location: LocationConfig,
    /// Runtime configuration loaded from environment variables
    #[serde(skip)]
    pub runtime: RuntimeConfig,
}

/// Backend REST service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_string(),
            timeout_ms: 15_000,
        }
    }
}

/// Refresh cadence for the requests view
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Recurring silent fetch
    pub interval_ms: u64,
    /// One extra fetch shortly after mount to catch just-written backend state
    pub settle_delay_ms: u64,
    /// Delay before an unresolved ride's targeted lookup runs
    pub refetch_defer_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            settle_delay_ms: 2_000,
            refetch_defer_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Identity of the logged-in user, as issued by the session provider
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub user_id: Option<String>,
    pub user_alt_id: Option<String>,
}

/// Fallback position used to prefill pickup coordinates
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LocationConfig {
    pub home_lat: Option<f64>,
    pub home_lng: Option<f64>,
}

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub api_token: Option<String>,
    pub geocoding_api_key: Option<String>,
    pub log_level: String,
    pub log_stderr: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_token: None,
            geocoding_api_key: None,
            log_level: "ride_along=info".to_string(),
            log_stderr: false,
        }
    }
}

impl RuntimeConfig {
    /// Load runtime configuration from environment variables
    pub fn load_from_env() -> Self {
        Self {
            api_token: std::env::var("RIDE_API_TOKEN")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| {
                    // Fallback to ~/.ride_token
                    let home = dirs::home_dir()?;
                    std::fs::read_to_string(home.join(".ride_token"))
                        .ok()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                }),
            geocoding_api_key: std::env::var("GEOCODING_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "ride_along=info".to_string()),
            log_stderr: std::env::var("RIDE_LOG_STDERR")
                .ok()
                .is_some_and(|v| v == "true" || v == "1"),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables
    /// Uses RIDE_CONFIG environment variable or defaults to "ride_along.toml"
    pub fn load() -> anyhow::Result<Self> {
        // Load environment variables with fallbacks:
        // 1) RIDE_ENV_FILE if set
        // 2) ./.env
        // 3) ../.env (repo root when running from a subdirectory)
        if let Ok(env_path) = std::env::var("RIDE_ENV_FILE") {
            let _ = dotenvy::from_path(env_path);
        } else {
            let _ = dotenvy::from_path(".env");
            if std::env::var("RIDE_API_URL").is_err() {
                let _ = dotenvy::from_path("../.env");
            }
        }

        let config_path = std::env::var("RIDE_CONFIG").ok().or_else(|| {
            if std::path::Path::new("ride_along.toml").exists() {
                return Some("ride_along.toml".to_string());
            }
            let user_path = dirs::config_dir()?.join("ride-along").join("config.toml");
            user_path
                .exists()
                .then(|| user_path.to_string_lossy().into_owned())
        });

        let mut config: Config = match config_path {
            Some(path) => match std::fs::read_to_string(&path) {
                Ok(content) => toml::from_str(&content)?,
                Err(e) => {
                    tracing::warn!("Config file {} unreadable ({}), using defaults", path, e);
                    Self::default()
                }
            },
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.runtime = RuntimeConfig::load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Env-first overrides for file-backed settings
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RIDE_API_URL") {
            self.api.base_url = url;
            tracing::debug!("RIDE_API_URL env override applied");
        }
        if let Some(v) = env_parse::<u64>("RIDE_HTTP_TIMEOUT_MS") {
            self.api.timeout_ms = v;
        }
        if let Some(v) = env_parse::<u64>("RIDE_POLL_INTERVAL_MS") {
            self.polling.interval_ms = v;
        }
        if let Some(v) = env_parse::<u64>("RIDE_SETTLE_DELAY_MS") {
            self.polling.settle_delay_ms = v;
        }
        if let Some(v) = env_parse::<u64>("RIDE_REFETCH_DEFER_MS") {
            self.polling.refetch_defer_ms = v;
        }
        if let Ok(url) = std::env::var("RIDE_GEOCODING_URL") {
            self.geocoding.base_url = url;
        }
        if let Ok(id) = std::env::var("RIDE_USER_ID") {
            self.session.user_id = Some(id);
        }
        if let Ok(id) = std::env::var("RIDE_USER_ALT_ID") {
            self.session.user_alt_id = Some(id);
        }
        if let Some(v) = env_parse::<f64>("RIDE_HOME_LAT") {
            self.location.home_lat = Some(v);
        }
        if let Some(v) = env_parse::<f64>("RIDE_HOME_LNG") {
            self.location.home_lng = Some(v);
        }
    }

    /// Validate the configuration, clamping values that are merely out of range
    pub fn validate(&mut self) -> anyhow::Result<()> {
        let url = self.api.base_url.trim().trim_end_matches('/').to_string();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("api.base_url must start with http:// or https://, got '{}'", url);
        }
        self.api.base_url = url;

        if self.api.timeout_ms == 0 {
            tracing::warn!("api.timeout_ms of 0 is not allowed, using 15000");
            self.api.timeout_ms = 15_000;
        }

        if self.polling.interval_ms < 1_000 {
            tracing::warn!(
                "polling.interval_ms {} below 1000, clamping to 1000",
                self.polling.interval_ms
            );
            self.polling.interval_ms = 1_000;
        }
        if self.polling.refetch_defer_ms > 10_000 {
            tracing::warn!(
                "polling.refetch_defer_ms {} exceeds max 10000, clamping",
                self.polling.refetch_defer_ms
            );
            self.polling.refetch_defer_ms = 10_000;
        }

        if self.home().is_none()
            && (self.location.home_lat.is_some() || self.location.home_lng.is_some())
        {
            tracing::warn!("Home location incomplete or out of range, ignoring");
        }

        Ok(())
    }

    pub fn session_user(&self) -> SessionUser {
        let clean = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(crate::ids::EntityId::from)
        };
        SessionUser {
            id: clean(&self.session.user_id),
            alt_id: clean(&self.session.user_alt_id),
        }
    }

    pub fn home(&self) -> Option<Coordinates> {
        Coordinates::new(self.location.home_lat?, self.location.home_lng?)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
