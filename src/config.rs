use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::delivery::providers::GOOGLE_GEOCODE_URL;
use crate::delivery::{AddressCache, FileCacheStore, JsonTenantStore};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Colored log output is only wanted on a developer's terminal.
    pub fn ansi_logs(self) -> bool {
        self == Self::Development
    }
}

/// Top-level configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub geocoding: GeocodingConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_var("APP_PORT", 3000u16)?;
        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let geocoding = GeocodingConfig {
            api_key: env::var("GEOCODING_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: env::var("GEOCODING_BASE_URL").unwrap_or_else(|_| GOOGLE_GEOCODE_URL.to_string()),
            timeout: Duration::from_secs(parse_var("GEOCODING_TIMEOUT_SECS", 10u64)?),
        };

        let cache = CacheConfig {
            ttl_days: parse_var("ADDRESS_CACHE_TTL_DAYS", AddressCache::DEFAULT_TTL_DAYS)?,
            path: env::var("ADDRESS_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| FileCacheStore::default_path()),
        };

        let storage = StorageConfig {
            tenant_data_path: env::var("TENANT_DATA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| JsonTenantStore::default_path()),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                ansi: environment.ansi_logs(),
            },
            geocoding,
            cache,
            storage,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub ansi: bool,
}

#[derive(Debug, Clone)]
pub struct GeocodingConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl_days: u32,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub tenant_data_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
    #[error("APP_HOST must parse to an IPv4 or IPv6 address")]
    InvalidHost {
        #[source]
        source: std::net::AddrParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "GEOCODING_API_KEY",
            "GEOCODING_BASE_URL",
            "GEOCODING_TIMEOUT_SECS",
            "ADDRESS_CACHE_TTL_DAYS",
            "ADDRESS_CACHE_PATH",
            "TENANT_DATA_PATH",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert!(config.telemetry.ansi);
        assert_eq!(config.geocoding.base_url, GOOGLE_GEOCODE_URL);
        assert_eq!(config.geocoding.timeout, Duration::from_secs(10));
        assert_eq!(config.cache.ttl_days, 30);
        assert!(config.cache.path.ends_with("address_cache.json"));
        assert!(config.storage.tenant_data_path.ends_with("tenants.json"));
    }

    #[test]
    fn reads_overrides() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_ENV", "production");
        env::set_var("ADDRESS_CACHE_TTL_DAYS", "7");
        env::set_var("GEOCODING_API_KEY", "secret");
        env::set_var("TENANT_DATA_PATH", "/tmp/tenants.json");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.environment, AppEnvironment::Production);
        assert!(!config.telemetry.ansi);
        assert_eq!(config.cache.ttl_days, 7);
        assert_eq!(config.geocoding.api_key.as_deref(), Some("secret"));
        assert_eq!(config.storage.tenant_data_path, PathBuf::from("/tmp/tenants.json"));
        reset_env();
    }

    #[test]
    fn environment_names() {
        assert_eq!(AppEnvironment::from_str(" PROD "), AppEnvironment::Production);
        assert_eq!(AppEnvironment::from_str("ci"), AppEnvironment::Test);
        assert_eq!(AppEnvironment::from_str("staging"), AppEnvironment::Development);
        assert!(!AppEnvironment::Test.ansi_logs());
    }

    #[test]
    fn rejects_bad_port() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_PORT", "eighty");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber { name: "APP_PORT", .. })
        ));
        reset_env();
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }
}
