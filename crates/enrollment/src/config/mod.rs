use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

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
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub callbacks: CallbackConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let base_url = trimmed_url(
            env::var("BACKEND_URL").unwrap_or_else(|_| "http://localhost:3001/api".to_string()),
        );
        let gateway_upstream_url = trimmed_url(
            env::var("GATEWAY_UPSTREAM_URL")
                .unwrap_or_else(|_| "http://localhost:3005/proxy".to_string()),
        );
        let frontend_url = trimmed_url(
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
        );

        let backend = BackendConfig {
            base_url,
            gateway_upstream_url,
            callback_base_url: format!("{frontend_url}/api/callbacks"),
            request_timeout: Duration::from_secs(numeric_var("BACKEND_TIMEOUT_SECS", 10)?),
        };

        let polling = PollingConfig {
            interval: Duration::from_millis(numeric_var("POLL_INTERVAL_MS", 1_000)?),
            query_attempts: numeric_var("POLL_QUERY_ATTEMPTS", 30)?,
            submission_attempts: numeric_var("POLL_SUBMISSION_ATTEMPTS", 60)?,
        };

        let callbacks = CallbackConfig {
            ttl: optional_numeric_var::<u64>("CALLBACK_TTL_SECS")?.map(Duration::from_secs),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            backend,
            polling,
            callbacks,
        })
    }
}

fn trimmed_url(raw: String) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn numeric_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(optional_numeric_var(name)?.unwrap_or(default))
}

fn optional_numeric_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var: name }),
        _ => Ok(None),
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

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the enrollment backend and the gateway upstream live.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub gateway_upstream_url: String,
    /// Advertised to the backend in `x-callback-url` so job results get pushed back to us.
    pub callback_base_url: String,
    pub request_timeout: Duration,
}

/// Tick interval and attempt bounds for job polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub query_attempts: u32,
    pub submission_attempts: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            query_attempts: 30,
            submission_attempts: 60,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallbackConfig {
    /// `None` keeps entries for the life of the process.
    pub ttl: Option<Duration>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "BACKEND_URL",
            "GATEWAY_UPSTREAM_URL",
            "FRONTEND_URL",
            "BACKEND_TIMEOUT_SECS",
            "POLL_INTERVAL_MS",
            "POLL_QUERY_ATTEMPTS",
            "POLL_SUBMISSION_ATTEMPTS",
            "CALLBACK_TTL_SECS",
        ] {
            env::remove_var(var);
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
        assert_eq!(config.backend.base_url, "http://localhost:3001/api");
        assert_eq!(
            config.backend.callback_base_url,
            "http://localhost:3000/api/callbacks"
        );
        assert_eq!(config.polling, PollingConfig::default());
        assert!(config.callbacks.ttl.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
    }

    #[test]
    fn strips_trailing_slash_from_frontend_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("FRONTEND_URL", "https://campus.example.edu/");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.backend.callback_base_url,
            "https://campus.example.edu/api/callbacks"
        );
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_poll_settings() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("POLL_SUBMISSION_ATTEMPTS", "sixty");
        match AppConfig::load() {
            Err(ConfigError::InvalidNumber { var }) => {
                assert_eq!(var, "POLL_SUBMISSION_ATTEMPTS")
            }
            other => panic!("expected invalid number error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn reads_callback_ttl() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("CALLBACK_TTL_SECS", "900");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.callbacks.ttl, Some(Duration::from_secs(900)));
        reset_env();
    }
}
