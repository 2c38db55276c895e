use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
    time::Duration,
};
use tracing::{info, warn};

/// Runtime mode for the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    Development,
    Production,
    Qa,
    Local,
    Test,
}

impl RuntimeMode {
    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

impl std::fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Qa => write!(f, "qa"),
            Self::Local => write!(f, "local"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl std::str::FromStr for RuntimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "qa" => Ok(Self::Qa),
            "local" => Ok(Self::Local),
            "test" => Ok(Self::Test),
            _ => Err(format!(
                "Invalid runtime mode: {s}. Valid values: development, production, qa, local, test"
            )),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub mode: RuntimeMode,
    pub server: ServerConfig,
    pub limits: RequestLimits,
    pub rate_limiting: RateLimitingConfig,
    pub cors: CorsConfig,
    pub security: SecurityMonitoringConfig,
    pub metrics: MetricsEndpointConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub service_name: String,
}

/// Caps applied to every inbound request
#[derive(Debug, Clone)]
pub struct RequestLimits {
    pub json_body_limit: usize,
    pub urlencoded_body_limit: usize,
    pub parameter_limit: usize,
    pub request_timeout: Duration,
}

/// One fixed window: at most `max_requests` per client IP per `window`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRule {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone)]
pub struct RateLimitingConfig {
    pub api: RateLimitRule,
    pub auth: RateLimitRule,
    pub password_reset: RateLimitRule,
    /// Path prefixes treated as authentication endpoints
    pub auth_paths: Vec<String>,
    /// Path prefixes treated as password reset endpoints
    pub password_reset_paths: Vec<String>,
    /// Path prefixes never throttled
    pub exempt_paths: Vec<String>,
    /// Count requests per forwarded client IP instead of per socket address.
    /// Only safe behind a proxy that overwrites `X-Forwarded-For`.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub max_age: Duration,
}

#[derive(Debug, Clone)]
pub struct SecurityMonitoringConfig {
    pub log_security_events: bool,
    /// Query strings longer than this are reported as suspicious
    pub suspicious_query_length: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsEndpointConfig {
    pub path: String,
}

const DEFAULT_PORT: u16 = 5001;
const DEFAULT_SERVICE_NAME: &str = "APP_SERVICE";
const DEFAULT_JSON_LIMIT: usize = 10 * 1024 * 1024;
const DEFAULT_URLENCODED_LIMIT: usize = 1024 * 1024;
const DEFAULT_PARAMETER_LIMIT: usize = 1000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const FIFTEEN_MINUTES: u64 = 15 * 60;
const ONE_HOUR: u64 = 60 * 60;
const DEV_ORIGINS: [&str; 3] =
    ["http://localhost:5001", "http://localhost:3001", "http://localhost:5173"];

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// Never fails: each key is validated on its own and an invalid or missing
    /// value is replaced by its default with a warning.
    pub fn load() -> Self {
        let source = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(false))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to read environment, using defaults");
                config::Config::default()
            });

        Self::from_source(&source)
    }

    /// Build configuration from an already assembled source
    pub fn from_source(source: &config::Config) -> Self {
        let env = EnvReader { source };

        let mode = env.parse("run_mode", RuntimeMode::Development);
        let default_api_max = if mode.is_production() { 100 } else { 1000 };

        let allowed_origins = match env.string("allowed_origins") {
            Some(raw) => split_list(&raw),
            None if mode.is_production() => Vec::new(),
            None => DEV_ORIGINS.iter().map(ToString::to_string).collect(),
        };

        let metrics_path = env.string("metrics_path").unwrap_or_else(|| "/metrics".to_string());

        let config = Self {
            mode,
            server: ServerConfig {
                host: env.parse("host", IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
                port: env.parse("port", DEFAULT_PORT),
                service_name: env
                    .string("service_name")
                    .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            },
            limits: RequestLimits {
                json_body_limit: env.positive("max_json_size", DEFAULT_JSON_LIMIT),
                urlencoded_body_limit: env.positive("max_urlencoded_size", DEFAULT_URLENCODED_LIMIT),
                parameter_limit: env.positive("max_parameters", DEFAULT_PARAMETER_LIMIT),
                request_timeout: Duration::from_millis(
                    env.positive("request_timeout", DEFAULT_TIMEOUT_MS),
                ),
            },
            rate_limiting: RateLimitingConfig {
                api: RateLimitRule {
                    window: Duration::from_secs(
                        env.positive("rate_limit_window_secs", FIFTEEN_MINUTES),
                    ),
                    max_requests: env.positive("rate_limit_max", default_api_max),
                },
                auth: RateLimitRule {
                    window: Duration::from_secs(
                        env.positive("auth_rate_limit_window_secs", FIFTEEN_MINUTES),
                    ),
                    max_requests: env.positive("auth_rate_limit_max", 5),
                },
                password_reset: RateLimitRule {
                    window: Duration::from_secs(
                        env.positive("password_reset_rate_limit_window_secs", ONE_HOUR),
                    ),
                    max_requests: env.positive("password_reset_rate_limit_max", 3),
                },
                auth_paths: env
                    .string("auth_rate_limit_paths")
                    .map_or_else(|| vec!["/api/auth".to_string()], |raw| split_list(&raw)),
                password_reset_paths: env.string("password_reset_rate_limit_paths").map_or_else(
                    || vec!["/api/auth/password-reset".to_string()],
                    |raw| split_list(&raw),
                ),
                exempt_paths: vec![metrics_path.clone()],
                trust_proxy: env.parse("trust_proxy", false),
            },
            cors: CorsConfig { allowed_origins, max_age: Duration::from_secs(86_400) },
            security: SecurityMonitoringConfig {
                log_security_events: env.parse("log_security_events", true),
                suspicious_query_length: env.positive("suspicious_query_length", 10_000),
            },
            metrics: MetricsEndpointConfig { path: metrics_path },
        };

        info!(
            mode = %config.mode,
            port = config.server.port,
            service = %config.server.service_name,
            "Configuration loaded"
        );

        config
    }

    /// Defaults for the given mode, ignoring the environment
    pub fn defaults_for(mode: RuntimeMode) -> Self {
        let source = config::Config::builder()
            .set_override("run_mode", mode.to_string())
            .and_then(|builder| builder.build())
            .unwrap_or_default();
        Self::from_source(&source)
    }
}

impl ServerConfig {
    /// Get the socket address for binding
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Reads single keys, cleaning and validating each one independently
struct EnvReader<'a> {
    source: &'a config::Config,
}

impl EnvReader<'_> {
    /// Raw value with surrounding quotes and whitespace removed; blank counts as unset
    fn string(&self, key: &str) -> Option<String> {
        let raw = self.source.get_string(key).ok()?;
        let cleaned = clean_value(&raw);
        (!cleaned.is_empty()).then_some(cleaned)
    }

    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Display,
    {
        let Some(raw) = self.string(key) else {
            return default;
        };

        raw.parse().unwrap_or_else(|_| {
            warn!(
                key = %key.to_uppercase(),
                value = %raw,
                default = %default,
                "Invalid environment value, using default"
            );
            default
        })
    }

    /// Like `parse`, but zero counts as invalid. A zero window, cap or timeout
    /// would silently switch off the guard it configures.
    fn positive<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + Display + Default + PartialOrd + Copy,
    {
        let value = self.parse(key, default);
        if value > T::default() {
            return value;
        }

        warn!(
            key = %key.to_uppercase(),
            value = %value,
            default = %default,
            "Value must be positive, using default"
        );
        default
    }
}

fn clean_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(['"', '\'']).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed);
    trimmed.trim().to_string()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect()
}
