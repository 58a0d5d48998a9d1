use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::Duration;

use crate::workflows::verification::{LinkPolicy, ServiceSettings, UploadPolicy};

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_ADDRESS_LINK_TTL_HOURS: i64 = 24;
const DEFAULT_DOCUMENT_LINK_TTL_DAYS: i64 = 30;
const DEFAULT_UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_UPLOAD_ALLOWED_TYPES: &str = "image/jpeg,image/png,application/pdf";

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
    pub links: LinkConfig,
    pub uploads: UploadConfig,
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

        let links = LinkConfig {
            public_base_url: env::var("APP_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PUBLIC_BASE_URL.to_string()),
            address_ttl_hours: positive_var(
                "APP_ADDRESS_LINK_TTL_HOURS",
                DEFAULT_ADDRESS_LINK_TTL_HOURS,
            )?,
            document_ttl_days: positive_var(
                "APP_DOCUMENT_LINK_TTL_DAYS",
                DEFAULT_DOCUMENT_LINK_TTL_DAYS,
            )?,
        };

        let allowed_types = env::var("APP_UPLOAD_ALLOWED_TYPES")
            .unwrap_or_else(|_| DEFAULT_UPLOAD_ALLOWED_TYPES.to_string());
        let uploads = UploadConfig {
            max_bytes: positive_var("APP_UPLOAD_MAX_BYTES", DEFAULT_UPLOAD_MAX_BYTES)?,
            allowed_types: parse_mime_list(&allowed_types)?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            links,
            uploads,
        })
    }

    /// Policies handed to the verification service.
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            links: self.links.policy(),
            uploads: self.uploads.policy(),
        }
    }
}

fn positive_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Ok(raw) = env::var(var) else {
        return Ok(default);
    };
    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidNumber { var }),
    }
}

fn parse_mime_list(raw: &str) -> Result<Vec<mime::Mime>, ConfigError> {
    let types = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| {
            value.parse::<mime::Mime>().map_err(|_| ConfigError::InvalidMime {
                value: value.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    if types.is_empty() {
        return Err(ConfigError::InvalidMime {
            value: raw.to_string(),
        });
    }
    Ok(types)
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Candidate link construction and validity windows.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub public_base_url: String,
    pub address_ttl_hours: i64,
    pub document_ttl_days: i64,
}

impl LinkConfig {
    pub fn policy(&self) -> LinkPolicy {
        LinkPolicy::new(
            self.public_base_url.clone(),
            Duration::hours(self.address_ttl_hours),
            Duration::days(self.document_ttl_days),
        )
    }
}

/// Per-file upload limits.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_bytes: u64,
    pub allowed_types: Vec<mime::Mime>,
}

impl UploadConfig {
    pub fn policy(&self) -> UploadPolicy {
        UploadPolicy::new(self.max_bytes, self.allowed_types.clone())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    InvalidMime { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a positive integer")
            }
            ConfigError::InvalidMime { value } => {
                write!(f, "APP_UPLOAD_ALLOWED_TYPES contains an invalid MIME type: '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidMime { .. } => None,
        }
    }
}
