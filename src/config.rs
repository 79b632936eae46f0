use clap::{Args, Parser, ValueEnum};
use ipnetwork::IpNetwork;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub rate_limit: RateLimitConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub mail: MailConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,

    #[command(flatten)]
    pub health: HealthConfig,
}

#[derive(Clone, Debug, Args)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[arg(long = "database-url", env = "PARLEY_DATABASE_URL")]
    pub url: String,

    /// Maximum number of pooled connections
    #[arg(long, env = "PARLEY_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Minimum number of idle connections kept open
    #[arg(long, env = "PARLEY_DB_MIN_CONNECTIONS", default_value_t = 2)]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[arg(long, env = "PARLEY_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "PARLEY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PARLEY_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Port for the management (health) listener
    #[arg(long, env = "PARLEY_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Seconds to wait for in-flight work during shutdown
    #[arg(long, env = "PARLEY_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,

    /// Per-request timeout for HTTP handlers
    #[arg(long, env = "PARLEY_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Origin of the web client, allowed for credentialed CORS requests
    #[arg(long, env = "PARLEY_CLIENT_URL")]
    pub client_url: Option<String>,

    /// Comma-separated list of CIDRs to trust for X-Forwarded-For IP extraction
    #[arg(
        long,
        env = "PARLEY_TRUSTED_PROXIES",
        default_value = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32",
        value_delimiter = ','
    )]
    pub trusted_proxies: Vec<IpNetwork>,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret key for JWT signing
    #[arg(long, env = "PARLEY_JWT_SECRET")]
    pub jwt_secret: String,

    /// Session token time-to-live in days
    #[arg(long, env = "PARLEY_SESSION_TTL_DAYS", default_value_t = 7)]
    pub session_ttl_days: i64,

    /// Mark the session cookie as Secure (HTTPS only)
    #[arg(long, env = "PARLEY_COOKIE_SECURE", default_value_t = false)]
    pub cookie_secure: bool,

    /// Lifetime of email verification tokens in seconds
    #[arg(long, env = "PARLEY_VERIFICATION_TOKEN_TTL_SECS", default_value_t = 86_400)]
    pub verification_token_ttl_secs: i64,

    /// Lifetime of password reset tokens in seconds
    #[arg(long, env = "PARLEY_RESET_TOKEN_TTL_SECS", default_value_t = 3_600)]
    pub reset_token_ttl_secs: i64,

    /// OAuth client id that Google ID tokens must be issued for
    #[arg(long, env = "PARLEY_GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,
}

#[derive(Clone, Debug, Args)]
pub struct RateLimitConfig {
    /// Requests per second allowed for standard endpoints
    #[arg(long = "rate-limit-per-second", env = "PARLEY_RATE_LIMIT_PER_SECOND", default_value_t = 10)]
    pub per_second: u32,

    /// Burst allowance for standard endpoints
    #[arg(long = "rate-limit-burst", env = "PARLEY_RATE_LIMIT_BURST", default_value_t = 20)]
    pub burst: u32,

    /// Stricter rate limit for credential endpoints (signup/google/forget/reset)
    #[arg(long, env = "PARLEY_AUTH_RATE_LIMIT_PER_SECOND", default_value_t = 1)]
    pub auth_per_second: u32,

    /// Burst allowance for credential endpoints
    #[arg(long, env = "PARLEY_AUTH_RATE_LIMIT_BURST", default_value_t = 5)]
    pub auth_burst: u32,

    /// Password login attempts allowed per client IP within one window
    #[arg(long, env = "PARLEY_LOGIN_RATE_LIMIT_ATTEMPTS", default_value_t = 5)]
    pub login_attempts: u32,

    /// Length of the login attempt window in seconds
    #[arg(long, env = "PARLEY_LOGIN_RATE_LIMIT_WINDOW_SECS", default_value_t = 900)]
    pub login_window_secs: u64,
}

impl RateLimitConfig {
    /// Interval after which one spent login attempt is given back.
    #[must_use]
    pub fn login_replenish_period(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.login_window_secs) / self.login_attempts.max(1)
    }
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-connection outbound event buffer
    #[arg(long = "ws-outbound-buffer-size", env = "PARLEY_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Require the HTTP session credential on the gateway handshake and match it against `userId`
    #[arg(long = "ws-verify-session", env = "PARLEY_WS_VERIFY_SESSION", default_value_t = false)]
    pub verify_session: bool,
}

#[derive(Clone, Debug, Args)]
pub struct StorageConfig {
    /// S3 bucket name
    #[arg(long = "s3-bucket", env = "PARLEY_S3_BUCKET", default_value = "parley-media")]
    pub bucket: String,

    /// S3 region
    #[arg(long = "s3-region", env = "PARLEY_S3_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint (useful for MinIO)
    #[arg(long = "s3-endpoint", env = "PARLEY_S3_ENDPOINT")]
    pub endpoint: Option<String>,

    /// S3 access key
    #[arg(long = "s3-access-key", env = "PARLEY_S3_ACCESS_KEY")]
    pub access_key: Option<String>,

    /// S3 secret key
    #[arg(long = "s3-secret-key", env = "PARLEY_S3_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Force path style (required for many MinIO setups: http://host/bucket/key)
    #[arg(long = "s3-force-path-style", env = "PARLEY_S3_FORCE_PATH_STYLE", default_value_t = false)]
    pub force_path_style: bool,

    /// Base URL under which stored objects are publicly reachable
    #[arg(long, env = "PARLEY_MEDIA_PUBLIC_URL", default_value = "http://localhost:9000/parley-media")]
    pub public_url: String,

    /// Max decoded image size in bytes (Default: 10MB)
    #[arg(long, env = "PARLEY_MAX_IMAGE_BYTES", default_value_t = 10_485_760)]
    pub max_image_bytes: usize,
}

#[derive(Clone, Debug, Args)]
pub struct MailConfig {
    /// SMTP relay host; when unset, emails are written to the log instead
    #[arg(long, env = "PARLEY_SMTP_HOST")]
    pub smtp_host: Option<String>,

    /// SMTP relay port
    #[arg(long, env = "PARLEY_SMTP_PORT", default_value_t = 465)]
    pub smtp_port: u16,

    /// SMTP username
    #[arg(long, env = "PARLEY_SMTP_USERNAME")]
    pub smtp_username: Option<String>,

    /// SMTP password
    #[arg(long, env = "PARLEY_SMTP_PASSWORD")]
    pub smtp_password: Option<String>,

    /// Sender mailbox for outgoing emails
    #[arg(long, env = "PARLEY_MAIL_FROM", default_value = "Parley <no-reply@parley.local>")]
    pub from: String,

    /// Public URL of the web client, used to build links in emails
    #[arg(long, env = "PARLEY_APP_URL", default_value = "http://localhost:5173")]
    pub app_url: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// OTLP collector endpoint; exports traces, metrics and logs when set
    #[arg(long, env = "PARLEY_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log output format
    #[arg(long, env = "PARLEY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Metric export interval in seconds
    #[arg(long, env = "PARLEY_METRICS_EXPORT_INTERVAL_SECS", default_value_t = 60)]
    pub metrics_export_interval_secs: u64,
}

#[derive(Clone, Debug, Args)]
pub struct HealthConfig {
    /// Timeout for the database readiness check
    #[arg(long, env = "PARLEY_HEALTH_DB_TIMEOUT_MS", default_value_t = 2000)]
    pub db_timeout_ms: u64,

    /// Timeout for the storage readiness check
    #[arg(long, env = "PARLEY_HEALTH_STORAGE_TIMEOUT_MS", default_value_t = 2000)]
    pub storage_timeout_ms: u64,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_args() {
        let config =
            Config::try_parse_from(["parley-server", "--database-url", "postgres://localhost/db", "--jwt-secret", "s"])
                .unwrap();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.session_ttl_days, 7);
        assert_eq!(config.auth.reset_token_ttl_secs, 3_600);
        assert!(!config.websocket.verify_session);
        assert_eq!(config.telemetry.log_format, LogFormat::Text);
        assert_eq!(config.server.trusted_proxies.len(), 4);
        assert_eq!(config.rate_limit.login_attempts, 5);
        assert_eq!(config.rate_limit.login_window_secs, 900);
        assert_eq!(config.rate_limit.login_replenish_period(), std::time::Duration::from_secs(180));
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = Config::try_parse_from(["parley-server", "--database-url", "postgres://localhost/db"]);
        if std::env::var("PARLEY_JWT_SECRET").is_err() {
            assert!(result.is_err());
        }
    }
}
