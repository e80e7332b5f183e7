use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

use domain::error::DomainError;
use domain::services::ledger::EarnRate;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    /// JWT authentication configuration
    pub jwt: JwtAuthConfig,
    /// Point accrual and token lifetimes
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Email service configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// First superuser, created at startup when no superuser exists
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(cfg: &DatabaseConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            max_connections: cfg.max_connections,
            min_connections: cfg.min_connections,
            connect_timeout_secs: cfg.connect_timeout_secs,
            idle_timeout_secs: cfg.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Password reset requests allowed per client IP per minute (0 disables the limit)
    #[serde(default = "default_reset_rate_limit")]
    pub reset_rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtAuthConfig {
    /// HMAC secret used to sign login tokens
    pub secret: String,

    /// Login token lifetime in seconds (default: 86400 = 1 day)
    #[serde(default = "default_token_expiry")]
    pub token_expiry_secs: i64,

    /// Leeway in seconds for clock skew tolerance
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// Points earned per `points_per_unit_denominator` currency units
    #[serde(default = "default_points_numerator")]
    pub points_per_unit_numerator: i64,

    #[serde(default = "default_points_denominator")]
    pub points_per_unit_denominator: i64,

    /// Lifetime of the activation token handed out at registration
    #[serde(default = "default_activation_expiry_days")]
    pub activation_token_expiry_days: i64,

    /// Lifetime of a password reset token
    #[serde(default = "default_reset_expiry")]
    pub reset_token_expiry_secs: i64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            points_per_unit_numerator: default_points_numerator(),
            points_per_unit_denominator: default_points_denominator(),
            activation_token_expiry_days: default_activation_expiry_days(),
            reset_token_expiry_secs: default_reset_expiry(),
        }
    }
}

impl LedgerConfig {
    pub fn earn_rate(&self) -> Result<EarnRate, DomainError> {
        EarnRate::new(
            self.points_per_unit_numerator,
            self.points_per_unit_denominator,
        )
    }
}

/// Email service configuration for activation and reset emails.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Whether email sending is enabled
    #[serde(default)]
    pub enabled: bool,

    /// Email provider; only `console` is built in
    #[serde(default = "default_email_provider")]
    pub provider: String,

    /// Sender email address (From header)
    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    /// Sender name (From header)
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    /// Base URL for email links (e.g., https://auraclub.example.com)
    #[serde(default)]
    pub base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            base_url: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub superuser_utorid: String,
    #[serde(default)]
    pub superuser_name: String,
    #[serde(default)]
    pub superuser_email: String,
    #[serde(default)]
    pub superuser_password: String,
}

impl BootstrapConfig {
    pub fn is_configured(&self) -> bool {
        !self.superuser_utorid.is_empty() && !self.superuser_password.is_empty()
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_body_size() -> usize {
    1_048_576
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_reset_rate_limit() -> u32 {
    1
}
fn default_token_expiry() -> i64 {
    86400
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_points_numerator() -> i64 {
    100
}
fn default_points_denominator() -> i64 {
    25
}
fn default_activation_expiry_days() -> i64 {
    7
}
fn default_reset_expiry() -> i64 {
    3600
}
fn default_email_provider() -> String {
    "console".to_string()
}
fn default_sender_email() -> String {
    "noreply@auraclub.app".to_string()
}
fn default_sender_name() -> String {
    "AuraClub".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with AURA__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("AURA").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration from embedded defaults plus overrides.
    ///
    /// Does not touch the file system and skips validation, so tests can
    /// build partial configs.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30
            max_body_size = 1048576

            [database]
            url = ""
            max_connections = 5
            min_connections = 1
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            reset_rate_limit_per_minute = 0

            [jwt]
            secret = "test-secret-do-not-use-in-production"
            token_expiry_secs = 3600
            leeway_secs = 30

            [ledger]
            points_per_unit_numerator = 100
            points_per_unit_denominator = 25
            activation_token_expiry_days = 7
            reset_token_expiry_secs = 3600

            [email]
            enabled = false
            provider = "console"
            sender_email = "test@example.com"
            sender_name = "Test"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AURA__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.jwt.secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "AURA__JWT__SECRET environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        self.ledger.earn_rate().map_err(|_| {
            ConfigValidationError::InvalidValue(
                "ledger point rate must be non-negative over a positive denominator".to_string(),
            )
        })?;

        if self.jwt.token_expiry_secs <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "jwt.token_expiry_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
