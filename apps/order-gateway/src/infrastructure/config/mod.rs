//! Gateway Configuration
//!
//! Environment-backed configuration for the control channel, dispatch
//! pool, persistence, and the admin HTTP server. Every knob has a
//! default except the control-channel URL.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::channel::TlsMode;

// =============================================================================
// Errors
// =============================================================================

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    /// An environment variable holds an unparseable value.
    #[error("invalid value for {key}: {value} ({reason})")]
    Invalid {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Parse failure detail.
        reason: String,
    },
}

// =============================================================================
// Credentials
// =============================================================================

/// Bearer token for the control channel. Debug output is redacted.
#[derive(Clone)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token value.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// The raw token, for building the authorization header.
    #[must_use]
    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

// =============================================================================
// Settings
// =============================================================================

/// Control-channel endpoint settings.
#[derive(Debug, Clone)]
pub struct ControlSettings {
    /// WebSocket URL of the order-management service.
    pub url: String,
    /// Optional bearer token.
    pub auth_token: Option<AuthToken>,
    /// TLS verification mode.
    pub tls: TlsMode,
}

/// Connection-lifecycle tuning.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// First reconnect delay.
    pub reconnect_delay_initial: Duration,
    /// Reconnect delay ceiling.
    pub reconnect_delay_max: Duration,
    /// Backoff growth factor.
    pub reconnect_delay_multiplier: f64,
    /// Reconnect attempt budget, 0 for unlimited.
    pub max_reconnect_attempts: u32,
    /// Active period after which the backoff resets.
    pub stable_reset_after: Duration,
    /// Outbound queue depth.
    pub outbound_capacity: usize,
    /// Shutdown drain budget for queued outbound messages.
    pub drain_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0,
            stable_reset_after: Duration::from_secs(60),
            outbound_capacity: 256,
            drain_timeout: Duration::from_secs(3),
        }
    }
}

/// Dispatch pool tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Concurrent backend submissions.
    pub worker_permits: usize,
    /// Backend rebuild attempts on transient failure.
    pub backend_recycle_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            worker_permits: 4,
            backend_recycle_attempts: 2,
        }
    }
}

/// Admin HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Port for health, metrics, and the local order facade.
    pub admin_port: u16,
}

/// Durable state settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// `SQLite` database URL.
    pub database_url: String,
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Control-channel endpoint.
    pub control: ControlSettings,
    /// Connection lifecycle.
    pub channel: ChannelSettings,
    /// Dispatch pool.
    pub dispatch: DispatchSettings,
    /// Admin HTTP server.
    pub server: ServerSettings,
    /// Durable state.
    pub store: StoreSettings,
    /// Accounts served by the simulated backend.
    pub accounts: Vec<String>,
}

impl GatewayConfig {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `GATEWAY_CONTROL_URL` is unset or any
    /// variable holds an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = required_env("GATEWAY_CONTROL_URL")?;
        let auth_token = optional_env("GATEWAY_AUTH_TOKEN").map(AuthToken::new);
        let tls = parse_tls_mode(
            &parse_env_string("GATEWAY_TLS_MODE", "strict"),
            optional_env("GATEWAY_TLS_CA_FILE"),
        )?;

        Ok(Self {
            control: ControlSettings {
                url,
                auth_token,
                tls,
            },
            channel: ChannelSettings {
                reconnect_delay_initial: parse_env_duration_ms(
                    "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                    500,
                )?,
                reconnect_delay_max: parse_env_duration_ms(
                    "GATEWAY_RECONNECT_DELAY_MAX_MS",
                    30_000,
                )?,
                reconnect_delay_multiplier: parse_env("GATEWAY_RECONNECT_MULTIPLIER", 2.0)?,
                max_reconnect_attempts: parse_env("GATEWAY_MAX_RECONNECT_ATTEMPTS", 0_u32)?,
                stable_reset_after: parse_env_duration_ms("GATEWAY_STABLE_RESET_AFTER_MS", 60_000)?,
                outbound_capacity: parse_env("GATEWAY_OUTBOUND_CAPACITY", 256_usize)?,
                drain_timeout: parse_env_duration_ms("GATEWAY_DRAIN_TIMEOUT_MS", 3_000)?,
            },
            dispatch: DispatchSettings {
                worker_permits: parse_env("GATEWAY_WORKER_PERMITS", 4_usize)?,
                backend_recycle_attempts: parse_env("GATEWAY_BACKEND_RECYCLE_ATTEMPTS", 2_u32)?,
            },
            server: ServerSettings {
                admin_port: parse_env("GATEWAY_ADMIN_PORT", 8080_u16)?,
            },
            store: StoreSettings {
                database_url: parse_env_string(
                    "GATEWAY_DATABASE_URL",
                    "sqlite://data/order-gateway.db",
                ),
            },
            accounts: parse_accounts(&parse_env_string("GATEWAY_ACCOUNTS", "DEMO1")),
        })
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

fn required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env_string(key: &str, default: &str) -> String {
    optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match optional_env(key) {
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            value,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_env_duration_ms(key: &str, default_ms: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_env(key, default_ms)?))
}

fn parse_tls_mode(mode: &str, ca_file: Option<String>) -> Result<TlsMode, ConfigError> {
    match mode.trim().to_lowercase().as_str() {
        "strict" => Ok(TlsMode::Strict),
        "insecure" => Ok(TlsMode::Insecure),
        "custom-ca" => ca_file.map(PathBuf::from).map(TlsMode::CustomCa).ok_or_else(|| {
            ConfigError::MissingVar("GATEWAY_TLS_CA_FILE".to_string())
        }),
        other => Err(ConfigError::Invalid {
            key: "GATEWAY_TLS_MODE".to_string(),
            value: other.to_string(),
            reason: "expected strict, custom-ca, or insecure".to_string(),
        }),
    }
}

fn parse_accounts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
