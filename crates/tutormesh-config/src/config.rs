// tutormesh-config/src/config.rs
// ============================================================================
// Module: Tutormesh Configuration
// Description: Configuration loading and validation for the control plane.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: tutormesh-core, url, thiserror
// ============================================================================

//! ## Overview
//! Environment variables are the authoritative configuration surface. The
//! whole set is parsed into one immutable [`Configuration`] at startup;
//! every field has a documented default and a hard validity range, and any
//! out-of-range value fails closed with a [`ConfigError`] naming the
//! offending variable. Tests build configurations through
//! [`Configuration::from_map`] without touching the process environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tutormesh_core::ConsumerConfig;
use tutormesh_core::RetryPolicy;
use tutormesh_core::runtime::BreakerConfig;
use url::Url;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable prefix shared by every setting.
pub const ENV_PREFIX: &str = "TUTORMESH_";

/// Default HTTP bind address.
const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8080";
/// Default sidecar HTTP endpoint.
const DEFAULT_SIDECAR_HTTP: &str = "http://127.0.0.1:3500";
/// Default sidecar RPC endpoint.
const DEFAULT_SIDECAR_RPC: &str = "http://127.0.0.1:50001";
/// Default consumer group identifier.
const DEFAULT_CONSUMER_GROUP: &str = "tutormesh-mastery";
/// Default store connection string.
const DEFAULT_STORE_CONNECTION: &str = "memory";

/// Minimum / maximum consumer partitions.
const MIN_PARTITIONS: u64 = 1;
/// Maximum consumer partitions.
const MAX_PARTITIONS: u64 = 256;
/// Default consumer partitions.
const DEFAULT_PARTITIONS: u64 = 4;
/// Minimum consumer batch size.
const MIN_BATCH_SIZE: u64 = 1;
/// Maximum consumer batch size.
const MAX_BATCH_SIZE: u64 = 1_000;
/// Default consumer batch size.
const DEFAULT_BATCH_SIZE: u64 = 32;
/// Minimum consumer poll interval (ms).
const MIN_POLL_INTERVAL_MS: u64 = 10;
/// Maximum consumer poll interval (ms).
const MAX_POLL_INTERVAL_MS: u64 = 10_000;
/// Default consumer poll interval (ms).
const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
/// Minimum rate-limit window (ms).
const MIN_RATE_WINDOW_MS: u64 = 100;
/// Maximum rate-limit window (ms).
const MAX_RATE_WINDOW_MS: u64 = 600_000;
/// Default rate-limit window (ms): one minute sliding.
const DEFAULT_RATE_WINDOW_MS: u64 = 60_000;
/// Minimum requests per rate-limit window.
const MIN_RATE_REQUESTS: u64 = 1;
/// Maximum requests per rate-limit window.
const MAX_RATE_REQUESTS: u64 = 100_000;
/// Default requests per rate-limit window.
const DEFAULT_RATE_REQUESTS: u64 = 100;
/// Minimum breaker failure threshold.
const MIN_BREAKER_FAILURES: u64 = 1;
/// Maximum breaker failure threshold.
const MAX_BREAKER_FAILURES: u64 = 100;
/// Default breaker failure threshold.
const DEFAULT_BREAKER_FAILURES: u64 = 5;
/// Minimum breaker open duration (ms).
const MIN_BREAKER_OPEN_MS: u64 = 100;
/// Maximum breaker open duration (ms).
const MAX_BREAKER_OPEN_MS: u64 = 600_000;
/// Default breaker open duration (ms).
const DEFAULT_BREAKER_OPEN_MS: u64 = 30_000;
/// Minimum retry attempts.
const MIN_RETRY_ATTEMPTS: u64 = 1;
/// Maximum retry attempts.
const MAX_RETRY_ATTEMPTS: u64 = 10;
/// Default retry attempts.
const DEFAULT_RETRY_ATTEMPTS: u64 = 3;
/// Minimum retry base delay (ms).
const MIN_RETRY_BASE_MS: u64 = 1;
/// Maximum retry base delay (ms).
const MAX_RETRY_BASE_MS: u64 = 10_000;
/// Default retry base delay (ms).
const DEFAULT_RETRY_BASE_MS: u64 = 100;
/// Minimum per-attempt timeout (ms).
const MIN_ATTEMPT_TIMEOUT_MS: u64 = 100;
/// Maximum per-attempt timeout (ms).
const MAX_ATTEMPT_TIMEOUT_MS: u64 = 30_000;
/// Default per-attempt timeout (ms).
const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 2_000;
/// Minimum request deadline (ms).
const MIN_REQUEST_DEADLINE_MS: u64 = 500;
/// Maximum request deadline (ms).
const MAX_REQUEST_DEADLINE_MS: u64 = 120_000;
/// Default request deadline (ms).
const DEFAULT_REQUEST_DEADLINE_MS: u64 = 10_000;
/// Minimum request body size (bytes).
const MIN_BODY_BYTES: u64 = 1_024;
/// Maximum request body size (bytes).
const MAX_BODY_BYTES: u64 = 10 * 1_024 * 1_024;
/// Default request body size (bytes).
const DEFAULT_BODY_BYTES: u64 = 1_024 * 1_024;
/// Minimum inflight requests.
const MIN_INFLIGHT: u64 = 1;
/// Maximum inflight requests.
const MAX_INFLIGHT: u64 = 65_536;
/// Default inflight requests.
const DEFAULT_INFLIGHT: u64 = 256;
/// Minimum LLM budget (ms).
const MIN_LLM_BUDGET_MS: u64 = 50;
/// Maximum LLM budget (ms).
const MAX_LLM_BUDGET_MS: u64 = 10_000;
/// Default LLM budget (ms).
const DEFAULT_LLM_BUDGET_MS: u64 = 800;
/// Minimum audit queue capacity.
const MIN_AUDIT_QUEUE: u64 = 16;
/// Maximum audit queue capacity.
const MAX_AUDIT_QUEUE: u64 = 65_536;
/// Default audit queue capacity.
const DEFAULT_AUDIT_QUEUE: u64 = 1_024;
/// Minimum spill-queue entries.
const MIN_SPILL_ENTRIES: u64 = 16;
/// Maximum spill-queue entries.
const MAX_SPILL_ENTRIES: u64 = 1_000_000;
/// Default spill-queue entries.
const DEFAULT_SPILL_ENTRIES: u64 = 4_096;
/// Minimum audit retention (days); operators choose the exact horizon.
const MIN_AUDIT_RETENTION_DAYS: u64 = 30;
/// Maximum audit retention (days).
const MAX_AUDIT_RETENTION_DAYS: u64 = 3_650;
/// Default audit retention (days).
const DEFAULT_AUDIT_RETENTION_DAYS: u64 = 90;
/// Minimum probe budget (ms).
const MIN_PROBE_BUDGET_MS: u64 = 50;
/// Maximum probe budget (ms).
const MAX_PROBE_BUDGET_MS: u64 = 10_000;
/// Default probe budget (ms).
const DEFAULT_PROBE_BUDGET_MS: u64 = 1_000;
/// Maximum startup grace (ms).
const MAX_STARTUP_GRACE_MS: u64 = 120_000;
/// Default startup grace (ms).
const DEFAULT_STARTUP_GRACE_MS: u64 = 10_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors; any one of these aborts startup with exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable failed to parse.
    #[error("invalid value for {key}: {reason}")]
    Invalid {
        /// Environment variable name.
        key: String,
        /// Parse failure description.
        reason: String,
    },
    /// A variable fell outside its validity range.
    #[error("{key} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        /// Environment variable name.
        key: String,
        /// Provided value.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Operational log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational (default).
    #[default]
    Info,
    /// Debug detail.
    Debug,
    /// Full trace detail.
    Trace,
}

impl LogLevel {
    /// Returns the tracing filter directive for the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    /// Parses a level label. Unknown labels fail closed.
    fn parse(value: &str) -> Option<Self> {
        match value {
            "error" => Some(Self::Error),
            "warn" => Some(Self::Warn),
            "info" => Some(Self::Info),
            "debug" => Some(Self::Debug),
            "trace" => Some(Self::Trace),
            _ => None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
    /// Maximum concurrently handled requests.
    pub max_inflight: usize,
    /// Per-request deadline.
    pub request_deadline: Duration,
}

/// Sidecar invocation-plane endpoints.
#[derive(Debug, Clone)]
pub struct SidecarConfig {
    /// HTTP endpoint of the local sidecar.
    pub http_endpoint: Url,
    /// RPC endpoint of the local sidecar.
    pub rpc_endpoint: Url,
}

/// Event-log settings.
#[derive(Debug, Clone)]
pub struct EventLogConfig {
    /// Bootstrap addresses; empty selects the in-process log.
    pub brokers: Vec<String>,
    /// Consumer group identifier.
    pub consumer_group: String,
    /// Partition count of the learning-events topic.
    pub partitions: u32,
    /// Events pulled per poll.
    pub batch_size: usize,
    /// Idle delay between polls.
    pub poll_interval: Duration,
}

/// State-store backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process store; survives only the process lifetime.
    Memory,
    /// Durable `SQLite` store at the given path.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
}

/// Per-student rate-limit settings.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests admitted per sliding window.
    pub max_requests: u32,
    /// Sliding window length.
    pub window: Duration,
}

/// Optional LLM classifier settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Classifier endpoint.
    pub endpoint: Url,
    /// Consult budget.
    pub budget: Duration,
}

/// Audit emitter settings.
#[derive(Debug, Clone)]
pub struct AuditSettings {
    /// In-memory queue bound.
    pub queue_capacity: usize,
    /// Disk spill file, `None` disables spilling.
    pub spill_path: Option<PathBuf>,
    /// Spill-queue bound.
    pub spill_max_entries: usize,
    /// Declared audit retention horizon in days (operator policy; recorded,
    /// not enforced by the core).
    pub retention_days: u32,
}

/// Dependency probe settings.
#[derive(Debug, Clone, Copy)]
pub struct ProbeSettings {
    /// Per-dependency probe budget.
    pub budget: Duration,
    /// Grace period for startup probes before exit code 2.
    pub startup_grace: Duration,
}

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Immutable control-plane configuration, validated at startup.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Operational log level.
    pub log_level: LogLevel,
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Sidecar endpoints.
    pub sidecar: SidecarConfig,
    /// Event-log settings.
    pub event_log: EventLogConfig,
    /// State-store backend.
    pub store: StoreBackend,
    /// Rate-limit settings.
    pub rate_limit: RateLimitConfig,
    /// Breaker thresholds.
    pub breaker: BreakerConfig,
    /// Retry policy.
    pub retry: RetryPolicy,
    /// Optional LLM classifier settings.
    pub llm: Option<LlmConfig>,
    /// Audit emitter settings.
    pub audit: AuditSettings,
    /// Dependency probe settings.
    pub probes: ProbeSettings,
}

impl Configuration {
    /// Loads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on any invalid or out-of-range variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> =
            env::vars().filter(|(key, _)| key.starts_with(ENV_PREFIX)).collect();
        Self::from_map(&vars)
    }

    /// Builds a configuration from an explicit variable map; used by tests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on any invalid or out-of-range variable.
    pub fn from_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let log_level = match vars.get("TUTORMESH_LOG_LEVEL") {
            Some(raw) => LogLevel::parse(raw).ok_or_else(|| ConfigError::Invalid {
                key: "TUTORMESH_LOG_LEVEL".to_string(),
                reason: format!("unknown level {raw:?}"),
            })?,
            None => LogLevel::default(),
        };

        let server = ServerConfig {
            bind_addr: parse_addr(vars, "TUTORMESH_HTTP_ADDR", DEFAULT_HTTP_ADDR)?,
            max_body_bytes: bounded(
                vars,
                "TUTORMESH_MAX_BODY_BYTES",
                DEFAULT_BODY_BYTES,
                MIN_BODY_BYTES,
                MAX_BODY_BYTES,
            )? as usize,
            max_inflight: bounded(
                vars,
                "TUTORMESH_MAX_INFLIGHT",
                DEFAULT_INFLIGHT,
                MIN_INFLIGHT,
                MAX_INFLIGHT,
            )? as usize,
            request_deadline: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_REQUEST_DEADLINE_MS",
                DEFAULT_REQUEST_DEADLINE_MS,
                MIN_REQUEST_DEADLINE_MS,
                MAX_REQUEST_DEADLINE_MS,
            )?),
        };

        let sidecar = SidecarConfig {
            http_endpoint: parse_url(vars, "TUTORMESH_SIDECAR_HTTP_ENDPOINT", DEFAULT_SIDECAR_HTTP)?,
            rpc_endpoint: parse_url(vars, "TUTORMESH_SIDECAR_RPC_ENDPOINT", DEFAULT_SIDECAR_RPC)?,
        };

        let event_log = EventLogConfig {
            brokers: vars
                .get("TUTORMESH_EVENT_LOG_BROKERS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|part| !part.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            consumer_group: vars
                .get("TUTORMESH_CONSUMER_GROUP")
                .cloned()
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP.to_string()),
            partitions: bounded(
                vars,
                "TUTORMESH_CONSUMER_PARTITIONS",
                DEFAULT_PARTITIONS,
                MIN_PARTITIONS,
                MAX_PARTITIONS,
            )? as u32,
            batch_size: bounded(
                vars,
                "TUTORMESH_CONSUMER_BATCH_SIZE",
                DEFAULT_BATCH_SIZE,
                MIN_BATCH_SIZE,
                MAX_BATCH_SIZE,
            )? as usize,
            poll_interval: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_CONSUMER_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
                MIN_POLL_INTERVAL_MS,
                MAX_POLL_INTERVAL_MS,
            )?),
        };

        let store = parse_store(vars)?;

        let rate_limit = RateLimitConfig {
            max_requests: bounded(
                vars,
                "TUTORMESH_RATE_LIMIT_MAX_REQUESTS",
                DEFAULT_RATE_REQUESTS,
                MIN_RATE_REQUESTS,
                MAX_RATE_REQUESTS,
            )? as u32,
            window: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_RATE_LIMIT_WINDOW_MS",
                DEFAULT_RATE_WINDOW_MS,
                MIN_RATE_WINDOW_MS,
                MAX_RATE_WINDOW_MS,
            )?),
        };

        let breaker = BreakerConfig {
            failure_threshold: bounded(
                vars,
                "TUTORMESH_BREAKER_FAILURE_THRESHOLD",
                DEFAULT_BREAKER_FAILURES,
                MIN_BREAKER_FAILURES,
                MAX_BREAKER_FAILURES,
            )? as u32,
            open_duration: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_BREAKER_OPEN_MS",
                DEFAULT_BREAKER_OPEN_MS,
                MIN_BREAKER_OPEN_MS,
                MAX_BREAKER_OPEN_MS,
            )?),
        };

        let retry = RetryPolicy {
            max_attempts: bounded(
                vars,
                "TUTORMESH_RETRY_MAX_ATTEMPTS",
                DEFAULT_RETRY_ATTEMPTS,
                MIN_RETRY_ATTEMPTS,
                MAX_RETRY_ATTEMPTS,
            )? as u32,
            base_delay: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_RETRY_BASE_DELAY_MS",
                DEFAULT_RETRY_BASE_MS,
                MIN_RETRY_BASE_MS,
                MAX_RETRY_BASE_MS,
            )?),
            attempt_timeout: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_ATTEMPT_TIMEOUT_MS",
                DEFAULT_ATTEMPT_TIMEOUT_MS,
                MIN_ATTEMPT_TIMEOUT_MS,
                MAX_ATTEMPT_TIMEOUT_MS,
            )?),
        };

        let llm = match vars.get("TUTORMESH_LLM_ENDPOINT") {
            Some(raw) => Some(LlmConfig {
                endpoint: Url::parse(raw).map_err(|error| ConfigError::Invalid {
                    key: "TUTORMESH_LLM_ENDPOINT".to_string(),
                    reason: error.to_string(),
                })?,
                budget: Duration::from_millis(bounded(
                    vars,
                    "TUTORMESH_LLM_BUDGET_MS",
                    DEFAULT_LLM_BUDGET_MS,
                    MIN_LLM_BUDGET_MS,
                    MAX_LLM_BUDGET_MS,
                )?),
            }),
            None => None,
        };

        let audit = AuditSettings {
            queue_capacity: bounded(
                vars,
                "TUTORMESH_AUDIT_QUEUE_CAPACITY",
                DEFAULT_AUDIT_QUEUE,
                MIN_AUDIT_QUEUE,
                MAX_AUDIT_QUEUE,
            )? as usize,
            spill_path: vars.get("TUTORMESH_AUDIT_SPILL_PATH").map(PathBuf::from),
            spill_max_entries: bounded(
                vars,
                "TUTORMESH_AUDIT_SPILL_MAX_ENTRIES",
                DEFAULT_SPILL_ENTRIES,
                MIN_SPILL_ENTRIES,
                MAX_SPILL_ENTRIES,
            )? as usize,
            retention_days: bounded(
                vars,
                "TUTORMESH_AUDIT_RETENTION_DAYS",
                DEFAULT_AUDIT_RETENTION_DAYS,
                MIN_AUDIT_RETENTION_DAYS,
                MAX_AUDIT_RETENTION_DAYS,
            )? as u32,
        };

        let probes = ProbeSettings {
            budget: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_PROBE_BUDGET_MS",
                DEFAULT_PROBE_BUDGET_MS,
                MIN_PROBE_BUDGET_MS,
                MAX_PROBE_BUDGET_MS,
            )?),
            startup_grace: Duration::from_millis(bounded(
                vars,
                "TUTORMESH_STARTUP_GRACE_MS",
                DEFAULT_STARTUP_GRACE_MS,
                0,
                MAX_STARTUP_GRACE_MS,
            )?),
        };

        Ok(Self {
            log_level,
            server,
            sidecar,
            event_log,
            store,
            rate_limit,
            breaker,
            retry,
            llm,
            audit,
            probes,
        })
    }

    /// Returns the consumer configuration derived from the event-log section.
    #[must_use]
    pub const fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            batch_size: self.event_log.batch_size,
            poll_interval: self.event_log.poll_interval,
            max_event_attempts: 3,
        }
    }
}

// ============================================================================
// SECTION: Parse Helpers
// ============================================================================

/// Parses a bounded integer variable with a default.
fn bounded(
    vars: &BTreeMap<String, String>,
    key: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let value = match vars.get(key) {
        Some(raw) => raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
            key: key.to_string(),
            reason: error.to_string(),
        })?,
        None => default,
    };
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            key: key.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Parses a socket address variable with a default.
fn parse_addr(
    vars: &BTreeMap<String, String>,
    key: &str,
    default: &str,
) -> Result<SocketAddr, ConfigError> {
    let raw = vars.get(key).map_or(default, String::as_str);
    raw.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("not a socket address: {raw:?}"),
    })
}

/// Parses a URL variable with a default.
fn parse_url(vars: &BTreeMap<String, String>, key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = vars.get(key).map_or(default, String::as_str);
    Url::parse(raw).map_err(|error| ConfigError::Invalid {
        key: key.to_string(),
        reason: error.to_string(),
    })
}

/// Parses the store connection string: `memory` or `sqlite:<path>`.
fn parse_store(vars: &BTreeMap<String, String>) -> Result<StoreBackend, ConfigError> {
    let raw = vars
        .get("TUTORMESH_STORE_CONNECTION")
        .map_or(DEFAULT_STORE_CONNECTION, String::as_str);
    if raw == "memory" {
        return Ok(StoreBackend::Memory);
    }
    if let Some(path) = raw.strip_prefix("sqlite:") {
        if path.is_empty() {
            return Err(ConfigError::Invalid {
                key: "TUTORMESH_STORE_CONNECTION".to_string(),
                reason: "sqlite connection string has an empty path".to_string(),
            });
        }
        return Ok(StoreBackend::Sqlite {
            path: PathBuf::from(path),
        });
    }
    Err(ConfigError::Invalid {
        key: "TUTORMESH_STORE_CONNECTION".to_string(),
        reason: format!("expected \"memory\" or \"sqlite:<path>\", got {raw:?}"),
    })
}
