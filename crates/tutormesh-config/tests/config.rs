// tutormesh-config/tests/config.rs
// ============================================================================
// Module: Configuration Tests
// Description: Tests for defaults, parsing, and fail-closed validation.
// ============================================================================
//! ## Overview
//! Builds configurations from explicit variable maps and validates the
//! documented defaults, range enforcement, and connection-string parsing.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use tutormesh_config::ConfigError;
use tutormesh_config::Configuration;
use tutormesh_config::LogLevel;
use tutormesh_config::StoreBackend;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a variable map from (key, value) pairs.
fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect()
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// An empty environment yields the documented defaults.
#[test]
fn test_defaults() {
    let config = Configuration::from_map(&BTreeMap::new()).unwrap();
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:8080");
    assert_eq!(config.server.max_inflight, 256);
    assert_eq!(config.server.request_deadline, Duration::from_secs(10));
    assert_eq!(config.store, StoreBackend::Memory);
    assert_eq!(config.rate_limit.max_requests, 100);
    assert_eq!(config.rate_limit.window, Duration::from_secs(60));
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.open_duration, Duration::from_secs(30));
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.base_delay, Duration::from_millis(100));
    assert_eq!(config.retry.attempt_timeout, Duration::from_secs(2));
    assert_eq!(config.event_log.partitions, 4);
    assert_eq!(config.event_log.consumer_group, "tutormesh-mastery");
    assert!(config.event_log.brokers.is_empty());
    assert!(config.llm.is_none());
    assert_eq!(config.audit.queue_capacity, 1_024);
    assert_eq!(config.audit.retention_days, 90);
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Explicit overrides parse into their sections.
#[test]
fn test_overrides_parse() {
    let config = Configuration::from_map(&vars(&[
        ("TUTORMESH_LOG_LEVEL", "debug"),
        ("TUTORMESH_HTTP_ADDR", "0.0.0.0:9000"),
        ("TUTORMESH_EVENT_LOG_BROKERS", "broker-a:9092, broker-b:9092"),
        ("TUTORMESH_CONSUMER_PARTITIONS", "8"),
        ("TUTORMESH_BREAKER_FAILURE_THRESHOLD", "7"),
        ("TUTORMESH_BREAKER_OPEN_MS", "5000"),
        ("TUTORMESH_STORE_CONNECTION", "sqlite:/var/lib/tutormesh/state.db"),
    ]))
    .unwrap();

    assert_eq!(config.log_level, LogLevel::Debug);
    assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:9000");
    assert_eq!(config.event_log.brokers, vec!["broker-a:9092", "broker-b:9092"]);
    assert_eq!(config.event_log.partitions, 8);
    assert_eq!(config.breaker.failure_threshold, 7);
    assert_eq!(config.breaker.open_duration, Duration::from_millis(5_000));
    assert_eq!(
        config.store,
        StoreBackend::Sqlite {
            path: PathBuf::from("/var/lib/tutormesh/state.db")
        }
    );
}

/// The LLM section activates only when its endpoint is set.
#[test]
fn test_llm_section_is_optional() {
    let config = Configuration::from_map(&vars(&[
        ("TUTORMESH_LLM_ENDPOINT", "http://127.0.0.1:9090/classify"),
        ("TUTORMESH_LLM_BUDGET_MS", "500"),
    ]))
    .unwrap();
    let llm = config.llm.unwrap();
    assert_eq!(llm.endpoint.as_str(), "http://127.0.0.1:9090/classify");
    assert_eq!(llm.budget, Duration::from_millis(500));
}

// ============================================================================
// SECTION: Fail-Closed Validation
// ============================================================================

/// Unknown log levels fail closed.
#[test]
fn test_unknown_log_level_fails() {
    let error =
        Configuration::from_map(&vars(&[("TUTORMESH_LOG_LEVEL", "verbose")])).unwrap_err();
    assert!(matches!(error, ConfigError::Invalid { .. }));
}

/// Out-of-range values name the variable and its bounds.
#[test]
fn test_out_of_range_values_fail() {
    let error =
        Configuration::from_map(&vars(&[("TUTORMESH_CONSUMER_PARTITIONS", "0")])).unwrap_err();
    match error {
        ConfigError::OutOfRange {
            key,
            value,
            min,
            ..
        } => {
            assert_eq!(key, "TUTORMESH_CONSUMER_PARTITIONS");
            assert_eq!(value, 0);
            assert_eq!(min, 1);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(
        Configuration::from_map(&vars(&[("TUTORMESH_RATE_LIMIT_WINDOW_MS", "10")])).is_err()
    );
    assert!(
        Configuration::from_map(&vars(&[("TUTORMESH_ATTEMPT_TIMEOUT_MS", "999999")])).is_err()
    );
}

/// Malformed values fail closed rather than falling back to defaults.
#[test]
fn test_malformed_values_fail() {
    assert!(Configuration::from_map(&vars(&[("TUTORMESH_HTTP_ADDR", "not-an-addr")])).is_err());
    assert!(
        Configuration::from_map(&vars(&[("TUTORMESH_SIDECAR_HTTP_ENDPOINT", "::::")])).is_err()
    );
    assert!(
        Configuration::from_map(&vars(&[("TUTORMESH_RETRY_MAX_ATTEMPTS", "three")])).is_err()
    );
    assert!(Configuration::from_map(&vars(&[("TUTORMESH_STORE_CONNECTION", "redis://x")]))
        .is_err());
    assert!(
        Configuration::from_map(&vars(&[("TUTORMESH_STORE_CONNECTION", "sqlite:")])).is_err()
    );
}

/// The consumer config derives from the event-log section.
#[test]
fn test_consumer_config_derivation() {
    let config = Configuration::from_map(&vars(&[
        ("TUTORMESH_CONSUMER_BATCH_SIZE", "64"),
        ("TUTORMESH_CONSUMER_POLL_INTERVAL_MS", "100"),
    ]))
    .unwrap();
    let consumer = config.consumer_config();
    assert_eq!(consumer.batch_size, 64);
    assert_eq!(consumer.poll_interval, Duration::from_millis(100));
    assert_eq!(consumer.max_event_attempts, 3);
}
