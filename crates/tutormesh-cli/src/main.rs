// tutormesh-cli/src/main.rs
// ============================================================================
// Module: Tutormesh CLI Entry Point
// Description: Command dispatcher for the control-plane server.
// Purpose: Wire dependencies at the composition root and run the plane.
// Dependencies: clap, tokio, tutormesh-server, tutormesh-config
// ============================================================================

//! ## Overview
//! The CLI loads the environment-driven configuration, wires every seam at
//! the composition root (no process-wide mutable globals), probes the
//! dependencies within the startup grace period, and serves the HTTP plane
//! until interrupted. Exit codes: 0 clean shutdown, 1 configuration error,
//! 2 dependency probe failed at startup beyond the grace period.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use tokio::sync::Semaphore;
use tokio::sync::watch;
use tutormesh_config::Configuration;
use tutormesh_config::StoreBackend;
use tutormesh_core::AgentInvoker;
use tutormesh_core::AuditSink;
use tutormesh_core::ComplianceService;
use tutormesh_core::DeadLetterSink;
use tutormesh_core::EventConsumer;
use tutormesh_core::EventPublisher;
use tutormesh_core::HotCache;
use tutormesh_core::InMemoryStateStore;
use tutormesh_core::IntentClassifier;
use tutormesh_core::InvocationClient;
use tutormesh_core::MasteryAggregator;
use tutormesh_core::MetricsSink;
use tutormesh_core::Predictor;
use tutormesh_core::QueryService;
use tutormesh_core::Recommender;
use tutormesh_core::StateStore;
use tutormesh_core::TriageRouter;
use tutormesh_core::interfaces::EventSource;
use tutormesh_core::runtime::SharedStateStore;
use tutormesh_events::AuditEmitterConfig;
use tutormesh_events::BufferedAuditEmitter;
use tutormesh_events::InMemoryEventLog;
use tutormesh_events::TOPIC_LEARNING_EVENTS;
use tutormesh_events::TopicDeadLetterSink;
use tutormesh_server::AppState;
use tutormesh_server::HttpLlmClassifier;
use tutormesh_server::HttpSidecarInvoker;
use tutormesh_server::RegistryMetrics;
use tutormesh_server::SlidingWindowLimiter;
use tutormesh_server::build_app;
use tutormesh_store_sqlite::SqliteStateStore;
use tutormesh_store_sqlite::SqliteStoreConfig;

// ============================================================================
// SECTION: Exit Codes
// ============================================================================

/// Clean shutdown.
const EXIT_OK: u8 = 0;
/// Configuration error.
const EXIT_CONFIG: u8 = 1;
/// Dependency probe failed at startup beyond the grace period.
const EXIT_DEPENDENCY: u8 = 2;

/// Delay between startup probe attempts.
const PROBE_RETRY_DELAY: Duration = Duration::from_millis(250);
/// Budget for draining background tasks at shutdown.
const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(5);

// ============================================================================
// SECTION: CLI
// ============================================================================

/// Tutormesh control-plane server.
#[derive(Debug, Parser)]
#[command(name = "tutormesh", version, about = "Tutoring control plane: triage and mastery")]
struct Cli {
    /// Command to run; defaults to serve.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Run the control-plane server.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve_command(),
        Command::CheckConfig => check_config_command(),
    }
}

/// Validates the configuration without starting the server.
fn check_config_command() -> ExitCode {
    match Configuration::from_env() {
        Ok(config) => {
            let store_label = match &config.store {
                StoreBackend::Memory => "memory".to_string(),
                StoreBackend::Sqlite {
                    path,
                } => format!("sqlite:{}", path.display()),
            };
            let _ = writeln!(
                std::io::stdout(),
                "configuration ok: bind {}, store {store_label}, {} partition(s)",
                config.server.bind_addr,
                config.event_log.partitions
            );
            ExitCode::from(EXIT_OK)
        }
        Err(error) => {
            let _ = writeln!(std::io::stderr(), "configuration error: {error}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

/// Loads the configuration and runs the server to completion.
fn serve_command() -> ExitCode {
    let config = match Configuration::from_env() {
        Ok(config) => config,
        Err(error) => {
            let _ = writeln!(std::io::stderr(), "configuration error: {error}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.as_str()))
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to build async runtime");
            return ExitCode::from(EXIT_DEPENDENCY);
        }
    };
    ExitCode::from(runtime.block_on(serve(config)))
}

// ============================================================================
// SECTION: Server Wiring
// ============================================================================

/// Wires the dependency graph and serves until interrupted.
async fn serve(config: Configuration) -> u8 {
    let store = match build_store(&config) {
        Ok(store) => store,
        Err(code) => return code,
    };

    let log = Arc::new(InMemoryEventLog::new(config.event_log.partitions));
    if !config.event_log.brokers.is_empty() {
        tracing::warn!(
            brokers = config.event_log.brokers.len(),
            "external event-log brokers are declared in deployment config; this binary consumes the in-process log"
        );
    }
    let publisher: Arc<dyn EventPublisher> = log.clone();
    let source: Arc<dyn EventSource> = Arc::new(log.source(TOPIC_LEARNING_EVENTS));

    let cache = Arc::new(HotCache::default());
    let metrics = Arc::new(RegistryMetrics::new());
    let metrics_sink: Arc<dyn MetricsSink> = metrics.clone();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let (emitter, emitter_handle) = BufferedAuditEmitter::spawn(
        Arc::clone(&publisher),
        Arc::clone(&metrics_sink),
        AuditEmitterConfig {
            queue_capacity: config.audit.queue_capacity,
            spill_path: config.audit.spill_path.clone(),
            spill_max_entries: config.audit.spill_max_entries,
            ..AuditEmitterConfig::default()
        },
        shutdown_rx.clone(),
    );
    let audit: Arc<dyn AuditSink> = Arc::new(emitter);

    let sidecar: Arc<dyn AgentInvoker> =
        Arc::new(HttpSidecarInvoker::new(config.sidecar.http_endpoint.clone()));
    let invocation = Arc::new(InvocationClient::new(
        Arc::clone(&sidecar),
        config.breaker,
        config.retry,
        Arc::clone(&metrics_sink),
    ));
    let classifier = match &config.llm {
        Some(llm) => IntentClassifier::with_llm(
            Arc::new(HttpLlmClassifier::new(llm.endpoint.clone())),
            llm.budget,
        ),
        None => IntentClassifier::deterministic(),
    };
    let triage = TriageRouter::new(classifier, invocation, audit, Arc::clone(&metrics_sink));

    let aggregator = Arc::new(MasteryAggregator::new(store.clone(), Arc::clone(&cache)));
    let dead_letter: Arc<dyn DeadLetterSink> =
        Arc::new(TopicDeadLetterSink::new(Arc::clone(&publisher)));
    let consumer = Arc::new(EventConsumer::new(
        source,
        store.clone(),
        aggregator,
        Arc::clone(&dead_letter),
        Arc::clone(&metrics_sink),
        config.consumer_config(),
    ));
    let consumer_handles = consumer.spawn(&shutdown_rx);

    let query = Arc::new(QueryService::new(store.clone(), Arc::clone(&cache)));
    let predictor = Predictor::new(store.clone(), Arc::clone(&query));
    let recommender = Recommender::new(store.clone(), Arc::clone(&query));
    let compliance = ComplianceService::new(store.clone(), Arc::clone(&cache));

    let state = Arc::new(AppState {
        limiter: SlidingWindowLimiter::new(config.rate_limit),
        inflight: Semaphore::new(config.server.max_inflight),
        started: AtomicBool::new(false),
        triage,
        query,
        predictor,
        recommender,
        compliance,
        store,
        publisher,
        sidecar,
        dead_letter,
        metrics,
        config,
    });

    if !startup_probes(&state).await {
        return EXIT_DEPENDENCY;
    }
    state.started.store(true, Ordering::Relaxed);

    let app = build_app(Arc::clone(&state));
    let listener = match tokio::net::TcpListener::bind(state.config.server.bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, addr = %state.config.server.bind_addr, "failed to bind listener");
            return EXIT_DEPENDENCY;
        }
    };
    tracing::info!(addr = %state.config.server.bind_addr, "tutormesh control plane listening");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await;
    if let Err(error) = serve_result {
        tracing::error!(%error, "server terminated abnormally");
    }

    let _ = shutdown_tx.send(true);
    for handle in consumer_handles {
        let _ = tokio::time::timeout(SHUTDOWN_DRAIN_BUDGET, handle).await;
    }
    let _ = tokio::time::timeout(SHUTDOWN_DRAIN_BUDGET, emitter_handle).await;
    tracing::info!("shutdown complete");
    EXIT_OK
}

/// Builds the configured state-store backend.
fn build_store(config: &Configuration) -> Result<SharedStateStore, u8> {
    match &config.store {
        StoreBackend::Memory => Ok(SharedStateStore::from_store(InMemoryStateStore::new())),
        StoreBackend::Sqlite {
            path,
        } => match SqliteStateStore::new(SqliteStoreConfig::for_path(path.clone())) {
            Ok(store) => Ok(SharedStateStore::from_store(store)),
            Err(error) => {
                tracing::error!(%error, "failed to open sqlite state store");
                Err(EXIT_DEPENDENCY)
            }
        },
    }
}

/// Probes every dependency until all answer or the grace period lapses.
async fn startup_probes(state: &AppState) -> bool {
    let deadline = tokio::time::Instant::now() + state.config.probes.startup_grace;
    loop {
        let store_ok = state.store.probe().is_ok();
        let log_ok = state.publisher.probe().is_ok();
        let sidecar_ok = state.sidecar.probe(state.config.probes.budget).await.is_ok();
        if store_ok && log_ok && sidecar_ok {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::error!(
                store_ok,
                log_ok,
                sidecar_ok,
                "dependency probes failed beyond the startup grace period"
            );
            return false;
        }
        tokio::time::sleep(PROBE_RETRY_DELAY).await;
    }
}
