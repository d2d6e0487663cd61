// # ddnsd - DDNS Daemon
//
// Thin integration layer: every update rule lives in `ddns-core` and the
// adapter crates. The daemon is responsible for:
// 1. Reading configuration from environment variables and the records file
// 2. Initializing logging and the runtime
// 3. Registering providers, IP sources and the record store
// 4. Running the scheduler and the HTTP control surface until a signal
//
// ## Example
//
// ```bash
// cat > data/config.json <<EOF
// {"settings": [{"provider": "duckdns", "domain": "home.duckdns.org", "token": "..."}]}
// EOF
// export DDNS_PERIOD=5m
// export DDNS_LISTENING_PORT=8000
//
// ddnsd
// ```
//
// See `config.rs` for every variable.

mod config;
mod server;

use anyhow::{Context, Result};
use ddns_core::config::EngineConfig;
use ddns_core::traits::StateStore;
use ddns_core::{DdnsEngine, EngineEvent, ProviderRegistry, RecordConfig, Scheduler};
use ddns_ip_dns::SystemHostLookup;
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::config::Config;
use crate::server::AppState;

/// Longest wait for in-flight updates and the store flush after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest wait for the event log to drain
const EVENT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DdnsExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level())
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");

    let records = match config.load_records() {
        Ok(records) => records,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };
    info!("Configuration loaded: {} record(s)", records.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(&config, records).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        if let Err(e) = daemon.run().await {
            error!("Daemon error: {:#}", e);
            DdnsExitCode::RuntimeError
        } else {
            DdnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Everything built at startup, before the first cycle
struct Daemon {
    engine: DdnsEngine,
    engine_config: EngineConfig,
    events: mpsc::Receiver<EngineEvent>,
    listener: TcpListener,
    lookup: Arc<SystemHostLookup>,
    root: String,
}

impl Daemon {
    async fn start(config: &Config, records: Vec<RecordConfig>) -> Result<Self> {
        let registry = ProviderRegistry::with_builtin_stores();
        ddns_providers::register_all(&registry);
        ddns_ip_dns::register(&registry);
        ddns_ip_http::register(&registry);
        ddns_ip_interface::register(&registry);
        debug!(providers = registry.list_providers().len(), "Registered providers");

        let ddns_config = config.ddns_config(records);
        ddns_config.validate()?;
        for record in &ddns_config.records {
            info!("Managing record: {}", record.id());
        }

        let providers = registry.create_providers(&ddns_config)?;
        let resolver = registry.create_resolver(&ddns_config)?;
        let store: Arc<dyn StateStore> =
            Arc::from(registry.create_state_store(&ddns_config.state_store).await?);
        info!(path = %config.store_path().display(), "Record store opened");

        let engine_config = ddns_config.engine.clone();
        let (engine, events) = DdnsEngine::builder(ddns_config)
            .providers(providers)
            .resolver(resolver)
            .store(store)
            .build()
            .await?;

        let lookup = Arc::new(SystemHostLookup::new()?);
        let listener = TcpListener::bind(("0.0.0.0", config.listening_port))
            .await
            .with_context(|| format!("Failed to listen on port {}", config.listening_port))?;

        Ok(Self {
            engine,
            engine_config,
            events,
            listener,
            lookup,
            root: config.root_path(),
        })
    }

    async fn run(self) -> Result<()> {
        let shutdown_signal = shutdown_signal()?;

        let (scheduler, trigger) = Scheduler::new(self.engine.clone(), &self.engine_config);
        let router = server::create_router(AppState {
            engine: self.engine,
            trigger,
            lookup: self.lookup,
            root: self.root,
        });

        let (scheduler_tx, scheduler_rx) = oneshot::channel();
        let (server_tx, server_rx) = oneshot::channel();
        let events = tokio::spawn(log_events(self.events));
        let scheduler_task = tokio::spawn(scheduler.run(scheduler_rx));
        let mut server_task = tokio::spawn(server::serve(self.listener, router, server_rx));

        let mut server_stopped_early = None;
        tokio::select! {
            signal = shutdown_signal => info!("Received shutdown signal: {}", signal),
            joined = &mut server_task => server_stopped_early = Some(joined),
        }

        info!("Shutting down daemon");
        let _ = server_tx.send(());
        let _ = scheduler_tx.send(());

        let scheduler_result = tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler_task)
            .await
            .map_err(|_| anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT))?;
        let stopped_early = server_stopped_early.is_some();
        let server_result = match server_stopped_early {
            Some(joined) => joined,
            None => server_task.await,
        };
        if tokio::time::timeout(EVENT_DRAIN_TIMEOUT, events).await.is_err() {
            warn!("Engine events were still pending at exit");
        }

        scheduler_result
            .context("Scheduler task panicked")?
            .context("Final record store flush failed")?;
        server_result
            .context("HTTP server task panicked")?
            .context("HTTP server failed")?;
        if stopped_early {
            anyhow::bail!("HTTP server stopped unexpectedly");
        }

        info!("Daemon stopped");
        Ok(())
    }
}

async fn log_events(events: mpsc::Receiver<EngineEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        match &event {
            EngineEvent::UpdateFailed { record, kind, message } if !kind.is_transient() => {
                warn!(record = %record, %kind, "Persistent update failure: {}", message);
            }
            EngineEvent::Stopped { reason } => info!(%reason, "Engine stopped"),
            _ => debug!(?event, "Engine event"),
        }
    }
}

/// Install SIGTERM and SIGINT handlers
///
/// Handlers are installed before the scheduler starts so a signal arriving
/// during the first cycle is not lost.
///
/// # Returns
///
/// A future resolving to the name of the signal received
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "SIGINT"
    })
}
