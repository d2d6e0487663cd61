// # Scheduler
//
// Single control loop driving the engine.
//
// ## Inputs
//
// - A periodic tick; the first tick fires immediately
// - Manual triggers from [`UpdateTrigger`]
// - A shutdown signal
//
// A tick or trigger arriving while a cycle is still running is dropped, so
// at most one `update_all` is in flight. On shutdown the loop cancels the
// running cycle, waits until no record is `updating`, flushes the store and
// returns.

use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::cancel::Cancellation;
use crate::config::EngineConfig;
use crate::engine::{CycleSummary, DdnsEngine, EngineEvent};
use crate::error::Result;

/// Handle requesting an immediate update cycle
///
/// Requests made while one is already pending collapse into it.
#[derive(Debug, Clone)]
pub struct UpdateTrigger {
    tx: mpsc::Sender<()>,
}

impl UpdateTrigger {
    /// Ask for a cycle
    ///
    /// # Returns
    ///
    /// `false` once the scheduler has stopped
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                debug!("Manual update already pending");
                true
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Periodic driver of [`DdnsEngine::update_all`]
pub struct Scheduler {
    engine: DdnsEngine,
    period: Duration,
    poll_interval: Duration,
    trigger_rx: mpsc::Receiver<()>,
    cancel: Cancellation,
}

impl Scheduler {
    /// Create a scheduler and the trigger feeding it
    ///
    /// # Parameters
    ///
    /// - `engine`: Engine to drive
    /// - `config`: Supplies the period and the shutdown poll interval
    pub fn new(engine: DdnsEngine, config: &EngineConfig) -> (Self, UpdateTrigger) {
        let (tx, rx) = mpsc::channel(1);
        let scheduler = Self {
            engine,
            period: config.period(),
            poll_interval: config.shutdown_poll_interval(),
            trigger_rx: rx,
            cancel: Cancellation::new(),
        };
        (scheduler, UpdateTrigger { tx })
    }

    /// Run until `shutdown` fires or its sender is dropped
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown, store flushed
    /// - `Err(Error)`: The final store flush failed
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<()> {
        self.engine.emit_event(EngineEvent::Started {
            records_count: self.engine.records_count(),
        });
        info!(
            records = self.engine.records_count(),
            period = ?self.period,
            "Scheduler started"
        );

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<CycleSummary>> = None;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => self.start_cycle(&mut in_flight, "tick"),
                Some(()) = self.trigger_rx.recv() => self.start_cycle(&mut in_flight, "manual"),
            }
        }

        self.trigger_rx.close();
        self.cancel.cancel();
        while self.engine.any_updating() {
            debug!("Waiting for in-flight updates to stop");
            tokio::time::sleep(self.poll_interval).await;
        }
        if let Some(cycle) = in_flight {
            if let Err(e) = cycle.await {
                error!("Update cycle task failed: {}", e);
            }
        }

        let flushed = self.engine.store().flush().await;
        if let Err(e) = &flushed {
            error!("Failed to flush record store: {}", e);
        }
        self.engine.emit_event(EngineEvent::Stopped {
            reason: "Shutdown signal".to_string(),
        });
        info!("Scheduler stopped");
        flushed
    }

    fn start_cycle(&self, in_flight: &mut Option<JoinHandle<CycleSummary>>, cause: &str) {
        if in_flight.as_ref().is_some_and(|cycle| !cycle.is_finished()) {
            debug!(cause, "Update cycle still running, dropping request");
            return;
        }
        debug!(cause, "Starting update cycle");
        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        *in_flight = Some(tokio::spawn(async move { engine.update_all(&cancel).await }));
    }
}
