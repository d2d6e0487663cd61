//! Cycle cancellation signal
//!
//! A [`Cancellation`] is shared by the scheduler and every record worker of
//! a cycle. Cancelling it is sticky: workers that have not started yet see
//! it through [`Cancellation::is_cancelled`], in-flight ones through
//! [`Cancellation::cancelled`].

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Cancellation {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Signal every holder; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once [`Cancellation::cancel`] has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in self, so waiting can only end by cancellation
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
