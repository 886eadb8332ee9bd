//! Anchor scheduling: retry/backoff settings and the background worker.
//!
//! Anchors move through `triggered → computing → committed | failed`.  A
//! trigger only enqueues work; the worker thread computes the rolling digest
//! and commits the anchor, retrying with exponential backoff.  A failure is
//! logged and dropped: the entry that triggered it is already committed and
//! stays that way, and the next anchor covers the unanchored span.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use chronicle_contracts::{anchor::TriggerReason, error::LedgerResult};

use crate::ledger::LedgerInner;

/// Where anchor computation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// On a dedicated worker thread, off the append path.
    #[default]
    Background,
    /// On the appending thread, right after the commit.
    Inline,
}

/// Exponential backoff for anchor retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        let capped = delay_ms.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// Run `op` until it succeeds or `retry.max_attempts` is exhausted.
///
/// Each failure is logged at `warn`; exhaustion at `error`.  Returns the last
/// error on exhaustion.
pub(crate) fn with_retry<T>(
    retry: &RetryConfig,
    what: &str,
    mut op: impl FnMut() -> LedgerResult<T>,
) -> LedgerResult<T> {
    let attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                let delay = retry.delay_for_attempt(attempt);
                warn!(
                    what = %what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "anchor attempt failed; retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                error!(what = %what, attempts, error = %e, "anchor failed after all retries");
                return Err(e);
            }
        }
    }
}

pub(crate) enum AnchorJob {
    Anchor { up_to: u64, reason: TriggerReason },
    Flush(Sender<()>),
    Shutdown,
}

/// Handle to the background anchor thread.
///
/// Dropping the handle drains queued jobs and joins the thread.
pub(crate) struct AnchorWorker {
    tx: Sender<AnchorJob>,
    handle: Option<JoinHandle<()>>,
}

impl AnchorWorker {
    pub(crate) fn spawn(inner: Arc<LedgerInner>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let name = format!("chronicle-anchor-{}", inner.name());
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(inner, rx))?;
        Ok(Self {
            tx,
            handle: Some(handle),
        })
    }

    /// Queue an anchor job.  Returns false if the worker has gone away.
    pub(crate) fn submit(&self, up_to: u64, reason: TriggerReason) -> bool {
        self.tx.send(AnchorJob::Anchor { up_to, reason }).is_ok()
    }

    /// Block until every job queued before this call has finished.
    pub(crate) fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        if self.tx.send(AnchorJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for AnchorWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(AnchorJob::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("anchor worker thread panicked");
            }
        }
    }
}

fn run(inner: Arc<LedgerInner>, rx: Receiver<AnchorJob>) {
    debug!(ledger = %inner.name(), "anchor worker started");
    while let Ok(job) = rx.recv() {
        match job {
            AnchorJob::Anchor { up_to, reason } => {
                inner.anchor_with_retry(up_to, reason);
            }
            AnchorJob::Flush(done) => {
                let _ = done.send(());
            }
            AnchorJob::Shutdown => break,
        }
    }
    info!(ledger = %inner.name(), "anchor worker stopped");
}
