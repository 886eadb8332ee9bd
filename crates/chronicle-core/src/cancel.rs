//! Cooperative cancellation for long-running reads.
//!
//! Verification and export check their `ScanOptions` once per entry.  A
//! cancelled or expired read returns `LedgerError::Cancelled` naming the
//! sequence it had reached; nothing already committed is affected.

use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chronicle_contracts::error::{ErrorContext, LedgerError, LedgerResult};

/// A shareable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Scope and limits for a verification or export scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Inclusive sequence range to check.  `None` means the whole chain.
    pub range: Option<RangeInclusive<u64>>,
    pub cancel: Option<CancelToken>,
    pub deadline: Option<Instant>,
}

impl ScanOptions {
    /// Check the whole chain with no limits.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn range(range: RangeInclusive<u64>) -> Self {
        Self {
            range: Some(range),
            ..Self::default()
        }
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Return `Cancelled` if the token fired or the deadline passed.
    pub(crate) fn checkpoint(&self, operation: &'static str, sequence: u64) -> LedgerResult<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(LedgerError::Cancelled {
                ctx: ErrorContext::new(operation).at(sequence),
                reason: "cancelled by caller".to_string(),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(LedgerError::Cancelled {
                ctx: ErrorContext::new(operation).at(sequence),
                reason: "deadline exceeded".to_string(),
            });
        }
        Ok(())
    }
}
