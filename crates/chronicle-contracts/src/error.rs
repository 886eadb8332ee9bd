//! Error types for the Chronicle ledger.
//!
//! All fallible ledger operations return `LedgerResult<T>`.  Every variant
//! carries an `ErrorContext` naming the operation, the sequence number it was
//! working on, and the context id of the ledger, so an error about the log is
//! itself a usable forensic record.

use std::fmt;

use thiserror::Error;

/// Where an error happened: operation name, sequence, and context id.
///
/// Fields are optional because some failures (opening a store, parsing a
/// config file) happen before any sequence or context is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// The ledger operation that failed (e.g. `"append"`, `"verify_chain"`).
    pub operation: &'static str,
    /// The sequence number being written or checked, if known.
    pub sequence: Option<u64>,
    /// The context id of the ledger instance, if known.
    pub context_id: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            sequence: None,
            context_id: None,
        }
    }

    pub fn at(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn in_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if let Some(seq) = self.sequence {
            write!(f, " at sequence {}", seq)?;
        }
        if let Some(ctx) = &self.context_id {
            write!(f, " (context '{}')", ctx)?;
        }
        Ok(())
    }
}

/// The unified error type for the Chronicle ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing persisted storage failed.
    ///
    /// On the append path this is always propagated: a record that cannot be
    /// persisted must surface as a visible error, never be dropped.
    #[error("I/O failure during {ctx}: {source}")]
    Io {
        ctx: ErrorContext,
        #[source]
        source: std::io::Error,
    },

    /// A payload could not be canonicalized, or a persisted record could not
    /// be decoded.  Payload rejections happen before anything is written.
    #[error("serialization error during {ctx}: {reason}")]
    Serialization { ctx: ErrorContext, reason: String },

    /// Verification found a record that does not match the chain.
    #[error("chain integrity violation during {ctx}: first bad index {first_bad_index}: {reason}")]
    ChainIntegrity {
        ctx: ErrorContext,
        first_bad_index: u64,
        reason: String,
    },

    /// An anchor could not be computed or committed.
    ///
    /// Logged and retried by the anchor worker; never fails the append that
    /// triggered it.
    #[error("anchor computation failed during {ctx}: {reason}")]
    AnchorCompute { ctx: ErrorContext, reason: String },

    /// A configuration file is missing, unreadable, or malformed.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A long-running read was cancelled or hit its deadline.
    #[error("{ctx} cancelled: {reason}")]
    Cancelled { ctx: ErrorContext, reason: String },

    /// An internal lock was poisoned by a panicking thread.
    #[error("lock poisoned during {ctx}")]
    LockPoisoned { ctx: ErrorContext },
}

impl LedgerError {
    /// The context attached to this error, if the variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            LedgerError::Io { ctx, .. }
            | LedgerError::Serialization { ctx, .. }
            | LedgerError::ChainIntegrity { ctx, .. }
            | LedgerError::AnchorCompute { ctx, .. }
            | LedgerError::Cancelled { ctx, .. }
            | LedgerError::LockPoisoned { ctx } => Some(ctx),
            LedgerError::Config { .. } => None,
        }
    }
}

/// Convenience alias used throughout the Chronicle crates.
pub type LedgerResult<T> = Result<T, LedgerError>;
