//! Ledger configuration schema.
//!
//! A `LedgerConfig` is deserialized from TOML.  Every section is optional;
//! an empty document yields the defaults below.
//!
//! ```toml
//! name = "SB-1"
//! data_dir = "/var/lib/chronicle/SB-1"
//!
//! [anchor]
//! count_threshold = 100
//! interval_secs = 300
//! always_anchor = ["CORRECTION", "ERROR"]
//! score_threshold = 0.8
//! mode = "background"
//!
//! [anchor.retry]
//! max_attempts = 5
//! initial_delay_ms = 100
//!
//! [signing]
//! key_id = "ledger-2026"
//! key_env = "CHRONICLE_SIGNING_KEY"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chronicle_contracts::{
    error::{LedgerError, LedgerResult},
    event::EventType,
};
use chronicle_core::{AnchorMode, HmacSigner, RetryConfig};

/// When to checkpoint.  Any trigger left unset is disabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorPolicyConfig {
    /// Anchor once this many entries have been committed since the last one.
    pub count_threshold: Option<u64>,

    /// Anchor when this many seconds have passed since the last one.
    /// Checked on commit, so an idle ledger is not anchored.
    pub interval_secs: Option<u64>,

    /// Event types that anchor immediately after they are committed.
    pub always_anchor: Vec<EventType>,

    /// Anchor when an append's external score is strictly greater than this.
    pub score_threshold: Option<f64>,

    pub mode: AnchorMode,

    pub retry: RetryConfig,
}

impl Default for AnchorPolicyConfig {
    fn default() -> Self {
        Self {
            count_threshold: Some(100),
            interval_secs: None,
            always_anchor: vec![EventType::Correction, EventType::Error],
            score_threshold: None,
            mode: AnchorMode::Background,
            retry: RetryConfig::default(),
        }
    }
}

/// Where the HMAC signing key comes from.
///
/// Exactly one of `key_hex` and `key_env` must be set.  `key_env` names an
/// environment variable holding the hex key, which keeps secrets out of the
/// config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningConfig {
    pub key_id: String,
    #[serde(default)]
    pub key_hex: Option<String>,
    #[serde(default)]
    pub key_env: Option<String>,
}

impl SigningConfig {
    /// Resolve the key and build a signer.
    pub fn signer(&self) -> LedgerResult<HmacSigner> {
        let key_hex = match (&self.key_hex, &self.key_env) {
            (Some(hex), None) => hex.clone(),
            (None, Some(var)) => std::env::var(var).map_err(|e| LedgerError::Config {
                reason: format!("signing key variable '{}' is not usable: {}", var, e),
            })?,
            (Some(_), Some(_)) => {
                return Err(LedgerError::Config {
                    reason: "signing: set only one of key_hex and key_env".to_string(),
                })
            }
            (None, None) => {
                return Err(LedgerError::Config {
                    reason: "signing: one of key_hex or key_env is required".to_string(),
                })
            }
        };
        HmacSigner::from_hex(self.key_id.clone(), key_hex.trim())
    }
}

/// Top-level configuration for one ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger name used in log lines; defaults to the store path.
    pub name: Option<String>,

    /// Directory holding `entries.jsonl` and `anchors.jsonl`.
    pub data_dir: Option<PathBuf>,

    pub anchor: AnchorPolicyConfig,

    pub signing: Option<SigningConfig>,
}

impl LedgerConfig {
    /// Parse `s` as TOML and validate it.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, does not match
    /// the schema, or fails validation.
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse ledger TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as ledger configuration.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn validate(&self) -> LedgerResult<()> {
        let anchor = &self.anchor;
        if anchor.count_threshold == Some(0) {
            return Err(LedgerError::Config {
                reason: "anchor.count_threshold must be at least 1".to_string(),
            });
        }
        if anchor.interval_secs == Some(0) {
            return Err(LedgerError::Config {
                reason: "anchor.interval_secs must be at least 1".to_string(),
            });
        }
        if anchor.score_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(LedgerError::Config {
                reason: "anchor.score_threshold must be a finite number".to_string(),
            });
        }
        if anchor.retry.max_attempts == 0 {
            return Err(LedgerError::Config {
                reason: "anchor.retry.max_attempts must be at least 1".to_string(),
            });
        }
        if !(anchor.retry.multiplier.is_finite() && anchor.retry.multiplier >= 1.0) {
            return Err(LedgerError::Config {
                reason: "anchor.retry.multiplier must be a finite number >= 1.0".to_string(),
            });
        }
        Ok(())
    }
}
