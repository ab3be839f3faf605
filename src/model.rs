use crate::error::{Error, HandlerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

/// Default retention window for seen identifiers.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Environment variable holding the retention window in seconds.
pub const WINDOW_ENV: &str = "LETHE_DEDUP_WINDOW_SECS";

/// Environment variable holding the failure policy name.
pub const FAILURE_POLICY_ENV: &str = "LETHE_FAILURE_POLICY";

/// Opaque identifier assigned to an inbound event by the upstream transport
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What a successful handler did to external state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// A durable side effect happened; redeliveries must not repeat it.
    Committed,
    /// Nothing durable happened; a redelivery may run the handler again.
    Uncommitted,
}

/// The result of passing one delivery through the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The identifier was seen within the window; the handler did not run.
    Duplicate,
    /// The handler ran and succeeded.
    Success { committed: bool },
    /// The handler ran and failed. `retryable` is true when the identifier
    /// was released, false when it is retained as commit-uncertain.
    Failure { retryable: bool, reason: String },
}

impl Outcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }

    /// Whether the handler was invoked for this delivery
    pub fn dispatched(&self) -> bool {
        !self.is_duplicate()
    }

    /// A failure whose identifier was retained and needs reconciliation
    pub fn is_commit_uncertain(&self) -> bool {
        matches!(
            self,
            Self::Failure {
                retryable: false,
                ..
            }
        )
    }
}

/// Result of an atomic sweep-check-mark on a seen store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    /// True when the identifier was not seen and is now marked.
    pub claimed: bool,
    /// Number of expired records removed before the check.
    pub swept: usize,
    /// Timestamp of the record this claim owns, when `claimed` is true.
    pub claimed_at: SystemTime,
}

/// What the gate does with an identifier when its handler fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Forget on transient failures, retain on everything else.
    #[default]
    Classified,
    /// Forget on every failure.
    ForgetOnFailure,
    /// Retain on every failure.
    RetainOnFailure,
}

impl FailurePolicy {
    /// Whether the identifier should be forgotten after `err`
    pub fn releases(&self, err: &HandlerError) -> bool {
        match self {
            Self::Classified => err.is_retryable(),
            Self::ForgetOnFailure => true,
            Self::RetainOnFailure => false,
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classified" => Ok(Self::Classified),
            "forget" | "forget_on_failure" => Ok(Self::ForgetOnFailure),
            "retain" | "retain_on_failure" => Ok(Self::RetainOnFailure),
            other => Err(Error::Config(format!("unknown failure policy '{other}'"))),
        }
    }
}

/// Configuration for a dedup gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// How long a seen identifier suppresses redeliveries
    #[serde(rename = "window_secs", with = "window_secs")]
    pub window: Duration,
    /// What to do with the identifier when a handler fails
    pub on_failure: FailurePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            on_failure: FailurePolicy::default(),
        }
    }
}

impl GateConfig {
    pub fn new(window: Duration, on_failure: FailurePolicy) -> Self {
        Self { window, on_failure }
    }

    /// Load from `LETHE_DEDUP_WINDOW_SECS` and `LETHE_FAILURE_POLICY`,
    /// falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_vars<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(WINDOW_ENV) {
            let secs = raw
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("{WINDOW_ENV}='{raw}': {e}")))?;
            config.window = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(FAILURE_POLICY_ENV) {
            config.on_failure = raw.parse()?;
        }

        Ok(config)
    }
}

mod window_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(window: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(window.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
