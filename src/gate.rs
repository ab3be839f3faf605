use crate::error::{Error, HandlerError};
use crate::memory::ExpiringIdSet;
use crate::model::{Effect, EventId, FailurePolicy, GateConfig, Outcome};
use crate::store::SeenStore;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;

#[cfg(feature = "tracing")]
use tracing::{debug, error, info, instrument, warn};

// No-op macros when tracing is disabled
#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! info {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! warn {
    ($($tt:tt)*) => {{}};
}
#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($tt:tt)*) => {{}};
}

/// Decides whether an inbound delivery reaches its handler
pub struct DedupGate {
    store: Arc<dyn SeenStore>,
    policy: FailurePolicy,
}

/// The result of claiming an identifier without running a handler
pub enum Admission {
    /// First delivery within the window - resolve the ticket once the work is done
    New(Ticket),
    /// Already seen within the window
    Duplicate,
}

impl fmt::Debug for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New(ticket) => f.debug_tuple("New").field(&ticket.id).finish(),
            Self::Duplicate => f.write_str("Duplicate"),
        }
    }
}

/// A claimed identifier waiting for its handler's result.
///
/// Dropping a ticket without resolving it leaves the identifier marked until
/// it ages out of the window. Releasing only ever removes the record this
/// ticket claimed, never a newer claim made after that record expired.
pub struct Ticket {
    id: EventId,
    claimed_at: SystemTime,
    store: Arc<dyn SeenStore>,
    policy: FailurePolicy,
}

impl Ticket {
    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn claimed_at(&self) -> SystemTime {
        self.claimed_at
    }

    async fn release(&self) -> Result<(), Error> {
        if !self.store.release(&self.id, self.claimed_at).await? {
            debug!("Record already expired or reclaimed - nothing to release");
        }
        Ok(())
    }

    /// Keep or release the identifier according to the handler result
    #[cfg_attr(feature = "tracing", instrument(skip(self, result), fields(event_id = %self.id)))]
    pub async fn resolve(self, result: Result<Effect, HandlerError>) -> Result<Outcome, Error> {
        match result {
            Ok(Effect::Committed) => {
                info!("Handler committed - keeping identifier for the window");
                Ok(Outcome::Success { committed: true })
            }
            Ok(Effect::Uncommitted) => {
                debug!("Handler made no durable change - releasing identifier");
                self.release().await?;
                Ok(Outcome::Success { committed: false })
            }
            Err(err) if self.policy.releases(&err) => {
                warn!(error = %err, "Handler failed - releasing identifier for retry");
                self.release().await?;
                Ok(Outcome::Failure {
                    retryable: true,
                    reason: err.to_string(),
                })
            }
            Err(err) => {
                error!(
                    error = %err,
                    "Handler failed with commit uncertain - identifier retained, manual reconciliation required"
                );
                Ok(Outcome::Failure {
                    retryable: false,
                    reason: err.to_string(),
                })
            }
        }
    }
}

impl DedupGate {
    pub fn new(store: Arc<dyn SeenStore>, policy: FailurePolicy) -> Self {
        Self { store, policy }
    }

    /// Gate backed by a fresh in-memory [`ExpiringIdSet`]
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(Arc::new(ExpiringIdSet::new(config.window)), config.on_failure)
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn store(&self) -> &Arc<dyn SeenStore> {
        &self.store
    }

    /// Claim an identifier at the current time.
    ///
    /// Low-level API for callers that run their own handler; most users should
    /// use [`DedupGate::admit`] instead.
    pub async fn try_admit(&self, id: EventId) -> Result<Admission, Error> {
        self.try_admit_at(id, SystemTime::now()).await
    }

    /// Claim an identifier at `now`.
    ///
    /// Expired records are swept, and the identifier is marked before this
    /// returns, so a redelivery racing the handler sees it as a duplicate.
    #[cfg_attr(feature = "tracing", instrument(skip(self, now), fields(event_id = %id)))]
    pub async fn try_admit_at(&self, id: EventId, now: SystemTime) -> Result<Admission, Error> {
        let claim = self.store.claim(id.clone(), now).await?;

        if claim.swept > 0 {
            debug!(swept = claim.swept, "Swept expired identifiers");
        }

        if !claim.claimed {
            info!("Duplicate delivery - skipping handler");
            return Ok(Admission::Duplicate);
        }

        debug!("New identifier - dispatching");
        Ok(Admission::New(Ticket {
            id,
            claimed_at: claim.claimed_at,
            store: Arc::clone(&self.store),
            policy: self.policy,
        }))
    }

    /// Run `handler` at most once per identifier within the window.
    pub async fn admit<F, Fut>(&self, id: EventId, handler: F) -> Result<Outcome, Error>
    where
        F: FnOnce(EventId) -> Fut,
        Fut: Future<Output = Result<Effect, HandlerError>>,
    {
        self.admit_at(id, SystemTime::now(), handler).await
    }

    /// [`DedupGate::admit`] with an explicit clock.
    ///
    /// A panicking handler is reported as an unexpected failure rather than
    /// unwinding through the gate, whether it panics while building its future
    /// or while it runs.
    pub async fn admit_at<F, Fut>(
        &self,
        id: EventId,
        now: SystemTime,
        handler: F,
    ) -> Result<Outcome, Error>
    where
        F: FnOnce(EventId) -> Fut,
        Fut: Future<Output = Result<Effect, HandlerError>>,
    {
        let ticket = match self.try_admit_at(id, now).await? {
            Admission::New(ticket) => ticket,
            Admission::Duplicate => return Ok(Outcome::Duplicate),
        };

        let id = ticket.id.clone();
        let result = AssertUnwindSafe(async move { handler(id).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Unexpected(panic_message(panic))));

        ticket.resolve(result).await
    }

    /// Drop the record for `id` so the next delivery dispatches again
    #[cfg_attr(feature = "tracing", instrument(skip(self), fields(event_id = %id)))]
    pub async fn forget(&self, id: &EventId) -> Result<bool, Error> {
        self.store.forget(id).await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("handler panicked: {detail}")
}
