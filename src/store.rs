use crate::model::{Claim, EventId};
use crate::Error;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};

/// Abstraction over the set of recently seen event identifiers
#[async_trait]
pub trait SeenStore: Send + Sync {
    /// How long a record stays live after it was marked
    fn window(&self) -> Duration;

    /// True iff a non-expired record exists for `id` at `now`
    async fn is_seen(&self, id: &EventId, now: SystemTime) -> Result<bool, Error>;

    /// Insert or refresh the record for `id`
    async fn mark_seen(&self, id: EventId, now: SystemTime) -> Result<(), Error>;

    /// Remove every record older than the window, returning how many went
    async fn sweep(&self, now: SystemTime) -> Result<usize, Error>;

    /// Remove the record for `id`, returning whether one existed
    async fn forget(&self, id: &EventId) -> Result<bool, Error>;

    /// Sweep, check and mark as one atomic step
    async fn claim(&self, id: EventId, now: SystemTime) -> Result<Claim, Error>;

    /// Remove the record for `id` only if it still carries `claimed_at`,
    /// returning whether it was removed
    async fn release(&self, id: &EventId, claimed_at: SystemTime) -> Result<bool, Error>;
}
