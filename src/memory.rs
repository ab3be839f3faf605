use crate::error::Error;
use crate::model::{Claim, EventId};
use crate::store::SeenStore;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// In-memory set of seen identifiers that age out after a retention window.
///
/// Records are indexed by timestamp as well as by identifier, so a sweep only
/// touches the records it removes. There is no background timer: callers are
/// expected to sweep on the intake path, which [`SeenStore::claim`] does.
#[derive(Debug)]
pub struct ExpiringIdSet {
    window: Duration,
    inner: Mutex<Records>,
}

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<EventId, SystemTime>,
    by_time: BTreeSet<(SystemTime, EventId)>,
}

impl Records {
    fn is_live(&self, id: &EventId, now: SystemTime, window: Duration) -> bool {
        self.by_id
            .get(id)
            .is_some_and(|seen_at| !is_expired(*seen_at, now, window))
    }

    fn mark(&mut self, id: EventId, now: SystemTime) {
        if let Some(previous) = self.by_id.insert(id.clone(), now) {
            self.by_time.remove(&(previous, id.clone()));
        }
        self.by_time.insert((now, id));
    }

    fn remove(&mut self, id: &EventId) -> bool {
        match self.by_id.remove(id) {
            Some(seen_at) => {
                self.by_time.remove(&(seen_at, id.clone()));
                true
            }
            None => false,
        }
    }

    /// Remove the record only while it still carries `claimed_at`.
    fn remove_if_claimed_at(&mut self, id: &EventId, claimed_at: SystemTime) -> bool {
        if self.by_id.get(id) != Some(&claimed_at) {
            return false;
        }
        self.remove(id)
    }

    fn sweep(&mut self, now: SystemTime, window: Duration) -> usize {
        // Nothing can be older than the window before `now - window` exists.
        let Some(cutoff) = now.checked_sub(window) else {
            return 0;
        };

        let mut removed = 0;
        while self
            .by_time
            .first()
            .is_some_and(|(seen_at, _)| *seen_at < cutoff)
        {
            if let Some((_, id)) = self.by_time.pop_first() {
                self.by_id.remove(&id);
                removed += 1;
            }
        }
        removed
    }
}

/// Age is `now - seen_at`, clamped to zero for timestamps in the future.
fn is_expired(seen_at: SystemTime, now: SystemTime, window: Duration) -> bool {
    now.duration_since(seen_at)
        .is_ok_and(|age| age > window)
}

impl ExpiringIdSet {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            inner: Mutex::new(Records::default()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// A panic while holding the lock cannot leave the two indexes out of
    /// step, so a poisoned guard is still usable.
    fn records(&self) -> MutexGuard<'_, Records> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_seen(&self, id: &EventId, now: SystemTime) -> bool {
        self.records().is_live(id, now, self.window)
    }

    pub fn mark_seen(&self, id: EventId, now: SystemTime) {
        self.records().mark(id, now);
    }

    pub fn sweep(&self, now: SystemTime) -> usize {
        self.records().sweep(now, self.window)
    }

    pub fn forget(&self, id: &EventId) -> bool {
        self.records().remove(id)
    }

    pub fn claim(&self, id: EventId, now: SystemTime) -> Claim {
        let mut records = self.records();
        let swept = records.sweep(now, self.window);
        if records.is_live(&id, now, self.window) {
            return Claim {
                claimed: false,
                swept,
                claimed_at: now,
            };
        }
        records.mark(id, now);
        Claim {
            claimed: true,
            swept,
            claimed_at: now,
        }
    }

    /// Forget `id` only if its record is still the one claimed at `claimed_at`.
    ///
    /// A record that expired and was claimed again by a later delivery is left
    /// alone.
    pub fn release(&self, id: &EventId, claimed_at: SystemTime) -> bool {
        self.records().remove_if_claimed_at(id, claimed_at)
    }

    pub fn len(&self) -> usize {
        self.records().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SeenStore for ExpiringIdSet {
    fn window(&self) -> Duration {
        self.window
    }

    async fn is_seen(&self, id: &EventId, now: SystemTime) -> Result<bool, Error> {
        Ok(ExpiringIdSet::is_seen(self, id, now))
    }

    async fn mark_seen(&self, id: EventId, now: SystemTime) -> Result<(), Error> {
        ExpiringIdSet::mark_seen(self, id, now);
        Ok(())
    }

    async fn sweep(&self, now: SystemTime) -> Result<usize, Error> {
        Ok(ExpiringIdSet::sweep(self, now))
    }

    async fn forget(&self, id: &EventId) -> Result<bool, Error> {
        Ok(ExpiringIdSet::forget(self, id))
    }

    async fn claim(&self, id: EventId, now: SystemTime) -> Result<Claim, Error> {
        Ok(ExpiringIdSet::claim(self, id, now))
    }

    async fn release(&self, id: &EventId, claimed_at: SystemTime) -> Result<bool, Error> {
        Ok(ExpiringIdSet::release(self, id, claimed_at))
    }
}
