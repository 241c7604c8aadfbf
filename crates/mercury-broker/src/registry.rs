//! Session registry: identifier -> session records.
//!
//! The id map sits behind one coarse lock held only for insert/remove/lookup,
//! never across an execution. Each session owns its execution channel
//! exclusively; the channel and namespace tracker live behind the session's
//! own async lock, while interrupt plumbing and the in-flight claim sit
//! outside it so they stay reachable during a running submission.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use mercury_core::channel::{ChannelFactory, ExecutionChannel, InterruptHandle};
use mercury_core::namespace::NamespaceTracker;

use crate::error::{BrokerError, BrokerResult};

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered but never activated.
    Created,
    /// The registry's implicit target.
    Active,
    /// Previously activated, currently not the implicit target.
    Idle,
    /// Torn down; the record is gone from the registry.
    Destroyed,
}

/// Session metadata returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub id: String,
    pub state: SessionState,
    /// Unix timestamp (milliseconds) of the last activity on the session.
    pub last_activity_ms: u64,
    /// Whether the backing interpreter was alive at last contact.
    pub alive: bool,
}

/// State behind the session's async lock: the channel and the tracker.
pub(crate) struct SessionInner {
    /// Taken out while a submission runs on the blocking pool.
    pub channel: Option<Box<dyn ExecutionChannel>>,
    pub tracker: NamespaceTracker,
}

struct MetaInner {
    state: SessionState,
    last_activity: Instant,
    last_activity_ms: u64,
    alive: bool,
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// One registered session.
pub(crate) struct SessionEntry {
    pub id: String,
    pub inner: AsyncMutex<SessionInner>,
    meta: StdMutex<MetaInner>,
    /// Claimed for the duration of a submission (or an eviction).
    pub in_flight: AtomicBool,
    /// Interrupt handle of the running submission, if one is in flight.
    pub interrupt: StdMutex<Option<InterruptHandle>>,
}

impl SessionEntry {
    fn new(id: &str, channel: Box<dyn ExecutionChannel>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            inner: AsyncMutex::new(SessionInner {
                channel: Some(channel),
                tracker: NamespaceTracker::new(),
            }),
            meta: StdMutex::new(MetaInner {
                state: SessionState::Created,
                last_activity: Instant::now(),
                last_activity_ms: unix_millis(),
                alive: true,
            }),
            in_flight: AtomicBool::new(false),
            interrupt: StdMutex::new(None),
        })
    }

    /// Record activity on the session.
    pub fn touch(&self) {
        let mut meta = self.meta.lock().expect("session meta lock poisoned");
        meta.last_activity = Instant::now();
        meta.last_activity_ms = unix_millis();
    }

    pub fn idle_for(&self) -> Duration {
        self.meta
            .lock()
            .expect("session meta lock poisoned")
            .last_activity
            .elapsed()
    }

    pub fn state(&self) -> SessionState {
        self.meta.lock().expect("session meta lock poisoned").state
    }

    pub fn set_state(&self, state: SessionState) {
        self.meta.lock().expect("session meta lock poisoned").state = state;
    }

    pub fn set_alive(&self, alive: bool) {
        self.meta.lock().expect("session meta lock poisoned").alive = alive;
    }

    pub fn metadata(&self) -> SessionMetadata {
        let meta = self.meta.lock().expect("session meta lock poisoned");
        SessionMetadata {
            id: self.id.clone(),
            state: meta.state,
            last_activity_ms: meta.last_activity_ms,
            alive: meta.alive,
        }
    }

    /// Claim the in-flight slot. Exactly one claimant succeeds at a time.
    pub fn try_claim(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Release the in-flight slot.
    pub fn release(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Fire the interrupt handle of the running submission, if any.
    pub fn fire_interrupt(&self) -> bool {
        let guard = self.interrupt.lock().expect("interrupt lock poisoned");
        match guard.as_ref() {
            Some(handle) => {
                handle.interrupt();
                true
            }
            None => false,
        }
    }
}

/// Releases a session's in-flight claim when dropped, so no early return in
/// the execute path can leave the session wedged busy.
pub(crate) struct InFlightGuard(pub Arc<SessionEntry>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.release();
    }
}

struct RegistryInner {
    sessions: FxHashMap<String, Arc<SessionEntry>>,
    /// Session ids in creation order, for `list`.
    order: Vec<String>,
    /// The implicit target for calls that omit an explicit identifier.
    active: Option<String>,
}

/// Registry of execution sessions.
///
/// An explicit instance held by the broker, never process-global state, so
/// independent brokers can coexist in one process.
pub struct SessionRegistry {
    factory: Arc<dyn ChannelFactory>,
    inner: StdMutex<RegistryInner>,
}

impl SessionRegistry {
    pub fn new(factory: Arc<dyn ChannelFactory>) -> Self {
        Self {
            factory,
            inner: StdMutex::new(RegistryInner {
                sessions: FxHashMap::default(),
                order: Vec::new(),
                active: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().expect("registry lock poisoned")
    }

    /// Open a fresh channel for the given session id.
    pub(crate) fn open_channel(&self, id: &str) -> BrokerResult<Box<dyn ExecutionChannel>> {
        self.factory.open().map_err(|source| BrokerError::SessionInit {
            id: id.to_string(),
            source,
        })
    }

    /// Idempotent create-or-lookup. The channel is allocated outside the
    /// registry lock; if two callers race on the same id, exactly one
    /// channel survives.
    pub(crate) fn create_or_get(&self, id: &str) -> BrokerResult<(Arc<SessionEntry>, bool)> {
        if let Some(entry) = self.lock().sessions.get(id) {
            return Ok((entry.clone(), false));
        }

        let channel = self.open_channel(id)?;

        let entry = {
            let mut guard = self.lock();
            if let Some(existing) = guard.sessions.get(id) {
                let existing = existing.clone();
                drop(guard);
                // Lost the race; tear down the extra channel.
                let mut extra = channel;
                let _ = extra.shutdown();
                return Ok((existing, false));
            }
            let entry = SessionEntry::new(id, channel);
            guard.sessions.insert(id.to_string(), entry.clone());
            guard.order.push(id.to_string());
            entry
        };

        tracing::info!(session = %id, "session created");
        Ok((entry, true))
    }

    pub(crate) fn get(&self, id: &str) -> BrokerResult<Arc<SessionEntry>> {
        self.lock()
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SessionNotFound(id.to_string()))
    }

    /// Resolve an execution target: an explicit id, or the implicit active
    /// session when the caller omits one.
    pub(crate) fn resolve(&self, target: Option<&str>) -> BrokerResult<Arc<SessionEntry>> {
        match target {
            Some(id) => self.get(id),
            None => {
                let active = self.lock().active.clone();
                match active {
                    Some(id) => self.get(&id),
                    None => Err(BrokerError::SessionNotFound(
                        "no active session; specify a session id".to_string(),
                    )),
                }
            }
        }
    }

    /// Make `id` the implicit target, demoting the previous one to idle.
    pub fn activate(&self, id: &str) -> BrokerResult<SessionMetadata> {
        let mut guard = self.lock();
        let entry = guard
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SessionNotFound(id.to_string()))?;

        if let Some(previous) = guard.active.take()
            && previous != id
            && let Some(prev_entry) = guard.sessions.get(&previous)
        {
            prev_entry.set_state(SessionState::Idle);
        }
        guard.active = Some(id.to_string());
        entry.set_state(SessionState::Active);
        drop(guard);

        tracing::debug!(session = %id, "session activated");
        Ok(entry.metadata())
    }

    /// Drop `id` as the implicit target. Callers must pass explicit ids
    /// until another session is activated.
    pub fn deactivate(&self, id: &str) -> BrokerResult<SessionMetadata> {
        let mut guard = self.lock();
        let entry = guard
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| BrokerError::SessionNotFound(id.to_string()))?;

        if guard.active.as_deref() == Some(id) {
            guard.active = None;
        }
        entry.set_state(SessionState::Idle);
        drop(guard);

        tracing::debug!(session = %id, "session deactivated");
        Ok(entry.metadata())
    }

    /// Currently active session id, if any.
    pub fn active_id(&self) -> Option<String> {
        self.lock().active.clone()
    }

    /// Remove a session record. Returns the entry for teardown, or `None`
    /// if the id was unknown.
    pub(crate) fn remove(&self, id: &str) -> Option<Arc<SessionEntry>> {
        let mut guard = self.lock();
        let entry = guard.sessions.remove(id)?;
        guard.order.retain(|known| known != id);
        if guard.active.as_deref() == Some(id) {
            guard.active = None;
        }
        Some(entry)
    }

    /// Session metadata in creation order.
    pub fn list(&self) -> Vec<SessionMetadata> {
        let guard = self.lock();
        guard
            .order
            .iter()
            .filter_map(|id| guard.sessions.get(id))
            .map(|entry| entry.metadata())
            .collect()
    }

    /// Snapshot of all entries, for the idle sweeper.
    pub(crate) fn entries(&self) -> Vec<Arc<SessionEntry>> {
        let guard = self.lock();
        guard
            .order
            .iter()
            .filter_map(|id| guard.sessions.get(id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&SessionState::Created).unwrap(),
            r#""created""#
        );
        assert_eq!(
            serde_json::to_string(&SessionState::Destroyed).unwrap(),
            r#""destroyed""#
        );
    }

    #[test]
    fn test_in_flight_claim_is_exclusive() {
        struct NoopChannel;
        impl ExecutionChannel for NoopChannel {
            fn submit(
                &mut self,
                _code: &str,
            ) -> mercury_core::Result<Vec<mercury_core::ResultEvent>> {
                Ok(Vec::new())
            }
            fn interrupt_handle(&self) -> InterruptHandle {
                InterruptHandle::inert()
            }
            fn list_namespace(
                &mut self,
            ) -> mercury_core::Result<Vec<mercury_core::NamespaceBinding>> {
                Ok(Vec::new())
            }
            fn is_alive(&mut self) -> bool {
                true
            }
            fn shutdown(&mut self) -> mercury_core::Result<()> {
                Ok(())
            }
        }

        let entry = SessionEntry::new("nb1", Box::new(NoopChannel));
        assert!(entry.try_claim());
        assert!(!entry.try_claim());

        drop(InFlightGuard(entry.clone()));
        assert!(entry.try_claim());
    }
}
