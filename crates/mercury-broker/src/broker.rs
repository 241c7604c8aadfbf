//! The execution broker: the surface exposed to the AI driver.
//!
//! Every submission returns one structured response envelope; session
//! management returns metadata or a typed failure. Execution-time failures
//! are successful broker operations reporting a user-code failure.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

use mercury_core::channel::ChannelFactory;
use mercury_core::classify::classify;
use mercury_core::envelope::ResponseEnvelope;
use mercury_core::event::{Completion, RawTrace, ResultEvent, completion_of};
use mercury_core::guidance::compose;
use mercury_core::namespace::NamespaceSummary;

use crate::BrokerConfig;
use crate::error::{BrokerError, BrokerResult};
use crate::registry::{InFlightGuard, SessionEntry, SessionMetadata, SessionRegistry, SessionState};

/// Per-submission options supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Deadline after which the submission is interrupted and reported as
    /// `Timeout`. Falls back to the broker's configured default.
    pub timeout: Option<Duration>,
}

/// Opaque save trigger for the document layer.
///
/// Invoked after every successful execution; the broker consumes no return
/// value from it.
pub trait PersistenceHook: Send + Sync {
    fn save(&self, session_id: &str);
}

/// Session-addressable execution broker.
pub struct ExecutionBroker {
    registry: Arc<SessionRegistry>,
    config: BrokerConfig,
    persistence: Option<Arc<dyn PersistenceHook>>,
}

impl ExecutionBroker {
    /// Create a broker owning a fresh registry over the given factory.
    pub fn new(factory: Arc<dyn ChannelFactory>, config: BrokerConfig) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new(factory)),
            config,
            persistence: None,
        }
    }

    /// Attach a persistence hook fired after successful executions.
    pub fn with_persistence(mut self, hook: Arc<dyn PersistenceHook>) -> Self {
        self.persistence = Some(hook);
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Idempotent session creation; returns the existing record when the id
    /// is already registered.
    pub fn create_or_get(&self, id: &str) -> BrokerResult<SessionMetadata> {
        let (entry, _created) = self.registry.create_or_get(id)?;
        Ok(entry.metadata())
    }

    /// Make `id` the implicit execution target.
    pub fn activate(&self, id: &str) -> BrokerResult<SessionMetadata> {
        self.registry.activate(id)
    }

    /// Clear `id` as the implicit execution target.
    pub fn deactivate(&self, id: &str) -> BrokerResult<SessionMetadata> {
        self.registry.deactivate(id)
    }

    /// Session metadata in creation order.
    pub fn list(&self) -> Vec<SessionMetadata> {
        self.registry.list()
    }

    /// Interrupt the in-flight submission on `id`, if any.
    ///
    /// Returns whether an interrupt was delivered. The session stays alive
    /// and usable either way.
    pub fn interrupt(&self, id: &str) -> BrokerResult<bool> {
        let entry = self.registry.get(id)?;
        if !entry.in_flight.load(Ordering::SeqCst) {
            return Ok(false);
        }
        let delivered = entry.fire_interrupt();
        if delivered {
            tracing::info!(session = %id, "interrupt requested");
        }
        Ok(delivered)
    }

    /// Tear down and recreate the session's channel, preserving the id and
    /// discarding interpreter state and the namespace summary.
    pub async fn restart(&self, id: &str) -> BrokerResult<SessionMetadata> {
        let entry = self.registry.get(id)?;

        // Hasten any in-flight submission; the session lock below waits for
        // it to finish.
        entry.fire_interrupt();

        let mut inner = entry.inner.lock().await;
        if let Some(mut old) = inner.channel.take() {
            let _ = tokio::task::spawn_blocking(move || old.shutdown()).await;
        }

        let channel = self.registry.open_channel(id)?;
        inner.channel = Some(channel);
        inner.tracker.clear();
        drop(inner);

        entry.set_alive(true);
        entry.touch();
        tracing::info!(session = %id, "session restarted");
        Ok(entry.metadata())
    }

    /// Terminate the session's channel and remove the record.
    ///
    /// Idempotent: destroying an unknown or already-destroyed id is a no-op.
    pub async fn destroy(&self, id: &str) -> BrokerResult<()> {
        let Some(entry) = self.registry.remove(id) else {
            return Ok(());
        };

        entry.fire_interrupt();

        let mut inner = entry.inner.lock().await;
        if let Some(mut channel) = inner.channel.take() {
            let _ = tokio::task::spawn_blocking(move || channel.shutdown()).await;
        }
        inner.tracker.clear();
        drop(inner);

        entry.set_state(SessionState::Destroyed);
        entry.set_alive(false);
        tracing::info!(session = %id, "session destroyed");
        Ok(())
    }

    /// Snapshot of a session's namespace summary.
    pub async fn namespace(&self, id: &str) -> BrokerResult<NamespaceSummary> {
        let entry = self.registry.get(id)?;
        let inner = entry.inner.lock().await;
        Ok(inner.tracker.summary().clone())
    }

    /// Execute code on the target session and return its response envelope.
    ///
    /// `target` is an explicit session id, or `None` for the implicit
    /// active session. A session with a submission already in flight
    /// rejects with `SessionBusy` rather than queueing.
    pub async fn execute(
        &self,
        target: Option<&str>,
        code: &str,
        options: ExecuteOptions,
    ) -> BrokerResult<ResponseEnvelope> {
        let entry = self.registry.resolve(target)?;

        if !entry.try_claim() {
            return Err(BrokerError::SessionBusy(entry.id.clone()));
        }
        let _claim = InFlightGuard(entry.clone());

        self.execute_claimed(&entry, code, &options).await
    }

    async fn execute_claimed(
        &self,
        entry: &Arc<SessionEntry>,
        code: &str,
        options: &ExecuteOptions,
    ) -> BrokerResult<ResponseEnvelope> {
        let mut inner = entry.inner.lock().await;
        let mut channel = inner.channel.take().ok_or_else(|| BrokerError::SessionInit {
            id: entry.id.clone(),
            source: mercury_core::Error::ChannelClosed,
        })?;

        let handle = channel.interrupt_handle();
        *entry.interrupt.lock().expect("interrupt lock poisoned") = Some(handle.clone());

        // Deadline watchdog: cancels through the same interrupt path a user
        // does; the flag tells classification apart afterwards.
        let timed_out = Arc::new(AtomicBool::new(false));
        let timeout = options.timeout.or(self.config.default_timeout);
        let watchdog = timeout.map(|limit| {
            let handle = handle.clone();
            let timed_out = timed_out.clone();
            let session = entry.id.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                timed_out.store(true, Ordering::SeqCst);
                tracing::warn!(session = %session, "submission deadline reached, interrupting");
                handle.interrupt();
            })
        });

        // The channel blocks on kernel I/O; run it on the blocking pool and
        // take the namespace listing in the same hop when the submission
        // succeeded.
        let code = code.to_string();
        let start = Instant::now();
        let joined = tokio::task::spawn_blocking(move || {
            let submitted = channel.submit(&code);
            let listing = match &submitted {
                Ok(events)
                    if matches!(completion_of(events), Some(Completion::Success { .. })) =>
                {
                    Some(channel.list_namespace())
                }
                _ => None,
            };
            (channel, submitted, listing)
        })
        .await;
        let duration = start.elapsed();

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }
        *entry.interrupt.lock().expect("interrupt lock poisoned") = None;

        let (events, listing) = match joined {
            Ok((mut channel, submitted, listing)) => {
                let alive = channel.is_alive();
                inner.channel = Some(channel);
                entry.set_alive(alive);
                match submitted {
                    Ok(events) => (events, listing),
                    Err(e) => {
                        tracing::warn!(session = %entry.id, "submission failed in channel: {}", e);
                        (synthesized_failure(format!("execution channel failure: {}", e)), None)
                    }
                }
            }
            Err(join_err) => {
                // The adapter panicked; the channel is lost with it.
                tracing::error!(session = %entry.id, "execution task failed: {}", join_err);
                entry.set_alive(false);
                (
                    synthesized_failure(format!("execution task failed: {}", join_err)),
                    None,
                )
            }
        };

        entry.touch();

        let completion = completion_of(&events).cloned().unwrap_or_else(|| Completion::Failure {
            trace: RawTrace::from_text("channel produced no completion event"),
        });

        let error = match &completion {
            Completion::Success { .. } => {
                match listing {
                    Some(Ok(bindings)) => {
                        let delta = inner.tracker.apply_listing(bindings);
                        if !delta.is_empty() {
                            tracing::debug!(
                                session = %entry.id,
                                added = delta.added.len(),
                                changed = delta.changed.len(),
                                removed = delta.removed.len(),
                                "namespace reconciled"
                            );
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(session = %entry.id, "namespace listing failed: {}", e);
                    }
                    None => {}
                }
                if let Some(hook) = &self.persistence {
                    hook.save(&entry.id);
                }
                None
            }
            Completion::Failure { trace } => {
                let classified = classify(trace);
                Some(if timed_out.load(Ordering::SeqCst) {
                    classified.promote_to_timeout()
                } else {
                    classified
                })
            }
        };

        Ok(compose(
            Uuid::new_v4(),
            &entry.id,
            &events,
            error,
            inner.tracker.summary(),
            duration,
        ))
    }

    /// Evict sessions idle past the configured timeout.
    ///
    /// Claims each candidate's in-flight slot first, so eviction can never
    /// fire while a submission is running; busy sessions are skipped, not
    /// waited on. Returns the evicted ids.
    pub async fn evict_idle(&self) -> Vec<String> {
        let idle_timeout = self.config.idle_timeout;
        let mut evicted = Vec::new();

        for entry in self.registry.entries() {
            if entry.idle_for() < idle_timeout {
                continue;
            }
            if !entry.try_claim() {
                continue;
            }
            tracing::info!(session = %entry.id, "evicting idle session");
            if self.destroy(&entry.id).await.is_ok() {
                evicted.push(entry.id.clone());
            }
        }

        evicted
    }
}

fn synthesized_failure(message: String) -> Vec<ResultEvent> {
    vec![ResultEvent::Completed {
        completion: Completion::Failure {
            trace: RawTrace::from_text(message),
        },
    }]
}
