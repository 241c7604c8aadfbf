//! Execution channels: the seam between the broker and interpreter kernels.
//!
//! A channel wraps exactly one live interpreter and is exclusively owned by
//! its session. `ProcessChannel` is the production adapter; tests substitute
//! scripted implementations of [`ExecutionChannel`].

pub mod process;
pub mod wire;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::Result;
use crate::event::ResultEvent;
use crate::namespace::NamespaceBinding;

pub use process::{ProcessChannel, ProcessChannelFactory};

/// Interface to a single stateful interpreter.
///
/// `submit` blocks until the submission's finite event sequence ends; the
/// returned events are in provider order and terminate in exactly one
/// `Completed` event. The sequence is not restartable.
pub trait ExecutionChannel: Send {
    /// Submit code and collect the resulting event sequence.
    fn submit(&mut self, code: &str) -> Result<Vec<ResultEvent>>;

    /// Handle that can interrupt an in-flight submission from another thread.
    ///
    /// This is the only operation permitted to run concurrently with
    /// `submit` on the same channel.
    fn interrupt_handle(&self) -> InterruptHandle;

    /// Shallow listing of top-level bindings with provider type tags.
    ///
    /// Cheap by contract: no deep serialization of values.
    fn list_namespace(&mut self) -> Result<Vec<NamespaceBinding>>;

    /// Whether the backing interpreter is still running.
    fn is_alive(&mut self) -> bool;

    /// Graceful shutdown; the channel is unusable afterwards.
    fn shutdown(&mut self) -> Result<()>;
}

/// Allocates execution channels for new sessions.
///
/// The registry holds one factory; substituting it is how tests run the
/// whole broker against in-memory kernels.
pub trait ChannelFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn ExecutionChannel>>;
}

/// Thread-safe handle for interrupting a channel's in-flight submission.
///
/// Cloneable; all clones share the same interrupt flag. For process-backed
/// channels the handle additionally delivers SIGINT to the kernel, which
/// surfaces the interrupt as a failure completion without killing the
/// process.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle {
    fired: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl InterruptHandle {
    /// A flag-only handle with no process behind it.
    pub fn inert() -> Self {
        Self::default()
    }

    /// A handle that signals the given kernel pid when fired.
    pub fn for_pid(pid: u32) -> Self {
        Self {
            fired: Arc::new(AtomicBool::new(false)),
            pid: Some(pid),
        }
    }

    /// Request interruption of the in-flight submission.
    pub fn interrupt(&self) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(pid) = self.pid {
            #[cfg(unix)]
            {
                // SIGINT, not SIGKILL: the kernel reports an interrupt
                // failure and stays usable for the next submission.
                // SAFETY: plain signal delivery to a pid we spawned.
                unsafe {
                    libc::kill(pid as i32, libc::SIGINT);
                }
            }

            #[cfg(not(unix))]
            {
                tracing::warn!(pid, "signal-based interrupt unsupported on this platform");
            }
        }
    }

    /// Whether interruption has been requested.
    pub fn is_interrupted(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new submission.
    pub fn reset(&self) {
        self.fired.store(false, Ordering::SeqCst);
    }
}
