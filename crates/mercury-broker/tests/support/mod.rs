//! Scripted channels standing in for live kernels.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use mercury_core::channel::{ChannelFactory, ExecutionChannel, InterruptHandle};
use mercury_core::error::{Error, Result};
use mercury_core::event::{Completion, RawTrace, ResultEvent, StreamKind};
use mercury_core::namespace::NamespaceBinding;

/// One scripted response to a `submit` call.
pub enum ScriptStep {
    /// Return these events immediately. On a success completion,
    /// `namespace` is what `list_namespace` reports afterwards.
    Reply {
        events: Vec<ResultEvent>,
        namespace: Vec<NamespaceBinding>,
    },
    /// Block until the interrupt handle fires, then report an interrupt
    /// failure, like a kernel receiving SIGINT.
    BlockUntilInterrupt,
}

pub struct ScriptedChannel {
    steps: VecDeque<ScriptStep>,
    listing: Vec<NamespaceBinding>,
    interrupt: InterruptHandle,
    alive: bool,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: steps.into(),
            listing: Vec::new(),
            interrupt: InterruptHandle::inert(),
            alive: true,
        }
    }
}

impl ExecutionChannel for ScriptedChannel {
    fn submit(&mut self, _code: &str) -> Result<Vec<ResultEvent>> {
        if !self.alive {
            return Err(Error::ChannelClosed);
        }
        self.interrupt.reset();
        match self.steps.pop_front() {
            Some(ScriptStep::Reply { events, namespace }) => {
                self.listing = namespace;
                Ok(events)
            }
            Some(ScriptStep::BlockUntilInterrupt) => {
                // Bounded so a broken test fails instead of hanging forever.
                let deadline = Instant::now() + Duration::from_secs(5);
                while !self.interrupt.is_interrupted() {
                    if Instant::now() > deadline {
                        return Err(Error::Ipc("scripted block never interrupted".to_string()));
                    }
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(vec![interrupt_completion()])
            }
            None => Ok(ok_events(None)),
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn list_namespace(&mut self) -> Result<Vec<NamespaceBinding>> {
        Ok(self.listing.clone())
    }

    fn is_alive(&mut self) -> bool {
        self.alive
    }

    fn shutdown(&mut self) -> Result<()> {
        self.alive = false;
        Ok(())
    }
}

/// Factory handing out scripted channels in order, one per `open` call.
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<VecDeque<Vec<ScriptStep>>>,
    opened: AtomicUsize,
    fail_next: Mutex<bool>,
}

impl ScriptedFactory {
    pub fn new(scripts: Vec<Vec<ScriptStep>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            opened: AtomicUsize::new(0),
            fail_next: Mutex::new(false),
        }
    }

    /// Number of channels opened so far.
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Make the next `open` call fail, simulating no runnable interpreter.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    pub fn push_script(&self, steps: Vec<ScriptStep>) {
        self.scripts.lock().unwrap().push_back(steps);
    }
}

impl ChannelFactory for ScriptedFactory {
    fn open(&self) -> Result<Box<dyn ExecutionChannel>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(Error::Spawn("no runnable interpreter available".to_string()));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let steps = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Box::new(ScriptedChannel::new(steps)))
    }
}

pub fn bind(name: &str, type_tag: &str) -> NamespaceBinding {
    NamespaceBinding::new(name, type_tag)
}

pub fn ok_events(value: Option<&str>) -> Vec<ResultEvent> {
    vec![ResultEvent::Completed {
        completion: Completion::Success {
            value: value.map(str::to_string),
            execution_count: 1,
        },
    }]
}

pub fn stream_event(text: &str) -> ResultEvent {
    ResultEvent::Stream {
        stream: StreamKind::Stdout,
        text: text.to_string(),
    }
}

pub fn failure_events(kind: &str, message: &str) -> Vec<ResultEvent> {
    vec![ResultEvent::Completed {
        completion: Completion::Failure {
            trace: RawTrace::structured(kind, message, format!("{}: {}", kind, message)),
        },
    }]
}

pub fn interrupt_completion() -> ResultEvent {
    ResultEvent::Completed {
        completion: Completion::Failure {
            trace: RawTrace::structured("KeyboardInterrupt", "", "KeyboardInterrupt"),
        },
    }
}

/// A reply step: events plus the namespace listing reported after them.
pub fn reply(events: Vec<ResultEvent>, namespace: Vec<NamespaceBinding>) -> ScriptStep {
    ScriptStep::Reply { events, namespace }
}
