//! Process-backed execution channel.
//!
//! Spawns a kernel harness subprocess and drives it over the wire protocol.
//! The harness owns the interpreter; this adapter owns the process handle
//! and is in turn exclusively owned by one session.

use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::event::{Completion, DisplayArtifact, RawTrace, ResultEvent};
use crate::namespace::NamespaceBinding;

use super::wire::{KernelRequest, KernelReply, read_frame, write_frame};
use super::{ChannelFactory, ExecutionChannel, InterruptHandle};

/// Environment variable overriding the kernel harness binary path.
pub const KERNEL_PATH_ENV: &str = "MERCURY_KERNEL_PATH";

const KERNEL_BIN: &str = "mercury-kernel";

/// Channel to a kernel harness subprocess.
pub struct ProcessChannel {
    child: Child,
    stdin: BufWriter<std::process::ChildStdin>,
    stdout: BufReader<std::process::ChildStdout>,
    interrupt: InterruptHandle,
    closed: bool,
}

impl ProcessChannel {
    /// Spawn a new kernel harness process.
    ///
    /// Looks for the binary in the following order:
    /// 1. `MERCURY_KERNEL_PATH` environment variable
    /// 2. Same directory as the current executable
    /// 3. System PATH
    pub fn spawn() -> Result<Self> {
        let kernel_path = Self::find_kernel_binary()?;

        let mut child = Command::new(&kernel_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit()) // Kernel stderr passes through for debugging
            .spawn()
            .map_err(|e| {
                Error::Spawn(format!(
                    "failed to spawn kernel '{}': {}",
                    kernel_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn("failed to get kernel stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn("failed to get kernel stdout".to_string()))?;

        let interrupt = InterruptHandle::for_pid(child.id());
        let mut channel = Self {
            child,
            stdin: BufWriter::new(stdin),
            stdout: BufReader::new(stdout),
            interrupt,
            closed: false,
        };

        // Verify the kernel is responsive before handing it to a session.
        channel.send(&KernelRequest::Ping)?;
        match channel.recv()? {
            KernelReply::Pong => {
                tracing::debug!(pid = channel.child.id(), "kernel ready");
                Ok(channel)
            }
            other => Err(Error::Protocol(format!(
                "unexpected handshake reply from kernel: {:?}",
                other
            ))),
        }
    }

    fn find_kernel_binary() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(KERNEL_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
        }

        let bin_name = if cfg!(windows) {
            "mercury-kernel.exe"
        } else {
            KERNEL_BIN
        };

        if let Ok(exe_path) = std::env::current_exe()
            && let Some(exe_dir) = exe_path.parent()
        {
            let candidate = exe_dir.join(bin_name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }

        if let Ok(path) = which::which(bin_name) {
            return Ok(path);
        }

        Err(Error::Spawn(format!(
            "could not find {} binary; set {} or ensure it is in PATH",
            KERNEL_BIN, KERNEL_PATH_ENV
        )))
    }

    fn send(&mut self, request: &KernelRequest) -> Result<()> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        write_frame(&mut self.stdin, request)
    }

    fn recv(&mut self) -> Result<KernelReply> {
        if self.closed {
            return Err(Error::ChannelClosed);
        }
        read_frame(&mut self.stdout)
    }

    /// Kill the kernel process immediately.
    fn kill(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Graceful shutdown first; any cleanup the kernel wants to do.
        let _ = write_frame(&mut self.stdin, &KernelRequest::Shutdown);
        std::thread::sleep(Duration::from_millis(10));

        if let Err(e) = self.child.kill() {
            if !e.to_string().contains("No such process") {
                tracing::warn!("failed to kill kernel: {}", e);
            }
        }

        // Reap the zombie.
        let _ = self.child.wait();
    }

    /// Kernel process id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl ExecutionChannel for ProcessChannel {
    fn submit(&mut self, code: &str) -> Result<Vec<ResultEvent>> {
        self.interrupt.reset();
        self.send(&KernelRequest::Execute {
            code: code.to_string(),
        })?;

        let mut events = Vec::new();
        loop {
            match self.recv() {
                Ok(KernelReply::Stream { stream, text }) => {
                    events.push(ResultEvent::Stream { stream, text });
                }
                Ok(KernelReply::Display { mime, data }) => {
                    events.push(ResultEvent::Display {
                        artifact: DisplayArtifact { mime, data },
                    });
                }
                Ok(KernelReply::Completed { completion }) => {
                    events.push(ResultEvent::Completed { completion });
                    return Ok(events);
                }
                Ok(other) => {
                    return Err(Error::Protocol(format!(
                        "unexpected reply during submission: {:?}",
                        other
                    )));
                }
                Err(e) => {
                    // A kernel that dies mid-submission still terminates the
                    // sequence: synthesize the failure completion so the
                    // caller gets a classifiable event instead of a torn
                    // stream.
                    tracing::warn!("kernel died mid-submission: {}", e);
                    self.closed = true;
                    let _ = self.child.kill();
                    let _ = self.child.wait();
                    events.push(ResultEvent::Completed {
                        completion: Completion::Failure {
                            trace: RawTrace::from_text(format!("kernel connection lost: {}", e)),
                        },
                    });
                    return Ok(events);
                }
            }
        }
    }

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    fn list_namespace(&mut self) -> Result<Vec<NamespaceBinding>> {
        self.send(&KernelRequest::ListNamespace)?;
        match self.recv()? {
            KernelReply::Namespace { bindings } => Ok(bindings),
            other => Err(Error::Protocol(format!(
                "unexpected reply to namespace listing: {:?}",
                other
            ))),
        }
    }

    fn is_alive(&mut self) -> bool {
        if self.closed {
            return false;
        }
        matches!(self.child.try_wait(), Ok(None))
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let _ = self.send(&KernelRequest::Shutdown);
        self.closed = true;

        match self.child.wait() {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(Error::Ipc(format!("kernel exited with status: {}", status))),
            Err(e) => Err(Error::Ipc(format!("failed to wait for kernel: {}", e))),
        }
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Factory producing process-backed channels, one kernel per session.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessChannelFactory;

impl ChannelFactory for ProcessChannelFactory {
    fn open(&self) -> Result<Box<dyn ExecutionChannel>> {
        Ok(Box::new(ProcessChannel::spawn()?))
    }
}
