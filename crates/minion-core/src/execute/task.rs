//! A child process whose merged output is consumed as a pollable line stream.
//!
//! stdout and stderr share one pipe, so lines arrive in the order the
//! process wrote them. A reader thread drains the pipe into a bounded channel
//! at its own pace, so the child never stalls on a full pipe while the
//! consumer is busy. The consumer polls with a timeout and can check for
//! cancellation between polls.

use std::io::{BufRead, BufReader, Read};
use std::iter::FusedIterator;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

use super::request::BuildSpec;

/// How often the reader thread checks whether a child with closed pipes has exited.
const REAP_INTERVAL: Duration = Duration::from_millis(5);

/// Polling parameters for a task.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Longest time one poll blocks before yielding `TaskPoll::Idle`.
    pub poll_interval: Duration,

    /// Capacity of the line channel.
    pub line_buffer: usize,
}

impl Default for TaskConfig {
    fn default() -> Self {
        TaskConfig::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for TaskConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            line_buffer: config.line_buffer,
        }
    }
}

/// Item produced by polling a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPoll {
    /// The next line, newline included when the process wrote one.
    Line(String),
    /// Nothing arrived within the poll interval.
    Idle,
}

/// Messages on the line channel. `Exited` is the end-of-stream sentinel.
#[derive(Debug)]
enum Message {
    Line(String),
    Exited(Option<i32>),
}

/// Handle to one running build process.
///
/// Iterating yields [`TaskPoll`] items and ends once all output has been
/// read and the process has exited. The sequence cannot be restarted.
pub struct ProcessTask {
    child: Arc<Mutex<Child>>,
    lines: Receiver<Message>,
    poll_interval: Duration,
    pid: u32,
    exit_code: Option<i32>,
    finished: bool,
    terminated: AtomicBool,
}

impl ProcessTask {
    /// Spawn the command with stdout and stderr merged into one pipe.
    ///
    /// Fails with `Error::Spawn` if the program or working directory does not
    /// exist; nothing is reported later through the stream for that case.
    pub fn start(spec: &BuildSpec, config: &TaskConfig) -> Result<Self> {
        spec.validate()?;
        let spawn_error = |source| Error::Spawn {
            command: spec.display_command(),
            source,
        };

        let (output, stdout) = std::io::pipe().map_err(spawn_error)?;
        let stderr = stdout.try_clone().map_err(spawn_error)?;

        let mut command = Command::new(&spec.command[0]);
        command
            .args(&spec.command[1..])
            .current_dir(&spec.working_dir)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr);

        // Own process group, so terminate() also reaches grandchildren
        // holding the output pipes.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let child = command.spawn().map_err(spawn_error)?;
        // Close the parent's write ends so EOF arrives once the child is done.
        drop(command);

        let pid = child.id();

        tracing::debug!("spawned {} (pid {pid}) in {}", spec.display_command(), spec.working_dir.display());

        let child = Arc::new(Mutex::new(child));
        let (tx, rx) = sync_channel(config.line_buffer.max(1));

        let reader_child = Arc::clone(&child);
        let spawned = thread::Builder::new()
            .name(format!("minion-reader-{pid}"))
            .spawn(move || read_until_exit(output, tx, &reader_child));

        let task = Self {
            child,
            lines: rx,
            poll_interval: config.poll_interval,
            pid,
            exit_code: None,
            finished: false,
            terminated: AtomicBool::new(false),
        };

        if let Err(e) = spawned {
            task.terminate();
            return Err(spawn_error(e));
        }

        Ok(task)
    }

    /// Forcibly stop the process. Idempotent; a process that already exited
    /// is not an error.
    ///
    /// On unix the whole process group is killed, but only while the child
    /// has not been reaped: afterwards its id may belong to someone else.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut child = lock_child(&self.child);
        if let Ok(Some(_)) = child.try_wait() {
            tracing::debug!("pid {} already exited", self.pid);
            return;
        }

        #[cfg(unix)]
        {
            // SIGKILL for immediate termination of the child and its descendants
            unsafe {
                libc::kill(-(self.pid as i32), libc::SIGKILL);
            }
        }

        match child.kill() {
            Ok(()) => tracing::debug!("terminated pid {}", self.pid),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {}
            Err(e) => tracing::warn!("failed to terminate pid {}: {e}", self.pid),
        }
    }

    /// Exit code, available once iteration has ended. `None` before that or
    /// when the process was killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Whether end-of-stream has been observed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Iterator for ProcessTask {
    type Item = TaskPoll;

    fn next(&mut self) -> Option<TaskPoll> {
        if self.finished {
            return None;
        }

        match self.lines.recv_timeout(self.poll_interval) {
            Ok(Message::Line(line)) => Some(TaskPoll::Line(line)),
            Ok(Message::Exited(code)) => {
                self.exit_code = code;
                self.finished = true;
                None
            }
            Err(RecvTimeoutError::Timeout) => Some(TaskPoll::Idle),
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("reader for pid {} ended without an exit status", self.pid);
                self.finished = true;
                None
            }
        }
    }
}

impl FusedIterator for ProcessTask {}

impl Drop for ProcessTask {
    fn drop(&mut self) {
        if !self.finished {
            self.terminate();
        }
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reader thread body: drain the pipe, reap the child, send the sentinel.
fn read_until_exit(output: impl Read, tx: SyncSender<Message>, child: &Mutex<Child>) {
    pump_lines(output, &tx);

    let code = loop {
        let status = lock_child(child).try_wait();
        match status {
            Ok(Some(status)) => break status.code(),
            Ok(None) => thread::sleep(REAP_INTERVAL),
            Err(e) => {
                tracing::warn!("failed to wait for build process: {e}");
                break None;
            }
        }
    };

    // The consumer may already be gone after a cancellation.
    let _ = tx.send(Message::Exited(code));
}

/// Forward lines until EOF, a read error, or a closed channel.
fn pump_lines(pipe: impl Read, tx: &SyncSender<Message>) {
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).into_owned();
                if tx.send(Message::Line(line)).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!("error reading build output: {e}");
                break;
            }
        }
    }
}
