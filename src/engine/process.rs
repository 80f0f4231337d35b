//! Child process management for engine runs
//!
//! Each child is started in its own process group so that a timeout or a
//! suite interrupt can take down everything it spawned, not just the direct
//! child. stdout and stderr are drained on separate reader threads so neither
//! pipe can fill up and stall the child.

use super::{
    EngineResult, EngineSpec, InputMode, DEFAULT_OUTPUT_LIMIT, INPUT_PLACEHOLDER, TIMEOUT_EXIT_CODE,
};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    Cancelled,
}

/// Runs engine executables with a hard timeout
#[derive(Debug, Clone)]
pub struct EngineRunner {
    cancel: CancelToken,
    poll_interval: Duration,
    output_limit: u64,
}

impl EngineRunner {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Keep at most `limit` bytes of each output stream
    pub fn with_output_limit(mut self, limit: u64) -> Self {
        self.output_limit = limit;
        self
    }

    /// Run `spec` on `input`, killing its process tree after `timeout`.
    ///
    /// A non-zero exit is a normal result. Errors are reserved for launch
    /// failures, staging failures and cancellation.
    pub fn run(&self, spec: &EngineSpec, input: &[u8], timeout: Duration) -> Result<EngineResult> {
        self.cancel.check()?;

        // dropped (and removed) on every return path below
        let staged = match spec.input {
            InputMode::File => Some(stage_input(input, &spec.input_suffix)?),
            InputMode::Stdin | InputMode::None => None,
        };

        let mut command = Command::new(&spec.program);
        match &staged {
            Some(file) => {
                let rendered = if spec.uses(INPUT_PLACEHOLDER) {
                    spec.substitute(INPUT_PLACEHOLDER, file.path())
                } else {
                    let mut appended = spec.clone();
                    appended.args.push(file.path().to_string_lossy().to_string());
                    appended
                };
                command.args(&rendered.args);
            }
            None => {
                command.args(&spec.args);
            }
        }
        command
            .envs(&spec.env)
            .stdin(if spec.input == InputMode::Stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|source| Error::Launch {
            program: spec.program.clone(),
            source,
        })?;
        debug!(program = %spec.program.display(), pid = child.id(), "engine started");

        let stdin_writer = child.stdin.take().map(|mut pipe| {
            let data = input.to_vec();
            // the child may exit without reading; a broken pipe is not our problem
            thread::spawn(move || {
                let _ = pipe.write_all(&data);
            })
        });
        let limit = self.output_limit;
        let stdout_reader = child.stdout.take().map(|pipe| spawn_reader(pipe, limit));
        let stderr_reader = child.stderr.take().map(|pipe| spawn_reader(pipe, limit));

        let waited = self.wait_for(&mut child, timeout);
        let status = match waited {
            Ok(WaitOutcome::Exited(status)) => {
                // stray grandchildren still holding our pipes
                terminate_tree(&mut child, true);
                Ok(Some(status))
            }
            Ok(WaitOutcome::TimedOut) => {
                warn!(program = %spec.program.display(), ?timeout, "engine timed out, killing process group");
                terminate_tree(&mut child, false);
                Ok(None)
            }
            Ok(WaitOutcome::Cancelled) => {
                terminate_tree(&mut child, false);
                Err(Error::Cancelled)
            }
            Err(e) => {
                terminate_tree(&mut child, false);
                Err(e)
            }
        };

        let (stdout, stdout_cut) = join_output(stdout_reader);
        let (stderr, stderr_cut) = join_output(stderr_reader);
        let truncated = stdout_cut || stderr_cut;
        if truncated {
            warn!(program = %spec.program.display(), limit, "engine output truncated");
        }
        if let Some(writer) = stdin_writer {
            let _ = writer.join();
        }
        let duration = start.elapsed();

        let status = status?;
        let (exit_code, timed_out) = match status {
            Some(status) => (exit_code(status), false),
            None => (TIMEOUT_EXIT_CODE, true),
        };

        debug!(
            program = %spec.program.display(),
            exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            "engine finished"
        );

        Ok(EngineResult {
            exit_code,
            stdout,
            stderr,
            duration,
            timed_out,
            truncated,
        })
    }

    fn wait_for(&self, child: &mut Child, timeout: Duration) -> Result<WaitOutcome> {
        let started = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| Error::io("failed to poll engine process", e))?
            {
                return Ok(WaitOutcome::Exited(status));
            }
            if self.cancel.is_cancelled() {
                return Ok(WaitOutcome::Cancelled);
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(self.poll_interval.min(timeout - elapsed));
        }
    }
}

fn stage_input(input: &[u8], suffix: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("phpt-")
        .suffix(suffix)
        .tempfile()
        .map_err(|e| Error::io("failed to create temporary input file", e))?;
    file.write_all(input)
        .and_then(|_| file.flush())
        .map_err(|e| Error::io("failed to write temporary input file", e))?;
    Ok(file)
}

/// Captured bytes, and whether anything past the limit was thrown away
type Captured = (Vec<u8>, bool);

fn spawn_reader<R: Read + Send + 'static>(pipe: R, limit: u64) -> JoinHandle<Captured> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let mut kept = pipe.take(limit);
        let _ = kept.read_to_end(&mut buf);
        // keep draining so the child never blocks on a full pipe
        let discarded = io::copy(&mut kept.into_inner(), &mut io::sink()).unwrap_or(0);
        (buf, discarded > 0)
    })
}

fn join_output(handle: Option<JoinHandle<Captured>>) -> Captured {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Kill the child's process group and reap the child. With `reaped` set the
/// child already exited and only leftover group members are signalled.
#[cfg(unix)]
fn terminate_tree(child: &mut Child, reaped: bool) {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let group = Pid::from_raw(child.id() as i32);
    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => {
            warn!(pid = child.id(), %errno, "failed to signal process group");
            if !reaped {
                let _ = child.kill();
            }
        }
    }
    if !reaped {
        let _ = child.wait();
    }
}

#[cfg(not(unix))]
fn terminate_tree(child: &mut Child, reaped: bool) {
    if !reaped {
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(TIMEOUT_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(TIMEOUT_EXIT_CODE)
}
