//! Child processes with a timeout and bounded output capture.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How long the output readers may keep going once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Limits applied to every command a check or suite phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLimits {
    /// Maximum time before killing the command.
    pub timeout: Duration,
    /// Maximum bytes kept from stdout/stderr each.
    pub output_limit_bytes: usize,
}

impl Default for CommandLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            output_limit_bytes: 100_000,
        }
    }
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Last non-empty line of stderr, else of stdout, for one-line report details.
    pub fn tail_line(&self) -> Option<String> {
        last_line(&self.stderr_text()).or_else(|| last_line(&self.stdout_text()))
    }
}

/// Run `argv` in `workdir`, killing it once `limits.timeout` elapses.
///
/// Output is read concurrently while the child runs so a chatty child can
/// never block on a full pipe. Bytes beyond `limits.output_limit_bytes` are
/// drained and counted but not kept.
///
/// On Unix the child leads its own process group and the whole group is
/// killed on timeout. Output still held open by a surviving descendant is
/// abandoned after a short grace period, keeping what was read so far.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or(""), timeout_secs = limits.timeout.as_secs()))]
pub fn run_command(argv: &[String], workdir: &Path, limits: CommandLimits) -> Result<CommandOutput> {
    let Some((program, args)) = argv.split_first() else {
        bail!("command must be a non-empty array");
    };
    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    let started = Instant::now();
    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).with_context(|| format!("spawn {program}"));
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let limit = limits.output_limit_bytes;
    let stdout_reader = StreamReader::spawn(stdout, limit);
    let stderr_reader = StreamReader::spawn(stderr, limit);

    let mut timed_out = false;
    let status = match child.wait_timeout(limits.timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = limits.timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    let drain_deadline = (started + limits.timeout).max(Instant::now() + DRAIN_GRACE);
    let (stdout, stdout_truncated) = stdout_reader.finish(drain_deadline).context("join stdout")?;
    let (stderr, stderr_truncated) = stderr_reader.finish(drain_deadline).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn last_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
}

/// Kill the child's process group, falling back to the child alone.
fn kill_group(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => debug!(?status, "process group kill failed"),
            Err(err) => debug!(err = %err, "kill unavailable"),
        }
    }
    child.kill().context("kill command")
}

#[derive(Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

/// Background reader filling a shared buffer, so a capture can be cut
/// short without losing what was already read.
struct StreamReader {
    captured: Arc<Mutex<Captured>>,
    done: mpsc::Receiver<Result<()>>,
}

impl StreamReader {
    fn spawn<R: Read + Send + 'static>(reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let (tx, done) = mpsc::channel();
        let shared = Arc::clone(&captured);
        thread::spawn(move || {
            // The receiver is gone once the capture was abandoned.
            let _ = tx.send(read_stream_limited(reader, limit, &shared));
        });
        Self { captured, done }
    }

    fn finish(self, deadline: Instant) -> Result<(Vec<u8>, usize)> {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                warn!("output pipe still open after exit, keeping partial capture");
            }
            Err(RecvTimeoutError::Disconnected) => bail!("output reader thread panicked"),
        }
        let mut captured = self.captured.lock().unwrap_or_else(PoisonError::into_inner);
        Ok((std::mem::take(&mut captured.bytes), captured.truncated))
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize, shared: &Mutex<Captured>) -> Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let mut captured = shared.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn captures_exit_code_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = run_command(
            &sh("echo hello; echo oops >&2; exit 3"),
            temp.path(),
            CommandLimits::default(),
        )
        .expect("run");
        assert_eq!(output.exit_code(), Some(3));
        assert_eq!(output.stdout_text(), "hello\n");
        assert_eq!(output.tail_line().as_deref(), Some("oops"));
        assert!(output.stderr_text().contains("oops"));
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = CommandLimits {
            timeout: Duration::from_secs(5),
            output_limit_bytes: 4,
        };
        let output = run_command(&sh("printf 'abcdef'"), temp.path(), limits).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 2);
    }

    #[test]
    fn kills_command_on_timeout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = CommandLimits {
            timeout: Duration::from_millis(200),
            output_limit_bytes: 1024,
        };
        let output = run_command(&sh("exec sleep 5"), temp.path(), limits).expect("run");
        assert!(output.timed_out);
        assert!(!output.status.success());
    }

    #[test]
    fn timeout_holds_when_background_child_keeps_pipe_open() {
        let temp = tempfile::tempdir().expect("tempdir");
        let limits = CommandLimits {
            timeout: Duration::from_millis(300),
            output_limit_bytes: 1024,
        };
        let started = Instant::now();
        let output =
            run_command(&sh("echo started; sleep 6 & sleep 6"), temp.path(), limits).expect("run");
        assert!(output.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(output.stdout_text(), "started\n");
    }

    #[test]
    fn empty_command_is_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = run_command(&[], temp.path(), CommandLimits::default()).expect_err("empty");
        assert!(err.to_string().contains("non-empty"));
    }
}
