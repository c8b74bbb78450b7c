//! Child processes for command-backed tools, with a timeout and bounded output.

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Limits applied to every tool subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl Default for ProcessLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
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
    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out
    }

    /// Text handed back to the model as a tool result.
    pub fn render(&self) -> String {
        let mut text = match (self.timed_out, self.status.code()) {
            (true, _) => "timed out\n".to_string(),
            (false, Some(code)) => format!("exit code {code}\n"),
            (false, None) => "terminated by signal\n".to_string(),
        };
        append_stream(&mut text, "stdout", &self.stdout, self.stdout_truncated);
        append_stream(&mut text, "stderr", &self.stderr, self.stderr_truncated);
        text
    }
}

fn append_stream(text: &mut String, label: &str, bytes: &[u8], truncated: usize) {
    if bytes.is_empty() && truncated == 0 {
        return;
    }
    text.push_str(&format!("=== {label} ===\n"));
    text.push_str(&String::from_utf8_lossy(bytes));
    if !text.ends_with('\n') {
        text.push('\n');
    }
    if truncated > 0 {
        text.push_str(&format!("[{label} truncated {truncated} bytes]\n"));
    }
}

/// Run a command, feeding `stdin` if given, and capture its output.
///
/// Both pipes are drained on reader threads while the child runs so a chatty
/// child cannot block on a full pipe. Bytes beyond `output_limit_bytes` are
/// counted and discarded. A child that outlives the timeout is killed.
#[instrument(skip_all, fields(program = ?cmd.get_program(), timeout_secs = limits.timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    limits: ProcessLimits,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning tool process");
    let mut child = cmd.spawn().context("spawn command")?;

    let stdout = spawn_reader(child.stdout.take(), limits.output_limit_bytes, "stdout")?;
    let stderr = spawn_reader(child.stderr.take(), limits.output_limit_bytes, "stderr")?;

    if let Some(input) = stdin
        && let Err(err) = feed_stdin(&mut child, input)
    {
        warn!(err = %format!("{err:#}"), "writing tool stdin failed, killing");
        child.kill().ok();
        child.wait().ok();
        return Err(err);
    }

    let (status, timed_out) = wait_or_kill(&mut child, limits.timeout)?;

    let (stdout, stdout_truncated) = join_reader(stdout).context("join stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr).context("join stderr")?;
    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "tool output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "tool process finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Write `input` and close the pipe. A child that exits without reading its
/// input is not an error; its exit status tells the rest.
fn feed_stdin(child: &mut Child, input: &[u8]) -> Result<()> {
    let mut pipe = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("stdin was not piped"))?;
    match pipe.write_all(input) {
        Err(err) if err.kind() == ErrorKind::BrokenPipe => {
            debug!("tool process closed stdin before reading all input");
            Ok(())
        }
        other => other.context("write stdin"),
    }
}

type Reader = JoinHandle<Result<(Vec<u8>, usize)>>;

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>, limit: usize, label: &str) -> Result<Reader> {
    let pipe = pipe.ok_or_else(|| anyhow!("{label} was not piped"))?;
    Ok(thread::spawn(move || read_limited(pipe, limit)))
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "tool process timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait command after kill")?;
    Ok((status, true))
}

fn join_reader(handle: Reader) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];
    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(kept.len()));
        kept.extend_from_slice(&chunk[..keep]);
        dropped += n - keep;
    }
    Ok((kept, dropped))
}
