//! Disposable job workspace and external command execution

use crate::models::error::{GitError, RunnerError};
use crate::models::types::WatchItem;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

const WATCH_QUEUE_DEPTH: usize = 256;

/// Owns one workspace directory for the duration of a job.
///
/// The directory is removed by [`Runner::cleanup`]; a runner dropped without
/// being cleaned up removes it on drop.
pub struct Runner {
    dir: PathBuf,
    released: AtomicBool,
}

impl Runner {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            released: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shallow-clone `url` into the workspace, then fetch `reference` at
    /// depth 1 and check out the fetched head.
    #[instrument(skip(self, url), fields(workspace = %self.dir.display()))]
    pub async fn clone_repo(&self, url: &str, reference: &str) -> Result<(), GitError> {
        let reference = git_operand(reference).map_err(|source| GitError::Fetch {
            reference: reference.to_string(),
            source,
        })?;
        let display_url = redact_url(url);
        info!("Cloning {} at {} into {}", display_url, reference, self.dir.display());

        if let Some(parent) = self.dir.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GitError::Clone {
                    url: display_url.clone(),
                    source: RunnerError::Io(e),
                })?;
        }

        let dir = self.dir.to_string_lossy().into_owned();
        self.git(false, &["clone", url, &dir, "--depth", "1"])
            .await
            .map_err(|source| GitError::Clone {
                url: display_url,
                source,
            })?;

        self.git(true, &["fetch", "origin", reference, "--depth", "1"])
            .await
            .map_err(|source| GitError::Fetch {
                reference: reference.to_string(),
                source,
            })?;

        self.git(true, &["checkout", "FETCH_HEAD"])
            .await
            .map_err(|source| GitError::Checkout {
                reference: "FETCH_HEAD".to_string(),
                source,
            })?;

        Ok(())
    }

    /// Check out `commit` inside an already cloned workspace.
    #[instrument(skip(self), fields(workspace = %self.dir.display()))]
    pub async fn checkout(&self, commit: &str) -> Result<(), GitError> {
        let commit = git_operand(commit).map_err(|source| GitError::Checkout {
            reference: commit.to_string(),
            source,
        })?;
        info!("Checking out head {}", commit);
        self.git(true, &["checkout", commit])
            .await
            .map_err(|source| GitError::Checkout {
                reference: commit.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Run a command to completion in the workspace and return its combined
    /// output (stdout followed by stderr).
    pub async fn run(&self, program: &str, args: &[&str]) -> Result<Vec<u8>, RunnerError> {
        let command = describe(program, args);
        info!("Running `{}`", command);

        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.dir);
        collect(cmd, command).await
    }

    /// Start a command and return the lazily produced sequence of its output
    /// lines. stdout and stderr are both drained; a read failure or a
    /// non-zero exit is delivered as the last item.
    ///
    /// Lines keep their order within each pipe. How stdout and stderr lines
    /// interleave depends on when each becomes readable, not on the order
    /// the process wrote them. Bytes that are not UTF-8 are replaced with
    /// U+FFFD. Dropping the stream kills the process.
    pub fn watch(&self, program: &str, args: &[&str]) -> Result<LineStream, RunnerError> {
        let command = describe(program, args);
        info!("Watching `{}`", command);

        let mut child = Command::new(program)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(WATCH_QUEUE_DEPTH);

        let reader = tokio::spawn(read_lines(stdout, stderr, tx.clone()));
        tokio::spawn(wait_for_exit(child, reader, command, tx));

        Ok(LineStream { rx })
    }

    /// Feed every output line of the command to `on_line`, in order.
    ///
    /// Returns the first error seen, whether delivered by the process or
    /// returned by `on_line`; no line is delivered after it.
    pub async fn watch_fn<F>(&self, mut on_line: F, program: &str, args: &[&str]) -> Result<(), RunnerError>
    where
        F: FnMut(&str) -> Result<(), RunnerError>,
    {
        let mut lines = self.watch(program, args)?;
        while let Some(item) = lines.next().await {
            match item {
                WatchItem::Line(line) => on_line(&line)?,
                WatchItem::Error(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Remove the workspace directory. Failures are logged, never returned,
    /// and calling this more than once is harmless.
    pub async fn cleanup(&self) {
        self.released.store(true, Ordering::SeqCst);
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => info!("Cleaned up workspace {}", self.dir.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Workspace {} already gone", self.dir.display())
            }
            Err(e) => error!("Failed to cleanup workspace {}: {}", self.dir.display(), e),
        }
    }

    async fn git(&self, in_workspace: bool, args: &[&str]) -> Result<Vec<u8>, RunnerError> {
        let redacted: Vec<String> = args.iter().map(|arg| redact_url(arg)).collect();
        let redacted: Vec<&str> = redacted.iter().map(String::as_str).collect();
        let command = describe("git", &redacted);
        debug!("Running `{}`", command);

        let mut cmd = Command::new("git");
        cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
        if in_workspace {
            cmd.current_dir(&self.dir);
        }
        collect(cmd, command).await
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if *self.released.get_mut() || !self.dir.exists() {
            return;
        }
        warn!("Runner dropped without cleanup, removing {}", self.dir.display());
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            error!("Failed to cleanup workspace {}: {}", self.dir.display(), e);
        }
    }
}

/// Output of a watched command. Finite, and cannot be restarted.
pub struct LineStream {
    rx: mpsc::Receiver<WatchItem>,
}

impl LineStream {
    /// Next item, or `None` once the process has exited and all of its
    /// output has been delivered.
    pub async fn next(&mut self) -> Option<WatchItem> {
        self.rx.recv().await
    }
}

async fn collect(mut cmd: Command, command: String) -> Result<Vec<u8>, RunnerError> {
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|source| RunnerError::Spawn {
            command: command.clone(),
            source,
        })?;

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);

    if !output.status.success() {
        return Err(RunnerError::Exit {
            command,
            status: output.status,
            output: String::from_utf8_lossy(&combined).trim().to_string(),
        });
    }

    Ok(combined)
}

/// Forward output lines to `tx` until both pipes hit EOF. Returns whether a
/// read error was delivered.
///
/// Once the consumer is gone, lines are still drained and discarded so the
/// child never blocks on a full pipe.
async fn read_lines<O, E>(stdout: Option<O>, stderr: Option<E>, tx: mpsc::Sender<WatchItem>) -> bool
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut stdout = stdout.map(BufReader::new);
    let mut stderr = stderr.map(BufReader::new);
    let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
    let mut forwarding = true;
    let mut scan_failed = false;

    loop {
        let (from_stdout, line) = tokio::select! {
            line = next_line(&mut stdout, &mut out_buf), if stdout.is_some() => (true, line),
            line = next_line(&mut stderr, &mut err_buf), if stderr.is_some() => (false, line),
            else => break,
        };

        match line {
            Some(Ok(text)) => {
                if forwarding && tx.send(WatchItem::Line(text)).await.is_err() {
                    forwarding = false;
                }
            }
            Some(Err(e)) => {
                if forwarding {
                    scan_failed = tx.send(WatchItem::Error(RunnerError::Scan(e))).await.is_ok();
                    forwarding = false;
                }
                // Dropping the pipe makes further writes fail instead of block.
                if from_stdout {
                    stdout = None;
                } else {
                    stderr = None;
                }
            }
            None => {
                if from_stdout {
                    stdout = None;
                } else {
                    stderr = None;
                }
            }
        }
    }

    scan_failed
}

/// Read one newline-terminated line. `buf` keeps any partial line across a
/// cancelled call, so this is safe to race in `select!`.
async fn next_line<R>(reader: &mut Option<R>, buf: &mut Vec<u8>) -> Option<std::io::Result<String>>
where
    R: AsyncBufRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read_until(b'\n', buf).await {
        Ok(0) if buf.is_empty() => None,
        Ok(_) => {
            let line = decode_line(buf);
            buf.clear();
            Some(Ok(line))
        }
        Err(e) => Some(Err(e)),
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Wait for the process, then for the reader, and only then report the exit
/// status. The queue closes once both tasks have dropped their senders.
async fn wait_for_exit(
    mut child: Child,
    reader: JoinHandle<bool>,
    command: String,
    tx: mpsc::Sender<WatchItem>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = tx.closed() => {
            warn!("Output of `{}` no longer consumed, killing it", command);
            if let Err(e) = child.kill().await {
                error!("Failed to kill `{}`: {}", command, e);
            }
            return;
        }
    };

    let scan_failed = match reader.await {
        Ok(scan_failed) => scan_failed,
        Err(e) => {
            error!("Output reader for `{}` failed: {}", command, e);
            let _ = tx
                .send(WatchItem::Error(RunnerError::Scan(std::io::Error::other(e.to_string()))))
                .await;
            return;
        }
    };
    if scan_failed {
        return;
    }

    let failure = match status {
        Ok(status) if status.success() => None,
        Ok(status) => Some(RunnerError::Failed { command, status }),
        Err(e) => Some(RunnerError::Io(e)),
    };
    if let Some(e) = failure {
        // The consumer may already have stopped listening.
        let _ = tx.send(WatchItem::Error(e)).await;
    }
}

/// Payload-supplied refs and commit ids must not be parsed as git options.
fn git_operand(value: &str) -> Result<&str, RunnerError> {
    if value.is_empty() || value.starts_with('-') {
        return Err(RunnerError::InvalidArgument(value.to_string()));
    }
    Ok(value)
}

fn describe(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hide credentials embedded in a URL's userinfo.
pub fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", &url[..scheme_end], &rest[at + 1..]),
        None => url.to_string(),
    }
}
