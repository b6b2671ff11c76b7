//! Process supervisor
//!
//! A [`ServiceExe`] wraps one invocation of an external executable. It is
//! bound to a parent cancellation token: cancelling the parent (or calling
//! [`ServiceExe::kill`]) kills the child. Restarting is left to the caller.
//!
//! Two signals are exposed as one-shot tokens:
//!
//! - `ready`, fired once the OS process exists
//! - `done`, fired when [`ServiceExe::run`] returns for any reason,
//!   including a failed spawn

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{DaemonError, Result};

/// How long output readers may run on after the child has exited
const OUTPUT_DRAIN: Duration = Duration::from_secs(2);

/// Receives captured stdout, one line per call
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// One supervised invocation of an executable
pub struct ServiceExe {
    name: String,
    path: PathBuf,
    args: Vec<String>,
    stdin: Option<Vec<u8>>,
    sink: Option<OutputSink>,
    cancel: CancellationToken,
    ready: CancellationToken,
    done: CancellationToken,
    pid: Mutex<Option<u32>>,
}

/// Fires the done signal however `run` exits
struct DoneGuard<'a>(&'a CancellationToken);

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

impl ServiceExe {
    /// Prepare an invocation bound to `parent`
    pub fn new<I, S>(parent: &CancellationToken, path: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "process".to_string());

        Self {
            name,
            path,
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            sink: None,
            cancel: parent.child_token(),
            ready: CancellationToken::new(),
            done: CancellationToken::new(),
            pid: Mutex::new(None),
        }
    }

    /// Bytes written to the child's stdin after launch
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Send stdout lines to `sink` instead of the log
    pub fn with_sink(mut self, sink: OutputSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// OS process id while the child is alive
    pub fn pid(&self) -> Option<u32> {
        *self.pid.lock()
    }

    /// Wait until the OS process exists
    pub async fn ready(&self) {
        self.ready.cancelled().await
    }

    /// Wait until the invocation has finished
    pub async fn done(&self) {
        self.done.cancelled().await
    }

    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }

    /// Kill the child; `run` returns shortly after
    pub fn kill(&self) {
        self.cancel.cancel();
    }

    /// Launch in the background and return immediately
    pub fn start(self: Arc<Self>) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }

    /// Launch and wait for the process to exit
    ///
    /// Returns `Ok` when the process exits successfully or was killed through
    /// cancellation. A non-zero exit otherwise is [`DaemonError::Exited`].
    pub async fn run(&self) -> Result<()> {
        let _done = DoneGuard(&self.done);

        if self.cancel.is_cancelled() {
            tracing::debug!("{} cancelled before launch", self.name);
            return Ok(());
        }

        let mut cmd = Command::new(&self.path);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| DaemonError::Spawn {
            path: self.path.clone(),
            source,
        })?;
        *self.pid.lock() = child.id();
        self.ready.cancel();
        tracing::info!(service = %self.name, "Started {:?} (pid {:?})", self.path, child.id());

        if let (Some(input), Some(mut stdin)) = (self.stdin.clone(), child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(&input).await {
                    tracing::warn!("Failed to write process stdin: {}", e);
                }
            });
        }

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            let name = self.name.clone();
            let sink = self.sink.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    match &sink {
                        Some(sink) => sink(&line),
                        None => tracing::debug!(service = %name, "{}", line),
                    }
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            readers.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(service = %name, "stderr: {}", line);
                }
            }));
        }

        let status = tokio::select! {
            status = child.wait() => status,
            _ = self.cancel.cancelled() => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!("Failed to kill {}: {}", self.name, e);
                }
                child.wait().await
            }
        };
        *self.pid.lock() = None;

        // A grandchild holding the pipes keeps them open past the exit
        let deadline = tokio::time::Instant::now() + OUTPUT_DRAIN;
        for mut reader in readers {
            if tokio::time::timeout_at(deadline, &mut reader).await.is_err() {
                tracing::debug!("{} output still open after exit, detaching", self.name);
                reader.abort();
            }
        }

        let status = status?;
        if self.cancel.is_cancelled() {
            tracing::debug!("{} stopped after cancellation ({})", self.name, status);
            return Ok(());
        }
        if status.success() {
            tracing::info!("{} exited", self.name);
            Ok(())
        } else {
            Err(DaemonError::Exited(status))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn collector() -> (OutputSink, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&lines);
        let sink: OutputSink = Arc::new(move |line: &str| captured.lock().push(line.to_string()));
        (sink, lines)
    }

    #[tokio::test]
    async fn test_run_captures_stdout_in_exe_dir() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "echoer", "pwd\necho \"$1\"");
        let (sink, lines) = collector();

        let exe = ServiceExe::new(&CancellationToken::new(), &path, ["hello"]).with_sink(sink);
        exe.run().await.unwrap();

        assert!(exe.is_done());
        let lines = lines.lock();
        let cwd = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(std::fs::canonicalize(&lines[0]).unwrap(), cwd);
        assert_eq!(lines[1], "hello");
    }

    #[tokio::test]
    async fn test_stdin_is_fed() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "reader", "read a\nread b\necho \"$a-$b\"");
        let (sink, lines) = collector();

        let exe = ServiceExe::new(&CancellationToken::new(), &path, Vec::<String>::new())
            .with_stdin("y\nn\n")
            .with_sink(sink);
        exe.run().await.unwrap();
        assert_eq!(lines.lock().as_slice(), ["y-n"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "failer", "exit 3");

        let exe = ServiceExe::new(&CancellationToken::new(), &path, Vec::<String>::new());
        assert!(matches!(exe.run().await, Err(DaemonError::Exited(_))));
    }

    #[tokio::test]
    async fn test_parent_cancel_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "sleeper", "exec sleep 30");
        let parent = CancellationToken::new();

        let exe = Arc::new(ServiceExe::new(&parent, &path, Vec::<String>::new()));
        let handle = Arc::clone(&exe).start();
        exe.ready().await;
        assert!(exe.pid().is_some());

        parent.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(exe.is_done());
    }

    #[tokio::test]
    async fn test_missing_executable_fires_done() {
        let exe = ServiceExe::new(
            &CancellationToken::new(),
            "/nonexistent/eco-test-binary",
            Vec::<String>::new(),
        );
        assert!(matches!(exe.run().await, Err(DaemonError::Spawn { .. })));
        assert!(exe.is_done());
    }

    #[tokio::test]
    async fn test_cancel_with_background_grandchild() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "forker", "sleep 20 &\nexec sleep 30");
        let parent = CancellationToken::new();

        let exe = Arc::new(ServiceExe::new(&parent, &path, Vec::<String>::new()));
        let handle = Arc::clone(&exe).start();
        exe.ready().await;

        parent.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("run should return while the grandchild lives on")
            .unwrap();
        assert!(result.is_ok());
        assert!(exe.is_done());
    }

    #[tokio::test]
    async fn test_exit_with_background_grandchild() {
        let dir = TempDir::new().unwrap();
        let path = script(&dir, "leaver", "sleep 20 &\necho bye\nexit 4");
        let (sink, lines) = collector();

        let exe = ServiceExe::new(&CancellationToken::new(), &path, Vec::<String>::new())
            .with_sink(sink);
        let result = tokio::time::timeout(Duration::from_secs(5), exe.run())
            .await
            .expect("run should return while the grandchild lives on");
        assert!(matches!(result, Err(DaemonError::Exited(_))));
        assert_eq!(lines.lock().as_slice(), ["bye"]);
    }
}
