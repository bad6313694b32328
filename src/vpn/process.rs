//! VPN client process handling
//!
//! The client always runs in its own process group so a group kill also
//! reaches anything it spawns (up/down scripts, helpers). Stdout and stderr
//! share one pipe and are read as a single line stream.

use async_trait::async_trait;
use std::fs::File;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{VmateError, VmateResult};

/// Buffered output lines per running client
const LINE_CHANNEL_CAPACITY: usize = 256;

/// How the client should be started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Connect without touching routes, interfaces or credentials cache
    DryTest,
    /// Real connection
    Connect,
}

impl LaunchMode {
    /// Client arguments for `profile`
    pub fn args(self, profile: &Path) -> Vec<String> {
        let mut args = vec!["--config".to_string(), profile.to_string_lossy().into_owned()];
        if self == LaunchMode::DryTest {
            args.extend(
                ["--route-noexec", "--ifconfig-noexec", "--nobind", "--auth-nocache"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        args
    }
}

/// A running client: its output lines plus a way to kill its process group
#[async_trait]
pub trait ClientHandle: Send {
    /// Next output line, `None` once the output stream ended.
    /// Must be cancel-safe, it is polled inside `select!`.
    async fn next_line(&mut self) -> Option<String>;

    /// Force-kill the whole process group. Errors are swallowed.
    fn kill_group(&mut self);
}

/// Starts VPN client processes
#[async_trait]
pub trait ClientLauncher: Send + Sync {
    async fn launch(&self, profile: &Path, mode: LaunchMode) -> VmateResult<Box<dyn ClientHandle>>;

    /// Kill every client by process name, regardless of handles
    async fn sweep(&self);
}

/// Launches the real OpenVPN binary
pub struct OpenVpnLauncher {
    binary: String,
}

impl OpenVpnLauncher {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

#[async_trait]
impl ClientLauncher for OpenVpnLauncher {
    async fn launch(&self, profile: &Path, mode: LaunchMode) -> VmateResult<Box<dyn ClientHandle>> {
        let launch_error = |e: std::io::Error| VmateError::Launch {
            binary: self.binary.clone(),
            reason: e.to_string(),
        };

        // One pipe for both streams keeps the client's line order and gives a
        // single end-of-stream
        let (reader, writer) = std::io::pipe().map_err(launch_error)?;
        let stderr = writer.try_clone().map_err(launch_error)?;

        let child = Command::new(&self.binary)
            .args(mode.args(profile))
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr)
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(launch_error)?;

        let output = pipe::Receiver::from_file(File::from(OwnedFd::from(reader)))
            .map_err(launch_error)?;

        let pgid = child.id();
        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        tokio::spawn(forward_lines(output, tx));

        debug!("Started {} for {:?} (pgid: {:?})", self.binary, profile, pgid);

        Ok(Box::new(ProcessHandle { child, pgid, lines: rx }))
    }

    async fn sweep(&self) {
        sweep_by_name(&self.binary).await;
    }
}

/// Copy output lines into the channel until the pipe or the receiver closes.
/// Bytes that are not UTF-8 are replaced, never fatal.
async fn forward_lines<R>(pipe: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(pipe);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Client output read error: {}", e);
                break;
            }
        }
    }
}

struct ProcessHandle {
    child: Child,
    pgid: Option<u32>,
    lines: mpsc::Receiver<String>,
}

#[async_trait]
impl ClientHandle for ProcessHandle {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    fn kill_group(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
        // kill_on_drop reaps the child once the handle goes away
        let _ = self.child.start_kill();
        self.lines.close();
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

/// SIGKILL a whole process group
pub fn kill_process_group(pgid: u32) {
    let result = unsafe { libc::killpg(pgid as libc::pid_t, libc::SIGKILL) };
    if result != 0 {
        debug!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

/// Kill every process named exactly `binary`
pub async fn sweep_by_name(binary: &str) {
    match Command::new("pkill").args(["-9", "-x", binary]).output().await {
        Ok(output) => debug!("Swept {} processes (pkill exit: {})", binary, output.status),
        Err(e) => warn!("Failed to sweep {} processes: {}", binary, e),
    }
}

/// Blocking variant of [`sweep_by_name`] for exit paths outside the runtime
pub fn sweep_by_name_blocking(binary: &str) {
    let _ = std::process::Command::new("pkill")
        .args(["-9", "-x", binary])
        .output();
}
