//! Scripted stand-ins for the VPN client and the single-profile tester

#![allow(dead_code)]

use async_trait::async_trait;
use libvmate::{ClientHandle, ClientLauncher, LaunchMode, Profile, ProfileTester, VmateResult};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Output of one scripted client run
#[derive(Clone)]
pub struct Script {
    pub lines: Vec<String>,
    /// Keep the stream open after the last line
    pub hang: bool,
}

impl Script {
    pub fn ends(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            hang: false,
        }
    }

    pub fn hangs(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|s| s.to_string()).collect(),
            hang: true,
        }
    }
}

/// Hands out scripts in launch order; hangs silently once they run out
#[derive(Default)]
pub struct ScriptedLauncher {
    scripts: Mutex<VecDeque<Script>>,
    pub launches: Mutex<Vec<(PathBuf, LaunchMode)>>,
    pub kills: Arc<AtomicUsize>,
    pub sweeps: AtomicUsize,
}

impl ScriptedLauncher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Self::default()
        }
    }

    pub fn launched_paths(&self) -> Vec<PathBuf> {
        self.launches.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn sweep_count(&self) -> usize {
        self.sweeps.load(Ordering::SeqCst)
    }
}

struct ScriptedHandle {
    lines: VecDeque<String>,
    hang: bool,
    kills: Arc<AtomicUsize>,
}

#[async_trait]
impl ClientHandle for ScriptedHandle {
    async fn next_line(&mut self) -> Option<String> {
        match self.lines.pop_front() {
            Some(line) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some(line)
            }
            None if self.hang => std::future::pending().await,
            None => None,
        }
    }

    fn kill_group(&mut self) {
        self.kills.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClientLauncher for ScriptedLauncher {
    async fn launch(&self, profile: &Path, mode: LaunchMode) -> VmateResult<Box<dyn ClientHandle>> {
        self.launches.lock().unwrap().push((profile.to_path_buf(), mode));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::hangs(&[]));
        Ok(Box::new(ScriptedHandle {
            lines: script.lines.into(),
            hang: script.hang,
            kills: self.kills.clone(),
        }))
    }

    async fn sweep(&self) {
        self.sweeps.fetch_add(1, Ordering::SeqCst);
    }
}

/// Tester that records concurrency and decides by file name prefix:
/// `pass-*` passes after `delay`, `fail-*` fails after `delay`,
/// anything else blocks until cancelled.
pub struct RecordingTester {
    pub delay: Duration,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub started: AtomicUsize,
}

impl RecordingTester {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProfileTester for RecordingTester {
    async fn test(&self, profile: &Profile, cancel: &CancellationToken) -> bool {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let name = profile
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let verdict = if name.starts_with("pass-") || name.starts_with("fail-") {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => name.starts_with("pass-"),
                _ = cancel.cancelled() => false,
            }
        } else {
            cancel.cancelled().await;
            false
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        verdict
    }
}

/// Counts progress signals
#[derive(Default)]
pub struct CountingProgress(pub AtomicUsize);

impl libvmate::ProgressSink for CountingProgress {
    fn advance(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl CountingProgress {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn profiles(names: &[&str]) -> Vec<Profile> {
    names
        .iter()
        .map(|n| Profile::new(format!("/vpn/{}.ovpn", n)))
        .collect()
}
