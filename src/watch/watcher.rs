//! Watcher thread: notify events, debounced per path, forwarded to the async side.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{DescendantError, Result};
use crate::ingest::is_export_file;

/// Paths seen recently, each released once it has been quiet for `delay`.
#[derive(Debug)]
pub(crate) struct Debouncer {
    delay: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Record an event for `path`, restarting its quiet period.
    pub(crate) fn touch(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// Remove and return the paths quiet since `now - delay`, sorted.
    pub(crate) fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let delay = self.delay;
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) >= delay)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Watch `root` recursively and send debounced export paths over `tx`.
///
/// Blocks the calling thread. Returns when `tx`'s receiver is dropped or the
/// notify backend disconnects.
pub fn run_watcher_thread(root: &Path, debounce_ms: u64, tx: UnboundedSender<PathBuf>) -> Result<()> {
    let (event_tx, event_rx) = mpsc::channel::<Vec<PathBuf>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
        Ok(event) => {
            let _ = event_tx.send(event.paths);
        }
        Err(e) => log::warn!("watch: notify error: {}", e),
    })
    .map_err(|e| DescendantError::Config(format!("cannot start file watcher: {}", e)))?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(|e| DescendantError::Config(format!("cannot watch {}: {}", root.display(), e)))?;

    let mut debouncer = Debouncer::new(Duration::from_millis(debounce_ms));

    loop {
        match event_rx.recv_timeout(debouncer.delay) {
            Ok(paths) => {
                let now = Instant::now();
                for path in paths.into_iter().filter(|p| is_export_file(p)) {
                    debouncer.touch(path, now);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if debouncer.is_empty() {
                    continue;
                }
                for path in debouncer.take_ready(Instant::now()) {
                    if tx.send(path).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
