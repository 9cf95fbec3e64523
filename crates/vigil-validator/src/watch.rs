//! Single-file change watcher.
//!
//! Watches the parent directory of one file so replace-by-rename saves are
//! seen as well as in-place writes.  Bursts of events are coalesced: the
//! callback fires once the file has been quiet for the debounce window.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Debounce window used when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Watches one file and invokes a callback after it changes.
///
/// Stopping is idempotent and also happens on drop.
pub struct FileWatcher {
    path: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl FileWatcher {
    /// Start watching `path`.  `on_change` runs on a dedicated thread.
    pub fn spawn<F>(path: impl AsRef<Path>, debounce: Duration, on_change: F) -> notify::Result<Self>
    where
        F: Fn(&Path) + Send + 'static,
    {
        let path = path.as_ref();
        let file_name: OsString = path
            .file_name()
            .ok_or_else(|| notify::Error::generic("watched path has no file name"))?
            .to_owned();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let dir = dir.canonicalize().map_err(notify::Error::io)?;
        let path = dir.join(&file_name);

        let (tx, rx) = mpsc::channel::<()>();
        let target = file_name.clone();
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    if event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(target.as_os_str()))
                    {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "File watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let notify_path = path.clone();
        std::thread::Builder::new()
            .name("vigil-file-watch".to_string())
            .spawn(move || {
                // Ends when the watcher, and with it the sender, is dropped.
                while rx.recv().is_ok() {
                    // drain until quiet
                    loop {
                        match rx.recv_timeout(debounce) {
                            Ok(()) => continue,
                            Err(mpsc::RecvTimeoutError::Timeout) => break,
                            Err(mpsc::RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    debug!(path = %notify_path.display(), "Watched file changed");
                    on_change(&notify_path);
                }
            })
            .map_err(notify::Error::io)?;

        info!(path = %path.display(), "Watching file for changes");
        Ok(Self {
            path,
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Absolute path of the watched file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop watching.  Later calls are no-ops.
    pub fn stop(&self) {
        if self.watcher.lock().take().is_some() {
            info!(path = %self.path.display(), "Stopped watching file");
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn change_triggers_callback_once_per_burst() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("users.txt");
        std::fs::write(&file, "a").unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let watcher = FileWatcher::spawn(&file, Duration::from_millis(200), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for i in 0..5 {
            std::fs::write(&file, format!("burst {i}")).unwrap();
        }
        assert!(wait_for(|| hits.load(Ordering::SeqCst) >= 1));
        std::thread::sleep(Duration::from_millis(400));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(watcher);
    }

    #[test]
    fn sibling_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("users.txt");
        std::fs::write(&file, "a").unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _watcher = FileWatcher::spawn(&file, Duration::from_millis(50), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        std::fs::write(dir.path().join("other.txt"), "b").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("spec.yaml");
        std::fs::write(&file, "").unwrap();

        let watcher = FileWatcher::spawn(&file, DEFAULT_DEBOUNCE, |_| {}).unwrap();
        assert!(watcher.is_running());
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn missing_directory_fails() {
        assert!(FileWatcher::spawn("/nonexistent/dir/users.txt", DEFAULT_DEBOUNCE, |_| {}).is_err());
    }
}
