//! Filesystem watching with debounced reloads.
//!
//! notify::RecommendedWatcher runs callbacks on an internal thread. Its
//! notifications are forwarded into a tokio channel that is read through a
//! single-shot [`WatchSubscription`]: the subscription is moved into a wait
//! task, handed back inside `AppEvent::FsChanged`, and re-armed by the app.
//! [`ReloadDebouncer`] turns a burst of those events into one reload.

use std::path::{Component, Path};
use std::time::Duration;

use anyhow::Result;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::events::AppEvent;

pub struct FileWatcher {
    _watcher: RecommendedWatcher, // Drop stops watching
}

/// The receiving end of the raw notification stream.
#[derive(Debug)]
pub struct WatchSubscription {
    rx: mpsc::UnboundedReceiver<()>,
}

impl FileWatcher {
    /// Watch `root` recursively.
    pub fn start(root: &Path) -> Result<(Self, WatchSubscription)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) if is_relevant(&event) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(e) => log::warn!("watch error: {e}"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        log::info!("watching {}", root.display());

        Ok((Self { _watcher: watcher }, WatchSubscription { rx }))
    }
}

/// Reads are not changes, and git's object store churns on every command.
/// The index and HEAD still count: they change what the status shows.
fn is_relevant(event: &notify::Event) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event.paths.is_empty() || event.paths.iter().any(|p| !is_git_internal(p))
}

fn is_git_internal(path: &Path) -> bool {
    let in_git_dir = path
        .components()
        .any(|c| c == Component::Normal(".git".as_ref()));
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    in_git_dir && !matches!(name, "index" | "HEAD")
}

impl WatchSubscription {
    /// A subscription fed by hand instead of a watcher.
    #[cfg(test)]
    pub fn detached() -> (mpsc::UnboundedSender<()>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Wait for the next notification. Anything already queued behind it is
    /// absorbed into the same delivery.
    pub async fn next_change(mut self) -> AppEvent {
        if self.rx.recv().await.is_none() {
            log::debug!("watcher stopped");
            std::future::pending::<()>().await;
        }
        while self.rx.try_recv().is_ok() {}
        AppEvent::FsChanged(self)
    }
}

/// Coalesces change notifications into delayed reloads.
///
/// The timer is not reset by later notifications, so a continuous stream of
/// changes still reloads once per `delay`.
#[derive(Debug)]
pub struct ReloadDebouncer {
    delay: Duration,
    scheduled: bool,
}

impl ReloadDebouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            scheduled: false,
        }
    }

    /// Returns the delay to schedule a reload after, or `None` when one is
    /// already pending.
    pub fn on_change(&mut self) -> Option<Duration> {
        if self.scheduled {
            return None;
        }
        self.scheduled = true;
        Some(self.delay)
    }

    /// The delay elapsed; the next notification starts a new window.
    pub fn on_fire(&mut self) {
        self.scheduled = false;
    }

    #[cfg(test)]
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Scheduler, Task};
    use std::path::PathBuf;
    use tempfile::TempDir;

    const DELAY: Duration = Duration::from_millis(100);

    #[test]
    fn test_debouncer_absorbs_until_fired() {
        let mut debouncer = ReloadDebouncer::new(DELAY);
        assert_eq!(debouncer.on_change(), Some(DELAY));
        assert!(debouncer.is_scheduled());
        assert_eq!(debouncer.on_change(), None);
        assert_eq!(debouncer.on_change(), None);
        debouncer.on_fire();
        assert!(!debouncer.is_scheduled());
        assert_eq!(debouncer.on_change(), Some(DELAY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_one_reload() {
        let (scheduler, mut rx) = Scheduler::new();
        let mut debouncer = ReloadDebouncer::new(DELAY);
        let start = tokio::time::Instant::now();

        for _ in 0..5 {
            if let Some(delay) = debouncer.on_change() {
                scheduler.schedule(Task::Debounce { delay });
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert!(matches!(rx.recv().await, Some(AppEvent::DebouncedReload)));
        assert!(start.elapsed() >= DELAY);
        debouncer.on_fire();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_changes_each_reload() {
        let (scheduler, mut rx) = Scheduler::new();
        let mut debouncer = ReloadDebouncer::new(DELAY);
        let mut reloads = 0;

        for _ in 0..4 {
            if let Some(delay) = debouncer.on_change() {
                scheduler.schedule(Task::Debounce { delay });
            }
            if let Some(AppEvent::DebouncedReload) = rx.recv().await {
                reloads += 1;
                debouncer.on_fire();
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        assert_eq!(reloads, 4);
    }

    #[test]
    fn test_git_internal_paths() {
        assert!(is_git_internal(&PathBuf::from("/r/.git/objects/ab/cdef")));
        assert!(!is_git_internal(&PathBuf::from("/r/.git/index")));
        assert!(!is_git_internal(&PathBuf::from("/r/src/main.rs")));
    }

    #[tokio::test]
    async fn test_watcher_delivers_change() {
        let dir = TempDir::new().unwrap();
        let (_watcher, subscription) = FileWatcher::start(dir.path()).unwrap();
        std::fs::write(dir.path().join("new.txt"), "hello").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), subscription.next_change())
            .await
            .expect("no change notification");
        let AppEvent::FsChanged(subscription) = event else {
            panic!("expected FsChanged");
        };

        // Re-armed subscription keeps working.
        std::fs::write(dir.path().join("other.txt"), "again").unwrap();
        let again = tokio::time::timeout(Duration::from_secs(5), subscription.next_change()).await;
        assert!(again.is_ok());
    }
}
