//! Background task scheduling with request-id based staleness.
//!
//! App code never spawns work itself. It describes the work as a [`Task`] and
//! pushes it to its outbox; the main loop hands each task to the [`Scheduler`],
//! which runs it on the tokio runtime and delivers exactly one [`AppEvent`]
//! into the single inbound queue. Tasks are never cancelled: a result whose
//! request id is no longer current is simply dropped when it is applied.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::events::{AppEvent, ReloadSnapshot};
use crate::files;
use crate::git::GitSnapshot;
use crate::git_diff_loader::{self, DiffRequest};
use crate::image_render::{self, ImageRequest};
use crate::preview_cache::file_mtime;
use crate::preview_loader;
use crate::watch::WatchSubscription;

/// Opaque, strictly increasing token for one "preview target changed" event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

/// Kinds of targets that each keep exactly one active request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Preview,
    Diff,
    Image,
}

impl TargetKind {
    fn slot(self) -> usize {
        match self {
            TargetKind::Preview => 0,
            TargetKind::Diff => 1,
            TargetKind::Image => 2,
        }
    }
}

/// Issues request ids from one global counter and tracks the active one per kind.
#[derive(Debug, Default)]
pub struct RequestIds {
    last: u64,
    active: [Option<RequestId>; 3],
}

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a fresh id and make it the only current one for `kind`.
    pub fn issue(&mut self, kind: TargetKind) -> RequestId {
        self.last += 1;
        let id = RequestId(self.last);
        self.active[kind.slot()] = Some(id);
        id
    }

    pub fn active(&self, kind: TargetKind) -> Option<RequestId> {
        self.active[kind.slot()]
    }

    pub fn is_current(&self, kind: TargetKind, id: RequestId) -> bool {
        self.active(kind) == Some(id)
    }

    /// Forget the active id so every in-flight result of `kind` becomes stale.
    pub fn clear(&mut self, kind: TargetKind) {
        self.active[kind.slot()] = None;
    }
}

/// A unit of background work. Each variant captures copies of everything it
/// needs and produces one event.
#[derive(Debug)]
pub enum Task {
    LoadPreview {
        request_id: RequestId,
        path: PathBuf,
        highlight: bool,
    },
    LoadDiff(DiffRequest),
    RenderImage(ImageRequest),
    Debounce {
        delay: Duration,
    },
    Reload {
        dir: PathBuf,
        show_hidden: bool,
    },
    WaitForChange(WatchSubscription),
}

impl Task {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Task::LoadPreview { .. } => "load-preview",
            Task::LoadDiff(_) => "load-diff",
            Task::RenderImage(_) => "render-image",
            Task::Debounce { .. } => "debounce",
            Task::Reload { .. } => "reload",
            Task::WaitForChange(_) => "wait-for-change",
        }
    }

    pub async fn run(self) -> AppEvent {
        match self {
            Task::LoadPreview {
                request_id,
                path,
                highlight,
            } => {
                let load_path = path.clone();
                let result =
                    blocking(move || preview_loader::load_preview(&load_path, highlight)).await;
                AppEvent::PreviewLoaded {
                    request_id,
                    path,
                    result,
                }
            }
            Task::LoadDiff(request) => {
                let mtime = file_mtime(&request.key.path);
                let request_id = request.request_id;
                let key = request.key.clone();
                let result = blocking(move || {
                    git_diff_loader::load_diff(
                        &request.repo_root,
                        &request.rel_path,
                        request.key.staged,
                        request.context_lines,
                    )
                })
                .await;
                AppEvent::DiffLoaded {
                    request_id,
                    key,
                    mtime,
                    result,
                }
            }
            Task::RenderImage(request) => {
                let request_id = request.request_id;
                let path = request.path.clone();
                let target = request.params.target;
                let validity = request.validity;
                let result = blocking(move || {
                    image_render::render_image(&request.path, &request.params)
                        .map_err(|e| format!("{e:#}"))
                })
                .await;
                AppEvent::ImageRendered {
                    request_id,
                    path,
                    target,
                    validity,
                    result,
                }
            }
            Task::Debounce { delay } => {
                tokio::time::sleep(delay).await;
                AppEvent::DebouncedReload
            }
            Task::Reload { dir, show_hidden } => {
                let list_dir = dir.clone();
                let git_dir = dir.clone();
                let (entries, git) = tokio::join!(
                    blocking(move || files::read_dir_entries(&list_dir, show_hidden)),
                    blocking(move || Ok(GitSnapshot::load(&git_dir))),
                );
                AppEvent::Reloaded(ReloadSnapshot {
                    dir,
                    entries,
                    git: git.unwrap_or_default(),
                })
            }
            Task::WaitForChange(subscription) => subscription.next_change().await,
        }
    }
}

/// Run blocking I/O off the async workers.
async fn blocking<T, F>(work: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(e) => Err(format!("Task join error: {}", e)),
    }
}

/// Handle for running tasks; the paired receiver is the main loop's event queue.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl Scheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AppEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Run `task` without blocking the caller and enqueue its event when done.
    pub fn schedule(&self, task: Task) -> JoinHandle<()> {
        let tx = self.tx.clone();
        let name = task.name();
        tokio::spawn(async move {
            let event = task.run().await;
            if tx.send(event).is_err() {
                log::debug!("event queue closed, dropping {name} result");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_strictly_increasing_across_kinds() {
        let mut ids = RequestIds::new();
        let a = ids.issue(TargetKind::Diff);
        let b = ids.issue(TargetKind::Image);
        let c = ids.issue(TargetKind::Diff);
        assert!(a < b && b < c);
        assert!(ids.is_current(TargetKind::Image, b));
        assert!(ids.is_current(TargetKind::Diff, c));
        assert!(!ids.is_current(TargetKind::Diff, a));
        // An id issued for another kind never counts as current here.
        assert!(!ids.is_current(TargetKind::Diff, b));
    }

    #[test]
    fn test_clear_makes_everything_stale() {
        let mut ids = RequestIds::new();
        let a = ids.issue(TargetKind::Preview);
        ids.clear(TargetKind::Preview);
        assert!(!ids.is_current(TargetKind::Preview, a));
        assert_eq!(ids.active(TargetKind::Preview), None);
        let b = ids.issue(TargetKind::Preview);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_schedule_delivers_one_event() {
        let (scheduler, mut rx) = Scheduler::new();
        let handle = scheduler.schedule(Task::Debounce {
            delay: Duration::from_millis(1),
        });
        handle.await.unwrap();
        assert!(matches!(rx.recv().await, Some(AppEvent::DebouncedReload)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_load_preview_task_reports_missing_file() {
        let (scheduler, mut rx) = Scheduler::new();
        let mut ids = RequestIds::new();
        let request_id = ids.issue(TargetKind::Preview);
        scheduler
            .schedule(Task::LoadPreview {
                request_id,
                path: PathBuf::from("/definitely/not/here.txt"),
                highlight: false,
            })
            .await
            .unwrap();
        match rx.recv().await {
            Some(AppEvent::PreviewLoaded {
                request_id: got,
                result,
                ..
            }) => {
                assert_eq!(got, request_id);
                assert!(result.is_err());
            }
            _ => panic!("expected PreviewLoaded"),
        }
    }
}
