//! Progressive git diff loading.
//!
//! A selection first fetches a quick diff with little context, shows it, and
//! then fetches the full-context diff in the background. Both phases share
//! one request id; [`DiffView::apply`] only ever upgrades quick to full, so a
//! late quick result can never replace a full one already on screen.

use std::path::{Path, PathBuf};

use crate::git_ops;
use crate::preview_cache::DiffKey;
use crate::scheduler::RequestId;

/// Context-size class of a diff.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiffContext {
    Quick,
    Full,
}

/// Everything a background diff load needs, copied at schedule time.
#[derive(Clone, Debug)]
pub struct DiffRequest {
    pub request_id: RequestId,
    pub repo_root: PathBuf,
    /// Path relative to `repo_root`, as git reports it.
    pub rel_path: String,
    pub key: DiffKey,
    pub context_lines: u32,
}

/// Run `git diff` for one path (blocking I/O).
///
/// An empty result means "no changes". Errors cover both a failing git
/// process and a missing git binary.
pub fn load_diff(
    repo_root: &Path,
    path: &str,
    staged: bool,
    context_lines: u32,
) -> Result<Vec<String>, String> {
    let text = git_ops::diff_path(repo_root, path, staged, context_lines)
        .map_err(|e| format!("git diff failed: {}", e))?;
    Ok(text.lines().map(|l| l.to_string()).collect())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffBody {
    Empty,
    Loading,
    Lines(Vec<String>),
    Message(String),
}

/// The diff pane: which file it shows, at which context class, and where the
/// user has scrolled to.
#[derive(Clone, Debug)]
pub struct DiffView {
    pub request_id: Option<RequestId>,
    pub repo_root: PathBuf,
    pub rel_path: String,
    pub path: PathBuf,
    pub staged: bool,
    pub shown: Option<DiffContext>,
    pub body: DiffBody,
    pub scroll: u16,
}

/// Outcome of offering a loaded diff to the view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    Shown,
    /// A full diff is already on screen; a quick one would be a downgrade.
    Downgrade,
}

impl Default for DiffView {
    fn default() -> Self {
        Self {
            request_id: None,
            repo_root: PathBuf::new(),
            rel_path: String::new(),
            path: PathBuf::new(),
            staged: false,
            shown: None,
            body: DiffBody::Empty,
            scroll: 0,
        }
    }
}

impl DiffView {
    /// Point the view at a new target. Scroll is kept only when the target
    /// is the same file and side it already shows.
    pub fn retarget(
        &mut self,
        request_id: RequestId,
        repo_root: PathBuf,
        rel_path: String,
        staged: bool,
    ) {
        let path = repo_root.join(&rel_path);
        if self.path != path || self.staged != staged {
            self.scroll = 0;
        }
        self.request_id = Some(request_id);
        self.repo_root = repo_root;
        self.rel_path = rel_path;
        self.path = path;
        self.staged = staged;
        self.shown = None;
        self.body = DiffBody::Loading;
    }

    pub fn key(&self, context: DiffContext) -> DiffKey {
        DiffKey {
            path: self.path.clone(),
            staged: self.staged,
            context,
        }
    }

    /// Whether `key` names the file and side this view is showing.
    pub fn is_target(&self, key: &DiffKey) -> bool {
        self.path == key.path && self.staged == key.staged
    }

    /// Show `lines` unless that would downgrade full to quick. The scroll
    /// offset survives the replacement.
    pub fn apply(&mut self, context: DiffContext, lines: Vec<String>) -> Applied {
        if self.shown == Some(DiffContext::Full) && context == DiffContext::Quick {
            return Applied::Downgrade;
        }
        let scroll = self.scroll;
        self.shown = Some(context);
        self.body = DiffBody::Lines(lines);
        self.scroll = scroll;
        Applied::Shown
    }

    pub fn set_message<S: Into<String>>(&mut self, msg: S) {
        self.shown = None;
        self.body = DiffBody::Message(msg.into());
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn line_count(&self) -> usize {
        match &self.body {
            DiffBody::Lines(lines) => lines.len(),
            _ => 0,
        }
    }

    pub fn request(&self, context: DiffContext, context_lines: u32) -> Option<DiffRequest> {
        Some(DiffRequest {
            request_id: self.request_id?,
            repo_root: self.repo_root.clone(),
            rel_path: self.rel_path.clone(),
            key: self.key(context),
            context_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RequestIds, TargetKind};
    use std::process::Command;
    use tempfile::TempDir;

    fn view() -> DiffView {
        let mut ids = RequestIds::new();
        let mut view = DiffView::default();
        view.retarget(
            ids.issue(TargetKind::Diff),
            PathBuf::from("/repo"),
            "src/main.rs".into(),
            true,
        );
        view
    }

    #[test]
    fn test_quick_then_full_upgrades_and_keeps_scroll() {
        let mut view = view();
        assert_eq!(view.body, DiffBody::Loading);
        assert_eq!(view.apply(DiffContext::Quick, vec!["@@ quick".into()]), Applied::Shown);
        view.scroll = 7;
        assert_eq!(
            view.apply(DiffContext::Full, vec!["@@ full".into(); 40]),
            Applied::Shown
        );
        assert_eq!(view.shown, Some(DiffContext::Full));
        assert_eq!(view.scroll, 7);
        assert_eq!(view.line_count(), 40);
    }

    #[test]
    fn test_late_quick_never_replaces_full() {
        let mut view = view();
        view.apply(DiffContext::Full, vec!["full".into()]);
        assert_eq!(
            view.apply(DiffContext::Quick, vec!["quick".into()]),
            Applied::Downgrade
        );
        assert_eq!(view.body, DiffBody::Lines(vec!["full".into()]));
    }

    #[test]
    fn test_retarget_resets_scroll_only_for_other_file() {
        let mut ids = RequestIds::new();
        let mut view = view();
        view.scroll = 12;
        view.retarget(
            ids.issue(TargetKind::Diff),
            PathBuf::from("/repo"),
            "src/main.rs".into(),
            true,
        );
        assert_eq!(view.scroll, 12);
        view.retarget(
            ids.issue(TargetKind::Diff),
            PathBuf::from("/repo"),
            "src/main.rs".into(),
            false,
        );
        assert_eq!(view.scroll, 0);
    }

    #[test]
    fn test_is_target_checks_path_and_side() {
        let view = view();
        assert!(view.is_target(&view.key(DiffContext::Full)));
        let mut other = view.key(DiffContext::Quick);
        other.staged = false;
        assert!(!view.is_target(&other));
    }

    #[test]
    fn test_load_diff_outside_repo_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        assert!(load_diff(dir.path(), "a.txt", false, 3).is_err());
    }

    fn git(dir: &Path, args: &[&str]) -> bool {
        Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .env("GIT_AUTHOR_NAME", "t")
            .env("GIT_AUTHOR_EMAIL", "t@example.com")
            .env("GIT_COMMITTER_NAME", "t")
            .env("GIT_COMMITTER_EMAIL", "t@example.com")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_quick_and_full_context_sizes() {
        let dir = TempDir::new().unwrap();
        if !git(dir.path(), &["init", "-q"]) {
            // git not installed
            return;
        }
        let original: String = (1..=200).map(|i| format!("line {i}\n")).collect();
        std::fs::write(dir.path().join("big.txt"), &original).unwrap();
        assert!(git(dir.path(), &["add", "big.txt"]));
        assert!(git(dir.path(), &["commit", "-q", "-m", "init"]));

        let edited = original.replace("line 100\n", "line one hundred\n");
        std::fs::write(dir.path().join("big.txt"), edited).unwrap();
        assert!(git(dir.path(), &["add", "big.txt"]));

        let quick = load_diff(dir.path(), "big.txt", true, 3).unwrap();
        let full = load_diff(dir.path(), "big.txt", true, 100_000).unwrap();
        let context = |lines: &[String]| lines.iter().filter(|l| l.starts_with(' ')).count();
        assert_eq!(context(&quick), 6);
        assert_eq!(context(&full), 199);
        assert!(full.iter().any(|l| l == "+line one hundred"));

        // Nothing unstaged left.
        assert!(load_diff(dir.path(), "big.txt", false, 3).unwrap().is_empty());
    }
}
