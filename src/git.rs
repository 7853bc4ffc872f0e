use std::path::{Path, PathBuf};

use crate::git_ops;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitFileEntry {
    pub path: String,
    pub x: char,
    pub y: char,
    pub is_untracked: bool,
    pub renamed_from: Option<String>,
}

/// One row of the change list. A file with both staged and unstaged edits
/// shows up twice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeItem {
    pub path: String,
    pub status: char,
    pub staged: bool,
    pub untracked: bool,
    /// Original path of a staged rename.
    pub renamed_from: Option<String>,
}

/// Repository state read in one pass.
#[derive(Clone, Debug, Default)]
pub struct GitSnapshot {
    pub repo_root: Option<PathBuf>,
    pub branch: String,
    pub entries: Vec<GitFileEntry>,
}

impl GitSnapshot {
    /// Never fails: outside a repository, or when git is missing, the
    /// snapshot is simply empty.
    pub fn load(dir: &Path) -> Self {
        let Some(root) = git_ops::repo_root(dir) else {
            return Self::default();
        };
        let mut snapshot = Self {
            repo_root: Some(root.clone()),
            ..Self::default()
        };
        match git_ops::status_porcelain(&root) {
            Ok(raw) => {
                let (branch, entries) = parse_status(&raw);
                snapshot.branch = branch;
                snapshot.entries = entries;
            }
            Err(e) => log::warn!("git status failed in {}: {}", root.display(), e),
        }
        snapshot
    }

    pub fn changes(&self) -> Vec<ChangeItem> {
        let mut staged = Vec::new();
        let mut unstaged = Vec::new();
        let mut untracked = Vec::new();
        for e in &self.entries {
            if e.is_untracked {
                untracked.push(ChangeItem {
                    path: e.path.clone(),
                    status: '?',
                    staged: false,
                    untracked: true,
                    renamed_from: None,
                });
                continue;
            }
            if e.x != ' ' {
                staged.push(ChangeItem {
                    path: e.path.clone(),
                    status: e.x,
                    staged: true,
                    untracked: false,
                    renamed_from: e.renamed_from.clone(),
                });
            }
            if e.y != ' ' {
                unstaged.push(ChangeItem {
                    path: e.path.clone(),
                    status: e.y,
                    staged: false,
                    untracked: false,
                    renamed_from: None,
                });
            }
        }
        staged.extend(unstaged);
        staged.extend(untracked);
        staged
    }
}

/// Parse `git status --porcelain=v1 -z -b` output into the branch name and entries.
pub fn parse_status(raw: &[u8]) -> (String, Vec<GitFileEntry>) {
    let items: Vec<&[u8]> = raw.split(|b| *b == 0).filter(|s| !s.is_empty()).collect();
    let mut branch = String::new();
    let mut entries = Vec::new();

    let mut i = 0;
    while i < items.len() {
        let s = String::from_utf8_lossy(items[i]).to_string();
        if let Some(line) = s.strip_prefix("## ") {
            branch = line
                .split("...")
                .next()
                .unwrap_or(line)
                .trim_start_matches("No commits yet on ")
                .to_string();
            i += 1;
            continue;
        }
        if s.len() < 4 {
            i += 1;
            continue;
        }

        let mut chars = s.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        let path = s[3..].to_string();

        if x == '?' && y == '?' {
            entries.push(GitFileEntry {
                path,
                x,
                y,
                is_untracked: true,
                renamed_from: None,
            });
            i += 1;
            continue;
        }

        // With -z, renames and copies are followed by the original path.
        if x == 'R' || x == 'C' {
            let from = items
                .get(i + 1)
                .map(|b| String::from_utf8_lossy(b).to_string());
            entries.push(GitFileEntry {
                path,
                x,
                y,
                is_untracked: false,
                renamed_from: from,
            });
            i += 2;
            continue;
        }

        entries.push(GitFileEntry {
            path,
            x,
            y,
            is_untracked: false,
            renamed_from: None,
        });
        i += 1;
    }

    (branch, entries)
}

/// Change list plus selection, as shown in the Changes tab.
#[derive(Debug, Default)]
pub struct GitState {
    pub snapshot: GitSnapshot,
    pub changes: Vec<ChangeItem>,
    pub selected: usize,
}

impl GitState {
    /// Replace the snapshot, keeping the selection on the same change when it still exists.
    pub fn apply_snapshot(&mut self, snapshot: GitSnapshot) {
        let previous = self.selected_change().cloned();
        self.changes = snapshot.changes();
        self.snapshot = snapshot;
        self.selected = previous
            .and_then(|p| {
                self.changes
                    .iter()
                    .position(|c| c.path == p.path && c.staged == p.staged)
            })
            .unwrap_or(0)
            .min(self.changes.len().saturating_sub(1));
    }

    pub fn selected_change(&self) -> Option<&ChangeItem> {
        self.changes.get(self.selected)
    }

    pub fn repo_root(&self) -> Option<&Path> {
        self.snapshot.repo_root.as_deref()
    }
}
