use std::{
    io,
    path::{Path, PathBuf},
    process::Command,
};

/// Non-interactive git. With optional locks off, `status` leaves `.git/index`
/// alone and the watcher sees no change from our own commands.
fn git_command(cwd: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(cwd)
        .args(args)
        .env("GIT_OPTIONAL_LOCKS", "0")
        .env("GIT_TERMINAL_PROMPT", "0")
        .env("GCM_INTERACTIVE", "never")
        .env("GIT_PAGER", "cat")
        .env("PAGER", "cat")
        .env("GIT_EDITOR", ":")
        .env("EDITOR", ":");
    cmd
}

pub(crate) fn run_git(cwd: &Path, args: &[&str]) -> io::Result<std::process::Output> {
    git_command(cwd, args).output()
}

/// Top-level directory of the repository containing `dir`, if any.
pub fn repo_root(dir: &Path) -> Option<PathBuf> {
    let out = run_git(dir, &["rev-parse", "--show-toplevel"]).ok()?;
    if !out.status.success() {
        return None;
    }
    let root = String::from_utf8(out.stdout).ok()?;
    let root = root.trim();
    (!root.is_empty()).then(|| PathBuf::from(root))
}

/// Unified diff of one path with `context_lines` lines of context.
///
/// Returns an empty string when the path has no changes.
pub fn diff_path(
    repo_root: &Path,
    path: &str,
    staged: bool,
    context_lines: u32,
) -> Result<String, String> {
    let unified = format!("-U{}", context_lines);
    let mut args: Vec<&str> = vec!["diff", "--no-color", "--no-ext-diff", unified.as_str()];
    if staged {
        args.push("--cached");
    }
    args.push("--");
    args.push(path);

    let out = run_git(repo_root, &args).map_err(|e| e.to_string())?;
    if !out.status.success() {
        return Err(String::from_utf8_lossy(&out.stderr).trim().to_string());
    }
    Ok(String::from_utf8_lossy(&out.stdout).to_string())
}

/// Raw `status --porcelain=v1 -z -b` output.
pub fn status_porcelain(repo_root: &Path) -> Result<Vec<u8>, String> {
    let out = run_git(
        repo_root,
        &["status", "--porcelain=v1", "-z", "-b", "--untracked-files=all"],
    )
    .map_err(|e| e.to_string())?;
    if !out.status.success() {
        return Err(String::from_utf8_lossy(&out.stderr).trim().to_string());
    }
    Ok(out.stdout)
}
