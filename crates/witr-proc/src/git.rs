//! Git repository context for a working directory

use std::fs;
use std::path::Path;
use tracing::debug;

/// Repository a directory belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitContext {
    /// Base name of the directory containing `.git`
    pub repo: String,
    /// Current branch, `None` for a detached or unreadable HEAD
    pub branch: Option<String>,
}

/// Walk up from `dir` to the first ancestor holding a `.git` directory.
///
/// The filesystem root itself is never tested.
pub fn find_git_context(dir: &Path) -> Option<GitContext> {
    let root = dir
        .ancestors()
        .take_while(|ancestor| ancestor.parent().is_some())
        .find(|ancestor| ancestor.join(".git").is_dir());

    let Some(root) = root else {
        debug!(dir = %dir.display(), "no git repository found");
        return None;
    };

    let repo = root.file_name()?.to_string_lossy().into_owned();
    let branch = fs::read_to_string(root.join(".git").join("HEAD"))
        .ok()
        .and_then(|head| branch_from_head(&head));

    Some(GitContext { repo, branch })
}

/// `ref: refs/heads/feature/login` -> `login`
fn branch_from_head(head: &str) -> Option<String> {
    let reference = head.trim().strip_prefix("ref: ")?;
    reference.rsplit('/').next().map(str::to_string)
}
