//! Paths and small readers for a proc filesystem root

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A proc filesystem mounted at `root` (normally `/proc`)
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<pid>`
    pub fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    /// `<root>/<pid>/<entry>`
    pub fn pid_path(&self, pid: u32, entry: &str) -> PathBuf {
        self.pid_dir(pid).join(entry)
    }

    /// `<root>/net/<table>`
    pub fn net_path(&self, table: &str) -> PathBuf {
        self.root.join("net").join(table)
    }

    /// System boot time from the `btime` line of `<root>/stat`
    pub fn boot_time(&self) -> Option<DateTime<Utc>> {
        let path = self.root.join("stat");
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cannot read boot time");
                return None;
            }
        };
        let secs = parse_btime(&content)?;
        DateTime::from_timestamp(secs, 0)
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

fn parse_btime(stat: &str) -> Option<i64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}
