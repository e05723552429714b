//! Rendering of resolved processes

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use witr_core::{Ancestry, Process};

/// A target process together with the chain that led to it
#[derive(Debug, Serialize)]
pub struct Report {
    pub process: Process,
    pub ancestry: Ancestry,
}

impl Report {
    /// The ancestry always ends with the target
    pub fn from_ancestry(ancestry: Ancestry) -> Option<Self> {
        let process = ancestry.last()?.clone();
        Some(Self { process, ancestry })
    }
}

/// One row of the batch view
#[derive(Debug, Serialize)]
pub struct BatchRow {
    pub process: Process,
    pub task: String,
}

/// `systemd → sshd → bash → node`
pub fn render_short(report: &Report) -> String {
    report
        .ancestry
        .iter()
        .map(|p| p.command.as_str())
        .collect::<Vec<_>>()
        .join(" → ")
}

pub fn render_full(report: &Report, now: DateTime<Utc>) -> String {
    FullReport { report, now }.to_string()
}

pub fn render_batch(rows: &[BatchRow]) -> String {
    BatchTable(rows).to_string()
}

/// Narrative view of one report, relative to `now`
struct FullReport<'a> {
    report: &'a Report,
    now: DateTime<Utc>,
}

impl fmt::Display for FullReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.report.process;

        writeln!(f, "Target      : {} (pid {})", p.command, p.pid)?;
        writeln!(f)?;
        writeln!(f, "Why It Exists :")?;
        let chain = self
            .report
            .ancestry
            .iter()
            .map(|a| format!("{} (pid {})", a.command, a.pid))
            .collect::<Vec<_>>()
            .join(" → ");
        writeln!(f, "  {chain}")?;
        writeln!(f)?;

        if let Some(started) = p.started_at {
            writeln!(
                f,
                "Started     : {} ({})",
                relative_time(started, self.now),
                started.format("%a %Y-%m-%d %H:%M:%S UTC")
            )?;
        }
        writeln!(f, "User        : {}", p.user)?;
        if !p.cmdline.is_empty() {
            writeln!(f, "Command     : {}", p.cmdline)?;
        }
        if let Some(exe) = &p.exe {
            writeln!(f, "Executable  : {exe}")?;
        }
        writeln!(f, "Working Dir : {}", p.working_dir)?;
        match (&p.git_repo, &p.git_branch) {
            (Some(repo), Some(branch)) => writeln!(f, "Git Repo    : {repo} ({branch})")?,
            (Some(repo), None) => writeln!(f, "Git Repo    : {repo}")?,
            _ => {}
        }
        if let Some(container) = p.container {
            writeln!(f, "Container   : {container}")?;
        }
        if let Some(service) = &p.service {
            writeln!(f, "Service     : {service}")?;
        }
        if !p.listening.is_empty() {
            let sockets = p
                .listening
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "Listening   : {sockets}")?;
        }
        Ok(())
    }
}

/// Fixed-width table, one row per process
struct BatchTable<'a>(&'a [BatchRow]);

impl fmt::Display for BatchTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<8} {:<12} {:<20} {:<14} {:<24} COMMAND",
            "PID", "USER", "TASK", "PORTS", "GIT"
        )?;

        for row in self.0 {
            let p = &row.process;
            let ports = if p.listening.is_empty() {
                "-".to_string()
            } else {
                p.listening_ports()
                    .iter()
                    .map(u16::to_string)
                    .collect::<Vec<_>>()
                    .join(",")
            };
            let git = match (&p.git_repo, &p.git_branch) {
                (Some(repo), Some(branch)) => format!("{repo}@{branch}"),
                (Some(repo), None) => repo.clone(),
                _ => "-".to_string(),
            };
            let command = if p.cmdline.is_empty() {
                &p.command
            } else {
                &p.cmdline
            };
            writeln!(
                f,
                "{:<8} {:<12} {:<20} {:<14} {:<24} {}",
                p.pid,
                truncate(&p.user, 12),
                truncate(&row.task, 20),
                truncate(&ports, 14),
                truncate(&git, 24),
                command
            )?;
        }
        Ok(())
    }
}

/// `3 hours ago`, `just now`
fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 0 {
        return "in the future".to_string();
    }

    let (value, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    let plural = if value == 1 { "" } else { "s" };
    format!("{value} {unit}{plural} ago")
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut cut: String = s.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}
