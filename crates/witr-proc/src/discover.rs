//! Pattern search over the live process table
//!
//! Lists every process once via `ps` and keeps the PIDs whose command name
//! or argument string contains the pattern. Returns all matches without any
//! disambiguation.

use std::process::Command;
use tracing::{debug, trace};
use witr_core::config::DiscoverSettings;
use witr_core::{Result, WitrError, TOOL_NAME};

const PS_PROGRAM: &str = "ps";
const PS_ARGS: [&str; 2] = ["-axo", "pid=,comm=,args="];

/// One row of the process listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedProcess {
    pub pid: u32,
    pub command: String,
    /// Argument vector joined by single spaces
    pub args: String,
}

/// Discovery with its exclusion rules
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Lower-cased search-utility names
    search_tools: Vec<String>,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::from_settings(&DiscoverSettings::default())
    }
}

impl Discovery {
    pub fn new<I, S>(search_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            search_tools: search_tools
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn from_settings(settings: &DiscoverSettings) -> Self {
        Self::new(&settings.search_tools)
    }

    /// Find all PIDs matching `pattern`, excluding this process and its parent.
    ///
    /// # Errors
    ///
    /// `WitrError::Validation` for a blank pattern, `WitrError::Io` if the
    /// process table cannot be listed.
    pub fn discover(&self, pattern: &str) -> Result<Vec<u32>> {
        validate_pattern(pattern)?;

        let listing = list_processes()?;
        let excluded = [std::process::id(), std::os::unix::process::parent_id()];
        let pids = self.matching_pids(&listing, pattern, &excluded);
        debug!(pattern, scanned = listing.len(), matched = pids.len(), "discovery finished");
        Ok(pids)
    }

    /// Apply the matching rules to an already listed process table.
    ///
    /// `excluded` PIDs (normally self and parent) never match.
    pub fn matching_pids(
        &self,
        listing: &[ListedProcess],
        pattern: &str,
        excluded: &[u32],
    ) -> Vec<u32> {
        let pattern = pattern.to_lowercase();

        listing
            .iter()
            .filter(|p| !excluded.contains(&p.pid))
            .filter(|p| self.is_match(p, &pattern))
            .map(|p| p.pid)
            .collect()
    }

    fn is_match(&self, process: &ListedProcess, pattern: &str) -> bool {
        let command = process.command.to_lowercase();
        if command.contains(pattern) && !self.is_search_tool(&command) && command != TOOL_NAME {
            return true;
        }

        let args = process.args.to_lowercase();
        args.contains(pattern) && !self.is_search_tool(&args) && !has_tool_token(&args)
    }

    fn is_search_tool(&self, text: &str) -> bool {
        self.search_tools.iter().any(|t| text.contains(t.as_str()))
    }
}

/// Find all PIDs matching `pattern` with the default exclusion rules
pub fn discover(pattern: &str) -> Result<Vec<u32>> {
    Discovery::default().discover(pattern)
}

fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(WitrError::Validation(
            "pattern cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// The tool's own name as a space-bounded token, so `twitter-daemon` is
/// not mistaken for a self invocation.
fn has_tool_token(args: &str) -> bool {
    args.contains(&format!(" {TOOL_NAME} "))
        || args.ends_with(&format!(" {TOOL_NAME}"))
        || args.starts_with(&format!("{TOOL_NAME} "))
}

fn list_processes() -> Result<Vec<ListedProcess>> {
    list_processes_with(PS_PROGRAM)
}

/// Run `program` with `ps` arguments and parse its listing.
///
/// A spawn failure or a non-success exit is an `Io` error.
fn list_processes_with(program: &str) -> Result<Vec<ListedProcess>> {
    let output = Command::new(program)
        .args(PS_ARGS)
        .output()
        .map_err(|e| WitrError::io("list processes", e))?;

    if !output.status.success() {
        return Err(WitrError::io(
            "list processes",
            std::io::Error::other(format!("ps exited with {}", output.status)),
        ));
    }

    let listing = parse_ps_output(&String::from_utf8_lossy(&output.stdout));
    trace!("Process table listed: {} entries", listing.len());
    Ok(listing)
}

/// Parse `ps -axo pid=,comm=,args=` output, skipping rows that do not start
/// with a numeric PID followed by a command name.
pub fn parse_ps_output(output: &str) -> Vec<ListedProcess> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let command = fields.next()?.to_string();
            let args = fields.collect::<Vec<_>>().join(" ");
            Some(ListedProcess { pid, command, args })
        })
        .collect()
}
