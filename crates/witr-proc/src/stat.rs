//! Parser for the `/proc/<pid>/stat` record
//!
//! Format: `pid (comm) state ppid pgrp session ... starttime ...`
//! The comm can contain spaces and parens, so it is bounded by the first `(`
//! and the last `)`.

use witr_core::{Result, WitrError};

/// Fields of a stat record the enricher uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    pub command: String,
    pub ppid: u32,
    /// Start time in clock ticks after boot
    pub start_ticks: u64,
}

/// Index of ppid among the fields after the comm (1-indexed: 2nd)
const PPID_FIELD: usize = 1;
/// Index of starttime among the fields after the comm (1-indexed: 20th)
const START_TICKS_FIELD: usize = 19;

/// Parse raw stat text.
///
/// Returns `WitrError::Parse` when either delimiter of the comm is missing.
pub fn parse_stat(raw: &str) -> Result<StatRecord> {
    let open = raw
        .find('(')
        .ok_or_else(|| WitrError::parse("stat record", "missing '('"))?;
    let close = raw
        .rfind(')')
        .ok_or_else(|| WitrError::parse("stat record", "missing ')'"))?;
    if close < open {
        return Err(WitrError::parse("stat record", "')' precedes '('"));
    }

    let command = raw[open + 1..close].to_string();
    let fields: Vec<&str> = raw[close + 1..].split_whitespace().collect();

    let ppid = fields
        .get(PPID_FIELD)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let start_ticks = fields
        .get(START_TICKS_FIELD)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    Ok(StatRecord {
        command,
        ppid,
        start_ticks,
    })
}
