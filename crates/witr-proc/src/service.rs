//! Init-system unit lookup via `systemctl status <pid>`

use std::process::Command;
use tracing::debug;

/// Ask systemd which unit owns `pid`.
///
/// Any failure (no systemctl, non-zero exit, no loaded unit) yields `None`.
pub fn lookup_service(pid: u32) -> Option<String> {
    let output = match Command::new("systemctl")
        .arg("status")
        .arg(pid.to_string())
        .output()
    {
        Ok(o) => o,
        Err(e) => {
            debug!(pid, error = %e, "systemctl unavailable");
            return None;
        }
    };
    if !output.status.success() {
        debug!(pid, status = %output.status, "systemctl status failed");
        return None;
    }

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    parse_systemctl_status(&text)
}

/// Extract the `.service` unit from `systemctl status` output.
///
/// Requires `Loaded: loaded` somewhere in the output. The unit is taken from
/// the description line (`● nginx.service - ...`), falling back to the unit
/// file named on the `Loaded:` line.
pub fn parse_systemctl_status(output: &str) -> Option<String> {
    if !output.contains("Loaded: loaded") {
        return None;
    }

    let description = output.lines().map(str::trim).find(|l| !l.is_empty());
    let loaded = output
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with("Loaded:"));

    description
        .into_iter()
        .chain(loaded)
        .find_map(service_token)
}

fn service_token(line: &str) -> Option<String> {
    line.split_whitespace()
        .map(|token| token.trim_matches(|c| matches!(c, '(' | ')' | ';' | ',')))
        .filter(|token| token.ends_with(".service"))
        .filter_map(|token| token.rsplit('/').next())
        .find(|unit| unit.len() > ".service".len())
        .map(str::to_string)
}
