//! Parent chain of an enriched process

use crate::enrich::Enricher;
use crate::sockets::SocketTable;
use std::collections::HashSet;
use tracing::debug;
use witr_core::{Ancestry, Process};

/// Build the chain from the oldest reachable ancestor down to `target`.
///
/// Stops at PID 0, at a PID already seen, or when a parent can no longer be
/// enriched (it exited between reads).
pub fn ancestry(enricher: &Enricher, sockets: &SocketTable, target: Process) -> Ancestry {
    let mut seen = HashSet::from([target.pid]);
    let mut parent = target.ppid;
    let mut chain = vec![target];

    while parent != 0 && seen.insert(parent) {
        match enricher.enrich(parent, sockets) {
            Ok(process) => {
                parent = process.ppid;
                chain.push(process);
            }
            Err(e) => {
                debug!(pid = parent, error = %e, "ancestry stopped");
                break;
            }
        }
    }

    chain.reverse();
    chain
}
