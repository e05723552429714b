//! Listening socket table and socket-to-process mapping
//!
//! The table maps kernel socket inodes to the address and port they are
//! bound to, read from `/proc/net/tcp` and `/proc/net/tcp6`. A process's
//! sockets are found by scanning `/proc/<pid>/fd/*` for `socket:[inode]`
//! links.

use crate::procfs::ProcFs;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::{debug, trace};
use witr_core::SocketEntry;

/// TCP_LISTEN as printed in the `st` column
const TCP_LISTEN: &str = "0A";

/// Point-in-time map from socket inode to listening address.
///
/// Built once per batch and shared read-only between enrichments.
#[derive(Debug, Clone, Default)]
pub struct SocketTable {
    by_inode: HashMap<u64, SocketEntry>,
}

impl SocketTable {
    /// Read the listening TCP sockets under `procfs`.
    ///
    /// Missing or unreadable tables contribute nothing.
    pub fn read(procfs: &ProcFs) -> Self {
        let mut table = Self::default();
        for (name, ipv6) in [("tcp", false), ("tcp6", true)] {
            let path = procfs.net_path(name);
            match fs::read_to_string(&path) {
                Ok(content) => table.by_inode.extend(parse_net_tcp(&content, ipv6)),
                Err(e) => debug!(path = %path.display(), error = %e, "skipping socket table"),
            }
        }
        trace!("Socket table read: {} listening entries", table.by_inode.len());
        table
    }

    pub fn get(&self, inode: u64) -> Option<&SocketEntry> {
        self.by_inode.get(&inode)
    }

    pub fn len(&self) -> usize {
        self.by_inode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_inode.is_empty()
    }

    /// Listening entries for the given inodes, in inode order
    pub fn listening_for(&self, inodes: &[u64]) -> Vec<SocketEntry> {
        inodes
            .iter()
            .filter_map(|inode| self.get(*inode).cloned())
            .collect()
    }

    /// Listening entries owned by `pid`
    pub fn listening_for_pid(&self, procfs: &ProcFs, pid: u32) -> Vec<SocketEntry> {
        self.listening_for(&socket_inodes(procfs, pid))
    }
}

impl FromIterator<(u64, SocketEntry)> for SocketTable {
    fn from_iter<I: IntoIterator<Item = (u64, SocketEntry)>>(iter: I) -> Self {
        Self {
            by_inode: iter.into_iter().collect(),
        }
    }
}

/// Socket inodes held open by `pid`, ordered by fd number and deduplicated.
///
/// Returns an empty list when the fd directory is unreadable.
pub fn socket_inodes(procfs: &ProcFs, pid: u32) -> Vec<u64> {
    let fd_dir = procfs.pid_path(pid, "fd");
    let entries = match fs::read_dir(&fd_dir) {
        Ok(d) => d,
        Err(e) => {
            debug!(pid, error = %e, "cannot read fd directory");
            return Vec::new();
        }
    };

    let mut by_fd: Vec<(u32, u64)> = entries
        .flatten()
        .filter_map(|entry| {
            let fd = entry.file_name().to_string_lossy().parse().ok()?;
            let target = fs::read_link(entry.path()).ok()?;
            let inode = parse_socket_link(&target.to_string_lossy())?;
            Some((fd, inode))
        })
        .collect();
    by_fd.sort_unstable_by_key(|(fd, _)| *fd);

    let mut seen = HashSet::new();
    by_fd
        .into_iter()
        .map(|(_, inode)| inode)
        .filter(|inode| seen.insert(*inode))
        .collect()
}

/// `socket:[12345]` -> 12345
fn parse_socket_link(target: &str) -> Option<u64> {
    target
        .strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// Parse the listening rows of a `/proc/net/tcp` or `/proc/net/tcp6` table.
///
/// Format: `sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...`
pub fn parse_net_tcp(content: &str, ipv6: bool) -> Vec<(u64, SocketEntry)> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| parse_tcp_line(line, ipv6))
        .collect()
}

fn parse_tcp_line(line: &str, ipv6: bool) -> Option<(u64, SocketEntry)> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 10 || parts[3] != TCP_LISTEN {
        return None;
    }

    let (addr_hex, port_hex) = parts[1].split_once(':')?;
    let address = if ipv6 {
        parse_hex_ipv6(addr_hex)?.to_string()
    } else {
        parse_hex_ipv4(addr_hex)?.to_string()
    };
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    let inode: u64 = parts[9].parse().ok()?;

    Some((inode, SocketEntry { port, address }))
}

/// The kernel prints the raw network-order word as a native-endian integer,
/// so the native byte representation is the address.
fn parse_hex_ipv4(hex: &str) -> Option<Ipv4Addr> {
    if hex.len() != 8 {
        return None;
    }
    let word = u32::from_str_radix(hex, 16).ok()?;
    Some(Ipv4Addr::from(word.to_ne_bytes()))
}

fn parse_hex_ipv6(hex: &str) -> Option<Ipv6Addr> {
    if hex.len() != 32 {
        return None;
    }
    let mut octets = [0u8; 16];
    for (i, chunk) in octets.chunks_mut(4).enumerate() {
        let word = u32::from_str_radix(&hex[i * 8..i * 8 + 8], 16).ok()?;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    Some(Ipv6Addr::from(octets))
}
