//! Process context record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered chain of processes, oldest ancestor first and the target last
pub type Ancestry = Vec<Process>;

/// A point-in-time snapshot of one observed process.
///
/// Optional fields are `None` when the corresponding probe found nothing or
/// failed; the record is never partially built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub pid: u32,

    /// Parent PID, 0 when there is none
    pub ppid: u32,

    /// Short executable name (comm)
    pub command: String,

    /// Full command line, NUL separators replaced by spaces
    #[serde(default)]
    pub cmdline: String,

    /// Executable path
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<String>,

    /// Boot time plus elapsed scheduler ticks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Owning user name (or numeric uid when it has no name)
    pub user: String,

    /// Current working directory, `"unknown"` if the link is unreadable
    pub working_dir: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    /// Init-system unit name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Listening sockets in the order their inodes were found
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub listening: Vec<SocketEntry>,
}

impl Process {
    pub fn listening_ports(&self) -> Vec<u16> {
        self.listening.iter().map(|s| s.port).collect()
    }

    /// Bind addresses, index-aligned with [`Process::listening_ports`]
    pub fn bind_addresses(&self) -> Vec<&str> {
        self.listening.iter().map(|s| s.address.as_str()).collect()
    }

    pub fn has_working_dir(&self) -> bool {
        self.working_dir != crate::UNKNOWN_DIR && !self.working_dir.is_empty()
    }
}

/// A listening socket owned by a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketEntry {
    pub port: u16,
    pub address: String,
}

impl fmt::Display for SocketEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// Container runtime a process belongs to, detected from its cgroup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Container {
    Docker,
    Containerd,
    Kubernetes,
}

impl Container {
    /// Classify cgroup membership text. Checked in priority order
    /// docker, containerd, kubepods.
    pub fn from_cgroup(cgroup: &str) -> Option<Self> {
        if cgroup.contains("docker") {
            Some(Self::Docker)
        } else if cgroup.contains("containerd") {
            Some(Self::Containerd)
        } else if cgroup.contains("kubepods") {
            Some(Self::Kubernetes)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Containerd => "containerd",
            Self::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Process {
        Process {
            pid: 4242,
            ppid: 1,
            command: "node".to_string(),
            cmdline: "node server.js".to_string(),
            exe: None,
            started_at: None,
            user: "app".to_string(),
            working_dir: "/srv/app".to_string(),
            git_repo: None,
            git_branch: None,
            container: None,
            service: None,
            listening: vec![
                SocketEntry {
                    port: 3000,
                    address: "0.0.0.0".to_string(),
                },
                SocketEntry {
                    port: 9229,
                    address: "::1".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_ports_and_addresses_are_aligned() {
        let p = sample();
        assert_eq!(p.listening_ports(), vec![3000, 9229]);
        assert_eq!(p.bind_addresses(), vec!["0.0.0.0", "::1"]);
        assert_eq!(p.listening_ports().len(), p.bind_addresses().len());
    }

    #[test]
    fn test_container_priority() {
        assert_eq!(
            Container::from_cgroup("0::/system.slice/docker-abc.scope"),
            Some(Container::Docker)
        );
        // docker wins even when containerd is also present
        assert_eq!(
            Container::from_cgroup("0::/docker/containerd/x"),
            Some(Container::Docker)
        );
        assert_eq!(
            Container::from_cgroup("0::/system.slice/containerd.service"),
            Some(Container::Containerd)
        );
        assert_eq!(
            Container::from_cgroup("0::/kubepods/besteffort/pod1"),
            Some(Container::Kubernetes)
        );
        assert_eq!(Container::from_cgroup("0::/user.slice/session-2.scope"), None);
    }

    #[test]
    fn test_socket_display() {
        let p = sample();
        assert_eq!(p.listening[0].to_string(), "0.0.0.0:3000");
        assert_eq!(p.listening[1].to_string(), "[::1]:9229");
    }

    #[test]
    fn test_json_omits_absent_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["pid"], 4242);
        assert!(json.get("git_repo").is_none());
        assert!(json.get("container").is_none());
        assert_eq!(json["listening"][0]["port"], 3000);
    }

    #[test]
    fn test_unknown_working_dir() {
        let mut p = sample();
        assert!(p.has_working_dir());
        p.working_dir = crate::UNKNOWN_DIR.to_string();
        assert!(!p.has_working_dir());
    }
}
