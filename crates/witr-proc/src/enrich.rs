//! Context enrichment: PID to [`Process`]
//!
//! Each probe reads one source and returns a value or its documented
//! default. Only the stat record is required; everything else degrades.

use crate::git::find_git_context;
use crate::procfs::ProcFs;
use crate::service::lookup_service;
use crate::sockets::SocketTable;
use crate::stat::parse_stat;
use chrono::{DateTime, Duration, Utc};
use std::fs;
use std::path::Path;
use tracing::{debug, trace};
use witr_core::config::EnrichSettings;
use witr_core::{Container, Process, Result, WitrError, UNKNOWN_DIR};

/// Fallback when the scheduler tick rate cannot be queried
const DEFAULT_TICKS_PER_SECOND: u64 = 100;

/// Which optional, slower probes to run
#[derive(Debug, Clone, Copy)]
pub struct EnrichOptions {
    pub service_lookup: bool,
    pub git_lookup: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            service_lookup: true,
            git_lookup: true,
        }
    }
}

/// Builds [`Process`] records from a proc filesystem.
///
/// Holds no per-process state, so one instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct Enricher {
    procfs: ProcFs,
    options: EnrichOptions,
    boot_time: Option<DateTime<Utc>>,
    ticks_per_second: u64,
}

impl Enricher {
    pub fn new(procfs: ProcFs, options: EnrichOptions) -> Self {
        let boot_time = procfs.boot_time();
        Self {
            procfs,
            options,
            boot_time,
            ticks_per_second: ticks_per_second(),
        }
    }

    pub fn from_settings(settings: &EnrichSettings) -> Self {
        Self::new(
            ProcFs::new(&settings.proc_root),
            EnrichOptions {
                service_lookup: settings.service_lookup,
                git_lookup: settings.git_lookup,
            },
        )
    }

    /// Same proc root and clock, different probe selection
    pub fn with_options(&self, options: EnrichOptions) -> Self {
        Self {
            options,
            ..self.clone()
        }
    }

    pub fn procfs(&self) -> &ProcFs {
        &self.procfs
    }

    /// Fresh listening socket table for a batch of enrichments
    pub fn socket_table(&self) -> SocketTable {
        SocketTable::read(&self.procfs)
    }

    /// Enrich one PID.
    ///
    /// # Errors
    ///
    /// `WitrError::Io` if the stat record cannot be read (not-found means the
    /// process is gone), `WitrError::Parse` if it is malformed.
    pub fn enrich(&self, pid: u32, sockets: &SocketTable) -> Result<Process> {
        let stat_path = self.procfs.pid_path(pid, "stat");
        let raw = fs::read_to_string(&stat_path)
            .map_err(|e| WitrError::io(format!("read {}", stat_path.display()), e))?;
        let stat = parse_stat(&raw)?;

        let working_dir = self.working_dir(pid);
        let git = if self.options.git_lookup && working_dir != UNKNOWN_DIR {
            find_git_context(Path::new(&working_dir))
        } else {
            None
        };
        let service = if self.options.service_lookup {
            lookup_service(pid)
        } else {
            None
        };
        let listening = sockets.listening_for_pid(&self.procfs, pid);
        trace!(pid, sockets = listening.len(), "collected listening sockets");

        let (git_repo, git_branch) = match git {
            Some(ctx) => (Some(ctx.repo), ctx.branch),
            None => (None, None),
        };

        Ok(Process {
            pid,
            ppid: stat.ppid,
            command: stat.command,
            cmdline: self.cmdline(pid),
            exe: self.exe(pid),
            started_at: self.started_at(stat.start_ticks),
            user: self.user(pid),
            working_dir,
            git_repo,
            git_branch,
            container: self.container(pid),
            service,
            listening,
        })
    }

    fn working_dir(&self, pid: u32) -> String {
        match fs::read_link(self.procfs.pid_path(pid, "cwd")) {
            Ok(path) => path.to_string_lossy().into_owned(),
            Err(e) => {
                debug!(pid, error = %e, "cannot resolve working directory");
                UNKNOWN_DIR.to_string()
            }
        }
    }

    fn container(&self, pid: u32) -> Option<Container> {
        match fs::read_to_string(self.procfs.pid_path(pid, "cgroup")) {
            Ok(cgroup) => Container::from_cgroup(&cgroup),
            Err(e) => {
                debug!(pid, error = %e, "cannot read cgroup");
                None
            }
        }
    }

    fn exe(&self, pid: u32) -> Option<String> {
        let exe = fs::read_link(self.procfs.pid_path(pid, "exe")).ok()?;
        let exe = exe.to_string_lossy().into_owned();
        (!exe.ends_with(" (deleted)")).then_some(exe)
    }

    fn cmdline(&self, pid: u32) -> String {
        match fs::read(self.procfs.pid_path(pid, "cmdline")) {
            Ok(bytes) => normalize_cmdline(&bytes),
            Err(e) => {
                debug!(pid, error = %e, "cannot read cmdline");
                String::new()
            }
        }
    }

    fn user(&self, pid: u32) -> String {
        let uid = fs::read_to_string(self.procfs.pid_path(pid, "status"))
            .ok()
            .and_then(|status| parse_status_uid(&status));
        match uid {
            Some(uid) => user_name(uid).unwrap_or_else(|| uid.to_string()),
            None => {
                debug!(pid, "cannot determine owning uid");
                "unknown".to_string()
            }
        }
    }

    fn started_at(&self, start_ticks: u64) -> Option<DateTime<Utc>> {
        let boot = self.boot_time?;
        let offset = ticks_to_duration(start_ticks, self.ticks_per_second);
        let started = offset.and_then(|d| boot.checked_add_signed(d));
        if started.is_none() {
            debug!(start_ticks, "start time out of range");
        }
        started
    }
}

/// NUL-separated argv to a single space-joined, trimmed string
fn normalize_cmdline(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .replace('\0', " ")
        .trim()
        .to_string()
}

/// Real uid from the `Uid:` line of `/proc/<pid>/status`
fn parse_status_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|uid| uid.parse().ok())
}

/// `None` when the tick count does not fit a [`Duration`]
fn ticks_to_duration(ticks: u64, ticks_per_second: u64) -> Option<Duration> {
    let tps = ticks_per_second.max(1);
    let secs = i64::try_from(ticks / tps).ok()?;
    let nanos = u128::from(ticks % tps) * 1_000_000_000 / u128::from(tps);
    let nanos = i64::try_from(nanos).ok()?;
    Duration::try_seconds(secs)?.checked_add(&Duration::nanoseconds(nanos))
}

#[cfg(target_os = "linux")]
fn user_name(uid: u32) -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
        .ok()
        .flatten()
        .map(|u| u.name)
}

#[cfg(not(target_os = "linux"))]
fn user_name(_uid: u32) -> Option<String> {
    None
}

#[cfg(target_os = "linux")]
fn ticks_per_second() -> u64 {
    use nix::unistd::{sysconf, SysconfVar};

    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(tps)) if tps > 0 => tps as u64,
        _ => DEFAULT_TICKS_PER_SECOND,
    }
}

#[cfg(not(target_os = "linux"))]
fn ticks_per_second() -> u64 {
    DEFAULT_TICKS_PER_SECOND
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use std::path::PathBuf;

    /// Builder for a fake `/proc/<pid>` tree
    pub(crate) struct FakeProc {
        dir: PathBuf,
    }

    impl FakeProc {
        pub(crate) fn new(root: &Path, pid: u32, comm: &str, ppid: u32) -> Self {
            let dir = root.join(pid.to_string());
            fs::create_dir_all(dir.join("fd")).unwrap();
            let stat = format!(
                "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194560 100 0 0 0 5 2 0 0 20 0 1 0 250 1000 100"
            );
            fs::write(dir.join("stat"), stat).unwrap();
            Self { dir }
        }

        pub(crate) fn file(self, name: &str, content: &[u8]) -> Self {
            fs::write(self.dir.join(name), content).unwrap();
            self
        }

        pub(crate) fn link(self, name: &str, target: &Path) -> Self {
            symlink(target, self.dir.join(name)).unwrap();
            self
        }

        pub(crate) fn socket_fd(self, fd: u32, inode: u64) -> Self {
            symlink(format!("socket:[{inode}]"), self.dir.join("fd").join(fd.to_string()))
                .unwrap();
            self
        }
    }

    pub(crate) fn offline_enricher(root: &Path) -> Enricher {
        let mut enricher = Enricher::new(
            ProcFs::new(root),
            EnrichOptions {
                service_lookup: false,
                git_lookup: true,
            },
        );
        enricher.ticks_per_second = 100;
        enricher
    }

    #[test]
    fn test_enrich_full_record() {
        let root = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let repo = work.path().join("shop-api");
        fs::create_dir_all(repo.join(".git")).unwrap();
        fs::write(repo.join(".git").join("HEAD"), "ref: refs/heads/release\n").unwrap();
        let cwd = repo.join("server");
        fs::create_dir_all(&cwd).unwrap();

        fs::write(root.path().join("stat"), "cpu 0\nbtime 1700000000\n").unwrap();
        fs::create_dir_all(root.path().join("net")).unwrap();
        fs::write(
            root.path().join("net").join("tcp"),
            "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode\n   \
             0: 00000000:0BB8 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 5555 1\n",
        )
        .unwrap();

        FakeProc::new(root.path(), 4242, "node", 1)
            .file("cmdline", b"node\0server.js\0--port\03000\0")
            .file("cgroup", b"0::/system.slice/docker-0123abcd.scope\n")
            .file("status", b"Name:\tnode\nUid:\t0\t0\t0\t0\nGid:\t0\t0\t0\t0\n")
            .link("cwd", &cwd)
            .socket_fd(3, 9999)
            .socket_fd(21, 5555);

        let enricher = offline_enricher(root.path());
        let sockets = enricher.socket_table();
        let p = enricher.enrich(4242, &sockets).unwrap();

        assert_eq!(p.pid, 4242);
        assert_eq!(p.ppid, 1);
        assert_eq!(p.command, "node");
        assert_eq!(p.cmdline, "node server.js --port 3000");
        assert_eq!(p.working_dir, cwd.to_string_lossy());
        assert_eq!(p.git_repo.as_deref(), Some("shop-api"));
        assert_eq!(p.git_branch.as_deref(), Some("release"));
        assert_eq!(p.container, Some(Container::Docker));
        assert_eq!(p.service, None);
        assert_eq!(p.user, "root");
        // 250 ticks at 100/s after boot
        assert_eq!(p.started_at.unwrap().timestamp_millis(), 1_700_000_002_500);
        assert_eq!(p.listening_ports().len(), p.bind_addresses().len());
        #[cfg(target_endian = "little")]
        {
            assert_eq!(p.listening_ports(), vec![3000]);
            assert_eq!(p.bind_addresses(), vec!["0.0.0.0"]);
        }
    }

    #[test]
    fn test_missing_sources_use_defaults() {
        let root = tempfile::tempdir().unwrap();
        FakeProc::new(root.path(), 77, "sleep", 76);

        let enricher = offline_enricher(root.path());
        let p = enricher.enrich(77, &SocketTable::default()).unwrap();

        assert_eq!(p.command, "sleep");
        assert_eq!(p.ppid, 76);
        assert_eq!(p.cmdline, "");
        assert_eq!(p.exe, None);
        assert_eq!(p.working_dir, UNKNOWN_DIR);
        assert_eq!(p.user, "unknown");
        assert_eq!(p.container, None);
        assert_eq!(p.git_repo, None);
        assert_eq!(p.git_branch, None);
        assert!(p.started_at.is_none());
        assert!(p.listening.is_empty());
        assert!(p.bind_addresses().is_empty());
    }

    #[test]
    fn test_malformed_stat_is_parse_error() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("88");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stat"), "88 (broken S 1 88 88").unwrap();

        let err = offline_enricher(root.path())
            .enrich(88, &SocketTable::default())
            .unwrap_err();
        assert!(matches!(err, WitrError::Parse { .. }));
    }

    #[test]
    fn test_missing_process_is_no_such_process() {
        let root = tempfile::tempdir().unwrap();
        let err = offline_enricher(root.path())
            .enrich(31337, &SocketTable::default())
            .unwrap_err();
        assert!(err.is_no_such_process());
    }

    #[test]
    fn test_deleted_exe_is_dropped() {
        let root = tempfile::tempdir().unwrap();
        FakeProc::new(root.path(), 90, "app", 1).link("exe", Path::new("/opt/app/bin (deleted)"));
        FakeProc::new(root.path(), 91, "app", 1).link("exe", Path::new("/opt/app/bin"));

        let enricher = offline_enricher(root.path());
        let sockets = SocketTable::default();
        assert_eq!(enricher.enrich(90, &sockets).unwrap().exe, None);
        assert_eq!(
            enricher.enrich(91, &sockets).unwrap().exe.as_deref(),
            Some("/opt/app/bin")
        );
    }

    #[test]
    fn test_unknown_uid_falls_back_to_number() {
        let root = tempfile::tempdir().unwrap();
        FakeProc::new(root.path(), 92, "daemon", 1).file("status", b"Uid:\t3999999\t3999999\t3999999\t3999999\n");
        let p = offline_enricher(root.path())
            .enrich(92, &SocketTable::default())
            .unwrap();
        assert_eq!(p.user, "3999999");
    }

    #[test]
    fn test_normalize_cmdline() {
        assert_eq!(normalize_cmdline(b"npm\0run\0dev\0"), "npm run dev");
        assert_eq!(normalize_cmdline(b""), "");
    }

    #[test]
    fn test_parse_status_uid() {
        assert_eq!(parse_status_uid("Name:\tx\nUid:\t1000\t1001\t1000\t1000\n"), Some(1000));
        assert_eq!(parse_status_uid("Name:\tx\n"), None);
    }

    #[test]
    fn test_ticks_to_duration() {
        assert_eq!(ticks_to_duration(250, 100), Some(Duration::milliseconds(2500)));
        assert_eq!(ticks_to_duration(0, 100), Some(Duration::zero()));
        assert_eq!(ticks_to_duration(7, 0), Some(Duration::seconds(7)));
        assert_eq!(ticks_to_duration(u64::MAX, 1), None);
        assert_eq!(ticks_to_duration(u64::MAX, 100), None);
    }

    #[test]
    fn test_huge_start_ticks_leave_start_time_unset() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("stat"), "btime 1700000000\n").unwrap();
        let dir = root.path().join("5");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("stat"),
            "5 (spin) S 1 5 5 0 -1 4194560 100 0 0 0 5 2 0 0 20 0 1 0 18446744073709551615 1000 100",
        )
        .unwrap();

        let p = offline_enricher(root.path())
            .enrich(5, &SocketTable::default())
            .unwrap();
        assert_eq!(p.command, "spin");
        assert_eq!(p.ppid, 1);
        assert!(p.started_at.is_none());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_enrich_self() {
        let enricher = Enricher::new(
            ProcFs::default(),
            EnrichOptions {
                service_lookup: false,
                git_lookup: false,
            },
        );
        let sockets = enricher.socket_table();
        let p = enricher.enrich(std::process::id(), &sockets).unwrap();
        assert_eq!(p.pid, std::process::id());
        assert!(!p.command.is_empty());
        assert!(p.started_at.is_some());
        assert_ne!(p.working_dir, UNKNOWN_DIR);
    }
}
