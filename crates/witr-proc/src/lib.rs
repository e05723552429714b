//! Process context resolution from the Linux /proc filesystem
//!
//! - [`discover`]: pattern search over the live process table
//! - [`Enricher`]: PID to fully populated [`witr_core::Process`]
//! - [`SocketTable`]: listening socket inode map, built once per batch
//! - [`ancestry`]: parent chain of an enriched process

pub mod ancestry;
pub mod discover;
pub mod enrich;
pub mod git;
pub mod procfs;
pub mod service;
pub mod sockets;
pub mod stat;

pub use ancestry::ancestry;
pub use discover::{discover, Discovery, ListedProcess};
pub use enrich::{EnrichOptions, Enricher};
pub use git::GitContext;
pub use procfs::ProcFs;
pub use sockets::SocketTable;
pub use stat::{parse_stat, StatRecord};
