//! witr core - process context types, errors and configuration
//!
//! This crate holds the pieces shared by every witr component:
//!
//! - **Process**: the point-in-time context record for one observed process
//! - **Errors**: the engine's error taxonomy (validation, IO, parse)
//! - **Config**: TOML configuration discovery, env overrides and validation

pub mod config;
pub mod error;
pub mod process;

pub use config::{ConfigLoader, WitrConfig};
pub use error::{Result, WitrError};
pub use process::{Ancestry, Container, Process, SocketEntry};

/// Name of the tool, used to keep discovery from matching its own invocations
pub const TOOL_NAME: &str = "witr";

/// Label returned by the task classifier when nothing matches
pub const UNKNOWN_TASK: &str = "-";

/// Working directory value used when the cwd link cannot be resolved
pub const UNKNOWN_DIR: &str = "unknown";
