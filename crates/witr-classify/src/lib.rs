//! Task classification for witr
//!
//! Turns a command line (and optionally its working directory) into a short
//! label describing what the process is doing, e.g. the npm script it runs.

pub mod manifest;
pub mod task;

pub use manifest::{ManifestError, PackageManifest};
pub use task::{classify, TaskClassifier};
