//! Project manifest (`package.json`) reading

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The parts of a package manifest the classifier uses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: String,

    /// Script name to command, iterated in name order
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn from_path(path: &Path) -> Result<Self, ManifestError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(data)?)
    }

    /// First script whose main executable appears as a word in `cmdline`
    pub fn script_for(&self, cmdline: &str) -> Option<&str> {
        let cmdline = cmdline.to_lowercase();
        self.scripts
            .iter()
            .find(|(_, command)| {
                command
                    .split_whitespace()
                    .next()
                    .is_some_and(|exe| contains_word(&cmdline, &exe.to_lowercase()))
            })
            .map(|(name, _)| name.as_str())
    }
}

/// `word` bounded by a space or `/` before it and a space or the end after
/// it, or at the very start of `text`, or equal to it.
fn contains_word(text: &str, word: &str) -> bool {
    text.contains(&format!(" {word} "))
        || text.ends_with(&format!(" {word}"))
        || text.contains(&format!("/{word} "))
        || text.ends_with(&format!("/{word}"))
        || text.starts_with(&format!("{word} "))
        || text == word
}
