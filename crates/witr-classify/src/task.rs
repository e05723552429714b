//! Command line to task label
//!
//! Heuristics run in a fixed order and the first one producing a label
//! wins:
//!
//! 1. `npm run <script>`
//! 2. `yarn <script>` (not install/add/remove/upgrade)
//! 3. `pnpm run <script>`
//! 4. `pnpm <script>` (not install/add/remove/update)
//! 5. `npx <package>[@version]`
//! 6. a `package.json` script whose executable appears in the command line
//! 7. the entry file passed to `node`
//!
//! When nothing matches the label is `"-"`.

use crate::manifest::PackageManifest;
use std::path::Path;
use tracing::{debug, trace};
use witr_core::config::ClassifySettings;
use witr_core::UNKNOWN_TASK;

const YARN_VERBS: &[&str] = &["install", "add", "remove", "upgrade"];
const PNPM_VERBS: &[&str] = &["install", "add", "remove", "update"];

/// Node flags that consume the following argument
const NODE_FLAGS_WITH_VALUE: &[&str] = &[
    "-r",
    "--require",
    "-e",
    "--eval",
    "-p",
    "--print",
    "-c",
    "--check",
    "--import",
    "--experimental-loader",
    "--loader",
    "--input-type",
    "--conditions",
    "-C",
];

/// What a heuristic gets to look at
struct TaskInput<'a> {
    cmdline: &'a str,
    working_dir: Option<&'a Path>,
    manifest_file: &'a str,
}

type Heuristic = fn(&TaskInput<'_>) -> Option<String>;

const HEURISTICS: &[(&str, Heuristic)] = &[
    ("npm-run", npm_run),
    ("yarn", yarn),
    ("pnpm-run", pnpm_run),
    ("pnpm", pnpm),
    ("npx", npx),
    ("manifest", manifest_script),
    ("node-entry", node_entry),
];

/// Classifies command lines into task labels
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    manifest_file: String,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::from_settings(&ClassifySettings::default())
    }
}

impl TaskClassifier {
    pub fn from_settings(settings: &ClassifySettings) -> Self {
        Self {
            manifest_file: settings.manifest_file.clone(),
        }
    }

    /// Label for `cmdline`; never fails, `"-"` when nothing matches
    pub fn classify(&self, cmdline: &str, working_dir: Option<&Path>) -> String {
        let input = TaskInput {
            cmdline,
            working_dir,
            manifest_file: &self.manifest_file,
        };

        for (name, heuristic) in HEURISTICS {
            if let Some(label) = heuristic(&input) {
                trace!(heuristic = name, label = %label, "classified task");
                return label;
            }
        }
        UNKNOWN_TASK.to_string()
    }
}

/// Classify with the default manifest file name
pub fn classify(cmdline: &str, working_dir: Option<&Path>) -> String {
    TaskClassifier::default().classify(cmdline, working_dir)
}

/// First whitespace-delimited token after the first occurrence of `marker`
fn token_after<'a>(cmdline: &'a str, marker: &str) -> Option<&'a str> {
    let idx = cmdline.find(marker)?;
    cmdline[idx + marker.len()..].split_whitespace().next()
}

fn npm_run(input: &TaskInput<'_>) -> Option<String> {
    token_after(input.cmdline, "npm run ").map(str::to_string)
}

fn yarn(input: &TaskInput<'_>) -> Option<String> {
    token_after(input.cmdline, "yarn ")
        .filter(|script| !YARN_VERBS.contains(script))
        .map(|script| format!("yarn:{script}"))
}

fn pnpm_run(input: &TaskInput<'_>) -> Option<String> {
    token_after(input.cmdline, "pnpm run ").map(str::to_string)
}

fn pnpm(input: &TaskInput<'_>) -> Option<String> {
    token_after(input.cmdline, "pnpm ")
        .filter(|script| !PNPM_VERBS.contains(script))
        .map(|script| format!("pnpm:{script}"))
}

fn npx(input: &TaskInput<'_>) -> Option<String> {
    let package = token_after(input.cmdline, "npx ")?;
    // tsx@latest -> tsx, but keep scoped names like @scope/pkg
    let package = match package.find('@') {
        Some(at) if at > 0 => &package[..at],
        _ => package,
    };
    Some(format!("npx:{package}"))
}

fn manifest_script(input: &TaskInput<'_>) -> Option<String> {
    let path = input.working_dir?.join(input.manifest_file);
    let manifest = match PackageManifest::from_path(&path) {
        Ok(m) => m,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no usable manifest");
            return None;
        }
    };
    manifest.script_for(input.cmdline).map(str::to_string)
}

fn node_entry(input: &TaskInput<'_>) -> Option<String> {
    // last occurrence, so an interpreter path like /usr/bin/node is skipped
    let idx = input.cmdline.rfind("node ")?;
    let rest = &input.cmdline[idx + "node ".len()..];

    let mut skip_next = false;
    let mut entry = None;
    for part in rest.split_whitespace() {
        if skip_next {
            skip_next = false;
            continue;
        }
        if part.starts_with('-') {
            skip_next = !part.contains('=') && NODE_FLAGS_WITH_VALUE.contains(&part);
            continue;
        }
        entry = Some(part);
        break;
    }

    let entry = entry?;
    let mut file = if Path::new(entry).is_absolute() {
        Path::new(entry)
            .file_name()
            .map_or_else(|| entry.to_string(), |n| n.to_string_lossy().into_owned())
    } else {
        entry.to_string()
    };

    if let Some(dir) = input.working_dir {
        let prefix = format!("{}/", dir.display());
        if let Some(stripped) = file.strip_prefix(&prefix) {
            file = stripped.to_string();
        }
    }

    (!file.is_empty()).then_some(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn label(cmdline: &str) -> String {
        classify(cmdline, None)
    }

    #[test]
    fn test_npm_run() {
        assert_eq!(label("npm run dev"), "dev");
        assert_eq!(label("node /usr/lib/node_modules/npm/bin/npm-cli.js npm run test:watch"), "test:watch");
    }

    #[test]
    fn test_yarn() {
        assert_eq!(label("yarn start"), "yarn:start");
        assert_eq!(label("yarn install"), "-");
        assert_eq!(label("yarn add react"), "-");
        assert_eq!(label("yarn upgrade"), "-");
    }

    #[test]
    fn test_pnpm() {
        assert_eq!(label("pnpm run build"), "build");
        assert_eq!(label("pnpm dev"), "pnpm:dev");
        assert_eq!(label("pnpm update"), "-");
        assert_eq!(label("pnpm install"), "-");
    }

    #[test]
    fn test_npx() {
        assert_eq!(label("npx tsx@latest script.ts"), "npx:tsx");
        assert_eq!(label("npx prisma studio"), "npx:prisma");
        assert_eq!(label("npx @scope/tool run"), "npx:@scope/tool");
    }

    #[test]
    fn test_excluded_verb_falls_through() {
        // yarn install is not a script, but the node entry still is
        assert_eq!(
            label("node /usr/share/yarn/bin/yarn.js yarn install"),
            "yarn.js"
        );
    }

    #[test]
    fn test_node_entry() {
        assert_eq!(label("node server.js"), "server.js");
        assert_eq!(label("node dist/index.js"), "dist/index.js");
        assert_eq!(label("/usr/local/bin/node /srv/app/main.js"), "main.js");
        assert_eq!(label("node -r dotenv/config server.js"), "server.js");
        assert_eq!(label("node --require=dotenv/config app.js"), "app.js");
        assert_eq!(label("node --inspect --loader ts-node/esm src/index.ts"), "src/index.ts");
        assert_eq!(label("node --max-old-space-size=4096 worker.js"), "worker.js");
    }

    #[test]
    fn test_node_entry_with_working_dir() {
        let dir = Path::new("/app");
        assert_eq!(classify("node dist/index.js", Some(dir)), "dist/index.js");
        assert_eq!(classify("node /app/dist/index.js", Some(dir)), "index.js");
    }

    #[test]
    fn test_node_without_entry() {
        assert_eq!(label("node --inspect"), "-");
        assert_eq!(label("node -e"), "-");
    }

    #[test]
    fn test_unknown() {
        assert_eq!(label("postgres -D /var/lib/postgresql"), "-");
        assert_eq!(label(""), "-");
    }

    #[test]
    fn test_manifest_lookup() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"name": "web", "scripts": {"dev": "vite --port 3000"}}"#,
        )
        .unwrap();

        assert_eq!(classify("/usr/bin/vite --port 3000", Some(dir.path())), "dev");
        assert_eq!(classify("invite --port 3000", Some(dir.path())), "-");
        // without a working directory the manifest is never consulted
        assert_eq!(classify("/usr/bin/vite --port 3000", None), "-");
    }

    #[test]
    fn test_cli_markers_win_over_manifest() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"scripts": {"serve": "npm run dev"}}"#,
        )
        .unwrap();
        assert_eq!(classify("npm run dev", Some(dir.path())), "dev");
    }

    #[test]
    fn test_custom_manifest_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("manifest.json"),
            r#"{"scripts": {"worker": "bull-worker --queue emails"}}"#,
        )
        .unwrap();

        let classifier = TaskClassifier::from_settings(&ClassifySettings {
            manifest_file: "manifest.json".to_string(),
        });
        assert_eq!(classifier.classify("bull-worker --queue emails", Some(dir.path())), "worker");
        assert_eq!(classify("bull-worker --queue emails", Some(dir.path())), "-");
    }

    #[test]
    fn test_broken_manifest_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), "{ broken").unwrap();
        assert_eq!(classify("node app.js", Some(dir.path())), "app.js");
    }
}
