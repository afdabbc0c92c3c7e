//! Project-manifest reference resolution.
//!
//! A `project:` specifier points at a project manifest. Only the manifest's
//! own direct package and framework references are considered; there is no
//! transitive project graph. Each reference is re-resolved through the
//! package/framework strategies.
//!
//! # Manifest format
//!
//! ```text
//! frameworks = ["base"]
//!
//! [dependencies]
//! leftpad = "1.2.0"
//! widgets = { version = "0.3.1" }
//! ```

use std::fs;
use std::path::Path;

use semver::Version;

use crate::error::{Error, Result};

use super::parse_version;

/// A direct dependency read from a project manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestDependency {
    pub id: String,
    pub version: Option<Version>,
}

/// Direct references declared by a project manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectReferences {
    pub packages: Vec<ManifestDependency>,
    pub frameworks: Vec<String>,
}

/// Read and parse a project manifest from disk.
pub fn read_manifest(path: &Path) -> Result<ProjectReferences> {
    let text = fs::read_to_string(path).map_err(|e| {
        Error::Resolution(format!("cannot read project manifest {}: {e}", path.display()))
    })?;
    Ok(parse_manifest(&text))
}

/// Parse a manifest's direct references.
pub fn parse_manifest(text: &str) -> ProjectReferences {
    ProjectReferences {
        packages: parse_dependencies_section(text),
        frameworks: parse_frameworks_list(text),
    }
}

/// Extract `name = "version"` / `name = { version = "..." }` entries from the
/// `[dependencies]` section.
pub(crate) fn parse_dependencies_section(text: &str) -> Vec<ManifestDependency> {
    let mut deps = Vec::new();
    let mut in_dependencies = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.starts_with('[') {
            in_dependencies = line == "[dependencies]";
            continue;
        }
        if !in_dependencies {
            continue;
        }

        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.is_empty() {
            continue;
        }

        let version = if let Some(quoted) = value.strip_prefix('"') {
            // Simple form: name = "1.0.0"
            parse_version(quoted.trim_end_matches('"'))
        } else if value.starts_with('{') {
            // Table form: name = { version = "1.0.0", ... }
            parse_table_version(value)
        } else {
            continue;
        };

        deps.push(ManifestDependency {
            id: name.to_string(),
            version,
        });
    }

    deps
}

/// Extract a top-level `frameworks = ["a", "b"]` list.
pub(crate) fn parse_frameworks_list(text: &str) -> Vec<String> {
    let mut in_section = false;
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_section = true;
            continue;
        }
        if in_section {
            continue;
        }
        if let Some(value) = line.strip_prefix("frameworks") {
            let value = value.trim_start();
            if let Some(value) = value.strip_prefix('=') {
                let arr = value.trim().trim_start_matches('[').trim_end_matches(']');
                return arr
                    .split(',')
                    .map(|s| s.trim().trim_matches('"').to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
    }
    Vec::new()
}

/// Parse the `version` key of an inline-table dependency.
fn parse_table_version(value: &str) -> Option<Version> {
    let content = value.trim_start_matches('{').trim_end_matches('}');
    for part in content.split(',') {
        let part = part.trim();
        if let Some((key, val)) = part.split_once('=') {
            if key.trim() == "version" {
                return parse_version(val.trim().trim_matches('"'));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
# sample project manifest
frameworks = ["base", "web"]

[dependencies]
leftpad = "1.2.0"
widgets = { version = "0.3.1", features = ["svg"] }
unpinned = { path = "../local" }

[dev-dependencies]
harness = "9.9.9"
"#;

    #[test]
    fn parses_direct_dependencies_only() {
        let refs = parse_manifest(MANIFEST);
        assert_eq!(refs.packages.len(), 3);
        assert_eq!(refs.packages[0].id, "leftpad");
        assert_eq!(
            refs.packages[0].version,
            Some(Version::new(1, 2, 0))
        );
        assert_eq!(
            refs.packages[1].version,
            Some(Version::new(0, 3, 1))
        );
        // No version key in the table form means unpinned.
        assert_eq!(refs.packages[2].version, None);
        // dev-dependencies are not direct references.
        assert!(!refs.packages.iter().any(|d| d.id == "harness"));
    }

    #[test]
    fn parses_frameworks_list() {
        let refs = parse_manifest(MANIFEST);
        assert_eq!(refs.frameworks, vec!["base", "web"]);
    }

    #[test]
    fn missing_sections_yield_empty_references() {
        let refs = parse_manifest("just_a_key = true\n");
        assert!(refs.packages.is_empty());
        assert!(refs.frameworks.is_empty());
    }

    #[test]
    fn short_versions_are_padded() {
        let refs = parse_manifest("[dependencies]\nfoo = \"1.2\"\n");
        assert_eq!(refs.packages[0].version, Some(Version::new(1, 2, 0)));
    }
}
