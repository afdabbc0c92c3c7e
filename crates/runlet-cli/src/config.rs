//! Configuration profile for default options.
//!
//! A profile is a flat TOML file at `<config dir>/runlet/profile.toml`:
//!
//! ```toml
//! target = "2021"
//! entry_point = "main"
//! compiler = "workspace"
//! references = ["framework:base"]
//! usings = ["std::fs"]
//! ```
//!
//! A missing or unreadable profile yields empty defaults; a malformed line
//! is skipped with a warning rather than failing the run.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use runlet_core::{CompilerKind, ConfigSource, ExecutorKind, OptionDefaults};

pub struct ProfileConfig {
    path: Option<PathBuf>,
}

impl ProfileConfig {
    /// Profile at the platform's standard config location.
    pub fn standard() -> Self {
        Self {
            path: dirs::config_dir().map(|dir| dir.join("runlet").join("profile.toml")),
        }
    }
}

impl ConfigSource for ProfileConfig {
    fn defaults(&self) -> OptionDefaults {
        let Some(path) = &self.path else {
            return OptionDefaults::default();
        };
        match fs::read_to_string(path) {
            Ok(text) => parse_profile(&text),
            Err(_) => OptionDefaults::default(),
        }
    }
}

fn parse_profile(text: &str) -> OptionDefaults {
    let mut defaults = OptionDefaults::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            tracing::warn!(line, "skipping malformed profile line");
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "target" => defaults.target = string_value(value),
            "entry_point" => defaults.entry_point = string_value(value),
            "compiler" => {
                defaults.compiler = string_value(value)
                    .and_then(|s| warn_invalid(key, CompilerKind::from_str(&s)));
            }
            "executor" => {
                defaults.executor = string_value(value)
                    .and_then(|s| warn_invalid(key, ExecutorKind::from_str(&s)));
            }
            "references" => defaults.references = list_value(value),
            "usings" => defaults.usings = list_value(value),
            other => tracing::warn!(key = other, "unknown profile key"),
        }
    }

    defaults
}

fn warn_invalid<T>(key: &str, parsed: runlet_core::Result<T>) -> Option<T> {
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, "invalid profile value: {e}");
            None
        }
    }
}

fn string_value(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let unquoted = raw.strip_prefix('"')?.strip_suffix('"')?;
    Some(unquoted.to_string())
}

/// Parse a single-line `["a", "b"]` list.
fn list_value(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let Some(body) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
        return Vec::new();
    };
    body.split(',')
        .filter_map(|item| string_value(item.trim()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_profile_round_trip() {
        let defaults = parse_profile(
            r#"
# default profile
target = "2021"
entry_point = "run"
compiler = "script"
executor = "noop"
references = ["framework:base", "nuget:serde,1.0.0"]
usings = ["std::fs"]
"#,
        );
        assert_eq!(defaults.target.as_deref(), Some("2021"));
        assert_eq!(defaults.entry_point.as_deref(), Some("run"));
        assert_eq!(defaults.compiler, Some(CompilerKind::Script));
        assert_eq!(defaults.executor, Some(ExecutorKind::Noop));
        assert_eq!(defaults.references.len(), 2);
        assert_eq!(defaults.usings, vec!["std::fs".to_string()]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let defaults = parse_profile("target: nope\ncompiler = \"bogus\"\ntarget = \"2024\"\n");
        assert_eq!(defaults.target.as_deref(), Some("2024"));
        assert_eq!(defaults.compiler, None);
    }

    #[test]
    fn empty_profile_is_empty_defaults() {
        let defaults = parse_profile("");
        assert!(defaults.target.is_none());
        assert!(defaults.references.is_empty());
    }
}
