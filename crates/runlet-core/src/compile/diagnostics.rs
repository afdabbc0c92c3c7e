//! Parsing of rustc's JSON diagnostic stream.

use serde::Deserialize;

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

/// One compiler diagnostic, normalized from rustc's JSON output.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,

    /// Error code (e.g., "E0425")
    pub code: Option<String>,

    pub severity: Severity,

    /// Rendered message for display, when rustc provided one.
    pub rendered: Option<String>,
}

impl Diagnostic {
    /// Create a plain error-level diagnostic with just a message.
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            rendered: Some(message.clone()),
            message,
            code: None,
            severity: Severity::Error,
        }
    }

    /// One line suitable for aggregated display.
    pub fn display_line(&self) -> String {
        if let Some(rendered) = &self.rendered {
            return rendered.trim_end().to_string();
        }
        match &self.code {
            Some(code) => format!("error[{code}]: {}", self.message),
            None => format!("error: {}", self.message),
        }
    }
}

/// Rustc JSON diagnostic format.
#[derive(Debug, Deserialize)]
struct RustcDiagnostic {
    message: String,
    code: Option<RustcCode>,
    level: String,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

/// Parse a `--error-format=json` stderr stream into diagnostics.
///
/// Non-JSON lines (driver notes, ICE banners) are skipped with a debug log.
pub fn parse_stderr(stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for line in stderr.lines() {
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<RustcDiagnostic>(line) {
            Ok(raw) => {
                // Trailing "aborting due to N previous errors" summaries carry
                // level "error" but no information of their own.
                if raw.message.starts_with("aborting due to") {
                    continue;
                }
                let severity = match raw.level.as_str() {
                    "error" => Severity::Error,
                    "warning" => Severity::Warning,
                    "note" => Severity::Note,
                    "help" => Severity::Help,
                    _ => continue,
                };
                diagnostics.push(Diagnostic {
                    message: raw.message,
                    code: raw.code.map(|c| c.code),
                    severity,
                    rendered: raw.rendered,
                });
            }
            Err(e) => {
                tracing::debug!(
                    "failed to parse rustc JSON: {} (line: {})",
                    e,
                    if line.len() > 100 { &line[..100] } else { line }
                );
            }
        }
    }

    diagnostics
}

/// Whether a failed compilation failed only because `main` does not exist.
///
/// This is the signature that triggers the library fallback: the generated
/// application export references `main`, so a script without one fails with
/// exactly these resolution errors and nothing else.
pub fn is_missing_main(diagnostics: &[Diagnostic]) -> bool {
    let errors: Vec<&Diagnostic> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .collect();

    !errors.is_empty()
        && errors.iter().all(|d| {
            matches!(d.code.as_deref(), Some("E0425") | Some("E0601"))
                && d.message.contains("`main`")
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_MAIN: &str = r#"{"message":"cannot find function `main` in this scope","code":{"code":"E0425"},"level":"error","spans":[],"rendered":"error[E0425]: cannot find function `main` in this scope"}"#;

    #[test]
    fn parses_rustc_json() {
        let json = r#"{"message":"mismatched types","code":{"code":"E0308"},"level":"error","spans":[],"rendered":"error[E0308]: mismatched types"}"#;
        let diagnostics = parse_stderr(json);

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code.as_deref(), Some("E0308"));
        assert_eq!(diagnostics[0].severity, Severity::Error);
    }

    #[test]
    fn skips_non_json_lines() {
        let stderr = format!("warning: unused import (raw text)\n{MISSING_MAIN}\n");
        let diagnostics = parse_stderr(&stderr);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn missing_main_signature_detected() {
        let diagnostics = parse_stderr(MISSING_MAIN);
        assert!(is_missing_main(&diagnostics));
    }

    #[test]
    fn other_errors_do_not_trigger_the_fallback() {
        let mixed = format!(
            "{MISSING_MAIN}\n{}",
            r#"{"message":"mismatched types","code":{"code":"E0308"},"level":"error","spans":[],"rendered":null}"#
        );
        let diagnostics = parse_stderr(&mixed);
        assert!(!is_missing_main(&diagnostics));
        assert!(!is_missing_main(&[]));
    }

    #[test]
    fn aborting_summaries_do_not_mask_the_signature() {
        let stderr = format!(
            "{MISSING_MAIN}\n{}",
            r#"{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"rendered":"error: aborting due to 1 previous error"}"#
        );
        let diagnostics = parse_stderr(&stderr);
        assert_eq!(diagnostics.len(), 1);
        assert!(is_missing_main(&diagnostics));
    }

    #[test]
    fn warnings_do_not_mask_the_signature() {
        let mixed = format!(
            "{}\n{MISSING_MAIN}",
            r#"{"message":"unused variable: `x`","code":null,"level":"warning","spans":[],"rendered":null}"#
        );
        let diagnostics = parse_stderr(&mixed);
        assert!(is_missing_main(&diagnostics));
    }
}
