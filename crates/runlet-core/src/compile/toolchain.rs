//! Rust toolchain discovery for script compilation.

use std::path::PathBuf;
use std::process::Command;

use crate::error::{Error, Result};

/// Locates rustc and reports what it found.
#[derive(Debug, Clone)]
pub struct Toolchain {
    rustc_path: PathBuf,
    version: String,
}

impl Toolchain {
    /// Detect the toolchain from `PATH`.
    pub fn discover() -> Result<Self> {
        let rustc_path = which::which("rustc")
            .map_err(|_| Error::Machine("rustc not found in PATH".to_string()))?;
        let version = Self::rustc_version(&rustc_path)?;
        tracing::debug!(rustc = %rustc_path.display(), %version, "toolchain detected");
        Ok(Self {
            rustc_path,
            version,
        })
    }

    pub fn rustc_path(&self) -> &PathBuf {
        &self.rustc_path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn rustc_version(rustc: &PathBuf) -> Result<String> {
        let output = Command::new(rustc)
            .args(["--version"])
            .output()
            .map_err(|e| Error::Machine(format!("failed to run rustc: {e}")))?;

        if !output.status.success() {
            return Err(Error::Machine("failed to query rustc version".to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Dynamic library file extension for the current platform.
pub fn dylib_extension() -> &'static str {
    if cfg!(target_os = "windows") {
        "dll"
    } else if cfg!(target_os = "macos") {
        "dylib"
    } else {
        "so"
    }
}

/// Dynamic library file name prefix for the current platform.
pub fn dylib_prefix() -> &'static str {
    if cfg!(target_os = "windows") { "" } else { "lib" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolchain_detection() {
        let toolchain = Toolchain::discover();
        assert!(toolchain.is_ok(), "should detect toolchain");
        assert!(!toolchain.unwrap().version().is_empty());
    }
}
