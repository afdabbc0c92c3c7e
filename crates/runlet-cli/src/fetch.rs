//! Source fetching for the CLI.

use std::fs;

use runlet_core::{Error, Result, ScriptFetcher, SourceDescriptor};

/// Fetches inline and file-backed sources. Remote URLs are recognized but
/// not fetched by this host.
pub struct LocalFetcher;

impl ScriptFetcher for LocalFetcher {
    fn fetch(&self, descriptor: &SourceDescriptor) -> Result<String> {
        match descriptor {
            SourceDescriptor::Inline(text) => Ok(text.clone()),
            SourceDescriptor::File(path) => fs::read_to_string(path)
                .map_err(|e| Error::Fetch(format!("cannot read {}: {e}", path.display()))),
            SourceDescriptor::Url(url) => Err(Error::Fetch(format!(
                "remote scripts are not supported by this host: {url}"
            ))),
        }
    }
}

/// Classify a script argument: URL schemes are recognized by prefix,
/// everything else is a local file path.
pub fn descriptor_for(script: &str) -> SourceDescriptor {
    if script.starts_with("http://") || script.starts_with("https://") {
        SourceDescriptor::Url(script.to_string())
    } else {
        SourceDescriptor::File(script.into())
    }
}
