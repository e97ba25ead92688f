use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use known_core::blog::PrerenderPolicy;

/// Server configuration, loaded from a TOML file and overridable from the
/// command line (see `main.rs`). Every field has a default so a missing file
/// still yields a runnable development server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen_addr: String,
    /// Directory of markdown posts with front matter headers.
    pub posts_dir: PathBuf,
    /// Optional CMS endpoint returning a JSON array of raw markdown posts.
    pub cms_url: Option<String>,
    pub prerender: PrerenderPolicy,
    /// Deadline for individual store and filesystem calls, in milliseconds.
    pub store_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_addr: "127.0.0.1:8080".to_string(),
            posts_dir: PathBuf::from("posts"),
            cms_url: None,
            prerender: PrerenderPolicy::Partial,
            store_timeout_ms: 5_000,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}
