//! Generator configuration.
//!
//! Loaded from `prerender.toml`. Every option is optional; values in the
//! file are merged over the stock defaults, unknown keys are rejected, and
//! the merged result is validated before a run starts.
//!
//! ```toml
//! storage_dir = "static-site"          # Cache directory
//! base_url = "http://localhost"        # Host header / external fetch origin
//!
//! urls = ["/pricing", { url = "/legacy", method = "external" }]
//! skip_urls = ["/admin"]
//!
//! auto = true                          # Discover URLs from the route registry
//! auto_request_methods = ["GET"]
//! auto_skip_parameterized = true
//! auto_skip_csrf_input = true
//! auto_skip_csrf_meta = true
//!
//! status_codes = [200]
//! add_gitignore = true
//! static_file_extension = "html"       # or `false` for bare names
//! prepend_echo_content = true
//! fetch_method = "in-process"          # or "external"
//! root_url_file_name = "_"
//! dir_mode = 0o755
//! file_mode = 0o644
//! fetch_timeout_secs = 30
//! workers = 1
//! ```
//!
//! Run `prerender gen-config` for the commented version of this file.

use crate::types::FetchMethod;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the config file, resolved against the working directory.
pub const CONFIG_FILENAME: &str = "prerender.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// An explicitly listed URL, optionally pinned to a fetch method.
///
/// In TOML either a bare string or a table:
///
/// ```toml
/// urls = ["/about", { url = "/feed", method = "external" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UrlEntry {
    Url(String),
    WithMethod {
        url: String,
        method: Option<FetchMethod>,
    },
}

impl UrlEntry {
    pub fn url(&self) -> &str {
        match self {
            UrlEntry::Url(url) | UrlEntry::WithMethod { url, .. } => url,
        }
    }

    /// The pinned fetch method, if the entry names one.
    pub fn method(&self) -> Option<FetchMethod> {
        match self {
            UrlEntry::Url(_) => None,
            UrlEntry::WithMethod { method, .. } => *method,
        }
    }
}

impl From<&str> for UrlEntry {
    fn from(url: &str) -> Self {
        UrlEntry::Url(url.to_string())
    }
}

/// Full generator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Directory receiving the cached files, the fallback table and the ignore file.
    pub storage_dir: PathBuf,
    /// Origin of the application. Supplies the Host header for in-process
    /// fetches and the scheme/host/port for external fetches.
    pub base_url: String,
    /// URLs to pre-render in addition to (or, with `auto = false`, instead of)
    /// discovered routes. Later entries override earlier ones.
    pub urls: Vec<UrlEntry>,
    /// URLs never fetched, even when discovered or listed.
    pub skip_urls: Vec<String>,
    /// Discover URLs from the route registry. Also switches the CSRF guard
    /// from warning to skipping.
    pub auto: bool,
    /// HTTP methods (case-insensitive) a route must accept to be discovered.
    pub auto_request_methods: Vec<String>,
    /// Leave routes with path parameters out of discovery.
    pub auto_skip_parameterized: bool,
    /// In auto mode, skip pages containing a `_token` input.
    pub auto_skip_csrf_input: bool,
    /// In auto mode, skip pages containing a `csrf-token` meta tag.
    pub auto_skip_csrf_meta: bool,
    /// Status codes whose responses are written to the cache.
    pub status_codes: Vec<u16>,
    /// Write a `.gitignore` marking the storage directory as disposable.
    pub add_gitignore: bool,
    /// Extension appended to cache file names. `false` in TOML disables it.
    #[serde(with = "extension_policy")]
    pub static_file_extension: Option<String>,
    /// Prepend output the handler emitted outside its response to the body.
    pub prepend_echo_content: bool,
    /// Fetch method for discovered URLs and for list entries without one.
    pub fetch_method: FetchMethod,
    /// File stem used for the root URL `/`.
    pub root_url_file_name: String,
    /// Permission bits for created directories.
    pub dir_mode: u32,
    /// Permission bits applied to every written file.
    pub file_mode: u32,
    /// Per-request timeout for external fetches.
    pub fetch_timeout_secs: u64,
    /// Number of concurrent fetches. `1` fetches sequentially.
    pub workers: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("static-site"),
            base_url: "http://localhost".to_string(),
            urls: Vec::new(),
            skip_urls: Vec::new(),
            auto: true,
            auto_request_methods: vec!["GET".to_string()],
            auto_skip_parameterized: true,
            auto_skip_csrf_input: true,
            auto_skip_csrf_meta: true,
            status_codes: vec![200],
            add_gitignore: true,
            static_file_extension: Some("html".to_string()),
            prepend_echo_content: true,
            fetch_method: FetchMethod::InProcess,
            root_url_file_name: "_".to_string(),
            dir_mode: 0o755,
            file_mode: 0o644,
            fetch_timeout_secs: 30,
            workers: 1,
        }
    }
}

impl GeneratorConfig {
    /// The configured extension, if any.
    pub fn extension(&self) -> Option<&str> {
        self.static_file_extension.as_deref()
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = url::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Validation(format!("base_url '{}' is invalid: {e}", self.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(ConfigError::Validation(format!(
                "base_url '{}' must be an http(s) URL with a host",
                self.base_url
            )));
        }
        if self.status_codes.is_empty() {
            return Err(ConfigError::Validation(
                "status_codes must not be empty".into(),
            ));
        }
        if self.root_url_file_name.is_empty() || self.root_url_file_name.contains('/') {
            return Err(ConfigError::Validation(
                "root_url_file_name must be a non-empty name without '/'".into(),
            ));
        }
        if let Some(ext) = &self.static_file_extension
            && (ext.is_empty() || ext.starts_with('.') || ext.contains('/'))
        {
            return Err(ConfigError::Validation(format!(
                "static_file_extension '{ext}' must be a bare extension like \"html\""
            )));
        }
        if self.dir_mode > 0o7777 || self.file_mode > 0o7777 {
            return Err(ConfigError::Validation(
                "dir_mode and file_mode must be permission bits (at most 0o7777)".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::Validation("workers must be at least 1".into()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// `static_file_extension` accepts a string or `false`.
///
/// Serialized back as `false` when unset so the stock defaults survive a
/// round trip through `toml::Value` during merging.
mod extension_policy {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Ext(String),
        Flag(bool),
    }

    pub fn serialize<S: Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ext) => s.serialize_str(ext),
            None => s.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        match Raw::deserialize(d)? {
            Raw::Ext(ext) => Ok(Some(ext)),
            Raw::Flag(false) => Ok(None),
            Raw::Flag(true) => Err(serde::de::Error::custom(
                "static_file_extension = true is ambiguous; give the extension as a string",
            )),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(GeneratorConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Read a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<GeneratorConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: GeneratorConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from the file at `path`, falling back to stock defaults when
/// the file is absent.
pub fn load_config(path: &Path) -> Result<GeneratorConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `prerender.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# prerender configuration
# =======================
# All settings are optional. Values shown below are the defaults.
# Unknown keys will cause an error.

# Directory receiving cached pages, the fallback table (.fallback.json)
# and the optional .gitignore.
storage_dir = "static-site"

# Origin of the running application. In-process fetches copy its host into
# the Host header; external fetches request <base_url><path>.
base_url = "http://localhost"

# ---------------------------------------------------------------------------
# URL selection
# ---------------------------------------------------------------------------
# Explicit URLs. Each entry is a path, or a table pinning the fetch method:
#   urls = ["/pricing", { url = "/feed", method = "external" }]
# Explicit entries override discovered routes with the same URL.
urls = []

# URLs never fetched.
skip_urls = []

# Discover URLs from the route registry. When false, only `urls` is used
# and CSRF markers only produce warnings.
auto = true

# A route is discovered if it accepts one of these methods.
auto_request_methods = ["GET"]

# Leave routes with path parameters (e.g. /posts/{id}) out of discovery.
# List concrete URLs in `urls` instead.
auto_skip_parameterized = true

# In auto mode, skip pages with <input name="_token">.
auto_skip_csrf_input = true

# In auto mode, skip pages with <meta name="csrf-token">.
auto_skip_csrf_meta = true

# ---------------------------------------------------------------------------
# Fetching
# ---------------------------------------------------------------------------
# "in-process" calls the embedded application handler; "external" performs
# an HTTP request (redirects are recorded, never followed).
# The prerender binary has no embedded application and only runs
# "external" tasks: set fetch_method = "external" when using the CLI.
fetch_method = "in-process"

# Prepend output the handler printed outside its response to the body.
prepend_echo_content = true

# Timeout for each external request.
fetch_timeout_secs = 30

# Concurrent fetches. 1 fetches sequentially.
workers = 1

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
# Only responses with these status codes are cached.
status_codes = [200]

# Extension appended to cache file names; false for none.
static_file_extension = "html"

# File name used for the root URL "/".
root_url_file_name = "_"

# Permissions for created directories and written files.
dir_mode = 0o755
file_mode = 0o644

# Write a .gitignore ignoring everything in storage_dir.
add_gitignore = true
"##
}
