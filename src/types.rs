//! Shared types passed between pipeline stages.
//!
//! A run moves through three shapes: [`UrlTask`] (what to fetch, produced by
//! [`resolve`](crate::resolve)), [`FetchResult`](crate::fetch::FetchResult)
//! (what came back), and [`CacheRecord`] (what happened to it). Records are
//! the run's result set; both the fallback table and the report are built
//! from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// How a URL's content is obtained.
///
/// `in-process` calls the injected application handler directly;
/// `external` performs a real HTTP request against the base URL.
/// The legacy tags `app` and `curl` are accepted in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMethod {
    #[default]
    #[serde(alias = "app")]
    InProcess,
    #[serde(alias = "curl")]
    External,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMethod::InProcess => "in-process",
            FetchMethod::External => "external",
        }
    }
}

impl fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single URL to pre-render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlTask {
    /// Normalized URL, always starting with `/`.
    pub url: String,
    pub fetch_method: FetchMethod,
}

/// Outcome of the eligibility check for a fetched URL.
///
/// `Cached` means the content may be written; whether the write succeeded
/// is tracked separately by [`CacheRecord::is_cached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheDecision {
    Cached,
    SkippedByStatus,
    SkippedByCsrfInput,
    SkippedByCsrfMeta,
}

impl CacheDecision {
    /// Report message for a skip, `None` for [`CacheDecision::Cached`].
    pub fn skip_message(&self) -> Option<&'static str> {
        match self {
            CacheDecision::Cached => None,
            CacheDecision::SkippedByStatus => Some("Skipped by Status Code"),
            CacheDecision::SkippedByCsrfInput => Some("Skipped by CSRF Input"),
            CacheDecision::SkippedByCsrfMeta => Some("Skipped by CSRF Meta"),
        }
    }
}

/// What happened to one URL during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub url: String,
    pub status_code: Option<u16>,
    pub message: String,
    /// Path relative to the storage directory, as written into the fallback table.
    pub file_name: String,
    /// Absolute (or storage-relative) destination on disk.
    pub file_path: PathBuf,
    /// True only if the file was written during this run.
    pub is_cached: bool,
    pub fetch_method: FetchMethod,
    pub decision: CacheDecision,
}
