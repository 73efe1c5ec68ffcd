//! Fallback table and the runtime shim that reads it.
//!
//! # Generation
//!
//! After every run the pipeline writes `.fallback.json` at the root of the
//! storage directory. It maps each processed URL to its cache file name:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "/": "_.html",
//!     "/about": "about.html",
//!     "/contact": "contact.html"
//!   }
//! }
//! ```
//!
//! The table lists every URL the run processed, **including ones that were
//! not cached** (`/contact` above may have been skipped for a CSRF form).
//! That is safe because the shim never trusts the table alone: it only
//! serves a file that exists at request time. In exchange the table does
//! not have to be regenerated just because a page's eligibility changed.
//!
//! # Runtime
//!
//! The host application calls [`Fallback::serve`] before anything else in
//! its request path:
//!
//! ```no_run
//! use prerender::fallback::{Fallback, ShimOutcome};
//!
//! let shim = Fallback::load("static-site");
//! match shim.serve("/about") {
//!     ShimOutcome::Serve(bytes) => { /* write bytes, end the request */ }
//!     ShimOutcome::FallThrough => { /* boot the application as usual */ }
//! }
//! ```
//!
//! Requests carrying the [`SKIP_MARKER`] query argument always fall through,
//! so the generator's own external fetches reach the live application.

use crate::cache::{CacheError, CacheWriter};
use crate::naming::normalize_url;
use crate::types::CacheRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub use crate::fetch::SKIP_MARKER;

/// Name of the table file within the storage directory.
pub const TABLE_FILENAME: &str = ".fallback.json";

/// Version of the table format. Tables with another version load as empty.
const TABLE_VERSION: u32 = 1;

/// URL → cache file name mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackTable {
    pub version: u32,
    pub entries: BTreeMap<String, String>,
}

impl FallbackTable {
    pub fn empty() -> Self {
        Self {
            version: TABLE_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Build the table from a run's records, cached or not.
    pub fn from_records(records: &[CacheRecord]) -> Self {
        Self {
            version: TABLE_VERSION,
            entries: records
                .iter()
                .map(|r| (r.url.clone(), r.file_name.clone()))
                .collect(),
        }
    }

    /// Load from the storage directory. Returns an empty table if the file
    /// is missing, unreadable, corrupt, or from another format version.
    pub fn load(storage_dir: &Path) -> Self {
        let path = storage_dir.join(TABLE_FILENAME);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::empty(),
        };
        let table: Self = match serde_json::from_str(&content) {
            Ok(t) => t,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "ignoring unreadable fallback table");
                return Self::empty();
            }
        };
        if table.version != TABLE_VERSION {
            return Self::empty();
        }
        table
    }

    /// Write the table into the writer's storage directory.
    pub fn save(&self, writer: &CacheWriter) -> Result<PathBuf, CacheError> {
        let path = writer.path_for(TABLE_FILENAME);
        let json = serde_json::to_string_pretty(self).expect("fallback table must serialize");
        writer.write(&path, json.as_bytes())?;
        Ok(path)
    }

    /// File name listed for a URL, without checking the disk.
    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries.get(&normalize_url(url)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What the host should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShimOutcome {
    /// Respond with these bytes and stop.
    Serve(Vec<u8>),
    /// Hand the request to the application unchanged.
    FallThrough,
}

/// Runtime view of a storage directory.
#[derive(Debug, Clone)]
pub struct Fallback {
    storage_dir: PathBuf,
    table: FallbackTable,
}

impl Fallback {
    pub fn load(storage_dir: impl Into<PathBuf>) -> Self {
        let storage_dir = storage_dir.into();
        let table = FallbackTable::load(&storage_dir);
        Self { storage_dir, table }
    }

    pub fn table(&self) -> &FallbackTable {
        &self.table
    }

    /// Path of a usable cached file for `request_uri`, or `None` when the
    /// request must go to the application: URI unlisted, marker present,
    /// or file absent.
    pub fn lookup(&self, request_uri: &str) -> Option<PathBuf> {
        if has_skip_marker(request_uri) {
            return None;
        }
        let file_name = self.table.get(request_uri)?;
        let path = self.storage_dir.join(file_name);
        path.is_file().then_some(path)
    }

    /// Read the cached file for `request_uri`, falling through on any miss.
    ///
    /// A file that vanishes between the existence check and the read is a
    /// miss, not an error.
    pub fn serve(&self, request_uri: &str) -> ShimOutcome {
        match self.lookup(request_uri).map(fs::read) {
            Some(Ok(bytes)) => ShimOutcome::Serve(bytes),
            _ => ShimOutcome::FallThrough,
        }
    }
}

fn has_skip_marker(request_uri: &str) -> bool {
    request_uri.split_once('?').is_some_and(|(_, query)| {
        query
            .split('&')
            .any(|arg| arg.split('=').next() == Some(SKIP_MARKER))
    })
}
