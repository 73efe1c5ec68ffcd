//! CSRF marker detection.
//!
//! A page carrying an anti-forgery token is request-specific: freezing it
//! into a static file would hand every visitor the same single-use token.
//! Two markers are recognized, case-insensitively and in any attribute order:
//!
//! - `<input ... name="_token" ...>`
//! - `<meta ... name="csrf-token" ...>`
//!
//! In auto mode an enabled marker blocks caching. In manual mode (`auto =
//! false`) the URL list is a deliberate choice, so markers only warn.

use crate::config::GeneratorConfig;
use crate::types::CacheDecision;
use regex::bytes::Regex;
use std::sync::LazyLock;
use tracing::warn;

static CSRF_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<input[^>]*name=["']_token["'][^>]*>"#).expect("valid CSRF input regex")
});

static CSRF_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]*name=["']csrf-token["'][^>]*>"#).expect("valid CSRF meta regex")
});

/// Which CSRF markers a page contains.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsrfMarkers {
    pub input: bool,
    pub meta: bool,
}

impl CsrfMarkers {
    pub fn scan(content: &[u8]) -> Self {
        Self {
            input: CSRF_INPUT_RE.is_match(content),
            meta: CSRF_META_RE.is_match(content),
        }
    }
}

/// CSRF policy for a run.
#[derive(Debug, Clone, Copy)]
pub struct CsrfGuard {
    pub auto: bool,
    pub skip_input: bool,
    pub skip_meta: bool,
}

impl CsrfGuard {
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self {
            auto: config.auto,
            skip_input: config.auto_skip_csrf_input,
            skip_meta: config.auto_skip_csrf_meta,
        }
    }

    /// Scan `content` and return the skip decision, if any.
    ///
    /// Auto mode checks the input marker before the meta marker. Manual
    /// mode never skips; it logs a warning for the first marker found.
    pub fn check(&self, url: &str, content: &[u8]) -> Option<CacheDecision> {
        let markers = CsrfMarkers::scan(content);
        if self.auto {
            if self.skip_input && markers.input {
                return Some(CacheDecision::SkippedByCsrfInput);
            }
            if self.skip_meta && markers.meta {
                return Some(CacheDecision::SkippedByCsrfMeta);
            }
        } else if markers.input {
            warn!(%url, "CSRF token input found in page content");
        } else if markers.meta {
            warn!(%url, "CSRF meta tag found in page content");
        }
        None
    }
}
