//! URL normalization and the URL → cache file name mapping.
//!
//! Every URL entering the pipeline goes through [`normalize_url`] so that
//! `about`, `/about`, `//about` and `/about/` all name the same task. The
//! cache file for a normalized URL is then derived by [`file_name_for_url`]:
//!
//! - `/` → `_.html` (the root file name plus extension)
//! - `/about` → `about.html`
//! - `/blog/post-1?x=1` → `blog/post-1_x_1.html`
//! - `/files/report.pdf` → `files/report_pdf.html`
//!
//! The mapping is pure: the same URL and settings always give the same name.
//! Distinct URLs can collide (`/a.b` and `/a_b` both map to `a_b.html`);
//! the last writer wins.

/// Normalize a URL to a single leading slash and no trailing slash.
///
/// The query string, if any, is kept verbatim. The root stays `/`.
pub fn normalize_url(url: &str) -> String {
    let (path, query) = match url.find('?') {
        Some(pos) => (&url[..pos], Some(&url[pos..])),
        None => (url, None),
    };
    let trimmed = path.trim_matches('/');
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    normalized.push('/');
    normalized.push_str(trimmed);
    if let Some(query) = query {
        normalized.push_str(query);
    }
    normalized
}

/// Map a URL to its cache file name relative to the storage directory.
///
/// Leading slashes are stripped, every character outside `[A-Za-z0-9_/-]`
/// becomes `_`, an empty result is replaced by `root_file_name`, and
/// `extension` (when set) is appended after a dot.
pub fn file_name_for_url(url: &str, root_file_name: &str, extension: Option<&str>) -> String {
    let escaped: String = url
        .trim_start_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '/' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = if escaped.is_empty() {
        root_file_name.to_string()
    } else {
        escaped
    };
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem,
    }
}
