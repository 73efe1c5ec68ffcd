//! # prerender
//!
//! Pre-renders a dynamic web application into a directory of static files
//! and provides the runtime shim that serves them.
//!
//! # Architecture: One Batch, One Table
//!
//! ```text
//! 1. Resolve   routes + config   →  sorted UrlTasks
//! 2. Fetch     UrlTask           →  status + body   (in-process or external)
//! 3. Decide    status + CSRF     →  cache or skip
//! 4. Write     eligible bodies   →  static-site/<file>.html
//! 5. Table     every record      →  static-site/.fallback.json
//! ```
//!
//! At request time the host asks [`fallback::Fallback`] whether a static
//! copy exists for the request URI. It serves the file if the table lists
//! it and the file is on disk; anything else falls through to the
//! application.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`routes`] | Route model, the `RouteRegistry` seam, URL discovery, routes file loading |
//! | [`resolve`] | Merges discovered and explicit URLs into the ordered task list |
//! | [`fetch`] | `ContentFetcher` with the in-process (`AppHandler`) and external (`HttpClient`) strategies |
//! | [`csrf`] | Detects anti-forgery markers in fetched pages |
//! | [`naming`] | URL normalization and URL → file name mapping |
//! | [`cache`] | `CacheWriter` (permission-aware writes) and directory cleaning |
//! | [`fallback`] | The URL → file table and the runtime shim reading it |
//! | [`generate`] | The pipeline tying the stages together |
//! | [`config`] | `prerender.toml` loading, merging over stock defaults, validation |
//! | [`types`] | Shared types: `FetchMethod`, `UrlTask`, `CacheDecision`, `CacheRecord` |
//! | [`output`] | CLI report formatting |
//!
//! # Design Decisions
//!
//! ## The Application Is Injected
//!
//! In-process fetching calls an [`fetch::AppHandler`] passed in by the
//! embedding program. There is no global application instance; the same
//! pipeline can run against a real app, a closure, or a test double.
//!
//! ## Fetch Concurrently, Write Serially
//!
//! With `workers > 1`, fetches run on a dedicated rayon pool. Decisions and
//! writes always happen afterwards on the calling thread in task order, so
//! concurrency never changes the cache tree or the report.
//!
//! ## The Table Lists Everything
//!
//! `.fallback.json` includes URLs that were skipped. The shim checks that
//! the file exists on every request, so a stale or over-inclusive table can
//! only cause a fall-through, never a wrong response.

pub mod cache;
pub mod config;
pub mod csrf;
pub mod fallback;
pub mod fetch;
pub mod generate;
pub mod naming;
pub mod output;
pub mod resolve;
pub mod routes;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
