//! The pre-render pipeline.
//!
//! One call to [`generate`] is one run:
//!
//! ```text
//! resolve     registry + config  →  sorted UrlTasks
//! skip        drop URLs on the skip list
//! fetch       UrlTask            →  FetchResult      (sequential, or rayon pool)
//! decide      status rule, then CSRF guard
//! write       eligible content   →  storage_dir/<file name>
//! fallback    every record       →  .fallback.json
//! gitignore   optional           →  .gitignore
//! ```
//!
//! Fetching is the only stage that may run concurrently. Deciding and
//! writing always happen on the calling thread in task order, so the report
//! and the cache tree come out the same regardless of `workers`.
//!
//! Per-task problems (fetch failure, skip, failed write) end up on that
//! task's [`CacheRecord`]. Only run-level artifacts (the fallback table, the
//! ignore file) can fail the run.

use crate::cache::{CacheError, CacheWriter};
use crate::config::GeneratorConfig;
use crate::csrf::CsrfGuard;
use crate::fallback::FallbackTable;
use crate::fetch::{ContentFetcher, FetchError, FetchResult, ReqwestClient};
use crate::naming::{file_name_for_url, normalize_url};
use crate::resolve::resolve_tasks;
use crate::routes::RouteRegistry;
use crate::types::{CacheDecision, CacheRecord, UrlTask};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Fetch setup error: {0}")]
    Fetch(#[from] FetchError),
}

/// Result of a run.
#[derive(Debug)]
pub struct GenerateOutput {
    /// One record per processed task, in task order.
    pub records: Vec<CacheRecord>,
    pub fallback_path: PathBuf,
    pub gitignore_path: Option<PathBuf>,
}

impl GenerateOutput {
    pub fn cached(&self) -> impl Iterator<Item = &CacheRecord> {
        self.records.iter().filter(|r| r.is_cached)
    }

    pub fn not_cached(&self) -> impl Iterator<Item = &CacheRecord> {
        self.records.iter().filter(|r| !r.is_cached)
    }
}

/// Run the pipeline with an already-assembled fetcher.
pub fn generate<R>(
    config: &GeneratorConfig,
    registry: &R,
    fetcher: &ContentFetcher<'_>,
) -> Result<GenerateOutput, GenerateError>
where
    R: RouteRegistry + ?Sized,
{
    let tasks = plan_tasks(registry, config);
    let writer = CacheWriter::from_config(config);
    let guard = CsrfGuard::from_config(config);
    info!(tasks = tasks.len(), storage_dir = %writer.root().display(), "starting run");

    let records = process_tasks(&tasks, fetcher, config, &guard, &writer);

    let table = FallbackTable::from_records(&records);
    let fallback_path = table.save(&writer)?;
    let gitignore_path = if config.add_gitignore {
        Some(writer.write_gitignore()?)
    } else {
        None
    };

    let cached = records.iter().filter(|r| r.is_cached).count();
    info!(
        cached,
        not_cached = records.len() - cached,
        table_entries = table.len(),
        "run complete"
    );

    Ok(GenerateOutput {
        records,
        fallback_path,
        gitignore_path,
    })
}

/// Run the pipeline with only the external fetch method available.
///
/// Builds a [`ReqwestClient`] from the config. In-process tasks come back
/// as failed records since no application handler is attached.
pub fn generate_external<R>(
    config: &GeneratorConfig,
    registry: &R,
) -> Result<GenerateOutput, GenerateError>
where
    R: RouteRegistry + ?Sized,
{
    let client = ReqwestClient::from_config(config)?;
    let fetcher = ContentFetcher::new(config)?.with_client(&client);
    generate(config, registry, &fetcher)
}

/// The tasks a run will fetch: resolved, then filtered by the skip list.
pub fn plan_tasks<R>(registry: &R, config: &GeneratorConfig) -> Vec<UrlTask>
where
    R: RouteRegistry + ?Sized,
{
    apply_skip_list(resolve_tasks(registry, config), &config.skip_urls)
}

/// Drop tasks whose normalized URL is on the skip list. Skipped tasks leave
/// no trace: no record, no fallback entry.
fn apply_skip_list(tasks: Vec<UrlTask>, skip_urls: &[String]) -> Vec<UrlTask> {
    if skip_urls.is_empty() {
        return tasks;
    }
    let skip: HashSet<String> = skip_urls.iter().map(|u| normalize_url(u)).collect();
    tasks
        .into_iter()
        .filter(|task| {
            let keep = !skip.contains(&task.url);
            if !keep {
                debug!(url = %task.url, "skipped by skip list");
            }
            keep
        })
        .collect()
}

/// Fetch, decide and write every task, returning records in task order.
///
/// Sequential runs finish each task before fetching the next, so only one
/// body is held at a time. With a worker pool all bodies are fetched first,
/// then decided and written on the calling thread.
fn process_tasks(
    tasks: &[UrlTask],
    fetcher: &ContentFetcher<'_>,
    config: &GeneratorConfig,
    guard: &CsrfGuard,
    writer: &CacheWriter,
) -> Vec<CacheRecord> {
    let record = |task: &UrlTask, result: FetchResult| record_for(task, result, config, guard, writer);

    if config.workers > 1 && tasks.len() > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(config.workers).build() {
            Ok(pool) => {
                let results: Vec<FetchResult> =
                    pool.install(|| tasks.par_iter().map(|t| fetcher.fetch(t)).collect());
                return tasks.iter().zip(results).map(|(t, r)| record(t, r)).collect();
            }
            Err(err) => warn!(error = %err, "failed to build fetch pool, fetching sequentially"),
        }
    }
    tasks.iter().map(|t| record(t, fetcher.fetch(t))).collect()
}

/// Status rule first: a disallowed status wins over any CSRF finding.
fn decide(
    result: &FetchResult,
    config: &GeneratorConfig,
    guard: &CsrfGuard,
    url: &str,
) -> CacheDecision {
    let allowed = result
        .status_code
        .is_some_and(|code| config.status_codes.contains(&code));
    if !allowed {
        return CacheDecision::SkippedByStatus;
    }
    guard.check(url, &result.content).unwrap_or(CacheDecision::Cached)
}

fn record_for(
    task: &UrlTask,
    result: FetchResult,
    config: &GeneratorConfig,
    guard: &CsrfGuard,
    writer: &CacheWriter,
) -> CacheRecord {
    let file_name = file_name_for_url(&task.url, &config.root_url_file_name, config.extension());
    let file_path = writer.path_for(&file_name);
    let decision = decide(&result, config, guard, &task.url);

    let (message, is_cached) = match decision.skip_message() {
        Some(skip) => {
            debug!(url = %task.url, reason = skip, "not cached");
            (skip.to_string(), false)
        }
        None => match writer.write(&file_path, &result.content) {
            Ok(()) => (result.message, true),
            Err(err) => {
                warn!(url = %task.url, error = %err, "write failed");
                (format!("Write failed: {err}"), false)
            }
        },
    };

    CacheRecord {
        url: task.url.clone(),
        status_code: result.status_code,
        message,
        file_name,
        file_path,
        is_cached,
        fetch_method: task.fetch_method,
        decision,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrlEntry;
    use crate::fallback::TABLE_FILENAME;
    use crate::fetch::{AppRequest, AppResponse, HandlerError};
    use crate::routes::Route;
    use crate::test_helpers::{MockClient, MockHandler};
    use crate::types::FetchMethod;
    use std::fs;
    use tempfile::TempDir;

    const CSRF_FORM: &str = r#"<form><input type="hidden" name="_token" value="t"></form>"#;

    fn config_in(tmp: &TempDir) -> GeneratorConfig {
        GeneratorConfig {
            storage_dir: tmp.path().join("static"),
            ..GeneratorConfig::default()
        }
    }

    fn manual(tmp: &TempDir, urls: &[&str]) -> GeneratorConfig {
        GeneratorConfig {
            auto: false,
            urls: urls.iter().map(|u| UrlEntry::from(*u)).collect(),
            ..config_in(tmp)
        }
    }

    fn find<'a>(output: &'a GenerateOutput, url: &str) -> &'a CacheRecord {
        output
            .records
            .iter()
            .find(|r| r.url == url)
            .unwrap_or_else(|| panic!("no record for {url}"))
    }

    // =========================================================================
    // Decisions
    // =========================================================================

    #[test]
    fn ok_page_is_cached_with_content() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new().page("/about", 200, "<h1>About</h1>");
        let config = manual(&tmp, &["/about"]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        let record = find(&output, "/about");
        assert!(record.is_cached);
        assert_eq!(record.decision, CacheDecision::Cached);
        assert_eq!(record.message, "Ok");
        assert_eq!(record.file_name, "about.html");
        assert_eq!(fs::read(&record.file_path).unwrap(), b"<h1>About</h1>");
    }

    #[test]
    fn disallowed_status_is_not_written() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new();
        let config = manual(&tmp, &["/missing"]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        let record = find(&output, "/missing");
        assert!(!record.is_cached);
        assert_eq!(record.status_code, Some(404));
        assert_eq!(record.message, "Skipped by Status Code");
        assert!(!record.file_path.exists());
    }

    #[test]
    fn status_rule_overrides_csrf() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new().page("/gone", 410, CSRF_FORM);
        let config = manual(&tmp, &["/gone"]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        assert_eq!(find(&output, "/gone").decision, CacheDecision::SkippedByStatus);
    }

    #[test]
    fn csrf_page_skipped_in_auto_mode() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new().page("/contact", 200, CSRF_FORM);
        let routes = vec![Route::new("/contact", ["GET"])];
        let config = config_in(&tmp);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &routes, &fetcher).unwrap();

        let record = find(&output, "/contact");
        assert!(!record.is_cached);
        assert_eq!(record.message, "Skipped by CSRF Input");
        assert!(!record.file_path.exists());
    }

    #[test]
    fn csrf_page_cached_in_manual_mode() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new().page("/contact", 200, CSRF_FORM);
        let config = manual(&tmp, &["/contact"]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        assert!(find(&output, "/contact").is_cached);
    }

    #[test]
    fn custom_status_codes_allow_redirects() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new().page("/old", 301, "");
        let config = GeneratorConfig {
            status_codes: vec![200, 301],
            ..manual(&tmp, &["/old"])
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        assert!(find(&output, "/old").is_cached);
    }

    #[test]
    fn fetch_failure_is_recorded_not_raised() {
        let tmp = TempDir::new().unwrap();
        let client = MockClient::new();
        let config = GeneratorConfig {
            fetch_method: FetchMethod::External,
            ..manual(&tmp, &["/down"])
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_client(&client);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        let record = find(&output, "/down");
        assert_eq!(record.status_code, None);
        assert_eq!(record.decision, CacheDecision::SkippedByStatus);
        assert!(!record.is_cached);
    }

    #[test]
    fn write_failure_is_recorded_not_raised() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new()
            .page("/blocker", 200, "file")
            .page("/blocker/child", 200, "child");
        let config = GeneratorConfig {
            static_file_extension: None,
            ..manual(&tmp, &["/blocker", "/blocker/child"])
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        // "/blocker" sorts first and occupies the path "/blocker/child" needs
        assert!(find(&output, "/blocker").is_cached);
        let child = find(&output, "/blocker/child");
        assert!(!child.is_cached);
        assert_eq!(child.decision, CacheDecision::Cached);
        assert!(child.message.starts_with("Write failed:"));
    }

    // =========================================================================
    // Task list
    // =========================================================================

    #[test]
    fn skip_list_removes_tasks_entirely() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new()
            .page("/a", 200, "a")
            .page("/admin", 200, "admin");
        let config = GeneratorConfig {
            skip_urls: vec!["admin/".to_string()],
            ..manual(&tmp, &["/a", "/admin"])
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        assert_eq!(output.records.len(), 1);
        assert!(handler.requests().iter().all(|r| r.url != "/admin"));
        let table = FallbackTable::load(&config.storage_dir);
        assert_eq!(table.get("/admin"), None);
    }

    #[test]
    fn records_follow_sorted_task_order() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new();
        let config = manual(&tmp, &["/c", "/a", "/b"]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        let urls: Vec<&str> = output.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn sequential_run_writes_each_page_before_next_fetch() {
        let tmp = TempDir::new().unwrap();
        let config = manual(&tmp, &["/a", "/b"]);
        let earlier = config.storage_dir.join("a.html");
        let handler = move |request: &AppRequest| -> Result<AppResponse, HandlerError> {
            Ok(match request.url.as_str() {
                "/a" => AppResponse::new(200, "a"),
                _ => AppResponse::new(200, earlier.exists().to_string()),
            })
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        let b = find(&output, "/b");
        assert_eq!(fs::read_to_string(&b.file_path).unwrap(), "true");
    }

    #[test]
    fn parallel_fetch_preserves_order() {
        let tmp = TempDir::new().unwrap();
        let mut handler = MockHandler::new();
        let paths: Vec<String> = (0..20).map(|i| format!("/p{i:02}")).collect();
        for p in &paths {
            handler = handler.page(p, 200, p.as_str());
        }
        let config = GeneratorConfig {
            workers: 4,
            urls: paths.iter().map(|p| UrlEntry::from(p.as_str())).collect(),
            auto: false,
            ..config_in(&tmp)
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();

        let urls: Vec<&str> = output.records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, paths.iter().map(String::as_str).collect::<Vec<_>>());
        for record in &output.records {
            assert_eq!(fs::read_to_string(&record.file_path).unwrap(), record.url);
        }
    }

    // =========================================================================
    // Run-level artifacts
    // =========================================================================

    #[test]
    fn fallback_table_lists_cached_and_uncached() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new()
            .page("/", 200, "home")
            .page("/contact", 200, CSRF_FORM);
        let routes = vec![
            Route::new("/", ["GET", "HEAD"]),
            Route::new("/contact", ["GET", "HEAD"]),
        ];
        let config = config_in(&tmp);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &routes, &fetcher).unwrap();

        assert_eq!(output.fallback_path, config.storage_dir.join(TABLE_FILENAME));
        let table = FallbackTable::load(&config.storage_dir);
        assert_eq!(table.get("/"), Some("_.html"));
        assert_eq!(table.get("/contact"), Some("contact.html"));
        assert_eq!(output.cached().count(), 1);
        assert_eq!(output.not_cached().count(), 1);
    }

    #[test]
    fn gitignore_written_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new();
        let config = manual(&tmp, &[]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        let path = output.gitignore_path.unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "*\n!.gitignore\n");
    }

    #[test]
    fn gitignore_omitted_when_disabled() {
        let tmp = TempDir::new().unwrap();
        let handler = MockHandler::new();
        let config = GeneratorConfig {
            add_gitignore: false,
            ..manual(&tmp, &[])
        };
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let output = generate(&config, &Vec::<Route>::new(), &fetcher).unwrap();
        assert!(output.gitignore_path.is_none());
        assert!(!config.storage_dir.join(".gitignore").exists());
        assert!(output.fallback_path.exists());
    }

    #[test]
    fn unwritable_storage_dir_fails_run() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("static");
        fs::write(&blocker, b"not a directory").unwrap();
        let handler = MockHandler::new();
        let config = manual(&tmp, &[]);
        let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);

        let result = generate(&config, &Vec::<Route>::new(), &fetcher);
        assert!(matches!(result, Err(GenerateError::Cache(_))));
    }

    #[test]
    fn external_only_run_fails_in_process_tasks() {
        let tmp = TempDir::new().unwrap();
        let config = manual(&tmp, &["/app"]);

        let output = generate_external(&config, &Vec::<Route>::new()).unwrap();

        let record = find(&output, "/app");
        assert_eq!(record.status_code, None);
        assert!(!record.is_cached);
    }
}
