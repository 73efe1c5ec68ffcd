//! URL task resolution.
//!
//! Merges discovered routes and the explicit URL list into one sorted,
//! deduplicated list of [`UrlTask`]s. Discovered URLs go in first with the
//! default fetch method, explicit entries second, keyed by normalized URL,
//! so an explicit entry replaces a discovered one (and may change its
//! fetch method). The skip list is deliberately left to the pipeline.

use crate::config::GeneratorConfig;
use crate::naming::normalize_url;
use crate::routes::{RouteRegistry, discover_urls};
use crate::types::UrlTask;
use std::collections::BTreeMap;

/// Resolve the ordered task list for a run.
pub fn resolve_tasks<R>(registry: &R, config: &GeneratorConfig) -> Vec<UrlTask>
where
    R: RouteRegistry + ?Sized,
{
    let mut tasks: BTreeMap<String, UrlTask> = BTreeMap::new();

    if config.auto {
        for uri in discover_urls(registry, config) {
            let url = normalize_url(&uri);
            tasks.insert(
                url.clone(),
                UrlTask {
                    url,
                    fetch_method: config.fetch_method,
                },
            );
        }
    }

    for entry in &config.urls {
        let url = normalize_url(entry.url());
        tasks.insert(
            url.clone(),
            UrlTask {
                url,
                fetch_method: entry.method().unwrap_or(config.fetch_method),
            },
        );
    }

    // BTreeMap iteration is byte-wise sorted by URL
    tasks.into_values().collect()
}
