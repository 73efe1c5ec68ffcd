//! Shared test doubles for the fetch collaborators.
//!
//! Both mocks record every call behind a `Mutex` so tests can assert on
//! what the pipeline asked for, even when fetching runs on a worker pool.
//!
//! ```ignore
//! use crate::test_helpers::*;
//!
//! let handler = MockHandler::new().page("/about", 200, "<h1>About</h1>");
//! let fetcher = ContentFetcher::new(&config).unwrap().with_handler(&handler);
//! fetcher.fetch(&task);
//! assert_eq!(handler.requests()[0].url, "/about");
//! ```

use std::collections::HashMap;
use std::sync::Mutex;

use crate::fetch::{
    AppHandler, AppRequest, AppResponse, FetchError, HandlerError, HttpClient, HttpResponse,
};

// =========================================================================
// In-process application
// =========================================================================

/// Application that serves canned pages by URL and answers 404 otherwise.
#[derive(Default)]
pub struct MockHandler {
    pages: HashMap<String, (u16, Vec<u8>)>,
    requests: Mutex<Vec<AppRequest>>,
}

impl MockHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for `url`.
    pub fn page(mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.pages.insert(url.to_string(), (status, body.into()));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<AppRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl AppHandler for MockHandler {
    fn handle(&self, request: &AppRequest) -> Result<AppResponse, HandlerError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(match self.pages.get(&request.url) {
            Some((status, body)) => AppResponse::new(*status, body.clone()),
            None => AppResponse::new(404, "Not Found"),
        })
    }
}

// =========================================================================
// External HTTP
// =========================================================================

/// Client that answers by URL path and fails with a transport error for
/// any path it does not know.
#[derive(Default)]
pub struct MockClient {
    responses: HashMap<String, HttpResponse>,
    requested: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canned response for requests whose path is `path`.
    pub fn respond(mut self, path: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(
            path.to_string(),
            HttpResponse {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Full URLs requested so far, in arrival order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl HttpClient for MockClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        let path = url::Url::parse(url)?.path().to_string();
        self.responses
            .get(&path)
            .cloned()
            .ok_or_else(|| FetchError::Transport(format!("connection refused: {url}")))
    }
}
