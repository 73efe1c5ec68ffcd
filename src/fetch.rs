//! Content acquisition.
//!
//! A [`ContentFetcher`] turns a [`UrlTask`] into a [`FetchResult`] using one
//! of two collaborators, picked per task by its [`FetchMethod`]:
//!
//! - [`AppHandler`]: the application's request entry point, called
//!   in-process with a synthetic `GET` request.
//! - [`HttpClient`]: a blocking HTTP client hitting the running application.
//!   [`ReqwestClient`] is the production implementation; it never follows
//!   redirects, so a `3xx` is recorded exactly as a first-time visitor
//!   would receive it.
//!
//! Fetching never fails. Handler errors, handler panics and transport
//! errors all come back as a `FetchResult` with empty content and the
//! failure in `message`, so one broken route cannot abort a run.

use crate::config::GeneratorConfig;
use crate::types::{FetchMethod, UrlTask};
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Query argument appended to external fetches. A fallback shim seeing it
/// lets the request through to the application instead of serving the cache.
pub const SKIP_MARKER: &str = "skipStaticFileInclude";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Transport error: {0}")]
    Transport(String),
}

/// What came back for one URL. `status_code` is `None` when no response
/// was received at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub content: Vec<u8>,
    pub status_code: Option<u16>,
    pub message: String,
}

impl FetchResult {
    pub fn ok(content: Vec<u8>, status_code: u16) -> Self {
        Self {
            content,
            status_code: Some(status_code),
            message: "Ok".to_string(),
        }
    }

    pub fn failed(status_code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            status_code,
            message: message.into(),
        }
    }
}

/// Synthetic request handed to the in-process application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRequest {
    pub method: String,
    pub url: String,
    /// Value for the `Host` header.
    pub host: String,
}

/// Structured response from the in-process application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Output the handler wrote directly instead of through the response.
    pub echo: Vec<u8>,
}

impl AppResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            echo: Vec::new(),
        }
    }

    pub fn with_echo(mut self, echo: impl Into<Vec<u8>>) -> Self {
        self.echo = echo.into();
        self
    }
}

/// Failure raised by the application while handling a request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HandlerError {
    pub code: Option<u16>,
    pub message: String,
}

impl HandlerError {
    pub fn new(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The application's single request entry point.
///
/// `Sync` so tasks can be fetched from a worker pool.
pub trait AppHandler: Sync {
    fn handle(&self, request: &AppRequest) -> Result<AppResponse, HandlerError>;
}

impl<F> AppHandler for F
where
    F: Fn(&AppRequest) -> Result<AppResponse, HandlerError> + Sync,
{
    fn handle(&self, request: &AppRequest) -> Result<AppResponse, HandlerError> {
        self(request)
    }
}

/// Response from an external fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Blocking GET without redirect following.
pub trait HttpClient: Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
}

/// [`HttpClient`] backed by `reqwest`'s blocking client.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("prerender/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, FetchError> {
        Self::new(Duration::from_secs(config.fetch_timeout_secs))
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self.client.get(url).send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Dispatches each task to the collaborator matching its fetch method.
pub struct ContentFetcher<'a> {
    base_url: Url,
    host: String,
    prepend_echo: bool,
    handler: Option<&'a dyn AppHandler>,
    client: Option<&'a dyn HttpClient>,
}

impl<'a> ContentFetcher<'a> {
    /// Create a fetcher with no collaborators attached.
    pub fn new(config: &GeneratorConfig) -> Result<Self, FetchError> {
        let base_url = Url::parse(&config.base_url)?;
        let host = match (base_url.host_str(), base_url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        };
        Ok(Self {
            base_url,
            host,
            prepend_echo: config.prepend_echo_content,
            handler: None,
            client: None,
        })
    }

    /// Attach the in-process application handler.
    pub fn with_handler(mut self, handler: &'a dyn AppHandler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach the HTTP client used for external fetches.
    pub fn with_client(mut self, client: &'a dyn HttpClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Fetch one task. Never fails; see the module docs.
    pub fn fetch(&self, task: &UrlTask) -> FetchResult {
        debug!(url = %task.url, method = %task.fetch_method, "fetching");
        let result = match task.fetch_method {
            FetchMethod::InProcess => self.fetch_in_process(&task.url),
            FetchMethod::External => self.fetch_external(&task.url),
        };
        if result.status_code.is_none() || result.message != "Ok" {
            warn!(url = %task.url, message = %result.message, "fetch failed");
        }
        result
    }

    fn fetch_in_process(&self, url: &str) -> FetchResult {
        let Some(handler) = self.handler else {
            return FetchResult::failed(None, "No application handler for in-process fetch");
        };
        let request = AppRequest {
            method: "GET".to_string(),
            url: url.to_string(),
            host: self.host.clone(),
        };
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&request))) {
            Ok(Ok(response)) => {
                let mut content = if self.prepend_echo {
                    response.echo
                } else {
                    Vec::new()
                };
                content.extend_from_slice(&response.body);
                FetchResult::ok(content, response.status)
            }
            Ok(Err(err)) => FetchResult::failed(err.code, err.message),
            Err(payload) => FetchResult::failed(Some(500), panic_message(payload.as_ref())),
        }
    }

    fn fetch_external(&self, url: &str) -> FetchResult {
        let Some(client) = self.client else {
            return FetchResult::failed(None, "No HTTP client for external fetch");
        };
        let target = self.external_url(url);
        match client.get(target.as_str()) {
            Ok(response) => FetchResult::ok(response.body, response.status),
            Err(err) => FetchResult::failed(None, err.to_string()),
        }
    }

    /// Fully-qualified URL for an external fetch, with [`SKIP_MARKER`] appended.
    ///
    /// `url` is appended to the base URL's path, so an application mounted
    /// under a prefix (`http://host/app`) is fetched at `/app/<url>`.
    pub fn external_url(&self, url: &str) -> Url {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (url, None),
        };
        let mut target = self.base_url.clone();
        let prefix = target.path().trim_end_matches('/').to_string();
        target.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
        target.set_fragment(None);
        let query = match query {
            Some(q) if !q.is_empty() => format!("{q}&{SKIP_MARKER}"),
            _ => SKIP_MARKER.to_string(),
        };
        target.set_query(Some(&query));
        target
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Handler panicked: {s}")
    } else {
        "Handler panicked".to_string()
    }
}
