//! Route registry access and auto-discovery filtering.
//!
//! The host application owns its routes; the generator only reads them
//! through [`RouteRegistry`]. A plain `Vec<Route>` is a registry, and the
//! CLI builds one from a routes file:
//!
//! ```toml
//! [[routes]]
//! uri = "/"
//! methods = ["GET", "HEAD"]
//!
//! [[routes]]
//! uri = "/posts/{slug}"
//! methods = ["GET"]
//! ```

use crate::config::{ConfigError, GeneratorConfig};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// A registered route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub uri: String,
    pub methods: BTreeSet<String>,
    pub parameter_names: Vec<String>,
}

impl Route {
    /// Build a route, deriving parameter names from `{name}` / `{name?}`
    /// placeholders in `uri`.
    pub fn new<I, S>(uri: &str, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uri: uri.to_string(),
            methods: methods.into_iter().map(Into::into).collect(),
            parameter_names: parameter_names(uri),
        }
    }

    pub fn is_parameterized(&self) -> bool {
        !self.parameter_names.is_empty()
    }

    /// Whether any of the route's methods appears in `allowed`, ignoring case.
    pub fn accepts_any(&self, allowed: &[String]) -> bool {
        self.methods
            .iter()
            .any(|m| allowed.iter().any(|a| a.eq_ignore_ascii_case(m)))
    }
}

/// Extract placeholder names from a route pattern, in order of appearance.
fn parameter_names(uri: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = uri;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        let name = after[..close].trim_end_matches('?');
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &after[close + 1..];
    }
    names
}

/// Read-only access to the host application's routes.
pub trait RouteRegistry {
    fn routes(&self) -> &[Route];
}

impl RouteRegistry for [Route] {
    fn routes(&self) -> &[Route] {
        self
    }
}

impl RouteRegistry for Vec<Route> {
    fn routes(&self) -> &[Route] {
        self
    }
}

/// Filter the registry down to URLs eligible for auto-discovery.
///
/// A route qualifies when it accepts one of `auto_request_methods` and,
/// if `auto_skip_parameterized` is set, has no path parameters. URIs are
/// returned as registered; normalization happens during resolution.
pub fn discover_urls<R>(registry: &R, config: &GeneratorConfig) -> Vec<String>
where
    R: RouteRegistry + ?Sized,
{
    registry
        .routes()
        .iter()
        .filter(|route| route.accepts_any(&config.auto_request_methods))
        .filter(|route| !(config.auto_skip_parameterized && route.is_parameterized()))
        .map(|route| route.uri.clone())
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouteEntry {
    uri: String,
    #[serde(default = "default_methods")]
    methods: Vec<String>,
}

fn default_methods() -> Vec<String> {
    vec!["GET".to_string(), "HEAD".to_string()]
}

/// Load a route list from a TOML routes file.
///
/// Entries without `methods` accept `GET` and `HEAD`.
pub fn load_routes(path: &Path) -> Result<Vec<Route>, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_routes(&content)
}

fn parse_routes(content: &str) -> Result<Vec<Route>, ConfigError> {
    let file: RoutesFile = toml::from_str(content)?;
    Ok(file
        .routes
        .into_iter()
        .map(|entry| Route::new(&entry.uri, entry.methods))
        .collect())
}
