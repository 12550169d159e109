//! Dynamic content generators
//!
//! A generator turns a request into a fully buffered response body. The
//! dispatcher runs generators on the blocking pool, so a generator may read
//! watchables or do slow work without stalling other connections.

use axum::http::{Method, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::watchable::{WatchError, WatchRegistry};

/// Everything a generator gets to see about a request
pub struct GeneratorRequest {
    /// Request path as received
    pub path: String,
    pub method: Method,
    /// Values captured by `{name}` segments of the route pattern
    pub params: HashMap<String, String>,
    /// Decoded query string
    pub query: HashMap<String, String>,
    pub registry: Arc<WatchRegistry>,
}

/// A generated response
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedContent {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl GeneratedContent {
    pub fn new(content_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new("text/html; charset=utf-8", body.into())
    }

    pub fn text(body: impl Into<String>) -> Self {
        Self::new("text/plain; charset=utf-8", body.into())
    }

    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self, GeneratorError> {
        let body = serde_json::to_vec(value).map_err(|e| GeneratorError::Failed(e.to_string()))?;
        Ok(Self::new("application/json", body))
    }

    /// Builder method: set the status code
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

/// Errors raised by generators
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Produces the body of a dynamic route
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, request: &GeneratorRequest) -> Result<GeneratedContent, GeneratorError>;
}

impl<F> ContentGenerator for F
where
    F: Fn(&GeneratorRequest) -> Result<GeneratedContent, GeneratorError> + Send + Sync,
{
    fn generate(&self, request: &GeneratorRequest) -> Result<GeneratedContent, GeneratorError> {
        self(request)
    }
}

/// Named generators that dynamic routes refer to
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn ContentGenerator>>,
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("generators", &self.names())
            .finish()
    }
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `index` and `values` generators
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert("index", super::pages::index_page);
        registry.insert("values", super::pages::values_json);
        registry
    }

    /// Add or replace a generator
    pub fn insert<G>(&mut self, name: impl Into<String>, generator: G)
    where
        G: ContentGenerator + 'static,
    {
        self.generators.insert(name.into(), Arc::new(generator));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ContentGenerator>> {
        self.generators.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GeneratorRequest {
        GeneratorRequest {
            path: "/hello".to_string(),
            method: Method::GET,
            params: HashMap::from([("name".to_string(), "world".to_string())]),
            query: HashMap::new(),
            registry: Arc::new(WatchRegistry::standalone()),
        }
    }

    #[test]
    fn test_closure_generator() {
        let mut registry = GeneratorRegistry::new();
        registry.insert("hello", |req: &GeneratorRequest| {
            Ok(GeneratedContent::text(format!("hello {}", req.params["name"])))
        });

        let generator = registry.get("hello").unwrap();
        let content = generator.generate(&request()).unwrap();
        assert_eq!(content.body, b"hello world");
        assert_eq!(content.status, StatusCode::OK);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_builtins_registered() {
        assert_eq!(GeneratorRegistry::with_builtins().names(), vec!["index", "values"]);
    }

    #[test]
    fn test_json_content() {
        let content = GeneratedContent::json(&serde_json::json!({"a": 1}))
            .unwrap()
            .with_status(StatusCode::CREATED);
        assert_eq!(content.content_type, "application/json");
        assert_eq!(content.status, StatusCode::CREATED);
        assert_eq!(content.body, br#"{"a":1}"#);
    }
}
