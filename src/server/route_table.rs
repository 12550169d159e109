//! Route table
//!
//! Built once from configuration and immutable afterwards. Dynamic and
//! redirect routes match the whole path, either exactly or through
//! `{param}` segments; exact routes win over patterns. File and live routes
//! match a path prefix on segment boundaries and the longest prefix wins.

use axum::http::Method;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::generator::{ContentGenerator, GeneratorRegistry};
use crate::config::{ConfigError, RouteConfig, RouteTarget};

/// What a matched route does
#[derive(Clone)]
pub enum RouteKind {
    /// Files below `root`, with ETag support
    StaticFiles { root: PathBuf },
    /// Files below `root`, streamed in chunks
    FileStream { root: PathBuf },
    /// A named generator
    Dynamic {
        name: String,
        generator: Arc<dyn ContentGenerator>,
    },
    /// Server-Sent Events for the watchable named by the rest of the path
    Live,
    /// Permanent redirect
    Redirect { location: String },
}

impl RouteKind {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            RouteKind::StaticFiles { .. } => "static",
            RouteKind::FileStream { .. } => "stream",
            RouteKind::Dynamic { .. } => "dynamic",
            RouteKind::Live => "live",
            RouteKind::Redirect { .. } => "redirect",
        }
    }

    fn is_prefix(&self) -> bool {
        matches!(
            self,
            RouteKind::StaticFiles { .. } | RouteKind::FileStream { .. } | RouteKind::Live
        )
    }
}

impl fmt::Debug for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::StaticFiles { root } => f.debug_struct("StaticFiles").field("root", root).finish(),
            RouteKind::FileStream { root } => f.debug_struct("FileStream").field("root", root).finish(),
            RouteKind::Dynamic { name, .. } => f.debug_struct("Dynamic").field("name", name).finish(),
            RouteKind::Live => write!(f, "Live"),
            RouteKind::Redirect { location } => {
                f.debug_struct("Redirect").field("location", location).finish()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternSegment {
    Literal(String),
    Param(String),
}

/// One registered route
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: String,
    segments: Vec<PatternSegment>,
    pub kind: RouteKind,
    pub methods: Vec<Method>,
}

impl Route {
    fn is_exact(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PatternSegment::Literal(_)))
    }

    /// True if the route accepts `method`
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }
}

/// Result of a successful lookup
#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    /// Captured `{param}` values
    pub params: HashMap<String, String>,
    /// For prefix routes: the path below the prefix, without a leading `/`
    pub rest: String,
}

/// Immutable route table
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn parse_pattern(path: &str) -> Vec<PatternSegment> {
    split_segments(path)
        .into_iter()
        .map(|seg| {
            match seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => PatternSegment::Param(name.to_string()),
                None => PatternSegment::Literal(seg.to_string()),
            }
        })
        .collect()
}

fn parse_methods(route: &RouteConfig) -> Result<Vec<Method>, ConfigError> {
    let names: Vec<&str> = if route.methods.is_empty() {
        vec!["GET", "HEAD"]
    } else {
        route.methods.iter().map(String::as_str).collect()
    };

    let mut methods = Vec::new();
    for name in names {
        let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes()).map_err(|_| {
            ConfigError::Definition {
                what: "route",
                path: route.path.clone(),
                reason: format!("unknown method '{}'", name),
            }
        })?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    // HEAD is answered wherever GET is
    if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
        methods.push(Method::HEAD);
    }
    Ok(methods)
}

impl RouteTable {
    /// Build the table from route definitions
    ///
    /// Relative file roots are taken from `document_root`. Unknown generators
    /// and duplicate paths are configuration errors.
    pub fn build(
        configs: &[RouteConfig],
        document_root: &Path,
        generators: &GeneratorRegistry,
    ) -> Result<Self, ConfigError> {
        let resolve_root = |root: &Option<PathBuf>| match root {
            None => document_root.to_path_buf(),
            Some(p) if p.is_absolute() => p.clone(),
            Some(p) => document_root.join(p),
        };

        let mut routes: Vec<Route> = Vec::with_capacity(configs.len());
        for config in configs {
            let segments = parse_pattern(&config.path);
            if routes.iter().any(|r| r.segments == segments) {
                return Err(ConfigError::Definition {
                    what: "route",
                    path: config.path.clone(),
                    reason: "path is already routed".to_string(),
                });
            }

            let kind = match &config.target {
                RouteTarget::Static { root } => RouteKind::StaticFiles {
                    root: resolve_root(root),
                },
                RouteTarget::Stream { root } => RouteKind::FileStream {
                    root: resolve_root(root),
                },
                RouteTarget::Dynamic { generator } => RouteKind::Dynamic {
                    name: generator.clone(),
                    generator: generators.get(generator).ok_or_else(|| {
                        ConfigError::Definition {
                            what: "route",
                            path: config.path.clone(),
                            reason: format!(
                                "unknown generator '{}' (known: {})",
                                generator,
                                generators.names().join(", ")
                            ),
                        }
                    })?,
                },
                RouteTarget::Live => RouteKind::Live,
                RouteTarget::Redirect { location } => RouteKind::Redirect {
                    location: location.clone(),
                },
            };

            if kind.is_prefix() && segments.iter().any(|s| matches!(s, PatternSegment::Param(_))) {
                return Err(ConfigError::Definition {
                    what: "route",
                    path: config.path.clone(),
                    reason: format!("{} routes cannot have parameters", kind.name()),
                });
            }

            tracing::debug!(path = %config.path, kind = kind.name(), "Route registered");
            routes.push(Route {
                pattern: config.path.clone(),
                segments,
                methods: parse_methods(config)?,
                kind,
            });
        }

        Ok(Self { routes })
    }

    /// Find the route for a request path
    pub fn lookup(&self, path: &str) -> Option<RouteMatch<'_>> {
        let request = split_segments(path);

        // Whole-path routes: exact first, then patterns
        let whole = self.routes.iter().filter(|r| !r.kind.is_prefix());
        let exact = whole
            .clone()
            .filter(|r| r.is_exact())
            .find_map(|r| Self::match_whole(r, &request));
        let pattern = || {
            whole
                .clone()
                .filter(|r| !r.is_exact())
                .find_map(|r| Self::match_whole(r, &request))
        };
        if let Some(found) = exact.or_else(pattern) {
            return Some(found);
        }

        // Prefix routes: longest prefix wins
        self.routes
            .iter()
            .filter(|r| r.kind.is_prefix())
            .filter(|r| {
                r.segments.len() <= request.len()
                    && r.segments.iter().zip(&request).all(|(s, seg)| match s {
                        PatternSegment::Literal(lit) => lit == seg,
                        PatternSegment::Param(_) => false,
                    })
            })
            .max_by_key(|r| r.segments.len())
            .map(|route| RouteMatch {
                route,
                params: HashMap::new(),
                rest: request[route.segments.len()..].join("/"),
            })
    }

    fn match_whole<'a>(route: &'a Route, request: &[&str]) -> Option<RouteMatch<'a>> {
        if route.segments.len() != request.len() {
            return None;
        }
        let mut params = HashMap::new();
        for (segment, actual) in route.segments.iter().zip(request) {
            match segment {
                PatternSegment::Literal(lit) if lit == actual => {}
                PatternSegment::Literal(_) => return None,
                PatternSegment::Param(name) => {
                    let value = urlencoding::decode(actual)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| actual.to_string());
                    params.insert(name.clone(), value);
                }
            }
        }
        Some(RouteMatch {
            route,
            params,
            rest: String::new(),
        })
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
