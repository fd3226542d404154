//! Route selection.
//!
//! Picks the route that owns an incoming request path.

use crate::config::{PathMatcher, RouteConfig};
use regex::Regex;

/// Routes with their compiled context matchers, highest priority first.
pub struct RouteTable {
    routes: Vec<(RouteConfig, CompiledPathMatcher)>,
}

enum CompiledPathMatcher {
    Exact(String),
    Prefix(String),
    Regex(Regex),
    Glob(globset::GlobMatcher),
}

impl CompiledPathMatcher {
    fn compile(matcher: &PathMatcher) -> anyhow::Result<Self> {
        Ok(match matcher {
            PathMatcher::Exact { value } => CompiledPathMatcher::Exact(value.clone()),
            PathMatcher::Prefix { value } => CompiledPathMatcher::Prefix(value.clone()),
            PathMatcher::Regex { pattern } => CompiledPathMatcher::Regex(Regex::new(pattern)?),
            PathMatcher::Glob { pattern } => {
                CompiledPathMatcher::Glob(globset::Glob::new(pattern)?.compile_matcher())
            }
        })
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            CompiledPathMatcher::Exact(value) => path == value,
            CompiledPathMatcher::Prefix(value) => path.starts_with(value.as_str()),
            CompiledPathMatcher::Regex(regex) => regex.is_match(path),
            CompiledPathMatcher::Glob(glob) => glob.is_match(path),
        }
    }
}

impl RouteTable {
    /// Compile the route contexts. Disabled routes are dropped.
    pub fn new(routes: &[RouteConfig]) -> anyhow::Result<Self> {
        let mut compiled = Vec::with_capacity(routes.len());
        for route in routes.iter().filter(|r| r.enabled) {
            let matcher = CompiledPathMatcher::compile(&route.context)
                .map_err(|e| anyhow::anyhow!("Route {}: {}", route.name, e))?;
            compiled.push((route.clone(), matcher));
        }

        // Stable sort keeps declaration order among equal priorities.
        compiled.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));

        Ok(Self { routes: compiled })
    }

    /// Find the route owning `path` (without query string).
    pub fn find(&self, path: &str) -> Option<&RouteConfig> {
        self.routes
            .iter()
            .find(|(_, matcher)| matcher.matches(path))
            .map(|(route, _)| route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
