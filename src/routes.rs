use crate::config::ConfigError;
use std::collections::HashSet;

/// One static prefix -> backend mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub prefix: String,
    pub target: String,
    pub protected: bool,
    // label used in logs, metrics and error messages
    pub name: String,
}

impl Route {
    pub fn new(prefix: &str, target: &str, protected: bool) -> Self {
        let prefix = normalize_prefix(prefix);
        let name = prefix
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("root")
            .to_string();

        Self {
            prefix,
            target: target.trim_end_matches('/').to_string(),
            protected,
            name,
        }
    }

    // Remainder of `path` after this prefix, only on a segment boundary
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') || self.prefix.ends_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[derive(Debug)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    // prefix-stripped path with the original query string
    pub path: String,
}

/// Immutable route table, searched longest-prefix-first.
///
/// `/api/service1/special/x` therefore always lands on
/// `/api/service1/special` even when `/api/service1` is declared first.
/// Two routes may not share a prefix.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(mut routes: Vec<Route>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::with_capacity(routes.len());
        for route in &routes {
            if !seen.insert(route.prefix.as_str()) {
                return Err(ConfigError::DuplicatePrefix(route.prefix.clone()));
            }
        }

        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { routes })
    }

    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<RouteMatch<'_>> {
        self.routes.iter().find_map(|route| {
            let rest = route.strip(path)?;
            let mut rewritten = if rest.starts_with('/') {
                rest.to_string()
            } else {
                format!("/{rest}")
            };
            if let Some(query) = query {
                rewritten.push('?');
                rewritten.push_str(query);
            }
            Some(RouteMatch {
                route,
                path: rewritten,
            })
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
