//! Segment router for the minimal engine.

use std::sync::Arc;

use http::Method;

use crate::core::{HandlerFunc, RouteTable};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

#[derive(Debug)]
struct CompiledRoute {
    method: Method,
    segments: Vec<Segment>,
    handlers: Arc<[HandlerFunc]>,
}

impl CompiledRoute {
    /// Captured params when `path` matches, plus a specificity score.
    fn matches(&self, path: &[&str]) -> Option<(Vec<(String, String)>, usize)> {
        let mut params = Vec::new();
        let mut score = 0;
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Wildcard(name) => {
                    if i >= path.len() {
                        return None;
                    }
                    params.push((name.clone(), path[i..].join("/")));
                    return Some((params, score));
                }
                Segment::Static(expected) => {
                    if path.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                    score += 2;
                }
                Segment::Param(name) => {
                    let value = path.get(i)?;
                    params.push((name.clone(), (*value).to_string()));
                    score += 1;
                }
            }
        }
        (self.segments.len() == path.len()).then_some((params, score))
    }
}

/// Outcome of routing one request.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Full chain: global middleware followed by the route's handlers.
    pub handlers: Arc<[HandlerFunc]>,
    pub params: Vec<(String, String)>,
}

/// Compiled routes plus fallback chains.
#[derive(Debug)]
pub struct MinimalRouter {
    routes: Vec<CompiledRoute>,
    no_route: Arc<[HandlerFunc]>,
    no_method: Arc<[HandlerFunc]>,
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn chain(middleware: &[HandlerFunc], handlers: Vec<HandlerFunc>) -> Arc<[HandlerFunc]> {
    middleware.iter().cloned().chain(handlers).collect()
}

impl MinimalRouter {
    pub fn compile(table: &RouteTable) -> Self {
        let routes = table
            .routes
            .iter()
            .map(|route| CompiledRoute {
                method: route.method.as_method(),
                segments: split(&route.path)
                    .into_iter()
                    .map(|s| {
                        if let Some(name) = s.strip_prefix(':') {
                            Segment::Param(name.to_string())
                        } else if let Some(name) = s.strip_prefix('*') {
                            Segment::Wildcard(name.to_string())
                        } else {
                            Segment::Static(s.to_string())
                        }
                    })
                    .collect(),
                handlers: chain(&table.middleware, route.handlers.clone()),
            })
            .collect();

        Self {
            routes,
            no_route: chain(&table.middleware, table.no_route_handlers()),
            no_method: chain(&table.middleware, table.no_method_handlers()),
        }
    }

    /// Pick the most specific route for `method` and `path`, falling back to
    /// the NoMethod chain when only the method differs and NoRoute otherwise.
    pub fn resolve(&self, method: &Method, path: &str) -> Resolved {
        let segments = split(path);
        let mut best: Option<(&CompiledRoute, Vec<(String, String)>, usize)> = None;
        let mut path_matched = false;

        for route in &self.routes {
            let Some((params, score)) = route.matches(&segments) else {
                continue;
            };
            path_matched = true;
            if &route.method != method {
                continue;
            }
            if best.as_ref().map_or(true, |(_, _, s)| score > *s) {
                best = Some((route, params, score));
            }
        }

        match best {
            Some((route, params, _)) => Resolved {
                handlers: route.handlers.clone(),
                params,
            },
            None if path_matched => Resolved {
                handlers: self.no_method.clone(),
                params: Vec::new(),
            },
            None => Resolved {
                handlers: self.no_route.clone(),
                params: Vec::new(),
            },
        }
    }
}
