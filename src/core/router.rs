//! Route table: every configured HTTP rule (and, for gRPC backends, every API
//! method) compiled into a [`PathMatcher`], resolved per request with the
//! specificity ranker.
//!
//! A rule whose template fails to parse is logged and recorded in
//! [`RouteTable::rejected`]; it never prevents the remaining rules from loading.
use std::{fmt, sync::Arc};

use http::Method;

use crate::{
    config::models::{BackendProtocol, ServiceConfig},
    core::httppattern::{Bindings, PathMatcher, select_most_specific},
};

/// HTTP method constraint of a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodFilter {
    Any,
    Exact(Method),
}

impl MethodFilter {
    /// `*` means any method; anything else is matched case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == "*" {
            return Some(Self::Any);
        }
        Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
            .ok()
            .map(Self::Exact)
    }

    pub fn allows(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Exact(expected) => expected == method,
        }
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("*"),
            MethodFilter::Exact(method) => write!(f, "{method}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSource {
    HttpRule,
    Grpc,
}

/// One compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub selector: Arc<str>,
    pub method: MethodFilter,
    pub matcher: PathMatcher,
    pub source: RouteSource,
}

/// A rule that did not make it into the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRule {
    pub selector: String,
    pub pattern: String,
    pub reason: String,
}

impl fmt::Display for RejectedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.selector, self.pattern, self.reason)
    }
}

/// Result of resolving one request.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a Route,
    pub bindings: Bindings,
    /// Set when an `OPTIONS` request was answered by the CORS preflight fallback.
    pub preflight: bool,
}

/// Immutable routing table for one configuration generation.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
    rejected: Vec<RejectedRule>,
    cors_preflight: bool,
}

impl RouteTable {
    /// Compile all rules of `service`. Routes keep declaration order: HTTP
    /// rules (with their additional bindings) first, then gRPC method paths.
    pub fn build(
        service: &ServiceConfig,
        protocol: Option<BackendProtocol>,
        cors_preflight: bool,
    ) -> Self {
        let mut table = Self {
            cors_preflight,
            ..Self::default()
        };

        for rule in &service.http_rules {
            let bindings = std::iter::once((&rule.method, &rule.pattern)).chain(
                rule.additional_bindings
                    .iter()
                    .map(|b| (&b.method, &b.pattern)),
            );
            for (method, pattern) in bindings {
                table.add(&rule.selector, method, pattern, RouteSource::HttpRule);
            }
        }

        if protocol == Some(BackendProtocol::Grpc) {
            for api in &service.apis {
                for method in &api.methods {
                    let selector = format!("{}.{}", api.name, method);
                    let path = format!("/{}/{}", api.name, method);
                    table.add(&selector, "POST", &path, RouteSource::Grpc);
                }
            }
        }

        tracing::info!(
            routes = table.routes.len(),
            rejected = table.rejected.len(),
            cors_preflight,
            "route table compiled"
        );

        table
    }

    fn add(&mut self, selector: &str, method: &str, pattern: &str, source: RouteSource) {
        let Some(method_filter) = MethodFilter::parse(method) else {
            self.reject(selector, pattern, format!("invalid HTTP method '{method}'"));
            return;
        };

        match PathMatcher::parse(pattern) {
            Ok(matcher) => {
                tracing::debug!(
                    selector,
                    method = %method_filter,
                    template = pattern,
                    pattern = matcher.pattern(),
                    exact_literal = matcher.is_exact_literal(),
                    "route compiled"
                );
                self.routes.push(Route {
                    selector: Arc::from(selector),
                    method: method_filter,
                    matcher,
                    source,
                });
            }
            Err(e) => self.reject(selector, pattern, e.to_string()),
        }
    }

    fn reject(&mut self, selector: &str, pattern: &str, reason: String) {
        tracing::warn!(selector, template = pattern, %reason, "route rejected");
        self.rejected.push(RejectedRule {
            selector: selector.to_string(),
            pattern: pattern.to_string(),
            reason,
        });
    }

    /// Find the single route governing `method path`.
    ///
    /// `OPTIONS` requests with no explicit route fall back to a CORS preflight
    /// match against routes of any method, when CORS is enabled.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        if let Some(found) = self.best_match(path, |route| route.method.allows(method)) {
            return Some(found);
        }

        if self.cors_preflight && method == Method::OPTIONS {
            return self.best_match(path, |_| true).map(|found| RouteMatch {
                preflight: true,
                ..found
            });
        }

        None
    }

    fn best_match(&self, path: &str, accept: impl Fn(&Route) -> bool) -> Option<RouteMatch<'_>> {
        let candidates = self
            .routes
            .iter()
            .filter(|route| accept(*route))
            .filter_map(|route| {
                route.matcher.matches(path).map(|bindings| {
                    (
                        route.matcher.specificity(),
                        RouteMatch {
                            route,
                            bindings,
                            preflight: false,
                        },
                    )
                })
            });
        select_most_specific(candidates)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn rejected(&self) -> &[RejectedRule] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
