//! Core gateway orchestration service.
//!
//! A [`GatewaySnapshot`] bundles everything derived from one configuration:
//! the route table, JWT requirements, backend router, CORS policy and the
//! service-control call policy. [`GatewayService`] publishes snapshots through
//! an `ArcSwap`, so readers never observe a half-built generation and a reload
//! never blocks request handling.
//!
//! This layer performs no I/O.
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use arc_swap::ArcSwap;
use http::Method;
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::GatewayConfig,
    core::{
        auth::{AuthRequirement, JwtRequirementTable},
        backend_routing::{BackendRoute, BackendRouter},
        cors::{CorsError, CorsPolicy},
        httppattern::Bindings,
        router::{RejectedRule, RouteTable},
        service_control::ServiceControlPolicy,
    },
};

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid CORS configuration: {0}")]
    Cors(#[from] CorsError),
}

/// Enforcement decision for one request.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDecision {
    pub generation: u64,
    pub selector: String,
    pub method: String,
    pub template: String,
    pub bindings: Bindings,
    pub preflight: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRequirement>,
    pub backend: BackendRoute,
}

/// Immutable, fully built state for one configuration generation.
#[derive(Debug)]
pub struct GatewaySnapshot {
    generation: u64,
    config: Arc<GatewayConfig>,
    routes: RouteTable,
    auth: JwtRequirementTable,
    backends: BackendRouter,
    cors: Option<CorsPolicy>,
    service_control: ServiceControlPolicy,
}

impl GatewaySnapshot {
    pub fn build(config: Arc<GatewayConfig>, generation: u64) -> Result<Self, GatewayError> {
        let cors = CorsPolicy::from_config(&config.cors)?;
        let routes = RouteTable::build(&config.service, config.backend_protocol, cors.is_some());
        let auth = JwtRequirementTable::build(
            &config.service.authentication,
            &config.service_name,
            config.jwks_cache_duration(),
        );
        let backends = BackendRouter::build(&config);
        let service_control = ServiceControlPolicy::from_config(&config.service_control);

        Ok(Self {
            generation,
            config,
            routes,
            auth,
            backends,
            cors,
            service_control,
        })
    }

    /// Resolve `method path` to a decision. The path must already be
    /// percent-decoded and stripped of its query.
    pub fn decide(&self, method: &Method, path: &str) -> Option<RouteDecision> {
        let matched = self.routes.resolve(method, path)?;
        let selector: &str = &matched.route.selector;

        tracing::debug!(
            generation = self.generation,
            %method,
            path,
            selector,
            template = matched.route.matcher.template(),
            preflight = matched.preflight,
            "route matched"
        );

        Some(RouteDecision {
            generation: self.generation,
            selector: selector.to_string(),
            method: method.to_string(),
            template: matched.route.matcher.template().to_string(),
            backend: self.backends.route(selector, path, &matched.bindings),
            auth: self.auth.requirement_for(selector).cloned(),
            preflight: matched.preflight,
            bindings: matched.bindings,
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &Arc<GatewayConfig> {
        &self.config
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn auth(&self) -> &JwtRequirementTable {
        &self.auth
    }

    pub fn backends(&self) -> &BackendRouter {
        &self.backends
    }

    pub fn cors(&self) -> Option<&CorsPolicy> {
        self.cors.as_ref()
    }

    pub fn service_control(&self) -> &ServiceControlPolicy {
        &self.service_control
    }

    pub fn rejected_rules(&self) -> &[RejectedRule] {
        self.routes.rejected()
    }
}

/// Hot-swappable gateway state. Cheap to share behind an `Arc`.
pub struct GatewayService {
    current: ArcSwap<GatewaySnapshot>,
    next_generation: AtomicU64,
}

impl GatewayService {
    /// Build generation 1 from `config`.
    pub fn new(config: Arc<GatewayConfig>) -> Result<Self, GatewayError> {
        let snapshot = GatewaySnapshot::build(config, 1)?;
        Ok(Self {
            current: ArcSwap::from_pointee(snapshot),
            next_generation: AtomicU64::new(2),
        })
    }

    /// Build a new snapshot and publish it. On error the current snapshot
    /// stays in place.
    pub fn reload(&self, config: Arc<GatewayConfig>) -> Result<u64, GatewayError> {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let snapshot = GatewaySnapshot::build(config, generation)?;

        tracing::info!(
            generation,
            routes = snapshot.routes.len(),
            rejected = snapshot.rejected_rules().len(),
            "gateway configuration reloaded"
        );

        self.publish(Arc::new(snapshot));
        Ok(generation)
    }

    /// Install `snapshot` unless a newer generation is already live. Concurrent
    /// reloads may finish building out of order.
    fn publish(&self, snapshot: Arc<GatewaySnapshot>) {
        let previous = self.current.rcu(|current| {
            if current.generation > snapshot.generation {
                Arc::clone(current)
            } else {
                Arc::clone(&snapshot)
            }
        });
        if previous.generation > snapshot.generation {
            tracing::warn!(
                generation = snapshot.generation,
                live = previous.generation,
                "superseded configuration generation discarded"
            );
        }
    }

    pub fn snapshot(&self) -> Arc<GatewaySnapshot> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation
    }

    pub fn decide(&self, method: &Method, path: &str) -> Option<RouteDecision> {
        self.current.load().decide(method, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{
        AuthenticationRuleConfig, BackendProtocol, BackendRuleConfig, CorsConfig, CorsPreset,
        JwtProviderConfig, JwtRequirementConfig, PathTranslation,
    };

    fn bookstore() -> GatewayConfig {
        GatewayConfig::builder()
            .service_name("bookstore.example.com")
            .backend_protocol(BackendProtocol::Http1)
            .http_rule("bookstore.ListShelves", "GET", "/v1/shelves")
            .http_rule("bookstore.GetBook", "GET", "/v1/shelves/{shelf}/books/{book}")
            .http_rule("bookstore.Catchall", "*", "/v1/{path=**}")
            .jwt_provider(JwtProviderConfig {
                id: "google".to_string(),
                issuer: "https://accounts.google.com".to_string(),
                jwks_uri: None,
                audiences: None,
            })
            .auth_rule(AuthenticationRuleConfig {
                selector: "bookstore.GetBook".to_string(),
                requirements: vec![JwtRequirementConfig {
                    provider_id: "google".to_string(),
                    audiences: None,
                }],
                allow_without_credential: false,
            })
            .backend_rule(BackendRuleConfig {
                selector: "bookstore.GetBook".to_string(),
                address: "https://books.example.com/api".to_string(),
                path_translation: PathTranslation::ConstantAddress,
                deadline: Some("5s".to_string()),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn decision_combines_all_collaborators() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let decision = service
            .decide(&Method::GET, "/v1/shelves/1/books/2")
            .unwrap();

        assert_eq!(decision.generation, 1);
        assert_eq!(decision.selector, "bookstore.GetBook");
        assert_eq!(decision.bindings.get("shelf"), Some("1"));
        assert_eq!(decision.bindings.get("book"), Some("2"));
        let auth = decision.auth.unwrap();
        assert_eq!(auth.requirements[0].audiences, vec!["https://bookstore.example.com"]);
        assert_eq!(decision.backend.cluster, "backend-cluster-books.example.com:443");
        assert_eq!(decision.backend.path, "/api?shelf=1&book=2");
        assert_eq!(decision.backend.deadline_ms, 5_000);
    }

    #[test]
    fn unauthenticated_method_goes_to_local_cluster() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let decision = service.decide(&Method::GET, "/v1/shelves").unwrap();
        assert_eq!(decision.selector, "bookstore.ListShelves");
        assert!(decision.auth.is_none());
        assert_eq!(decision.backend.path, "/v1/shelves");
        assert!(decision.backend.cluster.ends_with("_local"));

        let catchall = service.decide(&Method::DELETE, "/v1/anything/else").unwrap();
        assert_eq!(catchall.bindings.get("path"), Some("anything/else"));
        assert!(service.decide(&Method::GET, "/v2/shelves").is_none());
    }

    #[test]
    fn reload_swaps_generation() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let before = service.snapshot();

        let mut next = bookstore();
        next.service.http_rules.truncate(1);
        let generation = service.reload(Arc::new(next)).unwrap();

        assert_eq!(generation, 2);
        assert_eq!(service.generation(), 2);
        assert!(service.decide(&Method::GET, "/v1/shelves/1/books/2").is_none());
        // readers holding the old snapshot keep a consistent view
        assert!(before.decide(&Method::GET, "/v1/shelves/1/books/2").is_some());
    }

    #[test]
    fn failed_reload_keeps_current_snapshot() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let mut broken = bookstore();
        broken.cors = CorsConfig {
            preset: Some(CorsPreset::CorsWithRegex),
            ..CorsConfig::default()
        };
        assert!(service.reload(Arc::new(broken)).is_err());
        assert_eq!(service.generation(), 1);
        assert!(service.decide(&Method::GET, "/v1/shelves").is_some());
    }

    #[test]
    fn snapshot_exposes_service_control_policy() {
        use crate::core::service_control::CallKind;
        use std::time::Duration;

        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let snapshot = service.snapshot();
        let report = snapshot.service_control().policy(CallKind::Report);
        assert_eq!(report.timeout, Duration::from_millis(2000));
        assert_eq!(report.retries, 5);
        assert!(snapshot.service_control().network_fail_open);
    }

    #[test]
    fn late_publish_of_older_generation_is_discarded() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let older = GatewaySnapshot::build(Arc::new(bookstore()), 2).unwrap();
        let newer = GatewaySnapshot::build(Arc::new(bookstore()), 3).unwrap();

        service.publish(Arc::new(newer));
        service.publish(Arc::new(older));
        assert_eq!(service.generation(), 3);
    }

    #[test]
    fn unknown_provider_keeps_method_protected() {
        let config = GatewayConfig::builder()
            .service_name("items.example.com")
            .backend_protocol(BackendProtocol::Http1)
            .http_rule("items.Delete", "DELETE", "/v1/items/{id}")
            .jwt_provider(JwtProviderConfig {
                id: "google".to_string(),
                issuer: "https://accounts.google.com".to_string(),
                jwks_uri: None,
                audiences: None,
            })
            .auth_rule(AuthenticationRuleConfig {
                selector: "items.Delete".to_string(),
                requirements: vec![JwtRequirementConfig {
                    provider_id: "googel".to_string(),
                    audiences: None,
                }],
                allow_without_credential: false,
            })
            .build()
            .unwrap();
        let service = GatewayService::new(Arc::new(config)).unwrap();

        let decision = service.decide(&Method::DELETE, "/v1/items/1").unwrap();
        let auth = decision.auth.unwrap();
        assert!(auth.requirements.is_empty());
        assert!(!auth.allow_without_credential);
    }

    #[test]
    fn decision_serializes_bindings_in_order() {
        let service = GatewayService::new(Arc::new(bookstore())).unwrap();
        let decision = service
            .decide(&Method::GET, "/v1/shelves/1/books/2")
            .unwrap();
        let json = serde_json::to_string(&decision).unwrap();
        assert!(json.contains(r#""bindings":{"shelf":"1","book":"2"}"#));
    }
}
