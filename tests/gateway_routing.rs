// End-to-end routing decisions from a configuration file on disk.
use std::{io::Write, sync::Arc};

use apiproxy::{GatewayService, config::loader::load_config};
use http::Method;
use tempfile::NamedTempFile;

const BOOKSTORE: &str = r#"
service_name = "bookstore.endpoints.example.cloud.goog"
backend_protocol = "grpc"
enable_backend_routing = true

[cors]
preset = "cors_with_regex"
allow_origin_regex = "https://[a-z]+\\.example\\.com"

[[service.apis]]
name = "endpoints.examples.bookstore.Bookstore"
methods = ["ListShelves", "GetBook", "DeleteBook"]

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.ListShelves"
method = "GET"
pattern = "/v1/shelves"

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.GetBook"
method = "GET"
pattern = "/v1/shelves/{shelf}/books/{book}"

[[service.http_rules.additional_bindings]]
method = "GET"
pattern = "/v1/books/{book}"

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.DeleteBook"
method = "DELETE"
pattern = "/v1/{name=shelves/*/books/*}"

[[service.http_rules]]
selector = "endpoints.examples.bookstore.Bookstore.Broken"
method = "GET"
pattern = "/v1/{a}/{a}"

[[service.authentication.providers]]
id = "google_id_token"
issuer = "https://accounts.google.com"
jwks_uri = "https://www.googleapis.com/oauth2/v3/certs"

[[service.authentication.rules]]
selector = "endpoints.examples.bookstore.Bookstore.DeleteBook"
requirements = [{ provider_id = "google_id_token", audiences = "admin" }]

[[service.backend.rules]]
selector = "endpoints.examples.bookstore.Bookstore.GetBook"
address = "https://books.example.com/catalog"
path_translation = "CONSTANT_ADDRESS"
deadline = "10s"
"#;

async fn bookstore() -> GatewayService {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    write!(file, "{BOOKSTORE}").unwrap();
    let config = load_config(file.path().to_str().unwrap()).await.unwrap();
    GatewayService::new(Arc::new(config)).unwrap()
}

#[tokio::test]
async fn http_rules_resolve_with_bindings() {
    let gateway = bookstore().await;

    let decision = gateway
        .decide(&Method::GET, "/v1/shelves/7/books/42")
        .unwrap();
    assert_eq!(
        decision.selector,
        "endpoints.examples.bookstore.Bookstore.GetBook"
    );
    assert_eq!(decision.bindings.get("shelf"), Some("7"));
    assert_eq!(decision.bindings.get("book"), Some("42"));
    assert_eq!(decision.backend.cluster, "backend-cluster-books.example.com:443");
    assert_eq!(decision.backend.path, "/catalog?shelf=7&book=42");
    assert_eq!(decision.backend.deadline_ms, 10_000);
    assert!(decision.auth.is_none());

    let alias = gateway.decide(&Method::GET, "/v1/books/42").unwrap();
    assert_eq!(alias.selector, decision.selector);
    assert_eq!(alias.backend.path, "/catalog?book=42");
}

#[tokio::test]
async fn multi_segment_variable_and_jwt_requirement() {
    let gateway = bookstore().await;

    let decision = gateway
        .decide(&Method::DELETE, "/v1/shelves/7/books/42")
        .unwrap();
    assert_eq!(decision.bindings.get("name"), Some("shelves/7/books/42"));
    let auth = decision.auth.unwrap();
    assert_eq!(auth.requirements[0].issuer, "https://accounts.google.com");
    assert_eq!(auth.requirements[0].audiences, vec!["admin"]);
    assert!(decision.backend.cluster.ends_with("_local"));
}

#[tokio::test]
async fn grpc_paths_are_routed() {
    let gateway = bookstore().await;
    let decision = gateway
        .decide(
            &Method::POST,
            "/endpoints.examples.bookstore.Bookstore/ListShelves",
        )
        .unwrap();
    assert_eq!(
        decision.selector,
        "endpoints.examples.bookstore.Bookstore.ListShelves"
    );
    assert!(decision.bindings.is_empty());
}

#[tokio::test]
async fn broken_rule_is_reported_not_fatal() {
    let gateway = bookstore().await;
    let snapshot = gateway.snapshot();
    assert_eq!(snapshot.rejected_rules().len(), 1);
    assert_eq!(
        snapshot.rejected_rules()[0].selector,
        "endpoints.examples.bookstore.Bookstore.Broken"
    );
    assert!(gateway.decide(&Method::GET, "/v1/shelves").is_some());
}

#[tokio::test]
async fn preflight_and_cors_origin() {
    let gateway = bookstore().await;
    let decision = gateway
        .decide(&Method::OPTIONS, "/v1/shelves/1/books/2")
        .unwrap();
    assert!(decision.preflight);

    let snapshot = gateway.snapshot();
    let cors = snapshot.cors().unwrap();
    assert!(cors.allows_origin("https://app.example.com"));
    assert!(!cors.allows_origin("https://example.org"));
}

#[tokio::test]
async fn unmatched_requests_are_none() {
    let gateway = bookstore().await;
    assert!(gateway.decide(&Method::GET, "/v2/shelves").is_none());
    assert!(gateway.decide(&Method::PUT, "/v1/shelves").is_none());
}
