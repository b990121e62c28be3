//! Configuration data structures for the gateway.
//!
//! One immutable [`GatewayConfig`] replaces the process-wide settings the
//! sidecar needs: service identity, listener and local cluster, CORS, backend
//! routing, service-control call policy, JWT cache duration and the service
//! document (HTTP rules, authentication, backend rules). Types are serde
//! friendly and defaulted so that minimal TOML / YAML / JSON files stay short.
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_jwks_cache_duration() -> String {
    "5m".to_string()
}

fn default_http_method() -> String {
    "GET".to_string()
}

fn default_network_fail_open() -> bool {
    true
}

fn default_xff_trusted_hops() -> u32 {
    2
}

/// Root configuration.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Endpoint service name, e.g. `bookstore.endpoints.example.cloud.goog`.
    pub service_name: String,
    /// Service config id currently rolled out.
    pub config_id: Option<String>,
    pub rollout_strategy: RolloutStrategy,
    /// Protocol spoken to the local backend. Required.
    pub backend_protocol: Option<BackendProtocol>,
    /// Fetch service name / config id / rollout strategy from the metadata server.
    pub check_metadata: bool,
    pub listener: ListenerConfig,
    pub cluster: ClusterConfig,
    pub cors: CorsConfig,
    /// Route per-method to the addresses in `service.backend.rules`.
    pub enable_backend_routing: bool,
    pub service_control: ServiceControlConfig,
    /// JWKS cache duration, humantime format ("300s", "5m").
    #[serde(default = "default_jwks_cache_duration")]
    pub jwks_cache_duration: String,
    /// Trusted hops when deriving the client address from `x-forwarded-for`.
    #[serde(default = "default_xff_trusted_hops")]
    pub envoy_xff_num_trusted_hops: u32,
    pub service: ServiceConfig,
}

impl GatewayConfig {
    /// Create a new configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Parsed JWKS cache duration; falls back to five minutes when unparsable.
    pub fn jwks_cache_duration(&self) -> Duration {
        humantime::parse_duration(&self.jwks_cache_duration).unwrap_or(Duration::from_secs(300))
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            config_id: None,
            rollout_strategy: RolloutStrategy::Fixed,
            backend_protocol: None,
            check_metadata: false,
            listener: ListenerConfig::default(),
            cluster: ClusterConfig::default(),
            cors: CorsConfig::default(),
            enable_backend_routing: false,
            service_control: ServiceControlConfig::default(),
            jwks_cache_duration: default_jwks_cache_duration(),
            envoy_xff_num_trusted_hops: default_xff_trusted_hops(),
            service: ServiceConfig::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RolloutStrategy {
    #[default]
    Fixed,
    Managed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BackendProtocol {
    Grpc,
    Http1,
    Http2,
}

impl std::fmt::Display for BackendProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendProtocol::Grpc => write!(f, "grpc"),
            BackendProtocol::Http1 => write!(f, "http1"),
            BackendProtocol::Http2 => write!(f, "http2"),
        }
    }
}

/// Where the gateway accepts downstream traffic.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    pub address: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// The local backend the sidecar fronts.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ClusterConfig {
    pub address: String,
    pub port: u16,
    /// humantime format, e.g. "20s"
    pub connect_timeout: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 8082,
            connect_timeout: "20s".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorsPreset {
    Basic,
    CorsWithRegex,
}

/// CORS policy settings. Nothing is enabled unless `preset` is set.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct CorsConfig {
    pub preset: Option<CorsPreset>,
    /// Used by the `basic` preset; empty means `*`.
    pub allow_origin: String,
    /// Used by the `cors_with_regex` preset.
    pub allow_origin_regex: String,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub allow_credentials: bool,
}

/// Timeouts and retry counts for the service-control client's calls.
///
/// Unset values take the per-call defaults (see `core::service_control`).
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceControlConfig {
    pub check_timeout_ms: Option<u64>,
    pub quota_timeout_ms: Option<u64>,
    pub report_timeout_ms: Option<u64>,
    pub check_retries: Option<u32>,
    pub quota_retries: Option<u32>,
    pub report_retries: Option<u32>,
    /// Allow requests through when service control is unreachable.
    #[serde(default = "default_network_fail_open")]
    pub network_fail_open: bool,
}

impl Default for ServiceControlConfig {
    fn default() -> Self {
        Self {
            check_timeout_ms: None,
            quota_timeout_ms: None,
            report_timeout_ms: None,
            check_retries: None,
            quota_retries: None,
            report_retries: None,
            network_fail_open: default_network_fail_open(),
        }
    }
}

/// The already-extracted parts of the service configuration document.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// gRPC APIs; each method gets a `POST /<api>/<method>` route for gRPC backends.
    pub apis: Vec<ApiConfig>,
    pub http_rules: Vec<HttpRuleConfig>,
    pub authentication: AuthenticationConfig,
    pub backend: BackendRulesConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ApiConfig {
    /// Fully qualified service, e.g. `endpoints.examples.bookstore.Bookstore`.
    pub name: String,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// HTTP/JSON transcoding rule for one method.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpRuleConfig {
    pub selector: String,
    /// HTTP method, or `*` for any.
    #[serde(default = "default_http_method")]
    pub method: String,
    pub pattern: String,
    #[serde(default)]
    pub additional_bindings: Vec<HttpBindingConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpBindingConfig {
    #[serde(default = "default_http_method")]
    pub method: String,
    pub pattern: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AuthenticationConfig {
    pub providers: Vec<JwtProviderConfig>,
    pub rules: Vec<AuthenticationRuleConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtProviderConfig {
    pub id: String,
    pub issuer: String,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Comma separated, as in the service configuration document.
    #[serde(default)]
    pub audiences: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthenticationRuleConfig {
    pub selector: String,
    #[serde(default)]
    pub requirements: Vec<JwtRequirementConfig>,
    #[serde(default)]
    pub allow_without_credential: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtRequirementConfig {
    pub provider_id: String,
    /// Comma separated; overrides the provider audiences.
    #[serde(default)]
    pub audiences: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct BackendRulesConfig {
    pub rules: Vec<BackendRuleConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PathTranslation {
    #[default]
    AppendPathToAddress,
    ConstantAddress,
}

/// Per-method remote backend.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackendRuleConfig {
    pub selector: String,
    /// `http(s)://` or `grpc(s)://` URL.
    pub address: String,
    #[serde(default)]
    pub path_translation: PathTranslation,
    /// humantime format; defaults to 15s.
    #[serde(default)]
    pub deadline: Option<String>,
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.config.service_name = name.into();
        self
    }

    pub fn backend_protocol(mut self, protocol: BackendProtocol) -> Self {
        self.config.backend_protocol = Some(protocol);
        self
    }

    pub fn listener(mut self, address: impl Into<String>, port: u16) -> Self {
        self.config.listener = ListenerConfig {
            address: address.into(),
            port,
        };
        self
    }

    /// Register a gRPC API and its methods.
    pub fn api(mut self, name: impl Into<String>, methods: &[&str]) -> Self {
        self.config.service.apis.push(ApiConfig {
            name: name.into(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
        });
        self
    }

    /// Add an HTTP rule mapping `method pattern` to `selector`.
    pub fn http_rule(
        mut self,
        selector: impl Into<String>,
        method: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        self.config.service.http_rules.push(HttpRuleConfig {
            selector: selector.into(),
            method: method.into(),
            pattern: pattern.into(),
            additional_bindings: Vec::new(),
        });
        self
    }

    pub fn cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn jwt_provider(mut self, provider: JwtProviderConfig) -> Self {
        self.config.service.authentication.providers.push(provider);
        self
    }

    pub fn auth_rule(mut self, rule: AuthenticationRuleConfig) -> Self {
        self.config.service.authentication.rules.push(rule);
        self
    }

    /// Add a backend rule; also turns backend routing on.
    pub fn backend_rule(mut self, rule: BackendRuleConfig) -> Self {
        self.config.enable_backend_routing = true;
        self.config.service.backend.rules.push(rule);
        self
    }

    pub fn service_control(mut self, config: ServiceControlConfig) -> Self {
        self.config.service_control = config;
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.config.service_name.trim().is_empty() {
            return Err("service_name is required".to_string());
        }
        if self.config.backend_protocol.is_none() {
            return Err("backend_protocol is required".to_string());
        }
        Ok(self.config)
    }
}
