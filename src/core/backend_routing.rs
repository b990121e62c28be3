//! Per-method backend selection and path translation.
//!
//! With backend routing disabled every decision targets the local cluster and
//! keeps the request path as is.
use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
    config::models::{BackendRuleConfig, GatewayConfig, PathTranslation},
    core::httppattern::Bindings,
};

/// Deadline applied when a backend rule does not set one.
pub const DEFAULT_BACKEND_DEADLINE: Duration = Duration::from_secs(15);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendRuleError {
    #[error("backend rule {selector}: invalid address '{address}': {reason}")]
    InvalidAddress {
        selector: String,
        address: String,
        reason: String,
    },

    #[error("backend rule {selector}: unsupported scheme '{scheme}'")]
    UnsupportedScheme { selector: String, scheme: String },

    #[error("backend rule {selector}: address '{address}' has no host")]
    MissingHost { selector: String, address: String },

    #[error("backend rule {selector}: invalid deadline '{deadline}'")]
    InvalidDeadline { selector: String, deadline: String },
}

/// Where matched requests for one selector are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    pub cluster: String,
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub base_path: String,
    pub translation: PathTranslation,
    pub deadline: Duration,
}

/// Backend part of a routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendRoute {
    pub cluster: String,
    pub host: String,
    pub path: String,
    pub deadline_ms: u64,
}

impl BackendTarget {
    fn from_rule(rule: &BackendRuleConfig) -> Result<Self, BackendRuleError> {
        let url = Url::parse(&rule.address).map_err(|e| BackendRuleError::InvalidAddress {
            selector: rule.selector.clone(),
            address: rule.address.clone(),
            reason: e.to_string(),
        })?;

        let (tls, default_port) = match url.scheme() {
            "http" | "grpc" => (false, 80),
            "https" | "grpcs" => (true, 443),
            other => {
                return Err(BackendRuleError::UnsupportedScheme {
                    selector: rule.selector.clone(),
                    scheme: other.to_string(),
                });
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| BackendRuleError::MissingHost {
                selector: rule.selector.clone(),
                address: rule.address.clone(),
            })?
            .to_string();
        let port = url.port().unwrap_or(default_port);

        let deadline = match rule.deadline.as_deref() {
            None => DEFAULT_BACKEND_DEADLINE,
            Some(raw) => humantime::parse_duration(raw)
                .ok()
                .filter(|d| !d.is_zero())
                .ok_or_else(|| BackendRuleError::InvalidDeadline {
                    selector: rule.selector.clone(),
                    deadline: raw.to_string(),
                })?,
        };

        Ok(Self {
            cluster: cluster_name(&host, port),
            host,
            port,
            tls,
            base_path: url.path().trim_end_matches('/').to_string(),
            translation: rule.path_translation,
            deadline,
        })
    }

    /// Path sent to the backend for a request that matched with `bindings`.
    pub fn backend_path(&self, request_path: &str, bindings: &Bindings) -> String {
        match self.translation {
            PathTranslation::AppendPathToAddress => format!("{}{}", self.base_path, request_path),
            PathTranslation::ConstantAddress => {
                let mut path = if self.base_path.is_empty() {
                    "/".to_string()
                } else {
                    self.base_path.clone()
                };
                if !bindings.is_empty() {
                    let query = bindings
                        .iter()
                        .map(|(field, value)| {
                            format!("{}={}", urlencoding::encode(field), urlencoding::encode(value))
                        })
                        .collect::<Vec<_>>()
                        .join("&");
                    path.push('?');
                    path.push_str(&query);
                }
                path
            }
        }
    }

    fn route(&self, request_path: &str, bindings: &Bindings) -> BackendRoute {
        BackendRoute {
            cluster: self.cluster.clone(),
            host: self.host.clone(),
            path: self.backend_path(request_path, bindings),
            deadline_ms: self.deadline.as_millis() as u64,
        }
    }
}

fn cluster_name(host: &str, port: u16) -> String {
    format!("backend-cluster-{host}:{port}")
}

/// Backend targets keyed by selector, plus the local cluster fallback.
#[derive(Debug, Clone)]
pub struct BackendRouter {
    by_selector: HashMap<Arc<str>, BackendTarget>,
    local: BackendTarget,
    rejected: Vec<BackendRuleError>,
}

impl BackendRouter {
    pub fn build(config: &GatewayConfig) -> Self {
        let local = BackendTarget {
            cluster: format!("backend-cluster-{}_local", config.service_name),
            host: config.cluster.address.clone(),
            port: config.cluster.port,
            tls: false,
            base_path: String::new(),
            translation: PathTranslation::AppendPathToAddress,
            deadline: DEFAULT_BACKEND_DEADLINE,
        };

        let mut by_selector = HashMap::new();
        let mut rejected = Vec::new();

        if config.enable_backend_routing {
            for rule in &config.service.backend.rules {
                match BackendTarget::from_rule(rule) {
                    Ok(target) => {
                        tracing::debug!(
                            selector = %rule.selector,
                            cluster = %target.cluster,
                            translation = ?target.translation,
                            "backend rule loaded"
                        );
                        by_selector.insert(Arc::from(rule.selector.as_str()), target);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "backend rule rejected");
                        rejected.push(e);
                    }
                }
            }
        } else if !config.service.backend.rules.is_empty() {
            tracing::debug!(
                rules = config.service.backend.rules.len(),
                "backend routing disabled; rules ignored"
            );
        }

        Self {
            by_selector,
            local,
            rejected,
        }
    }

    pub fn target_for(&self, selector: &str) -> &BackendTarget {
        self.by_selector.get(selector).unwrap_or(&self.local)
    }

    pub fn route(&self, selector: &str, request_path: &str, bindings: &Bindings) -> BackendRoute {
        self.target_for(selector).route(request_path, bindings)
    }

    pub fn local(&self) -> &BackendTarget {
        &self.local
    }

    pub fn rejected(&self) -> &[BackendRuleError] {
        &self.rejected
    }
}
