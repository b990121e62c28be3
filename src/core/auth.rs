//! JWT requirements per method selector.
//!
//! The table is built once per configuration generation; request handling only
//! looks up the selector of the matched route.
use std::{collections::HashMap, sync::Arc, time::Duration};

use serde::Serialize;

use crate::config::models::{AuthenticationConfig, JwtProviderConfig};

/// One accepted token issuer for a method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JwtRequirement {
    pub provider_id: String,
    pub issuer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,
    pub audiences: Vec<String>,
}

/// Authentication needed to call one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequirement {
    pub requirements: Vec<JwtRequirement>,
    pub allow_without_credential: bool,
}

#[derive(Debug, Clone, Default)]
pub struct JwtRequirementTable {
    by_selector: HashMap<Arc<str>, AuthRequirement>,
    jwks_cache_duration: Duration,
}

fn split_audiences(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

impl JwtRequirementTable {
    /// Resolve every rule against its providers. Audiences come from the
    /// requirement, else the provider, else `https://<service_name>`.
    /// Requirements naming an unknown provider are dropped with a warning, but
    /// the rule itself is kept: a rule left with no usable provider yields an
    /// empty requirement list that no credential can satisfy.
    pub fn build(
        auth: &AuthenticationConfig,
        service_name: &str,
        jwks_cache_duration: Duration,
    ) -> Self {
        let providers: HashMap<&str, &JwtProviderConfig> =
            auth.providers.iter().map(|p| (p.id.as_str(), p)).collect();
        let default_audience = format!("https://{service_name}");

        let mut by_selector = HashMap::new();
        for rule in &auth.rules {
            let mut requirements = Vec::with_capacity(rule.requirements.len());
            for req in &rule.requirements {
                let Some(provider) = providers.get(req.provider_id.as_str()) else {
                    tracing::warn!(
                        selector = %rule.selector,
                        provider_id = %req.provider_id,
                        "authentication requirement names an unknown provider; skipped"
                    );
                    continue;
                };

                let mut audiences = req
                    .audiences
                    .as_deref()
                    .or(provider.audiences.as_deref())
                    .map(split_audiences)
                    .unwrap_or_default();
                if audiences.is_empty() {
                    audiences.push(default_audience.clone());
                }

                requirements.push(JwtRequirement {
                    provider_id: provider.id.clone(),
                    issuer: provider.issuer.clone(),
                    jwks_uri: provider.jwks_uri.clone(),
                    audiences,
                });
            }

            if rule.requirements.is_empty() && !rule.allow_without_credential {
                continue;
            }
            if requirements.is_empty() && !rule.allow_without_credential {
                tracing::warn!(
                    selector = %rule.selector,
                    "no usable authentication provider; method will reject every request"
                );
            }

            by_selector.insert(
                Arc::from(rule.selector.as_str()),
                AuthRequirement {
                    requirements,
                    allow_without_credential: rule.allow_without_credential,
                },
            );
        }

        tracing::debug!(
            methods = by_selector.len(),
            providers = providers.len(),
            jwks_cache_secs = jwks_cache_duration.as_secs(),
            "jwt requirements resolved"
        );

        Self {
            by_selector,
            jwks_cache_duration,
        }
    }

    /// `None` means the method needs no authentication. A requirement with an
    /// empty provider list and `allow_without_credential == false` denies
    /// every request.
    pub fn requirement_for(&self, selector: &str) -> Option<&AuthRequirement> {
        self.by_selector.get(selector)
    }

    pub fn jwks_cache_duration(&self) -> Duration {
        self.jwks_cache_duration
    }

    pub fn len(&self) -> usize {
        self.by_selector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_selector.is_empty()
    }
}
