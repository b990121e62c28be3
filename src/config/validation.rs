#![allow(clippy::collapsible_if)]

use std::{collections::HashSet, net::IpAddr};

use eyre::Result;
use regex::Regex;

use crate::config::models::{
    AuthenticationConfig, BackendRuleConfig, CorsConfig, CorsPreset, GatewayConfig,
    HttpRuleConfig, ServiceControlConfig,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid CORS configuration: {message}")]
    InvalidCors { message: String },

    #[error("Unknown reference in '{field}': {message}")]
    UnknownReference { field: String, message: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator.
///
/// Template syntax is deliberately not checked here: a malformed path template
/// only disables its own rule when the route table is built.
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, collecting every error
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if config.service_name.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "service_name".to_string(),
            });
        }

        if config.backend_protocol.is_none() {
            errors.push(ValidationError::MissingField {
                field: "backend_protocol".to_string(),
            });
        }

        if let Err(e) = Self::validate_address("listener.address", &config.listener.address) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_address("cluster.address", &config.cluster.address) {
            errors.push(e);
        }
        if config.listener.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: "listener.port".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }
        if config.cluster.port == 0 {
            errors.push(ValidationError::InvalidField {
                field: "cluster.port".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if let Err(e) =
            Self::validate_duration("cluster.connect_timeout", &config.cluster.connect_timeout)
        {
            errors.push(e);
        }
        if let Err(e) =
            Self::validate_duration("jwks_cache_duration", &config.jwks_cache_duration)
        {
            errors.push(e);
        }

        if let Err(mut cors_errors) = Self::validate_cors(&config.cors) {
            errors.append(&mut cors_errors);
        }

        if let Err(mut sc_errors) = Self::validate_service_control(&config.service_control) {
            errors.append(&mut sc_errors);
        }

        for (i, rule) in config.service.http_rules.iter().enumerate() {
            if let Err(mut rule_errors) = Self::validate_http_rule(i, rule) {
                errors.append(&mut rule_errors);
            }
        }

        if let Err(mut auth_errors) =
            Self::validate_authentication(&config.service.authentication)
        {
            errors.append(&mut auth_errors);
        }

        for (i, rule) in config.service.backend.rules.iter().enumerate() {
            if let Err(e) = Self::validate_backend_rule(i, rule) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    fn validate_address(field: &str, address: &str) -> ValidationResult<()> {
        if address.parse::<IpAddr>().is_err() {
            return Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("'{address}' is not an IP address (e.g. '0.0.0.0' or '::')"),
            });
        }
        Ok(())
    }

    fn validate_duration(field: &str, value: &str) -> ValidationResult<()> {
        match humantime::parse_duration(value) {
            Ok(d) if d.is_zero() => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: "Must be greater than 0".to_string(),
            }),
            Ok(_) => Ok(()),
            Err(e) => Err(ValidationError::InvalidField {
                field: field.to_string(),
                message: format!("Invalid duration '{value}': {e}"),
            }),
        }
    }

    /// The per-origin settings only make sense with a preset, and each preset
    /// reads exactly one of `allow_origin` / `allow_origin_regex`.
    fn validate_cors(config: &CorsConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        match config.preset {
            None => {
                let configured = !config.allow_origin.is_empty()
                    || !config.allow_origin_regex.is_empty()
                    || !config.allow_methods.is_empty()
                    || !config.allow_headers.is_empty()
                    || !config.expose_headers.is_empty()
                    || config.allow_credentials;
                if configured {
                    errors.push(ValidationError::InvalidCors {
                        message: "CORS settings require cors.preset to be 'basic' or \
                                  'cors_with_regex'"
                            .to_string(),
                    });
                }
            }
            Some(CorsPreset::Basic) => {
                if !config.allow_origin_regex.is_empty() {
                    errors.push(ValidationError::InvalidCors {
                        message: "allow_origin_regex is only used by the 'cors_with_regex' preset"
                            .to_string(),
                    });
                }
            }
            Some(CorsPreset::CorsWithRegex) => {
                if config.allow_origin_regex.is_empty() {
                    errors.push(ValidationError::InvalidCors {
                        message: "The 'cors_with_regex' preset requires allow_origin_regex"
                            .to_string(),
                    });
                } else if let Err(e) = Regex::new(&config.allow_origin_regex) {
                    errors.push(ValidationError::InvalidCors {
                        message: format!("allow_origin_regex does not compile: {e}"),
                    });
                }
                if !config.allow_origin.is_empty() {
                    errors.push(ValidationError::InvalidCors {
                        message: "allow_origin is only used by the 'basic' preset".to_string(),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_service_control(config: &ServiceControlConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        let timeouts = [
            ("service_control.check_timeout_ms", config.check_timeout_ms),
            ("service_control.quota_timeout_ms", config.quota_timeout_ms),
            ("service_control.report_timeout_ms", config.report_timeout_ms),
        ];
        for (field, value) in timeouts {
            if value == Some(0) {
                errors.push(ValidationError::InvalidField {
                    field: field.to_string(),
                    message: "Must be greater than 0 when set".to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_http_rule(index: usize, rule: &HttpRuleConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let context = format!("service.http_rules[{index}]");

        if rule.selector.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: format!("{context}.selector"),
            });
        }

        let bindings = std::iter::once((rule.method.as_str(), rule.pattern.as_str())).chain(
            rule.additional_bindings
                .iter()
                .map(|b| (b.method.as_str(), b.pattern.as_str())),
        );
        for (method, pattern) in bindings {
            if pattern.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("{context}.pattern"),
                });
            }
            if let Err(e) = Self::validate_http_method(&context, method) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_http_method(context: &str, method: &str) -> ValidationResult<()> {
        if method == "*" {
            return Ok(());
        }
        if method.is_empty() || http::Method::from_bytes(method.as_bytes()).is_err() {
            return Err(ValidationError::InvalidField {
                field: format!("{context}.method"),
                message: format!("'{method}' is not a valid HTTP method"),
            });
        }
        Ok(())
    }

    fn validate_authentication(config: &AuthenticationConfig) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut provider_ids = HashSet::new();

        for (i, provider) in config.providers.iter().enumerate() {
            if provider.id.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("service.authentication.providers[{i}].id"),
                });
            } else if !provider_ids.insert(provider.id.as_str()) {
                errors.push(ValidationError::InvalidField {
                    field: format!("service.authentication.providers[{i}].id"),
                    message: format!("Duplicate provider id '{}'", provider.id),
                });
            }
            if provider.issuer.trim().is_empty() {
                errors.push(ValidationError::MissingField {
                    field: format!("service.authentication.providers[{i}].issuer"),
                });
            }
            if let Some(jwks_uri) = &provider.jwks_uri {
                if url::Url::parse(jwks_uri).is_err() {
                    errors.push(ValidationError::InvalidField {
                        field: format!("service.authentication.providers[{i}].jwks_uri"),
                        message: format!("'{jwks_uri}' is not a valid URL"),
                    });
                }
            }
        }

        for (i, rule) in config.rules.iter().enumerate() {
            for requirement in &rule.requirements {
                if !provider_ids.contains(requirement.provider_id.as_str()) {
                    errors.push(ValidationError::UnknownReference {
                        field: format!("service.authentication.rules[{i}]"),
                        message: format!(
                            "rule for '{}' references unknown provider '{}'",
                            rule.selector, requirement.provider_id
                        ),
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_backend_rule(index: usize, rule: &BackendRuleConfig) -> ValidationResult<()> {
        let field = format!("service.backend.rules[{index}]");
        match url::Url::parse(&rule.address) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https" | "grpc" | "grpcs") {
                    return Err(ValidationError::InvalidField {
                        field: format!("{field}.address"),
                        message: format!(
                            "URL scheme must be http, https, grpc or grpcs, got '{}'",
                            url.scheme()
                        ),
                    });
                }
                if url.host().is_none() {
                    return Err(ValidationError::InvalidField {
                        field: format!("{field}.address"),
                        message: "URL must have a valid host".to_string(),
                    });
                }
            }
            Err(e) => {
                return Err(ValidationError::InvalidField {
                    field: format!("{field}.address"),
                    message: format!("Invalid URL format: {e}"),
                });
            }
        }

        if let Some(deadline) = &rule.deadline {
            Self::validate_duration(&format!("{field}.deadline"), deadline)?;
        }

        Ok(())
    }

    /// Format multiple validation errors into a single message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.is_empty() {
            return "No errors".to_string();
        }

        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
