use regex::Regex;
use thiserror::Error;

use crate::config::models::{CorsConfig, CorsPreset};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorsError {
    #[error("cors_with_regex preset requires allow_origin_regex")]
    MissingOriginRegex,

    #[error("invalid allow_origin_regex '{pattern}': {reason}")]
    InvalidOriginRegex { pattern: String, reason: String },
}

#[derive(Debug, Clone)]
enum OriginMatcher {
    Any,
    Exact(String),
    Regex(Regex),
}

/// Compiled CORS settings. Only origin checks are evaluated here; response
/// header emission belongs to the proxy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origin: OriginMatcher,
    pub allow_methods: String,
    pub allow_headers: String,
    pub expose_headers: String,
    pub allow_credentials: bool,
}

impl CorsPolicy {
    /// `Ok(None)` when no preset is configured.
    pub fn from_config(config: &CorsConfig) -> Result<Option<Self>, CorsError> {
        let origin = match config.preset {
            None => return Ok(None),
            Some(CorsPreset::Basic) => match config.allow_origin.trim() {
                "" | "*" => OriginMatcher::Any,
                exact => OriginMatcher::Exact(exact.to_string()),
            },
            Some(CorsPreset::CorsWithRegex) => {
                let pattern = config.allow_origin_regex.trim();
                if pattern.is_empty() {
                    return Err(CorsError::MissingOriginRegex);
                }
                let anchored = format!("^(?:{pattern})$");
                let regex = Regex::new(&anchored).map_err(|e| CorsError::InvalidOriginRegex {
                    pattern: pattern.to_string(),
                    reason: e.to_string(),
                })?;
                OriginMatcher::Regex(regex)
            }
        };

        Ok(Some(Self {
            origin,
            allow_methods: config.allow_methods.clone(),
            allow_headers: config.allow_headers.clone(),
            expose_headers: config.expose_headers.clone(),
            allow_credentials: config.allow_credentials,
        }))
    }

    pub fn allows_origin(&self, origin: &str) -> bool {
        match &self.origin {
            OriginMatcher::Any => true,
            OriginMatcher::Exact(expected) => expected == origin,
            OriginMatcher::Regex(regex) => regex.is_match(origin),
        }
    }
}
