//! Timeout and retry policy for the three service-control calls.
use std::{fmt, time::Duration};

use serde::Serialize;

use crate::config::models::ServiceControlConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    Check,
    Quota,
    Report,
}

impl CallKind {
    pub const ALL: [CallKind; 3] = [CallKind::Check, CallKind::Quota, CallKind::Report];

    fn defaults(self) -> CallPolicy {
        match self {
            CallKind::Check => CallPolicy::new(Duration::from_millis(1000), 3),
            CallKind::Quota => CallPolicy::new(Duration::from_millis(1000), 1),
            CallKind::Report => CallPolicy::new(Duration::from_millis(2000), 5),
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKind::Check => f.write_str("check"),
            CallKind::Quota => f.write_str("quota"),
            CallKind::Report => f.write_str("report"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CallPolicy {
    #[serde(with = "human_duration")]
    pub timeout: Duration,
    pub retries: u32,
}

mod human_duration {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }
}

impl CallPolicy {
    pub const fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }
}

/// Resolved policies for all call kinds.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceControlPolicy {
    check: CallPolicy,
    quota: CallPolicy,
    report: CallPolicy,
    pub network_fail_open: bool,
}

impl ServiceControlPolicy {
    /// Unset or zero values fall back to the per-call defaults; the validator
    /// reports zero timeouts before this point.
    pub fn from_config(config: &ServiceControlConfig) -> Self {
        let resolve = |kind: CallKind, timeout_ms: Option<u64>, retries: Option<u32>| {
            let defaults = kind.defaults();
            CallPolicy {
                timeout: timeout_ms
                    .filter(|ms| *ms > 0)
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.timeout),
                retries: retries.unwrap_or(defaults.retries),
            }
        };

        Self {
            check: resolve(CallKind::Check, config.check_timeout_ms, config.check_retries),
            quota: resolve(CallKind::Quota, config.quota_timeout_ms, config.quota_retries),
            report: resolve(CallKind::Report, config.report_timeout_ms, config.report_retries),
            network_fail_open: config.network_fail_open,
        }
    }

    pub fn policy(&self, kind: CallKind) -> CallPolicy {
        match kind {
            CallKind::Check => self.check,
            CallKind::Quota => self.quota,
            CallKind::Report => self.report,
        }
    }
}

impl Default for ServiceControlPolicy {
    fn default() -> Self {
        Self::from_config(&ServiceControlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_per_call() {
        let policy = ServiceControlPolicy::default();
        assert_eq!(
            policy.policy(CallKind::Check),
            CallPolicy::new(Duration::from_millis(1000), 3)
        );
        assert_eq!(
            policy.policy(CallKind::Quota),
            CallPolicy::new(Duration::from_millis(1000), 1)
        );
        assert_eq!(
            policy.policy(CallKind::Report),
            CallPolicy::new(Duration::from_millis(2000), 5)
        );
        assert!(policy.network_fail_open);
    }

    #[test]
    fn overrides_apply_per_call() {
        let policy = ServiceControlPolicy::from_config(&ServiceControlConfig {
            check_timeout_ms: Some(250),
            report_retries: Some(0),
            network_fail_open: false,
            ..ServiceControlConfig::default()
        });
        assert_eq!(policy.policy(CallKind::Check).timeout, Duration::from_millis(250));
        assert_eq!(policy.policy(CallKind::Check).retries, 3);
        assert_eq!(policy.policy(CallKind::Report).retries, 0);
        assert!(!policy.network_fail_open);
    }

    #[test]
    fn serializes_human_readable_timeouts() {
        let json = serde_json::to_value(ServiceControlPolicy::default()).unwrap();
        assert_eq!(json["report"]["timeout"], "2s");
        assert_eq!(CallKind::ALL.len(), 3);
    }
}
