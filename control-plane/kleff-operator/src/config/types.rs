use std::time::Duration;

use envconfig::Envconfig;
use tracing::warn;

use crate::controller::conditions::TransitionPolicy;

#[derive(Envconfig, Clone, Debug)]
pub struct OperatorConfig {
    #[envconfig(from = "KLEFF_OPERATOR_PROFILE", default = "dev")]
    pub profile: String,

    #[envconfig(from = "HTTP_PORT", default = "8088")]
    pub http_port: u16,

    /// Restrict the Tenant watch to a single namespace; all namespaces when unset.
    /// Env: KLEFF_WATCH_NAMESPACE
    #[envconfig(from = "KLEFF_WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    #[envconfig(from = "KLEFF_MAX_CONCURRENT_RECONCILES", default = "4")]
    pub max_concurrent_reconciles: u16,

    /// Periodic resync after a successful reconcile (profile default when unset)
    /// Env: KLEFF_RESYNC_SECS
    #[envconfig(from = "KLEFF_RESYNC_SECS")]
    pub resync_secs: Option<u64>,

    /// on-change | always
    #[envconfig(
        from = "KLEFF_CONDITION_TIMESTAMP_POLICY",
        default = "on-change"
    )]
    pub condition_timestamp_policy: String,

    /// Reporting component shown on emitted Events
    #[envconfig(from = "KLEFF_REPORTER_NAME", default = "kleff-operator")]
    pub reporter_name: String,

    #[envconfig(nested)]
    pub retry: RetryConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct RetryConfig {
    #[envconfig(from = "KLEFF_ERROR_REQUEUE_SECS", default = "30")]
    pub error_requeue_secs: u64,
    /// Optimistic-concurrency conflicts are retried quickly against a fresh read
    #[envconfig(from = "KLEFF_CONFLICT_REQUEUE_SECS", default = "1")]
    pub conflict_requeue_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            error_requeue_secs: 30,
            conflict_requeue_secs: 1,
        }
    }
}

impl OperatorConfig {
    /// Fill in profile defaults for values not set explicitly via env.
    ///
    /// - dev: resync every 60s
    /// - prod: resync every 600s
    pub fn apply_profile_defaults(mut self) -> Self {
        let def_resync = match self.profile.as_str() {
            "prod" | "production" | "full" => 600,
            _ /* dev */ => 60,
        };
        if self.resync_secs.is_none() {
            self.resync_secs = Some(def_resync);
        }
        self
    }

    /// Unknown values fall back to the default policy with a warning.
    pub fn transition_policy(&self) -> TransitionPolicy {
        self.condition_timestamp_policy.parse().unwrap_or_else(|e| {
            let fallback = TransitionPolicy::default();
            warn!(error = %e, %fallback, "ignoring KLEFF_CONDITION_TIMESTAMP_POLICY");
            fallback
        })
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs.unwrap_or(60))
    }

    pub fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.retry.error_requeue_secs)
    }

    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.retry.conflict_requeue_secs)
    }
}
