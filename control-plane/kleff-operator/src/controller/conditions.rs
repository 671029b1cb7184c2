use chrono::{DateTime, SecondsFormat, Utc};

use crate::crd::tenant::{Condition, ConditionStatus};

/// When an upsert moves `lastTransitionTime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Only on first insert or when `status` actually changes.
    #[default]
    OnStatusChange,
    /// On every upsert, even if `status` is unchanged.
    Always,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown transition policy {0:?} (expected on-change or always)")]
pub struct UnknownPolicy(pub String);

impl std::str::FromStr for TransitionPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on-change" | "on-status-change" => Ok(TransitionPolicy::OnStatusChange),
            "always" => Ok(TransitionPolicy::Always),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for TransitionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionPolicy::OnStatusChange => write!(f, "on-change"),
            TransitionPolicy::Always => write!(f, "always"),
        }
    }
}

pub fn format_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Upsert a condition by type.
///
/// An existing entry of the same type is overwritten in place, otherwise a new
/// entry is appended. Entries are never removed and first-insertion order is
/// kept.
pub fn upsert(
    conditions: &mut Vec<Condition>,
    type_: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
    policy: TransitionPolicy,
) {
    let now = format_time(now);
    if let Some(existing) = conditions.iter_mut().find(|c| c.type_ == type_) {
        let transitioned = existing.status != status;
        existing.status = status;
        existing.reason = reason.to_string();
        existing.message = message.to_string();
        if transitioned || policy == TransitionPolicy::Always {
            existing.last_transition_time = now;
        }
        return;
    }

    conditions.push(Condition {
        type_: type_.to_string(),
        status,
        reason: reason.to_string(),
        message: message.to_string(),
        last_transition_time: now,
    });
}
