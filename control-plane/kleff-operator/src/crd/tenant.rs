use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition types written to `status.conditions`.
pub mod condition_types {
    pub const TENANT_READY: &str = "TenantReady";
    pub const NAMESPACE_NOT_READY: &str = "NamespaceNotReady";
}

/// Machine-readable reasons attached to conditions.
pub mod condition_reasons {
    pub const ALL_SUBRESOURCES_READY: &str = "AllSubresourcesReady";
    pub const NAMESPACE_NOT_READY: &str = "NamespaceNotReady";
    pub const INVALID_SPEC: &str = "InvalidSpec";
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "kleff.kleff.io",
    version = "v1",
    kind = "Tenant",
    plural = "tenants",
    namespaced,
    status = "TenantStatus",
    printcolumn = r#"{"name":"UserId","type":"string","jsonPath":".spec.userId"}"#,
    printcolumn = r#"{"name":"Plan","type":"string","jsonPath":".spec.plan"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"TenantReady\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Identifier of the owning user; also the name of the tenant namespace
    pub user_id: String,
    pub username: String,
    /// Billing plan, copied onto the namespace as a label
    pub plan: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    /// Ordered by first insertion; at most one entry per type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    /// RFC 3339 timestamp
    pub last_transition_time: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

impl TenantStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

impl Tenant {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.status.as_ref().and_then(|s| s.condition(type_))
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn finalizers(&self) -> &[String] {
        self.metadata.finalizers.as_deref().unwrap_or(&[])
    }
}
