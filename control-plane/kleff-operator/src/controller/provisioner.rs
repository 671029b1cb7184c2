//! Namespace provisioning for Tenants.
//!
//! The namespace name is the Tenant's `userId` verbatim; naming constraints
//! are expected to be enforced before a Tenant reaches the operator. Labels
//! are only written at creation time and are not reconciled afterwards.
//!
//! The owning Tenant is recorded in annotations rather than labels: Tenant
//! names may be up to 253 characters, label values only 63.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use kube::core::ObjectMeta;
use tracing::{debug, info};

use super::store::{StoreError, TenantKey, TenantStore};
use crate::crd::tenant::TenantSpec;

pub const MESH_INJECTION_LABEL: &str = "istio-injection";
pub const MESH_INJECTION_ENABLED: &str = "enabled";
pub const USERNAME_LABEL: &str = "tenant-username";
pub const PLAN_LABEL: &str = "tenant-plan";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGER_NAME: &str = "kleff-operator";
pub const TENANT_NAME_ANNOTATION: &str = "kleff.io/tenant-name";
pub const TENANT_NAMESPACE_ANNOTATION: &str = "kleff.io/tenant-namespace";

pub fn namespace_name(spec: &TenantSpec) -> &str {
    &spec.user_id
}

pub fn namespace_labels(spec: &TenantSpec) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            MESH_INJECTION_LABEL.to_string(),
            MESH_INJECTION_ENABLED.to_string(),
        ),
        (USERNAME_LABEL.to_string(), spec.username.clone()),
        (PLAN_LABEL.to_string(), spec.plan.clone()),
        (MANAGED_BY_LABEL.to_string(), MANAGER_NAME.to_string()),
    ])
}

pub fn namespace_annotations(key: &TenantKey) -> BTreeMap<String, String> {
    BTreeMap::from([
        (TENANT_NAME_ANNOTATION.to_string(), key.name.clone()),
        (TENANT_NAMESPACE_ANNOTATION.to_string(), key.namespace.clone()),
    ])
}

/// Metadata written onto a namespace at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceTemplate {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl NamespaceTemplate {
    pub fn for_tenant(key: &TenantKey, spec: &TenantSpec) -> Self {
        Self {
            labels: namespace_labels(spec),
            annotations: namespace_annotations(key),
        }
    }
}

pub fn managed_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGER_NAME)
}

/// Tenant that owns a namespace created by this operator.
pub fn owner_of(namespace: &Namespace) -> Option<TenantKey> {
    let annotations = namespace.annotations();
    Some(TenantKey::new(
        annotations.get(TENANT_NAMESPACE_ANNOTATION)?,
        annotations.get(TENANT_NAME_ANNOTATION)?,
    ))
}

fn desired_namespace(name: &str, template: &NamespaceTemplate) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(template.labels.clone()),
            annotations: Some(template.annotations.clone()),
            ..Default::default()
        },
        ..Default::default()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ProvisionError {
    #[error("failed to look up namespace {name}: {source}")]
    Lookup {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to create namespace {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to delete namespace {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The namespace exists but is being torn down.
    #[error("namespace {name} is terminating")]
    Terminating { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Deleted,
    AlreadyAbsent,
}

pub struct NamespaceProvisioner<'a> {
    store: &'a dyn TenantStore,
}

impl<'a> NamespaceProvisioner<'a> {
    pub fn new(store: &'a dyn TenantStore) -> Self {
        Self { store }
    }

    pub async fn ensure_exists(
        &self,
        name: &str,
        template: &NamespaceTemplate,
    ) -> Result<EnsureOutcome, ProvisionError> {
        let existing = self.store.get_namespace(name).await.map_err(|source| {
            ProvisionError::Lookup {
                name: name.to_string(),
                source,
            }
        })?;

        if let Some(ns) = existing {
            if ns.metadata.deletion_timestamp.is_some() {
                return Err(ProvisionError::Terminating {
                    name: name.to_string(),
                });
            }
            debug!(namespace = %name, "provisioner: namespace already present");
            return Ok(EnsureOutcome::AlreadyPresent);
        }

        match self
            .store
            .create_namespace(&desired_namespace(name, template))
            .await
        {
            Ok(()) => {
                info!(namespace = %name, "provisioner: namespace created");
                Ok(EnsureOutcome::Created)
            }
            // Created between our lookup and create
            Err(StoreError::Conflict(_)) => {
                debug!(namespace = %name, "provisioner: namespace appeared concurrently");
                Ok(EnsureOutcome::AlreadyPresent)
            }
            Err(source) => Err(ProvisionError::Create {
                name: name.to_string(),
                source,
            }),
        }
    }

    pub async fn ensure_absent(
        &self,
        name: &str,
    ) -> Result<RemoveOutcome, ProvisionError> {
        match self.store.delete_namespace(name).await {
            Ok(()) => {
                info!(namespace = %name, "provisioner: namespace deleted");
                Ok(RemoveOutcome::Deleted)
            }
            Err(StoreError::NotFound(_)) => {
                debug!(namespace = %name, "provisioner: namespace already absent");
                Ok(RemoveOutcome::AlreadyAbsent)
            }
            Err(source) => Err(ProvisionError::Delete {
                name: name.to_string(),
                source,
            }),
        }
    }
}
