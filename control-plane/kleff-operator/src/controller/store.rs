//! Access to the cluster API for the Tenant reconciler.
//!
//! [`TenantStore`] is the whole contract the reconciler needs from the API
//! server. Every Tenant write carries the `resourceVersion` the caller read, so
//! a concurrent edit surfaces as [`StoreError::Conflict`] rather than being
//! overwritten.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, trace};

#[cfg(test)]
use mockall::automock;

use crate::crd::tenant::{Tenant, TenantStatus};

/// Namespace/name identity of a Tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantKey {
    pub namespace: String,
    pub name: String,
}

impl TenantKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_tenant(tenant: &Tenant) -> Option<Self> {
        Some(Self::new(tenant.namespace()?, tenant.name_any()))
    }
}

impl std::fmt::Display for TenantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("api error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("kubernetes client error: {0}")]
    Kube(kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(ae) if ae.code == 404 => {
                StoreError::NotFound(ae.message)
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                StoreError::Conflict(ae.message)
            }
            kube::Error::Api(ae) => StoreError::Api {
                code: ae.code,
                message: ae.message,
            },
            other => StoreError::Kube(other),
        }
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Fetch a Tenant; `None` when it no longer exists.
    async fn get_tenant(
        &self,
        key: &TenantKey,
    ) -> Result<Option<Tenant>, StoreError>;

    /// Replace the finalizer list, guarded by the Tenant's resourceVersion.
    ///
    /// Returns the stored object so later writes use the new version.
    async fn update_finalizers(
        &self,
        tenant: &Tenant,
        finalizers: Vec<String>,
    ) -> Result<Tenant, StoreError>;

    /// Replace the status subresource, guarded by the Tenant's resourceVersion.
    async fn update_status(
        &self,
        tenant: &Tenant,
        status: &TenantStatus,
    ) -> Result<Tenant, StoreError>;

    async fn get_namespace(
        &self,
        name: &str,
    ) -> Result<Option<Namespace>, StoreError>;

    async fn create_namespace(
        &self,
        namespace: &Namespace,
    ) -> Result<(), StoreError>;

    /// Delete a namespace; a missing namespace is `StoreError::NotFound`.
    async fn delete_namespace(&self, name: &str) -> Result<(), StoreError>;
}

/// [`TenantStore`] backed by the Kubernetes API server.
pub struct KubeTenantStore {
    client: Client,
}

impl KubeTenantStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn tenants(&self, tenant: &Tenant) -> Api<Tenant> {
        match tenant.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

/// Merge-patch metadata carrying the optimistic-concurrency precondition.
fn versioned_metadata(tenant: &Tenant) -> serde_json::Value {
    match tenant.resource_version() {
        Some(rv) => json!({ "resourceVersion": rv }),
        None => json!({}),
    }
}

#[async_trait]
impl TenantStore for KubeTenantStore {
    async fn get_tenant(
        &self,
        key: &TenantKey,
    ) -> Result<Option<Tenant>, StoreError> {
        let api: Api<Tenant> =
            Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn update_finalizers(
        &self,
        tenant: &Tenant,
        finalizers: Vec<String>,
    ) -> Result<Tenant, StoreError> {
        let mut metadata = versioned_metadata(tenant);
        metadata["finalizers"] = json!(finalizers);
        let patch = json!({ "metadata": metadata });
        trace!(tenant = %tenant.name_any(), ?patch, "store: patching finalizers");
        Ok(self
            .tenants(tenant)
            .patch(
                &tenant.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn update_status(
        &self,
        tenant: &Tenant,
        status: &TenantStatus,
    ) -> Result<Tenant, StoreError> {
        let patch = json!({
            "metadata": versioned_metadata(tenant),
            "status": serde_json::to_value(status)?,
        });
        trace!(tenant = %tenant.name_any(), "store: patching status");
        Ok(self
            .tenants(tenant)
            .patch_status(
                &tenant.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?)
    }

    async fn get_namespace(
        &self,
        name: &str,
    ) -> Result<Option<Namespace>, StoreError> {
        Ok(self.namespaces().get_opt(name).await?)
    }

    async fn create_namespace(
        &self,
        namespace: &Namespace,
    ) -> Result<(), StoreError> {
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await?;
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), StoreError> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await?;
        debug!(namespace = %name, "store: namespace deletion accepted");
        Ok(())
    }
}
