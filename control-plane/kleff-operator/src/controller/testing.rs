//! In-memory [`TenantStore`] for reconciler tests.
//!
//! Mirrors the parts of API server behaviour the reconciler relies on:
//! resourceVersion preconditions, final removal of a deleting Tenant once its
//! finalizer list is empty, and 404 on deleting a missing namespace.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use super::store::{StoreError, TenantKey, TenantStore};
use crate::crd::tenant::{Tenant, TenantSpec, TenantStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetTenant,
    UpdateFinalizers,
    UpdateStatus,
    GetNamespace(String),
    CreateNamespace(String),
    DeleteNamespace(String),
}

#[derive(Default)]
struct State {
    tenants: HashMap<TenantKey, Tenant>,
    namespaces: BTreeMap<String, Namespace>,
    version: u64,
    calls: Vec<Call>,
    fail_create: Option<String>,
    fail_delete: Option<String>,
    conflict_next_write: bool,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

pub fn tenant(name: &str, user_id: &str, username: &str, plan: &str) -> Tenant {
    let mut t = Tenant::new(
        name,
        TenantSpec {
            user_id: user_id.into(),
            username: username.into(),
            plan: plan.into(),
        },
    );
    t.metadata.namespace = Some("tenants".into());
    t
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_tenant(&self, mut tenant: Tenant) -> TenantKey {
        let mut s = self.state.lock().unwrap();
        s.version += 1;
        tenant.metadata.resource_version = Some(s.version.to_string());
        let key = TenantKey::from_tenant(&tenant).unwrap();
        s.tenants.insert(key.clone(), tenant);
        key
    }

    pub fn insert_namespace(&self, name: &str) {
        let ns = Namespace {
            metadata: kube::core::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .namespaces
            .insert(name.to_string(), ns);
    }

    /// Set the deletion marker, as the API server does on DELETE with finalizers.
    pub fn request_deletion(&self, key: &TenantKey) {
        let mut s = self.state.lock().unwrap();
        s.version += 1;
        let version = s.version.to_string();
        if let Some(t) = s.tenants.get_mut(key) {
            t.metadata.deletion_timestamp =
                Some(Time(k8s_openapi::chrono::Utc::now()));
            t.metadata.resource_version = Some(version);
        }
    }

    pub fn fail_namespace_create(&self, message: &str) {
        self.state.lock().unwrap().fail_create = Some(message.to_string());
    }

    pub fn fail_namespace_delete(&self, message: &str) {
        self.state.lock().unwrap().fail_delete = Some(message.to_string());
    }

    pub fn heal(&self) {
        let mut s = self.state.lock().unwrap();
        s.fail_create = None;
        s.fail_delete = None;
    }

    /// Simulate a concurrent edit landing before our next Tenant write.
    pub fn conflict_on_next_write(&self) {
        self.state.lock().unwrap().conflict_next_write = true;
    }

    pub fn tenant(&self, key: &TenantKey) -> Option<Tenant> {
        self.state.lock().unwrap().tenants.get(key).cloned()
    }

    pub fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.lock().unwrap().namespaces.get(name).cloned()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.keys().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn write_tenant<F>(&self, tenant: &Tenant, call: Call, apply: F) -> Result<Tenant, StoreError>
    where
        F: FnOnce(&mut Tenant),
    {
        let mut s = self.state.lock().unwrap();
        s.calls.push(call);
        let key = TenantKey::from_tenant(tenant)
            .ok_or_else(|| StoreError::NotFound(tenant.name_any()))?;
        if std::mem::take(&mut s.conflict_next_write) {
            s.version += 1;
            let version = s.version.to_string();
            if let Some(stored) = s.tenants.get_mut(&key) {
                stored.metadata.resource_version = Some(version);
            }
        }
        s.version += 1;
        let next_version = s.version.to_string();
        let stored = s
            .tenants
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if stored.metadata.resource_version != tenant.metadata.resource_version {
            return Err(StoreError::Conflict(format!(
                "{key} was modified; please apply your changes to the latest version"
            )));
        }
        apply(stored);
        stored.metadata.resource_version = Some(next_version);
        let out = stored.clone();
        if out.is_deletion_requested() && out.finalizers().is_empty() {
            s.tenants.remove(&key);
        }
        Ok(out)
    }
}

#[async_trait]
impl TenantStore for InMemoryStore {
    async fn get_tenant(
        &self,
        key: &TenantKey,
    ) -> Result<Option<Tenant>, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::GetTenant);
        Ok(s.tenants.get(key).cloned())
    }

    async fn update_finalizers(
        &self,
        tenant: &Tenant,
        finalizers: Vec<String>,
    ) -> Result<Tenant, StoreError> {
        self.write_tenant(tenant, Call::UpdateFinalizers, |stored| {
            stored.metadata.finalizers = Some(finalizers);
        })
    }

    async fn update_status(
        &self,
        tenant: &Tenant,
        status: &TenantStatus,
    ) -> Result<Tenant, StoreError> {
        let status = status.clone();
        self.write_tenant(tenant, Call::UpdateStatus, |stored| {
            stored.status = Some(status);
        })
    }

    async fn get_namespace(
        &self,
        name: &str,
    ) -> Result<Option<Namespace>, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::GetNamespace(name.to_string()));
        Ok(s.namespaces.get(name).cloned())
    }

    async fn create_namespace(
        &self,
        namespace: &Namespace,
    ) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        let name = namespace.name_any();
        s.calls.push(Call::CreateNamespace(name.clone()));
        if let Some(message) = s.fail_create.clone() {
            return Err(StoreError::Api { code: 403, message });
        }
        if s.namespaces.contains_key(&name) {
            return Err(StoreError::Conflict(format!("{name} already exists")));
        }
        s.namespaces.insert(name, namespace.clone());
        Ok(())
    }

    async fn delete_namespace(&self, name: &str) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        s.calls.push(Call::DeleteNamespace(name.to_string()));
        if let Some(message) = s.fail_delete.clone() {
            return Err(StoreError::Api { code: 500, message });
        }
        match s.namespaces.remove(name) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }
}
