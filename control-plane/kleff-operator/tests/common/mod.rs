#![allow(dead_code)]

use std::time::Duration;

use envconfig::Envconfig;
use k8s_openapi::api::core::v1::Namespace;
use kleff_operator::config::OperatorConfig;
use kleff_operator::crd::tenant::{Tenant, TenantSpec};
use kube::{Client, api::Api};
use tokio::task::JoinHandle;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

// Env guard utilities
pub struct EnvGuard {
    key: &'static str,
    old: Option<String>,
}
impl Drop for EnvGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(ref v) = self.old {
                std::env::set_var(self.key, v);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }
}
pub fn set_env(key: &'static str, val: &str) -> EnvGuard {
    let old = std::env::var(key).ok();
    unsafe {
        std::env::set_var(key, val);
    }
    EnvGuard { key, old }
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig::init_from_env()
        .expect("operator config")
        .apply_profile_defaults()
}

pub fn tenant(name: &str, user_id: &str) -> Tenant {
    Tenant::new(
        name,
        TenantSpec {
            user_id: user_id.to_string(),
            username: "it-user".into(),
            plan: "free".into(),
        },
    )
}

pub async fn wait_for_namespace(name: &str, client: Client) -> Namespace {
    let ns_api: Api<Namespace> = Api::all(client);
    for _ in 0..60 {
        if let Ok(Some(ns)) = ns_api.get_opt(name).await {
            return ns;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    panic!("namespace {} not created in time", name);
}

/// Waits until the namespace is gone or terminating.
pub async fn wait_for_namespace_release(name: &str, client: Client) {
    let ns_api: Api<Namespace> = Api::all(client);
    for _ in 0..60 {
        match ns_api.get_opt(name).await {
            Ok(None) => return,
            Ok(Some(ns)) if ns.metadata.deletion_timestamp.is_some() => return,
            _ => {}
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    panic!("namespace {} not deleted in time", name);
}

pub async fn wait_for_tenant_gone(ns: &str, name: &str, client: Client) {
    let api: Api<Tenant> = Api::namespaced(client, ns);
    for _ in 0..60 {
        if let Ok(None) = api.get_opt(name).await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;
    }
    panic!("tenant {}/{} not released in time", ns, name);
}

// RAII guard to ensure controller abort + best-effort cleanup
pub struct ControllerGuard {
    ns: String,
    tenant: String,
    namespace: String,
    client: Client,
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn new(ns: &str, tenant: &str, namespace: &str, client: Client) -> Self {
        Self {
            ns: ns.to_string(),
            tenant: tenant.to_string(),
            namespace: namespace.to_string(),
            client,
            ctrl: None,
        }
    }
    pub fn with_controller(mut self, ctrl: JoinHandle<()>) -> Self {
        self.ctrl = Some(ctrl);
        self
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
        let ns = self.ns.clone();
        let tenant = self.tenant.clone();
        let namespace = self.namespace.clone();
        let client = self.client.clone();
        let _ = tokio::spawn(async move {
            let tenants: Api<Tenant> = Api::namespaced(client.clone(), &ns);
            let _ = tenants
                .patch(
                    &tenant,
                    &kube::api::PatchParams::default(),
                    &kube::api::Patch::Merge(serde_json::json!({
                        "metadata": { "finalizers": null }
                    })),
                )
                .await;
            let _ = tenants.delete(&tenant, &Default::default()).await;
            let namespaces: Api<Namespace> = Api::all(client);
            let _ = namespaces.delete(&namespace, &Default::default()).await;
        });
    }
}
