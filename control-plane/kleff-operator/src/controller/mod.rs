pub mod conditions;
pub mod events;
pub mod finalizer;
pub mod provisioner;
pub mod reconcile;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::{
    Client, ResourceExt,
    api::Api,
    runtime::{
        Controller,
        controller::{Action, Config as ControllerConfig},
        reflector::ObjectRef,
        watcher,
    },
};
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::tenant::Tenant;
use conditions::TransitionPolicy;
use events::{EventPublisher, KubeEventPublisher};
use provisioner::{ProvisionError, managed_selector, owner_of};
use reconcile::reconcile;
use store::{KubeTenantStore, StoreError, TenantStore};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("store error: {0}")]
    Store(StoreError),

    /// The Tenant changed since it was read; retry against a fresh copy.
    #[error("optimistic concurrency conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error("tenant {0} has no namespace")]
    MissingNamespace(String),

    #[error("invalid tenant spec: {0}")]
    InvalidSpec(String),
}

impl ReconcileErr {
    pub fn is_conflict(&self) -> bool {
        matches!(self, ReconcileErr::Conflict(_))
    }

    /// Retrying without a spec change cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ReconcileErr::InvalidSpec(_) | ReconcileErr::MissingNamespace(_)
        )
    }
}

impl From<StoreError> for ReconcileErr {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => ReconcileErr::Conflict(msg),
            other => ReconcileErr::Store(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub transition_policy: TransitionPolicy,
    pub resync: Duration,
    pub error_requeue: Duration,
    pub conflict_requeue: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            transition_policy: TransitionPolicy::default(),
            resync: Duration::from_secs(60),
            error_requeue: Duration::from_secs(30),
            conflict_requeue: Duration::from_secs(1),
        }
    }
}

impl ReconcileSettings {
    pub fn from_config(cfg: &OperatorConfig) -> Self {
        Self {
            transition_policy: cfg.transition_policy(),
            resync: cfg.resync_interval(),
            error_requeue: cfg.error_requeue(),
            conflict_requeue: cfg.conflict_requeue(),
        }
    }
}

#[derive(Clone)]
pub struct ControllerContext {
    pub store: Arc<dyn TenantStore>,
    pub events: Arc<dyn EventPublisher>,
    pub settings: ReconcileSettings,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: &OperatorConfig) -> Self {
        Self {
            store: Arc::new(KubeTenantStore::new(client.clone())),
            events: Arc::new(KubeEventPublisher::new(client, &cfg.reporter_name)),
            settings: ReconcileSettings::from_config(cfg),
        }
    }

    #[cfg(test)]
    pub fn for_testing(
        store: Arc<dyn TenantStore>,
        events: Arc<dyn EventPublisher>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            events,
            settings,
        }
    }
}

pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let tenants: Api<Tenant> = match cfg.watch_namespace.as_deref() {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    };
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ctx = Arc::new(ControllerContext::new(client, &cfg));
    info!(
        watch_namespace = ?cfg.watch_namespace,
        concurrency = cfg.max_concurrent_reconciles,
        policy = %ctx.settings.transition_policy,
        "starting tenant controller"
    );

    Controller::new(tenants, watcher::Config::default())
        .with_config(
            ControllerConfig::default()
                .concurrency(cfg.max_concurrent_reconciles),
        )
        .watches(
            namespaces,
            watcher::Config::default().labels(&managed_selector()),
            tenant_for_namespace,
        )
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    info!(tenant = %obj_ref, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    info!("tenant controller stopped");
    Ok(())
}

/// Route events on a managed namespace back to its Tenant.
fn tenant_for_namespace(ns: Namespace) -> Option<ObjectRef<Tenant>> {
    let key = owner_of(&ns)?;
    Some(ObjectRef::new(&key.name).within(&key.namespace))
}

pub fn error_policy(
    obj: Arc<Tenant>,
    err: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    let name = obj.name_any();
    if err.is_permanent() {
        warn!(%name, error = %err, "reconcile failed permanently; waiting for a spec change");
        return Action::await_change();
    }
    let delay = if err.is_conflict() {
        ctx.settings.conflict_requeue
    } else {
        ctx.settings.error_requeue
    };
    warn!(%name, error = %err, ?delay, "reconcile failed; requeueing");
    Action::requeue(delay)
}
