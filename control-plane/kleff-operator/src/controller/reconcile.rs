use std::sync::Arc;

use chrono::Utc;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use tracing::{debug, info, instrument, trace, warn};

use super::conditions::upsert;
use super::events::{NAMESPACE_CREATED_NOTE, actions, reasons};
use super::finalizer::{
    GateDecision, LifecycleEvent, LifecycleState, TENANT_FINALIZER,
    has_finalizer, with_finalizer, without_finalizer,
};
use super::provisioner::{
    EnsureOutcome, NamespaceProvisioner, NamespaceTemplate, namespace_name,
};
use super::store::TenantKey;
use super::{ControllerContext, ReconcileErr};
use crate::crd::tenant::{
    ConditionStatus, Tenant, TenantStatus, condition_reasons, condition_types,
};

const TENANT_READY_MESSAGE: &str = "All subresources are ready";

/// Result of a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The Tenant is no longer in the store.
    NotFound,
    /// Deletion finished, or there was nothing left for us to release.
    Released,
    /// Namespace present and status recorded.
    Converged,
}

impl ReconcileOutcome {
    /// Whether a periodic resync should follow.
    pub fn requeue(&self) -> bool {
        matches!(self, ReconcileOutcome::Converged)
    }
}

/// Entry point for `kube::runtime::Controller`.
///
/// The cached object only supplies the key; the Tenant is re-read from the
/// store so every decision is made on the latest persisted state.
#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<Tenant>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let key = TenantKey::from_tenant(&obj)
        .ok_or_else(|| ReconcileErr::MissingNamespace(obj.name_any()))?;
    let outcome = reconcile_tenant(&key, &ctx).await?;
    Ok(if outcome.requeue() {
        Action::requeue(ctx.settings.resync)
    } else {
        Action::await_change()
    })
}

/// Converge one Tenant. Safe to re-run at any point.
pub async fn reconcile_tenant(
    key: &TenantKey,
    ctx: &ControllerContext,
) -> Result<ReconcileOutcome, ReconcileErr> {
    let Some(tenant) = ctx.store.get_tenant(key).await? else {
        debug!(%key, "reconcile: tenant not found; nothing to do");
        return Ok(ReconcileOutcome::NotFound);
    };

    info!(
        %key,
        user_id = %tenant.spec.user_id,
        plan = %tenant.spec.plan,
        "reconcile: reconciling tenant"
    );

    let state = LifecycleState::of(&tenant);
    match state.decision() {
        GateDecision::NoOp => {
            debug!(%key, "reconcile: finalizer already released");
            Ok(ReconcileOutcome::Released)
        }
        GateDecision::RunDeletionSequence => {
            run_deletion(key, &tenant, state, ctx).await
        }
        GateDecision::EnsureFinalizerPresent => {
            converge(key, tenant, ctx).await
        }
    }
}

async fn run_deletion(
    key: &TenantKey,
    tenant: &Tenant,
    state: LifecycleState,
    ctx: &ControllerContext,
) -> Result<ReconcileOutcome, ReconcileErr> {
    let name = namespace_name(&tenant.spec);
    if name.is_empty() {
        // Nothing can have been provisioned for an empty userId.
        warn!(%key, "reconcile: tenant has no userId; releasing without namespace cleanup");
    } else {
        info!(%key, namespace = %name, "reconcile: deletion requested; removing namespace");
        let outcome = NamespaceProvisioner::new(ctx.store.as_ref())
            .ensure_absent(name)
            .await?;
        debug!(%key, ?outcome, "reconcile: namespace absent");
    }

    info!(%key, "reconcile: removing finalizer");
    ctx.store
        .update_finalizers(tenant, without_finalizer(tenant.finalizers()))
        .await?;
    let next = state.transition(LifecycleEvent::FinalizerReleased);
    debug!(%key, ?next, "reconcile: deletion sequence complete");
    Ok(ReconcileOutcome::Released)
}

async fn converge(
    key: &TenantKey,
    tenant: Tenant,
    ctx: &ControllerContext,
) -> Result<ReconcileOutcome, ReconcileErr> {
    // Persist the finalizer before anything exists that it would have to guard.
    let tenant = if has_finalizer(tenant.finalizers()) {
        tenant
    } else {
        info!(%key, finalizer = TENANT_FINALIZER, "reconcile: adding finalizer");
        ctx.store
            .update_finalizers(&tenant, with_finalizer(tenant.finalizers()))
            .await?
    };

    let mut status = tenant.status.clone().unwrap_or_default();
    let provisioned = ensure_namespace(key, &tenant, &mut status, ctx).await;

    let persisted = persist_status(key, &tenant, status, ctx).await;
    // Prefer the provisioning cause when both failed.
    if let (Err(_), Err(e)) = (&provisioned, &persisted) {
        warn!(%key, error = %e, "reconcile: status write failed after provisioning failure");
    }
    provisioned?;
    persisted?;
    Ok(ReconcileOutcome::Converged)
}

/// Ensure the tenant namespace and record the outcome in `status`.
async fn ensure_namespace(
    key: &TenantKey,
    tenant: &Tenant,
    status: &mut TenantStatus,
    ctx: &ControllerContext,
) -> Result<(), ReconcileErr> {
    let policy = ctx.settings.transition_policy;
    let name = namespace_name(&tenant.spec);
    if name.is_empty() {
        let err = ReconcileErr::InvalidSpec("spec.userId must not be empty".into());
        upsert(
            &mut status.conditions,
            condition_types::NAMESPACE_NOT_READY,
            ConditionStatus::False,
            condition_reasons::INVALID_SPEC,
            &err.to_string(),
            Utc::now(),
            policy,
        );
        return Err(err);
    }

    let template = NamespaceTemplate::for_tenant(key, &tenant.spec);
    match NamespaceProvisioner::new(ctx.store.as_ref())
        .ensure_exists(name, &template)
        .await
    {
        Ok(outcome) => {
            if outcome == EnsureOutcome::Created {
                ctx.events
                    .publish(
                        &tenant.object_ref(&()),
                        EventType::Normal,
                        reasons::NAMESPACE_READY,
                        actions::PROVISION,
                        Some(NAMESPACE_CREATED_NOTE.to_string()),
                    )
                    .await;
            }
            upsert(
                &mut status.conditions,
                condition_types::TENANT_READY,
                ConditionStatus::True,
                condition_reasons::ALL_SUBRESOURCES_READY,
                TENANT_READY_MESSAGE,
                Utc::now(),
                policy,
            );
            Ok(())
        }
        Err(e) => {
            warn!(%key, namespace = %name, error = %e, "reconcile: failed to ensure namespace");
            upsert(
                &mut status.conditions,
                condition_types::NAMESPACE_NOT_READY,
                ConditionStatus::False,
                condition_reasons::NAMESPACE_NOT_READY,
                &format!("Failed to add namespace for tenant: {e}"),
                Utc::now(),
                policy,
            );
            Err(e.into())
        }
    }
}

async fn persist_status(
    key: &TenantKey,
    tenant: &Tenant,
    status: TenantStatus,
    ctx: &ControllerContext,
) -> Result<(), ReconcileErr> {
    let current = tenant.status.clone().unwrap_or_default();
    if current == status {
        trace!(%key, "reconcile: status unchanged; skipping write");
        return Ok(());
    }
    trace!(%key, "reconcile: status changed; writing status");
    ctx.store.update_status(tenant, &status).await?;
    Ok(())
}
