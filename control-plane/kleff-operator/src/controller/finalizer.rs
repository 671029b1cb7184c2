//! Finalizer gate for Tenant deletion.
//!
//! A Tenant moves through three states, observed from its deletion marker and
//! its finalizer list:
//!
//! ```text
//! Active --(deletion requested)--> Deleting --(finalizer released)--> Released
//! ```
//!
//! Only `Deleting` blocks physical removal by the API server. The gate is pure;
//! all I/O happens in the reconciler.

use crate::crd::tenant::Tenant;

pub const TENANT_FINALIZER: &str = "kleff.io/tenant-finalizer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No deletion marker.
    Active,
    /// Deletion marker set and our finalizer still present.
    Deleting,
    /// Deletion marker set and our finalizer gone.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    DeletionRequested,
    FinalizerReleased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    EnsureFinalizerPresent,
    RunDeletionSequence,
    NoOp,
}

impl LifecycleState {
    pub fn observe(deletion_requested: bool, finalizers: &[String]) -> Self {
        match (deletion_requested, has_finalizer(finalizers)) {
            (false, _) => LifecycleState::Active,
            (true, true) => LifecycleState::Deleting,
            (true, false) => LifecycleState::Released,
        }
    }

    pub fn of(tenant: &Tenant) -> Self {
        Self::observe(tenant.is_deletion_requested(), tenant.finalizers())
    }

    pub fn decision(self) -> GateDecision {
        match self {
            LifecycleState::Active => GateDecision::EnsureFinalizerPresent,
            LifecycleState::Deleting => GateDecision::RunDeletionSequence,
            LifecycleState::Released => GateDecision::NoOp,
        }
    }

    /// Released is terminal; a deletion marker can never be withdrawn.
    pub fn transition(self, event: LifecycleEvent) -> Self {
        match (self, event) {
            (LifecycleState::Active, LifecycleEvent::DeletionRequested) => {
                LifecycleState::Deleting
            }
            (LifecycleState::Deleting, LifecycleEvent::FinalizerReleased) => {
                LifecycleState::Released
            }
            (state, _) => state,
        }
    }
}

pub fn has_finalizer(finalizers: &[String]) -> bool {
    finalizers.iter().any(|f| f == TENANT_FINALIZER)
}

/// Finalizer list with our token appended when missing.
pub fn with_finalizer(finalizers: &[String]) -> Vec<String> {
    let mut out = finalizers.to_vec();
    if !has_finalizer(&out) {
        out.push(TENANT_FINALIZER.to_string());
    }
    out
}

/// Finalizer list with our token removed; foreign tokens are kept.
pub fn without_finalizer(finalizers: &[String]) -> Vec<String> {
    finalizers
        .iter()
        .filter(|f| *f != TENANT_FINALIZER)
        .cloned()
        .collect()
}
