//! Kubernetes Events for Tenant reconciliation.
//!
//! Publication is fire-and-forget: a failed event is logged and never fails
//! the reconcile that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use tracing::warn;

pub mod reasons {
    /// Tenant namespace was created
    pub const NAMESPACE_READY: &str = "NamespaceReady";
}

pub mod actions {
    pub const PROVISION: &str = "Provision";
}

pub const NAMESPACE_CREATED_NOTE: &str = "Namespace Created Successfully";

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher wrapping `kube::runtime::events::Recorder`.
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "failed to publish event");
        }
    }
}

pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Keeps every published event for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingEventPublisher {
    pub events: std::sync::Mutex<Vec<RecordedEvent>>,
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    pub object: Option<String>,
    pub type_: String,
    pub reason: String,
    pub note: Option<String>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    pub fn recorded(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        note: Option<String>,
    ) {
        self.events.lock().unwrap().push(RecordedEvent {
            object: resource_ref.name.clone(),
            type_: format!("{type_:?}"),
            reason: reason.to_string(),
            note,
        });
    }
}
