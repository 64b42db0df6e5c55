//! Event broadcaster for GraphQL subscriptions.
//!
//! Provides a multi-client broadcast channel for real-time event distribution.
//! Mutations emit events through this broadcaster, and subscription streams
//! receive them and filter based on the subscriber's permissions.

use std::sync::Arc;
use tokio::sync::broadcast;

use super::events::{
    ChangeKind, HubEvent, ModelEvent, ProjectDeletedEvent, ProjectEvent, VersionEvent,
};
use crate::db::{Model, Project, Version};

/// Channel capacity for event broadcasting.
/// Should be large enough to handle bursts without losing events.
const CHANNEL_CAPACITY: usize = 1000;

/// Event broadcaster service.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<HubEvent>,
}

impl EventBroadcaster {
    /// Create a new event broadcaster.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Emit an event to all subscribers.
    ///
    /// If there are no subscribers, the event is silently dropped.
    pub fn emit(&self, event: HubEvent) {
        tracing::trace!(event_type = event.event_type(), project_id = event.project_id(), "Emitting event");
        // Ignore send errors (no subscribers is fine)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events.
    ///
    /// The receiver gets every event; callers filter by project and access.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.sender.subscribe()
    }

    /// Number of live receivers, i.e. open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn project_updated(&self, project: &Project) {
        self.emit(HubEvent::ProjectUpdated(ProjectEvent {
            project: project.clone(),
        }));
    }

    pub fn project_deleted(&self, project: &Project, member_ids: Vec<String>) {
        self.emit(HubEvent::ProjectDeleted(ProjectDeletedEvent {
            project: project.clone(),
            member_ids,
        }));
    }

    /// Emit a model change. Deletions pass the last known row.
    pub fn model_changed(&self, kind: ChangeKind, model: &Model) {
        self.emit(HubEvent::ModelChanged(ModelEvent {
            project_id: model.project_id.clone(),
            model_id: model.id.clone(),
            kind,
            model: (kind != ChangeKind::Deleted).then(|| model.clone()),
        }));
    }

    /// Emit a version change. Deletions pass the last known row.
    pub fn version_changed(&self, kind: ChangeKind, version: &Version) {
        self.emit(HubEvent::VersionChanged(VersionEvent {
            project_id: version.project_id.clone(),
            model_id: version.model_id.clone(),
            version_id: version.id.clone(),
            kind,
            version: (kind != ChangeKind::Deleted).then(|| version.clone()),
        }));
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared event broadcaster wrapped in Arc for use across services.
pub type SharedEventBroadcaster = Arc<EventBroadcaster>;
