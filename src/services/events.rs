//! Event types pushed to GraphQL subscribers.
//!
//! Every event is scoped to one project; subscribers filter by project id
//! and re-check their access before delivery.

use serde::{Deserialize, Serialize};

use crate::db::{Model, Project, Version};

/// All events carried by the broadcaster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum HubEvent {
    /// Project metadata changed
    ProjectUpdated(ProjectEvent),
    /// Project was deleted
    ProjectDeleted(ProjectDeletedEvent),
    /// A model was created, updated or deleted
    ModelChanged(ModelEvent),
    /// A version was created, updated or deleted
    VersionChanged(VersionEvent),
}

impl HubEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            HubEvent::ProjectUpdated(_) => "project:updated",
            HubEvent::ProjectDeleted(_) => "project:deleted",
            HubEvent::ModelChanged(_) => "model:changed",
            HubEvent::VersionChanged(_) => "version:changed",
        }
    }

    /// The project this event belongs to.
    pub fn project_id(&self) -> &str {
        match self {
            HubEvent::ProjectUpdated(e) => &e.project.id,
            HubEvent::ProjectDeleted(e) => &e.project.id,
            HubEvent::ModelChanged(e) => &e.project_id,
            HubEvent::VersionChanged(e) => &e.project_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEvent {
    pub project: Project,
}

/// The project row is gone by the time this is delivered, so the event
/// carries who could see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDeletedEvent {
    pub project: Project,
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvent {
    pub project_id: String,
    pub model_id: String,
    pub kind: ChangeKind,
    /// Absent for deletions.
    pub model: Option<Model>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEvent {
    pub project_id: String,
    pub model_id: String,
    pub version_id: String,
    pub kind: ChangeKind,
    /// Absent for deletions.
    pub version: Option<Version>,
}
