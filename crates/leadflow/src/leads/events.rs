use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{AgentId, Lead, LeadId, LeadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadEventKind {
    Created,
    EmailConfirmed,
    Assigned,
    StatusUpdated,
}

/// Lifecycle notification consumed by the audit log and alert evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub lead_id: LeadId,
    pub kind: LeadEventKind,
    pub old_status: Option<LeadStatus>,
    pub new_status: LeadStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    pub occurred_at: DateTime<Utc>,
}

impl LeadEvent {
    pub fn created(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            kind: LeadEventKind::Created,
            old_status: None,
            new_status: lead.status,
            agent_id: None,
            occurred_at: lead.created_at,
        }
    }

    pub fn transition(
        kind: LeadEventKind,
        lead: &Lead,
        old_status: LeadStatus,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead.id.clone(),
            kind,
            old_status: Some(old_status),
            new_status: lead.status,
            agent_id: lead.assigned_agent_id.clone(),
            occurred_at,
        }
    }
}

/// Outbound hook for lifecycle events. Called only after the transition commits.
pub trait LifecycleEventSink: Send + Sync {
    fn publish(&self, event: LeadEvent) -> Result<(), EventError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

/// Sink that keeps events in memory; used by the demo and tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventSink {
    events: Arc<Mutex<Vec<LeadEvent>>>,
}

impl InMemoryEventSink {
    pub fn events(&self) -> Vec<LeadEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn events_for(&self, lead_id: &LeadId) -> Vec<LeadEvent> {
        self.events()
            .into_iter()
            .filter(|event| &event.lead_id == lead_id)
            .collect()
    }
}

impl LifecycleEventSink for InMemoryEventSink {
    fn publish(&self, event: LeadEvent) -> Result<(), EventError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|_| EventError::Transport("event buffer poisoned".to_string()))?;
        guard.push(event);
        Ok(())
    }
}
