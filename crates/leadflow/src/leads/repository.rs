use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    Agent, AgentId, CallCenter, CallCenterId, CallbackReminder, InvariantViolation, Lead, LeadId,
    LeadNote,
};

/// Working copy of one locked lead row plus the related rows staged alongside it.
///
/// Nothing here is visible to other readers until the repository commits the unit.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    pub lead: Lead,
    notes: Vec<LeadNote>,
    reminders: Vec<CallbackReminder>,
}

impl UnitOfWork {
    pub fn new(lead: Lead) -> Self {
        Self {
            lead,
            notes: Vec::new(),
            reminders: Vec::new(),
        }
    }

    pub fn add_note(&mut self, note: LeadNote) {
        self.notes.push(note);
    }

    pub fn add_reminder(&mut self, reminder: CallbackReminder) {
        self.reminders.push(reminder);
    }

    pub fn staged_notes(&self) -> &[LeadNote] {
        &self.notes
    }

    pub fn staged_reminders(&self) -> &[CallbackReminder] {
        &self.reminders
    }

    pub fn into_parts(self) -> (Lead, Vec<LeadNote>, Vec<CallbackReminder>) {
        (self.lead, self.notes, self.reminders)
    }
}

/// Live per-agent aggregate derived from the lead table at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentStats {
    pub agent: Agent,
    /// Assigned leads not yet in a final status.
    pub workload: u32,
    pub confirmed: u32,
    pub total_assigned: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
}

impl AgentStats {
    pub fn idle(agent: Agent) -> Self {
        Self {
            agent,
            workload: 0,
            confirmed: 0,
            total_assigned: 0,
            last_assigned_at: None,
        }
    }

    /// Confirmed-to-assigned ratio; agents without history rank as 0.0.
    pub fn performance(&self) -> f64 {
        if self.total_assigned == 0 {
            0.0
        } else {
            f64::from(self.confirmed) / f64::from(self.total_assigned)
        }
    }
}

/// Related-row counts used by scoring, fetched once per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeadActivity {
    pub notes: u32,
    pub reminders: u32,
    /// Reminders whose due time has not passed yet.
    pub open_reminders: u32,
}

/// Storage abstraction over leads, agents, and call centers.
///
/// `transact` is the single atomic read-modify-write primitive: implementations must
/// hold an exclusive lock on the lead row while `work` runs, commit the unit when it returns
/// `Ok`, and discard it otherwise.
pub trait LeadRepository: Send + Sync {
    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError>;
    fn fetch_lead(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn transact<T, E, F>(&self, id: &LeadId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>;

    fn upsert_call_center(&self, call_center: CallCenter) -> Result<(), RepositoryError>;
    fn call_center(&self, id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError>;
    fn upsert_agent(&self, agent: Agent) -> Result<(), RepositoryError>;
    fn agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    /// Every agent of the call center, active or not, with its live aggregates.
    fn agent_stats(&self, call_center: &CallCenterId) -> Result<Vec<AgentStats>, RepositoryError>;

    /// Routable leads without an agent, excluding manual call centers, oldest first.
    fn unassigned_routable(&self, limit: Option<usize>) -> Result<Vec<LeadId>, RepositoryError>;
    /// Leads scored before `stale_before` or never scored; every lead when `None`.
    fn score_candidates(
        &self,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeadId>, RepositoryError>;
    fn activity_counts(
        &self,
        ids: &[LeadId],
        now: DateTime<Utc>,
    ) -> Result<HashMap<LeadId, LeadActivity>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("refusing to commit inconsistent lead: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
