mod strategy;

pub use strategy::{
    AgentSelector, InversePerformanceSelector, ManualSelector, SelectionContext,
    WorkloadRoundRobin,
};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::domain::{AgentId, LeadStatus};
use super::events::{LeadEvent, LeadEventKind};
use super::repository::{LeadRepository, RepositoryError, UnitOfWork};

/// What a distribution attempt did with the lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DistributionOutcome {
    Assigned { agent_id: AgentId },
    /// Legitimate, retryable result: the pool had nobody eligible right now.
    NoEligibleAgent,
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "status", rename_all = "snake_case")]
pub enum SkipReason {
    ManualMethod,
    CallCenterInactive,
    MissingCallCenter,
    AlreadyAssigned,
    NotRoutable(LeadStatus),
}

impl DistributionOutcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, DistributionOutcome::Assigned { .. })
    }

    pub fn summary(&self) -> String {
        match self {
            DistributionOutcome::Assigned { agent_id } => format!("assigned to {agent_id}"),
            DistributionOutcome::NoEligibleAgent => "no eligible agent".to_string(),
            DistributionOutcome::Skipped { reason } => match reason {
                SkipReason::ManualMethod => "skipped: manual distribution".to_string(),
                SkipReason::CallCenterInactive => "skipped: call center inactive".to_string(),
                SkipReason::MissingCallCenter => "skipped: no call center".to_string(),
                SkipReason::AlreadyAssigned => "skipped: already assigned".to_string(),
                SkipReason::NotRoutable(status) => format!("skipped: lead is {status}"),
            },
        }
    }

    fn skipped(reason: SkipReason) -> Self {
        DistributionOutcome::Skipped { reason }
    }
}

/// Chooses an agent for a routable lead and applies the assignment inside the caller's
/// transaction.
pub struct DistributionEngine<R> {
    repository: Arc<R>,
}

impl<R> DistributionEngine<R>
where
    R: LeadRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Distribute the lead held by `unit`. Staged events are appended to `events`.
    pub fn distribute_in(
        &self,
        unit: &mut UnitOfWork,
        events: &mut Vec<LeadEvent>,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome, DistributionError> {
        let lead = &unit.lead;
        if lead.assigned_agent_id.is_some() {
            return Ok(DistributionOutcome::skipped(SkipReason::AlreadyAssigned));
        }
        if !lead.status.is_routable() {
            return Ok(DistributionOutcome::skipped(SkipReason::NotRoutable(
                lead.status,
            )));
        }

        let Some(call_center_id) = lead.call_center_id.clone() else {
            return Ok(DistributionOutcome::skipped(SkipReason::MissingCallCenter));
        };
        let Some(center) = self.repository.call_center(&call_center_id)? else {
            return Ok(DistributionOutcome::skipped(SkipReason::MissingCallCenter));
        };
        if !center.is_active {
            return Ok(DistributionOutcome::skipped(SkipReason::CallCenterInactive));
        }

        let candidates: Vec<_> = self
            .repository
            .agent_stats(&call_center_id)?
            .into_iter()
            .filter(|stats| stats.agent.is_active && stats.agent.call_center_id == call_center_id)
            .collect();

        let context = SelectionContext {
            lead_id: &lead.id,
            call_center_id: &call_center_id,
        };
        let selected = center
            .distribution_method
            .selector()
            .select(&candidates, &context);

        let Some(agent_id) = selected else {
            if !center.distribution_method.is_automatic() {
                return Ok(DistributionOutcome::skipped(SkipReason::ManualMethod));
            }
            debug!(
                lead_id = %lead.id,
                call_center_id = %call_center_id,
                candidates = candidates.len(),
                "no eligible agent for lead"
            );
            return Ok(DistributionOutcome::NoEligibleAgent);
        };

        debug!(
            lead_id = %lead.id,
            agent_id = %agent_id,
            method = center.distribution_method.label(),
            "selected agent"
        );
        assign_within(unit, agent_id.clone(), now, events);
        Ok(DistributionOutcome::Assigned { agent_id })
    }
}

/// Sets the agent and advances `email_confirmed` to `pending_call` as one change.
pub(crate) fn assign_within(
    unit: &mut UnitOfWork,
    agent_id: AgentId,
    now: DateTime<Utc>,
    events: &mut Vec<LeadEvent>,
) {
    let lead = &mut unit.lead;
    let old_status = lead.status;
    lead.assigned_agent_id = Some(agent_id);
    lead.assigned_at = Some(now);
    if old_status == LeadStatus::EmailConfirmed {
        lead.set_status(LeadStatus::PendingCall, now);
    }
    events.push(LeadEvent::transition(
        LeadEventKind::Assigned,
        lead,
        old_status,
        now,
    ));
}

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
