use std::cmp::Ordering;

use super::super::domain::{AgentId, CallCenterId, DistributionMethod, LeadId};
use super::super::repository::AgentStats;

/// Facts about the lead being routed, handed to every selector.
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    pub lead_id: &'a LeadId,
    pub call_center_id: &'a CallCenterId,
}

/// Picks one agent out of the eligible candidates, or none.
///
/// Candidates are already filtered to active agents of the lead's call center.
pub trait AgentSelector: Send + Sync {
    fn select(&self, candidates: &[AgentStats], context: &SelectionContext<'_>) -> Option<AgentId>;
}

/// Never assigns; a human picks the agent.
pub struct ManualSelector;

/// Fewest non-final leads first, so the rotation follows actual workload.
pub struct WorkloadRoundRobin;

/// Lowest confirmed-to-assigned ratio first, steering new leads to agents who have
/// converted less so far.
pub struct InversePerformanceSelector;

static MANUAL: ManualSelector = ManualSelector;
static ROUND_ROBIN: WorkloadRoundRobin = WorkloadRoundRobin;
static WEIGHTED: InversePerformanceSelector = InversePerformanceSelector;

impl DistributionMethod {
    pub fn selector(&self) -> &'static dyn AgentSelector {
        match self {
            DistributionMethod::Manual => &MANUAL,
            DistributionMethod::RoundRobin => &ROUND_ROBIN,
            DistributionMethod::Weighted => &WEIGHTED,
        }
    }
}

impl AgentSelector for ManualSelector {
    fn select(
        &self,
        _candidates: &[AgentStats],
        _context: &SelectionContext<'_>,
    ) -> Option<AgentId> {
        None
    }
}

impl AgentSelector for WorkloadRoundRobin {
    fn select(
        &self,
        candidates: &[AgentStats],
        _context: &SelectionContext<'_>,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .min_by(|a, b| a.workload.cmp(&b.workload).then_with(|| rotation_order(a, b)))
            .map(|stats| stats.agent.id.clone())
    }
}

impl AgentSelector for InversePerformanceSelector {
    fn select(
        &self,
        candidates: &[AgentStats],
        _context: &SelectionContext<'_>,
    ) -> Option<AgentId> {
        candidates
            .iter()
            .min_by(|a, b| {
                a.performance()
                    .total_cmp(&b.performance())
                    .then_with(|| a.workload.cmp(&b.workload))
                    .then_with(|| rotation_order(a, b))
            })
            .map(|stats| stats.agent.id.clone())
    }
}

/// Longest since last assignment first (never-assigned agents lead), then agent id.
fn rotation_order(a: &AgentStats, b: &AgentStats) -> Ordering {
    a.last_assigned_at
        .cmp(&b.last_assigned_at)
        .then_with(|| a.agent.id.cmp(&b.agent.id))
}
