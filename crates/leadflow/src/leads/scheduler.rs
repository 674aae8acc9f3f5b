//! Periodic sweeps run from the CLI entry points.
//!
//! Each lead is handled in its own transaction, so a sweep can be interrupted between leads
//! and rerun safely.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::distribution::DistributionOutcome;
use super::events::LifecycleEventSink;
use super::lifecycle::{LeadLifecycleService, LifecycleError};
use super::repository::LeadRepository;
use super::scoring::{RecalculationReport, ScoringError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DistributionSweepReport {
    pub found: usize,
    pub distributed: usize,
    pub no_agent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Resubmits routable leads that are still waiting for an agent.
pub struct DistributionScheduler<R, E> {
    service: Arc<LeadLifecycleService<R, E>>,
    default_limit: Option<usize>,
}

impl<R, E> DistributionScheduler<R, E>
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    pub fn new(service: Arc<LeadLifecycleService<R, E>>, default_limit: Option<usize>) -> Self {
        Self {
            service,
            default_limit,
        }
    }

    pub fn run(&self, limit: Option<usize>) -> Result<DistributionSweepReport, LifecycleError> {
        let limit = limit.or(self.default_limit);
        let waiting = self.service.repository().unassigned_routable(limit)?;

        let mut report = DistributionSweepReport {
            found: waiting.len(),
            ..DistributionSweepReport::default()
        };

        for lead_id in &waiting {
            match self.service.distribute(lead_id) {
                Ok(DistributionOutcome::Assigned { .. }) => report.distributed += 1,
                Ok(DistributionOutcome::NoEligibleAgent) => report.no_agent += 1,
                // Includes leads assigned by another request since the scan.
                Ok(DistributionOutcome::Skipped { .. }) => report.skipped += 1,
                Err(err) => {
                    warn!(lead_id = %lead_id, error = %err, "distribution retry failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            found = report.found,
            distributed = report.distributed,
            no_agent = report.no_agent,
            failed = report.failed,
            "unassigned lead sweep finished"
        );
        Ok(report)
    }
}

/// Batch score refresh over stale (or all) leads.
pub struct ScoreRecalculationSweep<R, E> {
    service: Arc<LeadLifecycleService<R, E>>,
}

impl<R, E> ScoreRecalculationSweep<R, E>
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    pub fn new(service: Arc<LeadLifecycleService<R, E>>) -> Self {
        Self { service }
    }

    pub fn run(&self, all: bool) -> Result<RecalculationReport, ScoringError> {
        let report = self.service.scoring().recalculate(all)?;
        info!(
            examined = report.examined,
            updated = report.updated,
            failed = report.failed,
            all,
            "score recalculation sweep finished"
        );
        Ok(report)
    }
}
