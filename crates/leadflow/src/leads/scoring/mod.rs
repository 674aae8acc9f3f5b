mod config;
mod rules;

pub use config::ScoringConfig;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::clock::Clock;
use super::domain::{Lead, LeadId};
use super::repository::{LeadActivity, LeadRepository, RepositoryError, UnitOfWork};

/// Score plus the per-factor contributions that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub score: u8,
    pub factors: BTreeMap<String, f64>,
}

/// Outcome of a batch recalculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecalculationReport {
    pub examined: usize,
    pub updated: usize,
    pub failed: usize,
    pub failures: Vec<(LeadId, String)>,
}

/// Deterministic lead-quality scorer.
pub struct ScoringEngine<R> {
    repository: Arc<R>,
    config: ScoringConfig,
    freshness: Duration,
    clock: Clock,
}

impl<R> ScoringEngine<R>
where
    R: LeadRepository + 'static,
{
    pub fn new(
        repository: Arc<R>,
        config: ScoringConfig,
        freshness: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            repository,
            config,
            freshness,
            clock,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Pure calculation; does not touch the repository.
    pub fn calculate_score(
        &self,
        lead: &Lead,
        activity: &LeadActivity,
    ) -> Result<ScoreCard, ScoringError> {
        rules::score_lead(lead, activity, &self.config, self.clock.now())
    }

    /// Recompute and persist one lead's score, returning the updated record.
    pub fn update_score(&self, lead_id: &LeadId) -> Result<Lead, ScoringError> {
        let now = self.clock.now();
        let activity = self
            .repository
            .activity_counts(std::slice::from_ref(lead_id), now)?
            .remove(lead_id)
            .unwrap_or_default();

        self.repository.transact(lead_id, |unit| {
            self.apply(unit, &activity, now)?;
            Ok(unit.lead.clone())
        })
    }

    /// Recompute stale scores (or every score when `all`), one transaction per lead.
    ///
    /// A failing lead is logged and counted; its previous score stays in place.
    pub fn recalculate(&self, all: bool) -> Result<RecalculationReport, ScoringError> {
        let now = self.clock.now();
        let stale_before = if all { None } else { Some(now - self.freshness) };
        let ids = self.repository.score_candidates(stale_before)?;
        let activity = self.repository.activity_counts(&ids, now)?;

        let mut report = RecalculationReport {
            examined: ids.len(),
            ..RecalculationReport::default()
        };

        for lead_id in &ids {
            let counts = activity.get(lead_id).copied().unwrap_or_default();
            let result: Result<(), ScoringError> = self
                .repository
                .transact(lead_id, |unit| self.apply(unit, &counts, now));

            match result {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    warn!(lead_id = %lead_id, error = %err, "score recalculation failed");
                    report.failed += 1;
                    report.failures.push((lead_id.clone(), err.to_string()));
                }
            }
        }

        debug!(
            examined = report.examined,
            updated = report.updated,
            failed = report.failed,
            "score recalculation finished"
        );
        Ok(report)
    }

    fn apply(
        &self,
        unit: &mut UnitOfWork,
        activity: &LeadActivity,
        now: DateTime<Utc>,
    ) -> Result<(), ScoringError> {
        let card = rules::score_lead(&unit.lead, activity, &self.config, now)?;
        unit.lead.score = card.score;
        unit.lead.score_factors = card.factors;
        unit.lead.score_updated_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("lead {lead_id} was created at {created_at}, after the scoring time {now}")]
    CreatedInFuture {
        lead_id: LeadId,
        created_at: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    #[error("lead {lead_id} produced a non-finite value for factor '{factor}'")]
    NonFiniteFactor { lead_id: LeadId, factor: String },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
