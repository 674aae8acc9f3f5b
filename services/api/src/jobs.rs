use clap::Args;
use leadflow::config::LeadConfig;
use leadflow::error::AppError;
use leadflow::leads::{
    DistributionScheduler, DistributionSweepReport, InMemoryLeadStore, RecalculationReport,
    ScoreRecalculationSweep,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::infra::{
    build_service, open_store, persist_store, resolve_store_path, LeadService, StoreLease,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DistributeArgs {
    /// Maximum number of leads to process (defaults to LEADS_DISTRIBUTION_BATCH_LIMIT)
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    /// JSON lead store to operate on (defaults to LEADS_STORE_PATH)
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RecalculateArgs {
    /// Recalculate every lead, not just those with a stale score
    #[arg(long)]
    pub(crate) all: bool,
    /// JSON lead store to operate on (defaults to LEADS_STORE_PATH)
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

pub(crate) fn distribute_unassigned(
    args: DistributeArgs,
    config: &LeadConfig,
) -> Result<DistributionSweepReport, AppError> {
    let path = resolve_store_path(args.store, config)?;
    let _lease = StoreLease::acquire(&path)?;
    let store = open_store(&path)?;
    let service = build_service(store.clone(), config);

    let report = DistributionScheduler::new(service, config.distribution_batch_limit)
        .run(args.limit)?;
    if report.distributed > 0 {
        persist_store(&store, &path)?;
    }
    Ok(report)
}

pub(crate) fn recalculate_scores(
    args: RecalculateArgs,
    config: &LeadConfig,
) -> Result<RecalculationReport, AppError> {
    let path = resolve_store_path(args.store, config)?;
    let _lease = StoreLease::acquire(&path)?;
    let store = open_store(&path)?;
    let service = build_service(store.clone(), config);

    let report = ScoreRecalculationSweep::new(service).run(args.all)?;
    if report.updated > 0 {
        persist_store(&store, &path)?;
    }
    Ok(report)
}

/// One pass of both sweeps against the store a running server already owns.
pub(crate) fn sweep_shared(
    service: &Arc<LeadService>,
    store: &InMemoryLeadStore,
    path: Option<&Path>,
    config: &LeadConfig,
) -> Result<(DistributionSweepReport, RecalculationReport), AppError> {
    let distribution =
        DistributionScheduler::new(service.clone(), config.distribution_batch_limit).run(None)?;
    let scores = ScoreRecalculationSweep::new(service.clone()).run(false)?;

    if let Some(path) = path {
        if distribution.distributed > 0 || scores.updated > 0 {
            persist_store(store, path)?;
        }
    }
    Ok((distribution, scores))
}

pub(crate) fn render_distribution(report: &DistributionSweepReport) -> String {
    format!(
        "found={} distributed={} no_agent={} skipped={} failed={}",
        report.found, report.distributed, report.no_agent, report.skipped, report.failed
    )
}

pub(crate) fn render_recalculation(report: &RecalculationReport) -> String {
    let mut rendered = format!(
        "examined={} updated={} failed={}",
        report.examined, report.updated, report.failed
    );
    for (lead_id, reason) in &report.failures {
        rendered.push_str(&format!("\n  {lead_id}: {reason}"));
    }
    rendered
}
