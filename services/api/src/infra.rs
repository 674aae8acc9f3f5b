use metrics_exporter_prometheus::PrometheusHandle;
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use leadflow::config::{ConfigError, LeadConfig};
use leadflow::error::AppError;
use leadflow::leads::{
    EventError, InMemoryLeadStore, LeadEvent, LeadLifecycleService, LifecycleEventSink,
    LifecycleSettings,
};

pub(crate) type LeadService = LeadLifecycleService<InMemoryLeadStore, AuditLogSink>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Writes every lifecycle event to the `leadflow::audit` log target.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct AuditLogSink;

impl LifecycleEventSink for AuditLogSink {
    fn publish(&self, event: LeadEvent) -> Result<(), EventError> {
        info!(
            target: "leadflow::audit",
            lead_id = %event.lead_id,
            kind = ?event.kind,
            old_status = event.old_status.map(|status| status.label()),
            new_status = event.new_status.label(),
            agent_id = event.agent_id.as_ref().map(|agent| agent.0.as_str()),
            occurred_at = %event.occurred_at,
            "lead lifecycle event"
        );
        Ok(())
    }
}

pub(crate) fn build_service(
    store: Arc<InMemoryLeadStore>,
    config: &LeadConfig,
) -> Arc<LeadService> {
    Arc::new(LeadLifecycleService::new(
        store,
        Arc::new(AuditLogSink),
        LifecycleSettings::from(config),
    ))
}

/// The `--store` flag wins over `LEADS_STORE_PATH`.
pub(crate) fn resolve_store_path(
    flag: Option<PathBuf>,
    config: &LeadConfig,
) -> Result<PathBuf, ConfigError> {
    flag.or_else(|| config.store_path.clone())
        .ok_or(ConfigError::MissingStorePath)
}

/// Exclusive claim on a store file, held as a `<store>.lock` file next to it.
///
/// Only one process may load, mutate and save a given store at a time; the lock file is
/// removed when the lease drops.
#[derive(Debug)]
pub(crate) struct StoreLease {
    lock_path: PathBuf,
}

impl StoreLease {
    pub(crate) fn acquire(store_path: &Path) -> Result<Self, AppError> {
        let mut name = store_path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);

        if let Some(parent) = lock_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => Ok(Self { lock_path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(ConfigError::StoreInUse { lock_path }.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.lock_path) {
            warn!(path = %self.lock_path.display(), error = %err, "could not remove store lock");
        }
    }
}

pub(crate) fn open_store(path: &Path) -> Result<Arc<InMemoryLeadStore>, AppError> {
    let store = InMemoryLeadStore::load(path)?;
    Ok(Arc::new(store))
}

pub(crate) fn persist_store(store: &InMemoryLeadStore, path: &Path) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    store.save(path)?;
    info!(path = %path.display(), "lead store saved");
    Ok(())
}

/// Persists on a best-effort basis; used where the caller already has a result to report.
pub(crate) fn persist_or_warn(store: &InMemoryLeadStore, path: &Path) {
    if let Err(err) = persist_store(store, path) {
        warn!(path = %path.display(), error = %err, "could not save lead store");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_flag_overrides_configured_path() {
        let config = LeadConfig {
            store_path: Some(PathBuf::from("/var/lib/leadflow/leads.json")),
            ..LeadConfig::default()
        };
        let resolved = resolve_store_path(Some(PathBuf::from("local.json")), &config)
            .expect("path resolves");
        assert_eq!(resolved, PathBuf::from("local.json"));

        let resolved = resolve_store_path(None, &config).expect("path resolves");
        assert_eq!(resolved, PathBuf::from("/var/lib/leadflow/leads.json"));
    }

    #[test]
    fn store_lease_is_exclusive_until_dropped() {
        let path = std::env::temp_dir().join(format!(
            "leadflow-lease-{}.json",
            std::process::id()
        ));
        let lease = StoreLease::acquire(&path).expect("first lease");
        let err = StoreLease::acquire(&path).expect_err("store already leased");
        assert!(matches!(
            err,
            AppError::Config(ConfigError::StoreInUse { ref lock_path })
                if lock_path.to_string_lossy().ends_with(".json.lock")
        ));

        drop(lease);
        let again = StoreLease::acquire(&path).expect("lease released");
        drop(again);
    }

    #[test]
    fn missing_store_path_is_a_config_error() {
        let err = resolve_store_path(None, &LeadConfig::default()).expect_err("no path");
        assert!(matches!(err, ConfigError::MissingStorePath));
    }
}
