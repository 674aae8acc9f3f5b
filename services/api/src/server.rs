use crate::cli::ServeArgs;
use crate::infra::{build_service, open_store, persist_or_warn, AppState, LeadService, StoreLease};
use crate::jobs::sweep_shared;
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use leadflow::config::{AppConfig, LeadConfig};
use leadflow::error::AppError;
use leadflow::leads::InMemoryLeadStore;
use leadflow::telemetry::{self, LogOutput};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment, LogOutput::Stdout)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store_path = config.leads.store_path.clone();
    let _lease = store_path.as_deref().map(StoreLease::acquire).transpose()?;
    let store = match &store_path {
        Some(path) => open_store(path)?,
        None => Arc::new(InMemoryLeadStore::default()),
    };
    let service = build_service(store.clone(), &config.leads);

    let (stop_sweeps, sweeps_stopped) = watch::channel(false);
    let sweeper = (config.leads.sweep_interval_seconds > 0).then(|| {
        tokio::spawn(periodic_sweeps(
            service.clone(),
            store.clone(),
            store_path.clone(),
            config.leads.clone(),
            sweeps_stopped,
        ))
    });

    let app = with_service_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        persistent = store_path.is_some(),
        "lead lifecycle service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    let _ = stop_sweeps.send(true);
    if let Some(task) = sweeper {
        if let Err(err) = task.await {
            warn!(error = %err, "background sweeps ended abnormally");
        }
    }
    if let Some(path) = &store_path {
        persist_or_warn(&store, path);
    }
    info!("lead lifecycle service stopped");
    Ok(())
}

/// Runs both lead sweeps against the live store until `stop` flips.
///
/// The first pass runs at startup. A pass in progress always finishes before the task exits.
async fn periodic_sweeps(
    service: Arc<LeadService>,
    store: Arc<InMemoryLeadStore>,
    store_path: Option<PathBuf>,
    config: LeadConfig,
    mut stop: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = stop.changed() => break,
        }

        let (service, store, path, config) =
            (service.clone(), store.clone(), store_path.clone(), config.clone());
        let pass = tokio::task::spawn_blocking(move || {
            sweep_shared(&service, &store, path.as_deref(), &config)
        })
        .await;

        match pass {
            Ok(Ok((distribution, scores))) => debug!(
                distributed = distribution.distributed,
                no_agent = distribution.no_agent,
                rescored = scores.updated,
                "background sweep finished"
            ),
            Ok(Err(err)) => warn!(error = %err, "background sweep failed"),
            Err(err) => warn!(error = %err, "background sweep task panicked"),
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
