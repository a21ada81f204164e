//! grantkeeper reconciler worker runtime.

#![forbid(unsafe_code)]

mod worker_config;


use std::sync::Arc;

use grantkeeper_application::{
    AccessBackends, AccessReconciler, AccessRepositories, JoinableViewReconciler,
    ReconcilerLeaseCoordinator, ReconcilerLoop, ReconciliationCycle,
};
use grantkeeper_core::{AppError, AppResult};
use grantkeeper_infrastructure::{
    BigQueryIamGrantBackend, BigQueryWarehouseBackend, GcpRestClient, GcpTokenSource,
    GoogleGroupsDirectory, NoopDirectoryBackend, NoopGrantBackend, NoopWarehouseBackend,
    PostgresAccessRepository, PostgresAuditRepository, PostgresDatasetRepository,
    PostgresJoinableViewRepository, RedisReconcilerLeaseCoordinator,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::{GcpConfig, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    if let Some(listen_addr) = config.metrics_listen_addr {
        PrometheusBuilder::new()
            .with_http_listener(listen_addr)
            .install()
            .map_err(|error| {
                AppError::Internal(format!("failed to install prometheus exporter: {error}"))
            })?;
        info!(%listen_addr, "prometheus exporter listening");
    }

    let pool = connect_pool(&config).await?;
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    let repositories = build_repositories(pool);
    let backends = build_backends(&config)?;
    let lease_coordinator = build_lease_coordinator(&config)?;

    let mut cycles: Vec<Arc<dyn ReconciliationCycle>> = vec![Arc::new(
        AccessReconciler::new(repositories.clone(), backends.grant.clone())
            .with_drift_check(config.drift_check_enabled),
    )];
    if config.joinable_views_enabled {
        cycles.push(Arc::new(JoinableViewReconciler::new(
            repositories,
            backends,
            config.central_project.as_str(),
        )));
    }

    info!(
        worker_id = %config.worker_id,
        central_project = %config.central_project,
        interval_ms = u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        drift_check_enabled = config.drift_check_enabled,
        joinable_views_enabled = config.joinable_views_enabled,
        gcp_backends_enabled = config.gcp.is_some(),
        lease_enabled = lease_coordinator.is_some(),
        "grantkeeper-worker started"
    );

    let (shutdown_sender, shutdown_receiver) = watch::channel(false);
    let mut loops = JoinSet::new();
    for cycle in cycles {
        let mut reconciler_loop = ReconcilerLoop::new(cycle, config.interval);
        if let Some(coordinator) = &lease_coordinator {
            reconciler_loop = reconciler_loop.with_lease_coordinator(
                coordinator.clone(),
                config.worker_id.as_str(),
                config.lease_seconds,
            );
        }

        let mut shutdown = shutdown_receiver.clone();
        loops.spawn(async move {
            reconciler_loop
                .run_until(async move {
                    let _ = shutdown.changed().await;
                })
                .await;
        });
    }

    wait_for_shutdown_signal().await;
    info!("shutdown requested, waiting for running cycles");
    let _ = shutdown_sender.send(true);

    while let Some(joined) = loops.join_next().await {
        if let Err(error) = joined {
            warn!(error = %error, "reconciler loop task failed");
        }
    }

    info!("grantkeeper-worker stopped");
    Ok(())
}

async fn connect_pool(config: &WorkerConfig) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_repositories(pool: PgPool) -> AccessRepositories {
    AccessRepositories {
        access: Arc::new(PostgresAccessRepository::new(pool.clone())),
        requests: Arc::new(PostgresAccessRepository::new(pool.clone())),
        datasets: Arc::new(PostgresDatasetRepository::new(pool.clone())),
        joinable_views: Arc::new(PostgresJoinableViewRepository::new(pool.clone())),
        audit: Arc::new(PostgresAuditRepository::new(pool)),
    }
}

fn build_backends(config: &WorkerConfig) -> AppResult<AccessBackends> {
    let Some(gcp) = &config.gcp else {
        warn!("GCP backends disabled, grants and views are not applied");
        return Ok(AccessBackends {
            grant: Arc::new(NoopGrantBackend),
            warehouse: Arc::new(NoopWarehouseBackend::new(config.central_project.as_str())),
            directory: Arc::new(NoopDirectoryBackend),
        });
    };

    let client = build_gcp_client(gcp)?;
    Ok(AccessBackends {
        grant: Arc::new(BigQueryIamGrantBackend::new(
            client.clone(),
            gcp.bigquery_endpoint.as_str(),
        )),
        warehouse: Arc::new(BigQueryWarehouseBackend::new(
            client.clone(),
            gcp.bigquery_endpoint.as_str(),
            config.central_project.as_str(),
            gcp.bigquery_location.as_str(),
        )),
        directory: Arc::new(GoogleGroupsDirectory::new(
            client,
            gcp.directory_endpoint.as_str(),
        )),
    })
}

fn build_gcp_client(gcp: &GcpConfig) -> AppResult<GcpRestClient> {
    let http_client = reqwest::Client::builder()
        .timeout(gcp.http_timeout)
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let tokens = match &gcp.access_token {
        Some(token) => GcpTokenSource::from_static(token.as_str()),
        None => GcpTokenSource::from_metadata_server(http_client.clone()),
    };

    Ok(GcpRestClient::new(http_client, Arc::new(tokens)))
}

fn build_lease_coordinator(
    config: &WorkerConfig,
) -> AppResult<Option<Arc<dyn ReconcilerLeaseCoordinator>>> {
    let Some(redis_url) = &config.redis_url else {
        return Ok(None);
    };

    let client = redis::Client::open(redis_url.as_str())
        .map_err(|error| AppError::Internal(format!("invalid REDIS_URL: {error}")))?;
    Ok(Some(Arc::new(RedisReconcilerLeaseCoordinator::new(
        client,
        "grantkeeper",
    ))))
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(error = %error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
