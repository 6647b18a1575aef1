//! Process bootstrap: clients, loops, listeners, graceful shutdown.

use crate::http::{deployer_router, eval_router, vllm_router};
use crate::loops::spawn_interval_loop;
use crate::poller::SyncScheduler;
use crate::state::AppState;
use benchkube_adapters::{
    GithubSourceClient, GithubSourceConfig, KubeClusterGateway, MlflowRegistry,
    MlflowRegistryConfig, MongoStores, ensure_indexes,
};
use benchkube_app::{BridgeDeps, TerminalBroker, bridge_tick, reconcile_sweep, sweep_once};
use benchkube_config::Settings;
use benchkube_ports::SourceLocation;
use benchkube_shared::{CancellationToken, ErrorEnvelope, Result, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Source-API rate limit per token.
const SOURCE_REQUESTS_PER_SECOND: u32 = 10;
/// Cadence of the sync manager tick (per-project due times are finer).
const SYNC_MANAGER_PERIOD: Duration = Duration::from_secs(10);
/// Cadence of the terminal idle reaper.
const TERMINAL_REAPER_PERIOD: Duration = Duration::from_secs(60);
/// Drain budget for in-flight work at shutdown.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(30);

/// Build the shared state from settings: connect the database, the cluster,
/// and the source API. Fails fast on any init error.
pub async fn build_state(settings: Settings, shutdown: CancellationToken) -> Result<Arc<AppState>> {
    let stores = MongoStores::connect(&settings.mongo_url).await?;
    stores.ping().await?;
    ensure_indexes(stores.database()).await?;

    // Honors KUBECONFIG and falls back to in-cluster config.
    let kube_client = kube::Client::try_default()
        .await
        .map_err(|err| ErrorEnvelope::fatal(format!("kubernetes client init failed: {err}")))?;
    let gateway = Arc::new(KubeClusterGateway::new(kube_client));

    let source = Arc::new(GithubSourceClient::new(GithubSourceConfig {
        base_url: settings.source_api_url.clone(),
        token: settings.source_token.clone(),
        requests_per_second: SOURCE_REQUESTS_PER_SECOND,
    })?);

    let registry = settings
        .registry_api_url
        .clone()
        .map(|base_url| MlflowRegistry::new(MlflowRegistryConfig { base_url }))
        .transpose()?
        .map(|registry| -> Arc<dyn benchkube_ports::ModelRegistry> { Arc::new(registry) });

    let clock: Arc<dyn benchkube_shared::Clock> = Arc::new(SystemClock);
    let gateway: Arc<dyn benchkube_ports::ClusterGateway> = gateway;
    let source: Arc<dyn benchkube_ports::SourceClient> = source;
    let manifest_store: Arc<dyn benchkube_ports::ManifestStore> =
        Arc::new(stores.manifest.clone());
    let deployment_store: Arc<dyn benchkube_ports::DeploymentStore> =
        Arc::new(stores.deployments.clone());
    let vllm_store: Arc<dyn benchkube_ports::VllmDeploymentStore> =
        Arc::new(stores.vllm.clone());
    let task_store: Arc<dyn benchkube_ports::EvaluationTaskStore> =
        Arc::new(stores.tasks.clone());
    let health = Arc::new(stores);

    let deploy_deps = benchkube_app::DeploymentDeps {
        store: Arc::clone(&deployment_store),
        vllm_store: Arc::clone(&vllm_store),
        gateway: Arc::clone(&gateway),
        clock: Arc::clone(&clock),
        job_max_failures: settings.job_max_failures,
        vllm_max_failures: settings.vllm_max_failures,
        reconcile_parallelism: usize::try_from(settings.reconcile_parallelism).unwrap_or(16),
    };
    let broker = Arc::new(TerminalBroker::new(
        Arc::clone(&gateway),
        deploy_deps,
        Arc::clone(&clock),
        settings.terminal_idle_timeout_ms(),
    ));
    let sync_scheduler = Arc::new(SyncScheduler::new(
        benchkube_app::SyncDeps {
            store: Arc::clone(&manifest_store),
            source: Arc::clone(&source),
            clock: Arc::clone(&clock),
        },
        Arc::clone(&clock),
    ));

    Ok(Arc::new(AppState {
        settings,
        clock,
        manifest_store,
        deployment_store,
        vllm_store,
        task_store,
        gateway,
        source,
        registry,
        broker,
        sync_scheduler,
        admission: Arc::new(tokio::sync::Mutex::new(())),
        health,
        shutdown,
    }))
}

/// Spawn every background loop; returns the handles for draining.
pub fn spawn_loops(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let token = state.shutdown.clone();
    let mut handles = Vec::new();

    let scheduler = Arc::clone(&state.sync_scheduler);
    handles.push(spawn_interval_loop(
        "sync.manager",
        SYNC_MANAGER_PERIOD,
        token.clone(),
        move |ctx| {
            let scheduler = Arc::clone(&scheduler);
            async move { scheduler.tick(&ctx).await }
        },
    ));

    let reconcile_state = Arc::clone(state);
    handles.push(spawn_interval_loop(
        "reconcile",
        Duration::from_secs(state.settings.reconcile_interval_secs),
        token.clone(),
        move |ctx| {
            let state = Arc::clone(&reconcile_state);
            async move {
                let stats = reconcile_sweep(&ctx, &state.deploy_deps()).await?;
                if stats.observed > 0 {
                    info!(
                        observed = stats.observed,
                        updated = stats.updated,
                        observe_errors = stats.observe_errors,
                        "reconcile.tick"
                    );
                }
                Ok(())
            }
        },
    ));

    let sweep_state = Arc::clone(state);
    handles.push(spawn_interval_loop(
        "evaluation.sweeper",
        Duration::from_secs(state.settings.eval_sweep_interval_secs),
        token.clone(),
        move |ctx| {
            let state = Arc::clone(&sweep_state);
            async move {
                let outcome = sweep_once(&ctx, &state.evaluation_deps()).await?;
                if outcome.claimed > 0 {
                    info!(
                        claimed = outcome.claimed,
                        completed = outcome.completed,
                        retried = outcome.retried,
                        failed = outcome.failed,
                        "evaluation.tick"
                    );
                }
                Ok(())
            }
        },
    ));

    let reaper_state = Arc::clone(state);
    handles.push(spawn_interval_loop(
        "terminal.reaper",
        TERMINAL_REAPER_PERIOD,
        token.clone(),
        move |_ctx| {
            let state = Arc::clone(&reaper_state);
            async move {
                state.broker.reap_idle().await;
                Ok(())
            }
        },
    ));

    if let (Some(registry), Some((owner, repository))) = (
        state.registry.clone(),
        state.settings.bridge_repository.clone(),
    ) {
        let deps = BridgeDeps {
            registry,
            source: Arc::clone(&state.source),
            clock: Arc::clone(&state.clock),
            location: SourceLocation {
                owner,
                repository,
                reference: state.settings.bridge_reference.clone(),
            },
        };
        handles.push(spawn_interval_loop(
            "registry.bridge",
            Duration::from_secs(state.settings.polling_interval_secs),
            token,
            move |ctx| {
                let deps = deps.clone();
                async move {
                    bridge_tick(&ctx, &deps).await?;
                    Ok(())
                }
            },
        ));
    }

    handles
}

/// Serve the three listeners until the shutdown token fires, then drain.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let loops = spawn_loops(&state);

    let deployer = serve(
        &state.settings.server_host,
        state.settings.deployer_port,
        deployer_router(Arc::clone(&state)),
        state.shutdown.clone(),
    );
    let vllm = serve(
        &state.settings.server_host,
        state.settings.vllm_port,
        vllm_router(Arc::clone(&state)),
        state.shutdown.clone(),
    );
    let eval = serve(
        &state.settings.server_host,
        state.settings.eval_port,
        eval_router(Arc::clone(&state)),
        state.shutdown.clone(),
    );

    let served = tokio::try_join!(deployer, vllm, eval);

    // Shutdown: sessions close with a reason, loops get a bounded drain.
    // Cluster resources are intentionally left running; this process is a
    // control plane, not a supervisor.
    state.broker.shutdown().await;
    let drain = async {
        for handle in loops {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        error!("shutdown drain exceeded {}s", SHUTDOWN_DRAIN.as_secs());
    }

    served.map(|_| ())
}

async fn serve(
    host: &str,
    port: u16,
    router: axum::Router,
    token: CancellationToken,
) -> Result<()> {
    let address = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|error| ErrorEnvelope::fatal(format!("cannot bind {address}: {error}")))?;
    info!(%address, "listener started");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .map_err(|error| ErrorEnvelope::fatal(format!("server error on {address}: {error}")))
}
