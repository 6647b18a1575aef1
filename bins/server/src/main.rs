//! benchkube server binary.
//!
//! Exit codes: 0 on graceful shutdown, 1 on config error, 2 on fatal init
//! or serve failure.

use benchkube_config::{describe_env, env_from_process, load_settings};
use benchkube_shared::CancellationToken;
use std::process::ExitCode;
use tracing::{error, info};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn main() -> ExitCode {
    init_tracing();

    let env = env_from_process();
    let settings = match load_settings(&env) {
        Ok(settings) => settings,
        Err(error) => {
            error!(%error, "configuration error");
            return ExitCode::from(1);
        },
    };
    info!(config = ?describe_env(&env), "configuration loaded");

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "runtime init failed");
            return ExitCode::from(2);
        },
    };

    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        install_signal_handlers(shutdown.clone());

        let state = match benchkube_infra::build_state(settings, shutdown).await {
            Ok(state) => state,
            Err(error) => {
                error!(%error, "init failed");
                return ExitCode::from(2);
            },
        };

        match benchkube_infra::run(state).await {
            Ok(()) => {
                info!("shutdown complete");
                ExitCode::SUCCESS
            },
            Err(error) => {
                error!(%error, "server failed");
                ExitCode::from(2)
            },
        }
    })
}

fn install_signal_handlers(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(error) => {
                    error!(%error, "SIGTERM handler install failed");
                    let _ = ctrl_c.await;
                    shutdown.cancel();
                    return;
                },
            };
            tokio::select! {
                _ = ctrl_c => {},
                _ = sigterm.recv() => {},
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }
        info!("shutdown signal received");
        shutdown.cancel();
    });
}
