use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trending_core::scripting::env::build_child_env;
use trending_core::scripting::interpreter::{CommandProbe, InterpreterResolver};
use trending_core::scripting::python::PythonLauncher;

use trending_api::config::ServerConfig;
use trending_api::jobs::service::JobService;
use trending_api::router::build_app_router;
use trending_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "trending_api=debug,trending_core=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let effective_timeout_secs = config.effective_request_timeout().as_secs();
    if effective_timeout_secs != config.request_timeout_secs {
        tracing::warn!(
            request_timeout_secs = config.request_timeout_secs,
            effective_timeout_secs,
            max_job_secs = config.jobs.max_timeout().as_secs(),
            "REQUEST_TIMEOUT_SECS is shorter than the longest job; raising it",
        );
    }

    // --- Job launcher ---
    let resolver = InterpreterResolver::new(
        Arc::new(CommandProbe),
        config.jobs.python_bin.clone(),
        config.jobs.python_min_version,
    );
    let launcher = Arc::new(PythonLauncher::new(resolver));
    let base_env = build_child_env(std::env::vars(), &[]);
    let jobs = Arc::new(JobService::new(config.jobs.clone(), launcher, base_env));
    tracing::info!(
        scripts_dir = %config.jobs.scripts_dir.display(),
        artifacts_dir = %config.jobs.artifacts_dir.display(),
        trends_artifact = %config.jobs.trends_artifact.display(),
        required_python = %config.jobs.python_min_version,
        "Job service ready",
    );

    if config.jobs.migrate_legacy_artifacts {
        let kinds = trending_core::jobs::JobKind::ALL;
        if let Err(e) = jobs.migrate_artifacts(&kinds).await {
            tracing::error!(error = %e, "Startup artifact migration failed");
        }
    }

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        jobs: Arc::clone(&jobs),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    jobs.shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
