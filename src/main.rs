use enrol::telemetry;
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() {
    let endpoint = std::env::var(telemetry::OTLP_ENDPOINT_ENV).ok();
    if let Err(err) = telemetry::init(endpoint.as_deref()) {
        eprintln!("cannot initialize telemetry: {err}");
        std::process::exit(1);
    }

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        },
    };

    let state = match enrol::initialize_state(metrics).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "cannot initialize state");
            std::process::exit(1);
        },
    };

    let port = state.config.port;
    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%port, error = %err, "cannot bind port");
            std::process::exit(1);
        },
    };
    tracing::info!(%port, "server started");

    if let Err(err) = axum::serve(listener, enrol::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %err, "server stopped");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
