use std::sync::Arc;

use partyswap_client::{
    DexContext, SessionDriver, build_app, config::Config, connect_repository, open_session,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "debug,alloy=info,rmcp=info,hyper=info".into());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("debug logging enabled");

    let config = Config::from_yaml("config/default.yaml").await?;

    let repository = connect_repository(&config)?;
    let session = open_session(&config, repository.clone()).await?;
    let context = Arc::new(DexContext::from_config(
        &config,
        session.clone(),
        repository.clone(),
    ));

    let cancellation_token = CancellationToken::new();

    let driver = SessionDriver::new(
        session,
        repository,
        config.rpc.block_poll_interval(),
        config.transactions.poll_interval(),
    );
    let driver_handle = tokio::spawn(driver.run(cancellation_token.clone()));

    let addr = config.server_uri();
    let app = build_app(cancellation_token.clone(), &config, context)?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancellation_token))
        .await?;

    driver_handle.await?;
    Ok(())
}

async fn shutdown_signal(cancellation_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, cancelling tasks...");
    cancellation_token.cancel();
}
