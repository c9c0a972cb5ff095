use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::ProviderBuilder;
use anyhow::Context;
use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use rmcp::transport::SseServer;
use rmcp::transport::sse_server::SseServerConfig;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::config::{Config, parse_optional_address};
use crate::middleware::trace::http_trace_layer;
use crate::repository::{AlloyChainRepository, ChainRepository};
use crate::service::{DexContext, DexService, TokenRegistry};
use crate::session::{Session, SessionKey, SessionSettings};

/// Connects to the configured RPC endpoint.
///
/// Without a usable private key the repository is read-only and every write
/// fails with a missing-signer error.
pub fn connect_repository(config: &Config) -> anyhow::Result<Arc<dyn ChainRepository>> {
    let rpc_url: reqwest::Url = config
        .rpc
        .url
        .parse()
        .with_context(|| format!("invalid RPC URL: {}", config.rpc.url))?;
    let provider = Arc::new(ProviderBuilder::new().connect_http(rpc_url));
    let multicall = parse_optional_address("multicall.address", config.multicall.address.as_deref());

    if multicall.is_none() {
        tracing::warn!("No multicall contract configured. Reads will be issued one by one.");
    }

    let repository: Arc<dyn ChainRepository> = if !config.wallet.private_key.is_empty() {
        match AlloyChainRepository::new_with_wallet(
            provider.clone(),
            multicall,
            &config.wallet.private_key,
        ) {
            Ok(repo) => {
                if let Some(address) = repo.wallet_address() {
                    tracing::info!("Initialized with wallet address: {address}");
                }
                Arc::new(repo)
            }
            Err(e) => {
                tracing::warn!("Failed to initialize wallet: {e}. Using read-only mode.");
                Arc::new(AlloyChainRepository::new(provider, multicall))
            }
        }
    } else {
        tracing::info!("No private key provided. Running in read-only mode.");
        Arc::new(AlloyChainRepository::new(provider, multicall))
    };

    Ok(repository)
}

/// Opens the session for the wallet account, or the watch address in
/// read-only mode, after checking the node serves the configured chain.
pub async fn open_session(
    config: &Config,
    repository: Arc<dyn ChainRepository>,
) -> anyhow::Result<Arc<Session>> {
    let chain_id = repository
        .chain_id()
        .await
        .context("failed to read chain id")?;
    if chain_id != config.rpc.chain_id {
        anyhow::bail!(
            "RPC endpoint serves chain {chain_id}, expected {}",
            config.rpc.chain_id
        );
    }

    let account = match repository.signer_address() {
        Some(address) => Some(address),
        None => config
            .wallet
            .watch_address
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(Address::from_str)
            .transpose()
            .context("invalid wallet.watch_address")?,
    };

    let settings = SessionSettings {
        blocks_per_fetch: config.multicall.blocks_per_fetch,
        max_calls_per_batch: config.multicall.max_calls_per_batch,
        recent_window: config.transactions.recent_window(),
    };

    match account {
        Some(account) => tracing::info!("Following account {account} on chain {chain_id}"),
        None => tracing::info!("No account connected on chain {chain_id}"),
    }

    Ok(Arc::new(Session::new(
        repository,
        SessionKey { account, chain_id },
        settings,
    )))
}

pub fn build_app(
    cancellation_token: CancellationToken,
    config: &Config,
    context: Arc<DexContext>,
) -> anyhow::Result<Router> {
    let addr = config.server_uri().parse()?;

    let sse_config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: cancellation_token,
        sse_keep_alive: Some(Duration::from_secs(15)),
    };

    let (sse_server, sse_router) = SseServer::new(sse_config);

    let token_registry = TokenRegistry::from_config(&config.contracts);
    let dex_service = move || DexService::new(context.clone(), token_registry.clone());

    sse_server.with_service(dex_service);

    let app = Router::new()
        .route("/health", get(|| async move { StatusCode::OK }))
        .nest("/dex", sse_router)
        .layer(http_trace_layer(Level::INFO));

    Ok(app)
}
