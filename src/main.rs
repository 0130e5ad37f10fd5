mod alerting;
mod chain;
mod config;
mod db;
mod error;
mod integrity;
mod metrics;
mod observer;
mod pair_engine;
mod recorder;
mod retry;
mod swap_engine;
mod telemetry;

use crate::alerting::{AlertSink, NullAlertSink, TelegramAlertSink};
use crate::chain::contract::{EthersErc721Reader, EthersSwapAgent};
use crate::chain::fleet::{ChainEntry, ChainFleet, LatestBlockCache};
use crate::chain::rpc::EthersRpc;
use crate::config::{get_global_config, init_global_config, load_file_config, resolve_keys, Cli};
use crate::observer::Observer;
use crate::pair_engine::PairEngine;
use crate::swap_engine::SwapEngine;
use axum::{routing::get, Router};
use clap::Parser;
use ethers::prelude::*;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing(telemetry::TelemetryConfig::default())?;
    metrics::register_all();

    let file_config = load_file_config(&cli.config_path)?;
    let keys = resolve_keys(&cli, &file_config.key_manager).await?;
    init_global_config(file_config)?;
    let app_config = get_global_config();

    info!(chains = app_config.chains.len(), "starting xbridge-core");

    let pool = db::connect(&app_config.storage).await?;
    db::migrate(&pool).await?;

    let alert_sink: Arc<dyn AlertSink> = if app_config.alert.telegram_bot_token.is_empty() {
        Arc::new(NullAlertSink)
    } else {
        Arc::new(TelegramAlertSink::new(app_config.alert.telegram_bot_token.clone(), app_config.alert.telegram_chat_id.clone()))
    };

    let mut fleet = ChainFleet::new();
    for chain in &app_config.chains {
        let provider = Arc::new(Provider::<Http>::try_from(chain.provider.as_str())?);
        let contract_addr: Address = chain.swap_agent_addr.parse()?;
        let signing_key = keys.signing_keys.get(&chain.id).cloned().unwrap_or_default();
        let wallet: LocalWallet = signing_key.parse().unwrap_or_else(|_| LocalWallet::new(&mut rand::thread_rng()));

        let rpc = Arc::new(EthersRpc::new(provider.clone()));
        let swap_agent = Arc::new(EthersSwapAgent::new(provider.clone(), wallet, contract_addr, rpc.clone()));
        let erc721_reader = Arc::new(EthersErc721Reader::new(provider.clone()));

        fleet.insert(
            chain.id.clone(),
            ChainEntry {
                rpc,
                swap_agent,
                erc721_reader,
                latest_block: Arc::new(LatestBlockCache::default()),
            },
        );
    }
    let fleet = Arc::new(fleet);

    let mut handles = Vec::new();

    for chain in &app_config.chains {
        let entry = fleet.get(&chain.id)?;

        let observer = Arc::new(Observer::new(
            chain,
            &app_config.alert,
            pool.clone(),
            entry.rpc.clone(),
            entry.swap_agent.clone(),
            alert_sink.clone(),
            keys.hmac_key.clone(),
            app_config.storage.dialect,
            entry.latest_block.clone(),
        ));
        handles.extend(observer.start());

        let pair_engine = Arc::new(PairEngine::new(chain, pool.clone(), fleet.clone(), app_config.storage.dialect));
        handles.extend(pair_engine.start());

        let swap_engine = Arc::new(SwapEngine::new(chain, pool.clone(), fleet.clone(), keys.hmac_key.clone(), app_config.storage.dialect, alert_sink.clone()));
        handles.extend(swap_engine.start());
    }

    let server = tokio::spawn(serve_http(app_config.server.bind.clone()));
    handles.push(server);

    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "worker task panicked");
        }
    }

    Ok(())
}

async fn serve_http(bind: String) {
    let app = Router::new().route("/healthz", get(healthz)).route("/metrics", get(metrics_handler));

    let addr: SocketAddr = bind.parse().expect("invalid server.bind address");
    info!(%addr, "operational http surface listening");

    let listener = tokio::net::TcpListener::bind(addr).await.expect("failed to bind http server");
    axum::serve(listener, app).await.expect("http server failed");
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics_handler() -> String {
    metrics::gather_text()
}
