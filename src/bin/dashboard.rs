use anyhow::Result;
use nest_dashboard::balance::BalanceAggregator;
use nest_dashboard::chain::ChainReader;
use nest_dashboard::config::Config;
use nest_dashboard::history::HistoryReconstructor;
use nest_dashboard::rpc::RpcClient;
use nest_dashboard::server::{self, ProxyState};
use nest_dashboard::vaults::{VaultApiClient, VaultSource};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    info!("Starting vault dashboard service");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("Vaults API: {}", config.vaults_api_url);
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );
    match config.user_address {
        Some(address) => info!("Tracking user address: {:?}", address),
        None => info!("No user address configured; balance and history reads disabled"),
    }

    let chain: Arc<dyn ChainReader> = Arc::new(RpcClient::new(&config.json_rpc_urls)?);
    let vaults: Arc<dyn VaultSource> = Arc::new(VaultApiClient::new(config.vaults_api_url.clone()));

    let balances = Arc::new(BalanceAggregator::new(
        chain.clone(),
        vaults,
        config.user_address,
    ));
    let history = Arc::new(HistoryReconstructor::new(chain));

    // The handles release their timers when main unwinds.
    let _balance_poll = balances.clone().spawn();
    let _history_poll = history.spawn(balances);

    let state = Arc::new(ProxyState::new(config.vaults_api_url.clone()));
    if let Err(e) = server::serve(&config.listen_addr, state).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    Ok(())
}
