use anyhow::Result;
use clap::{Parser, Subcommand};
use nest_dashboard::chain::ChainReader;
use nest_dashboard::config::Config;
use nest_dashboard::query::commands::{cmd_balance, cmd_transactions};
use nest_dashboard::query::formatters::OutputFormat;
use nest_dashboard::rpc::RpcClient;
use nest_dashboard::vaults::{VaultApiClient, VaultSource};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query vault balances and transaction history", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate balance summary across both vaults
    Balance { address: Option<String> },
    /// Transfer history for an address across both vaults
    Transactions { address: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let config = Config::from_env()?;

    let chain: Arc<dyn ChainReader> = Arc::new(RpcClient::new(&config.json_rpc_urls)?);
    let vaults: Arc<dyn VaultSource> = Arc::new(VaultApiClient::new(config.vaults_api_url.clone()));

    match cli.command {
        Commands::Balance { address } => {
            cmd_balance(chain, vaults, address.as_deref(), &format).await?;
        }
        Commands::Transactions { address } => {
            cmd_transactions(chain, vaults, &address, &format).await?;
        }
    }

    Ok(())
}
