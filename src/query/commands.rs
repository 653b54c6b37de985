use crate::balance::BalanceAggregator;
use crate::chain::ChainReader;
use crate::history::{HistoryQuery, HistoryReconstructor};
use crate::query::formatters::{OutputFormat, format_summary, format_transactions};
use crate::vaults::VaultSource;
use alloy_primitives::Address;
use anyhow::Result;
use std::str::FromStr;
use std::sync::Arc;

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}

pub async fn cmd_balance(
    chain: Arc<dyn ChainReader>,
    vaults: Arc<dyn VaultSource>,
    address: Option<&str>,
    format: &OutputFormat,
) -> Result<()> {
    let user = address.map(parse_address).transpose()?;

    let aggregator = BalanceAggregator::new(chain, vaults, user);
    let summary = aggregator.refresh().await;

    if let Some(error) = &summary.vault_error {
        return Err(anyhow::anyhow!("Failed to load vault data: {}", error));
    }

    let output = format_summary(&summary, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_transactions(
    chain: Arc<dyn ChainReader>,
    vaults: Arc<dyn VaultSource>,
    address: &str,
    format: &OutputFormat,
) -> Result<()> {
    let user = parse_address(address)?;

    let aggregator = BalanceAggregator::new(chain.clone(), vaults, Some(user));
    let summary = aggregator.refresh().await;

    if let Some(error) = &summary.vault_error {
        return Err(anyhow::anyhow!("Failed to load vault data: {}", error));
    }

    let reconstructor = HistoryReconstructor::new(chain);
    let query = HistoryQuery::from_summary(Some(user), &summary);
    let transactions = reconstructor.rebuild(&query).await?;

    let output = format_transactions(&transactions, format);
    println!("{output}");

    Ok(())
}
