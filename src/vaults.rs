use alloy_primitives::Address;
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const ALPHA_VAULT_NAME: &str = "Nest Alpha Vault";
pub const TREASURY_VAULT_NAME: &str = "Nest Treasury Vault";

/// One vault entry from the product metadata API. Only `name`, `price` and
/// the plume deployment feed the aggregation; the remaining fields mirror
/// the payload the API actually serves.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDescriptor {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub vault_status: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub apy: Option<f64>,
    #[serde(default)]
    pub tvl: Option<f64>,
    #[serde(default)]
    pub plume: Option<ChainDeployment>,
    #[serde(default)]
    pub ethereum: Option<ChainDeployment>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDeployment {
    pub contract_address: String,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("API responded with status: {0}")]
    Status(u16),

    #[error("Failed to fetch vault data: {0}")]
    Network(#[from] reqwest::Error),
}

#[async_trait]
pub trait VaultSource: Send + Sync {
    async fn fetch_vaults(&self) -> Result<Vec<VaultDescriptor>, VaultError>;
}

pub struct VaultApiClient {
    http: reqwest::Client,
    url: String,
}

impl VaultApiClient {
    pub fn new(url: String) -> Self {
        VaultApiClient {
            http: reqwest::Client::new(),
            url,
        }
    }
}

#[async_trait]
impl VaultSource for VaultApiClient {
    async fn fetch_vaults(&self) -> Result<Vec<VaultDescriptor>, VaultError> {
        let response = self.http.get(&self.url).send().await?;

        if !response.status().is_success() {
            return Err(VaultError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

/// Addresses and prices for the two tracked vaults, resolved by exact
/// display-name match. An unmatched name leaves that side unresolved and
/// every read depending on it disabled.
#[derive(Debug, Clone, Default)]
pub struct ResolvedVaults {
    pub alpha_address: Option<Address>,
    pub treasury_address: Option<Address>,
    pub alpha_price: Option<f64>,
    pub treasury_price: Option<f64>,
}

pub fn resolve_vaults(vaults: &[VaultDescriptor]) -> ResolvedVaults {
    let alpha = vaults.iter().find(|vault| vault.name == ALPHA_VAULT_NAME);
    let treasury = vaults.iter().find(|vault| vault.name == TREASURY_VAULT_NAME);

    ResolvedVaults {
        alpha_address: alpha.and_then(contract_address),
        treasury_address: treasury.and_then(contract_address),
        alpha_price: alpha.and_then(|vault| vault.price),
        treasury_price: treasury.and_then(|vault| vault.price),
    }
}

fn contract_address(vault: &VaultDescriptor) -> Option<Address> {
    let deployment = vault.plume.as_ref()?;
    match Address::from_str(&deployment.contract_address) {
        Ok(address) => Some(address),
        Err(_) => {
            warn!(
                "Invalid contract address for vault {}: {}",
                vault.name, deployment.contract_address
            );
            None
        }
    }
}
