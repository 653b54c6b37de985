use alloy_primitives::Address;
use anyhow::{Context, Result};
use std::str::FromStr;

pub const DEFAULT_VAULTS_API_URL: &str = "https://app.nest.credit/api/vaults";

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub vaults_api_url: String,
    pub user_address: Option<Address>,
    pub listen_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls: Vec<String> = std::env::var("JSON_RPC_URLS")
            .context("JSON_RPC_URLS must be set in .env")?
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        let vaults_api_url = std::env::var("VAULTS_API_URL")
            .unwrap_or_else(|_| DEFAULT_VAULTS_API_URL.to_string());

        let user_address = match std::env::var("USER_ADDRESS") {
            Ok(address) => {
                Some(Address::from_str(&address).context("Invalid USER_ADDRESS format")?)
            }
            Err(_) => None,
        };

        let listen_addr =
            std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

        Ok(Config {
            json_rpc_urls,
            vaults_api_url,
            user_address,
            listen_addr,
        })
    }
}
