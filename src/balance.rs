use crate::chain::ChainReader;
use crate::poll::{self, PollHandle};
use crate::vaults::{ResolvedVaults, VaultSource, resolve_vaults};
use alloy_primitives::utils::format_units;
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, warn};

/// Vault metadata poll cadence. Fixed interval, no backoff between cycles.
pub const VAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Aggregate balance view over both tracked vaults. Recomputed wholesale on
/// every poll cycle; callers must treat `vault_error` as render-blocking.
#[derive(Debug, Clone)]
pub struct BalanceSummary {
    pub alpha_address: Option<Address>,
    pub treasury_address: Option<Address>,
    pub decimals: Option<u8>,
    pub total_raw_balance: U256,
    pub total_token_balance: String,
    pub total_balance_usd: String,
    pub vault_loading: bool,
    pub balance_loading: bool,
    pub vault_error: Option<String>,
}

impl Default for BalanceSummary {
    /// State before the first poll cycle has resolved anything.
    fn default() -> Self {
        BalanceSummary {
            alpha_address: None,
            treasury_address: None,
            decimals: None,
            total_raw_balance: U256::ZERO,
            total_token_balance: "0".to_string(),
            total_balance_usd: "0".to_string(),
            vault_loading: true,
            balance_loading: true,
            vault_error: None,
        }
    }
}

struct BalanceInputs {
    user: Option<Address>,
    resolved: ResolvedVaults,
    decimals: Option<u8>,
    alpha_balance: Option<U256>,
    treasury_balance: Option<U256>,
}

fn summarize(inputs: &BalanceInputs) -> BalanceSummary {
    // The raw sum stays well-defined with reads still unresolved.
    let total_raw_balance = inputs.alpha_balance.unwrap_or(U256::ZERO)
        + inputs.treasury_balance.unwrap_or(U256::ZERO);

    let total_token_balance = match inputs.decimals {
        Some(decimals) => format_token_amount(total_raw_balance, decimals),
        None => "0".to_string(),
    };

    // A zero price upstream is indistinguishable from one that has not
    // loaded yet; both gate the USD total.
    let alpha_price = inputs.resolved.alpha_price.filter(|price| *price != 0.0);
    let treasury_price = inputs
        .resolved
        .treasury_price
        .filter(|price| *price != 0.0);

    let total_balance_usd = match (
        inputs.decimals,
        alpha_price,
        treasury_price,
        inputs.alpha_balance,
        inputs.treasury_balance,
    ) {
        (
            Some(decimals),
            Some(alpha_price),
            Some(treasury_price),
            Some(alpha_balance),
            Some(treasury_balance),
        ) => {
            let usd = scaled_value(alpha_balance, decimals) * alpha_price
                + scaled_value(treasury_balance, decimals) * treasury_price;
            format!("{usd:.2}")
        }
        _ => "0".to_string(),
    };

    let balance_loading = inputs.user.is_none()
        || inputs.decimals.is_none()
        || alpha_price.is_none()
        || treasury_price.is_none()
        || inputs.alpha_balance.is_none()
        || inputs.treasury_balance.is_none();

    BalanceSummary {
        alpha_address: inputs.resolved.alpha_address,
        treasury_address: inputs.resolved.treasury_address,
        decimals: inputs.decimals,
        total_raw_balance,
        total_token_balance,
        total_balance_usd,
        vault_loading: false,
        balance_loading,
        vault_error: None,
    }
}

/// Scale a raw integer amount by `decimals` and trim trailing zeros, so
/// 3 * 10^18 at 18 decimals renders as "3" and 5 * 10^17 as "0.5".
pub fn format_token_amount(value: U256, decimals: u8) -> String {
    let formatted = format_units(value, decimals).unwrap_or_else(|_| value.to_string());
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn scaled_value(value: U256, decimals: u8) -> f64 {
    format_units(value, decimals)
        .ok()
        .and_then(|formatted| formatted.parse().ok())
        .unwrap_or(0.0)
}

/// Combines the metadata poll, the decimals read and the two balance reads
/// into one snapshot. The chain handle, vault source and user address are
/// passed in explicitly; without a user address the balance reads stay
/// disabled.
pub struct BalanceAggregator {
    chain: Arc<dyn ChainReader>,
    vaults: Arc<dyn VaultSource>,
    user: Option<Address>,
    summary: Arc<Mutex<BalanceSummary>>,
}

impl BalanceAggregator {
    pub fn new(
        chain: Arc<dyn ChainReader>,
        vaults: Arc<dyn VaultSource>,
        user: Option<Address>,
    ) -> Self {
        BalanceAggregator {
            chain,
            vaults,
            user,
            summary: Arc::new(Mutex::new(BalanceSummary::default())),
        }
    }

    pub fn user(&self) -> Option<Address> {
        self.user
    }

    /// Last published snapshot.
    pub async fn summary(&self) -> BalanceSummary {
        self.summary.lock().await.clone()
    }

    /// Run one poll cycle and publish the resulting snapshot.
    pub async fn refresh(&self) -> BalanceSummary {
        let summary = match self.vaults.fetch_vaults().await {
            Ok(vaults) => self.read_balances(resolve_vaults(&vaults)).await,
            Err(e) => {
                error!("Error fetching vault data: {}", e);
                BalanceSummary {
                    vault_loading: false,
                    vault_error: Some(e.to_string()),
                    ..BalanceSummary::default()
                }
            }
        };

        *self.summary.lock().await = summary.clone();
        summary
    }

    async fn read_balances(&self, resolved: ResolvedVaults) -> BalanceSummary {
        // Both vaults hold the same NEST token decimals, so one read from
        // the alpha contract covers both.
        let decimals = match resolved.alpha_address {
            Some(token) => match self.chain.token_decimals(token).await {
                Ok(decimals) => Some(decimals),
                Err(e) => {
                    warn!("Failed to read token decimals: {}", e);
                    None
                }
            },
            None => None,
        };

        // The two balance reads are independent, so they are issued together.
        let (alpha_balance, treasury_balance) = futures::join!(
            self.read_balance(resolved.alpha_address),
            self.read_balance(resolved.treasury_address),
        );

        summarize(&BalanceInputs {
            user: self.user,
            resolved,
            decimals,
            alpha_balance,
            treasury_balance,
        })
    }

    async fn read_balance(&self, token: Option<Address>) -> Option<U256> {
        let (Some(token), Some(owner)) = (token, self.user) else {
            return None;
        };

        match self.chain.token_balance(token, owner).await {
            Ok(balance) => Some(balance),
            Err(e) => {
                warn!("Failed to read balance of {:?}: {}", token, e);
                None
            }
        }
    }

    pub fn spawn(self: Arc<Self>) -> PollHandle {
        poll::spawn("vault balance", VAULT_POLL_INTERVAL, move || {
            let aggregator = self.clone();
            async move {
                aggregator.refresh().await;
            }
        })
    }
}
