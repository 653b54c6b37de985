use crate::chain::{ChainReader, TransferDirection, TransferLog};
use crate::events::{Transfer, balanceOfCall, decimalsCall, decode_transfer_event};
use alloy::network::TransactionBuilder;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log, TransactionRequest};
use alloy::sol_types::{SolCall, SolEvent};
use alloy_primitives::{Address, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, info, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120); // 2 minutes timeout per request

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
        })
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {}: {}, rotating provider",
            current_url, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "Request timeout after {} seconds on {}, rotating provider",
            REQUEST_TIMEOUT.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "Request timeout after {} seconds",
            REQUEST_TIMEOUT.as_secs()
        )
    }

    pub async fn get_latest_block(&self) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                match timeout(REQUEST_TIMEOUT, provider.get_block_number()).await {
                    Ok(Ok(block_number)) => Ok(block_number),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    pub async fn get_block_timestamp(&self, block_number: u64) -> Result<u64> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let future = provider.get_block_by_number(BlockNumberOrTag::Number(block_number));

                match timeout(REQUEST_TIMEOUT, future).await {
                    Ok(Ok(Some(block))) => Ok(block.header.timestamp),
                    Ok(Ok(None)) => Err(anyhow::anyhow!("Block {} not found", block_number)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    pub async fn call_contract<C>(&self, address: Address, call: C) -> Result<C::Return>
    where
        C: SolCall + Clone + Send + Sync + 'static,
        C::Return: Send,
    {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            let call = call.clone();
            async move {
                let provider = client.get_provider();
                let tx = TransactionRequest::default()
                    .with_to(address)
                    .with_input(Bytes::from(call.abi_encode()));

                match timeout(REQUEST_TIMEOUT, provider.call(tx)).await {
                    Ok(Ok(output)) => Ok(C::abi_decode_returns(&output)?),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();
                        client.handle_error(&error_str);
                        Err(anyhow::anyhow!("{}", e))
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
    }

    async fn get_logs_internal(
        &self,
        from_block: u64,
        to_block: u64,
        token: Address,
        user: Address,
        direction: TransferDirection,
    ) -> Result<Vec<Log>> {
        let client = self.clone();
        Retry::spawn(self.get_retry_strategy(), move || {
            let client = client.clone();
            async move {
                let provider = client.get_provider();
                let filter = transfer_filter(token, user, direction, from_block, to_block);

                match timeout(REQUEST_TIMEOUT, provider.get_logs(&filter)).await {
                    Ok(Ok(logs)) => Ok(Ok(logs)),
                    Ok(Err(e)) => {
                        let error_str = e.to_string();

                        if error_str.contains("exceeds max results") {
                            debug!(
                                "Max results exceeded for blocks {}-{}, will split range",
                                from_block, to_block
                            );
                            // hack since we don't want to retry on this specific error
                            Ok(Err(anyhow::anyhow!("{}", e)))
                        } else {
                            client.handle_error(&error_str);
                            Err(anyhow::anyhow!("{}", e))
                        }
                    }
                    Err(_) => Err(client.handle_timeout()),
                }
            }
        })
        .await
        .and_then(|r| r)
    }

    fn parse_max_results_error(error_str: &str) -> Option<(u64, u64)> {
        let re = Regex::new(r"retry with the range (\d+)-(\d+)").ok()?;
        let captures = re.captures(error_str)?;

        let from = captures.get(1)?.as_str().parse().ok()?;
        let to = captures.get(2)?.as_str().parse().ok()?;

        Some((from, to))
    }

    pub async fn get_logs(
        &self,
        from_block: u64,
        to_block: u64,
        token: Address,
        user: Address,
        direction: TransferDirection,
    ) -> Result<Vec<Log>> {
        let mut all_logs = Vec::new();
        let mut current_from = from_block;

        while current_from <= to_block {
            let current_to = to_block;

            match self
                .get_logs_internal(current_from, current_to, token, user, direction)
                .await
            {
                Ok(logs) => {
                    all_logs.extend(logs);
                    break;
                }
                Err(e) => {
                    let error_str = e.to_string();

                    if error_str.contains("exceeds max results") {
                        if let Some((suggested_from, suggested_to)) =
                            Self::parse_max_results_error(&error_str)
                        {
                            info!(
                                "Hit max results limit for blocks {}-{}, splitting at block {}",
                                current_from, current_to, suggested_to
                            );

                            let logs = self
                                .get_logs_internal(
                                    suggested_from,
                                    suggested_to,
                                    token,
                                    user,
                                    direction,
                                )
                                .await?;

                            all_logs.extend(logs);
                            current_from = suggested_to + 1;
                        } else {
                            return Err(e);
                        }
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Ok(all_logs)
    }
}

fn transfer_filter(
    token: Address,
    user: Address,
    direction: TransferDirection,
    from_block: u64,
    to_block: u64,
) -> Filter {
    let filter = Filter::new()
        .address(token)
        .event_signature(Transfer::SIGNATURE_HASH)
        .from_block(from_block)
        .to_block(to_block);

    match direction {
        TransferDirection::Outgoing => filter.topic1(user.into_word()),
        TransferDirection::Incoming => filter.topic2(user.into_word()),
    }
}

#[async_trait]
impl ChainReader for RpcClient {
    async fn transfer_logs(
        &self,
        token: Address,
        user: Address,
        direction: TransferDirection,
    ) -> Result<Vec<TransferLog>> {
        let head = self.get_latest_block().await?;
        let logs = self.get_logs(0, head, token, user, direction).await?;

        let mut transfers = Vec::with_capacity(logs.len());
        for log in logs {
            let event = match decode_transfer_event(&log) {
                Ok(event) => event,
                Err(e) => {
                    warn!("Failed to decode transfer event: {}", e);
                    continue;
                }
            };

            let (Some(transaction_hash), Some(block_number)) =
                (log.transaction_hash, log.block_number)
            else {
                warn!("Skipping pending transfer log without block context");
                continue;
            };

            transfers.push(TransferLog {
                transaction_hash,
                block_number,
                from: event.from,
                to: event.to,
                value: event.value,
            });
        }

        Ok(transfers)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        self.get_block_timestamp(block_number).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        self.call_contract(token, decimalsCall {}).await
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        self.call_contract(token, balanceOfCall { owner }).await
    }
}
