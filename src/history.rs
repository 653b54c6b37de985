use crate::balance::{BalanceAggregator, BalanceSummary, format_token_amount};
use crate::chain::{ChainReader, TransferDirection, TransferLog};
use crate::poll::{self, PollHandle, QuerySpec};
use alloy_primitives::Address;
use anyhow::Result;
use chrono::DateTime;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Transaction history poll cadence.
pub const HISTORY_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultTag {
    Alpha,
    Treasury,
}

impl fmt::Display for VaultTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultTag::Alpha => write!(f, "alpha"),
            VaultTag::Treasury => write!(f, "treasury"),
        }
    }
}

/// One reconstructed transfer, already in display form.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub transaction_id: String,
    pub from: String,
    pub to: String,
    pub amount: String,
    pub date: String,
    pub block_number: u64,
    pub vault: VaultTag,
}

/// Inputs of one reconstruction cycle, lifted from the balance snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub user: Option<Address>,
    pub alpha_address: Option<Address>,
    pub treasury_address: Option<Address>,
    pub decimals: Option<u8>,
}

pub type HistoryKey = (Option<Address>, Option<Address>, Option<Address>);

impl HistoryQuery {
    pub fn from_summary(user: Option<Address>, summary: &BalanceSummary) -> Self {
        HistoryQuery {
            user,
            alpha_address: summary.alpha_address,
            treasury_address: summary.treasury_address,
            decimals: summary.decimals,
        }
    }

    pub fn spec(&self) -> QuerySpec<HistoryKey> {
        QuerySpec {
            enabled: self.user.is_some()
                && self.alpha_address.is_some()
                && self.treasury_address.is_some()
                && self.decimals.is_some(),
            interval: HISTORY_POLL_INTERVAL,
            key: (self.user, self.alpha_address, self.treasury_address),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HistoryState {
    pub transactions: Vec<Transaction>,
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for HistoryState {
    fn default() -> Self {
        HistoryState {
            transactions: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

/// Rebuilds the user's transfer history across both vault token contracts
/// from event logs, newest block first.
pub struct HistoryReconstructor {
    chain: Arc<dyn ChainReader>,
    state: Arc<Mutex<HistoryState>>,
}

impl HistoryReconstructor {
    pub fn new(chain: Arc<dyn ChainReader>) -> Self {
        HistoryReconstructor {
            chain,
            state: Arc::new(Mutex::new(HistoryState::default())),
        }
    }

    /// Last published state.
    pub async fn state(&self) -> HistoryState {
        self.state.lock().await.clone()
    }

    /// Reconstruct the full transaction list for the given inputs. Disabled
    /// (empty list, no chain queries) unless the user address, both vault
    /// addresses and the decimals are all known. One vault's failure never
    /// aborts the other's processing.
    pub async fn rebuild(&self, query: &HistoryQuery) -> Result<Vec<Transaction>> {
        let (Some(user), Some(alpha), Some(treasury), Some(decimals)) = (
            query.user,
            query.alpha_address,
            query.treasury_address,
            query.decimals,
        ) else {
            return Ok(Vec::new());
        };

        let vaults = [(alpha, VaultTag::Alpha), (treasury, VaultTag::Treasury)];

        let mut transactions = Vec::new();
        for (token, tag) in vaults {
            match self.vault_transactions(token, tag, user, decimals).await {
                Ok(mut vault_transactions) => transactions.append(&mut vault_transactions),
                Err(e) => error!("Error fetching {} vault transactions: {}", tag, e),
            }
        }

        // Newest first; the sort is stable so equal heights keep insertion
        // order.
        transactions.sort_by(|a, b| b.block_number.cmp(&a.block_number));

        Ok(transactions)
    }

    async fn vault_transactions(
        &self,
        token: Address,
        tag: VaultTag,
        user: Address,
        decimals: u8,
    ) -> Result<Vec<Transaction>> {
        let from_logs = self
            .chain
            .transfer_logs(token, user, TransferDirection::Outgoing)
            .await?;
        let to_logs = self
            .chain
            .transfer_logs(token, user, TransferDirection::Incoming)
            .await?;

        // A self-transfer shows up in both result sets under the same
        // transaction hash; keep the first occurrence only.
        let logs = dedup_by_transaction(from_logs.into_iter().chain(to_logs).collect());

        let mut transactions = Vec::with_capacity(logs.len());
        for log in logs {
            let timestamp = match self.chain.block_timestamp(log.block_number).await {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    warn!("Error fetching block {}: {}", log.block_number, e);
                    continue;
                }
            };

            transactions.push(Transaction {
                transaction_id: truncate_hex(&format!("{:?}", log.transaction_hash)),
                from: truncate_hex(&format!("{:?}", log.from)),
                to: truncate_hex(&format!("{:?}", log.to)),
                amount: format_token_amount(log.value, decimals),
                date: format_block_time(timestamp),
                block_number: log.block_number,
                vault: tag,
            });
        }

        Ok(transactions)
    }

    /// Run one poll cycle against the aggregator's current snapshot. Results
    /// computed under inputs that changed mid-flight are discarded; the next
    /// cycle reissues the query under the new key.
    pub async fn refresh(&self, balances: &BalanceAggregator) {
        let query = HistoryQuery::from_summary(balances.user(), &balances.summary().await);
        let spec = query.spec();

        if !spec.enabled {
            *self.state.lock().await = HistoryState {
                transactions: Vec::new(),
                loading: false,
                error: None,
            };
            return;
        }

        let result = self.rebuild(&query).await;

        let current = HistoryQuery::from_summary(balances.user(), &balances.summary().await);
        if spec.key != current.spec().key {
            debug!("Transaction inputs changed during rebuild, discarding result");
            return;
        }

        *self.state.lock().await = match result {
            Ok(transactions) => HistoryState {
                transactions,
                loading: false,
                error: None,
            },
            Err(e) => {
                error!("Transaction history query failed: {}", e);
                HistoryState {
                    transactions: Vec::new(),
                    loading: false,
                    error: Some(e.to_string()),
                }
            }
        };
    }

    pub fn spawn(self: Arc<Self>, balances: Arc<BalanceAggregator>) -> PollHandle {
        poll::spawn("transaction history", HISTORY_POLL_INTERVAL, move || {
            let reconstructor = self.clone();
            let balances = balances.clone();
            async move {
                reconstructor.refresh(&balances).await;
            }
        })
    }
}

fn dedup_by_transaction(logs: Vec<TransferLog>) -> Vec<TransferLog> {
    let mut seen = HashSet::new();
    logs.into_iter()
        .filter(|log| seen.insert(log.transaction_hash))
        .collect()
}

/// First 6 + last 4 characters of a 0x-prefixed hex string.
fn truncate_hex(hex: &str) -> String {
    if hex.len() <= 10 {
        return hex.to_string();
    }
    format!("{}...{}", &hex[..6], &hex[hex.len() - 4..])
}

fn format_block_time(timestamp: u64) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .map(|date| date.format("%b %-d, %Y, %-I:%M %p").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{B256, U256};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const WEI: u128 = 1_000_000_000_000_000_000;

    fn user() -> Address {
        Address::repeat_byte(0x11)
    }

    fn alpha() -> Address {
        Address::repeat_byte(0xaa)
    }

    fn treasury() -> Address {
        Address::repeat_byte(0xbb)
    }

    fn log(hash_byte: u8, block_number: u64, from: Address, to: Address, value: u128) -> TransferLog {
        TransferLog {
            transaction_hash: B256::repeat_byte(hash_byte),
            block_number,
            from,
            to,
            value: U256::from(value),
        }
    }

    #[derive(Default)]
    struct MockChain {
        outgoing: HashMap<Address, Vec<TransferLog>>,
        incoming: HashMap<Address, Vec<TransferLog>>,
        failing_tokens: HashSet<Address>,
        failing_blocks: HashSet<u64>,
        log_queries: AtomicUsize,
    }

    impl MockChain {
        fn outgoing(mut self, token: Address, logs: Vec<TransferLog>) -> Self {
            self.outgoing.insert(token, logs);
            self
        }

        fn incoming(mut self, token: Address, logs: Vec<TransferLog>) -> Self {
            self.incoming.insert(token, logs);
            self
        }

        fn failing_token(mut self, token: Address) -> Self {
            self.failing_tokens.insert(token);
            self
        }

        fn failing_block(mut self, block_number: u64) -> Self {
            self.failing_blocks.insert(block_number);
            self
        }
    }

    #[async_trait]
    impl ChainReader for MockChain {
        async fn transfer_logs(
            &self,
            token: Address,
            _user: Address,
            direction: TransferDirection,
        ) -> Result<Vec<TransferLog>> {
            self.log_queries.fetch_add(1, Ordering::SeqCst);
            if self.failing_tokens.contains(&token) {
                anyhow::bail!("log query rejected");
            }
            let side = match direction {
                TransferDirection::Outgoing => &self.outgoing,
                TransferDirection::Incoming => &self.incoming,
            };
            Ok(side.get(&token).cloned().unwrap_or_default())
        }

        async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
            if self.failing_blocks.contains(&block_number) {
                anyhow::bail!("block fetch failed");
            }
            Ok(1_600_000_000)
        }

        async fn token_decimals(&self, _token: Address) -> Result<u8> {
            Ok(18)
        }

        async fn token_balance(&self, _token: Address, _owner: Address) -> Result<U256> {
            Ok(U256::ZERO)
        }
    }

    fn full_query() -> HistoryQuery {
        HistoryQuery {
            user: Some(user()),
            alpha_address: Some(alpha()),
            treasury_address: Some(treasury()),
            decimals: Some(18),
        }
    }

    fn reconstructor(chain: MockChain) -> (Arc<MockChain>, HistoryReconstructor) {
        let chain = Arc::new(chain);
        let reconstructor = HistoryReconstructor::new(chain.clone());
        (chain, reconstructor)
    }

    #[tokio::test]
    async fn self_transfer_appears_exactly_once() {
        let self_transfer = log(0x42, 100, user(), user(), WEI);
        let chain = MockChain::default()
            .outgoing(alpha(), vec![self_transfer.clone()])
            .incoming(alpha(), vec![self_transfer]);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].transaction_id, "0x4242...4242");
    }

    #[tokio::test]
    async fn newest_block_sorts_first() {
        let chain = MockChain::default()
            .incoming(alpha(), vec![log(0x01, 999, treasury(), user(), WEI)])
            .incoming(treasury(), vec![log(0x02, 1000, alpha(), user(), WEI)]);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        let blocks: Vec<u64> = transactions.iter().map(|txn| txn.block_number).collect();
        assert_eq!(blocks, vec![1000, 999]);
    }

    #[tokio::test]
    async fn missing_inputs_disable_the_query() {
        let queries = [
            HistoryQuery {
                user: None,
                ..full_query()
            },
            HistoryQuery {
                alpha_address: None,
                ..full_query()
            },
            HistoryQuery {
                treasury_address: None,
                ..full_query()
            },
            HistoryQuery {
                decimals: None,
                ..full_query()
            },
        ];

        for query in queries {
            let (chain, reconstructor) = reconstructor(MockChain::default());
            assert!(!query.spec().enabled);

            let transactions = reconstructor.rebuild(&query).await.unwrap();

            assert!(transactions.is_empty());
            assert_eq!(chain.log_queries.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn one_vault_failure_keeps_the_other() {
        let chain = MockChain::default()
            .failing_token(alpha())
            .incoming(treasury(), vec![log(0x07, 50, alpha(), user(), WEI)]);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].vault, VaultTag::Treasury);
    }

    #[tokio::test]
    async fn failed_block_lookup_drops_only_that_entry() {
        let chain = MockChain::default()
            .incoming(
                alpha(),
                vec![
                    log(0x01, 10, treasury(), user(), WEI),
                    log(0x02, 11, treasury(), user(), WEI),
                ],
            )
            .failing_block(10);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].block_number, 11);
    }

    #[tokio::test]
    async fn transactions_carry_display_form() {
        let chain = MockChain::default().outgoing(
            alpha(),
            vec![log(0x42, 123, user(), treasury(), WEI / 2)],
        );
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        let txn = &transactions[0];
        assert_eq!(txn.transaction_id, "0x4242...4242");
        assert_eq!(txn.from, "0x1111...1111");
        assert_eq!(txn.to, "0xbbbb...bbbb");
        assert_eq!(txn.amount, "0.5");
        assert_eq!(txn.date, "Sep 13, 2020, 12:26 PM");
        assert_eq!(txn.vault, VaultTag::Alpha);
    }

    #[tokio::test]
    async fn vaults_are_tagged_independently() {
        let chain = MockChain::default()
            .outgoing(alpha(), vec![log(0x01, 5, user(), treasury(), WEI)])
            .outgoing(treasury(), vec![log(0x02, 6, user(), alpha(), WEI)]);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].vault, VaultTag::Treasury);
        assert_eq!(transactions[1].vault, VaultTag::Alpha);
    }

    // The same transaction hash on both token contracts is two distinct
    // transfers; dedup only collapses within a vault.
    #[tokio::test]
    async fn dedup_is_scoped_per_vault() {
        let chain = MockChain::default()
            .outgoing(alpha(), vec![log(0x09, 7, user(), alpha(), WEI)])
            .outgoing(treasury(), vec![log(0x09, 7, user(), treasury(), WEI)]);
        let (_, reconstructor) = reconstructor(chain);

        let transactions = reconstructor.rebuild(&full_query()).await.unwrap();

        assert_eq!(transactions.len(), 2);
    }

    #[test]
    fn query_key_ignores_decimals() {
        let mut query = full_query();
        let original_key = query.spec().key;

        query.decimals = Some(6);
        assert_eq!(query.spec().key, original_key);

        query.user = Some(Address::repeat_byte(0x99));
        assert_ne!(query.spec().key, original_key);
    }

    #[test]
    fn truncation_keeps_short_strings_intact() {
        assert_eq!(truncate_hex("0xabcd"), "0xabcd");
        assert_eq!(
            truncate_hex("0x1234567890abcdef1234567890abcdef12345678"),
            "0x1234...5678"
        );
    }
}
