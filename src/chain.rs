use alloy_primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;

/// Which side of a transfer the user address is filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Outgoing,
    Incoming,
}

/// One decoded transfer event, stripped down to what the history needs.
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

/// Read-only chain access consumed by the aggregator and the reconstructor.
/// Implemented by [`crate::rpc::RpcClient`]; tests substitute their own.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Transfer logs for `token` where `user` is the sender or the
    /// recipient, scanned from the earliest block to the current head.
    async fn transfer_logs(
        &self,
        token: Address,
        user: Address,
        direction: TransferDirection,
    ) -> Result<Vec<TransferLog>>;

    /// Timestamp of the given block.
    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;

    /// ERC20 `decimals()` of the token contract.
    async fn token_decimals(&self, token: Address) -> Result<u8>;

    /// ERC20 `balanceOf(owner)` on the token contract, in raw integer units.
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;
}
