use std::{future::Future, time::Duration};

use alloy::{
    network::ReceiptResponse,
    primitives::{Address, Bytes, TxHash, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::Http,
};
use async_trait::async_trait;
use reqwest::{Client, Url};

pub type HttpProvider = RootProvider<Http<Client>>;

/// The endpoint's confirmation record for an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub block: Option<u64>,
}

/// A locally signed transfer, ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTransfer {
    pub hash: TxHash,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub raw: Bytes,
}

/// The calls the engine makes against a live endpoint.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn chain_id(&self) -> eyre::Result<u64>;
    async fn balance(&self, address: Address) -> eyre::Result<U256>;
    /// Transaction count including the node's pending pool.
    async fn transaction_count(&self, address: Address) -> eyre::Result<u64>;
    async fn gas_price(&self) -> eyre::Result<u128>;
    async fn broadcast(&self, tx: &SignedTransfer) -> eyre::Result<TxHash>;
    async fn receipt(&self, hash: TxHash) -> eyre::Result<Option<TransferReceipt>>;
}

#[derive(Debug, Clone)]
pub struct HttpRpc {
    provider: HttpProvider,
    call_timeout: Duration,
}

impl HttpRpc {
    pub fn new(url: Url, call_timeout: Duration) -> Self {
        Self {
            provider: ProviderBuilder::new().on_http(url),
            call_timeout,
        }
    }

    async fn timed<T, E, F>(&self, op: &'static str, call: F) -> eyre::Result<T>
    where
        F: Future<Output = Result<T, E>> + Send,
        E: std::error::Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => eyre::bail!("{op} timed out after {:?}", self.call_timeout),
        }
    }
}

#[async_trait]
impl ChainRpc for HttpRpc {
    async fn chain_id(&self) -> eyre::Result<u64> {
        self.timed("eth_chainId", self.provider.get_chain_id()).await
    }

    async fn balance(&self, address: Address) -> eyre::Result<U256> {
        self.timed("eth_getBalance", async {
            self.provider.get_balance(address).await
        })
        .await
    }

    async fn transaction_count(&self, address: Address) -> eyre::Result<u64> {
        self.timed("eth_getTransactionCount", async {
            self.provider.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        self.timed("eth_gasPrice", self.provider.get_gas_price()).await
    }

    async fn broadcast(&self, tx: &SignedTransfer) -> eyre::Result<TxHash> {
        let pending = self
            .timed(
                "eth_sendRawTransaction",
                self.provider.send_raw_transaction(&tx.raw),
            )
            .await?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: TxHash) -> eyre::Result<Option<TransferReceipt>> {
        let receipt = self
            .timed(
                "eth_getTransactionReceipt",
                self.provider.get_transaction_receipt(hash),
            )
            .await?;
        Ok(receipt.map(|r| TransferReceipt {
            hash: r.transaction_hash,
            success: r.status(),
            block: r.block_number,
        }))
    }
}
