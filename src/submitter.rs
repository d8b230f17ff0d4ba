use std::{str::FromStr, sync::Arc, time::Duration};

use alloy::{
    eips::eip2718::Encodable2718,
    network::TransactionBuilder,
    primitives::{Address, TxHash, U256},
    rpc::types::TransactionRequest,
};
use tracing::{debug, error, info, warn};

use crate::{
    account::Account,
    error::{SubmitError, TransferFault},
    nonce::NonceBook,
    rpc::{ChainRpc, SignedTransfer, TransferReceipt},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Confirmation {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitterConfig {
    pub chain_id: u64,
    pub min_gas_price: u128,
    pub retry: RetryPolicy,
    pub confirmation: Confirmation,
}

/// How much to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Amount {
    Exact(U256),
    /// Everything above the gas reserve, recomputed on every attempt.
    Sweep,
}

/// Parses a 20-byte hex address. Mixed-case input must carry a valid checksum.
pub fn normalize_address(raw: &str) -> Result<Address, SubmitError> {
    let invalid = || SubmitError::terminal(TransferFault::InvalidAddress(raw.to_string()));
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if digits.len() != 40 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    let address = Address::from_str(trimmed).map_err(|_| invalid())?;
    let has_lower = digits.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = digits.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper && address.to_checksum(None) != trimmed {
        return Err(invalid());
    }
    Ok(address)
}

/// Turns transfer requests into confirmed transactions against one endpoint.
pub struct TransactionSubmitter<C> {
    rpc: Arc<C>,
    config: SubmitterConfig,
    nonces: NonceBook,
}

impl<C: ChainRpc> TransactionSubmitter<C> {
    pub fn new(rpc: Arc<C>, config: SubmitterConfig) -> Self {
        Self {
            rpc,
            config,
            nonces: NonceBook::default(),
        }
    }

    /// Endpoint price floored at the configured minimum.
    pub async fn gas_price(&self) -> Result<u128, SubmitError> {
        let reported = self
            .rpc
            .gas_price()
            .await
            .map_err(SubmitError::rpc("eth_gasPrice"))?;
        Ok(reported.max(self.config.min_gas_price))
    }

    /// The value a sweep of `address` would move right now, if any.
    pub async fn sweepable(
        &self,
        address: Address,
        gas_limit: u64,
    ) -> Result<Option<U256>, SubmitError> {
        let balance = self
            .rpc
            .balance(address)
            .await
            .map_err(SubmitError::rpc("eth_getBalance"))?;
        let fee = U256::from(gas_limit) * U256::from(self.gas_price().await?);
        Ok(balance.checked_sub(fee).filter(|rest| !rest.is_zero()))
    }

    /// Drops the nonce lane of an account that will not send again.
    pub fn retire(&self, address: Address) {
        self.nonces.retire(address);
    }

    pub async fn submit(
        &self,
        from: &Account,
        to: &str,
        amount: Amount,
        gas_limit: u64,
        silent: bool,
    ) -> Result<TransferReceipt, SubmitError> {
        let to = normalize_address(to)?;
        let sender = from.address();
        let attempts = self.config.retry.attempts.max(1);
        let mut prior: Option<(TxHash, u64)> = None;
        let mut attempt = 1;

        loop {
            if let Some((hash, nonce)) = prior.take() {
                if let Some(receipt) = self.settle_prior(sender, hash, nonce).await? {
                    return Ok(receipt);
                }
            }

            match self
                .attempt(from, to, amount, gas_limit, silent, &mut prior)
                .await
            {
                Ok(receipt) => return Ok(receipt),
                Err(err) if err.retryable && attempt < attempts => {
                    warn!(
                        from = %sender,
                        to = %to,
                        attempt,
                        error = %err,
                        "transfer attempt failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    error!(from = %sender, to = %to, attempt, error = %err, "transfer failed");
                    return Err(err);
                }
            }
        }
    }

    /// Checks whether an earlier attempt landed after all. A landed transfer ends the
    /// retry loop; a missing one gives its nonce back to the chain's view.
    async fn settle_prior(
        &self,
        sender: Address,
        hash: TxHash,
        nonce: u64,
    ) -> Result<Option<TransferReceipt>, SubmitError> {
        match self.rpc.receipt(hash).await {
            Ok(Some(receipt)) if receipt.success => {
                info!(%hash, block = ?receipt.block, "earlier attempt was included");
                Ok(Some(receipt))
            }
            Ok(Some(receipt)) => Err(SubmitError::terminal(
                TransferFault::TransactionReverted {
                    hash,
                    block: receipt.block,
                },
            )),
            Ok(None) => {
                self.nonces.lane(sender).release(nonce).await;
                Ok(None)
            }
            Err(err) => {
                debug!(%hash, error = %format!("{err:#}"), "could not look up earlier attempt");
                Ok(None)
            }
        }
    }

    async fn attempt(
        &self,
        from: &Account,
        to: Address,
        amount: Amount,
        gas_limit: u64,
        silent: bool,
        prior: &mut Option<(TxHash, u64)>,
    ) -> Result<TransferReceipt, SubmitError> {
        let sender = from.address();
        let balance = self
            .rpc
            .balance(sender)
            .await
            .map_err(SubmitError::rpc("eth_getBalance"))?;
        let gas_price = self.gas_price().await?;
        let fee = U256::from(gas_limit) * U256::from(gas_price);

        let value = match amount {
            Amount::Exact(value) => value,
            Amount::Sweep => balance.saturating_sub(fee),
        };
        let required = value.saturating_add(fee);
        if balance < required || (amount == Amount::Sweep && value.is_zero()) {
            return Err(SubmitError::terminal(TransferFault::InsufficientBalance {
                address: sender,
                balance,
                required,
            }));
        }

        let lane = self.nonces.lane(sender);
        let reservation = lane
            .reserve(self.rpc.as_ref(), sender)
            .await
            .map_err(SubmitError::rpc("eth_getTransactionCount"))?;
        let nonce = reservation.nonce();

        let signed = self
            .sign(from, to, value, gas_limit, gas_price, nonce)
            .await?;
        let hash = self.rpc.broadcast(&signed).await.map_err(|err| {
            SubmitError::transient(TransferFault::Broadcast(format!("{err:#}")))
        })?;
        reservation.commit();
        *prior = Some((hash, nonce));
        debug!(from = %sender, %hash, nonce, "broadcast accepted");

        let receipt = self.await_receipt(hash).await?;
        *prior = None;
        if !receipt.success {
            return Err(SubmitError::terminal(TransferFault::TransactionReverted {
                hash,
                block: receipt.block,
            }));
        }
        if !silent {
            info!(
                from = %sender,
                to = %to,
                %value,
                %hash,
                block = ?receipt.block,
                "transfer confirmed"
            );
        }
        Ok(receipt)
    }

    async fn sign(
        &self,
        from: &Account,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
        nonce: u64,
    ) -> Result<SignedTransfer, SubmitError> {
        let mut request = TransactionRequest::default()
            .with_to(to)
            .with_value(value)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.config.chain_id);
        request.from = Some(from.address());

        let envelope = request
            .build(&from.wallet())
            .await
            .map_err(|err| SubmitError::terminal(TransferFault::SigningFailure(err.to_string())))?;
        let raw = envelope.encoded_2718();
        if raw.is_empty() {
            return Err(SubmitError::terminal(TransferFault::SigningFailure(
                "empty encoding".to_string(),
            )));
        }

        Ok(SignedTransfer {
            hash: *envelope.tx_hash(),
            from: from.address(),
            to,
            value,
            nonce,
            gas_limit,
            gas_price,
            raw: raw.into(),
        })
    }

    async fn await_receipt(&self, hash: TxHash) -> Result<TransferReceipt, SubmitError> {
        let Confirmation {
            timeout,
            poll_interval,
        } = self.config.confirmation;
        let poll = async {
            loop {
                match self.rpc.receipt(hash).await {
                    Ok(Some(receipt)) => return receipt,
                    Ok(None) => {}
                    Err(err) => debug!(%hash, error = %format!("{err:#}"), "receipt poll failed"),
                }
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll).await.map_err(|_| {
            SubmitError::transient(TransferFault::ConfirmationTimeout {
                hash,
                waited: timeout,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_lowercase_uppercase_and_valid_checksums() {
        let expected: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        for raw in [
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0x5AAEB6053F3E94C9B9A09F33669435E7EF1BEAED",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "  0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed\n",
        ] {
            assert_eq!(normalize_address(raw).unwrap(), expected, "{raw}");
        }
    }

    #[test]
    fn rejects_malformed_addresses_as_terminal() {
        for raw in [
            "",
            "5aaeb6053f3e94c9b9a09f33669435e7ef1beaed",
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1bea",
            "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beazz",
            // checksum with one letter's case flipped
            "0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        ] {
            let err = normalize_address(raw).unwrap_err();
            assert!(!err.retryable, "{raw}");
            assert!(matches!(err.fault, TransferFault::InvalidAddress(_)), "{raw}");
        }
    }
}
