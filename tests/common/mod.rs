#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
    time::{Duration, Instant},
};

use alloy::primitives::{utils::parse_ether, Address, TxHash, U256};
use async_trait::async_trait;
use fanout::{
    rpc::{ChainRpc, SignedTransfer, TransferReceipt},
    submitter::{Confirmation, RetryPolicy, SubmitterConfig},
};

pub const CHAIN_ID: u64 = 31337;
pub const GAS_PRICE: u128 = 10_000_000;

pub fn ether(amount: &str) -> U256 {
    parse_ether(amount).unwrap()
}

pub fn fast_config() -> SubmitterConfig {
    SubmitterConfig {
        chain_id: CHAIN_ID,
        min_gas_price: GAS_PRICE,
        retry: RetryPolicy {
            attempts: 3,
            delay: Duration::from_millis(100),
        },
        confirmation: Confirmation {
            timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
        },
    }
}

/// What the mock does with a broadcast, in arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// Executes and reports success.
    Mine,
    /// Rejects at the transport level.
    Refuse,
    /// Executes and reports a failed status.
    Revert,
    /// Accepted but never executed, never receipted.
    Drop,
    /// Executes but the receipt only becomes visible after the delay.
    MineLate(Duration),
}

#[derive(Debug, Default)]
struct State {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, (TransferReceipt, Instant)>,
    broadcasts: Vec<SignedTransfer>,
    /// Accepted transactions waiting behind a nonce gap, as a node's pool holds them.
    queued: HashMap<(Address, u64), (SignedTransfer, Script)>,
    script: Vec<Script>,
    failing_reads: u32,
    block: u64,
}

/// In-memory chain with instant inclusion. Transactions above the sender's next
/// nonce wait in a queue until the gap is filled.
#[derive(Debug, Default)]
pub struct MockChain {
    state: Mutex<State>,
    pub count_delay: Option<Duration>,
    pub gas_price: u128,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            gas_price: GAS_PRICE,
            ..Self::default()
        }
    }

    pub fn fund(&self, address: Address, amount: U256) {
        *self.state.lock().unwrap().balances.entry(address).or_default() += amount;
    }

    pub fn balance_of(&self, address: Address) -> U256 {
        self.state.lock().unwrap().balances.get(&address).copied().unwrap_or_default()
    }

    /// Scripts the next broadcasts; anything past the script is mined.
    pub fn script(&self, steps: &[Script]) {
        let mut state = self.state.lock().unwrap();
        state.script = steps.iter().rev().copied().collect();
    }

    pub fn fail_reads(&self, count: u32) {
        self.state.lock().unwrap().failing_reads = count;
    }

    pub fn broadcasts(&self) -> Vec<SignedTransfer> {
        self.state.lock().unwrap().broadcasts.clone()
    }

    pub fn broadcasts_from(&self, address: Address) -> Vec<SignedTransfer> {
        self.broadcasts().into_iter().filter(|tx| tx.from == address).collect()
    }

    pub fn broadcasts_to(&self, address: Address) -> Vec<SignedTransfer> {
        self.broadcasts().into_iter().filter(|tx| tx.to == address).collect()
    }

    pub fn assert_unique_nonces(&self, address: Address) {
        let mut seen = HashSet::new();
        for tx in self.broadcasts_from(address) {
            assert!(seen.insert(tx.nonce), "nonce {} of {address} used twice", tx.nonce);
        }
    }

    /// Includes `tx`, then anything it unblocks in the sender's queue.
    fn include(state: &mut State, tx: &SignedTransfer, step: Script) {
        Self::settle(state, tx, step);
        loop {
            let next = state.nonces.get(&tx.from).copied().unwrap_or_default();
            let Some((queued, step)) = state.queued.remove(&(tx.from, next)) else {
                break;
            };
            Self::settle(state, &queued, step);
        }
    }

    fn settle(state: &mut State, tx: &SignedTransfer, step: Script) {
        let now = Instant::now();
        match step {
            Script::Mine => {
                let receipt = Self::execute(state, tx);
                state.receipts.insert(tx.hash, (receipt, now));
            }
            Script::Revert => {
                let mut receipt = Self::execute(state, tx);
                receipt.success = false;
                state.receipts.insert(tx.hash, (receipt, now));
            }
            Script::MineLate(delay) => {
                let receipt = Self::execute(state, tx);
                state.receipts.insert(tx.hash, (receipt, now + delay));
            }
            Script::Drop | Script::Refuse => {}
        }
    }

    fn execute(state: &mut State, tx: &SignedTransfer) -> TransferReceipt {
        let fee = U256::from(tx.gas_limit) * U256::from(tx.gas_price);
        let from = state.balances.entry(tx.from).or_default();
        *from = from.saturating_sub(tx.value + fee);
        *state.balances.entry(tx.to).or_default() += tx.value;
        *state.nonces.entry(tx.from).or_default() += 1;
        state.block += 1;
        TransferReceipt {
            hash: tx.hash,
            success: true,
            block: Some(state.block),
        }
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn chain_id(&self) -> eyre::Result<u64> {
        Ok(CHAIN_ID)
    }

    async fn balance(&self, address: Address) -> eyre::Result<U256> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            eyre::bail!("connection reset");
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_count(&self, address: Address) -> eyre::Result<u64> {
        if let Some(delay) = self.count_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.state.lock().unwrap().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn gas_price(&self) -> eyre::Result<u128> {
        Ok(self.gas_price)
    }

    async fn broadcast(&self, tx: &SignedTransfer) -> eyre::Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        let step = state.script.pop().unwrap_or(Script::Mine);
        if step == Script::Refuse {
            eyre::bail!("request timed out");
        }
        let expected = state.nonces.get(&tx.from).copied().unwrap_or_default();
        eyre::ensure!(
            tx.nonce >= expected,
            "nonce {} too low for {}, expected {expected}",
            tx.nonce,
            tx.from
        );
        state.broadcasts.push(tx.clone());

        if step == Script::Drop {
            return Ok(tx.hash);
        }
        if tx.nonce > expected {
            state.queued.insert((tx.from, tx.nonce), (tx.clone(), step));
        } else {
            Self::include(&mut state, tx, step);
        }
        Ok(tx.hash)
    }

    async fn receipt(&self, hash: TxHash) -> eyre::Result<Option<TransferReceipt>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .receipts
            .get(&hash)
            .filter(|(_, visible)| Instant::now() >= *visible)
            .map(|(receipt, _)| *receipt))
    }
}
