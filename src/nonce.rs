use std::sync::Arc;

use alloy::primitives::Address;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::rpc::ChainRpc;

/// Serializes nonce acquisition for one sender. Holds the next nonce this process
/// knows to be taken by a broadcast it made, if any.
#[derive(Debug, Default)]
pub struct NonceLane {
    next: Arc<Mutex<Option<u64>>>,
}

/// An exclusive claim on a sender's next nonce. The lane stays locked until the
/// reservation is committed or dropped.
#[derive(Debug)]
pub struct NonceReservation {
    guard: OwnedMutexGuard<Option<u64>>,
    nonce: u64,
}

impl NonceReservation {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Marks the nonce as used by an accepted broadcast.
    pub fn commit(mut self) {
        *self.guard = Some(self.nonce + 1);
    }
}

impl NonceLane {
    /// Reads the sender's count from the endpoint and reserves
    /// `max(chain count, last committed + 1)`.
    pub async fn reserve<C: ChainRpc + ?Sized>(
        &self,
        rpc: &C,
        address: Address,
    ) -> eyre::Result<NonceReservation> {
        let guard = self.next.clone().lock_owned().await;
        let on_chain = rpc.transaction_count(address).await?;
        let nonce = guard.map_or(on_chain, |local| local.max(on_chain));
        Ok(NonceReservation { guard, nonce })
    }

    /// Forgets a committed nonce whose transaction never made it on chain, so the
    /// next reservation trusts the endpoint's count again. Anything committed above
    /// it is forgotten too: those broadcasts sit behind the gap until it is filled.
    pub async fn release(&self, nonce: u64) {
        let mut next = self.next.lock().await;
        if matches!(*next, Some(n) if n > nonce) {
            *next = None;
        }
    }
}

/// One lane per sender address.
#[derive(Debug, Default)]
pub struct NonceBook {
    lanes: DashMap<Address, Arc<NonceLane>>,
}

impl NonceBook {
    pub fn lane(&self, address: Address) -> Arc<NonceLane> {
        self.lanes.entry(address).or_default().clone()
    }

    pub fn retire(&self, address: Address) {
        self.lanes.remove(&address);
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}
