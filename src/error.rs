use std::time::Duration;

use alloy::primitives::{Address, TxHash, U256};
use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("private key must be `0x` followed by 64 hex digits")]
    MalformedKey,
    #[error("private key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("{field} must be a positive integer, got `{raw}`")]
    NotPositive { field: &'static str, raw: String },
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid endpoint url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("no endpoint reachable after probing {tried} candidate(s)")]
    NoEndpointAvailable { tried: usize },
}

/// What went wrong with a single transfer.
#[derive(Debug, Error)]
pub enum TransferFault {
    #[error("invalid address `{0}`")]
    InvalidAddress(String),
    #[error("insufficient balance on {address}: have {balance} wei, need {required} wei")]
    InsufficientBalance {
        address: Address,
        balance: U256,
        required: U256,
    },
    #[error("signing produced no usable payload: {0}")]
    SigningFailure(String),
    #[error("transaction {hash} reverted in block {block:?}")]
    TransactionReverted { hash: TxHash, block: Option<u64> },
    #[error("{op} failed: {reason}")]
    Rpc { op: &'static str, reason: String },
    #[error("broadcast failed: {0}")]
    Broadcast(String),
    #[error("no receipt for {hash} after {waited:?}")]
    ConfirmationTimeout { hash: TxHash, waited: Duration },
}

/// A transfer failure tagged with whether another attempt may succeed.
#[derive(Debug, Error)]
#[error("{fault}")]
pub struct SubmitError {
    pub fault: TransferFault,
    pub retryable: bool,
}

impl SubmitError {
    pub fn terminal(fault: TransferFault) -> Self {
        Self {
            fault,
            retryable: false,
        }
    }

    pub fn transient(fault: TransferFault) -> Self {
        Self {
            fault,
            retryable: true,
        }
    }

    pub(crate) fn rpc(op: &'static str) -> impl FnOnce(eyre::Report) -> Self {
        move |err| {
            Self::transient(TransferFault::Rpc {
                op,
                reason: format!("{err:#}"),
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineCause {
    #[error(transparent)]
    Submit(#[from] SubmitError),
    #[error("persisting key material: {0}")]
    Persist(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("pipeline {index} ({address}) failed after reaching {stage:?}: {cause}")]
pub struct PipelineError {
    pub index: usize,
    pub address: Address,
    pub stage: Stage,
    #[source]
    pub cause: PipelineCause,
}
