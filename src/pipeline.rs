use std::sync::Arc;

use alloy::primitives::{Address, U256};
use tracing::{info, warn};

use crate::{
    account::{Account, AccountFactory},
    error::{PipelineCause, PipelineError},
    keystore::KeyStore,
    notify::ResultSink,
    rpc::{ChainRpc, TransferReceipt},
    submitter::{Amount, TransactionSubmitter},
};

/// Last state a unit of work reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    Funded,
    Forwarded,
    Swept,
    Done,
}

/// Where funds go and how much moves at each hop.
#[derive(Debug, Clone)]
pub struct Route {
    pub forward_to: Address,
    pub sweep_to: Address,
    pub funding: U256,
    pub forward_value: U256,
    pub gas_limit: u64,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub account: Account,
    pub funding: TransferReceipt,
    pub forward: TransferReceipt,
    /// `None` when the account could not cover a sweep's gas.
    pub sweep: Option<TransferReceipt>,
}

pub struct Pipeline<C, K> {
    submitter: Arc<TransactionSubmitter<C>>,
    keystore: Arc<K>,
    sink: Arc<ResultSink>,
    factory: AccountFactory,
    operator: Account,
    route: Route,
}

impl<C, K> Pipeline<C, K>
where
    C: ChainRpc,
    K: KeyStore,
{
    pub fn new(
        submitter: Arc<TransactionSubmitter<C>>,
        keystore: Arc<K>,
        sink: Arc<ResultSink>,
        operator: Account,
        route: Route,
    ) -> Self {
        Self {
            submitter,
            keystore,
            sink,
            factory: AccountFactory,
            operator,
            route,
        }
    }

    /// Generate → fund → forward → sweep for one new account.
    pub async fn run(&self, index: usize) -> Result<PipelineOutcome, PipelineError> {
        let account = self.factory.create();
        let address = account.address();
        info!(index, %address, "generated account");

        let result = self.drive(&account).await;
        self.submitter.retire(address);

        match result {
            Ok((funding, forward, sweep)) => {
                info!(index, %address, stage = ?Stage::Done, "pipeline complete");
                self.sink.record(&account).await;
                Ok(PipelineOutcome {
                    account,
                    funding,
                    forward,
                    sweep,
                })
            }
            Err((stage, cause)) => Err(PipelineError {
                index,
                address,
                stage,
                cause,
            }),
        }
    }

    async fn drive(
        &self,
        account: &Account,
    ) -> Result<(TransferReceipt, TransferReceipt, Option<TransferReceipt>), (Stage, PipelineCause)>
    {
        let address = account.address();
        let gas_limit = self.route.gas_limit;

        self.keystore
            .persist(account)
            .await
            .map_err(at(Stage::Created))?;

        let funding = self
            .submitter
            .submit(
                &self.operator,
                &address.to_string(),
                Amount::Exact(self.route.funding),
                gas_limit,
                false,
            )
            .await
            .map_err(at(Stage::Created))?;
        info!(%address, stage = ?Stage::Funded, hash = %funding.hash, "funded");

        let forward = self
            .submitter
            .submit(
                account,
                &self.route.forward_to.to_string(),
                Amount::Exact(self.route.forward_value),
                gas_limit,
                false,
            )
            .await
            .map_err(at(Stage::Funded))?;
        info!(%address, stage = ?Stage::Forwarded, hash = %forward.hash, "forwarded");

        let sweep = match self
            .submitter
            .sweepable(address, gas_limit)
            .await
            .map_err(at(Stage::Forwarded))?
        {
            Some(value) => {
                let receipt = self
                    .submitter
                    .submit(
                        account,
                        &self.route.sweep_to.to_string(),
                        Amount::Sweep,
                        gas_limit,
                        true,
                    )
                    .await
                    .map_err(at(Stage::Forwarded))?;
                info!(%address, stage = ?Stage::Swept, quoted = %value, hash = %receipt.hash, "swept");
                Some(receipt)
            }
            None => {
                warn!(%address, "balance below gas reserve, skipping sweep");
                None
            }
        };

        Ok((funding, forward, sweep))
    }
}

fn at<E>(stage: Stage) -> impl FnOnce(E) -> (Stage, PipelineCause)
where
    PipelineCause: From<E>,
{
    move |err| (stage, PipelineCause::from(err))
}
