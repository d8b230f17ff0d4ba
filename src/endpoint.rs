use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::{info, warn};

use crate::{
    error::ConnectError,
    rpc::{ChainRpc, HttpRpc},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: Url,
    pub timeout: Duration,
    pub attempts: u32,
}

impl Endpoint {
    pub fn parse(raw: &str, timeout: Duration, attempts: u32) -> Result<Self, ConnectError> {
        let url = Url::parse(raw.trim()).map_err(|err| ConnectError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Self {
            url,
            timeout,
            attempts: attempts.max(1),
        })
    }
}

/// Opens a connection to an endpoint and proves it is alive.
#[async_trait]
pub trait Dialer: Send + Sync {
    type Conn: ChainRpc;

    async fn dial(&self, endpoint: &Endpoint) -> eyre::Result<Self::Conn>;
}

/// Dials over HTTP and checks the node serves the expected chain.
pub struct HttpDialer {
    pub chain_id: u64,
    pub call_timeout: Duration,
}

#[async_trait]
impl Dialer for HttpDialer {
    type Conn = HttpRpc;

    async fn dial(&self, endpoint: &Endpoint) -> eyre::Result<HttpRpc> {
        let rpc = HttpRpc::new(endpoint.url.clone(), self.call_timeout);
        let reported = rpc.chain_id().await?;
        eyre::ensure!(
            reported == self.chain_id,
            "endpoint serves chain {reported}, expected {}",
            self.chain_id
        );
        Ok(rpc)
    }
}

#[derive(Debug)]
pub struct Connected<C> {
    pub endpoint: Endpoint,
    pub rpc: C,
}

pub struct EndpointSelector;

impl EndpointSelector {
    /// Returns the first candidate that answers a probe. Each candidate gets its own
    /// attempt budget; the list is walked once.
    pub async fn connect<D: Dialer>(
        dialer: &D,
        candidates: &[Endpoint],
    ) -> Result<Connected<D::Conn>, ConnectError> {
        for endpoint in candidates {
            for attempt in 1..=endpoint.attempts {
                info!(url = %endpoint.url, attempt, "probing endpoint");
                match tokio::time::timeout(endpoint.timeout, dialer.dial(endpoint)).await {
                    Ok(Ok(rpc)) => {
                        info!(url = %endpoint.url, "connected");
                        return Ok(Connected {
                            endpoint: endpoint.clone(),
                            rpc,
                        });
                    }
                    Ok(Err(err)) => {
                        warn!(
                            url = %endpoint.url,
                            attempt,
                            error = %format!("{err:#}"),
                            "probe failed",
                        );
                    }
                    Err(_) => {
                        warn!(
                            url = %endpoint.url,
                            attempt,
                            timeout = ?endpoint.timeout,
                            "probe timed out",
                        );
                    }
                }
            }
        }
        Err(ConnectError::NoEndpointAvailable {
            tried: candidates.len(),
        })
    }
}
