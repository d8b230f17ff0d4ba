use std::{fmt, path::Path, time::Duration};

use async_trait::async_trait;
use eyre::WrapErr;
use reqwest::{Client, Url};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::Account;

/// A completed account as handed to a notifier.
#[derive(Clone, Serialize)]
pub struct Delivery {
    pub address: String,
    pub private_key: String,
}

impl From<&Account> for Delivery {
    fn from(account: &Account) -> Self {
        Self {
            address: account.address().to_string(),
            private_key: account.secret_hex(),
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Out-of-band delivery of completed accounts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_batch(&self, batch: &[Delivery]) -> eyre::Result<()>;

    /// Sends the whole persisted key document.
    async fn send_document(&self, name: &str, contents: &str) -> eyre::Result<()>;
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Payload<'a> {
    Batch { accounts: &'a [Delivery] },
    KeyFile { name: &'a str, contents: &'a str },
}

/// Posts JSON payloads to an operator-owned endpoint.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> eyre::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .wrap_err("building notification client")?;
        Ok(Self { client, url })
    }

    async fn post(&self, payload: &Payload<'_>) -> eyre::Result<()> {
        self.client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .wrap_err("posting notification")?
            .error_for_status()
            .wrap_err("notification rejected")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_batch(&self, batch: &[Delivery]) -> eyre::Result<()> {
        self.post(&Payload::Batch { accounts: batch }).await
    }

    async fn send_document(&self, name: &str, contents: &str) -> eyre::Result<()> {
        self.post(&Payload::KeyFile { name, contents }).await
    }
}

/// Collects completed accounts and hands them to the notifier every `batch_size`
/// successes. Without a notifier every call is a no-op. Delivery failures are logged
/// and never fail the pipeline; the key file keeps every account regardless.
pub struct ResultSink {
    notifier: Option<Box<dyn Notifier>>,
    batch_size: usize,
    pending: Mutex<Vec<Delivery>>,
}

impl ResultSink {
    pub fn new(notifier: Box<dyn Notifier>, batch_size: usize) -> Self {
        Self {
            notifier: Some(notifier),
            batch_size: batch_size.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            notifier: None,
            batch_size: 1,
            pending: Mutex::new(Vec::new()),
        }
    }

    pub async fn record(&self, account: &Account) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let batch = {
            let mut pending = self.pending.lock().await;
            pending.push(Delivery::from(account));
            if pending.len() < self.batch_size {
                return;
            }
            std::mem::take(&mut *pending)
        };
        deliver(notifier.as_ref(), &batch).await;
    }

    /// Flushes the partial batch, then sends `key_file` when given.
    pub async fn finish(&self, key_file: Option<&Path>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if !batch.is_empty() {
            deliver(notifier.as_ref(), &batch).await;
        }

        let Some(path) = key_file else {
            return;
        };
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no key file to send");
                return;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "key file unreadable, not sent");
                return;
            }
        };
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => path.display().to_string(),
        };
        match notifier.send_document(&name, &contents).await {
            Ok(()) => info!(path = %path.display(), "key file sent"),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %format!("{err:#}"),
                    "sending key file failed",
                );
            }
        }
    }
}

async fn deliver(notifier: &dyn Notifier, batch: &[Delivery]) {
    match notifier.send_batch(batch).await {
        Ok(()) => info!(accounts = batch.len(), "notification sent"),
        Err(err) => {
            warn!(
                accounts = batch.len(),
                error = %format!("{err:#}"),
                "notification failed",
            );
        }
    }
}
