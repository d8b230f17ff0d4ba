use std::path::PathBuf;

use async_trait::async_trait;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

use crate::account::Account;

/// Durable custody for generated keys. Called before an account receives funds.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn persist(&self, account: &Account) -> std::io::Result<()>;
}

/// Appends one `Address: …, Private Key: …` line per account.
pub struct FileKeyStore {
    path: PathBuf,
    write: Mutex<()>,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn persist(&self, account: &Account) -> std::io::Result<()> {
        let _serial = self.write.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!(
            "Address: {}, Private Key: {}\n",
            account.address().to_checksum(None),
            account.secret_hex()
        );
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await
    }
}
