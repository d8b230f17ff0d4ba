use std::fmt;

use alloy::{
    hex,
    network::EthereumWallet,
    primitives::{Address, B256},
    signers::local::PrivateKeySigner,
};

use crate::error::InputError;

/// A key pair owned by exactly one pipeline (or the operator).
#[derive(Clone)]
pub struct Account {
    signer: PrivateKeySigner,
}

impl Account {
    pub fn from_signer(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Parses an operator key in `0x` + 64 hex digit form.
    pub fn from_hex(raw: &str) -> Result<Self, InputError> {
        let digits = raw
            .trim()
            .strip_prefix("0x")
            .ok_or(InputError::MalformedKey)?;
        if digits.len() != 64 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InputError::MalformedKey);
        }
        let bytes: B256 = digits.parse().map_err(|_| InputError::MalformedKey)?;
        let signer = PrivateKeySigner::from_bytes(&bytes).map_err(|_| InputError::InvalidKey)?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    /// Hex-encoded secret, only for handing to a [`crate::keystore::KeyStore`].
    pub fn secret_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.to_bytes()))
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountFactory;

impl AccountFactory {
    pub fn create(&self) -> Account {
        Account::from_signer(PrivateKeySigner::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_address_derives_from_key() {
        let factory = AccountFactory;
        for _ in 0..8 {
            let account = factory.create();
            let reparsed = Account::from_hex(&account.secret_hex()).unwrap();
            assert_eq!(reparsed.address(), account.address());
        }
    }

    #[test]
    fn known_key_maps_to_known_address() {
        // first anvil dev account
        let account = Account::from_hex(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        )
        .unwrap();
        assert_eq!(
            account.address().to_checksum(None),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(Account::from_hex("abc").unwrap_err(), InputError::MalformedKey);
        assert_eq!(
            Account::from_hex(&format!("0x{}", "g".repeat(64))).unwrap_err(),
            InputError::MalformedKey
        );
        assert_eq!(
            Account::from_hex(&format!("0x{}", "1".repeat(63))).unwrap_err(),
            InputError::MalformedKey
        );
        assert_eq!(
            Account::from_hex(&format!("0x{}", "0".repeat(64))).unwrap_err(),
            InputError::InvalidKey
        );
    }

    #[test]
    fn debug_never_prints_the_secret() {
        let account = AccountFactory.create();
        let secret = account.secret_hex();
        let rendered = format!("{account:?}");
        assert!(!rendered.contains(&secret[2..]));
    }
}
