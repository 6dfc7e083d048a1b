//! Transaction signing capability and the local key implementation

use super::types::{SignedTransaction, TransactionIntent};
use crate::config::WalletConfig;
use crate::error::{SenderError, SenderResult, SignerError};

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::path::Path;
use tracing::info;

/// Turns unsigned intents into signed transactions for one account
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Sign `tx` for the network identified by `chain_id`
    async fn sign(
        &self,
        tx: &TransactionIntent,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError>;

    /// Address whose key this signer holds
    fn account(&self) -> Address;
}

/// Signer backed by an in-memory secp256k1 key
#[derive(Debug, Clone)]
pub struct LocalSigner {
    wallet: LocalWallet,
}

impl LocalSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Parse a hex-encoded private key
    pub fn from_private_key(key: &str) -> SenderResult<Self> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);
        key.parse::<LocalWallet>()
            .map(Self::new)
            .map_err(|e| SenderError::Wallet(format!("Invalid private key: {}", e)))
    }

    /// Decrypt a JSON keystore file
    pub fn from_keystore(path: impl AsRef<Path>, password: &str) -> SenderResult<Self> {
        let path = path.as_ref();
        LocalWallet::decrypt_keystore(path, password)
            .map(Self::new)
            .map_err(|e| {
                SenderError::Wallet(format!("Failed to decrypt keystore {:?}: {}", path, e))
            })
    }

    /// Load from the configured environment variable or keystore
    pub fn load(config: &WalletConfig) -> SenderResult<Self> {
        // Try environment variable first (dev mode)
        if let Some(var) = &config.private_key_env {
            if let Ok(key) = std::env::var(var) {
                let signer = Self::from_private_key(&key)?;
                info!("Loaded signer {:?} from ${}", signer.account(), var);
                return Ok(signer);
            }
        }

        if let Some(path) = &config.keystore_path {
            let password = match &config.password_env {
                Some(var) => std::env::var(var).map_err(|_| {
                    SenderError::Wallet(format!("Keystore password variable ${} is not set", var))
                })?,
                None => String::new(),
            };
            let signer = Self::from_keystore(path, &password)?;
            info!("Loaded signer {:?} from keystore {}", signer.account(), path);
            return Ok(signer);
        }

        Err(SenderError::Wallet(
            "No wallet configured. Set a private key variable or a keystore path".to_string(),
        ))
    }
}

#[async_trait]
impl TxSigner for LocalSigner {
    async fn sign(
        &self,
        tx: &TransactionIntent,
        chain_id: u64,
    ) -> Result<SignedTransaction, SignerError> {
        if tx.from != self.wallet.address() {
            return Err(SignerError(format!(
                "transaction sender {:?} does not match signer {:?}",
                tx.from,
                self.wallet.address()
            )));
        }

        let typed = tx.to_typed(chain_id);
        let signature = self
            .wallet
            .clone()
            .with_chain_id(chain_id)
            .sign_transaction(&typed)
            .await
            .map_err(|e| SignerError(e.to_string()))?;

        Ok(SignedTransaction {
            intent: tx.clone(),
            raw: typed.rlp_signed(&signature),
            hash: typed.hash(&signature),
            signature,
        })
    }

    fn account(&self) -> Address {
        self.wallet.address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::rand::thread_rng;
    use ethers::types::{Bytes, U256};
    use ethers::utils::keccak256;

    // First default anvil/hardhat development key
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn intent(from: Address) -> TransactionIntent {
        TransactionIntent {
            from,
            to: Some(Address::repeat_byte(0x22)),
            value: U256::from(1u64),
            gas: U256::from(21_000u64),
            gas_price: U256::from(1_000_000_000u64),
            nonce: 3,
            data: Bytes::default(),
        }
    }

    #[test]
    fn test_private_key_resolves_known_address() {
        let signer = LocalSigner::from_private_key(DEV_KEY).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(signer.account(), expected);
    }

    #[test]
    fn test_invalid_private_key_is_wallet_error() {
        assert!(matches!(
            LocalSigner::from_private_key("not-a-key"),
            Err(SenderError::Wallet(_))
        ));
    }

    #[tokio::test]
    async fn test_sign_binds_chain_id_and_hash() {
        let signer = LocalSigner::from_private_key(DEV_KEY).unwrap();
        let tx = intent(signer.account());

        let signed = signer.sign(&tx, 5).await.unwrap();

        assert_eq!(signed.intent, tx);
        assert_eq!(signed.hash.as_bytes(), &keccak256(&signed.raw)[..]);
        // EIP-155: v = chain_id * 2 + 35 or 36
        assert!(signed.signature.v == 45 || signed.signature.v == 46);
        let recovered = signed
            .signature
            .recover(tx.to_typed(5).sighash())
            .unwrap();
        assert_eq!(recovered, signer.account());
    }

    #[tokio::test]
    async fn test_sign_rejects_foreign_sender() {
        let signer = LocalSigner::from_private_key(DEV_KEY).unwrap();
        let tx = intent(Address::repeat_byte(0x99));
        assert!(signer.sign(&tx, 1).await.is_err());
    }

    #[test]
    fn test_keystore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let (wallet, file_name) =
            LocalWallet::new_keystore(dir.path(), &mut thread_rng(), "hunter2", None).unwrap();

        let signer = LocalSigner::from_keystore(dir.path().join(file_name), "hunter2").unwrap();
        assert_eq!(signer.account(), wallet.address());

        let wrong = LocalSigner::from_keystore(dir.path().join("missing"), "hunter2");
        assert!(matches!(wrong, Err(SenderError::Wallet(_))));
    }

    #[test]
    fn test_load_prefers_private_key_env() {
        std::env::set_var("TX_RESUBMITTER_TEST_KEY", DEV_KEY);
        let config = WalletConfig {
            private_key_env: Some("TX_RESUBMITTER_TEST_KEY".to_string()),
            keystore_path: Some("/nonexistent/keystore.json".to_string()),
            password_env: None,
        };
        let signer = LocalSigner::load(&config).unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(signer.account(), expected);
    }

    #[test]
    fn test_load_without_source_fails() {
        let config = WalletConfig {
            private_key_env: None,
            keystore_path: None,
            password_env: None,
        };
        assert!(matches!(LocalSigner::load(&config), Err(SenderError::Wallet(_))));
    }
}
