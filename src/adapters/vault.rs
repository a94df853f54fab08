//! Passphrase-sealed account vault.
//!
//! Enforces:
//! 1. Encryption at rest (AES-256-GCM)
//! 2. Passphrase key stretching (PBKDF2-HMAC-SHA256)
//! 3. Memory hygiene (Zeroize) for the derived key and decrypted records
//!
//! Layout: `rounds (u32 LE) || salt (16) || nonce (12) || ciphertext`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::types::Ledger;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ROUNDS: u32 = 600_000;

const ROUNDS_LEN: usize = 4;
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HEADER_LEN: usize = ROUNDS_LEN + SALT_LEN + NONCE_LEN;

/// Errors reported by the vault. Surfaced to the origin unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("Invalid passphrase")]
    InvalidPassphrase,
    #[error("Vault has not been created")]
    NotInitialized,
    #[error("Vault corrupted: {reason}")]
    Corrupted { reason: String },
    #[error("Vault I/O error: {reason}")]
    Io { reason: String },
}

/// A single stored account.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AccountRecord {
    pub name: String,
    pub address: String,
    pub mnemonic: String,
}

impl core::fmt::Debug for AccountRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccountRecord")
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Account records keyed by ledger, as stored inside the vault.
pub type VaultRecords = HashMap<Ledger, Vec<AccountRecord>>;

/// Decrypted vault contents. Lives only for the scope of one request.
#[derive(Debug, Default)]
pub struct UnlockedVault {
    records: VaultRecords,
}

impl UnlockedVault {
    pub fn new(records: VaultRecords) -> Self {
        Self { records }
    }

    pub fn accounts(&self, ledger: Ledger) -> &[AccountRecord] {
        self.records.get(&ledger).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Locate the record for `address` on `ledger`.
    pub fn find(&self, ledger: Ledger, address: &str) -> Option<&AccountRecord> {
        self.accounts(ledger).iter().find(|r| r.address == address)
    }
}

/// Scoped-unlock primitive over secure storage.
#[async_trait]
pub trait SecureVault: Send + Sync {
    async fn unlock(&self, passphrase: &[u8]) -> Result<UnlockedVault, VaultError>;
}

#[derive(Debug, Clone)]
enum VaultSource {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// Vault backed by an encrypted blob on disk or in memory.
#[derive(Debug, Clone)]
pub struct EncryptedVault {
    source: VaultSource,
}

impl EncryptedVault {
    /// Vault stored at `path`. The file is read on every unlock.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            source: VaultSource::File(path.into()),
        }
    }

    pub fn from_bytes(sealed: Vec<u8>) -> Self {
        Self {
            source: VaultSource::Memory(Arc::new(sealed)),
        }
    }

    /// Encrypt `records` under `passphrase`.
    pub fn seal(passphrase: &[u8], records: &VaultRecords, rounds: u32) -> Result<Vec<u8>, VaultError> {
        let plaintext = Zeroizing::new(serde_json::to_vec(records).map_err(|e| VaultError::Corrupted {
            reason: format!("Record encoding failed: {}", e),
        })?);

        let mut rng = rand::thread_rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce_bytes);

        let key = derive_key(passphrase, &salt, rounds);
        let cipher = Aes256Gcm::new(aes_gcm::aead::generic_array::GenericArray::from_slice(&*key));
        let nonce = aes_gcm::Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, &plaintext[..])
            .map_err(|e| VaultError::Corrupted {
                reason: format!("Encryption failed: {}", e),
            })?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(&rounds.to_le_bytes());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Seal `records` and write them to `path`, creating parent directories.
    pub fn seal_to_file(
        path: impl Into<PathBuf>,
        passphrase: &[u8],
        records: &VaultRecords,
        rounds: u32,
    ) -> Result<Self, VaultError> {
        let path = path.into();
        let sealed = Self::seal(passphrase, records, rounds)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| VaultError::Io { reason: e.to_string() })?;
        }
        fs::write(&path, sealed).map_err(|e| VaultError::Io { reason: e.to_string() })?;

        Ok(Self::open(path))
    }

    fn read_sealed(source: &VaultSource) -> Result<Arc<Vec<u8>>, VaultError> {
        match source {
            VaultSource::Memory(bytes) => Ok(Arc::clone(bytes)),
            VaultSource::File(path) => match fs::read(path) {
                Ok(bytes) => Ok(Arc::new(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(VaultError::NotInitialized),
                Err(e) => Err(VaultError::Io { reason: e.to_string() }),
            },
        }
    }

    fn decrypt(sealed: &[u8], passphrase: &[u8]) -> Result<UnlockedVault, VaultError> {
        if sealed.len() < HEADER_LEN {
            return Err(VaultError::Corrupted {
                reason: "too short".into(),
            });
        }

        let (rounds_bytes, rest) = sealed.split_at(ROUNDS_LEN);
        let (salt, rest) = rest.split_at(SALT_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        let mut rounds = [0u8; ROUNDS_LEN];
        rounds.copy_from_slice(rounds_bytes);
        let rounds = u32::from_le_bytes(rounds);
        if rounds == 0 {
            return Err(VaultError::Corrupted {
                reason: "zero key-stretching rounds".into(),
            });
        }

        let key = derive_key(passphrase, salt, rounds);
        let cipher = Aes256Gcm::new(aes_gcm::aead::generic_array::GenericArray::from_slice(&*key));
        let nonce = aes_gcm::Nonce::from_slice(nonce_bytes);

        // An authentication failure is indistinguishable from a wrong passphrase.
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(nonce, ciphertext)
                .map_err(|_| VaultError::InvalidPassphrase)?,
        );

        let records: VaultRecords = serde_json::from_slice(&plaintext).map_err(|e| VaultError::Corrupted {
            reason: format!("Record decoding failed: {}", e),
        })?;

        Ok(UnlockedVault::new(records))
    }
}

fn derive_key(passphrase: &[u8], salt: &[u8], rounds: u32) -> Zeroizing<[u8; 32]> {
    let mut key = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase, salt, rounds, &mut *key);
    key
}

#[async_trait]
impl SecureVault for EncryptedVault {
    async fn unlock(&self, passphrase: &[u8]) -> Result<UnlockedVault, VaultError> {
        let source = self.source.clone();
        let passphrase = Zeroizing::new(passphrase.to_vec());

        // Key stretching is CPU bound; keep it off the async workers.
        let unlocked = tokio::task::spawn_blocking(move || {
            let sealed = Self::read_sealed(&source)?;
            Self::decrypt(&sealed, &passphrase)
        })
        .await
        .map_err(|e| VaultError::Io {
            reason: format!("Unlock task failed: {}", e),
        })?;

        match &unlocked {
            Ok(vault) => debug!(ledgers = vault.records.len(), "vault unlocked"),
            Err(err) => debug!(%err, "vault unlock failed"),
        }
        unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> VaultRecords {
        let mut records = VaultRecords::new();
        records.insert(
            Ledger::TestNet,
            vec![AccountRecord {
                name: "primary".into(),
                address: "ADDR1".into(),
                mnemonic: "word word word".into(),
            }],
        );
        records
    }

    #[tokio::test]
    async fn test_seal_unlock_roundtrip() {
        let sealed = EncryptedVault::seal(b"hunter2", &records(), 1).unwrap();
        let vault = EncryptedVault::from_bytes(sealed);

        let unlocked = vault.unlock(b"hunter2").await.unwrap();
        assert_eq!(unlocked.accounts(Ledger::TestNet).len(), 1);
        assert!(unlocked.find(Ledger::TestNet, "ADDR1").is_some());
        assert!(unlocked.find(Ledger::MainNet, "ADDR1").is_none());
    }

    #[tokio::test]
    async fn test_wrong_passphrase() {
        let sealed = EncryptedVault::seal(b"hunter2", &records(), 1).unwrap();
        let vault = EncryptedVault::from_bytes(sealed);
        assert_eq!(vault.unlock(b"hunter3").await.unwrap_err(), VaultError::InvalidPassphrase);
    }

    #[tokio::test]
    async fn test_truncated_vault() {
        let vault = EncryptedVault::from_bytes(vec![1, 2, 3]);
        assert!(matches!(
            vault.unlock(b"x").await.unwrap_err(),
            VaultError::Corrupted { .. }
        ));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = EncryptedVault::open(dir.path().join("absent.vault"));
        assert_eq!(vault.unlock(b"x").await.unwrap_err(), VaultError::NotInitialized);
    }

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wallet.vault");
        let vault = EncryptedVault::seal_to_file(&path, b"pw", &records(), 2).unwrap();
        assert!(path.exists());
        assert!(vault.unlock(b"pw").await.is_ok());
    }

    #[test]
    fn test_record_debug_hides_mnemonic() {
        let rendered = format!("{:?}", records()[&Ledger::TestNet][0]);
        assert!(!rendered.contains("word word"));
    }
}
