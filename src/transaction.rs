//! Payment transaction assembly and signing.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};

use crate::error::{RequestError, Result};
use crate::keys::SigningIdentity;

/// Domain separation prefix for transaction bytes.
pub const TX_TAG: &[u8] = b"TX";

/// Validity window length, in rounds, applied on top of the current round.
pub const VALIDITY_WINDOW: u64 = 1000;

/// Live network parameters fetched from the ledger node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkParams {
    pub fee: u64,
    pub first_round: u64,
    pub last_round: u64,
    #[serde(rename = "genesisID")]
    pub genesis_id: String,
    pub genesis_hash: String,
}

/// Unsigned payment transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub fee: u64,
    pub amount: u64,
    pub first_round: u64,
    pub last_round: u64,
    #[serde(rename = "genesisID")]
    pub genesis_id: String,
    pub genesis_hash: String,
    pub note: Vec<u8>,
}

impl Transaction {
    /// Combine caller-supplied parties and amount with live network parameters.
    ///
    /// Fee, round window and genesis fields always come from `params`.
    pub fn assemble(from: &str, to: &str, amount: u64, params: &NetworkParams) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            fee: params.fee,
            amount,
            first_round: params.first_round,
            last_round: params.last_round,
            genesis_id: params.genesis_id.clone(),
            genesis_hash: params.genesis_hash.clone(),
            note: Vec::new(),
        }
    }

    /// Bytes covered by the signature: `TX_TAG || json(txn)`.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(self)
            .map_err(|e| RequestError::Internal(format!("Transaction encoding failed: {}", e)))?;
        let mut out = Vec::with_capacity(TX_TAG.len() + body.len());
        out.extend_from_slice(TX_TAG);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Hex SHA-512/256 of the canonical bytes.
    pub fn id(&self) -> Result<String> {
        Ok(hex::encode(Sha512_256::digest(self.canonical_bytes()?)))
    }

    pub fn sign(&self, identity: &SigningIdentity) -> Result<SignedTransaction> {
        let bytes = self.canonical_bytes()?;
        let sig = identity.sign(&bytes);

        let wire = SignedWire {
            sig: hex::encode(sig.to_bytes()),
            txn: self,
        };
        let blob = serde_json::to_vec(&wire)
            .map_err(|e| RequestError::Internal(format!("Signed transaction encoding failed: {}", e)))?;

        Ok(SignedTransaction {
            tx_id: hex::encode(Sha512_256::digest(&bytes)),
            blob: hex::encode(blob),
        })
    }
}

#[derive(Serialize, Deserialize)]
struct SignedWire<T> {
    sig: String,
    txn: T,
}

/// Signed transaction as returned to the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    /// Hex of `{"sig": .., "txn": ..}`.
    pub blob: String,
}

impl SignedTransaction {
    /// Decode the blob into its signature bytes and transaction.
    pub fn decode(&self) -> Result<([u8; 64], Transaction)> {
        let raw = hex::decode(&self.blob).map_err(RequestError::invalid_params)?;
        let wire: SignedWire<Transaction> = serde_json::from_slice(&raw).map_err(RequestError::invalid_params)?;
        let sig_bytes = hex::decode(&wire.sig).map_err(RequestError::invalid_params)?;
        let sig: [u8; 64] = sig_bytes
            .try_into()
            .map_err(|_| RequestError::invalid_params("signature must be 64 bytes"))?;
        Ok((sig, wire.txn))
    }
}
