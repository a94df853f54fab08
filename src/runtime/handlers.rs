//! Public method handlers: signing, chain queries, account listing.
//!
//! Handlers assume the dispatch boundary already checked the origin.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::adapters::{AccountStore, ChainGateway, SecureVault};
use crate::approval::SurfaceHandle;
use crate::config::BackendSettings;
use crate::error::{RequestError, Result};
use crate::keys::SigningIdentity;
use crate::transaction::Transaction;
use crate::types::{Ledger, Service};

/// Parameters of `sign-transaction`.
///
/// Caller-supplied fee, round and genesis fields are accepted on the wire
/// but never read: live network parameters always win.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignTransactionParams {
    pub from: String,
    pub to: String,
    #[serde(deserialize_with = "amount_from_wire")]
    pub amount: u64,
    pub passphrase: String,
    pub ledger: Ledger,
}

/// Parameters of `algod` and `indexer`.
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub ledger: Ledger,
    pub path: String,
}

/// Parameters of `accounts`.
#[derive(Debug, Deserialize)]
pub struct AccountsParams {
    pub ledger: Ledger,
}

/// Parameters of `authorization-allow` and `authorization-deny`.
#[derive(Debug, Deserialize)]
pub struct DecisionParams {
    /// Surface the user answered in.
    pub surface: SurfaceHandle,
}

/// Amounts arrive either as JSON numbers or numeric strings.
fn amount_from_wire<'de, D>(deserializer: D) -> core::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| D::Error::custom("amount must be a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| D::Error::custom(format!("invalid amount '{}': {}", s, e))),
        other => Err(D::Error::custom(format!("invalid amount {}", other))),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(params: &Value) -> Result<T> {
    T::deserialize(params).map_err(RequestError::invalid_params)
}

/// Surface an approval decision was made in.
pub fn decision_surface(params: &Value) -> Result<SurfaceHandle> {
    decode::<DecisionParams>(params).map(|p| p.surface)
}

/// Unlock the vault, find the sender, fetch live parameters, sign.
///
/// An unlock failure stops before any network call.
pub async fn sign_transaction(
    vault: &dyn SecureVault,
    gateway: &dyn ChainGateway,
    params: &Value,
) -> Result<Value> {
    let mut params: SignTransactionParams = decode(params)?;
    let passphrase = Zeroizing::new(core::mem::take(&mut params.passphrase));

    // 1. Scoped unlock
    let unlocked = vault.unlock(passphrase.as_bytes()).await?;
    drop(passphrase);

    // 2. Locate the sender's record
    let record = unlocked
        .find(params.ledger, &params.from)
        .ok_or_else(|| RequestError::AccountNotFound {
            address: params.from.clone(),
            ledger: params.ledger,
        })?;

    // 3. Derive the signing key and make sure it controls the sender
    let identity = SigningIdentity::from_mnemonic(&record.mnemonic)?;
    if !identity.controls(&params.from) {
        return Err(RequestError::KeyDerivation {
            reason: "recovery phrase does not control the sender address".into(),
        });
    }
    drop(unlocked);

    // 4. Live network parameters
    let network = gateway.network_params(params.ledger).await?;

    // 5. Assemble, network values override anything the caller sent
    let txn = Transaction::assemble(&params.from, &params.to, params.amount, &network);

    // 6. Sign
    let signed = txn.sign(&identity)?;
    info!(ledger = %params.ledger, tx_id = %signed.tx_id, "transaction signed");

    serde_json::to_value(signed).map_err(|e| RequestError::Internal(e.to_string()))
}

/// Relay a query to the ledger node or indexer for the requested ledger.
pub async fn relay_query(
    settings: &BackendSettings,
    gateway: &dyn ChainGateway,
    service: Service,
    params: &Value,
) -> Result<Value> {
    let params: QueryParams = decode(params)?;
    let conn = settings
        .resolve(params.ledger, service)
        .ok_or_else(|| RequestError::invalid_params(format!("no {} backend for {}", service, params.ledger)))?;

    let url = format!("{}{}", conn.base_url(), params.path);
    debug!(%service, ledger = %params.ledger, "relaying query");

    Ok(gateway.fetch(&url, &conn.api_key).await?)
}

/// Session accounts for the requested ledger, returned verbatim.
pub fn list_accounts(store: &dyn AccountStore, params: &Value) -> Result<Value> {
    let params: AccountsParams = decode(params)?;
    Ok(store.accounts(params.ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_accepts_string_and_number() {
        let base = |amount: Value| {
            json!({
                "from": "A", "to": "B", "amount": amount,
                "passphrase": "pw", "ledger": "TestNet",
                "fee": 99999, "firstRound": 1, "lastRound": 2
            })
        };
        let p: SignTransactionParams = decode(&base(json!(15))).unwrap();
        assert_eq!(p.amount, 15);
        let p: SignTransactionParams = decode(&base(json!("42"))).unwrap();
        assert_eq!(p.amount, 42);
        assert!(decode::<SignTransactionParams>(&base(json!(-1))).is_err());
        assert!(decode::<SignTransactionParams>(&base(json!("ten"))).is_err());
    }

    #[test]
    fn test_decision_surface() {
        assert_eq!(decision_surface(&json!({ "surface": 7 })).unwrap(), SurfaceHandle(7));
        assert_eq!(decision_surface(&json!({})).unwrap_err().code(), "InvalidParams");
        assert!(decision_surface(&json!({ "surface": "seven" })).is_err());
    }

    #[test]
    fn test_query_params_require_path() {
        let err = decode::<QueryParams>(&json!({ "ledger": "TestNet" })).unwrap_err();
        assert_eq!(err.code(), "InvalidParams");
    }
}
