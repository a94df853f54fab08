//! End-to-end authorization and dispatch flows against in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dapp_gatekeeper::adapters::{GatewayError, VaultError};
use dapp_gatekeeper::approval::{Decision, SurfaceHandle};
use dapp_gatekeeper::config::{
    BackendConnection, API_KEY_HEADER, AUTHORIZE_HEIGHT, AUTHORIZE_VIEW, AUTHORIZE_WIDTH,
};
use dapp_gatekeeper::testing::{sealed_vault, FailingVault, GatewayCall, Harness, RecordingSurface};
use dapp_gatekeeper::transaction::{NetworkParams, SignedTransaction};
use dapp_gatekeeper::transport::Outbound;
use dapp_gatekeeper::types::Service;
use dapp_gatekeeper::{Context, EngineConfig, Envelope, Ledger};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

const DAPP: &str = "https://dapp.example";
const OTHER: &str = "https://other.example";
const PASSPHRASE: &str = "correct horse battery staple";
const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
const PHRASE_2: &str = "legal winner thank year wave sausage worth useful legal winner thank yellow";

fn harness() -> (Harness, Vec<String>) {
    let (vault, addresses) = sealed_vault(PASSPHRASE, Ledger::TestNet, &[PHRASE, PHRASE_2]).unwrap();
    (Harness::new(Arc::new(vault)).unwrap(), addresses)
}

fn testnet_params() -> NetworkParams {
    NetworkParams {
        fee: 1000,
        first_round: 5_000,
        last_round: 6_000,
        genesis_id: "testnet-v1.0".into(),
        genesis_hash: "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=".into(),
    }
}

fn handshake(harness: &Harness, origin: &str) -> JoinHandle<Envelope> {
    let gatekeeper = harness.gatekeeper.clone();
    let envelope = Envelope::new(origin, "authorization", json!({}));
    tokio::spawn(async move { gatekeeper.dispatch(envelope).await })
}

async fn authorize(harness: &mut Harness, origin: &str) {
    let pending = handshake(harness, origin);
    harness.next_broadcast().await.unwrap();
    let surface = harness.gatekeeper.pending_surface().unwrap();
    harness.controller().decide(Decision::Allow, surface).await.unwrap();
    assert!(pending.await.unwrap().error.is_none());
}

fn sign_params(from: &str, to: &str) -> Value {
    json!({
        "from": from,
        "to": to,
        "amount": 15,
        "passphrase": PASSPHRASE,
        "ledger": "TestNet",
        "fee": 999_999,
        "firstRound": 1,
        "lastRound": 2,
        "genesisID": "forged"
    })
}

#[tokio::test]
async fn test_first_contact_allow() {
    let (mut harness, _) = harness();
    let pending = handshake(&harness, DAPP);

    // The approval view learns which origin is asking
    let broadcast = harness.next_broadcast().await.unwrap();
    assert_eq!(broadcast.origin, DAPP);
    assert_eq!(harness.gatekeeper.pending_origin().as_deref(), Some(DAPP));

    let opened = harness.surface.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].0, AUTHORIZE_VIEW);
    assert_eq!(opened[0].1.width, AUTHORIZE_WIDTH);
    assert_eq!(opened[0].1.height, AUTHORIZE_HEIGHT);

    harness.controller().decide(Decision::Allow, opened[0].2).await.unwrap();

    let settled = pending.await.unwrap();
    assert_eq!(settled.response, Some(json!({})));
    assert!(settled.error.is_none());
    assert!(harness.gatekeeper.is_authorized(DAPP));
    assert!(harness.gatekeeper.pending_surface().is_none());
    assert_eq!(harness.surface.closed(), vec![opened[0].2]);
}

#[tokio::test]
async fn test_first_contact_deny() {
    let (mut harness, _) = harness();
    let pending = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();
    let surface = harness.gatekeeper.pending_surface().unwrap();

    harness.controller().decide(Decision::Deny, surface).await.unwrap();

    let settled = pending.await.unwrap();
    assert_eq!(settled.error_code(), Some("NotAuthorized"));
    assert!(settled.response.is_none());
    assert!(!harness.gatekeeper.is_authorized(DAPP));
    assert!(harness.gatekeeper.authorized_origins().is_empty());
    assert_eq!(harness.surface.closed().len(), 1);
}

#[tokio::test]
async fn test_repeat_handshake_is_immediate() {
    let (mut harness, _) = harness();
    authorize(&mut harness, DAPP).await;

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "authorization", json!({})))
        .await;
    assert_eq!(settled.response, Some(json!({})));
    assert_eq!(harness.surface.opened().len(), 1);
}

#[tokio::test]
async fn test_unauthorized_origin_rejected() {
    let (harness, addresses) = harness();
    harness.gateway.set_params(Ledger::TestNet, testnet_params());

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(OTHER, "sign-transaction", sign_params(&addresses[0], &addresses[1])))
        .await;
    assert_eq!(settled.error_code(), Some("NotAuthorized"));

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(OTHER, "accounts", json!({ "ledger": "TestNet" })))
        .await;
    assert_eq!(settled.error_code(), Some("NotAuthorized"));

    // Nothing reached the network
    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_method_changes_nothing() {
    let (harness, _) = harness();
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "eth_sendTransaction", json!({})))
        .await;

    assert_eq!(settled.error_code(), Some("MethodNotFound"));
    assert!(harness.gatekeeper.authorized_origins().is_empty());
    assert!(harness.gatekeeper.pending_surface().is_none());
    assert!(harness.surface.opened().is_empty());
}

#[tokio::test]
async fn test_page_cannot_approve_itself() {
    let (mut harness, _) = harness();
    let pending = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();

    for method in ["authorization-allow", "AuthorizationAllow", "create-wallet"] {
        let settled = harness.gatekeeper.dispatch(Envelope::new(DAPP, method, json!({}))).await;
        assert_eq!(settled.error_code(), Some("MethodNotFound"), "{}", method);
    }
    assert!(!harness.gatekeeper.is_authorized(DAPP));
    assert_eq!(harness.gatekeeper.pending_origin().as_deref(), Some(DAPP));

    let surface = harness.gatekeeper.pending_surface().unwrap();
    harness.controller().decide(Decision::Deny, surface).await.unwrap();
    assert_eq!(pending.await.unwrap().error_code(), Some("NotAuthorized"));
}

#[tokio::test]
async fn test_second_handshake_supersedes_first() {
    let (mut harness, _) = harness();
    let first = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();
    let first_surface = harness.gatekeeper.pending_surface().unwrap();

    let second = handshake(&harness, OTHER);
    assert_eq!(harness.next_broadcast().await.unwrap().origin, OTHER);

    let settled = first.await.unwrap();
    assert_eq!(settled.error_code(), Some("Superseded"));
    assert!(harness.surface.closed().contains(&first_surface));

    let second_surface = harness.gatekeeper.pending_surface().unwrap();
    assert_ne!(second_surface, first_surface);
    harness.controller().decide(Decision::Allow, second_surface).await.unwrap();
    assert!(second.await.unwrap().error.is_none());
    assert!(harness.gatekeeper.is_authorized(OTHER));
    assert!(!harness.gatekeeper.is_authorized(DAPP));
}

#[tokio::test]
async fn test_decision_in_replaced_surface_grants_nothing() {
    let (mut harness, _) = harness();
    let first = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();
    let first_surface = harness.gatekeeper.pending_surface().unwrap();

    let second = handshake(&harness, OTHER);
    harness.next_broadcast().await.unwrap();
    assert_eq!(first.await.unwrap().error_code(), Some("Superseded"));

    // The user clicks Allow in the prompt that was showing the first origin
    let err = harness
        .controller()
        .decide(Decision::Allow, first_surface)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NoPendingAuthorization");
    assert!(harness.gatekeeper.authorized_origins().is_empty());
    assert_eq!(harness.gatekeeper.pending_origin().as_deref(), Some(OTHER));

    // A deny from the stale prompt is rejected the same way
    let err = harness
        .controller()
        .decide(Decision::Deny, first_surface)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NoPendingAuthorization");
    assert_eq!(harness.gatekeeper.pending_origin().as_deref(), Some(OTHER));

    let second_surface = harness.gatekeeper.pending_surface().unwrap();
    harness.controller().decide(Decision::Deny, second_surface).await.unwrap();
    assert_eq!(second.await.unwrap().error_code(), Some("NotAuthorized"));
    assert!(harness.gatekeeper.authorized_origins().is_empty());
}

#[tokio::test]
async fn test_decision_without_pending() {
    let (harness, _) = harness();
    let err = harness
        .controller()
        .decide(Decision::Allow, SurfaceHandle(1))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NoPendingAuthorization");
    assert!(harness.gatekeeper.authorized_origins().is_empty());
}

#[tokio::test]
async fn test_dismissed_surface_denies() {
    let (mut harness, _) = harness();
    let pending = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();
    let surface = harness.gatekeeper.pending_surface().unwrap();

    // A stale handle is ignored
    harness.controller().dismissed(SurfaceHandle(surface.0 + 100)).await.unwrap();
    assert_eq!(harness.gatekeeper.pending_surface(), Some(surface));

    harness.controller().dismissed(surface).await.unwrap();
    assert_eq!(pending.await.unwrap().error_code(), Some("NotAuthorized"));
    assert!(harness.gatekeeper.pending_surface().is_none());
    assert!(!harness.gatekeeper.is_authorized(DAPP));
}

#[tokio::test]
async fn test_surface_open_failure() {
    let (vault, _) = sealed_vault(PASSPHRASE, Ledger::TestNet, &[PHRASE]).unwrap();
    let harness = Harness::with_surface(Arc::new(vault), RecordingSurface::failing()).unwrap();

    let settled = tokio::time::timeout(
        Duration::from_secs(5),
        harness.gatekeeper.dispatch(Envelope::new(DAPP, "authorization", json!({}))),
    )
    .await
    .unwrap();
    assert_eq!(settled.error_code(), Some("ApprovalUnavailable"));
    assert!(harness.gatekeeper.pending_surface().is_none());
}

#[tokio::test]
async fn test_sign_uses_live_network_params() {
    let (mut harness, addresses) = harness();
    harness.gateway.set_params(Ledger::TestNet, testnet_params());
    authorize(&mut harness, DAPP).await;

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "sign-transaction", sign_params(&addresses[0], &addresses[1])))
        .await;
    assert!(settled.error.is_none(), "{:?}", settled.error);

    let signed: SignedTransaction = serde_json::from_value(settled.response.unwrap()).unwrap();
    let (sig, txn) = signed.decode().unwrap();
    assert_eq!(txn.fee, 1000);
    assert_eq!(txn.first_round, 5_000);
    assert_eq!(txn.last_round, 6_000);
    assert_eq!(txn.genesis_id, "testnet-v1.0");
    assert_eq!(txn.amount, 15);
    assert_eq!(txn.from, addresses[0]);
    assert_eq!(signed.tx_id, txn.id().unwrap());

    let sender: dapp_gatekeeper::keys::Address = addresses[0].parse().unwrap();
    let vk = VerifyingKey::from_bytes(sender.public_key()).unwrap();
    vk.verify(&txn.canonical_bytes().unwrap(), &Signature::from_bytes(&sig))
        .unwrap();

    assert_eq!(harness.gateway.calls(), vec![GatewayCall::NetworkParams(Ledger::TestNet)]);
}

#[tokio::test]
async fn test_sign_with_wrong_passphrase() {
    let (mut harness, addresses) = harness();
    harness.gateway.set_params(Ledger::TestNet, testnet_params());
    authorize(&mut harness, DAPP).await;

    let mut params = sign_params(&addresses[0], &addresses[1]);
    params["passphrase"] = json!("wrong");
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "sign-transaction", params))
        .await;

    assert_eq!(settled.error_code(), Some("VaultError"));
    assert_eq!(settled.error.unwrap().message, VaultError::InvalidPassphrase.to_string());
    assert!(harness.gateway.calls().is_empty());
}

#[tokio::test]
async fn test_sign_unknown_sender() {
    let (mut harness, addresses) = harness();
    harness.gateway.set_params(Ledger::TestNet, testnet_params());
    authorize(&mut harness, DAPP).await;

    // Right address, wrong ledger
    let mut params = sign_params(&addresses[0], &addresses[1]);
    params["ledger"] = json!("MainNet");
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "sign-transaction", params))
        .await;
    assert_eq!(settled.error_code(), Some("AccountNotFound"));
}

#[tokio::test]
async fn test_sign_vault_unavailable() {
    let mut harness = Harness::new(Arc::new(FailingVault(VaultError::NotInitialized))).unwrap();
    harness.gateway.set_params(Ledger::TestNet, testnet_params());
    authorize(&mut harness, DAPP).await;

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "sign-transaction", sign_params("A", "B")))
        .await;
    assert_eq!(settled.error_code(), Some("VaultError"));
}

#[tokio::test]
async fn test_sign_network_failure() {
    let (mut harness, addresses) = harness();
    authorize(&mut harness, DAPP).await;

    // No parameters configured for TestNet
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "sign-transaction", sign_params(&addresses[0], &addresses[1])))
        .await;
    assert_eq!(settled.error_code(), Some("NetworkError"));
}

#[tokio::test]
async fn test_query_relay() {
    let (mut harness, _) = harness();
    authorize(&mut harness, DAPP).await;

    let url = "https://testnet-algorand.api.purestake.io/ps2/v2/status";
    harness.gateway.respond(url, Ok(json!({ "last-round": 42 })));

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "algod", json!({ "ledger": "TestNet", "path": "/v2/status" })))
        .await;
    assert_eq!(settled.response, Some(json!({ "last-round": 42 })));

    let indexer_url = "https://mainnet-algorand.api.purestake.io/idx2/v2/accounts";
    harness.gateway.respond(
        indexer_url,
        Err(GatewayError::Transport {
            url: indexer_url.into(),
            reason: "timed out".into(),
        }),
    );
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "indexer", json!({ "ledger": "MainNet", "path": "/v2/accounts" })))
        .await;
    assert_eq!(settled.error_code(), Some("NetworkError"));

    let fetched: Vec<String> = harness
        .gateway
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            GatewayCall::Fetch { url, .. } => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(fetched, vec![url.to_string(), indexer_url.to_string()]);
}

#[tokio::test]
async fn test_query_relay_with_port_and_api_key() {
    let mut config = EngineConfig::default();
    config.backends.set(
        Ledger::TestNet,
        Service::Algod,
        BackendConnection {
            url: "http://127.0.0.1".into(),
            port: "4001".into(),
            api_key: HashMap::from([(API_KEY_HEADER.to_string(), "node-secret".to_string())]),
        },
    );
    config.approval.view = "popup.html#/approve".into();
    config.approval.width = 300;
    config.approval.height = 500;

    let (vault, _) = sealed_vault(PASSPHRASE, Ledger::TestNet, &[PHRASE]).unwrap();
    let mut harness = Harness::with_config(Arc::new(vault), config, RecordingSurface::new()).unwrap();
    authorize(&mut harness, DAPP).await;

    let opened = harness.surface.opened();
    assert_eq!(opened[0].0, "popup.html#/approve");
    assert_eq!((opened[0].1.width, opened[0].1.height), (300, 500));

    let url = "http://127.0.0.1:4001/v2/status";
    harness.gateway.respond(url, Ok(json!({ "last-round": 7 })));
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "algod", json!({ "ledger": "TestNet", "path": "/v2/status" })))
        .await;
    assert_eq!(settled.response, Some(json!({ "last-round": 7 })));

    assert_eq!(
        harness.gateway.calls(),
        vec![GatewayCall::Fetch {
            url: url.to_string(),
            headers: HashMap::from([(API_KEY_HEADER.to_string(), "node-secret".to_string())]),
        }]
    );
}

#[tokio::test]
async fn test_accounts_listing() {
    let (mut harness, _) = harness();
    authorize(&mut harness, DAPP).await;

    let listed = json!([{ "name": "primary", "address": "ADDR" }]);
    harness.accounts.set_accounts(Ledger::TestNet, listed.clone());

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "accounts", json!({ "ledger": "TestNet" })))
        .await;
    assert_eq!(settled.response, Some(listed.clone()));

    // Ledger names are case-insensitive on the wire
    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "accounts", json!({ "ledger": "testnet" })))
        .await;
    assert_eq!(settled.response, Some(listed));

    let settled = harness
        .gatekeeper
        .dispatch(Envelope::new(DAPP, "accounts", json!({ "ledger": "Betanet" })))
        .await;
    assert_eq!(settled.error_code(), Some("InvalidParams"));
}

#[tokio::test]
async fn test_extension_partition() {
    let (harness, _) = harness();

    let settled = harness
        .gatekeeper
        .dispatch_extension(Envelope::new("extension", "get-session", json!({ "x": 1 })))
        .await;
    assert_eq!(
        settled.response,
        Some(json!({ "method": "get-session", "params": { "x": 1 } }))
    );

    // Public methods are not reachable from the extension partition
    let settled = harness
        .gatekeeper
        .dispatch_extension(Envelope::new("extension", "authorization", json!({})))
        .await;
    assert_eq!(settled.error_code(), Some("MethodNotFound"));
    assert_eq!(harness.internal.calls().len(), 1);
}

#[tokio::test]
async fn test_handle_routes_by_context() {
    let (mut harness, _) = harness();
    let gatekeeper = harness.gatekeeper.clone();
    let page = tokio::spawn(async move {
        gatekeeper
            .handle(Context::Page, Envelope::new(DAPP, "authorization", json!({})))
            .await
    });
    assert_eq!(
        harness.next_outbound().await,
        Some(Outbound::Broadcast(Envelope::new(DAPP, "authorization", json!({}))))
    );
    let surface = harness.gatekeeper.pending_surface().unwrap();

    harness
        .gatekeeper
        .handle(
            Context::ApprovalSurface,
            Envelope::new("extension", "authorization-allow", json!({ "surface": surface.0 })),
        )
        .await;
    page.await.unwrap();

    // Both replies go back through the transport, in completion order
    let mut responses = Vec::new();
    while responses.len() < 2 {
        match harness.next_outbound().await.unwrap() {
            Outbound::Response(envelope) => responses.push(envelope),
            Outbound::Broadcast(_) => panic!("unexpected broadcast"),
        }
    }
    assert!(responses.iter().all(|e| e.error.is_none()));
    assert!(responses.iter().any(|e| e.origin == DAPP));
    assert!(harness.gatekeeper.is_authorized(DAPP));
}

#[tokio::test]
async fn test_approval_envelope_requires_surface() {
    let (mut harness, _) = harness();
    let pending = handshake(&harness, DAPP);
    harness.next_broadcast().await.unwrap();

    harness
        .gatekeeper
        .handle(Context::ApprovalSurface, Envelope::new("extension", "authorization-allow", json!({})))
        .await;
    match harness.next_outbound().await.unwrap() {
        Outbound::Response(envelope) => assert_eq!(envelope.error_code(), Some("InvalidParams")),
        Outbound::Broadcast(_) => panic!("unexpected broadcast"),
    }
    assert!(!harness.gatekeeper.is_authorized(DAPP));
    assert_eq!(harness.gatekeeper.pending_origin().as_deref(), Some(DAPP));

    let surface = harness.gatekeeper.pending_surface().unwrap();
    harness.controller().dismissed(surface).await.unwrap();
    assert_eq!(pending.await.unwrap().error_code(), Some("NotAuthorized"));
}
