//! End-to-end transaction building against in-memory chain and platform.

use std::sync::atomic::Ordering;
use std::time::Duration;

use alloy::consensus::{Transaction as _, TxEnvelope};
use alloy::primitives::{keccak256, Address, Bytes, Signature, TxKind, U256};
use serde_json::json;

use wallet_kms::blockchain::abi::AbiParam;
use wallet_kms::blockchain::{CallIntent, DeployIntent, EstimateIntent, TransactionIntent};
use wallet_kms::platform::OperationKind;
use wallet_kms::relay::{GaslessRequest, SIGNATURE_TYPE_EIP712};
use wallet_kms::wallet::Wallet;
use wallet_kms::KmsError;

mod common;
use common::{Harness, MockChain, CHAIN_ID, STORAGE_ABI, STORAGE_BYTECODE};

const RECIPIENT: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

async fn funded_wallet(h: &Harness, name: &str) -> Wallet {
    h.services
        .registry
        .create_wallet(name, "secp256k1")
        .await
        .unwrap()
}

fn uint(value: u64) -> AbiParam {
    AbiParam {
        ty: "uint256".into(),
        value: json!(value),
    }
}

#[tokio::test]
async fn test_transfer_is_signed_by_wallet_key() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "payer").await;
    h.platform.next_nonce.store(7, Ordering::SeqCst);

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        value: U256::from(1_000u64),
        reference_id: Some("ref-1".into()),
        ..Default::default()
    };
    let submission = h.services.builder.submit(&intent).await.unwrap();
    assert_eq!(submission.nonce, 7);
    assert_eq!(submission.chain_id, CHAIN_ID);
    assert!(submission.contract_address.is_none());

    let envelopes = h.chain.envelopes();
    assert_eq!(envelopes.len(), 1);
    let TxEnvelope::Legacy(signed) = &envelopes[0] else {
        panic!("expected a legacy transaction");
    };
    let tx = signed.tx();
    assert_eq!(tx.nonce, 7);
    assert_eq!(tx.chain_id, Some(CHAIN_ID));
    assert_eq!(tx.gas_price, h.chain.gas_price);
    assert_eq!(tx.gas_limit, h.chain.estimate);
    assert_eq!(tx.to, TxKind::Call(RECIPIENT.parse::<Address>().unwrap()));
    assert_eq!(tx.value, U256::from(1_000u64));

    let recovered = signed
        .signature()
        .recover_address_from_prehash(&signed.signature_hash())
        .unwrap();
    assert_eq!(Some(recovered), wallet.address);

    let updates = h.platform.updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].kind, OperationKind::Txn);
    assert_eq!(updates[0].reference_id, "ref-1");
    assert_eq!(updates[0].chain_id, CHAIN_ID.to_string());
    assert_eq!(updates[0].txn_hash, format!("{:#x}", submission.tx_hash));
}

#[tokio::test]
async fn test_explicit_gas_skips_estimation() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "fixed-gas").await;

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        gas_limit: Some(50_000),
        gas_price: Some(3),
        data: Some("0xdeadbeef".into()),
        ..Default::default()
    };
    h.services.builder.submit(&intent).await.unwrap();

    assert!(h.chain.estimates.lock().unwrap().is_empty());
    let envelopes = h.chain.envelopes();
    assert_eq!(envelopes[0].gas_limit(), 50_000);
    assert_eq!(envelopes[0].gas_price(), Some(3));
    assert_eq!(envelopes[0].input(), &Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]));
}

#[tokio::test]
async fn test_contract_transaction_encodes_call() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "caller").await;

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        is_contract_txn: true,
        method: Some("store".into()),
        params: vec![uint(42)],
        contract_abi: Some(STORAGE_ABI.into()),
        ..Default::default()
    };
    h.services.builder.submit(&intent).await.unwrap();

    let input = h.chain.envelopes()[0].input().clone();
    assert_eq!(&input[..4], &[0x60, 0x57, 0x36, 0x1d]);
    assert_eq!(U256::from_be_slice(&input[4..36]), U256::from(42u64));
}

#[tokio::test]
async fn test_missing_recipient_is_rejected_before_nonce_use() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "no-to").await;

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        ..Default::default()
    };
    let err = h.services.builder.submit(&intent).await.unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)), "got {:?}", err);
    assert!(h.chain.raw_txs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_submissions_get_distinct_nonces() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "busy").await;
    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        ..Default::default()
    };

    let builder = &h.services.builder;
    let (a, b) = tokio::join!(builder.submit(&intent), builder.submit(&intent));
    let mut nonces = vec![a.unwrap().nonce, b.unwrap().nonce];
    nonces.sort_unstable();
    assert_eq!(nonces, vec![0, 1]);
}

#[tokio::test]
async fn test_dropped_caller_does_not_lose_acknowledgement() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "impatient").await;
    h.platform.ack_delay_ms.store(200, Ordering::SeqCst);
    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        reference_id: Some("first".into()),
        ..Default::default()
    };

    // Give up on the call as soon as the node has the transaction, the way
    // a request timeout or a client disconnect would.
    let broadcast_seen = async {
        while h.chain.raw_txs.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::select! {
        _ = h.services.builder.submit(&intent) => panic!("submit finished before the caller gave up"),
        _ = broadcast_seen => {}
    }

    h.platform.ack_delay_ms.store(0, Ordering::SeqCst);
    let next = TransactionIntent {
        reference_id: Some("second".into()),
        ..intent
    };
    let second = tokio::time::timeout(Duration::from_secs(2), h.services.builder.submit(&next))
        .await
        .expect("nonce lock was not released")
        .unwrap();
    assert_eq!(second.nonce, 1);

    let references: Vec<String> = h
        .platform
        .updates
        .lock()
        .unwrap()
        .iter()
        .map(|u| u.reference_id.clone())
        .collect();
    assert_eq!(references, vec!["first", "second"]);

    let nonces: Vec<u64> = h.chain.envelopes().iter().map(|tx| tx.nonce()).collect();
    assert_eq!(nonces, vec![0, 1]);
}

#[tokio::test]
async fn test_deploy_uses_dynamic_fee_envelope() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "deployer").await;
    h.platform.next_nonce.store(3, Ordering::SeqCst);

    let intent = DeployIntent {
        wallet_id: wallet.wallet_id.to_string(),
        byte_code: STORAGE_BYTECODE.into(),
        abi: STORAGE_ABI.into(),
        params: vec![uint(9)],
        reference_id: Some("deploy-1".into()),
        ..Default::default()
    };
    let submission = h.services.builder.deploy(&intent).await.unwrap();
    let from = wallet.address.unwrap();
    assert_eq!(submission.contract_address, Some(from.create(3)));

    let envelopes = h.chain.envelopes();
    let TxEnvelope::Eip1559(signed) = &envelopes[0] else {
        panic!("expected an EIP-1559 transaction");
    };
    let tx = signed.tx();
    assert_eq!(tx.to, TxKind::Create);
    assert_eq!(tx.max_priority_fee_per_gas, 1_000_000_000);
    assert_eq!(tx.max_fee_per_gas, h.chain.gas_price);
    assert!(tx.input.ends_with(&U256::from(9u64).to_be_bytes::<32>()));

    let recovered = signed
        .signature()
        .recover_address_from_prehash(&signed.signature_hash())
        .unwrap();
    assert_eq!(recovered, from);

    let updates = h.platform.updates.lock().unwrap().clone();
    assert_eq!(updates[0].kind, OperationKind::Deploy);
    assert_eq!(updates[0].contract_address, Some(from.create(3).to_checksum(None)));
}

#[tokio::test]
async fn test_deploy_falls_back_to_zero_priority_fee() {
    let chain = MockChain::new();
    *chain.priority_fee.lock().unwrap() = None;
    let h = Harness::build(chain, false);
    let wallet = funded_wallet(&h, "legacy-node").await;

    let intent = DeployIntent {
        wallet_id: wallet.wallet_id.to_string(),
        byte_code: STORAGE_BYTECODE.into(),
        abi: STORAGE_ABI.into(),
        params: vec![uint(1)],
        ..Default::default()
    };
    h.services.builder.deploy(&intent).await.unwrap();

    let envelopes = h.chain.envelopes();
    assert_eq!(envelopes[0].max_priority_fee_per_gas(), Some(0));
    assert_eq!(envelopes[0].max_fee_per_gas(), h.chain.gas_price);
}

#[tokio::test]
async fn test_acknowledge_failure_reports_broadcast_hash() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "unacked").await;
    h.platform.fail_update_nonce.store(true, Ordering::SeqCst);

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        ..Default::default()
    };
    let err = h.services.builder.submit(&intent).await.unwrap_err();
    let raw = h.chain.raw_txs.lock().unwrap()[0].clone();
    match err {
        KmsError::AcknowledgeFailed { tx_hash, .. } => assert_eq!(tx_hash, keccak256(&raw)),
        other => panic!("expected AcknowledgeFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_broadcast_does_not_advance_nonce() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "rejected").await;
    h.chain.fail_broadcast.store(true, Ordering::SeqCst);

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        ..Default::default()
    };
    let err = h.services.builder.submit(&intent).await.unwrap_err();
    assert!(matches!(err, KmsError::Chain(_)));
    assert!(h.platform.updates.lock().unwrap().is_empty());
    assert_eq!(h.platform.next_nonce.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_ed25519_wallet_cannot_transact() {
    let h = Harness::new();
    let wallet = h
        .services
        .registry
        .create_wallet("ed-only", "ed25519")
        .await
        .unwrap();

    let intent = TransactionIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: Some(RECIPIENT.into()),
        ..Default::default()
    };
    let err = h.services.builder.submit(&intent).await.unwrap_err();
    assert!(matches!(err, KmsError::UnsupportedForAlgorithm { .. }));
    assert!(h.chain.raw_txs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_call_contract_decodes_output() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "reader").await;
    *h.chain.call_output.lock().unwrap() = Bytes::from(U256::from(42u64).to_be_bytes::<32>().to_vec());

    let intent = CallIntent {
        wallet_id: wallet.wallet_id.to_string(),
        to: RECIPIENT.into(),
        method: "retrieve".into(),
        contract_abi: STORAGE_ABI.into(),
        ..Default::default()
    };
    let value = h.services.builder.call_contract(&intent).await.unwrap();
    assert_eq!(value, json!("42"));
}

#[tokio::test]
async fn test_estimate_and_balance() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "estimator").await;

    let estimate = h
        .services
        .builder
        .estimate_gas(&EstimateIntent {
            wallet_id: wallet.wallet_id.to_string(),
            to: Some(RECIPIENT.into()),
            method: Some("store".into()),
            params: vec![uint(5)],
            contract_abi: Some(STORAGE_ABI.into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(estimate.estimated_gas, 21_000);
    assert_eq!(Some(estimate.address), wallet.address);

    let address = wallet.address.unwrap();
    let balance = h.services.builder.balance(address, Some(CHAIN_ID)).await.unwrap();
    assert_eq!(balance, h.chain.balance);

    let err = h.services.builder.balance(address, Some(1)).await.unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)));
}

#[tokio::test]
async fn test_gasless_submission_signs_relayer_typed_data() {
    let h = Harness::new();
    let wallet = funded_wallet(&h, "gasless").await;

    let request = GaslessRequest {
        wallet_id: wallet.wallet_id.to_string(),
        chain_id: Some(CHAIN_ID),
        dapp_id: "dapp-1".into(),
        to: RECIPIENT.into(),
        method: "store".into(),
        params: vec![uint(11)],
        contract_abi: STORAGE_ABI.into(),
        ..Default::default()
    };
    let submission = h.services.relay.submit_gasless(&request).await.unwrap();
    assert_eq!(submission.tx_hash, format!("0x{}", "ab".repeat(32)));

    let payloads = h.relayer.payloads.lock().unwrap().clone();
    let user = wallet.address.unwrap().to_checksum(None);
    assert_eq!(payloads[0].user_address, user);
    assert_eq!(payloads[0].chain_id, CHAIN_ID.to_string());
    assert_eq!(payloads[0].args, vec![json!(11)]);

    let sent = h.relayer.sent.lock().unwrap().clone();
    assert_eq!(sent[0].signature_type, SIGNATURE_TYPE_EIP712);
    assert_eq!(sent[0].request["from"], json!(user));

    let typed: alloy::dyn_abi::TypedData =
        serde_json::from_value(common::forward_request_typed_data(&user, RECIPIENT)).unwrap();
    assert_eq!(sent[0].domain_separator, format!("{:#x}", typed.domain.separator()));

    let bytes = hex::decode(sent[0].signature.trim_start_matches("0x")).unwrap();
    assert_eq!(bytes.len(), 65);
    assert!(bytes[64] == 27 || bytes[64] == 28);
    let signature = Signature::from_raw(&bytes).unwrap();
    let recovered = signature
        .recover_address_from_prehash(&typed.eip712_signing_hash().unwrap())
        .unwrap();
    assert_eq!(Some(recovered), wallet.address);
}

#[tokio::test]
async fn test_gasless_requires_relay_and_chain_id() {
    let h = Harness::without_relay();
    let wallet = funded_wallet(&h, "no-relay").await;
    let request = GaslessRequest {
        wallet_id: wallet.wallet_id.to_string(),
        chain_id: Some(CHAIN_ID),
        to: RECIPIENT.into(),
        method: "store".into(),
        contract_abi: STORAGE_ABI.into(),
        ..Default::default()
    };
    let err = h.services.relay.submit_gasless(&request).await.unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)));

    let h = Harness::new();
    let wallet = funded_wallet(&h, "no-chain").await;
    let request = GaslessRequest {
        wallet_id: wallet.wallet_id.to_string(),
        chain_id: None,
        ..request
    };
    let err = h.services.relay.submit_gasless(&request).await.unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)));
    assert!(h.relayer.payloads.lock().unwrap().is_empty());
}
