//! Wallet creation, approval and platform registration.

use std::sync::atomic::Ordering;

use uuid::Uuid;
use wallet_kms::platform::PendingWalletApproval;
use wallet_kms::signing::{message, Algorithm};
use wallet_kms::KmsError;

mod common;
use common::Harness;

#[tokio::test]
async fn test_create_secp256k1_wallet_registers_with_platform() {
    let h = Harness::new();
    let registry = &h.services.registry;

    let wallet = registry.create_wallet("treasury", "secp256k1").await.unwrap();
    assert_eq!(wallet.algorithm, Algorithm::Secp256k1);
    assert!(wallet.address.is_some());

    let added = h.platform.added.lock().unwrap().clone();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].wallet_id, wallet.wallet_id);
    assert_eq!(added[0].name, "treasury");
    assert_eq!(added[0].address, wallet.address.unwrap().to_checksum(None));
    assert!(added[0].reference_id.is_none());

    let found = registry.authorize(&wallet.wallet_id.to_string()).unwrap();
    assert_eq!(found, wallet);
    assert_eq!(registry.lookup_by_name("treasury").unwrap(), Some(wallet));
}

#[tokio::test]
async fn test_create_ed25519_wallet_has_no_address() {
    let h = Harness::new();
    let wallet = h
        .services
        .registry
        .create_wallet("edge", "ed25519")
        .await
        .unwrap();

    assert_eq!(wallet.algorithm, Algorithm::Ed25519);
    assert!(wallet.address.is_none());
    let added = h.platform.added.lock().unwrap().clone();
    assert_eq!(added[0].address, wallet.public_key);
}

#[tokio::test]
async fn test_duplicate_name_conflicts() {
    let h = Harness::new();
    let registry = &h.services.registry;
    registry.create_wallet("ops", "secp256k1").await.unwrap();

    let err = registry.create_wallet("ops", "ed25519").await.unwrap_err();
    assert!(matches!(err, KmsError::Conflict(_)), "got {:?}", err);
    assert_eq!(h.platform.added_count(), 1);
}

#[tokio::test]
async fn test_invalid_algorithm_and_empty_name() {
    let h = Harness::new();
    let registry = &h.services.registry;

    let err = registry.create_wallet("x", "rsa").await.unwrap_err();
    assert!(matches!(err, KmsError::InvalidAlgorithm(ref a) if a == "rsa"));

    let err = registry.create_wallet("   ", "secp256k1").await.unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)));
    assert_eq!(h.platform.added_count(), 0);
}

#[tokio::test]
async fn test_registration_failure_keeps_wallet_until_repaired() {
    let h = Harness::new();
    let registry = &h.services.registry;
    h.platform.fail_add_wallet.store(true, Ordering::SeqCst);

    let err = registry.create_wallet("late", "secp256k1").await.unwrap_err();
    let wallet_id = match err {
        KmsError::WalletNotSynced { wallet_id, .. } => wallet_id,
        other => panic!("expected WalletNotSynced, got {:?}", other),
    };
    // The wallet is usable even though the platform has not seen it.
    let wallet = registry.lookup(wallet_id).unwrap();
    assert_eq!(wallet.name, "late");

    let report = registry.repair_pending_sync().await.unwrap();
    assert_eq!(report.repaired, 0);
    assert_eq!(report.still_pending, 1);

    h.platform.fail_add_wallet.store(false, Ordering::SeqCst);
    let report = registry.repair_pending_sync().await.unwrap();
    assert_eq!(report.repaired, 1);
    assert_eq!(h.platform.added_count(), 1);

    let report = registry.repair_pending_sync().await.unwrap();
    assert_eq!(report.repaired + report.still_pending, 0);
}

#[tokio::test]
async fn test_approval_is_idempotent() {
    let h = Harness::new();
    let registry = &h.services.registry;
    let approval = PendingWalletApproval {
        unique_id: "approval-7".into(),
        instance_id: None,
        wallet_name: "customer-7".into(),
        algorithm: "secp256k1".into(),
    };

    let first = registry.approve_wallet(&approval).await.unwrap();
    let second = registry.approve_wallet(&approval).await.unwrap();
    assert_eq!(first.wallet_id, second.wallet_id);

    let added = h.platform.added.lock().unwrap().clone();
    assert_eq!(added.len(), 2);
    assert!(added
        .iter()
        .all(|a| a.reference_id.as_deref() == Some("approval-7")));

    let mismatched = PendingWalletApproval {
        algorithm: "ed25519".into(),
        ..approval
    };
    let err = registry.approve_wallet(&mismatched).await.unwrap_err();
    assert!(matches!(err, KmsError::Conflict(_)));
}

#[tokio::test]
async fn test_unknown_wallet_is_unauthorized() {
    let h = Harness::new();
    let registry = &h.services.registry;
    let id = Uuid::new_v4();

    let err = registry.authorize(&id.to_string()).unwrap_err();
    assert!(matches!(err, KmsError::Unauthorized(u) if u == id));

    let err = registry.authorize("not-a-uuid").unwrap_err();
    assert!(matches!(err, KmsError::Validation(_)));

    assert!(matches!(registry.lookup(id), Err(KmsError::NotFound(_))));
}

#[tokio::test]
async fn test_sign_and_verify_message_for_both_algorithms() {
    let h = Harness::new();
    let registry = &h.services.registry;

    for (name, algorithm) in [("msg-secp", "secp256k1"), ("msg-ed", "ed25519")] {
        let wallet = registry.create_wallet(name, algorithm).await.unwrap();
        let signer = registry.signer(wallet.clone());
        let signature = message::sign_message(&signer, b"attest").await.unwrap();

        assert!(message::verify_message(&wallet, b"attest", &signature).unwrap());
        assert!(!message::verify_message(&wallet, b"tampered", &signature).unwrap());
    }
}
