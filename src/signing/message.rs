//! Raw message signing and off-chain verification.
//!
//! Messages are hashed with Keccak-256 (no personal-sign prefix) before signing.

use alloy::primitives::keccak256;

use crate::error::{KmsError, KmsResult};
use crate::signing::signer::WalletSigner;
use crate::signing::typed_data::normalize_signature;
use crate::signing::types::{Algorithm, PublicKey, WalletSignature};
use crate::wallet::Wallet;

/// Sign `keccak256(message)`. secp256k1 output carries v in {27, 28}.
pub async fn sign_message(signer: &WalletSigner, message: &[u8]) -> KmsResult<String> {
    let hash = keccak256(message);
    let signature = signer.sign_hash(hash).await?;
    match signature {
        WalletSignature::Secp256k1(bytes) => {
            let normalized = normalize_signature(&bytes)?;
            Ok(format!("0x{}", hex::encode(normalized)))
        }
        WalletSignature::Ed25519(_) => Ok(signature.to_hex()),
    }
}

/// Check a signature over `keccak256(message)` against the wallet's identity.
///
/// secp256k1 compares the recovered address with the stored one; ed25519
/// verifies under the stored public key.
pub fn verify_message(wallet: &Wallet, message: &[u8], signature: &str) -> KmsResult<bool> {
    let raw = signature.strip_prefix("0x").unwrap_or(signature);
    let bytes = hex::decode(raw)
        .map_err(|e| KmsError::Validation(format!("Signature is not valid hex: {}", e)))?;
    let signature = WalletSignature::from_raw(wallet.algorithm, &bytes)?;
    let hash = keccak256(message);

    match wallet.algorithm {
        Algorithm::Secp256k1 => {
            let expected = wallet.eth_address("verify_signature")?;
            let recovered = signature
                .to_eth_signature()?
                .recover_address_from_prehash(&hash)
                .ok();
            Ok(recovered == Some(expected))
        }
        Algorithm::Ed25519 => {
            let key = PublicKey::from_hex(Algorithm::Ed25519, &wallet.public_key)?;
            let (PublicKey::Ed25519(verifying), WalletSignature::Ed25519(sig)) = (key, signature)
            else {
                return Ok(false);
            };
            let sig = ed25519_dalek::Signature::from_bytes(&sig);
            Ok(verifying.verify_strict(hash.as_slice(), &sig).is_ok())
        }
    }
}
