//! EIP-712 structured data signing.
//!
//! ```text
//! domain_separator = hashStruct("EIP712Domain", domain)
//! struct_hash      = hashStruct(primaryType, message)
//! challenge        = keccak256(0x19 || 0x01 || domain_separator || struct_hash)
//! ```

use alloy::dyn_abi::TypedData;
use alloy::primitives::{keccak256, B256};

use crate::error::{KmsError, KmsResult};
use crate::signing::signer::WalletSigner;
use crate::signing::types::SigningError;

/// Parse a typed-data JSON document.
pub fn parse_typed_data(json: &str) -> KmsResult<TypedData> {
    serde_json::from_str(json)
        .map_err(|e| KmsError::Validation(format!("Invalid EIP-712 typed data: {}", e)))
}

/// Compute the EIP-712 challenge hash.
pub fn challenge_hash(typed_data: &TypedData) -> KmsResult<B256> {
    let domain_separator = typed_data.domain.separator();
    let struct_hash = typed_data
        .hash_struct()
        .map_err(|e| KmsError::Validation(format!("Cannot hash typed data: {}", e)))?;

    let mut preimage = [0u8; 66];
    preimage[0] = 0x19;
    preimage[1] = 0x01;
    preimage[2..34].copy_from_slice(domain_separator.as_slice());
    preimage[34..].copy_from_slice(struct_hash.as_slice());
    Ok(keccak256(preimage))
}

/// Enforce the 65-byte shape and map the recovery byte onto {27, 28}.
pub fn normalize_signature(raw: &[u8]) -> Result<[u8; 65], SigningError> {
    let mut signature: [u8; 65] =
        raw.try_into()
            .map_err(|_| SigningError::InvalidSignatureLength {
                expected: 65,
                actual: raw.len(),
            })?;

    signature[64] = match signature[64] {
        0 => 27,
        1 => 28,
        v => v,
    };
    if signature[64] != 27 && signature[64] != 28 {
        return Err(SigningError::InvalidRecoveryId(signature[64]));
    }
    Ok(signature)
}

/// Signs EIP-712 documents on behalf of one wallet.
#[derive(Debug, Clone)]
pub struct TypedDataSigner {
    signer: WalletSigner,
}

impl TypedDataSigner {
    pub fn new(signer: WalletSigner) -> Self {
        Self { signer }
    }

    /// Sign a typed-data document and return `0x`-hex `r || s || v` with v in {27, 28}.
    pub async fn sign(&self, typed_data: &TypedData) -> KmsResult<String> {
        self.signer.eth_address("eip712_sign")?;

        let challenge = challenge_hash(typed_data)?;
        let signature = self.signer.sign_hash(challenge).await?;
        let normalized = normalize_signature(signature.as_bytes())?;

        tracing::debug!(
            wallet_id = %self.signer.wallet().wallet_id,
            primary_type = %typed_data.primary_type,
            "Signed EIP-712 payload"
        );
        Ok(format!("0x{}", hex::encode(normalized)))
    }

    /// Sign a JSON typed-data document.
    pub async fn sign_json(&self, json: &str) -> KmsResult<String> {
        let typed_data = parse_typed_data(json)?;
        self.sign(&typed_data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIL: &str = r#"{
        "types": {
            "EIP712Domain": [
                {"name": "name", "type": "string"},
                {"name": "version", "type": "string"},
                {"name": "chainId", "type": "uint256"},
                {"name": "verifyingContract", "type": "address"}
            ],
            "Person": [
                {"name": "name", "type": "string"},
                {"name": "wallet", "type": "address"}
            ],
            "Mail": [
                {"name": "from", "type": "Person"},
                {"name": "to", "type": "Person"},
                {"name": "contents", "type": "string"}
            ]
        },
        "primaryType": "Mail",
        "domain": {
            "name": "Ether Mail",
            "version": "1",
            "chainId": 1,
            "verifyingContract": "0xCcCCccccCCCCcCCCCCCcCcCccCcCCCcCcccccccC"
        },
        "message": {
            "from": {"name": "Cow", "wallet": "0xCD2a3d9F938E13CD947Ec05AbC7FE734Df8DD826"},
            "to": {"name": "Bob", "wallet": "0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB"},
            "contents": "Hello, Bob!"
        }
    }"#;

    #[test]
    fn test_challenge_hash_matches_reference_vector() {
        let typed = parse_typed_data(MAIL).unwrap();
        let hash = challenge_hash(&typed).unwrap();
        assert_eq!(
            hex::encode(hash),
            "be609aee343fb3c4b28e1df9e632fca64fcfaede20f02e86244efddf30957bd2"
        );
        assert_eq!(hash, typed.eip712_signing_hash().unwrap());
    }

    #[test]
    fn test_normalize_recovery_ids() {
        for (raw, expected) in [(0u8, 27u8), (1, 28), (27, 27), (28, 28)] {
            let mut sig = [0u8; 65];
            sig[64] = raw;
            assert_eq!(normalize_signature(&sig).unwrap()[64], expected);
        }
    }

    #[test]
    fn test_normalize_rejects_bad_recovery_id() {
        for raw in [2u8, 26, 29, 35, 255] {
            let mut sig = [0u8; 65];
            sig[64] = raw;
            assert!(matches!(
                normalize_signature(&sig),
                Err(SigningError::InvalidRecoveryId(v)) if v == raw
            ));
        }
    }

    #[test]
    fn test_normalize_rejects_bad_length() {
        for len in [0usize, 64, 66] {
            let sig = vec![0u8; len];
            assert!(matches!(
                normalize_signature(&sig),
                Err(SigningError::InvalidSignatureLength { expected: 65, actual }) if actual == len
            ));
        }
    }

    #[test]
    fn test_invalid_document() {
        assert!(matches!(parse_typed_data("{}"), Err(KmsError::Validation(_))));
    }
}
