//! Local signature verification for `WalletVerify`.
//!
//! Secp256k1 and delegated signatures are 65 bytes `r || s || v` over the
//! keccak-256 digest of the signed data. The recovered key is turned into an
//! Ethereum-style address and compared with the signer, which must be given
//! in `0x`-hex form. BLS signatures are not checked locally.

use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, Secp256k1, VerifyOnly,
};
use sha3::{Digest, Keccak256};
use shared_types::{Address, SigType, Signature};

use crate::ports::outbound::{SignatureError, SignatureVerifier};

const SIGNATURE_LEN: usize = 65;

/// secp256k1 recovery based verifier
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the key that produced `sig` over `data`.
    pub fn recover_address(&self, sig: &[u8], data: &[u8]) -> Result<[u8; 20], SignatureError> {
        if sig.len() != SIGNATURE_LEN {
            return Err(SignatureError::Malformed(format!(
                "expected {SIGNATURE_LEN} bytes, got {}",
                sig.len()
            )));
        }

        // v is either the raw recovery id or the legacy 27/28 form
        let v = match sig[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            v => return Err(SignatureError::Malformed(format!("invalid recovery id {v}"))),
        };

        let rec_id = RecoveryId::from_i32(i32::from(v))
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;
        let signature = RecoverableSignature::from_compact(&sig[..64], rec_id)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;

        let digest = keccak256(data);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;

        let public_key = self
            .secp
            .recover_ecdsa(&message, &signature)
            .map_err(|e| SignatureError::Malformed(e.to_string()))?;

        // last 20 bytes of keccak256 over the uncompressed key without the 0x04 prefix
        let hash = keccak256(&public_key.serialize_uncompressed()[1..]);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Ok(address)
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, signature: &Signature, signer: &Address, data: &[u8]) -> Result<(), SignatureError> {
        match signature.sig_type {
            SigType::Secp256k1 | SigType::Delegated => {}
            other => return Err(SignatureError::UnsupportedType(other)),
        }

        let recovered = self.recover_address(&signature.data, data)?;
        let expected = signer
            .as_str()
            .strip_prefix("0x")
            .and_then(|h| hex::decode(h).ok())
            .ok_or_else(|| SignatureError::Mismatch(signer.clone()))?;

        if expected.as_slice() != recovered {
            return Err(SignatureError::Mismatch(signer.clone()));
        }
        Ok(())
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}
