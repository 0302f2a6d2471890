//! Ed25519 signing of raw messages and transaction bodies.
//!
//! The sign bytes of a [`TxBody`] are its canonical JSON encoding hashed with
//! Blake2b-256; the signature covers that digest.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use txbot_types::{KeyPair, PrivateKey, PublicKey, Signature, SignedTx, TxBody};

use crate::error::CryptoError;
use crate::hash::blake2b_256;

/// Sign a message with a private key, returning the signature.
pub fn sign_message(message: &[u8], private_key: &PrivateKey) -> Signature {
    let signing_key = SigningKey::from_bytes(&private_key.0);
    let sig = signing_key.sign(message);
    Signature(sig.to_bytes())
}

/// Verify a signature against a message and public key.
pub fn verify_signature(message: &[u8], signature: &Signature, public_key: &PublicKey) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(&public_key.0) else {
        return false;
    };
    let dalek_sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    verifying_key.verify(message, &dalek_sig).is_ok()
}

fn sign_bytes(body: &TxBody) -> Result<[u8; 32], CryptoError> {
    let encoded = serde_json::to_vec(body).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(blake2b_256(&encoded))
}

/// Sign a transaction body with the given key pair.
pub fn sign_tx(body: TxBody, keys: &KeyPair) -> Result<SignedTx, CryptoError> {
    let digest = sign_bytes(&body)?;
    let signature = sign_message(&digest, &keys.private);
    Ok(SignedTx {
        body,
        public_key: keys.public.clone(),
        signature,
    })
}

/// Verify that a signed transaction's signature matches its body and key.
pub fn verify_tx(tx: &SignedTx) -> bool {
    match sign_bytes(&tx.body) {
        Ok(digest) => verify_signature(&digest, &tx.signature, &tx.public_key),
        Err(_) => false,
    }
}
