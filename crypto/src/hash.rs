//! Blake2b hashing for addresses and transactions.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use txbot_types::{SignedTx, TxHash};

use crate::error::CryptoError;

type Blake2b256 = Blake2b<U32>;

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Hash a signed transaction envelope to produce its `TxHash`.
pub fn hash_transaction(tx: &SignedTx) -> Result<TxHash, CryptoError> {
    let bytes = serde_json::to_vec(tx).map_err(|e| CryptoError::Encoding(e.to_string()))?;
    Ok(TxHash::from_bytes(&blake2b_256(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        let h1 = blake2b_256(b"hello txbot");
        let h2 = blake2b_256(b"hello txbot");
        assert_eq!(h1, h2);
    }

    #[test]
    fn blake2b_different_inputs() {
        let h1 = blake2b_256(b"hello");
        let h2 = blake2b_256(b"world");
        assert_ne!(h1, h2);
    }

    #[test]
    fn blake2b_empty() {
        let h = blake2b_256(b"");
        assert_ne!(h, [0u8; 32]);
    }
}
