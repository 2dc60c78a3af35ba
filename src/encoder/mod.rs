//! Encryption layers applied after lowering: the constant-pool string
//! encoder and the bytecode cipher.

pub mod bytecode;
pub mod strings;

use thiserror::Error;

/// Failures in the sealing and opening paths.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("decryption produced an invalid stream")]
    BadStream,
    #[error("encoded constant is not valid base64")]
    BadBase64,
    #[error("decoded constant is not valid utf-8")]
    BadUtf8,
}

/// Repeating-key XOR, its own inverse.
pub(crate) fn xor_stream(data: &[u8], key: &[u8]) -> Vec<u8> {
    debug_assert!(!key.is_empty());
    data.iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_stream_is_an_involution() {
        let data = b"the quick brown fox";
        let key = b"k3y";
        let once = xor_stream(data, key);
        assert_ne!(once.as_slice(), data.as_slice());
        assert_eq!(xor_stream(&once, key), data);
    }
}
