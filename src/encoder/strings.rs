//! Constant-pool string encoding.
//!
//! After lowering, each plain string entry is wrapped as an XOR-ciphered,
//! base64-carried form under a key generated freshly per emission. The
//! interpreter receives the key alongside the pool and decodes entries
//! transparently on first read. Identifier names, operator spellings, and
//! body sources stay bare so that scope lookup and operator dispatch do
//! not pay the decode.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::Rng;

use super::{xor_stream, CryptoError};
use crate::pool::Const;

const KEY_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const KEY_LEN: usize = 16;

/// Generate a fresh pool key.
pub fn fresh_key<R: Rng>(rng: &mut R) -> String {
    (0..KEY_LEN)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}

/// Encode one entry. Plain strings are wrapped; an already-encoded entry
/// passes through untouched; everything else is left bare.
pub fn encode_entry(entry: &Const, key: &str) -> Const {
    match entry {
        Const::Str(s) => Const::Encoded {
            value: STANDARD.encode(xor_stream(s.as_bytes(), key.as_bytes())),
        },
        other => other.clone(),
    }
}

/// Encode a whole pool, returning the transformed entries and the key.
pub fn encode_pool<R: Rng>(entries: &[Const], rng: &mut R) -> (Vec<Const>, String) {
    let key = fresh_key(rng);
    let encoded = entries.iter().map(|e| encode_entry(e, &key)).collect();
    (encoded, key)
}

/// Recover the plaintext of an encoded entry.
pub fn decode_entry(value: &str, key: &str) -> Result<String, CryptoError> {
    let raw = STANDARD.decode(value).map_err(|_| CryptoError::BadBase64)?;
    let plain = xor_stream(&raw, key.as_bytes());
    String::from_utf8(plain).map_err(|_| CryptoError::BadUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn strings_round_trip_through_the_encoding() {
        let mut rng = StdRng::seed_from_u64(11);
        let pool = vec![
            Const::Str("secret text".into()),
            Const::Number(4.0),
            Const::Name("x".into()),
        ];
        let (encoded, key) = encode_pool(&pool, &mut rng);
        match &encoded[0] {
            Const::Encoded { value } => {
                assert_eq!(decode_entry(value, &key).unwrap(), "secret text");
            }
            other => panic!("string was not wrapped: {other:?}"),
        }
        // Non-string entries are untouched.
        assert_eq!(encoded[1], pool[1]);
        assert_eq!(encoded[2], pool[2]);
    }

    #[test]
    fn re_encoding_an_encoded_entry_is_a_no_op() {
        let entry = Const::Encoded {
            value: "QUJD".into(),
        };
        assert_eq!(encode_entry(&entry, "anykey"), entry);
    }

    #[test]
    fn two_emissions_use_different_keys() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(2);
        assert_ne!(fresh_key(&mut a), fresh_key(&mut b));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_entry("!!!", "k").is_err());
    }
}
