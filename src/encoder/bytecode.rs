//! Bytecode sealing and opening.
//!
//! The instruction stream is padded with NOP bytes (when dead-code
//! injection is on), then encrypted under a freshly derived key and IV.
//! Opening reverses the pipeline: decrypt, check the padded length, strip
//! the padding. Key and IV are derived from a random seed with HMAC-SHA256
//! domain separation, one seed per emission, so the ciphertext differs
//! between any two runs over the same input.
//!
//! 0xFF never occurs as an opcode or operand in a lowered stream, which is
//! what makes the padding strip exact.

use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::{Decryptor, Encryptor};
use hmac::{Hmac, Mac};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use sha2::Sha256;

use super::{xor_stream, CryptoError};
use crate::opcodes::special;
use crate::pool::Const;
use crate::program::{CipherKind, Program};

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

const KEY_DOMAIN: &[u8] = b"shroud-bytecode-key-v1";
const IV_DOMAIN: &[u8] = b"shroud-bytecode-iv-v1";

/// Share of the stream length spliced in as padding, scaled by entropy.
const PAD_FACTOR: f64 = 0.3;

/// Derive key material from the emission seed with domain separation.
fn derive(seed: &[u8; 32], domain: &[u8]) -> [u8; 32] {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(seed).expect("HMAC accepts any key length");
    mac.update(domain);
    let digest = mac.finalize().into_bytes();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Splice NOP bytes into the stream at random positions.
fn splice_nops<R: Rng>(code: &[u8], entropy: f64, rng: &mut R) -> Vec<u8> {
    let count = (entropy.clamp(0.0, 1.0) * PAD_FACTOR * code.len() as f64).round() as usize;
    let mut padded = code.to_vec();
    for _ in 0..count {
        let at = rng.gen_range(0..=padded.len());
        padded.insert(at, special::NOP);
    }
    padded
}

/// Remove every padding byte from a decrypted stream.
pub fn strip_nops(code: &[u8]) -> Vec<u8> {
    code.iter().copied().filter(|&b| b != special::NOP).collect()
}

fn aes_encrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    let block = 16;
    let padded_len = ((data.len() / block) + 1) * block;
    let mut buf = vec![0u8; padded_len];
    buf[..data.len()].copy_from_slice(data);
    let out = cipher
        .encrypt_padded_mut::<Pkcs7>(&mut buf, data.len())
        .expect("buffer sized for padding");
    out.to_vec()
}

fn aes_decrypt(key: &[u8; 32], iv: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    let mut buf = data.to_vec();
    let out = cipher
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| CryptoError::BadStream)?;
    Ok(out.to_vec())
}

/// Seal a lowered stream into a program.
pub fn seal(
    code: &[u8],
    pool: Vec<Const>,
    pool_key: Option<String>,
    cipher: CipherKind,
    dead_code: bool,
    entropy: f64,
) -> Program {
    let mut rng = StdRng::from_entropy();
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);

    let key = derive(&seed, KEY_DOMAIN);
    let mut iv = [0u8; 16];
    iv.copy_from_slice(&derive(&seed, IV_DOMAIN)[..16]);

    let padded = if dead_code {
        splice_nops(code, entropy, &mut rng)
    } else {
        code.to_vec()
    };

    let ciphertext = match cipher {
        CipherKind::AesCbc => aes_encrypt(&key, &iv, &padded),
        CipherKind::Xor => xor_stream(&padded, &key),
    };

    Program {
        ciphertext,
        iv,
        key,
        cipher,
        plain_len: padded.len(),
        pool,
        pool_key,
    }
}

/// Open a sealed program: decrypt (with XOR fallback), validate the padded
/// length, strip the padding.
pub fn open(program: &Program) -> Result<Vec<u8>, CryptoError> {
    let padded = match program.cipher {
        CipherKind::AesCbc => {
            match aes_decrypt(&program.key, &program.iv, &program.ciphertext) {
                Ok(plain) => plain,
                // Cipher path unavailable or stream damaged: try the
                // per-byte fallback before giving up.
                Err(_) => xor_stream(&program.ciphertext, &program.key),
            }
        }
        CipherKind::Xor => xor_stream(&program.ciphertext, &program.key),
    };
    if padded.len() != program.plain_len {
        return Err(CryptoError::BadStream);
    }
    Ok(strip_nops(&padded))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_code() -> Vec<u8> {
        // A plausible stream: opcodes and small operands, no 0xFF bytes.
        vec![0x01, 0x00, 0x01, 0x01, 0x04, 0x02, 0x0E, 0x1E, 0x06]
    }

    #[test]
    fn cbc_round_trip_recovers_the_stream() {
        let code = sample_code();
        let program = seal(&code, Vec::new(), None, CipherKind::AesCbc, false, 0.0);
        assert_ne!(program.ciphertext, code);
        assert_eq!(open(&program).unwrap(), code);
    }

    #[test]
    fn xor_round_trip_recovers_the_stream() {
        let code = sample_code();
        let program = seal(&code, Vec::new(), None, CipherKind::Xor, false, 0.0);
        assert_eq!(open(&program).unwrap(), code);
    }

    #[test]
    fn padding_survives_the_round_trip() {
        let code = sample_code();
        let program = seal(&code, Vec::new(), None, CipherKind::AesCbc, true, 0.9);
        // Padding grew the sealed stream.
        assert!(program.plain_len > code.len());
        // And filtering restores the original exactly.
        assert_eq!(open(&program).unwrap(), code);
    }

    #[test]
    fn padding_volume_scales_with_entropy() {
        let code = vec![0x01u8; 1000];
        let low = seal(&code, Vec::new(), None, CipherKind::Xor, true, 0.1);
        let high = seal(&code, Vec::new(), None, CipherKind::Xor, true, 1.0);
        assert!(high.plain_len > low.plain_len);
        // Roughly entropy * 0.3 * len extra bytes.
        assert_eq!(high.plain_len, 1300);
        assert_eq!(low.plain_len, 1030);
    }

    #[test]
    fn two_seals_of_the_same_input_differ() {
        let code = sample_code();
        let a = seal(&code, Vec::new(), None, CipherKind::AesCbc, false, 0.0);
        let b = seal(&code, Vec::new(), None, CipherKind::AesCbc, false, 0.0);
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.key, b.key);
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn tampered_length_is_rejected() {
        let code = sample_code();
        let mut program = seal(&code, Vec::new(), None, CipherKind::Xor, false, 0.0);
        program.plain_len += 1;
        assert!(open(&program).is_err());
    }
}
