//! The sealed program tuple produced by the encoders and consumed by the
//! interpreter: ciphertext, IV, key, cipher id, pre-encryption length, and
//! the constant pool (plus the pool's XOR key when string encoding is on).

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::pool::Const;

/// Which encryption path sealed the bytecode. The XOR path exists for
/// hosts without a block-cipher facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    AesCbc,
    Xor,
}

impl CipherKind {
    pub fn id(self) -> &'static str {
        match self {
            CipherKind::AesCbc => "aes-256-cbc",
            CipherKind::Xor => "xor",
        }
    }
}

/// Sealed, self-describing program. Everything except `cipher` is opaque
/// bytes or strings to the interpreter.
#[derive(Debug, Clone)]
pub struct Program {
    pub ciphertext: Vec<u8>,
    pub iv: [u8; 16],
    pub key: [u8; 32],
    pub cipher: CipherKind,
    /// Length of the padded plaintext stream, checked after decryption.
    pub plain_len: usize,
    pub pool: Vec<Const>,
    /// XOR key for encoded pool entries, when string encoding ran.
    pub pool_key: Option<String>,
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine as _;

        let mut out = serializer.serialize_struct("Program", 7)?;
        out.serialize_field("cipher", self.cipher.id())?;
        out.serialize_field("key", &hex::encode(self.key))?;
        out.serialize_field("iv", &hex::encode(self.iv))?;
        out.serialize_field("data", &STANDARD.encode(&self.ciphertext))?;
        out.serialize_field("length", &self.plain_len)?;
        out.serialize_field("pool", &self.pool)?;
        out.serialize_field("poolKey", &self.pool_key)?;
        out.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_to_the_embedded_shape() {
        let program = Program {
            ciphertext: vec![1, 2, 3],
            iv: [0; 16],
            key: [0; 32],
            cipher: CipherKind::Xor,
            plain_len: 3,
            pool: vec![Const::Number(1.0)],
            pool_key: None,
        };
        let json = serde_json::to_value(&program).unwrap();
        assert_eq!(json["cipher"], "xor");
        assert_eq!(json["data"], "AQID");
        assert_eq!(json["length"], 3);
        assert!(json["pool"].is_array());
    }
}
