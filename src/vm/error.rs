//! Runtime error types for the reference interpreter.

use thiserror::Error;

use super::value::Value;
use crate::encoder::CryptoError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("bad opcode 0x{0:02x}")]
    BadOpcode(u8),

    #[error("bad operator `{0}`")]
    BadOperator(String),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Raised by the self-defense layer; carries no diagnostic detail.
    #[error("security violation")]
    SecurityViolation,

    #[error("constant index {0} out of range")]
    BadConstIndex(u8),

    #[error("truncated instruction stream")]
    TruncatedStream,

    #[error("call depth exceeded")]
    CallDepthExceeded,

    #[error("dynamic function compile failed: {0}")]
    DynamicCompile(String),

    #[error(transparent)]
    Decrypt(#[from] CryptoError),

    /// A script-level exception in flight. Absorbed by try frames; escapes
    /// as an error only when uncaught.
    #[error("uncaught exception: {0}")]
    Thrown(Value),
}

impl RuntimeError {
    /// The value a catch handler binds for this error.
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            other => Value::Str(other.to_string()),
        }
    }
}
