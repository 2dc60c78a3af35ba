//! Compile-time error types for the obfuscation pipeline.
//!
//! Every failure between source text and emitted output is a `CompileError`.
//! Runtime failures inside the reference interpreter live in `vm::error`.

use thiserror::Error;

/// Errors raised while parsing, lowering, or emitting a program.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The frontend rejected the source text.
    #[error("parse error at {line}:{col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
    },

    /// The lowerer met a node kind it cannot translate (strict mode only).
    #[error("cannot lower unsupported node kind `{0}`")]
    UnsupportedNode(&'static str),

    /// The constant pool grew past what a one-byte operand can index.
    #[error("constant pool overflow: {0} entries exceed the operand width")]
    PoolOverflow(usize),

    /// Reserved for a raw-byte offset encoding. The pool-indexed scheme
    /// stores displacements as constants, so this cannot fire today.
    #[error("jump displacement {0} exceeds the encodable range")]
    JumpTooFar(i64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Build a parse error from a byte offset into the source.
    pub fn parse_at(src: &str, offset: usize, message: impl Into<String>) -> Self {
        let clamped = offset.min(src.len());
        let mut line = 1;
        let mut col = 1;
        for ch in src[..clamped].chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        CompileError::Parse {
            line,
            col,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_at_reports_line_and_column() {
        let src = "var a = 1;\nvar b = @;\n";
        let err = CompileError::parse_at(src, src.find('@').unwrap(), "unexpected character");
        match err {
            CompileError::Parse { line, col, .. } => {
                assert_eq!(line, 2);
                assert_eq!(col, 9);
            }
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn parse_at_clamps_out_of_range_offsets() {
        let err = CompileError::parse_at("x", 999, "eof");
        assert!(matches!(err, CompileError::Parse { line: 1, .. }));
    }
}
