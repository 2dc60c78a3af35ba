//! # shroud
//!
//! Source-to-bytecode virtualizing obfuscator for a C-family scripting
//! language. A source file is parsed, lowered to a custom stack-machine
//! bytecode, encrypted together with its constant pool, and re-emitted as a
//! single self-contained unit: the ciphered program, a polymorphic
//! interpreter able to decrypt and run it, and optional anti-analysis
//! counter-measures.
//!
//! ## Pipeline
//!
//! 1. frontend (`lexer`, `parser`): source text to AST
//! 2. `collector`: identifier census, intrinsic reservation
//! 3. `lowerer`: AST to instruction stream + constant pool
//! 4. `encoder::strings`: XOR/base64 wrapping of string constants
//! 5. `encoder::bytecode`: cipher + padding, sealing the [`program::Program`]
//! 6. `emit`: interpreter source, fresh names per emission
//! 7. `postprocess`: property rewrite, decoy comments, flattening hook
//!
//! The `vm` module executes sealed programs with the exact semantics of the
//! emitted interpreter and backs the end-to-end tests.

pub mod ast;
pub mod collector;
pub mod emit;
pub mod encoder;
pub mod error;
pub mod lexer;
pub mod lowerer;
pub mod names;
pub mod opcodes;
pub mod parser;
pub mod pool;
pub mod postprocess;
pub mod program;
pub mod vm;

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;

pub use error::CompileError;
pub use lowerer::UnsupportedPolicy;
pub use program::CipherKind;

/// Emission configuration. Every protection defaults to on.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wrap string constants in the XOR/base64 form.
    pub string_encoding: bool,
    /// Apply the state-machine driver to the emitted unit.
    pub control_flow_flattening: bool,
    /// Splice NOP padding into the bytecode and decoy comments into the text.
    pub dead_code_injection: bool,
    /// Digest check and generic error masking.
    pub self_defending: bool,
    /// Timing and devtools probes, periodic re-checks.
    pub debug_protection: bool,
    /// Scales the padding volume, 0.0 to 1.0.
    pub entropy: f64,
    /// Rewrite dotted property access to bracketed indexing.
    pub transform_object_keys: bool,
    /// Override the root interpreter identifier; generated when absent.
    pub vm_name: Option<String>,
    /// Length of generated identifiers.
    pub name_length: usize,
    /// What to do with constructs the lowerer cannot translate.
    pub unsupported: UnsupportedPolicy,
    /// Bytecode sealing path; XOR is the fallback for hosts without a
    /// block-cipher facility.
    pub cipher: CipherKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            string_encoding: true,
            control_flow_flattening: true,
            dead_code_injection: true,
            self_defending: true,
            debug_protection: true,
            entropy: 0.9,
            transform_object_keys: true,
            vm_name: None,
            name_length: names::DEFAULT_NAME_LEN,
            unsupported: UnsupportedPolicy::Strict,
            cipher: CipherKind::AesCbc,
        }
    }
}

/// Obfuscate one source unit into its emitted interpreter text.
pub fn obfuscate(source: &str, config: &Config) -> Result<String, CompileError> {
    let span = tracing::info_span!("obfuscate", bytes = source.len());
    let _enter = span.enter();

    let program_ast = parser::parse(source)?;

    let collected = collector::IdentifierCollector::collect(&program_ast);
    tracing::debug!(
        occurrences = collected.occurrences.len(),
        distinct = collected.names.len(),
        "collected identifiers"
    );
    let mut names = names::NameManager::new(config.name_length);
    names.reserve(collected.names.iter().cloned());
    names.reserve(collector::PROTECTED_INTRINSICS.iter().map(|s| s.to_string()));

    let lowered = lowerer::lower(&program_ast, config.unsupported)?;
    tracing::debug!(
        code_bytes = lowered.code.len(),
        pool_entries = lowered.pool.len(),
        "lowered program"
    );

    let entries = lowered.pool.entries().to_vec();
    let (pool_entries, pool_key) = if config.string_encoding {
        let mut rng = StdRng::from_entropy();
        let (encoded, key) = encoder::strings::encode_pool(&entries, &mut rng);
        (encoded, Some(key))
    } else {
        (entries, None)
    };

    let sealed = encoder::bytecode::seal(
        &lowered.code,
        pool_entries,
        pool_key,
        config.cipher,
        config.dead_code_injection,
        config.entropy,
    );
    tracing::debug!(
        ciphertext = sealed.ciphertext.len(),
        cipher = sealed.cipher.id(),
        "sealed bytecode"
    );

    let emitted = emit::emit(&sealed, config, &mut names);
    let interp_name = emitted.interp_name.clone();
    let has_digest = emitted.has_digest;

    let mut text = emitted.source;
    if config.transform_object_keys {
        text = postprocess::rewrite_properties(&text);
    }
    if config.control_flow_flattening {
        text = postprocess::flatten(&text, &mut names);
    }
    if config.dead_code_injection {
        let mut rng = StdRng::from_entropy();
        text = postprocess::inject_decoys(&text, config.entropy, &mut rng);
    }
    // The digest covers the final text, so this patch runs last.
    if has_digest {
        text = emit::protection::patch_digest(&text, &interp_name);
    }
    Ok(text)
}

/// Byte-level variant of [`obfuscate`].
pub fn obfuscate_bytes(source: &[u8], config: &Config) -> Result<Vec<u8>, CompileError> {
    let text = std::str::from_utf8(source).map_err(|_| CompileError::Parse {
        line: 1,
        col: 1,
        message: "source is not valid utf-8".to_string(),
    })?;
    Ok(obfuscate(text, config)?.into_bytes())
}

/// Batch entry point: obfuscate each input into `out_dir` under the same
/// file name. Stops at the first failure.
pub fn process_files(
    inputs: &[PathBuf],
    out_dir: &Path,
    config: &Config,
) -> Result<(), CompileError> {
    std::fs::create_dir_all(out_dir)?;
    for input in inputs {
        let source = std::fs::read_to_string(input)?;
        let output = obfuscate(&source, config)?;
        let file_name = input.file_name().unwrap_or_else(|| "out.js".as_ref());
        let dest = out_dir.join(file_name);
        std::fs::write(&dest, output)?;
        tracing::info!(input = %input.display(), output = %dest.display(), "obfuscated");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emissions_differ_between_runs() {
        let config = Config::default();
        let a = obfuscate("var x = 1; x + 1", &config).unwrap();
        let b = obfuscate("var x = 1; x + 1", &config).unwrap();
        assert_ne!(a, b, "fresh keys and names must vary the output");
    }

    #[test]
    fn emitted_unit_reflects_the_flags() {
        let off = Config {
            control_flow_flattening: false,
            dead_code_injection: false,
            self_defending: false,
            debug_protection: false,
            transform_object_keys: false,
            ..Config::default()
        };
        let text = obfuscate("1 + 1", &off).unwrap();
        assert!(text.starts_with("var "));
        assert!(!text.contains("// state machine driver"));

        let on = Config::default();
        let text = obfuscate("1 + 1", &on).unwrap();
        assert!(text.contains("// state machine driver"));
    }

    #[test]
    fn strict_mode_propagates_lowering_failures() {
        let err = obfuscate("for (k in o) {}", &Config::default());
        assert!(matches!(err, Err(CompileError::UnsupportedNode(_))));
    }

    #[test]
    fn parse_errors_carry_positions() {
        let err = obfuscate("var = ;", &Config::default());
        assert!(matches!(err, Err(CompileError::Parse { .. })));
    }
}
