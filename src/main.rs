//! Command-line frontend.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shroud::{CipherKind, Config, UnsupportedPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "shroud",
    version,
    about = "Source-to-bytecode virtualizing obfuscator"
)]
struct Cli {
    /// Input source files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory.
    #[arg(short, long, default_value = "obfuscated")]
    output: PathBuf,

    /// Leave string constants unwrapped.
    #[arg(long)]
    no_string_encoding: bool,

    /// Skip the control-flow flattening pass.
    #[arg(long)]
    no_control_flow_flattening: bool,

    /// Skip bytecode padding and decoy comments.
    #[arg(long)]
    no_dead_code_injection: bool,

    /// Skip the digest check and error masking.
    #[arg(long)]
    no_self_defending: bool,

    /// Skip timing and devtools probes.
    #[arg(long)]
    no_debug_protection: bool,

    /// Keep dotted property access as written.
    #[arg(long)]
    no_transform_object_keys: bool,

    /// Padding volume scale, 0.0 to 1.0.
    #[arg(long, default_value_t = 0.9)]
    entropy: f64,

    /// Override the root interpreter identifier.
    #[arg(long)]
    vm_name: Option<String>,

    /// Emit placeholders for unsupported constructs instead of failing.
    #[arg(long)]
    lossy: bool,

    /// Seal with the XOR fallback path instead of the block cipher.
    #[arg(long)]
    xor_cipher: bool,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            string_encoding: !self.no_string_encoding,
            control_flow_flattening: !self.no_control_flow_flattening,
            dead_code_injection: !self.no_dead_code_injection,
            self_defending: !self.no_self_defending,
            debug_protection: !self.no_debug_protection,
            entropy: self.entropy.clamp(0.0, 1.0),
            transform_object_keys: !self.no_transform_object_keys,
            vm_name: self.vm_name.clone(),
            unsupported: if self.lossy {
                UnsupportedPolicy::Lossy
            } else {
                UnsupportedPolicy::Strict
            },
            cipher: if self.xor_cipher {
                CipherKind::Xor
            } else {
                CipherKind::AesCbc
            },
            ..Config::default()
        }
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config();
    shroud::process_files(&cli.inputs, &cli.output, &config)
        .context("obfuscation failed")?;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
