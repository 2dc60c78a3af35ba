//! Self-defense layer of the emitted interpreter.
//!
//! Emits the trap routine (timing probe, devtools probe, digest check) and
//! provides the emission-side digest patching. The digest is FNV-1a over
//! the dispatch function's source text, captured after every post-processing
//! transform has run; the emitted check recomputes it from
//! `String(<interp>)` at runtime. All probes are gated on host
//! capabilities.

use std::fmt::Write as _;

use super::DIGEST_SENTINEL;
use crate::Config;

/// Emit the FNV helper and the trap routine.
pub fn trap_fn(w: &mut String, trap: &str, fnv: &str, interp: &str, config: &Config) {
    // FNV-1a, 32-bit. The multiply is spelled as shifts and adds so the
    // arithmetic stays exact in the host language; the Rust side multiplies
    // modulo 2^32, which is the same function.
    writeln!(w, "  function {fnv}(s) {{").unwrap();
    writeln!(w, "    var h = 2166136261;").unwrap();
    writeln!(w, "    for (var i = 0; i < s.length; i = i + 1) {{").unwrap();
    writeln!(w, "      h = h ^ s.charCodeAt(i);").unwrap();
    writeln!(
        w,
        "      h = (h + (h << 1) + (h << 4) + (h << 7) + (h << 8) + (h << 24)) >>> 0;"
    )
    .unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "    return h >>> 0;").unwrap();
    writeln!(w, "  }}").unwrap();

    writeln!(w, "  function {trap}() {{").unwrap();
    writeln!(
        w,
        "    var g = (typeof globalThis !== \"undefined\") ? globalThis : {{}};"
    )
    .unwrap();
    if config.debug_protection {
        // A stepped-through loop takes far longer than a running one.
        writeln!(w, "    if (typeof Date !== \"undefined\" && Date.now) {{").unwrap();
        writeln!(w, "      var t0 = Date.now();").unwrap();
        writeln!(w, "      var acc = 0;").unwrap();
        writeln!(
            w,
            "      for (var i = 0; i < 1000; i = i + 1) {{ acc = (acc + i) | 0; }}"
        )
        .unwrap();
        writeln!(
            w,
            "      if (Date.now() - t0 > 100) {{ throw \"security violation\"; }}"
        )
        .unwrap();
        writeln!(w, "    }}").unwrap();
        writeln!(
            w,
            "    if (g.console && g.console.firebug) {{ throw \"security violation\"; }}"
        )
        .unwrap();
        writeln!(w, "    var win = g.window;").unwrap();
        writeln!(
            w,
            "    if (win && win.outerWidth !== undefined && win.outerWidth - win.innerWidth > 160) {{ throw \"security violation\"; }}"
        )
        .unwrap();
    }
    if config.self_defending {
        writeln!(
            w,
            "    if ({fnv}(String({interp})) !== {DIGEST_SENTINEL}) {{ throw \"security violation\"; }}"
        )
        .unwrap();
    }
    writeln!(w, "  }}").unwrap();
}

/// FNV-1a over the text bytes, matching the emitted helper.
pub fn fnv1a(text: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in text.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Extract `function <name>(...) { ... }` from the source, string-aware and
/// brace-balanced, exactly the slice `String(fn)` yields at runtime.
fn function_text<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("function {name}(");
    let start = source.find(&needle)?;
    let bytes = source.as_bytes();
    let mut depth = 0i32;
    let mut in_str: Option<u8> = None;
    let mut prev = 0u8;
    let mut seen_brace = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        match in_str {
            Some(q) => {
                if b == q && prev != b'\\' {
                    in_str = None;
                }
            }
            None => match b {
                b'"' | b'\'' => in_str = Some(b),
                b'{' => {
                    depth += 1;
                    seen_brace = true;
                }
                b'}' => {
                    depth -= 1;
                    if seen_brace && depth == 0 {
                        return Some(&source[start..=i]);
                    }
                }
                _ => {}
            },
        }
        prev = b;
    }
    None
}

/// Replace the digest sentinel with the digest of the protected function,
/// computed over the final text. Must run after every other transform.
pub fn patch_digest(source: &str, interp_name: &str) -> String {
    match function_text(source, interp_name) {
        Some(text) => {
            let digest = fnv1a(text);
            source.replace(DIGEST_SENTINEL, &format!("0x{digest:08X}"))
        }
        None => source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_matches_known_vectors() {
        assert_eq!(fnv1a(""), 0x811C9DC5);
        assert_eq!(fnv1a("a"), 0xE40C292C);
        assert_eq!(fnv1a("foobar"), 0xBF9CF968);
    }

    #[test]
    fn function_text_is_brace_balanced_and_string_aware() {
        let src = r#"var x = 1;
function target(a) {
  var s = "closing } inside a string";
  if (a) { return s; }
  return "";
}
var y = 2;"#;
        let text = function_text(src, "target").unwrap();
        assert!(text.starts_with("function target(a) {"));
        assert!(text.ends_with('}'));
        assert!(text.contains("closing } inside"));
        assert!(!text.contains("var y"));
    }

    #[test]
    fn patch_digest_replaces_the_sentinel() {
        let src = format!(
            "function guard() {{ return {DIGEST_SENTINEL}; }}\nfunction run() {{ return 1; }}\n"
        );
        let patched = patch_digest(&src, "run");
        assert!(!patched.contains(DIGEST_SENTINEL));
        let expected = fnv1a("function run() { return 1; }");
        assert!(patched.contains(&format!("0x{expected:08X}")));
    }

    #[test]
    fn missing_function_leaves_the_source_unchanged() {
        let src = "var a = 1;";
        assert_eq!(patch_digest(src, "ghost"), src);
    }
}
