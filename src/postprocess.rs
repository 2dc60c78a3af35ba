//! Source-level transforms over the emitted interpreter text.
//!
//! Three passes: dotted property access becomes bracketed string indexing,
//! decoy review-style comments land between top-level statements, and the
//! control-flow flattening hook wraps the unit in a state-machine driver.
//! Every pass is idempotent under re-application.

use rand::Rng;

use crate::names::NameManager;

/// Rewrite every `.name` member access to `["name"]` indexing. String and
/// comment contents are left alone; numeric literals never match because an
/// identifier cannot start with a digit.
pub fn rewrite_properties(source: &str) -> String {
    fn is_ident_start(b: u8) -> bool {
        b.is_ascii_alphabetic() || b == b'_' || b == b'$'
    }
    fn is_ident_char(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
    }
    /// A member access only follows something that can hold a value.
    fn ends_reference(b: u8) -> bool {
        is_ident_char(b) || b == b')' || b == b']' || b == b'"' || b == b'\''
    }

    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len() + 64);
    let mut in_str: Option<u8> = None;
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut prev_sig: u8 = 0;
    let mut prev: u8 = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if in_line_comment {
            if b == b'\n' {
                in_line_comment = false;
            }
        } else if in_block_comment {
            if b == b'/' && prev == b'*' {
                in_block_comment = false;
            }
        } else if let Some(q) = in_str {
            if b == q && prev != b'\\' {
                in_str = None;
                prev_sig = b;
            }
        } else {
            match b {
                b'"' | b'\'' => in_str = Some(b),
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => in_line_comment = true,
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => in_block_comment = true,
                b'.' if ends_reference(prev_sig) => {
                    let mut j = i + 1;
                    if j < bytes.len() && is_ident_start(bytes[j]) {
                        while j < bytes.len() && is_ident_char(bytes[j]) {
                            j += 1;
                        }
                        let name = &source[i + 1..j];
                        out.push_str("[\"");
                        out.push_str(name);
                        out.push_str("\"]");
                        prev_sig = b']';
                        prev = b']';
                        i = j;
                        continue;
                    }
                }
                _ => {}
            }
            if !b.is_ascii_whitespace() && in_str.is_none() && !in_line_comment && !in_block_comment
            {
                prev_sig = b;
            }
        }

        out.push(b as char);
        prev = b;
        i += 1;
    }
    out
}

const DECOYS: &[&str] = &[
    "// reviewed: bounds are checked by the caller",
    "// note: order matters here, see the dispatch contract",
    "// fallback for hosts without a precise timer",
    "// keep in sync with the handler table",
    "// benchmarked: the array form wins on small inputs",
    "// legacy hosts miss this API, hence the probe",
];

/// Insert innocuous review-style comments before top-level statements of
/// the emitted unit, at random intervals scaled by entropy.
pub fn inject_decoys<R: Rng>(source: &str, entropy: f64, rng: &mut R) -> String {
    let chance = (entropy.clamp(0.0, 1.0) * 0.35).min(0.9);
    let mut out = String::with_capacity(source.len() + 256);
    for line in source.lines() {
        let anchor = line.starts_with("  var ") || line.starts_with("  function ");
        if anchor && rng.gen_bool(chance) {
            out.push_str("  ");
            out.push_str(DECOYS[rng.gen_range(0..DECOYS.len())]);
            out.push('\n');
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

const FLATTEN_MARKER: &str = "// state machine driver";

/// Control-flow flattening hook. Wraps the emitted `var <name> = <expr>;`
/// unit in a switch-dispatch driver. Re-application detects the marker and
/// returns the input unchanged.
pub fn flatten(source: &str, names: &mut NameManager) -> String {
    if source.contains(FLATTEN_MARKER) {
        return source.to_string();
    }
    let Some(eq) = source.find(" = ") else {
        return source.to_string();
    };
    let head = &source[..eq];
    let rest = source[eq + 3..].trim_end();
    let Some(expr) = rest.strip_suffix(';') else {
        return source.to_string();
    };

    let state = names.fresh();
    let result = names.fresh();
    format!(
        "{head} = (function () {{\n  \
         {FLATTEN_MARKER}\n  \
         var {state} = 0;\n  \
         var {result};\n  \
         while ({state} !== 2) {{\n    \
         switch ({state}) {{\n      \
         case 0:\n        {state} = 1;\n        break;\n      \
         case 1:\n        {result} = {expr};\n        {state} = 2;\n        break;\n    \
         }}\n  \
         }}\n  \
         return {result};\n\
         }})();\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rewrites_dotted_access() {
        assert_eq!(rewrite_properties("a.b;"), "a[\"b\"];");
        assert_eq!(rewrite_properties("foo().bar.baz"), "foo()[\"bar\"][\"baz\"]");
        assert_eq!(rewrite_properties("x[0].y"), "x[0][\"y\"]");
    }

    #[test]
    fn leaves_numbers_strings_and_comments_alone() {
        assert_eq!(rewrite_properties("var x = 1.5;"), "var x = 1.5;");
        assert_eq!(rewrite_properties("var y = .25;"), "var y = .25;");
        assert_eq!(rewrite_properties("\"a.b\" + 'c.d'"), "\"a.b\" + 'c.d'");
        assert_eq!(rewrite_properties("// a.b stays\n"), "// a.b stays\n");
        assert_eq!(rewrite_properties("/* x.y */"), "/* x.y */");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let src = "obj.first.second(arr[i].third); \"lit.eral\"; n = 1.25;";
        let once = rewrite_properties(src);
        let twice = rewrite_properties(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn string_tail_counts_as_a_reference() {
        assert_eq!(
            rewrite_properties("\"abc\".length"),
            "\"abc\"[\"length\"]"
        );
    }

    #[test]
    fn decoys_only_land_on_top_level_anchors() {
        let src = "  var a = 1;\n    var inner = 2;\n  function f() {\n    return 1;\n  }\n";
        let mut rng = StdRng::seed_from_u64(3);
        let out = inject_decoys(src, 1.0, &mut rng);
        for line in out.lines() {
            if line.trim_start().starts_with("//") {
                assert!(line.starts_with("  //"), "decoy drifted: {line}");
            }
        }
        // Original lines survive in order.
        let stripped: Vec<&str> = out
            .lines()
            .filter(|l| !l.trim_start().starts_with("//"))
            .collect();
        assert_eq!(stripped.join("\n") + "\n", src);
    }

    #[test]
    fn flatten_wraps_once_and_only_once() {
        let mut names = NameManager::with_seed(8, 9);
        let src = "var unit = (function () {\n  return 42;\n})();\n";
        let once = flatten(src, &mut names);
        assert_ne!(once, src);
        assert!(once.contains("switch ("));
        assert!(once.starts_with("var unit = (function () {"));
        let twice = flatten(&once, &mut names);
        assert_eq!(once, twice);
    }
}
