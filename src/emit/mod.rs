//! Interpreter emission.
//!
//! Produces the source of a stack VM in the input language, parameterized
//! over freshly generated identifiers, the sealed program, and the enabled
//! protection flags. Two emissions of the same input are lexically
//! distinct: every internal role (stack, scope, decoder, handler table,
//! trap routine, ...) draws a new name from the [`NameManager`].
//!
//! The emitted unit is a single expression statement:
//!
//! ```text
//! var <vmName> = (function () { ...decrypt, seed, dispatch... })();
//! ```
//!
//! Its runtime semantics mirror `crate::vm` instruction for instruction.

pub mod protection;

use std::fmt::Write as _;

use crate::collector::PROTECTED_INTRINSICS;
use crate::names::NameManager;
use crate::opcodes::{self, call, exc, jump, object, op, special, stack as stk, var};
use crate::program::{CipherKind, Program};
use crate::Config;

/// Digest placeholder literal, patched after post-processing.
pub const DIGEST_SENTINEL: &str = "0xD1D1D1D1";

/// The emitted unit plus the handles later pipeline stages need.
pub struct EmittedInterpreter {
    pub source: String,
    /// Name of the dispatch function, the digest-protected region.
    pub interp_name: String,
    pub vm_name: String,
    /// Whether the source carries a digest sentinel to patch.
    pub has_digest: bool,
}

struct Names {
    program: String,
    widths: String,
    b64: String,
    hex: String,
    xors: String,
    str_bytes: String,
    bytes_str: String,
    cache: String,
    constant: String,
    decrypt: String,
    fnv: String,
    trap: String,
    binop: String,
    unop: String,
    logop: String,
    construct: String,
    interp: String,
    stack: String,
    scope: String,
    call_stack: String,
    try_blocks: String,
    pc: String,
    op_pc: String,
    steps: String,
    code: String,
    pool: String,
    handlers: String,
    completion: String,
    this_val: String,
    timer: String,
    result: String,
}

impl Names {
    fn draw(names: &mut NameManager) -> Self {
        Self {
            program: names.fresh(),
            widths: names.fresh(),
            b64: names.fresh(),
            hex: names.fresh(),
            xors: names.fresh(),
            str_bytes: names.fresh(),
            bytes_str: names.fresh(),
            cache: names.fresh(),
            constant: names.fresh(),
            decrypt: names.fresh(),
            fnv: names.fresh(),
            trap: names.fresh(),
            binop: names.fresh(),
            unop: names.fresh(),
            logop: names.fresh(),
            construct: names.fresh(),
            interp: names.fresh(),
            stack: names.fresh(),
            scope: names.fresh(),
            call_stack: names.fresh(),
            try_blocks: names.fresh(),
            pc: names.fresh(),
            op_pc: names.fresh(),
            steps: names.fresh(),
            code: names.fresh(),
            pool: names.fresh(),
            handlers: names.fresh(),
            completion: names.fresh(),
            this_val: names.fresh(),
            timer: names.fresh(),
            result: names.fresh(),
        }
    }
}

/// Emit the interpreter for a sealed program.
pub fn emit(program: &Program, config: &Config, names: &mut NameManager) -> EmittedInterpreter {
    let n = Names::draw(names);
    let vm_name = config
        .vm_name
        .clone()
        .unwrap_or_else(|| names.fresh());

    let program_json =
        serde_json::to_string(program).expect("program serialization is infallible");

    let mut out = String::new();
    let w = &mut out;

    writeln!(w, "var {} = (function () {{", vm_name).unwrap();
    writeln!(w, "  \"use strict\";").unwrap();
    writeln!(w, "  var {} = {};", n.program, program_json).unwrap();
    writeln!(w, "  var {} = {};", n.widths, width_table()).unwrap();

    decoder_helpers(w, &n);
    decrypt_fn(w, &n, program.cipher);
    operator_helpers(w, &n);
    if config.self_defending || config.debug_protection {
        protection::trap_fn(w, &n.trap, &n.fnv, &n.interp, config);
    }
    interp_fn(w, &n, config);

    if config.self_defending {
        writeln!(w, "  {}();", n.trap).unwrap();
    }
    writeln!(w, "  var {} = null;", n.timer).unwrap();
    if config.debug_protection {
        writeln!(
            w,
            "  if (typeof setInterval === \"function\") {{ {} = setInterval({}, 30000); }}",
            n.timer, n.trap
        )
        .unwrap();
    }
    writeln!(w, "  var {};", n.result).unwrap();
    writeln!(w, "  try {{").unwrap();
    writeln!(w, "    {} = {}();", n.result, n.interp).unwrap();
    if config.self_defending {
        writeln!(w, "  }} catch (e) {{").unwrap();
        writeln!(w, "    throw \"error\";").unwrap();
    }
    writeln!(w, "  }} finally {{").unwrap();
    writeln!(
        w,
        "    if ({} !== null && typeof clearInterval === \"function\") {{ clearInterval({}); }}",
        n.timer, n.timer
    )
    .unwrap();
    writeln!(w, "  }}").unwrap();
    writeln!(w, "  return {};", n.result).unwrap();
    writeln!(w, "}})();").unwrap();

    EmittedInterpreter {
        source: out,
        interp_name: n.interp,
        vm_name,
        has_digest: config.self_defending,
    }
}

/// Opcode to operand-byte-count map, mirrored from the shared table.
fn width_table() -> String {
    let mut entries = Vec::new();
    for byte in 0u8..=0xFF {
        if let Some(width) = opcodes::operand_count(byte) {
            entries.push(format!("\"{byte}\": {width}"));
        }
    }
    format!("{{ {} }}", entries.join(", "))
}

fn decoder_helpers(w: &mut String, n: &Names) {
    // Base64 to byte array.
    writeln!(w, "  function {}(s) {{", n.b64).unwrap();
    writeln!(
        w,
        "    var alphabet = \"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/\";"
    )
    .unwrap();
    writeln!(w, "    var end = s.length;").unwrap();
    writeln!(w, "    while (end > 0 && s.charAt(end - 1) === \"=\") {{ end = end - 1; }}").unwrap();
    writeln!(w, "    var out = [];").unwrap();
    writeln!(w, "    var acc = 0;").unwrap();
    writeln!(w, "    var bits = 0;").unwrap();
    writeln!(w, "    for (var i = 0; i < end; i = i + 1) {{").unwrap();
    writeln!(w, "      acc = (acc << 6) | alphabet.indexOf(s.charAt(i));").unwrap();
    writeln!(w, "      bits = bits + 6;").unwrap();
    writeln!(w, "      if (bits >= 8) {{ bits = bits - 8; out.push((acc >> bits) & 255); }}").unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "    return out;").unwrap();
    writeln!(w, "  }}").unwrap();

    // Hex string to byte array.
    writeln!(w, "  function {}(s) {{", n.hex).unwrap();
    writeln!(w, "    var out = [];").unwrap();
    writeln!(
        w,
        "    for (var i = 0; i + 1 < s.length; i = i + 2) {{ out.push(parseInt(s.substring(i, i + 2), 16)); }}"
    )
    .unwrap();
    writeln!(w, "    return out;").unwrap();
    writeln!(w, "  }}").unwrap();

    // Repeating-key XOR.
    writeln!(w, "  function {}(bytes, key) {{", n.xors).unwrap();
    writeln!(w, "    var out = [];").unwrap();
    writeln!(
        w,
        "    for (var i = 0; i < bytes.length; i = i + 1) {{ out.push(bytes[i] ^ key[i % key.length]); }}"
    )
    .unwrap();
    writeln!(w, "    return out;").unwrap();
    writeln!(w, "  }}").unwrap();

    // String and byte-array conversions.
    writeln!(w, "  function {}(s) {{", n.str_bytes).unwrap();
    writeln!(
        w,
        "    var out = []; for (var i = 0; i < s.length; i = i + 1) {{ out.push(s.charCodeAt(i) & 255); }} return out;"
    )
    .unwrap();
    writeln!(w, "  }}").unwrap();
    writeln!(w, "  function {}(bytes) {{", n.bytes_str).unwrap();
    writeln!(
        w,
        "    var out = \"\"; for (var i = 0; i < bytes.length; i = i + 1) {{ out = out + String.fromCharCode(bytes[i]); }} return out;"
    )
    .unwrap();
    writeln!(w, "  }}").unwrap();

    // Constant access with transparent decode of wrapped strings.
    writeln!(w, "  var {} = {{}};", n.cache).unwrap();
    writeln!(w, "  function {}(k) {{", n.constant).unwrap();
    writeln!(w, "    if (k in {}) {{ return {}[k]; }}", n.cache, n.cache).unwrap();
    writeln!(w, "    var c = {}.pool[k];", n.program).unwrap();
    writeln!(w, "    var v = c;").unwrap();
    writeln!(
        w,
        "    if (c !== null && typeof c === \"object\" && c.tag === \"encoded\" && c.method === \"xor\") {{"
    )
    .unwrap();
    writeln!(
        w,
        "      v = {}({}({}(c.value), {}({}.poolKey)));",
        n.bytes_str, n.xors, n.b64, n.str_bytes, n.program
    )
    .unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "    {}[k] = v;", n.cache).unwrap();
    writeln!(w, "    return v;").unwrap();
    writeln!(w, "  }}").unwrap();
}

fn decrypt_fn(w: &mut String, n: &Names, cipher: CipherKind) {
    writeln!(w, "  function {}() {{", n.decrypt).unwrap();
    writeln!(w, "    var data = {}({}.data);", n.b64, n.program).unwrap();
    writeln!(w, "    var key = {}({}.key);", n.hex, n.program).unwrap();
    writeln!(w, "    var plain = null;").unwrap();
    if cipher == CipherKind::AesCbc {
        // Host block-cipher facility, probed by capability.
        writeln!(
            w,
            "    var g = (typeof globalThis !== \"undefined\") ? globalThis : {{}};"
        )
        .unwrap();
        writeln!(w, "    if (typeof g.decipher === \"function\") {{").unwrap();
        writeln!(w, "      try {{").unwrap();
        writeln!(
            w,
            "        plain = g.decipher({}.cipher, data, key, {}({}.iv));",
            n.program, n.hex, n.program
        )
        .unwrap();
        writeln!(w, "      }} catch (e) {{ plain = null; }}").unwrap();
        writeln!(w, "    }}").unwrap();
    }
    // XOR fallback, and the only path for the xor cipher id.
    writeln!(
        w,
        "    if (plain === null || plain.length !== {}.length) {{ plain = {}(data, key); }}",
        n.program, n.xors
    )
    .unwrap();
    writeln!(
        w,
        "    if (plain.length !== {}.length) {{ throw \"corrupted program\"; }}",
        n.program
    )
    .unwrap();
    writeln!(w, "    var out = [];").unwrap();
    writeln!(
        w,
        "    for (var i = 0; i < plain.length; i = i + 1) {{ if (plain[i] !== 255) {{ out.push(plain[i]); }} }}"
    )
    .unwrap();
    writeln!(w, "    return out;").unwrap();
    writeln!(w, "  }}").unwrap();
}

fn operator_helpers(w: &mut String, n: &Names) {
    writeln!(w, "  function {}(op, a, b) {{", n.binop).unwrap();
    writeln!(w, "    switch (op) {{").unwrap();
    for (spelling, expr) in [
        ("+", "a + b"),
        ("-", "a - b"),
        ("*", "a * b"),
        ("/", "a / b"),
        ("%", "a % b"),
        ("<<", "a << b"),
        (">>", "a >> b"),
        (">>>", "a >>> b"),
        ("&", "a & b"),
        ("|", "a | b"),
        ("^", "a ^ b"),
        ("==", "a == b"),
        ("!=", "a != b"),
        ("===", "a === b"),
        ("!==", "a !== b"),
        ("<", "a < b"),
        ("<=", "a <= b"),
        (">", "a > b"),
        (">=", "a >= b"),
        ("in", "a in b"),
        ("instanceof", "a instanceof b"),
    ] {
        writeln!(w, "      case \"{spelling}\": return {expr};").unwrap();
    }
    writeln!(w, "      default: throw \"bad operator\";").unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "  }}").unwrap();

    writeln!(w, "  function {}(op, a) {{", n.unop).unwrap();
    writeln!(w, "    switch (op) {{").unwrap();
    writeln!(w, "      case \"+\": return +a;").unwrap();
    writeln!(w, "      case \"-\": return -a;").unwrap();
    writeln!(w, "      case \"!\": return !a;").unwrap();
    writeln!(w, "      case \"~\": return ~a;").unwrap();
    writeln!(w, "      case \"typeof\": return typeof a;").unwrap();
    writeln!(w, "      case \"void\": return undefined;").unwrap();
    writeln!(w, "      case \"delete\": return true;").unwrap();
    writeln!(w, "      default: throw \"bad operator\";").unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "  }}").unwrap();

    writeln!(w, "  function {}(op, a, b) {{", n.logop).unwrap();
    writeln!(w, "    switch (op) {{").unwrap();
    writeln!(w, "      case \"&&\": return a ? b : a;").unwrap();
    writeln!(w, "      case \"||\": return a ? a : b;").unwrap();
    writeln!(
        w,
        "      case \"??\": return (a === null || a === undefined) ? b : a;"
    )
    .unwrap();
    writeln!(w, "      default: throw \"bad operator\";").unwrap();
    writeln!(w, "    }}").unwrap();
    writeln!(w, "  }}").unwrap();

    writeln!(w, "  function {}(C, args) {{", n.construct).unwrap();
    writeln!(w, "    var o = Object.create(C.prototype || Object.prototype);").unwrap();
    writeln!(w, "    var r = C.apply(o, args);").unwrap();
    writeln!(
        w,
        "    return (r !== null && typeof r === \"object\") ? r : o;"
    )
    .unwrap();
    writeln!(w, "  }}").unwrap();
}

fn interp_fn(w: &mut String, n: &Names, config: &Config) {
    writeln!(w, "  function {}() {{", n.interp).unwrap();
    writeln!(w, "    var {} = [];", n.stack).unwrap();
    writeln!(w, "    var {} = {{}};", n.scope).unwrap();
    writeln!(w, "    var {} = [];", n.call_stack).unwrap();
    writeln!(w, "    var {} = [];", n.try_blocks).unwrap();
    writeln!(w, "    var {} = 0;", n.pc).unwrap();
    writeln!(w, "    var {} = 0;", n.op_pc).unwrap();
    writeln!(w, "    var {} = 0;", n.steps).unwrap();
    writeln!(w, "    var {};", n.completion).unwrap();
    writeln!(w, "    var {} = undefined;", n.this_val).unwrap();
    writeln!(w, "    var {} = {}();", n.code, n.decrypt).unwrap();

    // Seed the scope with every protected intrinsic.
    writeln!(
        w,
        "    var g = (typeof globalThis !== \"undefined\") ? globalThis : {{}};"
    )
    .unwrap();
    let seed_list = PROTECTED_INTRINSICS
        .iter()
        .map(|name| format!("\"{name}\""))
        .collect::<Vec<_>>()
        .join(", ");
    writeln!(w, "    var seeds = [{seed_list}];").unwrap();
    writeln!(
        w,
        "    for (var i = 0; i < seeds.length; i = i + 1) {{ {}[seeds[i]] = g[seeds[i]]; }}",
        n.scope
    )
    .unwrap();

    handler_table(w, n);
    dispatch_loop(w, n, config);
    writeln!(w, "  }}").unwrap();
}

/// One handler per opcode, built once. Handlers receive their operand
/// bytes; a numeric return is a jump displacement, an object return ends
/// the frame.
fn handler_table(w: &mut String, n: &Names) {
    let push = |expr: &str| format!("{}.push({expr});", n.stack);
    let pop = format!("{}.pop()", n.stack);
    let peek = format!("{}[{}.length - 1]", n.stack, n.stack);
    let konst = |operand: &str| format!("{}({operand})", n.constant);

    writeln!(w, "    var {} = {{}};", n.handlers).unwrap();
    let mut handler = |opcode: u8, params: &str, body: Vec<String>| {
        writeln!(
            w,
            "    {}[{}] = function ({}) {{",
            n.handlers, opcode, params
        )
        .unwrap();
        for line in body {
            writeln!(w, "      {line}").unwrap();
        }
        writeln!(w, "    }};").unwrap();
    };

    handler(var::LOAD_CONST, "k", vec![push(&konst("k"))]);
    handler(
        var::LOAD_VAR,
        "k",
        vec![
            format!("var name = {};", konst("k")),
            format!(
                "if (!(name in {})) {{ throw \"undefined variable\"; }}",
                n.scope
            ),
            push(&format!("{}[name]", n.scope)),
        ],
    );
    handler(
        var::STORE_VAR,
        "k",
        vec![format!("{}[{}] = {};", n.scope, konst("k"), peek)],
    );
    handler(
        op::BINARY_OP,
        "k",
        vec![
            format!("var b = {pop};"),
            format!("var a = {pop};"),
            push(&format!("{}({}, a, b)", n.binop, konst("k"))),
        ],
    );
    handler(
        op::UNARY_OP,
        "k",
        vec![
            format!("var a = {pop};"),
            push(&format!("{}({}, a)", n.unop, konst("k"))),
        ],
    );
    handler(
        op::LOGICAL_OP,
        "k",
        vec![
            format!("var b = {pop};"),
            format!("var a = {pop};"),
            push(&format!("{}({}, a, b)", n.logop, konst("k"))),
        ],
    );
    handler(
        call::CALL_FUNCTION,
        "count",
        vec![
            format!("var args = {}.splice({}.length - count, count);", n.stack, n.stack),
            format!("var fn = {pop};"),
            format!("if (typeof fn !== \"function\") {{ throw \"not callable\"; }}"),
            push("fn.apply(undefined, args)"),
        ],
    );
    handler(
        call::NEW_INSTANCE,
        "count",
        vec![
            format!("var args = {}.splice({}.length - count, count);", n.stack, n.stack),
            format!("var fn = {pop};"),
            push(&format!("{}(fn, args)", n.construct)),
        ],
    );
    handler(
        call::RETURN,
        "",
        vec![
            format!("if ({}.length > 0) {{ {}.pop(); }}", n.call_stack, n.call_stack),
            format!("return {{ value: {pop} }};"),
        ],
    );
    handler(
        call::CREATE_FUNCTION,
        "k1, k2, k3",
        vec![
            format!("var params = {};", konst("k2")),
            format!("var body = {};", konst("k3")),
            push("Function.apply(null, params.concat([body]))"),
        ],
    );
    handler(jump::JUMP, "k", vec![format!("return {};", konst("k"))]);
    handler(
        jump::JUMP_IF_TRUE,
        "k",
        vec![
            format!("var c = {pop};"),
            format!("if (c) {{ return {}; }}", konst("k")),
        ],
    );
    handler(
        jump::JUMP_IF_FALSE,
        "k",
        vec![
            format!("var c = {pop};"),
            format!("if (!c) {{ return {}; }}", konst("k")),
        ],
    );
    handler(object::CREATE_OBJECT, "", vec![push("{}")]);
    handler(
        object::LOAD_PROPERTY,
        "k",
        vec![format!("var o = {pop};"), push(&format!("o[{}]", konst("k")))],
    );
    handler(
        object::STORE_PROPERTY,
        "k",
        vec![
            format!("var v = {pop};"),
            format!("var o = {pop};"),
            format!("o[{}] = v;", konst("k")),
            push("v"),
        ],
    );
    handler(object::CREATE_ARRAY, "", vec![push("[]")]);
    handler(
        object::ARRAY_PUSH,
        "",
        vec![
            format!("var v = {pop};"),
            format!("var arr = {pop};"),
            "arr.push(v);".to_string(),
            push("arr"),
        ],
    );
    handler(
        object::LOAD_INDEX,
        "",
        vec![
            format!("var i = {pop};"),
            format!("var o = {pop};"),
            push("o[i]"),
        ],
    );
    handler(
        object::STORE_INDEX,
        "",
        vec![
            format!("var v = {pop};"),
            format!("var i = {pop};"),
            format!("var o = {pop};"),
            "o[i] = v;".to_string(),
            push("v"),
        ],
    );
    handler(
        stk::POP,
        "",
        vec![format!("{} = {pop};", n.completion)],
    );
    handler(stk::DUPLICATE, "", vec![push(&peek)]);
    handler(stk::UNDEFINED, "", vec![push("undefined")]);
    handler(stk::NULL, "", vec![push("null")]);
    handler(stk::THIS, "", vec![push(&n.this_val)]);
    handler(
        exc::TRY_BEGIN,
        "k1, k2",
        vec![format!(
            "{}.push([{} + 1 + {}, {} + 1 + {}]);",
            n.try_blocks,
            n.op_pc,
            konst("k1"),
            n.op_pc,
            konst("k2")
        )],
    );
    handler(exc::TRY_END, "", vec![format!("{}.pop();", n.try_blocks)]);
    handler(
        exc::CATCH,
        "k",
        vec![format!("{}[{}] = {};", n.scope, konst("k"), peek)],
    );
    handler(exc::THROW, "", vec![format!("throw {pop};")]);
    handler(special::NOP, "", vec![]);
}

fn dispatch_loop(w: &mut String, n: &Names, config: &Config) {
    writeln!(w, "    while (true) {{").unwrap();
    if config.debug_protection {
        writeln!(
            w,
            "      {} = {} + 1;",
            n.steps, n.steps
        )
        .unwrap();
        writeln!(
            w,
            "      if ({} % 8192 === 0) {{ {}(); }}",
            n.steps, n.trap
        )
        .unwrap();
    }
    writeln!(w, "      {} = {};", n.op_pc, n.pc).unwrap();
    writeln!(w, "      var opByte = {}[{}];", n.code, n.pc).unwrap();
    writeln!(w, "      {} = {} + 1;", n.pc, n.pc).unwrap();
    writeln!(w, "      var width = {}[opByte];", n.widths).unwrap();
    writeln!(w, "      if (width === undefined) {{ throw \"bad opcode\"; }}").unwrap();
    writeln!(w, "      var a0; var a1; var a2;").unwrap();
    writeln!(w, "      if (width > 0) {{ a0 = {}[{}]; }}", n.code, n.pc).unwrap();
    writeln!(w, "      if (width > 1) {{ a1 = {}[{} + 1]; }}", n.code, n.pc).unwrap();
    writeln!(w, "      if (width > 2) {{ a2 = {}[{} + 2]; }}", n.code, n.pc).unwrap();
    writeln!(w, "      {} = {} + width;", n.pc, n.pc).unwrap();
    writeln!(w, "      var h = {}[opByte];", n.handlers).unwrap();
    writeln!(w, "      var r;").unwrap();
    writeln!(w, "      try {{").unwrap();
    writeln!(w, "        r = h(a0, a1, a2);").unwrap();
    writeln!(w, "      }} catch (e) {{").unwrap();
    writeln!(w, "        if ({}.length > 0) {{", n.try_blocks).unwrap();
    writeln!(w, "          var frame = {}.pop();", n.try_blocks).unwrap();
    writeln!(w, "          {}.push(e);", n.stack).unwrap();
    writeln!(w, "          {} = frame[0];", n.pc).unwrap();
    writeln!(w, "          continue;").unwrap();
    writeln!(w, "        }}").unwrap();
    writeln!(w, "        throw e;").unwrap();
    writeln!(w, "      }}").unwrap();
    writeln!(w, "      if (r !== undefined) {{").unwrap();
    writeln!(w, "        if (typeof r === \"number\") {{").unwrap();
    writeln!(w, "          {} = {} + r - 1;", n.pc, n.pc).unwrap();
    writeln!(w, "        }} else {{").unwrap();
    writeln!(
        w,
        "          return r.value === undefined ? {} : r.value;",
        n.completion
    )
    .unwrap();
    writeln!(w, "        }}").unwrap();
    writeln!(w, "      }}").unwrap();
    writeln!(w, "    }}").unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameManager;
    use crate::pool::Const;

    fn sample_program() -> Program {
        Program {
            ciphertext: vec![1, 2, 3, 4],
            iv: [7; 16],
            key: [9; 32],
            cipher: CipherKind::AesCbc,
            plain_len: 4,
            pool: vec![Const::Number(1.0), Const::Name("x".into())],
            pool_key: Some("k3y".into()),
        }
    }

    fn emit_default() -> EmittedInterpreter {
        let mut names = NameManager::with_seed(10, 42);
        emit(&sample_program(), &Config::default(), &mut names)
    }

    #[test]
    fn emission_embeds_the_sealed_program() {
        let emitted = emit_default();
        assert!(emitted.source.contains("\"cipher\":\"aes-256-cbc\""));
        assert!(emitted.source.contains("\"data\":\"AQIDBA==\""));
    }

    #[test]
    fn emission_seeds_every_protected_intrinsic() {
        let emitted = emit_default();
        for name in PROTECTED_INTRINSICS {
            assert!(
                emitted.source.contains(&format!("\"{name}\"")),
                "seed list is missing {name}"
            );
        }
    }

    #[test]
    fn two_emissions_are_lexically_distinct() {
        let mut a = NameManager::with_seed(10, 1);
        let mut b = NameManager::with_seed(10, 2);
        let ea = emit(&sample_program(), &Config::default(), &mut a);
        let eb = emit(&sample_program(), &Config::default(), &mut b);
        assert_ne!(ea.source, eb.source);
        assert_ne!(ea.interp_name, eb.interp_name);
    }

    #[test]
    fn vm_name_override_is_honored() {
        let mut names = NameManager::with_seed(10, 5);
        let config = Config {
            vm_name: Some("runner".to_string()),
            ..Config::default()
        };
        let emitted = emit(&sample_program(), &config, &mut names);
        assert!(emitted.source.starts_with("var runner = (function () {"));
        assert_eq!(emitted.vm_name, "runner");
    }

    #[test]
    fn protection_flags_gate_their_sections() {
        let mut names = NameManager::with_seed(10, 6);
        let bare = Config {
            self_defending: false,
            debug_protection: false,
            ..Config::default()
        };
        let emitted = emit(&sample_program(), &bare, &mut names);
        assert!(!emitted.source.contains("setInterval"));
        assert!(!emitted.source.contains(DIGEST_SENTINEL));
        assert!(!emitted.has_digest);

        let mut names = NameManager::with_seed(10, 7);
        let armed = Config::default();
        let emitted = emit(&sample_program(), &armed, &mut names);
        assert!(emitted.source.contains("setInterval"));
        assert!(emitted.source.contains(DIGEST_SENTINEL));
        assert!(emitted.has_digest);
    }

    #[test]
    fn braces_balance_in_the_emitted_unit() {
        let emitted = emit_default();
        let mut depth = 0i64;
        let mut in_str: Option<char> = None;
        let mut prev = '\0';
        for ch in emitted.source.chars() {
            match in_str {
                Some(q) => {
                    if ch == q && prev != '\\' {
                        in_str = None;
                    }
                }
                None => match ch {
                    '"' | '\'' => in_str = Some(ch),
                    '{' => depth += 1,
                    '}' => depth -= 1,
                    _ => {}
                },
            }
            prev = ch;
        }
        assert_eq!(depth, 0, "unbalanced braces in emitted source");
    }

    #[test]
    fn handler_table_covers_every_opcode() {
        let emitted = emit_default();
        for byte in 0u8..=0xFF {
            if opcodes::operand_count(byte).is_some() {
                // NOP shares the padding byte and is filtered before
                // dispatch, but still gets a handler.
                assert!(
                    emitted.source.contains(&format!("[{byte}] = function")),
                    "no handler for opcode {byte:#04x}"
                );
            }
        }
    }
}
