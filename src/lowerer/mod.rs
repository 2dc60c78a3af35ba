//! AST to bytecode lowering.
//!
//! Single-pass recursive emission into a flat byte vector plus a
//! deduplicated constant pool. Jumps are emitted with a placeholder operand
//! and patched at finalization: the operand is rewritten to index a pool
//! constant holding the signed displacement `target - (jump_pc + 1)`.
//!
//! Module structure:
//! - mod.rs: lowerer state, labels, fixups, finalization
//! - emit.rs: byte and constant emission helpers
//! - expr.rs: expression lowering
//! - stmt.rs: statement lowering
//! - control.rs: branches, loops, switch, short-circuit logic

mod control;
mod emit;
mod expr;
mod stmt;

use std::collections::HashMap;

use crate::ast::Stmt;
use crate::error::CompileError;
use crate::opcodes::{call, exc, stack};
use crate::pool::{Const, ConstPool};

/// What to do when a node kind cannot be lowered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnsupportedPolicy {
    /// Abort emission.
    #[default]
    Strict,
    /// Emit a diagnostic and an `UNDEFINED` placeholder.
    Lossy,
}

/// Result of lowering: the plaintext instruction stream and its pool.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub code: Vec<u8>,
    pub pool: ConstPool,
}

/// A jump operand awaiting its displacement constant.
#[derive(Debug)]
struct Fixup {
    /// Byte position of the placeholder operand.
    operand_pos: usize,
    /// Byte position of the jump opcode itself.
    opcode_pc: usize,
    label: String,
}

/// An enclosing loop or switch, for `break`/`continue` resolution.
#[derive(Debug, Clone)]
pub(crate) struct FlowCtx {
    pub break_label: String,
    /// `None` for switch contexts, which `continue` skips over.
    pub continue_label: Option<String>,
}

/// A try region the lowerer is currently inside. `return`, `break`, and
/// `continue` leave such regions without reaching their `TRY_END`, so the
/// early exit must splice in the frame pop and the pending finalizer.
#[derive(Debug, Clone)]
pub(crate) struct TryCtx {
    /// Finalizer body, re-lowered at every early exit that escapes it.
    pub finalizer: Option<Vec<Stmt>>,
    /// `flow_stack` depth when the region was entered; an exit targeting a
    /// context below this depth leaves the region.
    pub flow_depth: usize,
    /// Whether the runtime try frame is still pushed. False inside a bare
    /// catch handler, where the unwinder already popped it.
    pub frame_live: bool,
}

pub struct Lowerer {
    pub(crate) code: Vec<u8>,
    pub(crate) pool: ConstPool,
    labels: HashMap<String, usize>,
    fixups: Vec<Fixup>,
    label_counter: usize,
    pub(crate) flow_stack: Vec<FlowCtx>,
    pub(crate) try_stack: Vec<TryCtx>,
    pub(crate) policy: UnsupportedPolicy,
    pub(crate) last_opcode: Option<u8>,
}

/// Lower a parsed program.
pub fn lower(program: &[Stmt], policy: UnsupportedPolicy) -> Result<LoweredProgram, CompileError> {
    let mut lowerer = Lowerer::new(policy);
    for stmt in program {
        lowerer.lower_stmt(stmt)?;
    }
    lowerer.finalize()
}

impl Lowerer {
    pub fn new(policy: UnsupportedPolicy) -> Self {
        Self {
            code: Vec::new(),
            pool: ConstPool::new(),
            labels: HashMap::new(),
            fixups: Vec::new(),
            label_counter: 0,
            flow_stack: Vec::new(),
            try_stack: Vec::new(),
            policy,
            last_opcode: None,
        }
    }

    /// Current bytecode position.
    pub(crate) fn pos(&self) -> usize {
        self.code.len()
    }

    /// Generate a unique label.
    pub(crate) fn unique_label(&mut self, prefix: &str) -> String {
        let label = format!("{}_{}", prefix, self.label_counter);
        self.label_counter += 1;
        label
    }

    /// Mark the current position as a jump target.
    pub(crate) fn mark_label(&mut self, name: &str) {
        self.labels.insert(name.to_string(), self.pos());
    }

    pub(crate) fn record_fixup(&mut self, operand_pos: usize, opcode_pc: usize, label: &str) {
        self.fixups.push(Fixup {
            operand_pos,
            opcode_pc,
            label: label.to_string(),
        });
    }

    /// Terminate, patch every pending jump, and seal the program.
    pub fn finalize(mut self) -> Result<LoweredProgram, CompileError> {
        if self.last_opcode != Some(call::RETURN) {
            self.emit_op(stack::UNDEFINED);
            self.emit_op(call::RETURN);
        }

        for fixup in std::mem::take(&mut self.fixups) {
            let target = *self
                .labels
                .get(&fixup.label)
                .unwrap_or_else(|| panic!("unresolved label {}", fixup.label));
            let displacement = target as i64 - (fixup.opcode_pc as i64 + 1);
            if displacement < i64::from(i32::MIN) || displacement > i64::from(i32::MAX) {
                return Err(CompileError::JumpTooFar(displacement));
            }
            let idx = self.pool.insert(Const::Offset(displacement as i32))?;
            self.code[fixup.operand_pos] = idx;
        }

        Ok(LoweredProgram {
            code: self.code,
            pool: self.pool,
        })
    }

    /// Emit the cleanup an early exit owes the try regions it escapes:
    /// innermost first, pop the live frame and re-lower the finalizer.
    /// Entries below `keep` stay untouched. The lexical stack is restored
    /// afterwards, since lowering continues inside the regions.
    pub(crate) fn unwind_try_regions(&mut self, keep: usize) -> Result<(), CompileError> {
        let mut unwound = Vec::new();
        while self.try_stack.len() > keep {
            let ctx = self.try_stack.pop().expect("length checked above");
            if ctx.frame_live {
                self.emit_op(exc::TRY_END);
            }
            if let Some(finalizer) = &ctx.finalizer {
                for stmt in finalizer {
                    self.lower_stmt(stmt)?;
                }
            }
            unwound.push(ctx);
        }
        while let Some(ctx) = unwound.pop() {
            self.try_stack.push(ctx);
        }
        Ok(())
    }

    /// Unwind every try region entered inside the flow context at
    /// `target_idx`; regions enclosing that context are not left.
    pub(crate) fn unwind_escaping_regions(&mut self, target_idx: usize) -> Result<(), CompileError> {
        let keep = self
            .try_stack
            .iter()
            .position(|ctx| ctx.flow_depth > target_idx)
            .unwrap_or(self.try_stack.len());
        self.unwind_try_regions(keep)
    }

    /// Policy-driven handling of a node the lowerer cannot translate.
    /// In lossy mode the placeholder is stack-neutral at statement level.
    pub(crate) fn unsupported_stmt(&mut self, kind: &'static str) -> Result<(), CompileError> {
        match self.policy {
            UnsupportedPolicy::Strict => Err(CompileError::UnsupportedNode(kind)),
            UnsupportedPolicy::Lossy => {
                tracing::warn!(kind, "dropping unsupported node, emitting placeholder");
                self.emit_op(stack::UNDEFINED);
                self.emit_op(stack::POP);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{self, exc, jump, object, op, var};
    use crate::parser::parse;

    fn lower_src(src: &str) -> LoweredProgram {
        lower(&parse(src).unwrap(), UnsupportedPolicy::Strict).unwrap()
    }

    /// Decode (opcode, operand bytes) pairs using the shared width table.
    fn decode(code: &[u8]) -> Vec<(u8, Vec<u8>)> {
        let mut out = Vec::new();
        let mut pc = 0;
        while pc < code.len() {
            let opcode = code[pc];
            pc += 1;
            let width = opcodes::operand_count(opcode).expect("unknown opcode in stream");
            out.push((opcode, code[pc..pc + width].to_vec()));
            pc += width;
        }
        out
    }

    #[test]
    fn arithmetic_lowering_matches_the_reference_trace() {
        let program = lower_src("1 + 2 * 3;");
        let ops: Vec<&str> = decode(&program.code)
            .iter()
            .map(|(op, _)| opcodes::mnemonic(*op))
            .collect();
        assert_eq!(
            ops,
            vec![
                "LOAD_CONST",
                "LOAD_CONST",
                "LOAD_CONST",
                "BINARY_OP",
                "BINARY_OP",
                "POP",
                "UNDEFINED",
                "RETURN",
            ]
        );
    }

    #[test]
    fn terminator_is_appended_once() {
        let program = lower_src("1;");
        let tail: Vec<u8> = program.code[program.code.len() - 2..].to_vec();
        assert_eq!(tail, vec![stack::UNDEFINED, call::RETURN]);

        let explicit = lower_src("return 5;");
        let ops = decode(&explicit.code);
        assert_eq!(ops.last().unwrap().0, call::RETURN);
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn jump_patching_lands_on_the_label() {
        let program = lower_src("if (1 < 2) { 1 } else { 2 }");
        let instrs = decode(&program.code);

        // Exactly one conditional forward jump and one unconditional one.
        let jifs: Vec<_> = instrs
            .iter()
            .filter(|(op, _)| *op == jump::JUMP_IF_FALSE)
            .collect();
        let jumps: Vec<_> = instrs.iter().filter(|(op, _)| *op == jump::JUMP).collect();
        assert_eq!(jifs.len(), 1);
        assert_eq!(jumps.len(), 1);

        // Walk the stream to verify each displacement lands on an
        // instruction boundary.
        let mut pc = 0;
        let mut boundaries = std::collections::HashSet::new();
        while pc < program.code.len() {
            boundaries.insert(pc);
            let width = opcodes::operand_count(program.code[pc]).unwrap();
            pc += 1 + width;
        }
        let mut pc = 0;
        while pc < program.code.len() {
            let opcode = program.code[pc];
            let width = opcodes::operand_count(opcode).unwrap();
            if matches!(opcode, jump::JUMP | jump::JUMP_IF_TRUE | jump::JUMP_IF_FALSE) {
                let idx = program.code[pc + 1];
                let displacement = program.pool.get(idx).unwrap().as_offset().unwrap();
                let target = (pc as i64 + 1 + displacement as i64) as usize;
                assert!(
                    boundaries.contains(&target),
                    "jump at {pc} lands inside an instruction"
                );
            }
            pc += 1 + width;
        }
    }

    #[test]
    fn every_operand_indexes_inside_the_pool() {
        let program =
            lower_src("var o = { a: 1 }; var f = function (x) { return x; }; f(o.a, [2]);");
        for (opcode, operands) in decode(&program.code) {
            if matches!(opcode, call::CALL_FUNCTION | call::NEW_INSTANCE) {
                continue; // raw arity byte
            }
            for byte in operands {
                assert!(
                    (byte as usize) < program.pool.len(),
                    "operand {byte} of {} out of range",
                    opcodes::mnemonic(opcode)
                );
            }
        }
    }

    #[test]
    fn object_literals_follow_the_dup_store_pop_shape() {
        let program = lower_src("var o = { a: 1, b: 2 };");
        let ops: Vec<u8> = decode(&program.code).iter().map(|(op, _)| *op).collect();
        let expected = [
            object::CREATE_OBJECT,
            stack::DUPLICATE,
            var::LOAD_CONST,
            object::STORE_PROPERTY,
            stack::POP,
            stack::DUPLICATE,
            var::LOAD_CONST,
            object::STORE_PROPERTY,
            stack::POP,
            var::STORE_VAR,
            stack::POP,
        ];
        assert_eq!(&ops[..expected.len()], &expected);
    }

    #[test]
    fn strict_mode_rejects_for_in() {
        let err = lower(
            &parse("for (k in o) {}").unwrap(),
            UnsupportedPolicy::Strict,
        );
        assert!(matches!(err, Err(CompileError::UnsupportedNode(_))));
    }

    #[test]
    fn lossy_mode_emits_a_neutral_placeholder() {
        let program = lower(&parse("for (k in o) {}").unwrap(), UnsupportedPolicy::Lossy).unwrap();
        let ops: Vec<u8> = decode(&program.code).iter().map(|(op, _)| *op).collect();
        assert_eq!(
            ops,
            vec![stack::UNDEFINED, stack::POP, stack::UNDEFINED, call::RETURN]
        );
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let err = lower(&parse("break;").unwrap(), UnsupportedPolicy::Strict);
        assert!(matches!(err, Err(CompileError::UnsupportedNode(_))));
    }

    #[test]
    fn a_break_leaving_a_try_pops_the_frame_and_runs_the_finalizer() {
        let program = lower_src("while (true) { try { break; } finally { 0; } }");
        let ops: Vec<u8> = decode(&program.code).iter().map(|(op, _)| *op).collect();
        // One TRY_END on the early-exit path, one on the normal path.
        let try_ends = ops.iter().filter(|&&o| o == exc::TRY_END).count();
        assert_eq!(try_ends, 2);
        // The break's unwind comes before its jump: the first TRY_END
        // precedes the first JUMP.
        let first_end = ops.iter().position(|&o| o == exc::TRY_END).unwrap();
        let first_jump = ops.iter().position(|&o| o == jump::JUMP).unwrap();
        assert!(first_end < first_jump);
    }

    #[test]
    fn a_return_leaving_a_try_pops_the_frame_before_returning() {
        let program = lower_src("try { return 1; } finally { 2; }");
        let ops: Vec<u8> = decode(&program.code).iter().map(|(op, _)| *op).collect();
        let try_ends = ops.iter().filter(|&&o| o == exc::TRY_END).count();
        assert_eq!(try_ends, 2);
        let first_end = ops.iter().position(|&o| o == exc::TRY_END).unwrap();
        let first_return = ops.iter().position(|&o| o == call::RETURN).unwrap();
        assert!(first_end < first_return);
    }

    #[test]
    fn a_break_staying_inside_a_try_leaves_the_frame_alone() {
        let program = lower_src("try { while (true) { break; } } finally { 0; }");
        let ops: Vec<u8> = decode(&program.code).iter().map(|(op, _)| *op).collect();
        // Only the normal-completion TRY_END: the break never exits the
        // try region.
        let try_ends = ops.iter().filter(|&&o| o == exc::TRY_END).count();
        assert_eq!(try_ends, 1);
    }

    #[test]
    fn logical_lowering_short_circuits() {
        // No LOGICAL_OP in the stream; the rhs sits behind a conditional jump.
        let program = lower_src("a && b;");
        let ops: Vec<u8> = decode(&program.code).iter().map(|(opc, _)| *opc).collect();
        assert!(!ops.contains(&op::LOGICAL_OP));
        assert!(ops.contains(&jump::JUMP_IF_FALSE));
        assert!(ops.contains(&stack::DUPLICATE));
    }
}
