//! Branches, loops, switch, and short-circuit logical lowering.
//!
//! Everything here is built from the three jump primitives. Loop and switch
//! bodies run inside a flow context so `break` and `continue` can resolve
//! their targets.

use super::{FlowCtx, Lowerer};
use crate::ast::{Expr, ForInit, Stmt, SwitchCase};
use crate::error::CompileError;
use crate::opcodes::{jump, op, stack};
use crate::pool::Const;

impl Lowerer {
    pub(crate) fn lower_if(
        &mut self,
        test: &Expr,
        cons: &Stmt,
        alt: Option<&Stmt>,
    ) -> Result<(), CompileError> {
        let else_label = self.unique_label("if_else");
        self.lower_expr(test)?;
        self.emit_jump(jump::JUMP_IF_FALSE, &else_label);
        self.lower_stmt(cons)?;
        match alt {
            Some(alt) => {
                let end_label = self.unique_label("if_end");
                self.emit_jump(jump::JUMP, &end_label);
                self.mark_label(&else_label);
                self.lower_stmt(alt)?;
                self.mark_label(&end_label);
            }
            None => self.mark_label(&else_label),
        }
        Ok(())
    }

    pub(crate) fn lower_ternary(
        &mut self,
        test: &Expr,
        cons: &Expr,
        alt: &Expr,
    ) -> Result<(), CompileError> {
        let alt_label = self.unique_label("tern_alt");
        let end_label = self.unique_label("tern_end");
        self.lower_expr(test)?;
        self.emit_jump(jump::JUMP_IF_FALSE, &alt_label);
        self.lower_expr(cons)?;
        self.emit_jump(jump::JUMP, &end_label);
        self.mark_label(&alt_label);
        self.lower_expr(alt)?;
        self.mark_label(&end_label);
        Ok(())
    }

    pub(crate) fn lower_while(&mut self, test: &Expr, body: &Stmt) -> Result<(), CompileError> {
        let test_label = self.unique_label("while_test");
        let end_label = self.unique_label("while_end");

        self.mark_label(&test_label);
        self.lower_expr(test)?;
        self.emit_jump(jump::JUMP_IF_FALSE, &end_label);

        self.flow_stack.push(FlowCtx {
            break_label: end_label.clone(),
            continue_label: Some(test_label.clone()),
        });
        self.lower_stmt(body)?;
        self.flow_stack.pop();

        self.emit_jump(jump::JUMP, &test_label);
        self.mark_label(&end_label);
        Ok(())
    }

    pub(crate) fn lower_do_while(&mut self, body: &Stmt, test: &Expr) -> Result<(), CompileError> {
        let body_label = self.unique_label("do_body");
        let test_label = self.unique_label("do_test");
        let end_label = self.unique_label("do_end");

        self.mark_label(&body_label);
        self.flow_stack.push(FlowCtx {
            break_label: end_label.clone(),
            continue_label: Some(test_label.clone()),
        });
        self.lower_stmt(body)?;
        self.flow_stack.pop();

        self.mark_label(&test_label);
        self.lower_expr(test)?;
        self.emit_jump(jump::JUMP_IF_TRUE, &body_label);
        self.mark_label(&end_label);
        Ok(())
    }

    pub(crate) fn lower_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<(), CompileError> {
        match init {
            Some(ForInit::Decl(decls)) => self.lower_stmt(&Stmt::VarDecl(decls.clone()))?,
            Some(ForInit::Expr(expr)) => {
                self.lower_expr(expr)?;
                self.emit_op(stack::POP);
            }
            None => {}
        }

        let test_label = self.unique_label("for_test");
        let continue_label = self.unique_label("for_continue");
        let end_label = self.unique_label("for_end");

        self.mark_label(&test_label);
        if let Some(test) = test {
            self.lower_expr(test)?;
            self.emit_jump(jump::JUMP_IF_FALSE, &end_label);
        }

        self.flow_stack.push(FlowCtx {
            break_label: end_label.clone(),
            continue_label: Some(continue_label.clone()),
        });
        self.lower_stmt(body)?;
        self.flow_stack.pop();

        self.mark_label(&continue_label);
        if let Some(update) = update {
            self.lower_expr(update)?;
            self.emit_op(stack::POP);
        }
        self.emit_jump(jump::JUMP, &test_label);
        self.mark_label(&end_label);
        Ok(())
    }

    /// Evaluate the discriminant once, test each arm with strict equality,
    /// and fall through bodies in source order. The discriminant stays on
    /// the stack for the whole statement and is popped at the end label,
    /// which is also where `break` lands.
    pub(crate) fn lower_switch(
        &mut self,
        disc: &Expr,
        cases: &[SwitchCase],
    ) -> Result<(), CompileError> {
        let end_label = self.unique_label("switch_end");
        let body_labels: Vec<String> = (0..cases.len())
            .map(|_| self.unique_label("switch_case"))
            .collect();

        self.lower_expr(disc)?;
        let mut default_label: Option<&String> = None;
        for (case, label) in cases.iter().zip(&body_labels) {
            match &case.test {
                Some(test) => {
                    self.emit_op(stack::DUPLICATE);
                    self.lower_expr(test)?;
                    self.emit_with_const(op::BINARY_OP, Const::Name("===".to_string()))?;
                    self.emit_jump(jump::JUMP_IF_TRUE, label);
                }
                None => default_label = Some(label),
            }
        }
        match default_label {
            Some(label) => self.emit_jump(jump::JUMP, label),
            None => self.emit_jump(jump::JUMP, &end_label),
        }

        self.flow_stack.push(FlowCtx {
            break_label: end_label.clone(),
            continue_label: None,
        });
        for (case, label) in cases.iter().zip(&body_labels) {
            self.mark_label(label);
            for stmt in &case.body {
                self.lower_stmt(stmt)?;
            }
        }
        self.flow_stack.pop();

        self.mark_label(&end_label);
        self.emit_op(stack::POP);
        Ok(())
    }

    /// Short-circuit lowering: the right operand sits behind a conditional
    /// jump and is only evaluated when the left operand does not decide the
    /// result.
    ///
    /// ```text
    /// a && b:   E[a]; DUP; JUMP_IF_FALSE ->end; POP; E[b]; end:
    /// a || b:   E[a]; DUP; JUMP_IF_TRUE  ->end; POP; E[b]; end:
    /// a ?? b:   E[a]; DUP; NULL; BINARY_OP(==); JUMP_IF_FALSE ->end; POP; E[b]; end:
    /// ```
    pub(crate) fn lower_logical(
        &mut self,
        spelling: &str,
        lhs: &Expr,
        rhs: &Expr,
    ) -> Result<(), CompileError> {
        let end_label = self.unique_label("logic_end");
        self.lower_expr(lhs)?;
        self.emit_op(stack::DUPLICATE);
        match spelling {
            "&&" => self.emit_jump(jump::JUMP_IF_FALSE, &end_label),
            "||" => self.emit_jump(jump::JUMP_IF_TRUE, &end_label),
            "??" => {
                // Loose equality against null also covers undefined.
                self.emit_op(stack::NULL);
                self.emit_with_const(op::BINARY_OP, Const::Name("==".to_string()))?;
                self.emit_jump(jump::JUMP_IF_FALSE, &end_label);
            }
            _ => return Err(CompileError::UnsupportedNode("LogicalOperator")),
        }
        self.emit_op(stack::POP);
        self.lower_expr(rhs)?;
        self.mark_label(&end_label);
        Ok(())
    }

    pub(crate) fn lower_break(&mut self) -> Result<(), CompileError> {
        let idx = self
            .flow_stack
            .len()
            .checked_sub(1)
            .ok_or(CompileError::UnsupportedNode("BreakOutsideLoop"))?;
        let label = self.flow_stack[idx].break_label.clone();
        // Try regions entered inside the target construct are left here;
        // pop their frames and run their finalizers first.
        self.unwind_escaping_regions(idx)?;
        self.emit_jump(jump::JUMP, &label);
        Ok(())
    }

    pub(crate) fn lower_continue(&mut self) -> Result<(), CompileError> {
        let idx = self
            .flow_stack
            .iter()
            .rposition(|ctx| ctx.continue_label.is_some())
            .ok_or(CompileError::UnsupportedNode("ContinueOutsideLoop"))?;
        let label = self.flow_stack[idx]
            .continue_label
            .clone()
            .expect("context at idx has a continue label");
        self.unwind_escaping_regions(idx)?;
        // Every switch context skipped over still owns its discriminant slot.
        let skipped = self.flow_stack.len() - 1 - idx;
        for _ in 0..skipped {
            self.emit_op(stack::POP);
        }
        self.emit_jump(jump::JUMP, &label);
        Ok(())
    }
}
