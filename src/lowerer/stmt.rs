//! Statement lowering.
//!
//! Statements are stack-neutral: whatever an inner expression pushes is
//! consumed before the statement ends.

use super::{Lowerer, TryCtx};
use crate::ast::Stmt;
use crate::error::CompileError;
use crate::opcodes::{call, exc, jump, stack, var};
use crate::pool::Const;

impl Lowerer {
    pub(crate) fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Expr(expr) => {
                self.lower_expr(expr)?;
                self.emit_op(stack::POP);
                Ok(())
            }
            Stmt::VarDecl(decls) => {
                for (name, init) in decls {
                    match init {
                        Some(init) => self.lower_expr(init)?,
                        None => self.emit_op(stack::UNDEFINED),
                    }
                    self.emit_with_const(var::STORE_VAR, Const::Name(name.clone()))?;
                    self.emit_op(stack::POP);
                }
                Ok(())
            }
            Stmt::FunctionDecl(func) => {
                let name = func.name.clone().expect("function declarations are named");
                self.lower_function_literal(func)?;
                self.emit_with_const(var::STORE_VAR, Const::Name(name))?;
                self.emit_op(stack::POP);
                Ok(())
            }
            Stmt::Return(value) => {
                match value {
                    Some(value) => self.lower_expr(value)?,
                    None => self.emit_op(stack::UNDEFINED),
                }
                // The return value rides the stack while the pending
                // finalizers run; they are statement sequences and leave
                // it untouched.
                self.unwind_try_regions(0)?;
                self.emit_op(call::RETURN);
                Ok(())
            }
            Stmt::If { test, cons, alt } => self.lower_if(test, cons, alt.as_deref()),
            Stmt::While { test, body } => self.lower_while(test, body),
            Stmt::DoWhile { body, test } => self.lower_do_while(body, test),
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.lower_for(init.as_ref(), test.as_ref(), update.as_ref(), body),
            Stmt::Switch { disc, cases } => self.lower_switch(disc, cases),
            Stmt::Block(body) => {
                for stmt in body {
                    self.lower_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::Break => self.lower_break(),
            Stmt::Continue => self.lower_continue(),
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => self.lower_try(block, handler.as_ref(), finalizer.as_deref()),
            Stmt::Throw(value) => {
                self.lower_expr(value)?;
                self.emit_op(exc::THROW);
                Ok(())
            }
            Stmt::Empty => Ok(()),
            Stmt::ForIn { .. } => self.unsupported_stmt(stmt.kind()),
        }
    }

    /// Try/catch/finally protocol:
    ///
    /// ```text
    /// TRY_BEGIN  ->catch ->finally
    ///   <block>
    /// TRY_END
    /// JUMP ->finally
    /// catch:                      ; unwinder pushed the exception
    ///   CATCH k ; POP                 (with a catch clause)
    ///   TRY_BEGIN ->rethrow ->finally ; guards the handler body
    ///     <handler>
    ///   TRY_END
    ///   JUMP ->finally
    /// rethrow:
    ///   <finalizer> ; THROW
    /// finally:
    ///   <finalizer>
    /// ```
    ///
    /// The unwinder pops the try frame before transferring to `catch`. The
    /// guard region around the handler body (present only with a
    /// finalizer) makes a throw from inside the handler run this
    /// statement's finalizer before propagating; the finally-only form
    /// rethrows the same way. While the block or guarded handler is being
    /// lowered, the region sits on `try_stack` so that `return`, `break`,
    /// and `continue` leaving it splice in `TRY_END` and the finalizer.
    fn lower_try(
        &mut self,
        block: &[Stmt],
        handler: Option<&(String, Vec<Stmt>)>,
        finalizer: Option<&[Stmt]>,
    ) -> Result<(), CompileError> {
        let catch_label = self.unique_label("catch");
        let finally_label = self.unique_label("finally");

        self.emit_try_begin(&catch_label, &finally_label);
        self.try_stack.push(TryCtx {
            finalizer: finalizer.map(|body| body.to_vec()),
            flow_depth: self.flow_stack.len(),
            frame_live: true,
        });
        for stmt in block {
            self.lower_stmt(stmt)?;
        }
        self.try_stack.pop();
        self.emit_op(exc::TRY_END);
        self.emit_jump(jump::JUMP, &finally_label);

        self.mark_label(&catch_label);
        match handler {
            Some((binding, body)) => {
                self.emit_with_const(exc::CATCH, Const::Name(binding.clone()))?;
                self.emit_op(stack::POP);
                match finalizer {
                    Some(final_body) => {
                        let rethrow_label = self.unique_label("rethrow");
                        self.emit_try_begin(&rethrow_label, &finally_label);
                        self.try_stack.push(TryCtx {
                            finalizer: Some(final_body.to_vec()),
                            flow_depth: self.flow_stack.len(),
                            frame_live: true,
                        });
                        for stmt in body {
                            self.lower_stmt(stmt)?;
                        }
                        self.try_stack.pop();
                        self.emit_op(exc::TRY_END);
                        self.emit_jump(jump::JUMP, &finally_label);

                        self.mark_label(&rethrow_label);
                        for stmt in final_body {
                            self.lower_stmt(stmt)?;
                        }
                        self.emit_op(exc::THROW);
                    }
                    None => {
                        for stmt in body {
                            self.lower_stmt(stmt)?;
                        }
                        // Falls through past the empty finally label.
                    }
                }
            }
            None => {
                // Finally-only form: run the finalizer, then rethrow the
                // exception still sitting on the stack.
                if let Some(body) = finalizer {
                    for stmt in body {
                        self.lower_stmt(stmt)?;
                    }
                }
                self.emit_op(exc::THROW);
            }
        }

        self.mark_label(&finally_label);
        if let Some(body) = finalizer {
            for stmt in body {
                self.lower_stmt(stmt)?;
            }
        }
        Ok(())
    }
}
