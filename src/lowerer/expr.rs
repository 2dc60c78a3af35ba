//! Expression lowering.
//!
//! Evaluation order is left-then-right throughout. Store opcodes leave the
//! stored value on the stack, so assignment expressions need no duplication
//! to produce their value.

use super::Lowerer;
use crate::ast::{Expr, FunctionLit};
use crate::error::CompileError;
use crate::opcodes::{call, object, op, stack, var};
use crate::pool::Const;

impl Lowerer {
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        match expr {
            Expr::Number(n) => self.emit_with_const(var::LOAD_CONST, Const::Number(*n)),
            Expr::Str(s) => self.emit_with_const(var::LOAD_CONST, Const::Str(s.clone())),
            Expr::Bool(b) => self.emit_with_const(var::LOAD_CONST, Const::Bool(*b)),
            Expr::Null => {
                self.emit_op(stack::NULL);
                Ok(())
            }
            Expr::Undefined => {
                self.emit_op(stack::UNDEFINED);
                Ok(())
            }
            Expr::This => {
                self.emit_op(stack::THIS);
                Ok(())
            }
            Expr::Ident(name) => self.emit_with_const(var::LOAD_VAR, Const::Name(name.clone())),
            Expr::Binary { op: spelling, lhs, rhs } => {
                self.lower_expr(lhs)?;
                self.lower_expr(rhs)?;
                self.emit_with_const(op::BINARY_OP, Const::Name((*spelling).to_string()))
            }
            Expr::Unary { op: spelling, expr } => {
                self.lower_expr(expr)?;
                self.emit_with_const(op::UNARY_OP, Const::Name((*spelling).to_string()))
            }
            Expr::Logical { op: spelling, lhs, rhs } => self.lower_logical(spelling, lhs, rhs),
            Expr::Ternary { test, cons, alt } => self.lower_ternary(test, cons, alt),
            Expr::Assign { target, value } => self.lower_assign(target, value),
            Expr::Call { callee, args } => {
                self.lower_expr(callee)?;
                let arity = self.lower_arguments(args)?;
                self.emit_op(call::CALL_FUNCTION);
                self.emit_byte(arity);
                Ok(())
            }
            Expr::New { callee, args } => {
                self.lower_expr(callee)?;
                let arity = self.lower_arguments(args)?;
                self.emit_op(call::NEW_INSTANCE);
                self.emit_byte(arity);
                Ok(())
            }
            Expr::Member { object: obj, property } => {
                self.lower_expr(obj)?;
                self.emit_with_const(object::LOAD_PROPERTY, Const::Name(property.clone()))
            }
            Expr::Index { object: obj, index } => {
                self.lower_expr(obj)?;
                self.lower_expr(index)?;
                self.emit_op(object::LOAD_INDEX);
                Ok(())
            }
            Expr::Object(props) => {
                self.emit_op(object::CREATE_OBJECT);
                for (key, value) in props {
                    self.emit_op(stack::DUPLICATE);
                    self.lower_expr(value)?;
                    self.emit_with_const(object::STORE_PROPERTY, Const::Name(key.clone()))?;
                    self.emit_op(stack::POP);
                }
                Ok(())
            }
            Expr::Array(elems) => {
                self.emit_op(object::CREATE_ARRAY);
                for elem in elems {
                    self.emit_op(stack::DUPLICATE);
                    self.lower_expr(elem)?;
                    self.emit_op(object::ARRAY_PUSH);
                    self.emit_op(stack::POP);
                }
                Ok(())
            }
            Expr::Function(func) => self.lower_function_literal(func),
        }
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<(), CompileError> {
        match target {
            Expr::Ident(name) => {
                self.lower_expr(value)?;
                self.emit_with_const(var::STORE_VAR, Const::Name(name.clone()))
            }
            Expr::Member { object: obj, property } => {
                self.lower_expr(obj)?;
                self.lower_expr(value)?;
                self.emit_with_const(object::STORE_PROPERTY, Const::Name(property.clone()))
            }
            Expr::Index { object: obj, index } => {
                self.lower_expr(obj)?;
                self.lower_expr(index)?;
                self.lower_expr(value)?;
                self.emit_op(object::STORE_INDEX);
                Ok(())
            }
            _ => Err(CompileError::UnsupportedNode("AssignmentTarget")),
        }
    }

    fn lower_arguments(&mut self, args: &[Expr]) -> Result<u8, CompileError> {
        if args.len() > 254 {
            return Err(CompileError::UnsupportedNode("CallWithExcessiveArity"));
        }
        for arg in args {
            self.lower_expr(arg)?;
        }
        Ok(args.len() as u8)
    }

    pub(crate) fn lower_function_literal(&mut self, func: &FunctionLit) -> Result<(), CompileError> {
        let name_idx = self.intern(Const::Name(func.name.clone().unwrap_or_default()))?;
        let params_idx = self.intern(Const::StrList(func.params.clone()))?;
        let body_idx = self.intern(Const::Source(func.body_src.clone()))?;
        self.emit_op(call::CREATE_FUNCTION);
        self.emit_byte(name_idx);
        self.emit_byte(params_idx);
        self.emit_byte(body_idx);
        Ok(())
    }
}
