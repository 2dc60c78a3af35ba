//! Identifier collection pass.
//!
//! A pre-order walk over the AST that records every identifier occurrence.
//! The result seeds the name-mangling tables: the name manager must not
//! issue anything the source already uses, and the reserved intrinsic set
//! below must never be renamed or shadowed in the emitted scope.

use std::collections::HashSet;

use crate::ast::{Expr, ForInit, FunctionLit, Stmt};

/// Host-provided names the lowerer must leave untouched. The interpreter
/// seeds its scope with exactly this set before dispatch begins.
pub const PROTECTED_INTRINSICS: &[&str] = &[
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "Number",
    "String",
    "Boolean",
    "Array",
    "Object",
    "Math",
    "JSON",
    "Date",
    "console",
    "NaN",
    "Infinity",
    "globalThis",
];

/// Whether a name belongs to the protected intrinsic set.
pub fn is_protected(name: &str) -> bool {
    PROTECTED_INTRINSICS.contains(&name)
}

#[derive(Debug, Default)]
pub struct IdentifierCollector {
    /// Every occurrence, in walk order.
    pub occurrences: Vec<String>,
    /// Deduplicated set of the above.
    pub names: HashSet<String>,
}

impl IdentifierCollector {
    pub fn collect(program: &[Stmt]) -> Self {
        let mut collector = Self::default();
        for stmt in program {
            collector.walk_stmt(stmt);
        }
        collector
    }

    fn record(&mut self, name: &str) {
        self.occurrences.push(name.to_string());
        self.names.insert(name.to_string());
    }

    fn walk_function(&mut self, func: &FunctionLit) {
        if let Some(name) = &func.name {
            self.record(name);
        }
        for param in &func.params {
            self.record(param);
        }
        for stmt in &func.body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(e) | Stmt::Throw(e) => self.walk_expr(e),
            Stmt::VarDecl(decls) => {
                for (name, init) in decls {
                    self.record(name);
                    if let Some(init) = init {
                        self.walk_expr(init);
                    }
                }
            }
            Stmt::FunctionDecl(func) => self.walk_function(func),
            Stmt::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            Stmt::If { test, cons, alt } => {
                self.walk_expr(test);
                self.walk_stmt(cons);
                if let Some(alt) = alt {
                    self.walk_stmt(alt);
                }
            }
            Stmt::While { test, body } => {
                self.walk_expr(test);
                self.walk_stmt(body);
            }
            Stmt::DoWhile { body, test } => {
                self.walk_stmt(body);
                self.walk_expr(test);
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                match init {
                    Some(ForInit::Decl(decls)) => {
                        for (name, init) in decls {
                            self.record(name);
                            if let Some(init) = init {
                                self.walk_expr(init);
                            }
                        }
                    }
                    Some(ForInit::Expr(e)) => self.walk_expr(e),
                    None => {}
                }
                if let Some(test) = test {
                    self.walk_expr(test);
                }
                if let Some(update) = update {
                    self.walk_expr(update);
                }
                self.walk_stmt(body);
            }
            Stmt::ForIn {
                binding,
                object,
                body,
            } => {
                self.record(binding);
                self.walk_expr(object);
                self.walk_stmt(body);
            }
            Stmt::Switch { disc, cases } => {
                self.walk_expr(disc);
                for case in cases {
                    if let Some(test) = &case.test {
                        self.walk_expr(test);
                    }
                    for stmt in &case.body {
                        self.walk_stmt(stmt);
                    }
                }
            }
            Stmt::Block(body) => {
                for stmt in body {
                    self.walk_stmt(stmt);
                }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                for stmt in block {
                    self.walk_stmt(stmt);
                }
                if let Some((binding, body)) = handler {
                    self.record(binding);
                    for stmt in body {
                        self.walk_stmt(stmt);
                    }
                }
                if let Some(body) = finalizer {
                    for stmt in body {
                        self.walk_stmt(stmt);
                    }
                }
            }
            Stmt::Break | Stmt::Continue | Stmt::Empty => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(name) => self.record(name),
            Expr::Array(elems) => {
                for elem in elems {
                    self.walk_expr(elem);
                }
            }
            Expr::Object(props) => {
                for (_, value) in props {
                    self.walk_expr(value);
                }
            }
            Expr::Function(func) => self.walk_function(func),
            Expr::Unary { expr, .. } => self.walk_expr(expr),
            Expr::Binary { lhs, rhs, .. } | Expr::Logical { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            Expr::Assign { target, value } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            Expr::Ternary { test, cons, alt } => {
                self.walk_expr(test);
                self.walk_expr(cons);
                self.walk_expr(alt);
            }
            Expr::Call { callee, args } | Expr::New { callee, args } => {
                self.walk_expr(callee);
                for arg in args {
                    self.walk_expr(arg);
                }
            }
            Expr::Member { object, .. } => self.walk_expr(object),
            Expr::Index { object, index } => {
                self.walk_expr(object);
                self.walk_expr(index);
            }
            Expr::Number(_)
            | Expr::Str(_)
            | Expr::Bool(_)
            | Expr::Null
            | Expr::Undefined
            | Expr::This => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn collects_every_occurrence_in_walk_order() {
        let program = parse("var a = b + b; function f(c) { return c; }").unwrap();
        let collected = IdentifierCollector::collect(&program);
        assert_eq!(collected.occurrences, vec!["a", "b", "b", "f", "c", "c"]);
        assert_eq!(collected.names.len(), 4);
    }

    #[test]
    fn walks_into_nested_structures() {
        let program = parse("var o = { k: inner }; try { x; } catch (e) { e; }").unwrap();
        let collected = IdentifierCollector::collect(&program);
        for name in ["o", "inner", "x", "e"] {
            assert!(collected.names.contains(name), "missing {name}");
        }
    }

    #[test]
    fn intrinsic_set_is_protected() {
        assert!(is_protected("Math"));
        assert!(is_protected("JSON"));
        assert!(!is_protected("myVariable"));
    }
}
