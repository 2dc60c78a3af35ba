//! Recursive-descent frontend for the input language.
//!
//! Produces the [`crate::ast`] node set. The parser is deliberately lenient
//! about semicolons and keeps the raw source slice of every function body,
//! which later becomes the opaque body constant of `CREATE_FUNCTION`.

use std::ops::Range;

use logos::Logos;

use crate::ast::{Expr, ForInit, FunctionLit, Stmt, SwitchCase};
use crate::error::CompileError;
use crate::lexer::Token;

/// Parse a whole program.
pub fn parse(src: &str) -> Result<Vec<Stmt>, CompileError> {
    let mut toks = Vec::new();
    let mut spans = Vec::new();
    let mut lexer = Token::lexer(src);
    while let Some(item) = lexer.next() {
        match item {
            Ok(tok) => {
                toks.push(tok);
                spans.push(lexer.span());
            }
            Err(()) => {
                return Err(CompileError::parse_at(
                    src,
                    lexer.span().start,
                    "unrecognized token",
                ))
            }
        }
    }
    let mut parser = Parser {
        src,
        toks,
        spans,
        pos: 0,
    };
    let program = parser.statements_until_eof()?;
    Ok(program)
}

struct Parser<'src> {
    src: &'src str,
    toks: Vec<Token>,
    spans: Vec<Range<usize>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<&Token> {
        self.toks.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.toks.get(self.pos + ahead)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.toks.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token, what: &str) -> Result<(), CompileError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.err_here(format!(
                "expected {what}, found {}",
                self.peek().map_or("end of input".to_string(), |t| t.to_string())
            )))
        }
    }

    fn offset(&self) -> usize {
        self.spans
            .get(self.pos)
            .map(|s| s.start)
            .unwrap_or(self.src.len())
    }

    fn prev_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.spans[self.pos - 1].end
        }
    }

    fn err_here(&self, message: impl Into<String>) -> CompileError {
        CompileError::parse_at(self.src, self.offset(), message)
    }

    fn ident(&mut self, what: &str) -> Result<String, CompileError> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name),
            found => Err(CompileError::parse_at(
                self.src,
                self.prev_end(),
                format!(
                    "expected {what}, found {}",
                    found.map_or("end of input".to_string(), |t| t.to_string())
                ),
            )),
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statements_until_eof(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut out = Vec::new();
        while self.peek().is_some() {
            out.push(self.statement()?);
        }
        Ok(out)
    }

    fn statement(&mut self) -> Result<Stmt, CompileError> {
        match self.peek() {
            Some(Token::LBrace) => {
                let (body, _) = self.braced_body()?;
                Ok(Stmt::Block(body))
            }
            Some(Token::Semi) => {
                self.advance();
                Ok(Stmt::Empty)
            }
            Some(Token::KeywordVar) => {
                self.advance();
                let decls = self.declarators()?;
                self.eat(&Token::Semi);
                Ok(Stmt::VarDecl(decls))
            }
            Some(Token::KeywordFunction) => {
                self.advance();
                let name = self.ident("function name")?;
                let func = self.function_rest(Some(name))?;
                Ok(Stmt::FunctionDecl(func))
            }
            Some(Token::KeywordReturn) => {
                self.advance();
                let value = match self.peek() {
                    None | Some(Token::Semi) | Some(Token::RBrace) => None,
                    _ => Some(self.expression()?),
                };
                self.eat(&Token::Semi);
                Ok(Stmt::Return(value))
            }
            Some(Token::KeywordIf) => self.if_statement(),
            Some(Token::KeywordWhile) => {
                self.advance();
                self.expect(&Token::LParen, "`(`")?;
                let test = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                let body = Box::new(self.statement()?);
                Ok(Stmt::While { test, body })
            }
            Some(Token::KeywordDo) => {
                self.advance();
                let body = Box::new(self.statement()?);
                self.expect(&Token::KeywordWhile, "`while`")?;
                self.expect(&Token::LParen, "`(`")?;
                let test = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                self.eat(&Token::Semi);
                Ok(Stmt::DoWhile { body, test })
            }
            Some(Token::KeywordFor) => self.for_statement(),
            Some(Token::KeywordSwitch) => self.switch_statement(),
            Some(Token::KeywordBreak) => {
                self.advance();
                self.eat(&Token::Semi);
                Ok(Stmt::Break)
            }
            Some(Token::KeywordContinue) => {
                self.advance();
                self.eat(&Token::Semi);
                Ok(Stmt::Continue)
            }
            Some(Token::KeywordTry) => self.try_statement(),
            Some(Token::KeywordThrow) => {
                self.advance();
                let value = self.expression()?;
                self.eat(&Token::Semi);
                Ok(Stmt::Throw(value))
            }
            Some(_) => {
                let expr = self.expression()?;
                self.eat(&Token::Semi);
                Ok(Stmt::Expr(expr))
            }
            None => Err(self.err_here("expected a statement")),
        }
    }

    fn declarators(&mut self) -> Result<Vec<(String, Option<Expr>)>, CompileError> {
        let mut decls = Vec::new();
        loop {
            let name = self.ident("variable name")?;
            let init = if self.eat(&Token::Assign) {
                Some(self.assignment()?)
            } else {
                None
            };
            decls.push((name, init));
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        Ok(decls)
    }

    fn if_statement(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::KeywordIf, "`if`")?;
        self.expect(&Token::LParen, "`(`")?;
        let test = self.expression()?;
        self.expect(&Token::RParen, "`)`")?;
        let cons = Box::new(self.statement()?);
        let alt = if self.eat(&Token::KeywordElse) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        Ok(Stmt::If { test, cons, alt })
    }

    fn for_statement(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::KeywordFor, "`for`")?;
        self.expect(&Token::LParen, "`(`")?;

        // `for (x in obj)` and `for (var x in obj)` are enumerations, not
        // the three-clause form.
        let is_decl = self.peek() == Some(&Token::KeywordVar);
        let in_pos = if is_decl { 2 } else { 1 };
        if matches!(self.peek_at(if is_decl { 1 } else { 0 }), Some(Token::Ident(_)))
            && self.peek_at(in_pos) == Some(&Token::KeywordIn)
        {
            if is_decl {
                self.advance();
            }
            let binding = self.ident("loop variable")?;
            self.expect(&Token::KeywordIn, "`in`")?;
            let object = self.expression()?;
            self.expect(&Token::RParen, "`)`")?;
            let body = Box::new(self.statement()?);
            return Ok(Stmt::ForIn {
                binding,
                object,
                body,
            });
        }

        let init = if self.eat(&Token::Semi) {
            None
        } else if self.eat(&Token::KeywordVar) {
            let decls = self.declarators()?;
            self.expect(&Token::Semi, "`;`")?;
            Some(ForInit::Decl(decls))
        } else {
            let expr = self.expression()?;
            self.expect(&Token::Semi, "`;`")?;
            Some(ForInit::Expr(expr))
        };

        let test = if self.peek() == Some(&Token::Semi) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::Semi, "`;`")?;

        let update = if self.peek() == Some(&Token::RParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(&Token::RParen, "`)`")?;

        let body = Box::new(self.statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn switch_statement(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::KeywordSwitch, "`switch`")?;
        self.expect(&Token::LParen, "`(`")?;
        let disc = self.expression()?;
        self.expect(&Token::RParen, "`)`")?;
        self.expect(&Token::LBrace, "`{`")?;

        let mut cases = Vec::new();
        loop {
            match self.peek() {
                Some(Token::KeywordCase) => {
                    self.advance();
                    let test = self.expression()?;
                    self.expect(&Token::Colon, "`:`")?;
                    let body = self.case_body()?;
                    cases.push(SwitchCase {
                        test: Some(test),
                        body,
                    });
                }
                Some(Token::KeywordDefault) => {
                    self.advance();
                    self.expect(&Token::Colon, "`:`")?;
                    let body = self.case_body()?;
                    cases.push(SwitchCase { test: None, body });
                }
                Some(Token::RBrace) => {
                    self.advance();
                    break;
                }
                _ => return Err(self.err_here("expected `case`, `default`, or `}`")),
            }
        }
        Ok(Stmt::Switch { disc, cases })
    }

    fn case_body(&mut self) -> Result<Vec<Stmt>, CompileError> {
        let mut body = Vec::new();
        while !matches!(
            self.peek(),
            None | Some(Token::KeywordCase) | Some(Token::KeywordDefault) | Some(Token::RBrace)
        ) {
            body.push(self.statement()?);
        }
        Ok(body)
    }

    fn try_statement(&mut self) -> Result<Stmt, CompileError> {
        self.expect(&Token::KeywordTry, "`try`")?;
        let (block, _) = self.braced_body()?;

        let handler = if self.eat(&Token::KeywordCatch) {
            self.expect(&Token::LParen, "`(`")?;
            let binding = self.ident("catch binding")?;
            self.expect(&Token::RParen, "`)`")?;
            let (body, _) = self.braced_body()?;
            Some((binding, body))
        } else {
            None
        };

        let finalizer = if self.eat(&Token::KeywordFinally) {
            let (body, _) = self.braced_body()?;
            Some(body)
        } else {
            None
        };

        if handler.is_none() && finalizer.is_none() {
            return Err(self.err_here("try statement needs a catch or finally clause"));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    /// Parse `{ ... }`, returning the statements and the raw body text.
    fn braced_body(&mut self) -> Result<(Vec<Stmt>, String), CompileError> {
        self.expect(&Token::LBrace, "`{`")?;
        let body_start = self.prev_end();
        let mut body = Vec::new();
        while !matches!(self.peek(), None | Some(Token::RBrace)) {
            body.push(self.statement()?);
        }
        let body_end = self.offset();
        self.expect(&Token::RBrace, "`}`")?;
        let body_src = self.src[body_start..body_end].trim().to_string();
        Ok((body, body_src))
    }

    // ------------------------------------------------------------------
    // Expressions, highest binding last
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<Expr, CompileError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.ternary()?;
        if self.eat(&Token::Assign) {
            if !matches!(lhs, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. }) {
                return Err(self.err_here("invalid assignment target"));
            }
            let value = self.assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(lhs),
                value: Box::new(value),
            });
        }
        Ok(lhs)
    }

    fn ternary(&mut self) -> Result<Expr, CompileError> {
        let test = self.logical(0)?;
        if self.eat(&Token::Question) {
            let cons = self.assignment()?;
            self.expect(&Token::Colon, "`:`")?;
            let alt = self.assignment()?;
            return Ok(Expr::Ternary {
                test: Box::new(test),
                cons: Box::new(cons),
                alt: Box::new(alt),
            });
        }
        Ok(test)
    }

    /// Logical tier: `??`, then `||`, then `&&`.
    fn logical(&mut self, level: usize) -> Result<Expr, CompileError> {
        const LEVELS: [(&Token, &str); 3] = [
            (&Token::Nullish, "??"),
            (&Token::OrOr, "||"),
            (&Token::AndAnd, "&&"),
        ];
        if level >= LEVELS.len() {
            return self.binary(0);
        }
        let (tok, op) = LEVELS[level];
        let mut lhs = self.logical(level + 1)?;
        while self.eat(tok) {
            let rhs = self.logical(level + 1)?;
            lhs = Expr::Logical {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    /// Binary tiers from loosest (`|`) to tightest (`* / %`).
    fn binary(&mut self, level: usize) -> Result<Expr, CompileError> {
        const LEVELS: &[&[(&Token, &str)]] = &[
            &[(&Token::Pipe, "|")],
            &[(&Token::Caret, "^")],
            &[(&Token::Amp, "&")],
            &[
                (&Token::StrictEq, "==="),
                (&Token::StrictNe, "!=="),
                (&Token::EqEq, "=="),
                (&Token::Ne, "!="),
            ],
            &[
                (&Token::Le, "<="),
                (&Token::Ge, ">="),
                (&Token::Lt, "<"),
                (&Token::Gt, ">"),
                (&Token::KeywordInstanceof, "instanceof"),
                (&Token::KeywordIn, "in"),
            ],
            &[
                (&Token::Shl, "<<"),
                (&Token::UShr, ">>>"),
                (&Token::Shr, ">>"),
            ],
            &[(&Token::Plus, "+"), (&Token::Minus, "-")],
            &[
                (&Token::Star, "*"),
                (&Token::Slash, "/"),
                (&Token::Percent, "%"),
            ],
        ];
        if level >= LEVELS.len() {
            return self.unary();
        }
        let mut lhs = self.binary(level + 1)?;
        'outer: loop {
            for (tok, op) in LEVELS[level] {
                if self.eat(tok) {
                    let rhs = self.binary(level + 1)?;
                    lhs = Expr::Binary {
                        op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.peek() {
            Some(Token::Plus) => Some("+"),
            Some(Token::Minus) => Some("-"),
            Some(Token::Bang) => Some("!"),
            Some(Token::Tilde) => Some("~"),
            Some(Token::KeywordTypeof) => Some("typeof"),
            Some(Token::KeywordVoid) => Some("void"),
            Some(Token::KeywordDelete) => Some("delete"),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let expr = self.unary()?;
            return Ok(Expr::Unary {
                op,
                expr: Box::new(expr),
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, CompileError> {
        let mut expr = if self.peek() == Some(&Token::KeywordNew) {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let property = self.ident("property name")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "`]`")?;
                    expr = Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                Some(Token::LParen) => {
                    let args = self.arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn new_expression(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::KeywordNew, "`new`")?;
        // The callee of `new` binds member access but not calls.
        let mut callee = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.advance();
                    let property = self.ident("property name")?;
                    callee = Expr::Member {
                        object: Box::new(callee),
                        property,
                    };
                }
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(&Token::RBracket, "`]`")?;
                    callee = Expr::Index {
                        object: Box::new(callee),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        let args = if self.peek() == Some(&Token::LParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, CompileError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.assignment()?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, "`)`")?;
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, CompileError> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Some(Token::Str(s)) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Some(Token::Bool(b)) => {
                self.advance();
                Ok(Expr::Bool(b))
            }
            Some(Token::Null) => {
                self.advance();
                Ok(Expr::Null)
            }
            Some(Token::Undefined) => {
                self.advance();
                Ok(Expr::Undefined)
            }
            Some(Token::KeywordThis) => {
                self.advance();
                Ok(Expr::This)
            }
            Some(Token::Ident(name)) => {
                if self.peek_at(1) == Some(&Token::Arrow) {
                    self.advance();
                    self.advance();
                    return self.arrow_body(vec![name]);
                }
                self.advance();
                Ok(Expr::Ident(name))
            }
            Some(Token::LParen) => {
                if self.is_arrow_parameter_list() {
                    let params = self.arrow_parameters()?;
                    self.expect(&Token::Arrow, "`=>`")?;
                    return self.arrow_body(params);
                }
                self.advance();
                let expr = self.expression()?;
                self.expect(&Token::RParen, "`)`")?;
                Ok(expr)
            }
            Some(Token::LBracket) => self.array_literal(),
            Some(Token::LBrace) => self.object_literal(),
            Some(Token::KeywordFunction) => {
                self.advance();
                let name = match self.peek() {
                    Some(Token::Ident(_)) => Some(self.ident("function name")?),
                    _ => None,
                };
                let func = self.function_rest(name)?;
                Ok(Expr::Function(func))
            }
            Some(other) => Err(self.err_here(format!("unexpected {other}"))),
            None => Err(self.err_here("unexpected end of input")),
        }
    }

    fn array_literal(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::LBracket, "`[`")?;
        let mut elems = Vec::new();
        if !self.eat(&Token::RBracket) {
            loop {
                elems.push(self.assignment()?);
                if self.eat(&Token::Comma) {
                    if self.eat(&Token::RBracket) {
                        break;
                    }
                    continue;
                }
                self.expect(&Token::RBracket, "`]`")?;
                break;
            }
        }
        Ok(Expr::Array(elems))
    }

    fn object_literal(&mut self) -> Result<Expr, CompileError> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut props = Vec::new();
        if !self.eat(&Token::RBrace) {
            loop {
                let key = match self.advance() {
                    Some(Token::Ident(name)) => name,
                    Some(Token::Str(s)) => s,
                    Some(Token::Number(n)) => number_key(n),
                    found => {
                        return Err(CompileError::parse_at(
                            self.src,
                            self.prev_end(),
                            format!(
                                "expected property key, found {}",
                                found.map_or("end of input".to_string(), |t| t.to_string())
                            ),
                        ))
                    }
                };
                let value = if self.eat(&Token::Colon) {
                    self.assignment()?
                } else {
                    // Shorthand `{ a }`.
                    Expr::Ident(key.clone())
                };
                props.push((key, value));
                if self.eat(&Token::Comma) {
                    if self.eat(&Token::RBrace) {
                        break;
                    }
                    continue;
                }
                self.expect(&Token::RBrace, "`}`")?;
                break;
            }
        }
        Ok(Expr::Object(props))
    }

    fn function_rest(&mut self, name: Option<String>) -> Result<FunctionLit, CompileError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.ident("parameter name")?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, "`)`")?;
                break;
            }
        }
        let (body, body_src) = self.braced_body()?;
        Ok(FunctionLit {
            name,
            params,
            body,
            body_src,
        })
    }

    /// True when the upcoming `( ... )` is an arrow parameter list.
    fn is_arrow_parameter_list(&self) -> bool {
        debug_assert_eq!(self.peek(), Some(&Token::LParen));
        let mut depth = 0usize;
        let mut i = self.pos;
        while let Some(tok) = self.toks.get(i) {
            match tok {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return self.toks.get(i + 1) == Some(&Token::Arrow);
                    }
                }
                _ => {}
            }
            i += 1;
        }
        false
    }

    fn arrow_parameters(&mut self) -> Result<Vec<String>, CompileError> {
        self.expect(&Token::LParen, "`(`")?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.ident("parameter name")?);
                if self.eat(&Token::Comma) {
                    continue;
                }
                self.expect(&Token::RParen, "`)`")?;
                break;
            }
        }
        Ok(params)
    }

    fn arrow_body(&mut self, params: Vec<String>) -> Result<Expr, CompileError> {
        if self.peek() == Some(&Token::LBrace) {
            let (body, body_src) = self.braced_body()?;
            return Ok(Expr::Function(FunctionLit {
                name: None,
                params,
                body,
                body_src,
            }));
        }
        let start = self.offset();
        let value = self.assignment()?;
        let end = self.prev_end();
        let body_src = format!("return {};", &self.src[start..end]);
        Ok(Expr::Function(FunctionLit {
            name: None,
            params,
            body: vec![Stmt::Return(Some(value))],
            body_src,
        }))
    }
}

/// Spell a numeric object key the way the source would.
fn number_key(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_operator_precedence() {
        let prog = parse("1 + 2 * 3;").unwrap();
        match &prog[0] {
            Stmt::Expr(Expr::Binary { op: "+", rhs, .. }) => {
                assert!(matches!(**rhs, Expr::Binary { op: "*", .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_member_index_and_call_chains() {
        let prog = parse("a.b[c](1, 2);").unwrap();
        match &prog[0] {
            Stmt::Expr(Expr::Call { callee, args }) => {
                assert_eq!(args.len(), 2);
                assert!(matches!(**callee, Expr::Index { .. }));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn keeps_function_body_source() {
        let prog = parse("function f(x) { return x * x; }").unwrap();
        match &prog[0] {
            Stmt::FunctionDecl(func) => {
                assert_eq!(func.params, vec!["x"]);
                assert_eq!(func.body_src, "return x * x;");
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_arrow_functions_both_shapes() {
        let prog = parse("var f = x => x + 1; var g = (a, b) => { return a; };").unwrap();
        match &prog[0] {
            Stmt::VarDecl(decls) => match &decls[0].1 {
                Some(Expr::Function(func)) => {
                    assert_eq!(func.params, vec!["x"]);
                    assert_eq!(func.body_src, "return x + 1;");
                }
                other => panic!("unexpected init: {other:?}"),
            },
            other => panic!("unexpected shape: {other:?}"),
        }
        match &prog[1] {
            Stmt::VarDecl(decls) => match &decls[0].1 {
                Some(Expr::Function(func)) => assert_eq!(func.params, vec!["a", "b"]),
                other => panic!("unexpected init: {other:?}"),
            },
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn distinguishes_for_and_for_in() {
        let prog = parse("for (var i = 0; i < 3; i = i + 1) {} for (k in o) {}").unwrap();
        assert!(matches!(prog[0], Stmt::For { .. }));
        assert!(matches!(prog[1], Stmt::ForIn { .. }));
    }

    #[test]
    fn parses_switch_with_default() {
        let prog = parse("switch (x) { case 1: break; default: y; }").unwrap();
        match &prog[0] {
            Stmt::Switch { cases, .. } => {
                assert_eq!(cases.len(), 2);
                assert!(cases[0].test.is_some());
                assert!(cases[1].test.is_none());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn parses_try_catch_finally() {
        let prog = parse("try { risky(); } catch (e) { log(e); } finally { done(); }").unwrap();
        match &prog[0] {
            Stmt::Try {
                handler, finalizer, ..
            } => {
                assert_eq!(handler.as_ref().unwrap().0, "e");
                assert!(finalizer.is_some());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_assignment_targets() {
        assert!(parse("1 = 2;").is_err());
    }

    #[test]
    fn reports_positions_for_stray_tokens() {
        let err = parse("var a = ;").unwrap_err();
        assert!(matches!(err, CompileError::Parse { line: 1, .. }));
    }
}
