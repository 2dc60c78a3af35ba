//! Token stream for the input language.

use logos::Logos;
use std::fmt;

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \n\r\t\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*([^*]|\*[^/])*\*/")]
pub enum Token {
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| {
        let s = &lex.slice()[2..];
        u64::from_str_radix(s, 16).map(|v| v as f64).ok()
    }, priority = 4)]
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?", |lex| {
        lex.slice().parse::<f64>().ok()
    }, priority = 3)]
    Number(f64),

    #[regex(r#""([^"\\]*(\\.[^"\\]*)*)""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    #[regex(r#"'([^'\\]*(\\.[^'\\]*)*)'"#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    Str(String),

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("var")]
    #[token("let")]
    #[token("const")]
    KeywordVar,

    #[token("function")]
    KeywordFunction,
    #[token("return")]
    KeywordReturn,
    #[token("if")]
    KeywordIf,
    #[token("else")]
    KeywordElse,
    #[token("while")]
    KeywordWhile,
    #[token("do")]
    KeywordDo,
    #[token("for")]
    KeywordFor,
    #[token("switch")]
    KeywordSwitch,
    #[token("case")]
    KeywordCase,
    #[token("default")]
    KeywordDefault,
    #[token("break")]
    KeywordBreak,
    #[token("continue")]
    KeywordContinue,
    #[token("new")]
    KeywordNew,
    #[token("this")]
    KeywordThis,
    #[token("try")]
    KeywordTry,
    #[token("catch")]
    KeywordCatch,
    #[token("finally")]
    KeywordFinally,
    #[token("throw")]
    KeywordThrow,
    #[token("typeof")]
    KeywordTypeof,
    #[token("void")]
    KeywordVoid,
    #[token("delete")]
    KeywordDelete,
    #[token("instanceof")]
    KeywordInstanceof,
    #[token("in")]
    KeywordIn,

    #[regex(r"true|false", |lex| lex.slice() == "true", priority = 5)]
    Bool(bool),
    #[token("null")]
    Null,
    #[token("undefined")]
    Undefined,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,

    #[token("===")]
    StrictEq,
    #[token("!==")]
    StrictNe,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>>")]
    UShr,
    #[token(">>")]
    Shr,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    Nullish,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(_) => write!(f, "string literal"),
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.expect("lex error")).collect()
    }

    #[test]
    fn lexes_numbers_in_all_spellings() {
        assert_eq!(
            lex("1 2.5 0xFF 1e3"),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(255.0),
                Token::Number(1000.0),
            ]
        );
    }

    #[test]
    fn lexes_both_string_quote_styles() {
        assert_eq!(
            lex(r#""a\n" 'b\'c'"#),
            vec![Token::Str("a\n".into()), Token::Str("b'c".into())]
        );
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(
            lex("var variant"),
            vec![Token::KeywordVar, Token::Ident("variant".into())]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            lex("=== == = >>> >> >"),
            vec![
                Token::StrictEq,
                Token::EqEq,
                Token::Assign,
                Token::UShr,
                Token::Shr,
                Token::Gt,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            lex("1 // line\n/* block\n */ 2"),
            vec![Token::Number(1.0), Token::Number(2.0)]
        );
    }
}
