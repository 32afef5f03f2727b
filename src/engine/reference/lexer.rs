//! Tokenizer for the reference dialect
//!
//! One anchored regex recognizes every token class; the first matching
//! named group decides the token.

use crate::error::ScriptError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN: Regex = Regex::new(
        r#"^(?:(?P<ws>[ \t\r\n]+)|(?P<line_comment>//[^\n]*)|(?P<block_comment>/\*(?s:.*?)\*/)|(?P<num>[0-9]+(?:\.[0-9]+)?(?:[eE][+-]?[0-9]+)?)|(?P<str>"(?:[^"\\\n]|\\.)*"|'(?:[^'\\\n]|\\.)*')|(?P<ident>[A-Za-z_$][A-Za-z0-9_$]*)|(?P<punct>===|!==|==|!=|<=|>=|&&|\|\||[-+*/%<>=!(){}\[\].,;:]))"#
    )
    .unwrap();
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Number(f64),
    String(String),
    Ident(String),

    // Operators and punctuation
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,       // =
    EqEq,     // ==
    EqEqEq,   // ===
    Bang,     // !
    BangEq,   // !=
    BangEqEq, // !==
    Lt,
    LtEq,
    Gt,
    GtEq,
    AmpAmp,
    PipePipe,
    Colon,
    Semicolon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    // Keywords
    Catch,
    Else,
    False,
    Finally,
    Function,
    If,
    Let,
    Null,
    Return,
    This,
    Throw,
    True,
    Try,
    TypeOf,
    Undefined,
    While,

    Eof,
}

impl Token {
    fn keyword(word: &str) -> Option<Token> {
        let token = match word {
            "catch" => Token::Catch,
            "else" => Token::Else,
            "false" => Token::False,
            "finally" => Token::Finally,
            "function" => Token::Function,
            "if" => Token::If,
            "let" | "const" | "var" => Token::Let,
            "null" => Token::Null,
            "return" => Token::Return,
            "this" => Token::This,
            "throw" => Token::Throw,
            "true" => Token::True,
            "try" => Token::Try,
            "typeof" => Token::TypeOf,
            "undefined" => Token::Undefined,
            "while" => Token::While,
            _ => return None,
        };
        Some(token)
    }

    fn punct(text: &str) -> Option<Token> {
        let token = match text {
            "+" => Token::Plus,
            "-" => Token::Minus,
            "*" => Token::Star,
            "/" => Token::Slash,
            "%" => Token::Percent,
            "=" => Token::Eq,
            "==" => Token::EqEq,
            "===" => Token::EqEqEq,
            "!" => Token::Bang,
            "!=" => Token::BangEq,
            "!==" => Token::BangEqEq,
            "<" => Token::Lt,
            "<=" => Token::LtEq,
            ">" => Token::Gt,
            ">=" => Token::GtEq,
            "&&" => Token::AmpAmp,
            "||" => Token::PipePipe,
            ":" => Token::Colon,
            ";" => Token::Semicolon,
            "," => Token::Comma,
            "." => Token::Dot,
            "(" => Token::LParen,
            ")" => Token::RParen,
            "[" => Token::LBracket,
            "]" => Token::RBracket,
            "{" => Token::LBrace,
            "}" => Token::RBrace,
            _ => return None,
        };
        Some(token)
    }
}

/// A token and the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

/// Split `source` into tokens. `line` is the number of the first line.
pub fn tokenize(source: &str, line: u32) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    let mut line = line;

    while pos < source.len() {
        let rest = &source[pos..];
        let Some(caps) = TOKEN.captures(rest) else {
            let c = rest.chars().next().unwrap_or('?');
            return Err(ScriptError::syntax(format!("unexpected character '{}'", c)).with_line(line));
        };
        let Some(whole) = caps.get(0) else {
            break;
        };
        let text = whole.as_str();

        let token = if caps.name("ws").is_some()
            || caps.name("line_comment").is_some()
            || caps.name("block_comment").is_some()
        {
            None
        } else if caps.name("num").is_some() {
            let n: f64 = text
                .parse()
                .map_err(|_| ScriptError::syntax(format!("invalid number '{}'", text)).with_line(line))?;
            Some(Token::Number(n))
        } else if caps.name("str").is_some() {
            Some(Token::String(unescape(&text[1..text.len() - 1])))
        } else if caps.name("ident").is_some() {
            Some(Token::keyword(text).unwrap_or_else(|| Token::Ident(text.to_string())))
        } else {
            Token::punct(text)
        };

        if let Some(token) = token {
            tokens.push(Spanned { token, line });
        }
        line += text.matches('\n').count() as u32;
        pos += text.len();
    }

    tokens.push(Spanned { token: Token::Eof, line });
    Ok(tokens)
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
