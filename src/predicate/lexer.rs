//! Tokenizer for gating expressions.

use super::PredicateError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `#name`, including `#this` / `#root`.
    Var(String),
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Minus,
    Dot,
    LParen,
    RParen,
}

/// Token plus its byte offset, for error messages.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, PredicateError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let token = match c {
            '(' => {
                i += 1;
                Token::LParen
            }
            ')' => {
                i += 1;
                Token::RParen
            }
            '.' => {
                i += 1;
                Token::Dot
            }
            '-' => {
                i += 1;
                Token::Minus
            }
            '=' if peek(bytes, i + 1) == Some('=') => {
                i += 2;
                Token::Eq
            }
            '!' if peek(bytes, i + 1) == Some('=') => {
                i += 2;
                Token::Ne
            }
            '!' => {
                i += 1;
                Token::Not
            }
            '<' if peek(bytes, i + 1) == Some('=') => {
                i += 2;
                Token::Le
            }
            '<' => {
                i += 1;
                Token::Lt
            }
            '>' if peek(bytes, i + 1) == Some('=') => {
                i += 2;
                Token::Ge
            }
            '>' => {
                i += 1;
                Token::Gt
            }
            '&' if peek(bytes, i + 1) == Some('&') => {
                i += 2;
                Token::And
            }
            '|' if peek(bytes, i + 1) == Some('|') => {
                i += 2;
                Token::Or
            }
            '#' => {
                i += 1;
                let name = take_ident(src, &mut i);
                if name.is_empty() {
                    return Err(PredicateError::parse(start, "expected variable name after '#'"));
                }
                Token::Var(name)
            }
            '\'' | '"' => read_string(src, &mut i, c)?,
            c if c.is_ascii_digit() => read_number(src, &mut i)?,
            c if c.is_ascii_alphabetic() || c == '_' => keyword(take_ident(src, &mut i)),
            other => {
                return Err(PredicateError::parse(start, format!("unexpected character '{}'", other)));
            }
        };
        out.push(Spanned { token, pos: start });
    }

    Ok(out)
}

fn peek(bytes: &[u8], i: usize) -> Option<char> {
    bytes.get(i).map(|b| *b as char)
}

fn take_ident(src: &str, i: &mut usize) -> String {
    let start = *i;
    let bytes = src.as_bytes();
    while *i < bytes.len() && (bytes[*i].is_ascii_alphanumeric() || bytes[*i] == b'_') {
        *i += 1;
    }
    src[start..*i].to_string()
}

/// Word operators accepted alongside the symbolic ones.
fn keyword(word: String) -> Token {
    match word.as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "eq" => Token::Eq,
        "ne" => Token::Ne,
        "lt" => Token::Lt,
        "le" => Token::Le,
        "gt" => Token::Gt,
        "ge" => Token::Ge,
        _ => Token::Ident(word),
    }
}

fn read_string(src: &str, i: &mut usize, quote: char) -> Result<Token, PredicateError> {
    let start = *i;
    *i += 1;
    let mut text = String::new();
    let mut chars = src[*i..].char_indices();
    while let Some((offset, c)) = chars.next() {
        if c == quote {
            // A doubled quote is an escaped quote.
            if src[*i + offset + 1..].starts_with(quote) {
                text.push(quote);
                chars.next();
                continue;
            }
            *i += offset + 1;
            return Ok(Token::Str(text));
        }
        text.push(c);
    }
    Err(PredicateError::parse(start, "unterminated string literal"))
}

fn read_number(src: &str, i: &mut usize) -> Result<Token, PredicateError> {
    let start = *i;
    let bytes = src.as_bytes();
    while *i < bytes.len() && bytes[*i].is_ascii_digit() {
        *i += 1;
    }
    let is_float = *i + 1 < bytes.len() && bytes[*i] == b'.' && bytes[*i + 1].is_ascii_digit();
    if is_float {
        *i += 1;
        while *i < bytes.len() && bytes[*i].is_ascii_digit() {
            *i += 1;
        }
        src[start..*i]
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|e| PredicateError::parse(start, e.to_string()))
    } else {
        src[start..*i]
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|e| PredicateError::parse(start, e.to_string()))
    }
}
