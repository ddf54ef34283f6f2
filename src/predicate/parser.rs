//! Recursive-descent parser for gating expressions.
//!
//! ```text
//! expr    := or
//! or      := and (("||" | "or") and)*
//! and     := unary (("&&" | "and") unary)*
//! unary   := ("!" | "not") unary | compare
//! compare := operand (cmp_op operand)?
//! operand := literal | "-" number | "#" ident ("." ident)* | "(" expr ")"
//! ```

use super::lexer::{Spanned, Token};
use super::PredicateError;
use crate::value::Value;

/// Deepest allowed nesting of `!` and parentheses.
pub(crate) const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    /// Variable followed by zero or more property names.
    Path { root: String, fields: Vec<String> },
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

pub(crate) struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>, source_len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end: source_len,
            depth: 0,
        }
    }

    /// Parse a complete expression; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expr, PredicateError> {
        let expr = self.or()?;
        if let Some(extra) = self.tokens.get(self.pos) {
            return Err(PredicateError::parse(extra.pos, "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn here(&self) -> usize {
        self.tokens.get(self.pos).map(|s| s.pos).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, want: &Token) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Run `inner` one nesting level deeper, refusing past [`MAX_DEPTH`].
    fn nested<T>(
        &mut self,
        at: usize,
        inner: impl FnOnce(&mut Self) -> Result<T, PredicateError>,
    ) -> Result<T, PredicateError> {
        if self.depth >= MAX_DEPTH {
            return Err(PredicateError::parse(at, "expression nested too deeply"));
        }
        self.depth += 1;
        let out = inner(self);
        self.depth -= 1;
        out
    }

    fn or(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.and()?;
        while self.eat(&Token::Or) {
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.unary()?;
        while self.eat(&Token::And) {
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, PredicateError> {
        let at = self.here();
        if self.eat(&Token::Not) {
            let inner = self.nested(at, Self::unary)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.compare()
    }

    fn compare(&mut self) -> Result<Expr, PredicateError> {
        let lhs = self.operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.operand()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn operand(&mut self) -> Result<Expr, PredicateError> {
        let at = self.here();
        match self.bump() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(x)) => Ok(Expr::Literal(Value::Float(x))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Minus) => match self.bump() {
                Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(-i))),
                Some(Token::Float(x)) => Ok(Expr::Literal(Value::Float(-x))),
                _ => Err(PredicateError::parse(at, "expected number after '-'")),
            },
            Some(Token::Ident(word)) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ => Err(PredicateError::parse(
                    at,
                    format!("unknown identifier '{}' (variables need a '#' prefix)", word),
                )),
            },
            Some(Token::Var(root)) => {
                let mut fields = Vec::new();
                while self.eat(&Token::Dot) {
                    let field_at = self.here();
                    match self.bump() {
                        Some(Token::Ident(name)) => fields.push(name),
                        _ => return Err(PredicateError::parse(field_at, "expected property name")),
                    }
                }
                Ok(Expr::Path { root, fields })
            }
            Some(Token::LParen) => {
                let inner = self.nested(at, Self::or)?;
                if !self.eat(&Token::RParen) {
                    return Err(PredicateError::parse(self.here(), "expected ')'"));
                }
                Ok(inner)
            }
            Some(_) => Err(PredicateError::parse(at, "expected a value")),
            None => Err(PredicateError::parse(at, "unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::lexer::tokenize;

    fn parse(src: &str) -> Result<Expr, PredicateError> {
        Parser::new(tokenize(src)?, src.len()).parse()
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("#a || #b && #c").unwrap();
        assert!(matches!(expr, Expr::Or(_, rhs) if matches!(*rhs, Expr::And(_, _))));
    }

    #[test]
    fn property_path() {
        assert_eq!(
            parse("#this.verbose").unwrap(),
            Expr::Path {
                root: "this".into(),
                fields: vec!["verbose".into()],
            }
        );
    }

    #[test]
    fn errors_carry_position() {
        let err = parse("#a == ").unwrap_err();
        assert!(err.to_string().contains("position 6"), "{}", err);
        assert!(parse("(#a").is_err());
        assert!(parse("#a #b").is_err());
        assert!(parse("debug == true").is_err());
    }

    #[test]
    fn deep_nesting_is_a_parse_error() {
        let parens = format!("{}#a{}", "(".repeat(100_000), ")".repeat(100_000));
        let err = parse(&parens).unwrap_err();
        assert_eq!(err, PredicateError::parse(MAX_DEPTH, "expression nested too deeply"));

        let nots = format!("{}true", "!".repeat(100_000));
        assert!(matches!(parse(&nots), Err(PredicateError::Parse { .. })));
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let src = format!("{}#a{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse(&src).is_ok());
        let src = format!("{}true", "!".repeat(MAX_DEPTH));
        assert!(parse(&src).is_ok());
    }
}
