// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for cell expressions.
//!
//! Equality, comparison and colon tokens never reach this parser; cells are
//! split on those at the token level first.  The grammar here is plain
//! arithmetic with the reserved function vocabulary.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{BuiltinFn, Loc};
use crate::common::{EquationError, ErrorCode};
use crate::token::{Lexer, Spanned, Token};

/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    Eq,
    Colon,
    Lt,
    Lte,
    Gt,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,
    Exp,
    LParen,
    RParen,
    Comma,
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::Eq => TokenKind::Eq,
            Token::Colon => TokenKind::Colon,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::Exp => TokenKind::Exp,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Comma => TokenKind::Comma,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    /// Create a new parser from a lexer, collecting all tokens up front.
    /// Returns an error if the lexer produces any errors.
    fn new(lexer: Lexer<'input>) -> Result<Self, EquationError> {
        let mut tokens = Vec::new();
        for result in lexer {
            match result {
                Ok(tok) => tokens.push(tok),
                Err(e) => return Err(e),
            }
        }
        Ok(Parser { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    fn advance(&mut self) -> Option<&Spanned<Token<'input>>> {
        if self.pos < self.tokens.len() {
            let tok = &self.tokens[self.pos];
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<&Spanned<Token<'input>>, EquationError> {
        if self.peek_kind() == Some(expected) {
            Ok(self.advance().unwrap())
        } else if let Some((start, _, end)) = self.peek() {
            Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            })
        } else {
            let pos = self.eof_position();
            Err(EquationError {
                start: pos as u16,
                end: (pos + 1) as u16,
                code: ErrorCode::UnrecognizedEof,
            })
        }
    }

    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Parse a whole expression from the token stream.
    /// Returns Ok(None) for empty input.
    fn parse_expression(&mut self) -> Result<Option<Expr>, EquationError> {
        if self.is_at_end() {
            return Ok(None);
        }

        let expr = self.parse_additive()?;

        // Check for extra tokens after the expression
        if let Some((start, _, end)) = self.peek() {
            return Err(EquationError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }

        Ok(Some(expr))
    }

    /// Parse additive operators (+, -)
    fn parse_additive(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse multiplicative operators (*, /)
    fn parse_multiplicative(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse unary operators (+, -)
    fn parse_unary(&mut self) -> Result<Expr, EquationError> {
        match self.peek_kind() {
            Some(TokenKind::Plus) => {
                let (lpos, _, _) = *self.advance().unwrap();
                let operand = self.parse_exponentiation()?;
                let rpos = operand.get_loc().end as usize;
                Ok(Expr::Op1(
                    UnaryOp::Positive,
                    Box::new(operand),
                    Loc::new(lpos, rpos),
                ))
            }
            Some(TokenKind::Minus) => {
                let (lpos, _, _) = *self.advance().unwrap();
                let operand = self.parse_exponentiation()?;
                let rpos = operand.get_loc().end as usize;
                Ok(Expr::Op1(
                    UnaryOp::Negative,
                    Box::new(operand),
                    Loc::new(lpos, rpos),
                ))
            }
            _ => self.parse_exponentiation(),
        }
    }

    /// Parse exponentiation operator (^) - left associative
    fn parse_exponentiation(&mut self) -> Result<Expr, EquationError> {
        let mut left = self.parse_app()?;

        while self.peek_kind() == Some(TokenKind::Exp) {
            self.advance();
            let right = self.parse_app()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(BinaryOp::Exp, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse function application: id(args)
    fn parse_app(&mut self) -> Result<Expr, EquationError> {
        // Check if we have an identifier followed by '('
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.pos + 1 < self.tokens.len()
            && TokenKind::from(&self.tokens[self.pos + 1].1) == TokenKind::LParen
        {
            // This is a function call
            let (lpos, tok, _) = *self.advance().unwrap();
            let name = if let Token::Ident(s) = tok {
                s.to_lowercase()
            } else {
                unreachable!()
            };

            self.advance(); // consume '('
            let args = self.parse_comma_separated_exprs()?;
            let (_, _, rpos) = *self.expect(TokenKind::RParen)?;
            let loc = Loc::new(lpos, rpos);

            return build_app(&name, args, loc);
        }

        self.parse_atom()
    }

    /// Parse comma-separated expressions for function arguments
    fn parse_comma_separated_exprs(&mut self) -> Result<Vec<Expr>, EquationError> {
        let mut exprs = Vec::new();

        if self.peek_kind() == Some(TokenKind::RParen) {
            return Ok(exprs);
        }

        loop {
            exprs.push(self.parse_additive()?);
            if self.peek_kind() == Some(TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        Ok(exprs)
    }

    /// Parse an atomic expression (number, identifier, parenthesized expression)
    fn parse_atom(&mut self) -> Result<Expr, EquationError> {
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let (lpos, tok, rpos) = *self.advance().unwrap();
                if let Token::Num(s) = tok {
                    match s.parse::<f64>() {
                        Ok(n) => Ok(Expr::Const(s.to_string(), n, Loc::new(lpos, rpos))),
                        Err(_) => Err(EquationError {
                            start: lpos as u16,
                            end: rpos as u16,
                            code: ErrorCode::ExpectedNumber,
                        }),
                    }
                } else {
                    unreachable!()
                }
            }
            Some(TokenKind::Ident) => {
                let (lpos, tok, rpos) = *self.advance().unwrap();
                if let Token::Ident(s) = tok {
                    Ok(Expr::Var(s.to_string(), Loc::new(lpos, rpos)))
                } else {
                    unreachable!()
                }
            }
            Some(TokenKind::LParen) => {
                self.advance(); // consume '('
                let expr = self.parse_additive()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(_) => {
                let (start, _, end) = self.peek().unwrap();
                Err(EquationError {
                    start: *start as u16,
                    end: *end as u16,
                    code: ErrorCode::UnrecognizedToken,
                })
            }
            None => {
                let pos = self.eof_position();
                Err(EquationError {
                    start: pos as u16,
                    end: (pos + 1) as u16,
                    code: ErrorCode::UnrecognizedEof,
                })
            }
        }
    }
}

fn build_app(name: &str, mut args: Vec<Expr>, loc: Loc) -> Result<Expr, EquationError> {
    use BuiltinFn::*;

    macro_rules! check_arity {
        ($n:expr) => {{
            if args.len() != $n {
                return Err(EquationError {
                    start: loc.start,
                    end: loc.end,
                    code: ErrorCode::BadBuiltinArgs,
                });
            }
        }};
    }

    let builtin = match name {
        "abs" | "acos" | "asin" | "atan" | "ceil" | "cos" | "exp" | "floor" | "log" | "round"
        | "sin" | "sqrt" | "tan" => {
            check_arity!(1);
            let a = Box::new(args.remove(0));
            match name {
                "abs" => Abs(a),
                "acos" => Acos(a),
                "asin" => Asin(a),
                "atan" => Atan(a),
                "ceil" => Ceil(a),
                "cos" => Cos(a),
                "exp" => Exp(a),
                "floor" => Floor(a),
                "log" => Log(a),
                "round" => Round(a),
                "sin" => Sin(a),
                "sqrt" => Sqrt(a),
                "tan" => Tan(a),
                _ => unreachable!(),
            }
        }
        "max" | "min" => {
            check_arity!(2);
            let b = Box::new(args.remove(1));
            let a = Box::new(args.remove(0));
            if name == "max" { Max(a, b) } else { Min(a, b) }
        }
        _ => {
            return Err(EquationError {
                start: loc.start,
                end: loc.end,
                code: ErrorCode::UnknownBuiltin,
            });
        }
    };

    Ok(Expr::App(builtin, loc))
}

/// Parse a cell expression into an AST.  Returns Ok(None) for empty input.
pub fn parse(input: &str) -> Result<Option<Expr>, EquationError> {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer)?;
    parser.parse_expression()
}
