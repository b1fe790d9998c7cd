// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from the LALRPOP whitespace tokenizer and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{EquationError, ErrorCode};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Token<'input> {
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
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(c: ErrorCode, start: usize, end: usize) -> Result<T, EquationError> {
    Err(EquationError {
        start: start as u16,
        end: end as u16,
        code: c,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn word(&mut self, idx0: usize) -> Spanned<&'input str> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, &self.text[idx0..end], end),
            None => (idx0, &self.text[idx0..], self.text.len()),
        }
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifierish(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        let (start, word, end) = self.word(idx0);
        Ok((start, Ident(word), end))
    }

    fn number(&mut self, idx0: usize) -> Result<Spanned<Token<'input>>, EquationError> {
        use regex::{Match, Regex};

        lazy_static! {
            static ref NUMBER_RE: Regex = Regex::new(r"\d*(\.\d*)?([eE][-+]?\d+)?").unwrap();
        }

        let m: Match = NUMBER_RE.find(&self.text[idx0..]).unwrap();
        assert_eq!(m.start(), 0);

        self.bump_n(m.end());

        let end = idx0 + m.end();
        Ok((idx0, Num(&self.text[idx0..end]), end))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, EquationError>;

    fn next(&mut self) -> Option<Self::Item> {
        macro_rules! consume {
            ($s: expr, $i:expr, $tok:expr, $len:expr) => {{
                $s.bump();
                Some(Ok(($i, $tok, $i + $len)))
            }};
        }

        loop {
            return match self.lookahead {
                Some((i, '=')) => consume!(self, i, Eq, 1),
                Some((i, ':')) => consume!(self, i, Colon, 1),
                Some((i, '<')) => {
                    match self.bump() {
                        Some((_, '=')) => consume!(self, i, Lte, 2),
                        _ => {
                            // we've already bumped, don't consume
                            Some(Ok((i, Lt, i + 1)))
                        }
                    }
                }
                Some((i, '>')) => {
                    match self.bump() {
                        Some((_, '=')) => consume!(self, i, Gte, 2),
                        _ => {
                            // we've already bumped, don't consume
                            Some(Ok((i, Gt, i + 1)))
                        }
                    }
                }
                Some((i, '+')) => consume!(self, i, Plus, 1),
                Some((i, '-')) => consume!(self, i, Minus, 1),
                Some((i, '*')) => consume!(self, i, Mul, 1),
                Some((i, '/')) => consume!(self, i, Div, 1),
                Some((i, '^')) => consume!(self, i, Exp, 1),
                Some((i, '(')) => consume!(self, i, LParen, 1),
                Some((i, ')')) => consume!(self, i, RParen, 1),
                Some((i, ',')) => consume!(self, i, Comma, 1),
                Some((i, c)) if is_identifier_start(c) => Some(self.identifierish(i)),
                Some((i, c)) if is_number_start(c) => Some(self.number(i)),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, c)) => Some(error(UnrecognizedToken, i, i + c.len_utf8())),
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    is_digit(c) || c == '.'
}

fn is_digit(c: char) -> bool {
    '9' >= c && c >= '0'
}

pub(crate) fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

pub(crate) fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}
