// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The expression evaluator: text normalization, parsing and tree-walk
//! evaluation.  Everything downstream (cells, equations, the solver) funnels
//! expression text through this module.

use std::collections::{BTreeSet, HashMap};

use crate::ast::{BinaryOp, Expr, UnaryOp, identifier_set};
use crate::builtins::{BuiltinFn, Loc, is_builtin_fn};
use crate::common::{EquationResult, Ident};
use crate::token::{Lexer, Token};
use crate::{eqn_err, parser, token};

/// Stand-in for meaningful zeros while leading zeros are stripped.  Cell
/// text containing this character is rejected up front.
const PLACEHOLDER: char = '\u{e000}';

/// Rewrite digit runs so a numeral like `010` reads as decimal ten, without
/// disturbing identifiers that merely contain digits (`var01`).
///
/// Meaningful zeros (internal and trailing zeros, and the lone zero `0`) are
/// hidden behind a placeholder character, every remaining zero is a pure
/// leading zero and is deleted, then the placeholder is restored.
pub fn fix_leading_zeros(text: &str) -> EquationResult<String> {
    if let Some(pos) = text.find(PLACEHOLDER) {
        return eqn_err!(ReservedCharacter, pos, pos + PLACEHOLDER.len_utf8());
    }

    let chars: Vec<char> = text.chars().collect();
    let mut protected = String::with_capacity(text.len());
    // true when the previous surviving char continues a word (identifier or
    // numeral); deleted zeros don't count
    let mut in_word = false;
    for (i, &c) in chars.iter().enumerate() {
        if c == '0' && !in_word {
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if next_is_digit {
                // pure leading zero; leave it for the deletion pass
                protected.push('0');
            } else {
                // the lone zero
                protected.push(PLACEHOLDER);
                in_word = true;
            }
            continue;
        }
        if c == '0' {
            protected.push(PLACEHOLDER);
        } else {
            protected.push(c);
            in_word = token::is_identifier_continue(c) || c == '.';
        }
    }

    let fixed: String = protected
        .chars()
        .filter(|c| *c != '0')
        .map(|c| if c == PLACEHOLDER { '0' } else { c })
        .collect();

    Ok(fixed)
}

/// Prepare raw cell text for parsing: fix leading zeros, then insert
/// explicit multiplication between a numeral and an immediately following
/// identifier or `(` (`3x` becomes `3*x`, `2(a+b)` becomes `2*(a+b)`).
/// Empty or all-whitespace input is an error.
pub fn normalize(expr: &str) -> EquationResult<String> {
    if expr.trim().is_empty() {
        return eqn_err!(EmptyEquation, 0, expr.len());
    }

    let fixed = fix_leading_zeros(expr)?;

    // walk real tokens so that identifiers containing digits and exponent
    // notation (1e-3) are left alone
    let tokens: Vec<(usize, Token<'_>, usize)> = match Lexer::new(&fixed).collect() {
        Ok(tokens) => tokens,
        // let the parser report the bad character with its span
        Err(_) => return Ok(fixed),
    };

    let mut insertions: Vec<usize> = Vec::new();
    for pair in tokens.windows(2) {
        let (_, ref cur, cur_end) = pair[0];
        let (next_start, ref next, _) = pair[1];
        if cur_end != next_start {
            continue;
        }
        if matches!(cur, Token::Num(_)) && matches!(next, Token::Ident(_) | Token::LParen) {
            insertions.push(cur_end);
        }
    }

    if insertions.is_empty() {
        return Ok(fixed);
    }

    let mut normalized = String::with_capacity(fixed.len() + insertions.len());
    let mut last = 0;
    for pos in insertions {
        normalized.push_str(&fixed[last..pos]);
        normalized.push('*');
        last = pos;
    }
    normalized.push_str(&fixed[last..]);

    Ok(normalized)
}

/// Normalize and parse a (non-empty) expression into an AST.
pub fn parse_expr(text: &str) -> EquationResult<Expr> {
    let normalized = normalize(text)?;
    match parser::parse(&normalized)? {
        Some(ast) => Ok(ast),
        None => eqn_err!(EmptyEquation, 0, text.len()),
    }
}

/// Evaluate an AST under a variable assignment.  Identifiers missing from
/// the bindings evaluate to NaN; arithmetic that is undefined (0/0,
/// sqrt(-1)) yields NaN rather than an error.
pub(crate) fn eval_expr(expr: &Expr, bindings: &HashMap<Ident, f64>) -> f64 {
    match expr {
        Expr::Const(_, n, _) => *n,
        Expr::Var(id, _) => bindings.get(id).copied().unwrap_or(f64::NAN),
        Expr::App(builtin, _) => match builtin {
            BuiltinFn::Abs(a) => eval_expr(a, bindings).abs(),
            BuiltinFn::Acos(a) => eval_expr(a, bindings).acos(),
            BuiltinFn::Asin(a) => eval_expr(a, bindings).asin(),
            BuiltinFn::Atan(a) => eval_expr(a, bindings).atan(),
            BuiltinFn::Ceil(a) => eval_expr(a, bindings).ceil(),
            BuiltinFn::Cos(a) => eval_expr(a, bindings).cos(),
            BuiltinFn::Exp(a) => eval_expr(a, bindings).exp(),
            BuiltinFn::Floor(a) => eval_expr(a, bindings).floor(),
            BuiltinFn::Log(a) => eval_expr(a, bindings).ln(),
            BuiltinFn::Round(a) => eval_expr(a, bindings).round(),
            BuiltinFn::Sin(a) => eval_expr(a, bindings).sin(),
            BuiltinFn::Sqrt(a) => eval_expr(a, bindings).sqrt(),
            BuiltinFn::Tan(a) => eval_expr(a, bindings).tan(),
            BuiltinFn::Min(a, b) => {
                let a = eval_expr(a, bindings);
                let b = eval_expr(b, bindings);
                // we can't use std::cmp::min here, because f64 is only
                // PartialOrd
                if a < b { a } else { b }
            }
            BuiltinFn::Max(a, b) => {
                let a = eval_expr(a, bindings);
                let b = eval_expr(b, bindings);
                // we can't use std::cmp::max here, because f64 is only
                // PartialOrd
                if a > b { a } else { b }
            }
        },
        Expr::Op1(op, l, _) => {
            let l = eval_expr(l, bindings);
            match op {
                UnaryOp::Positive => l,
                UnaryOp::Negative => -l,
            }
        }
        Expr::Op2(op, l, r, _) => {
            let l = eval_expr(l, bindings);
            let r = eval_expr(r, bindings);
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Exp => l.powf(r),
            }
        }
    }
}

fn find_unresolved(expr: &Expr, bindings: &HashMap<Ident, f64>) -> Option<Loc> {
    match expr {
        Expr::Const(_, _, _) => None,
        Expr::Var(id, loc) => {
            if bindings.contains_key(id) {
                None
            } else {
                Some(*loc)
            }
        }
        Expr::App(builtin, _) => {
            let mut found = None;
            crate::builtins::walk_builtin_expr(builtin, |arg| {
                if found.is_none() {
                    found = find_unresolved(arg, bindings);
                }
            });
            found
        }
        Expr::Op1(_, l, _) => find_unresolved(l, bindings),
        Expr::Op2(_, l, r, _) => {
            find_unresolved(l, bindings).or_else(|| find_unresolved(r, bindings))
        }
    }
}

/// Evaluate expression text under a variable assignment.  A structural
/// problem (bad syntax, an identifier with no binding at all) is an error;
/// an identifier bound to NaN, or undefined arithmetic, is `Ok(NaN)`.
pub fn evaluate(expr: &str, bindings: &HashMap<Ident, f64>) -> EquationResult<f64> {
    let ast = parse_expr(expr)?;
    if let Some(loc) = find_unresolved(&ast, bindings) {
        return eqn_err!(UnknownDependency, loc.start, loc.end);
    }
    Ok(eval_expr(&ast, bindings))
}

/// The free variables of an expression, excluding the reserved function
/// vocabulary.
pub fn referenced_variables(expr: &str) -> EquationResult<BTreeSet<Ident>> {
    let ast = parse_expr(expr)?;
    let idents = identifier_set(&ast)
        .into_iter()
        .filter(|id| !is_builtin_fn(&id.to_lowercase()))
        .collect();
    Ok(idents)
}

/// True iff the trimmed text is exactly one identifier token.
pub fn is_bare_identifier(text: &str) -> bool {
    let mut found = false;
    for result in Lexer::new(text) {
        match result {
            Ok((_, Token::Ident(_), _)) if !found => found = true,
            _ => return false,
        }
    }
    found
}

/// True iff the text parses, references no variables, and evaluates to a
/// finite number.
pub fn is_constant_expression(text: &str) -> bool {
    let Ok(ast) = parse_expr(text) else {
        return false;
    };
    if !identifier_set(&ast).is_empty() {
        return false;
    }
    eval_expr(&ast, &HashMap::new()).is_finite()
}

/// True iff the trimmed text is a single, optionally signed, numeric
/// literal.
pub(crate) fn is_numeral(text: &str) -> bool {
    let mut saw_sign = false;
    let mut saw_num = false;
    for result in Lexer::new(text) {
        match result {
            Ok((_, Token::Plus | Token::Minus, _)) if !saw_sign && !saw_num => saw_sign = true,
            Ok((_, Token::Num(_), _)) if !saw_num => saw_num = true,
            _ => return false,
        }
    }
    saw_num
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, f64)]) -> HashMap<Ident, f64> {
        pairs
            .iter()
            .map(|(name, val)| (name.to_string(), *val))
            .collect()
    }

    #[test]
    fn test_fix_leading_zeros() {
        let cases: &[(&str, &str)] = &[
            ("010", "10"),
            ("007", "7"),
            ("0", "0"),
            ("00", "0"),
            ("0.5", "0.5"),
            ("00.5", "0.5"),
            ("100", "100"),
            ("var01", "var01"),
            ("var01x", "var01x"),
            ("x = 007", "x = 7"),
            ("a + 0", "a + 0"),
            ("", ""),
        ];
        for (input, expected) in cases {
            assert_eq!(*expected, fix_leading_zeros(input).unwrap(), "input: {input}");
        }
    }

    #[test]
    fn test_fix_leading_zeros_rejects_placeholder() {
        let input = "x + \u{e000}";
        let err = fix_leading_zeros(input).unwrap_err();
        assert_eq!(crate::common::ErrorCode::ReservedCharacter, err.code);
    }

    #[test]
    fn test_normalize() {
        let cases: &[(&str, &str)] = &[
            ("3x", "3*x"),
            ("2(a+b)", "2*(a+b)"),
            ("3 * x", "3 * x"),
            ("1e-3", "1e-3"),
            ("2.5E4x", "2.5E4*x"),
            ("2exp(x)", "2*exp(x)"),
            ("var01x", "var01x"),
            ("010", "10"),
            ("007x", "7*x"),
            ("a^2+b^2", "a^2+b^2"),
        ];
        for (input, expected) in cases {
            assert_eq!(*expected, normalize(input).unwrap(), "input: {input}");
        }
    }

    #[test]
    fn test_normalize_empty_is_error() {
        assert_eq!(
            crate::common::ErrorCode::EmptyEquation,
            normalize("").unwrap_err().code
        );
        assert_eq!(
            crate::common::ErrorCode::EmptyEquation,
            normalize("   ").unwrap_err().code
        );
    }

    #[test]
    fn test_evaluate() {
        let vars = bindings(&[("x", 2.0), ("a", 3.0), ("b", 4.0)]);

        assert_eq!(11.0, evaluate("3x + 5", &vars).unwrap());
        assert_eq!(25.0, evaluate("a^2+b^2", &vars).unwrap());
        assert_eq!(5.0, evaluate("sqrt(a^2+b^2)", &vars).unwrap());
        assert_eq!(4.0, evaluate("max(a, b)", &vars).unwrap());
        assert_eq!(3.0, evaluate("min(a, b)", &vars).unwrap());
        assert_eq!(10.0, evaluate("010", &vars).unwrap());
        assert_eq!(1.0, evaluate("exp(0)", &vars).unwrap());
    }

    #[test]
    fn test_evaluate_nan_is_a_value() {
        let vars = bindings(&[("x", f64::NAN)]);

        assert!(evaluate("sqrt(-1)", &vars).unwrap().is_nan());
        assert!(evaluate("0/0", &vars).unwrap().is_nan());
        assert!(evaluate("x + 1", &vars).unwrap().is_nan());
        assert!(evaluate("log(-2)", &vars).unwrap().is_nan());
    }

    #[test]
    fn test_evaluate_unknown_ident_is_an_error() {
        let vars = bindings(&[("x", 1.0)]);
        let err = evaluate("x + missing", &vars).unwrap_err();
        assert_eq!(crate::common::ErrorCode::UnknownDependency, err.code);
        assert_eq!((4, 11), (err.start as usize, err.end as usize));
    }

    #[test]
    fn test_referenced_variables() {
        let vars = referenced_variables("sqrt(a^2+b^2) + 2x").unwrap();
        let expected: Vec<&str> = vec!["a", "b", "x"];
        assert_eq!(
            expected,
            vars.iter().map(|s| s.as_str()).collect::<Vec<_>>()
        );

        // reserved function names are not variables
        assert!(referenced_variables("sqrt(4)").unwrap().is_empty());
    }

    #[test]
    fn test_is_bare_identifier() {
        assert!(is_bare_identifier("x"));
        assert!(is_bare_identifier("  hypotenuse "));
        assert!(is_bare_identifier("var01"));
        assert!(!is_bare_identifier("3"));
        assert!(!is_bare_identifier("x + y"));
        assert!(!is_bare_identifier("x y"));
        assert!(!is_bare_identifier(""));
    }

    #[test]
    fn test_is_constant_expression() {
        assert!(is_constant_expression("2 + 3"));
        assert!(is_constant_expression("sqrt(4)"));
        assert!(is_constant_expression("010"));
        assert!(!is_constant_expression("x + 1"));
        assert!(!is_constant_expression("1/0"));
        assert!(!is_constant_expression("sqrt(-1)"));
        assert!(!is_constant_expression(""));
    }

    #[test]
    fn test_is_numeral() {
        assert!(is_numeral("5"));
        assert!(is_numeral(" 3.14 "));
        assert!(is_numeral("1e-3"));
        assert!(is_numeral("-5"));
        assert!(is_numeral("+2.5"));
        assert!(!is_numeral("x"));
        assert!(!is_numeral("-x"));
        assert!(!is_numeral("2+3"));
        assert!(!is_numeral("--5"));
        assert!(!is_numeral(""));
    }
}
