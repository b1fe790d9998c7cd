// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Per-cell grammar: equality chains, soft-default clauses and bounded
//! inequalities.  Splitting happens on real tokens so that `=` and `:`
//! inside parentheses, `<=` sequences and exponent notation are never
//! mistaken for cell structure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{EquationError, Ident};
use crate::eval;
use crate::token::{Lexer, Spanned, Token};

/// Why a `:` clause was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColonError {
    /// more than one top-level `:`
    Multi,
    /// the clause contains `=`
    Rhs,
    /// `:` present but no numeral anywhere in the cell
    NoConst,
}

impl fmt::Display for ColonError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ColonError::Multi => "multi",
            ColonError::Rhs => "rhs",
            ColonError::NoConst => "noconst",
        };
        write!(f, "{name}")
    }
}

/// A closed or half-open interval constraint on a single variable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub inf: f64,
    pub sup: f64,
    pub inf_strict: bool,
    pub sup_strict: bool,
    pub var_name: Ident,
}

/// Result of scanning cell text for a two-comparison chain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Inequality {
    /// a relational chain was recognized (well formed or not)
    pub attempted: bool,
    /// the text ordinary parsing should continue with: the original text
    /// when no chain was attempted, the chained variable on success
    pub core: Option<String>,
    pub bounds: Option<Bounds>,
    pub error: bool,
}

impl Inequality {
    fn pass_through(core: &str) -> Self {
        Inequality {
            attempted: false,
            core: Some(core.to_string()),
            bounds: None,
            error: false,
        }
    }

    fn failed() -> Self {
        Inequality {
            attempted: true,
            core: None,
            bounds: None,
            error: true,
        }
    }
}

/// The compiled form of one cell.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedCell {
    pub id: usize,
    /// ordered non-numeral terms of the `=` chain
    pub ceqn: Vec<String>,
    /// the cell's numeric assertion or soft default
    pub cval: Option<f64>,
    /// true iff cval came from the `=` chain
    pub pegged: bool,
    pub colon_error: Option<ColonError>,
    pub multiple_numbers: bool,
    pub ineq: Option<Bounds>,
    pub ineq_error: bool,
    pub errors: Vec<EquationError>,
}

impl ParsedCell {
    fn new(id: usize) -> Self {
        ParsedCell {
            id,
            ceqn: Vec::new(),
            cval: None,
            pegged: false,
            colon_error: None,
            multiple_numbers: false,
            ineq: None,
            ineq_error: false,
            errors: Vec::new(),
        }
    }
}

/// Recognize `bound (<|<=) ident (<|<=) bound` at the top level of the
/// text.  Plain non-relational text passes through untouched; a malformed
/// attempt (reversed direction, wrong comparison count, non-identifier
/// middle, non-constant bounds, inverted or empty interval) is an error.
pub fn parse_inequalities(core: &str) -> Inequality {
    let tokens: Vec<Spanned<Token<'_>>> = match Lexer::new(core).collect() {
        Ok(tokens) => tokens,
        // not a recognizable chain; the ordinary path reports the bad char
        Err(_) => return Inequality::pass_through(core),
    };

    let mut depth = 0i32;
    let mut comparisons: Vec<usize> = Vec::new();
    let mut reversed = false;
    for (i, (_, tok, _)) in tokens.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Lt | Token::Lte if depth == 0 => comparisons.push(i),
            Token::Gt | Token::Gte if depth == 0 => {
                comparisons.push(i);
                reversed = true;
            }
            _ => {}
        }
    }

    if comparisons.is_empty() {
        return Inequality::pass_through(core);
    }
    if reversed || comparisons.len() != 2 {
        return Inequality::failed();
    }

    let (c1, c2) = (comparisons[0], comparisons[1]);
    let inf_text = &core[..tokens[c1].0];
    let mid_text = &core[tokens[c1].2..tokens[c2].0];
    let sup_text = &core[tokens[c2].2..];

    if !eval::is_bare_identifier(mid_text) {
        return Inequality::failed();
    }
    // constant bounds keep the chain's only variable out of its own bounds
    if !eval::is_constant_expression(inf_text) || !eval::is_constant_expression(sup_text) {
        return Inequality::failed();
    }

    let no_vars: HashMap<Ident, f64> = HashMap::new();
    let (Ok(inf), Ok(sup)) = (
        eval::evaluate(inf_text, &no_vars),
        eval::evaluate(sup_text, &no_vars),
    ) else {
        return Inequality::failed();
    };

    let inf_strict = matches!(tokens[c1].1, Token::Lt);
    let sup_strict = matches!(tokens[c2].1, Token::Lt);

    if inf > sup || (inf == sup && (inf_strict || sup_strict)) {
        return Inequality::failed();
    }

    let var_name = mid_text.trim().to_string();
    Inequality {
        attempted: true,
        core: Some(var_name.clone()),
        bounds: Some(Bounds {
            inf,
            sup,
            inf_strict,
            sup_strict,
            var_name,
        }),
        error: false,
    }
}

/// Parse one cell's text into its compiled form.  Failures are recorded on
/// the cell; this never aborts the surrounding template.
pub fn parse_cell(id: usize, urtext: &str) -> ParsedCell {
    let mut cell = ParsedCell::new(id);

    let tokens: Vec<Spanned<Token<'_>>> = match Lexer::new(urtext).collect() {
        Ok(tokens) => tokens,
        Err(err) => {
            cell.errors.push(err);
            return cell;
        }
    };

    let mut depth = 0i32;
    let mut colons: Vec<usize> = Vec::new();
    let mut eqs: Vec<usize> = Vec::new();
    let mut comparisons = false;
    for (i, (_, tok, _)) in tokens.iter().enumerate() {
        match tok {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::Colon if depth == 0 => colons.push(i),
            Token::Eq if depth == 0 => eqs.push(i),
            Token::Lt | Token::Lte | Token::Gt | Token::Gte if depth == 0 => comparisons = true,
            _ => {}
        }
    }

    // only a cell with no chain structure at all can be an inequality
    if colons.is_empty() && eqs.is_empty() && comparisons {
        let scan = parse_inequalities(urtext);
        if scan.error {
            cell.ineq_error = true;
        } else {
            cell.ineq = scan.bounds;
        }
        return cell;
    }

    if colons.len() > 1 {
        cell.colon_error = Some(ColonError::Multi);
        return cell;
    }

    let colon = colons.first().copied();
    if let Some(ci) = colon {
        let eq_in_clause = tokens[ci + 1..]
            .iter()
            .any(|(_, tok, _)| matches!(tok, Token::Eq));
        if eq_in_clause {
            cell.colon_error = Some(ColonError::Rhs);
            return cell;
        }
    }

    // the `=` chain runs up to the colon (or the whole cell)
    let chain_end = match colon {
        Some(ci) => tokens[ci].0,
        None => urtext.len(),
    };
    let chain_eqs: Vec<usize> = match colon {
        Some(ci) => eqs.into_iter().filter(|&i| i < ci).collect(),
        None => eqs,
    };

    let mut segments: Vec<(usize, usize)> = Vec::new();
    let mut seg_start = 0;
    for &i in &chain_eqs {
        segments.push((seg_start, tokens[i].0));
        seg_start = tokens[i].2;
    }
    segments.push((seg_start, chain_end));

    for &(start, end) in &segments {
        if urtext[start..end].trim().is_empty() {
            cell.ceqn.clear();
            cell.errors.push(EquationError {
                start: start as u16,
                end: end as u16,
                code: crate::common::ErrorCode::EmptyEquation,
            });
            return cell;
        }
    }

    let no_vars: HashMap<Ident, f64> = HashMap::new();
    let mut numerals: Vec<f64> = Vec::new();
    for &(start, end) in &segments {
        let seg = &urtext[start..end];
        if eval::is_numeral(seg) {
            if let Ok(value) = eval::evaluate(seg, &no_vars) {
                numerals.push(value);
            }
        } else {
            cell.ceqn.push(seg.trim().to_string());
            if let Err(err) = eval::parse_expr(seg) {
                cell.errors.push(EquationError {
                    start: (err.start as usize + start) as u16,
                    end: (err.end as usize + start) as u16,
                    code: err.code,
                });
            }
        }
    }

    if let Some(&first) = numerals.first() {
        cell.cval = Some(first);
        cell.pegged = true;
        cell.multiple_numbers = numerals.iter().any(|&v| v != first);
    }

    if let Some(ci) = colon {
        let clause = &urtext[tokens[ci].2..];
        if eval::is_numeral(clause) {
            if cell.cval.is_none() {
                if let Ok(value) = eval::evaluate(clause, &no_vars) {
                    cell.cval = Some(value);
                    cell.pegged = false;
                }
            }
        } else if cell.cval.is_none() {
            cell.colon_error = Some(ColonError::NoConst);
        }
    }

    cell
}
