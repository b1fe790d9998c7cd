// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Templates: brace checking, cell extraction, and the compile/solve
//! pipeline tying the cell compiler, equation builder, solver and checks
//! together.  All offsets are byte offsets into the template text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cell::{parse_cell, ParsedCell};
use crate::check;
use crate::common::{ErrorCode, Ident, Result};
use crate::equation::build_equations;
use crate::{solver, template_err};

/// A brace problem at a specific offset in the template text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateError {
    pub loc: usize,
    pub code: ErrorCode,
}

/// One cell of the template: the text between `{` and `}`.  `start` is the
/// offset of the opening brace, `end` is one past the closing brace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub id: usize,
    pub urtext: String,
    pub start: usize,
    pub end: usize,
}

/// Scan the whole template for brace problems: nested `{`, stray `}`, and
/// an unclosed `{` at end of input.  An empty result means well-formed.
pub fn check_brace_syntax(text: &str) -> Vec<TemplateError> {
    let mut errors = Vec::new();
    let mut open: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if open.is_some() {
                    errors.push(TemplateError {
                        loc: i,
                        code: ErrorCode::NestedBrace,
                    });
                } else {
                    open = Some(i);
                }
            }
            '}' => {
                if open.is_some() {
                    open = None;
                } else {
                    errors.push(TemplateError {
                        loc: i,
                        code: ErrorCode::StrayCloseBrace,
                    });
                }
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        errors.push(TemplateError {
            loc: start,
            code: ErrorCode::UnclosedBrace,
        });
    }

    errors
}

/// Extract cells in document order.  Assumes the text passed
/// `check_brace_syntax`; on malformed input unpaired braces are skipped.
pub fn extract_cells(text: &str) -> Vec<Cell> {
    let mut cells = Vec::new();
    let mut open: Option<usize> = None;

    for (i, c) in text.char_indices() {
        match c {
            '{' if open.is_none() => open = Some(i),
            '}' => {
                if let Some(start) = open.take() {
                    cells.push(Cell {
                        id: cells.len(),
                        urtext: text[start + 1..i].to_string(),
                        start,
                        end: i + 1,
                    });
                }
            }
            _ => {}
        }
    }

    cells
}

/// A compiled template: the raw text, the extracted cells, and each
/// cell's parsed form.  Compilation fails only on brace syntax; every
/// other problem stays local to its cell.
#[derive(Clone, Debug)]
pub struct Template {
    pub text: String,
    pub cells: Vec<Cell>,
    pub parsed: Vec<ParsedCell>,
}

/// One solve pass, ready for the host to render.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outcome {
    pub values: HashMap<Ident, f64>,
    pub equations_satisfied: bool,
    pub violated_cells: Vec<usize>,
    pub unreferenced: Vec<Ident>,
    pub cells: Vec<ParsedCell>,
}

impl Template {
    pub fn compile(text: &str) -> Result<Template> {
        let brace_errors = check_brace_syntax(text);
        if !brace_errors.is_empty() {
            let details = brace_errors
                .iter()
                .map(|err| format!("{}@{}", err.code, err.loc))
                .collect::<Vec<String>>()
                .join(", ");
            return template_err!(BraceSyntax, details);
        }

        let cells = extract_cells(text);
        let parsed = cells
            .iter()
            .map(|cell| parse_cell(cell.id, &cell.urtext))
            .collect();
        Ok(Template {
            text: text.to_string(),
            cells,
            parsed,
        })
    }

    /// Build the equation system, fold soft defaults into the starting
    /// assignment (caller values win), solve, and check.  Pass a previous
    /// `Outcome::values` back as `initial` to warm start.
    pub fn solve(&self, frozen: &HashMap<Ident, f64>, initial: &HashMap<Ident, f64>) -> Outcome {
        let set = build_equations(&self.parsed, frozen);

        let mut start = initial.clone();
        for (name, value) in &set.seeds {
            start.entry(name.clone()).or_insert(*value);
        }

        let mut values = solver::solve(&set.equations, &start);
        // variables no equation mentions keep their incoming value
        for name in &set.variables {
            if !values.contains_key(name) {
                values.insert(name.clone(), start.get(name).copied().unwrap_or(f64::NAN));
            }
        }

        let equations_satisfied = check::equations_satisfied(&set.equations, &values);
        let violated_cells: Vec<usize> = self
            .parsed
            .iter()
            .filter(|cell| check::is_cell_violated(cell, &values))
            .map(|cell| cell.id)
            .collect();
        let unreferenced = check::unreferenced_variables(&self.parsed);

        Outcome {
            values,
            equations_satisfied,
            violated_cells,
            unreferenced,
            cells: self.parsed.clone(),
        }
    }
}
