// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Calcdown templates: plain text with `{...}` cells whose displayed
//! values stay mutually consistent under editing.  Cells compile to
//! equality chains, chains lower to an equation system, and a bounded
//! hybrid solver (algebraic strength propagation plus gradient
//! refinement) produces an assignment, a satisfiability verdict and
//! per-cell diagnostics on every edit.

#![forbid(unsafe_code)]

mod ast;
mod builtins;
mod calendar;
mod cell;
mod check;
pub mod common;
mod equation;
mod eval;
mod parser;
mod solver;
mod template;
mod token;

#[cfg(test)]
mod solver_proptest;

pub use self::ast::{BinaryOp, Expr, UnaryOp};
pub use self::builtins::{is_builtin_fn, BuiltinFn, Loc};
pub use self::calendar::epoch_seconds;
pub use self::cell::{parse_cell, parse_inequalities, Bounds, ColonError, Inequality, ParsedCell};
pub use self::check::{
    equations_satisfied, is_cell_violated, tolerance, unreferenced_variables, DEFAULT_ABS_TOL,
    DEFAULT_REL_TOL,
};
pub use self::common::{
    EquationError, EquationResult, Error, ErrorCode, ErrorKind, Ident, Result,
};
pub use self::equation::{build_equations, Equation, EquationSet, Term};
pub use self::eval::{
    evaluate, fix_leading_zeros, is_bare_identifier, is_constant_expression, normalize,
    parse_expr, referenced_variables,
};
pub use self::solver::{solve, solve_with_specs, Specs, Strength};
pub use self::template::{check_brace_syntax, extract_cells, Cell, Outcome, Template, TemplateError};
