// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Satisfiability verdicts and lint checks over a solved assignment.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::cell::ParsedCell;
use crate::common::Ident;
use crate::equation::Equation;
use crate::eval;

pub const DEFAULT_REL_TOL: f64 = 1e-3;
pub const DEFAULT_ABS_TOL: f64 = 1e-3;

/// The acceptance band around a value: `|value|·rel_tol + abs_tol`.
pub fn tolerance(value: f64, rel_tol: f64, abs_tol: f64) -> f64 {
    value.abs() * rel_tol + abs_tol
}

/// Two values agree when their difference is within the tolerance band of
/// the larger magnitude.  NaN never agrees with anything.
pub(crate) fn agrees(a: f64, b: f64) -> bool {
    if !a.is_finite() || !b.is_finite() {
        return false;
    }
    (a - b).abs() <= tolerance(a.abs().max(b.abs()), DEFAULT_REL_TOL, DEFAULT_ABS_TOL)
}

/// True iff every consecutive term pair of every equation agrees under the
/// assignment.
pub fn equations_satisfied(equations: &[Equation], values: &HashMap<Ident, f64>) -> bool {
    equations.iter().all(|eq| {
        eq.terms
            .windows(2)
            .all(|pair| agrees(pair[0].value(values), pair[1].value(values)))
    })
}

/// True iff the cell asserts a numeral the assignment does not honor.
/// Cells without a `cval` have nothing to violate; an evaluation failure
/// counts as disagreement.
pub fn is_cell_violated(cell: &ParsedCell, values: &HashMap<Ident, f64>) -> bool {
    let Some(cval) = cell.cval else {
        return false;
    };
    if cval.is_nan() {
        return true;
    }
    for src in &cell.ceqn {
        let Ok(value) = eval::evaluate(src, values) else {
            return true;
        };
        if !agrees(value, cval) {
            return true;
        }
    }
    false
}

/// Variables referenced by exactly one cell, with repeated occurrences
/// inside a single cell counted once.  A template-authoring warning, not a
/// solve failure.
pub fn unreferenced_variables(cells: &[ParsedCell]) -> Vec<Ident> {
    let mut counts: BTreeMap<Ident, usize> = BTreeMap::new();
    for cell in cells {
        let mut seen: BTreeSet<Ident> = BTreeSet::new();
        for src in &cell.ceqn {
            if let Ok(vars) = eval::referenced_variables(src) {
                seen.extend(vars);
            }
        }
        if let Some(bounds) = &cell.ineq {
            seen.insert(bounds.var_name.clone());
        }
        for name in seen {
            *counts.entry(name).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n == 1)
        .map(|(name, _)| name)
        .collect()
}
