// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for the template pipeline using proptest.
//!
//! These tests verify that:
//! 1. Balanced templates extract cells with exact source offsets
//! 2. Unbalanced templates are rejected by the brace checker
//! 3. Pegged literals propagate through equality chains exactly
//! 4. Re-solving from a previous result leaves values untouched
//! 5. The solver only ever reports finite values

use std::collections::HashMap;

use proptest::prelude::*;

use crate::builtins::is_builtin_fn;
use crate::cell::{ParsedCell, parse_cell};
use crate::common::ErrorCode;
use crate::equation::build_equations;
use crate::solver::{self, Specs};
use crate::template::{Template, check_brace_syntax, extract_cells};

// Strategy helpers for generating prose, identifiers, and cell bodies

fn prose_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,]{0,16}".prop_map(|s| s.to_string())
}

fn ident_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,12}".prop_map(|s| s.to_string())
}

fn var_strategy() -> impl Strategy<Value = String> {
    ident_strategy().prop_filter("reserved function name", |s| !is_builtin_fn(s))
}

/// A tiny shared alphabet so generated cells collide on variables often
/// enough to exercise multi-equation systems and contradictions.
fn pool_var_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("a".to_string()),
        Just("b".to_string()),
        Just("c".to_string()),
    ]
}

fn cell_body_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        pool_var_strategy(),
        (pool_var_strategy(), -99i32..99).prop_map(|(v, n)| format!("{} = {}", v, n)),
        (pool_var_strategy(), pool_var_strategy()).prop_map(|(x, y)| format!("{} = {}", x, y)),
        (pool_var_strategy(), 1i32..9, pool_var_strategy())
            .prop_map(|(x, k, y)| format!("{} = {}*{}", x, k, y)),
        (pool_var_strategy(), pool_var_strategy(), pool_var_strategy())
            .prop_map(|(x, y, z)| format!("{} = {}/{}", x, y, z)),
        (pool_var_strategy(), 1i32..99).prop_map(|(v, n)| format!("{} : {}", v, n)),
        (0i32..5, pool_var_strategy(), 5i32..99)
            .prop_map(|(lo, v, hi)| format!("{} < {} < {}", lo, v, hi)),
        // deliberately malformed; the pipeline must shrug these off
        Just("= =".to_string()),
        Just("9 8".to_string()),
    ]
}

// Grammar properties

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn balanced_templates_extract_exact_offsets(
        parts in prop::collection::vec((prose_strategy(), cell_body_strategy()), 0..6),
        tail in prose_strategy(),
    ) {
        let mut text = String::new();
        let mut expected = Vec::new();
        for (prose, body) in &parts {
            text.push_str(prose);
            let start = text.len();
            text.push('{');
            text.push_str(body);
            text.push('}');
            expected.push((start, text.len(), body.clone()));
        }
        text.push_str(&tail);

        prop_assert!(check_brace_syntax(&text).is_empty());

        let cells = extract_cells(&text);
        prop_assert_eq!(expected.len(), cells.len());
        for (i, cell) in cells.iter().enumerate() {
            prop_assert_eq!(i, cell.id);
            prop_assert_eq!(expected[i].0, cell.start);
            prop_assert_eq!(expected[i].1, cell.end);
            prop_assert_eq!(&expected[i].2, &cell.urtext);
        }
    }

    #[test]
    fn unclosed_cell_is_reported_at_its_opening_brace(
        prefix in prose_strategy(),
        body in cell_body_strategy(),
    ) {
        let text = format!("{}{{{}", prefix, body);
        let errors = check_brace_syntax(&text);
        prop_assert_eq!(1, errors.len());
        prop_assert_eq!(ErrorCode::UnclosedBrace, errors[0].code);
        prop_assert_eq!(prefix.len(), errors[0].loc);
    }

    #[test]
    fn stray_close_is_reported_at_its_brace(
        prefix in prose_strategy(),
        tail in prose_strategy(),
    ) {
        let text = format!("{}}}{}", prefix, tail);
        let errors = check_brace_syntax(&text);
        prop_assert_eq!(1, errors.len());
        prop_assert_eq!(ErrorCode::StrayCloseBrace, errors[0].code);
        prop_assert_eq!(prefix.len(), errors[0].loc);
    }
}

// Solver properties

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn pegged_literal_pins_the_whole_chain(
        base in var_strategy(),
        n in 2usize..6,
        v in -500i32..500,
    ) {
        let vars: Vec<String> = (0..n).map(|i| format!("{}{}", base, i)).collect();
        let text = format!("{{{} = {}}}", vars.join(" = "), v);

        let template = Template::compile(&text).unwrap();
        let outcome = template.solve(&HashMap::new(), &HashMap::new());

        prop_assert!(outcome.equations_satisfied);
        prop_assert!(outcome.violated_cells.is_empty());
        for var in &vars {
            prop_assert_eq!(v as f64, outcome.values[var.as_str()]);
        }
    }

    #[test]
    fn linear_two_cell_templates_solve_exactly(
        x in var_strategy(),
        y in var_strategy(),
        k in 1i32..20,
        v in -100i32..100,
    ) {
        prop_assume!(x != y);
        let text = format!("{{{} = {}}} and {{{} = {}*{}}}", x, v, y, k, x);

        let template = Template::compile(&text).unwrap();
        let outcome = template.solve(&HashMap::new(), &HashMap::new());

        prop_assert!(outcome.equations_satisfied);
        prop_assert!(outcome.violated_cells.is_empty());
        prop_assert_eq!(v as f64, outcome.values[x.as_str()]);
        prop_assert_eq!((k * v) as f64, outcome.values[y.as_str()]);
        prop_assert_eq!(&vec![y.clone()], &outcome.unreferenced);
    }

    #[test]
    fn resolving_from_a_previous_result_is_stable(
        x in var_strategy(),
        y in var_strategy(),
        k in 1i32..20,
        v in -100i32..100,
    ) {
        prop_assume!(x != y);
        let text = format!("{{{} = {}}} and {{{} = {}*{}}}", x, v, y, k, x);

        let template = Template::compile(&text).unwrap();
        let frozen = HashMap::new();
        let first = template.solve(&frozen, &HashMap::new());
        let second = template.solve(&frozen, &first.values);

        prop_assert_eq!(&first.values, &second.values);
        prop_assert_eq!(first.equations_satisfied, second.equations_satisfied);
        prop_assert_eq!(&first.violated_cells, &second.violated_cells);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Whatever mix of well-formed, contradictory, and malformed cells a
    /// document holds, the solver never hands back NaN or an infinity.
    #[test]
    fn solver_reports_only_finite_values(
        bodies in prop::collection::vec(cell_body_strategy(), 1..6),
    ) {
        let cells: Vec<ParsedCell> = bodies
            .iter()
            .enumerate()
            .map(|(id, body)| parse_cell(id, body))
            .collect();
        let set = build_equations(&cells, &HashMap::new());

        // descent length does not matter for this property
        let specs = Specs {
            gradient_iterations: 500,
            ..Specs::default()
        };
        let values = solver::solve_with_specs(&set.equations, &set.seeds, &specs);

        for (name, value) in &values {
            prop_assert!(value.is_finite(), "{} resolved to {}", name, value);
        }
    }
}
