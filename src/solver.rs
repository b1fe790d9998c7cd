// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hybrid equation solver.  A first, algebraic phase propagates values
//! between terms by strength, pinning variables asserted by literals and
//! back-solving single unknowns with Newton's method.  A second phase
//! refines whatever is left with RMSProp-style gradient descent over the
//! total squared residual.  Every phase is bounded, so the solver always
//! terminates; unsatisfiable systems settle to a best effort and are
//! reported through the satisfiability check, not an error.

use std::collections::{BTreeSet, HashMap};

use float_cmp::approx_eq;

use crate::ast::Expr;
use crate::check::{tolerance, DEFAULT_ABS_TOL, DEFAULT_REL_TOL};
use crate::common::Ident;
use crate::equation::{Equation, Term};
use crate::eval::eval_expr;

/// Still-unset variables get this after propagation.  Non-zero, so the
/// residual surface is not flat at the start of descent.
const GAP_FILL_VALUE: f64 = 1.0;
/// Relative scale of forward-difference probes.
const FORWARD_DIFF_SCALE: f64 = 1e-6;
/// Disagreement below this never triggers an equal-strength overwrite.
const EQUAL_STRENGTH_EPSILON: f64 = 1e-9;

/// How firmly a variable's current value is held.  Ordered weakest first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strength {
    /// nothing known yet
    Unset,
    /// warm start or soft default
    Seeded,
    /// recomputed from the variables it tracks
    Derived,
    /// asserted by a literal or an all-hard expression
    Hard,
}

/// Iteration budgets and step sizes.  The defaults terminate quickly on
/// well-posed templates and bound the damage on pathological ones.
#[derive(Clone, Debug, PartialEq)]
pub struct Specs {
    /// propagation rounds, multiplied by the variable count
    pub rounds_per_variable: usize,
    pub newton_iterations: usize,
    pub dependency_rounds: usize,
    pub gradient_iterations: usize,
    pub gradient_decay: f64,
    pub gradient_rate: f64,
    pub gradient_clip: f64,
    pub rms_epsilon: f64,
    pub residual_epsilon: f64,
}

impl Default for Specs {
    fn default() -> Self {
        Specs {
            rounds_per_variable: 4,
            newton_iterations: 10,
            dependency_rounds: 3,
            gradient_iterations: 50_000,
            gradient_decay: 0.9,
            gradient_rate: 1e-3,
            gradient_clip: 1.0,
            rms_epsilon: 1e-12,
            residual_epsilon: 1e-9,
        }
    }
}

#[derive(Clone, Debug)]
struct VarState {
    strength: Strength,
    /// pinned variables never move again
    pinned: bool,
    /// `(equation, term)` this variable is wholly defined by
    dep: Option<(usize, usize)>,
}

struct Dependency {
    ident: Ident,
    equation: usize,
    term: usize,
}

pub fn solve(equations: &[Equation], initial: &HashMap<Ident, f64>) -> HashMap<Ident, f64> {
    solve_with_specs(equations, initial, &Specs::default())
}

pub fn solve_with_specs(
    equations: &[Equation],
    initial: &HashMap<Ident, f64>,
    specs: &Specs,
) -> HashMap<Ident, f64> {
    let mut universe: BTreeSet<Ident> = BTreeSet::new();
    for eq in equations {
        universe.extend(eq.identifiers());
    }

    let mut values: HashMap<Ident, f64> = HashMap::new();
    let mut meta: HashMap<Ident, VarState> = HashMap::new();
    for name in &universe {
        let strength = match initial.get(name) {
            Some(&v) if v.is_finite() => {
                values.insert(name.clone(), v);
                Strength::Seeded
            }
            _ => Strength::Unset,
        };
        meta.insert(
            name.clone(),
            VarState {
                strength,
                pinned: false,
                dep: None,
            },
        );
    }

    let round_cap = specs.rounds_per_variable * universe.len().max(1);
    for _ in 0..round_cap {
        let mut changed = false;
        for (eq_idx, eq) in equations.iter().enumerate() {
            changed |= propagate_equation(eq_idx, eq, &mut values, &mut meta, specs);
        }
        if !changed {
            break;
        }
    }

    for name in &universe {
        values.entry(name.clone()).or_insert(GAP_FILL_VALUE);
    }

    let deps = collect_dependencies(&meta);
    enforce_dependencies(&deps, equations, &mut values, specs.dependency_rounds);
    for dep in &deps {
        if let Some(state) = meta.get_mut(&dep.ident) {
            if state.strength < Strength::Derived {
                state.strength = Strength::Derived;
            }
        }
    }

    let free: Vec<Ident> = universe
        .iter()
        .filter(|name| {
            meta.get(*name)
                .is_none_or(|state| !state.pinned && state.dep.is_none())
        })
        .cloned()
        .collect();
    refine(equations, &deps, &free, &mut values, specs);

    values
}

fn term_strength(term: &Term, meta: &HashMap<Ident, VarState>) -> Strength {
    match term {
        Term::Num(_) => Strength::Hard,
        Term::Var(name) => meta.get(name).map_or(Strength::Unset, |m| m.strength),
        Term::Expr { vars, .. } => vars
            .iter()
            .map(|v| meta.get(v).map_or(Strength::Unset, |m| m.strength))
            .min()
            .unwrap_or(Strength::Hard),
    }
}

fn is_candidate(
    name: &Ident,
    anchor_strength: Strength,
    values: &HashMap<Ident, f64>,
    meta: &HashMap<Ident, VarState>,
) -> bool {
    let Some(state) = meta.get(name) else {
        return false;
    };
    if state.pinned {
        return false;
    }
    !values.contains_key(name) || state.strength < anchor_strength
}

fn candidate_count(
    term: &Term,
    anchor_strength: Strength,
    values: &HashMap<Ident, f64>,
    meta: &HashMap<Ident, VarState>,
) -> usize {
    match term {
        Term::Num(_) => 0,
        Term::Var(name) => usize::from(is_candidate(name, anchor_strength, values, meta)),
        Term::Expr { vars, .. } => vars
            .iter()
            .filter(|v| is_candidate(v, anchor_strength, values, meta))
            .count(),
    }
}

/// One pass over one equation.  Returns whether any variable's value,
/// strength or pin state changed.
fn propagate_equation(
    eq_idx: usize,
    eq: &Equation,
    values: &mut HashMap<Ident, f64>,
    meta: &mut HashMap<Ident, VarState>,
    specs: &Specs,
) -> bool {
    let strengths: Vec<Strength> = eq.terms.iter().map(|t| term_strength(t, meta)).collect();
    let term_values: Vec<f64> = eq.terms.iter().map(|t| t.value(values)).collect();

    // the anchor is the strongest term with a usable value; first wins ties
    let mut anchor: Option<usize> = None;
    for (i, value) in term_values.iter().enumerate() {
        if !value.is_finite() {
            continue;
        }
        match anchor {
            Some(a) if strengths[i] <= strengths[a] => {}
            _ => anchor = Some(i),
        }
    }
    let Some(anchor) = anchor else {
        return false;
    };
    let anchor_strength = strengths[anchor];
    let anchor_value = term_values[anchor];
    let anchor_ids = eq.terms[anchor].identifiers();

    let mut changed = false;
    for (i, term) in eq.terms.iter().enumerate() {
        if i == anchor {
            continue;
        }
        match term {
            Term::Num(_) => {}
            Term::Var(name) => {
                if anchor_ids.contains(name) {
                    continue;
                }
                let Some(state) = meta.get(name) else {
                    continue;
                };
                if state.pinned {
                    continue;
                }
                if eq.terms.len() == 2 && state.dep.is_none() {
                    if let Some(state) = meta.get_mut(name) {
                        state.dep = Some((eq_idx, 1 - i));
                    }
                }

                let state = &meta[name];
                let current = values.get(name).copied();
                let stronger = state.strength < anchor_strength;
                let overwrite = if stronger {
                    current != Some(anchor_value)
                } else if state.strength == anchor_strength {
                    match current {
                        None => true,
                        Some(c) => !approx_eq!(
                            f64,
                            c,
                            anchor_value,
                            epsilon = EQUAL_STRENGTH_EPSILON,
                            ulps = 2
                        ),
                    }
                } else {
                    false
                };

                if overwrite || stronger {
                    if overwrite {
                        values.insert(name.clone(), anchor_value);
                    }
                    if let Some(state) = meta.get_mut(name) {
                        state.strength = anchor_strength;
                        if anchor_strength == Strength::Hard {
                            state.pinned = true;
                            state.dep = None;
                        }
                    }
                    changed = true;
                }
            }
            Term::Expr { ast, vars, .. } => {
                // already consistent with the anchor, nothing to solve
                if term_values[i].is_finite()
                    && (term_values[i] - anchor_value).abs()
                        <= tolerance(anchor_value, DEFAULT_REL_TOL, DEFAULT_ABS_TOL)
                {
                    continue;
                }
                let mut cands = vars
                    .iter()
                    .filter(|v| is_candidate(v, anchor_strength, values, meta));
                let Some(unknown) = cands.next() else {
                    continue;
                };
                if cands.next().is_some() || anchor_ids.contains(unknown) {
                    continue;
                }
                // a second underdetermined term means this one is not
                // uniquely solvable either
                let crowded = eq.terms.iter().enumerate().any(|(j, other)| {
                    j != i
                        && j != anchor
                        && candidate_count(other, anchor_strength, values, meta) > 1
                });
                if crowded {
                    continue;
                }

                let unknown = unknown.clone();
                if let Some(root) = newton_solve(ast, &unknown, anchor_value, values, specs) {
                    let value_changed = values.get(&unknown).copied() != Some(root);
                    let strength_changed = meta[&unknown].strength < anchor_strength;
                    if value_changed || strength_changed {
                        values.insert(unknown.clone(), root);
                        if let Some(state) = meta.get_mut(&unknown) {
                            if strength_changed {
                                state.strength = anchor_strength;
                            }
                            if anchor_strength == Strength::Hard {
                                state.pinned = true;
                                state.dep = None;
                            }
                        }
                        changed = true;
                    }
                }
            }
        }
    }
    changed
}

/// Solve `expr(unknown) = target` for the single unknown.  The root is
/// accepted only when it drives the expression within tolerance of the
/// target.
fn newton_solve(
    ast: &Expr,
    unknown: &Ident,
    target: f64,
    values: &HashMap<Ident, f64>,
    specs: &Specs,
) -> Option<f64> {
    let mut scratch = values.clone();
    let mut u = values
        .get(unknown)
        .copied()
        .filter(|v| v.is_finite())
        .unwrap_or(GAP_FILL_VALUE);
    let tol = tolerance(target, DEFAULT_REL_TOL, DEFAULT_ABS_TOL);

    for iteration in 0..=specs.newton_iterations {
        scratch.insert(unknown.clone(), u);
        let fu = eval_expr(ast, &scratch);
        if (fu - target).abs() <= tol {
            return Some(u);
        }
        if iteration == specs.newton_iterations {
            break;
        }
        let h = FORWARD_DIFF_SCALE * u.abs().max(1.0);
        scratch.insert(unknown.clone(), u + h);
        let slope = (eval_expr(ast, &scratch) - fu) / h;
        if !slope.is_finite() || slope == 0.0 {
            return None;
        }
        let next = u - (fu - target) / slope;
        if !next.is_finite() {
            return None;
        }
        u = next;
    }
    None
}

fn collect_dependencies(meta: &HashMap<Ident, VarState>) -> Vec<Dependency> {
    let mut deps: Vec<Dependency> = meta
        .iter()
        .filter(|(_, state)| !state.pinned)
        .filter_map(|(name, state)| {
            state.dep.map(|(equation, term)| Dependency {
                ident: name.clone(),
                equation,
                term,
            })
        })
        .collect();
    deps.sort_by(|a, b| a.ident.cmp(&b.ident));
    deps
}

/// Recompute every dependency-linked variable from its defining term,
/// iterated to a small fixed point.
fn enforce_dependencies(
    deps: &[Dependency],
    equations: &[Equation],
    values: &mut HashMap<Ident, f64>,
    rounds: usize,
) {
    for _ in 0..rounds {
        let mut changed = false;
        for dep in deps {
            let value = equations[dep.equation].terms[dep.term].value(values);
            if !value.is_finite() {
                continue;
            }
            if values.get(&dep.ident) != Some(&value) {
                values.insert(dep.ident.clone(), value);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

fn total_residual(equations: &[Equation], values: &HashMap<Ident, f64>) -> f64 {
    equations.iter().map(|eq| eq.residual(values)).sum()
}

/// RMSProp-style descent over the free variables.  Expects dependency
/// links already enforced on entry.
fn refine(
    equations: &[Equation],
    deps: &[Dependency],
    free: &[Ident],
    values: &mut HashMap<Ident, f64>,
    specs: &Specs,
) {
    if free.is_empty() {
        return;
    }
    let mut ms = vec![0.0f64; free.len()];
    let mut grads = vec![0.0f64; free.len()];

    for _ in 0..specs.gradient_iterations {
        let residual = total_residual(equations, values);
        if !residual.is_finite() || residual <= specs.residual_epsilon {
            break;
        }

        for (slot, name) in free.iter().enumerate() {
            let base = values.get(name).copied().unwrap_or(GAP_FILL_VALUE);
            let h = FORWARD_DIFF_SCALE * base.abs().max(1.0);
            let mut probe = values.clone();
            probe.insert(name.clone(), base + h);
            enforce_dependencies(deps, equations, &mut probe, specs.dependency_rounds);
            grads[slot] = (total_residual(equations, &probe) - residual) / h;
        }

        for (slot, name) in free.iter().enumerate() {
            let g = grads[slot];
            if !g.is_finite() {
                continue;
            }
            ms[slot] = specs.gradient_decay * ms[slot] + (1.0 - specs.gradient_decay) * g * g;
            let step = specs.gradient_rate * g / (ms[slot] + specs.rms_epsilon).sqrt();
            if !step.is_finite() {
                continue;
            }
            let step = step.clamp(-specs.gradient_clip, specs.gradient_clip);
            if let Some(value) = values.get_mut(name) {
                *value -= step;
            }
        }

        enforce_dependencies(deps, equations, values, specs.dependency_rounds);
    }
}
