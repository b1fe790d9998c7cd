// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Lowering from compiled cells to the equation system the solver works
//! on.  Every equality chain becomes one n-ary equation; pegged literals
//! ride along as trailing constant terms and frozen display values become
//! trailing pin equations.

use std::collections::{BTreeSet, HashMap};

use smallvec::{smallvec, SmallVec};

use crate::ast::{identifier_set, Expr};
use crate::cell::ParsedCell;
use crate::common::{EquationResult, Ident};
use crate::eval;

/// One term of an equality chain.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Num(f64),
    Var(Ident),
    Expr {
        src: String,
        ast: Expr,
        vars: BTreeSet<Ident>,
    },
}

impl Term {
    pub fn parse(src: &str) -> EquationResult<Term> {
        let ast = eval::parse_expr(src)?;
        if eval::is_numeral(src) {
            let no_vars: HashMap<Ident, f64> = HashMap::new();
            return Ok(Term::Num(eval::eval_expr(&ast, &no_vars)));
        }
        if eval::is_bare_identifier(src) {
            return Ok(Term::Var(src.trim().to_string()));
        }
        let vars = identifier_set(&ast);
        Ok(Term::Expr {
            src: src.trim().to_string(),
            ast,
            vars,
        })
    }

    /// The term's current value under the given bindings; NaN when a
    /// referenced variable has no value yet.
    pub fn value(&self, bindings: &HashMap<Ident, f64>) -> f64 {
        match self {
            Term::Num(n) => *n,
            Term::Var(ident) => bindings.get(ident).copied().unwrap_or(f64::NAN),
            Term::Expr { ast, .. } => eval::eval_expr(ast, bindings),
        }
    }

    pub fn identifiers(&self) -> BTreeSet<Ident> {
        match self {
            Term::Num(_) => BTreeSet::new(),
            Term::Var(ident) => BTreeSet::from([ident.clone()]),
            Term::Expr { vars, .. } => vars.clone(),
        }
    }
}

/// `t_0 = t_1 = … = t_n`, recorded as the ordered term list.
#[derive(Clone, Debug, PartialEq)]
pub struct Equation {
    pub terms: SmallVec<[Term; 2]>,
    /// index of the originating cell; pin equations have none
    pub cell_id: Option<usize>,
}

impl Equation {
    /// Build an equation straight from raw term sources, with no
    /// originating cell.
    pub fn parse_terms(sources: &[&str]) -> EquationResult<Equation> {
        let terms = sources
            .iter()
            .map(|src| Term::parse(src))
            .collect::<EquationResult<SmallVec<[Term; 2]>>>()?;
        Ok(Equation {
            terms,
            cell_id: None,
        })
    }

    pub fn identifiers(&self) -> BTreeSet<Ident> {
        let mut idents = BTreeSet::new();
        for term in &self.terms {
            idents.extend(term.identifiers());
        }
        idents
    }

    /// Sum of squared differences over consecutive term pairs.
    pub fn residual(&self, bindings: &HashMap<Ident, f64>) -> f64 {
        let mut sum = 0.0;
        for pair in self.terms.windows(2) {
            let diff = pair[0].value(bindings) - pair[1].value(bindings);
            sum += diff * diff;
        }
        sum
    }
}

/// Everything the solver needs: the equations in document order, soft
/// starting values from `:` clauses, and the full identifier universe.
#[derive(Clone, Debug, Default)]
pub struct EquationSet {
    pub equations: Vec<Equation>,
    pub seeds: HashMap<Ident, f64>,
    pub variables: BTreeSet<Ident>,
}

/// Lower compiled cells plus frozen display values to an equation set.
///
/// Cells with recorded problems still register the identifiers of any
/// terms that parse, so their variables show up in the universe, but they
/// contribute no equations or seeds.  Frozen values append after all cell
/// equations as `var = value` pins, sorted by name.
pub fn build_equations(cells: &[ParsedCell], frozen: &HashMap<Ident, f64>) -> EquationSet {
    let mut set = EquationSet::default();

    for cell in cells {
        if let Some(bounds) = &cell.ineq {
            set.variables.insert(bounds.var_name.clone());
            continue;
        }

        let mut terms: Vec<Term> = Vec::with_capacity(cell.ceqn.len() + 1);
        for src in &cell.ceqn {
            if let Ok(term) = Term::parse(src) {
                set.variables.extend(term.identifiers());
                terms.push(term);
            }
        }

        let clean = cell.errors.is_empty()
            && cell.colon_error.is_none()
            && !cell.multiple_numbers
            && !cell.ineq_error
            && terms.len() == cell.ceqn.len();
        if !clean {
            continue;
        }

        if let Some(value) = cell.cval {
            if cell.pegged {
                terms.push(Term::Num(value));
            } else if let Some(Term::Var(ident)) =
                terms.iter().find(|t| matches!(t, Term::Var(_)))
            {
                set.seeds.entry(ident.clone()).or_insert(value);
            }
        }

        if terms.len() >= 2 {
            set.equations.push(Equation {
                terms: SmallVec::from_vec(terms),
                cell_id: Some(cell.id),
            });
        }
    }

    let mut frozen_names: Vec<&Ident> = frozen.keys().collect();
    frozen_names.sort();
    for name in frozen_names {
        set.variables.insert(name.clone());
        set.equations.push(Equation {
            terms: smallvec![Term::Var(name.clone()), Term::Num(frozen[name])],
            cell_id: None,
        });
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::parse_cell;

    fn cells(texts: &[&str]) -> Vec<ParsedCell> {
        texts
            .iter()
            .enumerate()
            .map(|(id, text)| parse_cell(id, text))
            .collect()
    }

    #[test]
    fn test_term_parse() {
        assert_eq!(Ok(Term::Num(5.0)), Term::parse("5"));
        assert_eq!(Ok(Term::Num(-5.0)), Term::parse(" -5 "));
        assert_eq!(Ok(Term::Var("x".to_string())), Term::parse(" x "));

        let term = Term::parse("3x + 1").unwrap();
        match &term {
            Term::Expr { src, vars, .. } => {
                assert_eq!("3x + 1", src);
                assert_eq!(BTreeSet::from(["x".to_string()]), *vars);
            }
            _ => panic!("expected an expression term"),
        }

        assert!(Term::parse("foo(").is_err());
    }

    #[test]
    fn test_term_value() {
        let bindings: HashMap<Ident, f64> = [("x".to_string(), 2.0)].into_iter().collect();
        assert_eq!(5.0, Term::Num(5.0).value(&bindings));
        assert_eq!(2.0, Term::Var("x".to_string()).value(&bindings));
        assert!(Term::Var("y".to_string()).value(&bindings).is_nan());
        assert_eq!(7.0, Term::parse("3x + 1").unwrap().value(&bindings));
    }

    #[test]
    fn test_equation_parse_terms() {
        let eq = Equation::parse_terms(&["v1", "a^2+b^2", "c^2"]).unwrap();
        assert_eq!(3, eq.terms.len());
        assert_eq!(None, eq.cell_id);
        assert_eq!(
            BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string(), "v1".to_string()]),
            eq.identifiers()
        );

        assert!(Equation::parse_terms(&["x", "foo("]).is_err());
    }

    #[test]
    fn test_equation_residual() {
        let bindings: HashMap<Ident, f64> = [("x".to_string(), 3.0)].into_iter().collect();
        let eq = Equation {
            terms: smallvec![Term::Var("x".to_string()), Term::Num(5.0)],
            cell_id: Some(0),
        };
        assert_eq!(4.0, eq.residual(&bindings));
    }

    #[test]
    fn test_build_equations_basic() {
        let cells = cells(&["x = 5", "a = 3x", "c"]);
        let set = build_equations(&cells, &HashMap::new());

        assert_eq!(2, set.equations.len());
        assert_eq!(
            Equation {
                terms: smallvec![Term::Var("x".to_string()), Term::Num(5.0)],
                cell_id: Some(0),
            },
            set.equations[0]
        );
        assert_eq!(Some(1), set.equations[1].cell_id);
        assert_eq!(
            BTreeSet::from(["a".to_string(), "c".to_string(), "x".to_string()]),
            set.variables
        );
        assert!(set.seeds.is_empty());
    }

    #[test]
    fn test_build_equations_seeds() {
        let cells = cells(&["x : 5", "a = b : 3"]);
        let set = build_equations(&cells, &HashMap::new());

        // a soft default alone pins nothing
        assert_eq!(1, set.equations.len());
        assert_eq!(2, set.equations[0].terms.len());
        assert_eq!(Some(&5.0), set.seeds.get("x"));
        assert_eq!(Some(&3.0), set.seeds.get("a"));
    }

    #[test]
    fn test_build_equations_pegged_chain() {
        let cells = cells(&["v = a + b = 10"]);
        let set = build_equations(&cells, &HashMap::new());

        assert_eq!(1, set.equations.len());
        let terms = &set.equations[0].terms;
        assert_eq!(3, terms.len());
        assert_eq!(Term::Num(10.0), terms[2]);
        assert_eq!(
            BTreeSet::from(["a".to_string(), "b".to_string(), "v".to_string()]),
            set.variables
        );
    }

    #[test]
    fn test_build_equations_frozen_pins() {
        let cells = cells(&["c = 5x"]);
        let frozen: HashMap<Ident, f64> = [("x".to_string(), 10.0)].into_iter().collect();
        let set = build_equations(&cells, &frozen);

        assert_eq!(2, set.equations.len());
        let pin = &set.equations[1];
        assert_eq!(None, pin.cell_id);
        assert_eq!(
            SmallVec::<[Term; 2]>::from_vec(vec![
                Term::Var("x".to_string()),
                Term::Num(10.0)
            ]),
            pin.terms
        );
    }

    #[test]
    fn test_build_equations_skips_broken_cells() {
        let cells = cells(&["x = 5 = 6", "y = foo(1)", "10 > z > 0"]);
        let set = build_equations(&cells, &HashMap::new());

        assert!(set.equations.is_empty());
        // identifiers from parseable terms still register
        assert!(set.variables.contains("x"));
        assert!(set.variables.contains("y"));
        assert!(!set.variables.contains("z"));
    }

    #[test]
    fn test_build_equations_inequality_registers_variable() {
        let cells = cells(&["0 <= x < 10"]);
        let set = build_equations(&cells, &HashMap::new());

        assert!(set.equations.is_empty());
        assert!(set.variables.contains("x"));
    }
}
