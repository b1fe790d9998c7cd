// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use crate::builtins::{BuiltinFn, Loc, walk_builtin_expr};
use crate::common::Ident;

/// An arithmetic expression as written inside a cell.  Comparison and
/// equality operators never appear here; cells are split on those at the
/// token level before expression parsing.
#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    Const(String, f64, Loc),
    Var(Ident, Loc),
    App(BuiltinFn<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum UnaryOp {
    Positive,
    Negative,
}

impl Expr {
    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Const(_, _, loc) => *loc,
            Expr::Var(_, loc) => *loc,
            Expr::App(_, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
        }
    }
}

fn collect_identifiers(expr: &Expr, idents: &mut BTreeSet<Ident>) {
    match expr {
        Expr::Const(_, _, _) => {}
        Expr::Var(id, _) => {
            idents.insert(id.clone());
        }
        Expr::App(builtin, _) => {
            walk_builtin_expr(builtin, |arg| collect_identifiers(arg, idents));
        }
        Expr::Op1(_, l, _) => collect_identifiers(l, idents),
        Expr::Op2(_, l, r, _) => {
            collect_identifiers(l, idents);
            collect_identifiers(r, idents);
        }
    }
}

/// The set of free variables an expression references.  The reserved
/// function vocabulary never appears: applications are already typed.
pub fn identifier_set(expr: &Expr) -> BTreeSet<Ident> {
    let mut idents = BTreeSet::new();
    collect_identifiers(expr, &mut idents);
    idents
}
