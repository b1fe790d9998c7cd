// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

use serde::{Deserialize, Serialize};

/// A variable name as it appears in cell source text.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    NoError, // will never be produced
    DoesNotExist,
    UnrecognizedToken,
    UnrecognizedEof,
    ExtraToken,
    ExpectedNumber,
    UnknownBuiltin,
    BadBuiltinArgs,
    EmptyEquation,
    ReservedCharacter,
    UnknownDependency,
    NestedBrace,
    StrayCloseBrace,
    UnclosedBrace,
    BraceSyntax,
    BadInequality,
    BadCalendarDate,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            DoesNotExist => "does_not_exist",
            UnrecognizedToken => "unrecognized_token",
            UnrecognizedEof => "unrecognized_eof",
            ExtraToken => "extra_token",
            ExpectedNumber => "expected_number",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            EmptyEquation => "empty_equation",
            ReservedCharacter => "reserved_character",
            UnknownDependency => "unknown_dependency",
            NestedBrace => "nested_brace",
            StrayCloseBrace => "stray_close_brace",
            UnclosedBrace => "unclosed_brace",
            BraceSyntax => "brace_syntax",
            BadInequality => "bad_inequality",
            BadCalendarDate => "bad_calendar_date",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

/// An error located inside a single piece of equation source text.
/// Offsets are byte offsets relative to the start of that text.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EquationError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for EquationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

impl From<Error> for EquationError {
    fn from(err: Error) -> Self {
        EquationError {
            code: err.code,
            start: 0,
            end: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Template,
    Cell,
    Evaluation,
    Solver,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Template => "TemplateError",
            ErrorKind::Cell => "CellError",
            ErrorKind::Evaluation => "EvaluationError",
            ErrorKind::Solver => "SolverError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type EquationResult<T> = result::Result<T, EquationError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{EquationError, ErrorCode};
        Err(EquationError{ start: $start as u16, end: $end as u16, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! template_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Template, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Template, ErrorCode::$code, None))
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::new(
            ErrorKind::Template,
            ErrorCode::BraceSyntax,
            Some("2 problems".to_owned()),
        );
        assert_eq!("TemplateError{brace_syntax: 2 problems}", format!("{err}"));

        let err = Error::new(ErrorKind::Solver, ErrorCode::Generic, None);
        assert_eq!("SolverError{generic}", format!("{err}"));
    }

    #[test]
    fn test_equation_error_display() {
        let err = EquationError {
            start: 3,
            end: 7,
            code: ErrorCode::ExpectedNumber,
        };
        assert_eq!("3:7:expected_number", format!("{err}"));
    }

    #[test]
    fn test_eqn_err_macro() {
        fn fails() -> EquationResult<f64> {
            eqn_err!(EmptyEquation, 0usize, 0usize)
        }
        assert_eq!(
            EquationError {
                start: 0,
                end: 0,
                code: ErrorCode::EmptyEquation
            },
            fails().unwrap_err()
        );
    }
}
