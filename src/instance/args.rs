//! Positional template arguments
//!
//! The catalog scanner produces a flat list of [`TemplateArg`]s; [`ArgCursor`]
//! consumes them in field order, converting each into the field's typed
//! representation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, TemplarError};

/// One positional argument of a template declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateArg {
    /// Integer literal
    Int(i64),
    /// Type alias, enum constant or any other non-integer token
    Str(String),
    /// `S<i1, i2, ...>` integer sequence
    Tuple(Vec<i64>),
}

impl TemplateArg {
    /// Integer token if the text parses as one, otherwise a string token
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        let token = token.trim();
        token
            .parse::<i64>()
            .map(Self::Int)
            .unwrap_or_else(|_| Self::Str(token.to_string()))
    }

    fn describe(&self) -> String {
        match self {
            Self::Int(v) => format!("integer {v}"),
            Self::Str(s) => format!("`{s}`"),
            Self::Tuple(items) => format!("tuple of {} items", items.len()),
        }
    }
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Tuple(items) => {
                let joined: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "S<{}>", joined.join(", "))
            }
        }
    }
}

/// Field-ordered consumer of positional arguments
pub(crate) struct ArgCursor {
    args: std::vec::IntoIter<TemplateArg>,
}

impl ArgCursor {
    pub(crate) fn new(args: Vec<TemplateArg>) -> Self {
        Self {
            args: args.into_iter(),
        }
    }

    fn next(&mut self, field: &'static str, expected: &'static str) -> Result<TemplateArg> {
        self.args.next().ok_or_else(|| TemplarError::CatalogFormat {
            field,
            expected,
            found: "end of argument list".to_string(),
        })
    }

    pub(crate) fn int(&mut self, field: &'static str) -> Result<i64> {
        match self.next(field, "integer")? {
            TemplateArg::Int(v) => Ok(v),
            other => Err(mismatch(field, "integer", &other)),
        }
    }

    pub(crate) fn string(&mut self, field: &'static str) -> Result<String> {
        match self.next(field, "identifier")? {
            TemplateArg::Str(s) => Ok(s),
            other => Err(mismatch(field, "identifier", &other)),
        }
    }

    /// Boolean flags appear as `0`/`1` or `true`/`false`
    pub(crate) fn flag(&mut self, field: &'static str) -> Result<bool> {
        match self.next(field, "boolean")? {
            TemplateArg::Int(0) => Ok(false),
            TemplateArg::Int(1) => Ok(true),
            TemplateArg::Str(s) if s == "true" => Ok(true),
            TemplateArg::Str(s) if s == "false" => Ok(false),
            other => Err(mismatch(field, "boolean", &other)),
        }
    }

    pub(crate) fn tuple<const N: usize>(&mut self, field: &'static str) -> Result<[i64; N]> {
        match self.next(field, "integer tuple")? {
            TemplateArg::Tuple(items) => {
                let found = items.len();
                items.try_into().map_err(|_| TemplarError::CatalogFormat {
                    field,
                    expected: "integer tuple of fixed arity",
                    found: format!("tuple of {found} items"),
                })
            }
            other => Err(mismatch(field, "integer tuple", &other)),
        }
    }

    /// Auxiliary operand lists; the parser blanks these to empty tuples
    pub(crate) fn list(&mut self, field: &'static str) -> Result<Vec<String>> {
        match self.next(field, "list")? {
            TemplateArg::Tuple(items) => Ok(items.iter().map(ToString::to_string).collect()),
            TemplateArg::Str(s) => Ok(vec![s]),
            other @ TemplateArg::Int(_) => Err(mismatch(field, "list", &other)),
        }
    }

    pub(crate) fn optional_string(&mut self, field: &'static str) -> Result<Option<String>> {
        match self.args.next() {
            None => Ok(None),
            Some(TemplateArg::Str(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(field, "identifier", &other)),
        }
    }
}

fn mismatch(field: &'static str, expected: &'static str, found: &TemplateArg) -> TemplarError {
    TemplarError::CatalogFormat {
        field,
        expected,
        found: found.describe(),
    }
}
