//! Named parameters and WHERE filters.

use crate::db::sql::quote_ident;
use crate::models::Value;
use serde::Serialize;

/// A named value bound to `@name` in SQL text, or a column assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub value: Value,
}

impl Param {
    /// Create a parameter. A leading `@` on the name is ignored.
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        let name = match name.strip_prefix('@') {
            Some(stripped) => stripped.to_string(),
            None => name,
        };
        Self {
            name,
            value: value.into(),
        }
    }

    /// Equality condition on the column of the same name.
    ///
    /// NULL never compares equal, so a NULL value becomes `IS NULL` and the
    /// parameter itself is left unreferenced.
    pub fn where_fragment(&self) -> String {
        if self.value.is_null() {
            format!("{} IS NULL", quote_ident(&self.name))
        } else {
            format!("{}=@{}", quote_ident(&self.name), self.name)
        }
    }
}

/// A WHERE clause and the named parameters it references.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Condition text without the `WHERE` keyword; may reference `@name`.
    pub clause: String,
    pub params: Vec<Param>,
}

impl Filter {
    pub fn new(clause: impl Into<String>, params: Vec<Param>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }

    /// Match rows whose columns equal every given parameter.
    pub fn matching(params: Vec<Param>) -> Self {
        let clause = params
            .iter()
            .map(Param::where_fragment)
            .collect::<Vec<_>>()
            .join(" AND ");
        Self { clause, params }
    }

    pub fn is_empty(&self) -> bool {
        self.clause.trim().is_empty()
    }
}
