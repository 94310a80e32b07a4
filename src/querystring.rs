//! Compiled query unit passed from the query layer to the engine.
//!
//! Templates use `{}` for each argument. An argument is either a value or a
//! nested `QueryString`, which is spliced in place with its own arguments
//! renumbered. `{{` and `}}` produce literal braces.

use std::fmt;

use crate::error::EngineError;
use crate::types::RowValues;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryArg {
    Value(RowValues),
    Fragment(QueryString),
}

macro_rules! value_arg {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for QueryArg {
                fn from(value: $ty) -> Self {
                    QueryArg::Value(value.into())
                }
            }
        )*
    };
}

value_arg!(
    RowValues,
    i64,
    i32,
    f64,
    bool,
    &str,
    String,
    chrono::NaiveDateTime,
    serde_json::Value,
    rust_decimal::Decimal,
    uuid::Uuid,
);

impl From<QueryString> for QueryArg {
    fn from(fragment: QueryString) -> Self {
        QueryArg::Fragment(fragment)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryString {
    template: String,
    args: Vec<QueryArg>,
}

impl QueryString {
    #[must_use]
    pub fn new(template: impl Into<String>, args: Vec<QueryArg>) -> Self {
        Self {
            template: template.into(),
            args,
        }
    }

    /// A query string with no arguments.
    #[must_use]
    pub fn raw(template: impl Into<String>) -> Self {
        Self::new(template, Vec::new())
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<QueryArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a nested fragment.
    #[must_use]
    pub fn fragment(mut self, fragment: QueryString) -> Self {
        self.args.push(QueryArg::Fragment(fragment));
        self
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    #[must_use]
    pub fn args(&self) -> &[QueryArg] {
        &self.args
    }

    /// Compile to PostgreSQL SQL with `$n` placeholders and the flattened values.
    ///
    /// # Errors
    /// Returns `EngineError::ParameterError` when the template's placeholders and
    /// the arguments don't line up, or a brace is unbalanced.
    pub fn compile_string(&self) -> Result<(String, Vec<RowValues>), EngineError> {
        let mut sql = String::with_capacity(self.template.len());
        let mut values = Vec::new();
        self.compile_into(&mut sql, &mut values)?;
        Ok((sql, values))
    }

    fn compile_into(
        &self,
        sql: &mut String,
        values: &mut Vec<RowValues>,
    ) -> Result<(), EngineError> {
        let mut args = self.args.iter();
        let mut chars = self.template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    sql.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    sql.push('}');
                }
                '{' => {
                    if chars.next() != Some('}') {
                        return Err(EngineError::ParameterError(format!(
                            "unsupported placeholder in template {:?}; use {{}}",
                            self.template
                        )));
                    }
                    match args.next() {
                        Some(QueryArg::Value(value)) => {
                            values.push(value.clone());
                            sql.push('$');
                            sql.push_str(&values.len().to_string());
                        }
                        Some(QueryArg::Fragment(fragment)) => fragment.compile_into(sql, values)?,
                        None => {
                            return Err(EngineError::ParameterError(format!(
                                "template {:?} has more placeholders than arguments",
                                self.template
                            )));
                        }
                    }
                }
                '}' => {
                    return Err(EngineError::ParameterError(format!(
                        "unmatched '}}' in template {:?}",
                        self.template
                    )));
                }
                other => sql.push(other),
            }
        }

        if args.next().is_some() {
            return Err(EngineError::ParameterError(format!(
                "template {:?} has fewer placeholders than arguments ({})",
                self.template,
                self.args.len()
            )));
        }
        Ok(())
    }
}

impl From<&str> for QueryString {
    fn from(template: &str) -> Self {
        QueryString::raw(template)
    }
}

/// Renders the template with arguments inlined, for logging only.
impl fmt::Display for QueryString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut args = self.args.iter();
        let mut chars = self.template.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    f.write_str("{")?;
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    f.write_str("}")?;
                }
                '{' if chars.peek() == Some(&'}') => {
                    chars.next();
                    match args.next() {
                        Some(QueryArg::Value(RowValues::Text(s))) => write!(f, "'{s}'")?,
                        Some(QueryArg::Value(RowValues::Null)) => f.write_str("null")?,
                        Some(QueryArg::Value(RowValues::Decimal(d))) => write!(f, "{d}")?,
                        Some(QueryArg::Value(RowValues::Uuid(u))) => write!(f, "'{u}'")?,
                        Some(QueryArg::Value(value)) => write!(f, "{}", value.to_json())?,
                        Some(QueryArg::Fragment(fragment)) => write!(f, "{fragment}")?,
                        None => f.write_str("{}")?,
                    }
                }
                other => write!(f, "{other}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_placeholders_in_order() {
        let qs = QueryString::raw("SELECT * FROM users WHERE id = {} AND name = {}")
            .arg(3)
            .arg("Bob");
        let (sql, values) = qs.compile_string().unwrap();
        assert_eq!(sql, "SELECT * FROM users WHERE id = $1 AND name = $2");
        assert_eq!(values, vec![RowValues::Int(3), RowValues::Text("Bob".into())]);
    }

    #[test]
    fn fragments_continue_numbering() {
        let filter = QueryString::raw("name = {} OR name = {}").arg("a").arg("b");
        let qs = QueryString::raw("SELECT 1 WHERE id > {} AND ({}) LIMIT {}")
            .arg(1)
            .fragment(filter)
            .arg(10);
        let (sql, values) = qs.compile_string().unwrap();
        assert_eq!(sql, "SELECT 1 WHERE id > $1 AND (name = $2 OR name = $3) LIMIT $4");
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn doubled_braces_are_literal() {
        let qs = QueryString::raw("SELECT '{{\"a\": 1}}'::jsonb, {}").arg(true);
        let (sql, _) = qs.compile_string().unwrap();
        assert_eq!(sql, "SELECT '{\"a\": 1}'::jsonb, $1");
    }

    #[test]
    fn argument_count_mismatch() {
        assert!(QueryString::raw("SELECT {}").compile_string().is_err());
        assert!(QueryString::raw("SELECT 1").arg(1).compile_string().is_err());
        assert!(QueryString::raw("SELECT {name}").arg(1).compile_string().is_err());
    }

    #[test]
    fn display_inlines_values() {
        let qs = QueryString::raw("SELECT * FROM band WHERE name = {} AND id = {}")
            .arg("Pythonistas")
            .arg(1);
        assert_eq!(
            qs.to_string(),
            "SELECT * FROM band WHERE name = 'Pythonistas' AND id = 1"
        );
    }
}
