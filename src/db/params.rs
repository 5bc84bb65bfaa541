//! Parameter binding utilities for MySQL queries.
//!
//! SQL handed to a session references parameters as `@name`. The driver only
//! understands positional `?` placeholders, so [`rewrite_named`] replaces each
//! `@name` that matches a supplied parameter and collects the values in
//! placeholder order. Names that match nothing stay in the text as MySQL user
//! variables.

use crate::models::{Param, Value};
use sqlx::MySql;
use sqlx::mysql::MySqlArguments;
use sqlx::types::Json;

/// Bind a value to a MySQL query.
pub(crate) fn bind_value<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::UInt(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Decimal(v) | Value::String(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v)),
    }
}

/// SQL with positional placeholders and the values to bind, in order.
#[derive(Debug)]
pub(crate) struct Rewritten<'p> {
    pub sql: String,
    pub args: Vec<&'p Value>,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replace `@name` references to `params` with `?`.
///
/// Quoted strings, quoted identifiers, comments and `@@system` variables are
/// copied unchanged. Matching is case-insensitive; the first parameter with a
/// matching name wins.
pub(crate) fn rewrite_named<'p>(sql: &str, params: &'p [Param]) -> Rewritten<'p> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut args = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                // Quoted section; backslash escapes apply to strings only
                out.push(c);
                i += 1;
                while i < chars.len() {
                    let q = chars[i];
                    out.push(q);
                    i += 1;
                    if q == '\\' && c != '`' && i < chars.len() {
                        out.push(chars[i]);
                        i += 1;
                    } else if q == c {
                        if i < chars.len() && chars[i] == c {
                            out.push(c);
                            i += 1;
                        } else {
                            break;
                        }
                    }
                }
            }
            '#' => i = copy_until_newline(&chars, i, &mut out),
            '-' if chars.get(i + 1) == Some(&'-')
                && chars.get(i + 2).is_none_or(|n| n.is_whitespace()) =>
            {
                i = copy_until_newline(&chars, i, &mut out);
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                let start = i;
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.extend(&chars[start..i]);
            }
            '@' if chars.get(i + 1) == Some(&'@') => {
                let start = i;
                i += 2;
                while i < chars.len() && (is_name_char(chars[i]) || chars[i] == '.') {
                    i += 1;
                }
                out.extend(&chars[start..i]);
            }
            '@' => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && is_name_char(chars[end]) {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                let found = (!name.is_empty())
                    .then(|| params.iter().find(|p| p.name.eq_ignore_ascii_case(&name)))
                    .flatten();
                match found {
                    Some(param) => {
                        out.push('?');
                        args.push(&param.value);
                    }
                    None => {
                        out.push('@');
                        out.push_str(&name);
                    }
                }
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Rewritten { sql: out, args }
}

fn copy_until_newline(chars: &[char], start: usize, out: &mut String) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    out.extend(&chars[start..i]);
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Vec<Param> {
        vec![Param::new("id", 7), Param::new("Name", "ada")]
    }

    #[test]
    fn test_rewrites_matching_names_in_order() {
        let params = params();
        let r = rewrite_named("SELECT * FROM t WHERE name=@name AND id=@ID OR id=@id", &params);
        assert_eq!(r.sql, "SELECT * FROM t WHERE name=? AND id=? OR id=?");
        assert_eq!(
            r.args,
            vec![&Value::from("ada"), &Value::Int(7), &Value::Int(7)]
        );
    }

    #[test]
    fn test_unknown_names_stay_user_variables() {
        let params = params();
        let r = rewrite_named("SET @total = @id + 1", &params);
        assert_eq!(r.sql, "SET @total = ? + 1");
        assert_eq!(r.args.len(), 1);
    }

    #[test]
    fn test_prefix_of_longer_name_is_not_matched() {
        let params = params();
        let r = rewrite_named("SELECT @identity", &params);
        assert_eq!(r.sql, "SELECT @identity");
        assert!(r.args.is_empty());
    }

    #[test]
    fn test_system_variables_untouched() {
        let params = vec![Param::new("version", "x")];
        let r = rewrite_named("SELECT @@version, @@session.sql_mode", &params);
        assert_eq!(r.sql, "SELECT @@version, @@session.sql_mode");
        assert!(r.args.is_empty());
    }

    #[test]
    fn test_quotes_untouched() {
        let params = params();
        let sql = r#"SELECT '@id', "it\"s @id", `@id`, 'a''@id' FROM t WHERE x=@id"#;
        let r = rewrite_named(sql, &params);
        assert_eq!(
            r.sql,
            r#"SELECT '@id', "it\"s @id", `@id`, 'a''@id' FROM t WHERE x=?"#
        );
        assert_eq!(r.args.len(), 1);
    }

    #[test]
    fn test_comments_untouched() {
        let params = params();
        let sql = "SELECT 1 -- @id\n, 2 # @id\n, /* @id */ @id";
        let r = rewrite_named(sql, &params);
        assert_eq!(r.sql, "SELECT 1 -- @id\n, 2 # @id\n, /* @id */ ?");
        assert_eq!(r.args.len(), 1);
    }

    #[test]
    fn test_double_dash_without_space_is_not_comment() {
        let params = params();
        let r = rewrite_named("SELECT 5--@id", &params);
        assert_eq!(r.sql, "SELECT 5--?");
    }

    #[test]
    fn test_lone_at_sign_kept() {
        let r = rewrite_named("GRANT ALL ON db.* TO 'u'@'%'", &[]);
        assert_eq!(r.sql, "GRANT ALL ON db.* TO 'u'@'%'");
    }

    #[test]
    fn test_unterminated_quote_copied() {
        let params = params();
        let r = rewrite_named("SELECT 'abc @id", &params);
        assert_eq!(r.sql, "SELECT 'abc @id");
        assert!(r.args.is_empty());
    }
}
