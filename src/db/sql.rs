//! SQL text builders.
//!
//! Identifiers are always backtick-quoted; values are always placeholders.

/// Most placeholders MySQL accepts in one prepared statement.
pub const MAX_PLACEHOLDERS: usize = 65_535;

/// Quote an identifier, doubling embedded backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `` `database`.`table` ``, or just the table when no database is given.
pub fn qualified_table(database: &str, table: &str) -> String {
    if database.is_empty() {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(database), quote_ident(table))
    }
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(",")
}

/// Multi-row INSERT with positional placeholders.
pub fn insert_sql(
    database: &str,
    table: &str,
    columns: &[&str],
    rows: usize,
    on_duplicate_update: bool,
) -> String {
    let tuple = format!("({})", vec!["?"; columns.len()].join(","));
    let values = vec![tuple.as_str(); rows.max(1)].join(",");
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES {}",
        qualified_table(database, table),
        column_list(columns),
        values
    );
    if on_duplicate_update {
        let assignments = columns
            .iter()
            .map(|c| {
                let quoted = quote_ident(c);
                format!("{}=VALUES({})", quoted, quoted)
            })
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&assignments);
    }
    sql
}

/// UPDATE with positional SET placeholders. `where_clause` must already use
/// positional placeholders. A `limit` of 0 means no LIMIT.
pub fn update_sql(
    database: &str,
    table: &str,
    columns: &[&str],
    where_clause: Option<&str>,
    limit: u64,
) -> String {
    let assignments = columns
        .iter()
        .map(|c| format!("{}=?", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(",");
    let mut sql = format!(
        "UPDATE {} SET {}",
        qualified_table(database, table),
        assignments
    );
    if let Some(clause) = where_clause.filter(|c| !c.trim().is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    if limit > 0 {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

/// Single-row lookup by key with one positional placeholder.
pub fn select_by_key_sql(database: &str, table: &str, columns: &[&str], key_column: &str) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}=? LIMIT 1",
        column_list(columns),
        qualified_table(database, table),
        quote_ident(key_column)
    )
}

/// Rows per INSERT batch so the placeholder count stays within the server limit.
pub fn batch_rows(columns: usize, batch_size: usize) -> usize {
    let cap = MAX_PLACEHOLDERS / columns.max(1);
    batch_size.clamp(1, cap.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "`users`");
        assert_eq!(quote_ident("we`ird"), "`we``ird`");
    }

    #[test]
    fn test_qualified_table() {
        assert_eq!(qualified_table("app", "users"), "`app`.`users`");
        assert_eq!(qualified_table("", "users"), "`users`");
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            insert_sql("app", "t", &["a", "b"], 1, false),
            "INSERT INTO `app`.`t` (`a`,`b`) VALUES (?,?)"
        );
        assert_eq!(
            insert_sql("app", "t", &["a"], 3, true),
            "INSERT INTO `app`.`t` (`a`) VALUES (?),(?),(?) ON DUPLICATE KEY UPDATE `a`=VALUES(`a`)"
        );
    }

    #[test]
    fn test_update_sql() {
        assert_eq!(
            update_sql("app", "t", &["a", "b"], Some("`id`=?"), 1),
            "UPDATE `app`.`t` SET `a`=?,`b`=? WHERE `id`=? LIMIT 1"
        );
        assert_eq!(
            update_sql("app", "t", &["a"], None, 0),
            "UPDATE `app`.`t` SET `a`=?"
        );
        assert_eq!(
            update_sql("app", "t", &["a"], Some("  "), 0),
            "UPDATE `app`.`t` SET `a`=?"
        );
    }

    #[test]
    fn test_select_by_key_sql() {
        assert_eq!(
            select_by_key_sql("app", "t", &["id", "name"], "id"),
            "SELECT `id`,`name` FROM `app`.`t` WHERE `id`=? LIMIT 1"
        );
    }

    #[test]
    fn test_batch_rows() {
        assert_eq!(batch_rows(2, 100), 100);
        assert_eq!(batch_rows(1000, 500), 65);
        assert_eq!(batch_rows(3, 0), 1);
        assert_eq!(batch_rows(70_000, 10), 1);
    }
}
