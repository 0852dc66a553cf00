/// User table discovery
///
/// User tables are created at runtime, one per tenant table plus the
/// relation tables backing link and multiple select fields. They are found
/// purely by naming prefix and returned in a stable order: schema, then
/// table type, then the numeric id embedded in the name.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;

use crate::core::connection::ConnectionParams;
use crate::core::error::Result;
use crate::utils::{DEFAULT_LINK_RELATION_PREFIX, DEFAULT_MULTIPLE_SELECT_PREFIX, DEFAULT_USER_TABLE_PREFIX};

const USER_TABLES_QUERY: &str = "SELECT table_schema::text, table_name::text
    FROM information_schema.tables
    WHERE table_name ~ $1 OR
          table_name ~ $2 OR
          table_name ~ $3
    ORDER BY table_schema, table_name";

/// Which naming pattern a table matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    UserTable,
    LinkRelation,
    MultipleSelect,
}

/// Naming prefixes identifying user data tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablePatterns {
    pub user_table_prefix: String,
    pub link_relation_prefix: String,
    pub multiple_select_prefix: String,
}

impl Default for TablePatterns {
    fn default() -> Self {
        Self {
            user_table_prefix: DEFAULT_USER_TABLE_PREFIX.to_string(),
            link_relation_prefix: DEFAULT_LINK_RELATION_PREFIX.to_string(),
            multiple_select_prefix: DEFAULT_MULTIPLE_SELECT_PREFIX.to_string(),
        }
    }
}

impl TablePatterns {
    pub fn prefixes(&self) -> [(TableKind, &str); 3] {
        [
            (TableKind::UserTable, self.user_table_prefix.as_str()),
            (TableKind::LinkRelation, self.link_relation_prefix.as_str()),
            (TableKind::MultipleSelect, self.multiple_select_prefix.as_str()),
        ]
    }

    /// Kind of the table, or None when it is not user data.
    ///
    /// The longest matching prefix wins when prefixes overlap.
    pub fn classify(&self, table_name: &str) -> Option<TableKind> {
        self.prefixes()
            .into_iter()
            .filter(|(_, prefix)| !prefix.is_empty() && table_name.starts_with(prefix))
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(kind, _)| kind)
    }

    /// Anchored regexes for the PostgreSQL `~` operator
    pub fn query_patterns(&self) -> [String; 3] {
        self.prefixes()
            .map(|(_, prefix)| format!("^{}.*$", regex::escape(prefix)))
    }

    /// pg_dump arguments excluding every user table
    pub fn exclude_args(&self) -> Vec<String> {
        self.prefixes()
            .iter()
            .map(|(_, prefix)| format!("--exclude-table={}*", prefix))
            .collect()
    }

    pub fn table_ref(&self, schema: impl Into<String>, name: impl Into<String>) -> Option<TableRef> {
        let name = name.into();
        let kind = self.classify(&name)?;
        Some(TableRef {
            schema: schema.into(),
            name,
            kind,
        })
    }
}

/// A user table found in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
}

impl TableRef {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// (text before the first digit run, the digit run as a number)
    ///
    /// The number is kept as its digits without leading zeros. Comparing
    /// length first and then the digits is numeric order for any length.
    fn sort_key(&self) -> (&str, Option<(usize, &str)>) {
        match self.name.find(|c: char| c.is_ascii_digit()) {
            Some(start) => {
                let digits = &self.name[start..];
                let end = digits
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(digits.len());
                let number = digits[..end].trim_start_matches('0');
                (&self.name[..start], Some((number.len(), number)))
            }
            None => (self.name.as_str(), None),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

impl Ord for TableRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.schema
            .cmp(&other.schema)
            .then_with(|| self.sort_key().cmp(&other.sort_key()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for TableRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort user tables by schema, name prefix, then numeric id
pub fn sort_user_tables(mut tables: Vec<TableRef>) -> Vec<TableRef> {
    tables.sort();
    tables
}

/// Source of the user tables to back up
#[allow(async_fn_in_trait)]
pub trait UserTableSource {
    /// All user tables, sorted with [`sort_user_tables`]
    async fn list_user_tables(&self) -> Result<Vec<TableRef>>;
}

/// Reads user tables from `information_schema` of a live database
#[derive(Debug, Clone)]
pub struct PgCatalog {
    params: ConnectionParams,
    patterns: TablePatterns,
}

impl PgCatalog {
    pub fn new(params: ConnectionParams, patterns: TablePatterns) -> Self {
        Self { params, patterns }
    }

    fn connect_options(&self) -> PgConnectOptions {
        // PgConnectOptions::new() picks up PGPASSWORD and ~/.pgpass like the tools do
        PgConnectOptions::new()
            .host(&self.params.host)
            .port(self.params.port)
            .username(&self.params.username)
            .database(&self.params.database)
    }
}

impl UserTableSource for PgCatalog {
    async fn list_user_tables(&self) -> Result<Vec<TableRef>> {
        let mut conn = PgConnection::connect_with(&self.connect_options()).await?;

        let [user_tables, link_relations, multiple_selects] = self.patterns.query_patterns();
        let rows: Vec<(String, String)> = sqlx::query_as(USER_TABLES_QUERY)
            .bind(user_tables)
            .bind(link_relations)
            .bind(multiple_selects)
            .fetch_all(&mut conn)
            .await?;

        conn.close().await?;

        let tables = rows
            .into_iter()
            .filter_map(|(schema, name)| self.patterns.table_ref(schema, name))
            .collect();

        let tables = sort_user_tables(tables);
        tracing::debug!(count = tables.len(), "found user tables");
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[TableRef]) -> Vec<String> {
        tables.iter().map(TableRef::qualified_name).collect()
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let patterns = TablePatterns {
            user_table_prefix: "table_".to_string(),
            ..TablePatterns::default()
        };
        let tables = ["table_2", "table_10", "table_1"]
            .iter()
            .filter_map(|n| patterns.table_ref("public", *n))
            .collect();

        assert_eq!(
            names(&sort_user_tables(tables)),
            vec!["public.table_1", "public.table_2", "public.table_10"]
        );
    }

    #[test]
    fn test_names_without_digits_first_and_full_name_breaks_ties() {
        let patterns = TablePatterns::default();
        let tables = ["database_table_1", "database_table_01", "database_table_"]
            .iter()
            .filter_map(|n| patterns.table_ref("public", *n))
            .collect();

        assert_eq!(
            names(&sort_user_tables(tables)),
            vec![
                "public.database_table_",
                "public.database_table_01",
                "public.database_table_1",
            ]
        );
    }

    #[test]
    fn test_long_digit_runs_keep_numeric_order() {
        let patterns = TablePatterns::default();
        let huge = format!("database_table_{}", "9".repeat(45));
        let bigger = format!("database_table_1{}", "0".repeat(45));
        let tables = vec![
            patterns.table_ref("public", bigger.clone()).unwrap(),
            patterns.table_ref("public", huge.clone()).unwrap(),
            patterns.table_ref("public", "database_table_2").unwrap(),
        ];

        let sorted: Vec<String> = sort_user_tables(tables).into_iter().map(|t| t.name).collect();
        assert_eq!(sorted, vec!["database_table_2".to_string(), huge, bigger]);
    }

    #[test]
    fn test_groups_by_schema_then_type() {
        let patterns = TablePatterns::default();
        let tables = vec![
            patterns.table_ref("public", "database_table_12").unwrap(),
            patterns.table_ref("public", "database_relation_3").unwrap(),
            patterns.table_ref("archive", "database_table_99").unwrap(),
            patterns.table_ref("public", "database_multipleselect_7").unwrap(),
            patterns.table_ref("public", "database_table_4").unwrap(),
            patterns.table_ref("public", "database_relation_20").unwrap(),
        ];

        assert_eq!(
            names(&sort_user_tables(tables)),
            vec![
                "archive.database_table_99",
                "public.database_multipleselect_7",
                "public.database_relation_3",
                "public.database_relation_20",
                "public.database_table_4",
                "public.database_table_12",
            ]
        );
    }

    #[test]
    fn test_classify() {
        let patterns = TablePatterns::default();
        assert_eq!(patterns.classify("database_table_1"), Some(TableKind::UserTable));
        assert_eq!(patterns.classify("database_relation_5"), Some(TableKind::LinkRelation));
        assert_eq!(
            patterns.classify("database_multipleselect_9"),
            Some(TableKind::MultipleSelect)
        );
        assert_eq!(patterns.classify("core_user"), None);
        assert_eq!(patterns.classify("my_database_table_1"), None);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let patterns = TablePatterns {
            user_table_prefix: "t_".to_string(),
            link_relation_prefix: "t_rel_".to_string(),
            multiple_select_prefix: "t_ms_".to_string(),
        };
        assert_eq!(patterns.classify("t_rel_4"), Some(TableKind::LinkRelation));
        assert_eq!(patterns.classify("t_4"), Some(TableKind::UserTable));
    }

    #[test]
    fn test_query_patterns_are_anchored_and_escaped() {
        let patterns = TablePatterns {
            user_table_prefix: "tbl.".to_string(),
            ..TablePatterns::default()
        };
        let [user, link, multi] = patterns.query_patterns();
        assert_eq!(user, r"^tbl\..*$");
        assert_eq!(link, "^database_relation_.*$");
        assert_eq!(multi, "^database_multipleselect_.*$");
    }

    #[test]
    fn test_exclude_args() {
        assert_eq!(
            TablePatterns::default().exclude_args(),
            vec![
                "--exclude-table=database_table_*",
                "--exclude-table=database_relation_*",
                "--exclude-table=database_multipleselect_*",
            ]
        );
    }
}
