/// Read-only SQL tools over a SQLite database
///
/// Exposes schema exploration (`list_tables`, `describe_table`,
/// `get_relationships`) and guarded ad-hoc queries (`execute_sql`), plus two
/// resources: the table list and the first rows of any table. The database is
/// opened read-only and every query string is screened before it runs.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use futures::FutureExt;
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use schemars::JsonSchema;
use serde::Deserialize;
use thiserror::Error;

use crate::provider::{
    input_schema_for, parse_arguments, RegistryError, ToolArguments, ToolDefinition, ToolError,
    ToolHandler, ToolRegistry,
};

/// Rows returned by the table data resource
pub const TABLE_DATA_LIMIT: usize = 100;

const FORBIDDEN_STATEMENTS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "MERGE", "UPSERT",
    "REPLACE", "GRANT", "REVOKE", "EXEC", "EXECUTE", "ATTACH", "DETACH", "PRAGMA", "VACUUM",
    "REINDEX",
];

/// Errors that can occur while querying the database
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("{0}")]
    Query(#[from] rusqlite::Error),

    #[error("Invalid table name format: '{0}'")]
    InvalidTableName(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Only SELECT queries are allowed")]
    NotReadOnly,
}

fn allowed_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(SELECT|WITH)\b").expect("valid regex"))
}

fn forbidden_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"\b({})\b", FORBIDDEN_STATEMENTS.join("|"))).expect("valid regex")
    })
}

fn second_statement() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r";\s*\w+").expect("valid regex"))
}

fn table_name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
    })
}

/// Whether a query is a single read-only statement
///
/// Conservative: a forbidden keyword anywhere, even inside a string literal,
/// rejects the query.
pub fn is_read_only_query(query: &str) -> bool {
    let clean = query.trim().to_uppercase();

    allowed_start().is_match(&clean)
        && !forbidden_word().is_match(&clean)
        && !second_statement().is_match(&clean)
}

/// `table` or `schema.table`, identifiers only
pub fn is_valid_table_name(name: &str) -> bool {
    table_name_pattern().is_match(name)
}

/// Split `schema.table`, defaulting to the `main` schema
fn split_table_name(name: &str) -> (&str, &str) {
    name.split_once('.').unwrap_or(("main", name))
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => "NULL".to_string(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<blob {} bytes>", b.len()),
    }
}

/// Run a query and render it as a header line followed by one line per row
fn render_query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<String, SqlError> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();

    let mut lines = vec![columns.join(",")];
    let mut rows = stmt.query(params)?;
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get_ref(i).map(render_value))
            .collect::<Result<Vec<_>, _>>()?;
        lines.push(values.join(","));
    }
    Ok(lines.join("\n"))
}

/// Read-only handle on a SQLite database
pub struct SqlDatabase {
    conn: Mutex<Connection>,
}

impl SqlDatabase {
    /// Open an existing database file read-only
    pub fn open(path: &Path) -> Result<Self, SqlError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(|e| SqlError::Connection(format!("Failed to open {}: {}", path.display(), e)))?;

        tracing::info!("SQL tools connected to database at: {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T, SqlError>) -> Result<T, SqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| SqlError::Connection("database lock poisoned".to_string()))?;
        f(&*conn)
    }

    fn checked_table<'a>(&self, conn: &Connection, name: &'a str) -> Result<(&'a str, &'a str), SqlError> {
        if !is_valid_table_name(name) {
            return Err(SqlError::InvalidTableName(name.to_string()));
        }
        let (schema, table) = split_table_name(name);

        // An unknown schema makes the pragma fail rather than return no rows
        let columns: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info(?1, ?2)",
            params![table, schema],
            |row| row.get(0),
        ) {
            Ok(count) => count,
            Err(rusqlite::Error::SqliteFailure(..)) => 0,
            Err(e) => return Err(e.into()),
        };

        if columns == 0 {
            return Err(SqlError::TableNotFound(name.to_string()));
        }
        Ok((schema, table))
    }

    /// Names of all user tables, one per line
    pub fn list_tables(&self) -> Result<String, SqlError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names.join("\n"))
        })
    }

    /// Column layout of a table
    pub fn describe_table(&self, table_name: &str) -> Result<String, SqlError> {
        self.with_conn(|conn| {
            let (schema, table) = self.checked_table(conn, table_name)?;
            render_query(
                conn,
                "SELECT name AS COLUMN_NAME, \
                        type AS DATA_TYPE, \
                        CASE WHEN \"notnull\" = 1 THEN 'NO' ELSE 'YES' END AS IS_NULLABLE, \
                        COALESCE(dflt_value, '') AS COLUMN_DEFAULT, \
                        CASE WHEN pk > 0 THEN 'YES' ELSE 'NO' END AS PRIMARY_KEY \
                 FROM pragma_table_info(?1, ?2) ORDER BY cid",
                params![table, schema],
            )
        })
    }

    /// Foreign keys declared on a table
    pub fn get_relationships(&self, table_name: &str) -> Result<String, SqlError> {
        self.with_conn(|conn| {
            let (schema, table) = self.checked_table(conn, table_name)?;
            render_query(
                conn,
                "SELECT 'fk_' || ?1 || '_' || id AS CONSTRAINT_NAME, \
                        \"from\" AS COLUMN_NAME, \
                        \"table\" AS REFERENCED_TABLE, \
                        COALESCE(\"to\", '') AS REFERENCED_COLUMN \
                 FROM pragma_foreign_key_list(?1, ?2) ORDER BY id, seq",
                params![table, schema],
            )
        })
    }

    /// First rows of a table
    pub fn get_table_data(&self, table_name: &str) -> Result<String, SqlError> {
        self.with_conn(|conn| {
            let (schema, table) = self.checked_table(conn, table_name)?;
            // Both parts matched the identifier pattern, so quoting is safe
            let sql = format!(
                "SELECT * FROM \"{}\".\"{}\" LIMIT {}",
                schema, table, TABLE_DATA_LIMIT
            );
            render_query(conn, &sql, [])
        })
    }

    /// Run a screened read-only query
    pub fn execute_sql(&self, query: &str) -> Result<String, SqlError> {
        if !is_read_only_query(query) {
            tracing::warn!("Rejected non read-only query: {}", query);
            return Err(SqlError::NotReadOnly);
        }
        self.with_conn(|conn| render_query(conn, query, []))
    }
}

/// Run a database call off the async runtime
async fn blocking<T, F>(db: &Arc<SqlDatabase>, f: F) -> Result<T, ToolError>
where
    F: FnOnce(&SqlDatabase) -> Result<T, SqlError> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || f(&*db))
        .await
        .map_err(|e| ToolError::Failed(format!("database task failed: {}", e)))?
        .map_err(|e| ToolError::Failed(e.to_string()))
}

/// Parameters naming a table
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableParams {
    /// Table name, optionally schema-qualified (e.g. users or main.users)
    pub table_name: String,
}

/// Parameters for `execute_sql`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryParams {
    /// A single read-only SELECT statement
    pub query: String,
}

/// `list_tables` takes no arguments
#[derive(Debug, Deserialize, JsonSchema)]
pub struct NoParams {}

pub struct ListTables {
    db: Arc<SqlDatabase>,
}

#[async_trait]
impl ToolHandler for ListTables {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_tables".to_string(),
            description: "List all database tables".to_string(),
            input_schema: input_schema_for::<NoParams>(),
        }
    }

    async fn call(&self, _arguments: ToolArguments) -> Result<String, ToolError> {
        blocking(&self.db, |db| db.list_tables()).await
    }
}

pub struct DescribeTable {
    db: Arc<SqlDatabase>,
}

#[async_trait]
impl ToolHandler for DescribeTable {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "describe_table".to_string(),
            description: "Describe table structure (columns, data types, constraints)".to_string(),
            input_schema: input_schema_for::<TableParams>(),
        }
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let params: TableParams = parse_arguments(arguments)?;
        blocking(&self.db, move |db| db.describe_table(&params.table_name)).await
    }
}

pub struct GetRelationships {
    db: Arc<SqlDatabase>,
}

#[async_trait]
impl ToolHandler for GetRelationships {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_relationships".to_string(),
            description: "Get foreign key relationships for a table".to_string(),
            input_schema: input_schema_for::<TableParams>(),
        }
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let params: TableParams = parse_arguments(arguments)?;
        blocking(&self.db, move |db| db.get_relationships(&params.table_name)).await
    }
}

pub struct ExecuteSql {
    db: Arc<SqlDatabase>,
}

#[async_trait]
impl ToolHandler for ExecuteSql {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "execute_sql".to_string(),
            description: "Execute a READ-ONLY SQL query (SELECT only)".to_string(),
            input_schema: input_schema_for::<QueryParams>(),
        }
    }

    async fn call(&self, arguments: ToolArguments) -> Result<String, ToolError> {
        let params: QueryParams = parse_arguments(arguments)?;
        blocking(&self.db, move |db| db.execute_sql(&params.query)).await
    }
}

/// Build the registry served as the `sql-dba` server
pub fn sql_registry(db: Arc<SqlDatabase>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(ListTables { db: Arc::clone(&db) })?;
    registry.register(DescribeTable { db: Arc::clone(&db) })?;
    registry.register(GetRelationships { db: Arc::clone(&db) })?;
    registry.register(ExecuteSql { db: Arc::clone(&db) })?;

    let tables_db = Arc::clone(&db);
    registry.register_resource("sqlite://tables", "tables", Some("List all database tables"), move |_| {
        let db = Arc::clone(&tables_db);
        async move { blocking(&db, |db| db.list_tables()).await }.boxed()
    })?;

    registry.register_resource_template(
        "sqlite://table/{table_name}",
        "table_data",
        Some("Get the first 100 rows of a table"),
        move |params| {
            let db = Arc::clone(&db);
            let table_name = params.get("table_name").cloned().unwrap_or_default();
            async move { blocking(&db, move |db| db.get_table_data(&table_name)).await }.boxed()
        },
    )?;

    Ok(registry)
}
