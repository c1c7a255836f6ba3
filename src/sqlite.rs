//! SQLite collaborators
//!
//! `SqliteDatabase` plays all three external roles against one connection:
//! schema introspection, statement execution under a deadline, and the
//! value probe used to rebind unresolved filter columns.

use crate::catalog::{ForeignKey, SchemaDescription, SchemaIntrospector, TableSchema};
use crate::error::Result;
use crate::execution::{ExecutionError, ExecutionErrorKind, QueryExecutor, QueryRows};
use crate::execution_loop::ErrorClassifier;
use crate::sql_synthesizer::ValueProbe;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1_000;

pub struct SqliteDatabase {
    conn: Mutex<Connection>,
    timeout: Duration,
    classifier: ErrorClassifier,
}

impl SqliteDatabase {
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        info!("Opened SQLite database {}", path.as_ref().display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            timeout: Self::DEFAULT_TIMEOUT,
            classifier: ErrorClassifier::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a batch of statements as-is. Setup only; never used for pipeline SQL.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute_batch(sql)?;
        Ok(())
    }

    /// Run `f` with a progress handler that interrupts the statement once
    /// the deadline has passed.
    fn with_deadline<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let deadline = Instant::now() + self.timeout;
        conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
        let result = f(&conn);
        conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
        result
    }

    fn to_execution_error(&self, err: rusqlite::Error) -> ExecutionError {
        if let rusqlite::Error::SqliteFailure(failure, _) = &err {
            if failure.code == ErrorCode::OperationInterrupted {
                return ExecutionError::new(
                    ExecutionErrorKind::Timeout,
                    format!("query exceeded {} ms", self.timeout.as_millis()),
                );
            }
        }
        self.classifier.to_execution_error(err.to_string())
    }

    fn table_names(conn: &Connection) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY rowid",
        )?;
        let names = stmt.query_map([], |row| row.get(0))?;
        names.collect()
    }

    fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let columns = stmt.query_map([], |row| row.get(1))?;
        columns.collect()
    }

    fn table_relations(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ForeignKey>> {
        let mut stmt = conn.prepare(&format!("PRAGMA foreign_key_list({})", quote(table)))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut relations = Vec::new();
        for row in rows {
            let (to_table, from_column, to_column) = row?;
            // `REFERENCES parent` without a column list targets the parent's primary key
            let to_column = match to_column {
                Some(column) => Some(column),
                None => Self::primary_key(conn, &to_table)?,
            };
            match to_column {
                Some(to_column) => relations.push(ForeignKey {
                    from_table: table.to_string(),
                    from_column,
                    to_table,
                    to_column,
                }),
                None => debug!(
                    "Skipping foreign key {}.{} -> {}: parent has no primary key",
                    table, from_column, to_table
                ),
            }
        }
        Ok(relations)
    }

    /// First primary-key column of `table`, if any.
    fn primary_key(conn: &Connection, table: &str) -> rusqlite::Result<Option<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
        let columns = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?))
        })?;
        for column in columns {
            let (name, pk) = column?;
            if pk == 1 {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(format!("<{} bytes>", blob.len())),
    }
}

impl SchemaIntrospector for SqliteDatabase {
    fn describe(&self) -> Result<SchemaDescription> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);

        let mut description = SchemaDescription::default();
        for name in Self::table_names(&conn)? {
            let columns = Self::table_columns(&conn, &name)?;
            description
                .relations
                .extend(Self::table_relations(&conn, &name)?);
            description.tables.push(TableSchema { name, columns });
        }

        info!(
            "Introspected {} tables, {} relations",
            description.tables.len(),
            description.relations.len()
        );
        Ok(description)
    }
}

impl QueryExecutor for SqliteDatabase {
    fn run(&self, sql: &str) -> std::result::Result<QueryRows, ExecutionError> {
        let started = Instant::now();
        let result = self.with_deadline(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();

            let mut rows = Vec::new();
            let mut cursor = stmt.query([])?;
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(to_json(row.get_ref(idx)?));
                }
                rows.push(values);
            }
            Ok(QueryRows { columns, rows })
        });

        match result {
            Ok(rows) => {
                debug!(
                    "Query returned {} rows in {:?}",
                    rows.len(),
                    started.elapsed()
                );
                Ok(rows)
            }
            Err(e) => Err(self.to_execution_error(e)),
        }
    }
}

impl ValueProbe for SqliteDatabase {
    fn exists(&self, table: &str, column: &str, value: &str) -> Result<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 LIMIT 1",
            quote(table),
            quote(column)
        );
        let hit = self.with_deadline(|conn| {
            conn.query_row(&sql, [value], |row| row.get::<_, i64>(0))
                .optional()
        })?;
        Ok(hit.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SchemaCatalog;

    fn university() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE DEPARTMENT (DEPT_CODE TEXT PRIMARY KEY, DEPT_NAME TEXT);
             CREATE TABLE STUDENT (
                 STU_NUM INTEGER PRIMARY KEY,
                 STU_FNAME TEXT,
                 STU_GPA REAL,
                 DEPT_CODE TEXT REFERENCES DEPARTMENT(DEPT_CODE)
             );
             INSERT INTO DEPARTMENT VALUES ('CIS', 'Computer Info Systems');
             INSERT INTO STUDENT VALUES (1, 'Ann', 3.4, 'CIS'), (2, 'Bo', 2.1, 'CIS');",
        )
        .unwrap();
        db
    }

    #[test]
    fn test_describe() {
        let catalog = SchemaCatalog::introspect(&university()).unwrap();
        assert_eq!(catalog.tables(), vec!["DEPARTMENT", "STUDENT"]);
        assert_eq!(
            catalog.columns("STUDENT").unwrap(),
            &["STU_NUM", "STU_FNAME", "STU_GPA", "DEPT_CODE"]
        );
        assert_eq!(
            catalog.relations(),
            &[ForeignKey::new("STUDENT", "DEPT_CODE", "DEPARTMENT", "DEPT_CODE")]
        );
    }

    #[test]
    fn test_describe_resolves_implicit_parent_key() {
        let db = university();
        db.execute_batch(
            "CREATE TABLE ADVISOR (ADV_NUM INTEGER, DEPT_CODE TEXT REFERENCES DEPARTMENT);
             CREATE TABLE NOTE (NOTE_TEXT TEXT, ADV_NUM INTEGER REFERENCES ADVISOR);",
        )
        .unwrap();

        let catalog = SchemaCatalog::introspect(&db).unwrap();

        assert_eq!(catalog.tables(), vec!["DEPARTMENT", "STUDENT", "ADVISOR", "NOTE"]);
        // NOTE references a parent without a primary key and is dropped
        assert_eq!(
            catalog.relations(),
            &[
                ForeignKey::new("STUDENT", "DEPT_CODE", "DEPARTMENT", "DEPT_CODE"),
                ForeignKey::new("ADVISOR", "DEPT_CODE", "DEPARTMENT", "DEPT_CODE"),
            ]
        );
    }

    #[test]
    fn test_run_returns_rows() {
        let rows = university()
            .run("SELECT STU_FNAME, STU_GPA FROM STUDENT WHERE STU_GPA > 3")
            .unwrap();
        assert_eq!(rows.columns, vec!["STU_FNAME", "STU_GPA"]);
        assert_eq!(rows.rows, vec![vec![Value::from("Ann"), Value::from(3.4)]]);
    }

    #[test]
    fn test_run_classifies_errors() {
        let err = university()
            .run("SELECT score FROM STUDENT")
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::UnknownColumn);
        assert!(err.message.contains("no such column: score"));

        let err = university().run("SELECT * FROM ENROLL").unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::UnknownTable);
    }

    #[test]
    fn test_run_times_out() {
        let db = university().with_timeout(Duration::from_millis(50));
        let err = db
            .run(
                "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                 SELECT COUNT(*) FROM c",
            )
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Timeout);
        assert!(!err.is_repairable());

        // handler is cleared, the connection stays usable
        assert!(db.run("SELECT COUNT(*) FROM STUDENT").is_ok());
    }

    #[test]
    fn test_value_probe() {
        let db = university();
        assert!(db.exists("DEPARTMENT", "DEPT_CODE", "CIS").unwrap());
        assert!(!db.exists("DEPARTMENT", "DEPT_NAME", "CIS").unwrap());
        assert!(db.exists("STUDENT", "STU_NUM", "2").unwrap());
    }
}
