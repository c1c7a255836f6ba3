//! Schema Catalog
//!
//! Read-only snapshot of table -> column membership and foreign-key
//! relations. Built once per request from an introspection collaborator and
//! never mutated afterwards, so it can be shared freely between readers.
//!
//! All lookups fold identifiers with ASCII case-insensitive comparison and
//! hand back the catalog's own spelling.

use crate::error::{QueryPilotError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// A table and its ordered column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Catalog spelling of `column` if it belongs to this table.
    pub fn column(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(column))
            .map(String::as_str)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column(column).is_some()
    }
}

/// Foreign-key relation `from_table.from_column -> to_table.to_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

impl ForeignKey {
    pub fn new(from_table: &str, from_column: &str, to_table: &str, to_column: &str) -> Self {
        Self {
            from_table: from_table.to_string(),
            from_column: from_column.to_string(),
            to_table: to_table.to_string(),
            to_column: to_column.to_string(),
        }
    }

    /// True if this relation links `a` and `b`, in either direction.
    pub fn connects(&self, a: &str, b: &str) -> bool {
        (self.from_table.eq_ignore_ascii_case(a) && self.to_table.eq_ignore_ascii_case(b))
            || (self.from_table.eq_ignore_ascii_case(b) && self.to_table.eq_ignore_ascii_case(a))
    }
}

/// Raw output of an introspection collaborator. Also the JSON snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableSchema>,
    #[serde(default)]
    pub relations: Vec<ForeignKey>,
}

/// External schema introspection collaborator.
pub trait SchemaIntrospector {
    fn describe(&self) -> Result<SchemaDescription>;
}

impl SchemaIntrospector for SchemaDescription {
    fn describe(&self) -> Result<SchemaDescription> {
        Ok(self.clone())
    }
}

#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: Vec<TableSchema>,
    relations: Vec<ForeignKey>,
    /// lower-cased table name -> position in `tables`
    tables_by_name: HashMap<String, usize>,
    /// Union of all columns, first catalog spelling wins
    all_columns: Vec<String>,
}

impl SchemaCatalog {
    pub fn new(tables: Vec<TableSchema>, relations: Vec<ForeignKey>) -> Result<Self> {
        let mut tables_by_name = HashMap::new();
        let mut all_columns = Vec::new();
        let mut seen_columns = HashSet::new();

        for (idx, table) in tables.iter().enumerate() {
            if tables_by_name
                .insert(table.name.to_ascii_lowercase(), idx)
                .is_some()
            {
                return Err(QueryPilotError::Catalog(format!(
                    "duplicate table: {}",
                    table.name
                )));
            }

            let mut table_columns = HashSet::new();
            for column in &table.columns {
                let folded = column.to_ascii_lowercase();
                if !table_columns.insert(folded.clone()) {
                    return Err(QueryPilotError::Catalog(format!(
                        "duplicate column {} in table {}",
                        column, table.name
                    )));
                }
                if seen_columns.insert(folded) {
                    all_columns.push(column.clone());
                }
            }
        }

        let catalog = Self {
            tables,
            relations,
            tables_by_name,
            all_columns,
        };

        for fk in &catalog.relations {
            if !catalog.has_column(&fk.from_table, &fk.from_column)
                || !catalog.has_column(&fk.to_table, &fk.to_column)
            {
                return Err(QueryPilotError::Catalog(format!(
                    "relation {}.{} -> {}.{} references unknown identifiers",
                    fk.from_table, fk.from_column, fk.to_table, fk.to_column
                )));
            }
        }

        Ok(catalog)
    }

    pub fn from_description(description: SchemaDescription) -> Result<Self> {
        Self::new(description.tables, description.relations)
    }

    /// Snapshot the schema through an introspection collaborator.
    pub fn introspect(introspector: &dyn SchemaIntrospector) -> Result<Self> {
        Self::from_description(introspector.describe()?)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let description: SchemaDescription = serde_json::from_str(&content)?;
        Self::from_description(description)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_description())?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn to_description(&self) -> SchemaDescription {
        SchemaDescription {
            tables: self.tables.clone(),
            relations: self.relations.clone(),
        }
    }

    /// Table names in catalog order.
    pub fn tables(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn table_schemas(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables_by_name
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.tables[idx])
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Catalog spelling of a table name.
    pub fn canonical_table(&self, name: &str) -> Option<&str> {
        self.table(name).map(|t| t.name.as_str())
    }

    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.table(table).map(|t| t.columns.as_slice())
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).map_or(false, |t| t.has_column(column))
    }

    pub fn relations(&self) -> &[ForeignKey] {
        &self.relations
    }

    /// Every relation linking `a` and `b`, in either direction.
    pub fn relations_between(&self, a: &str, b: &str) -> Vec<&ForeignKey> {
        self.relations.iter().filter(|fk| fk.connects(a, b)).collect()
    }

    /// Union of all columns of all tables.
    pub fn all_columns(&self) -> &[String] {
        &self.all_columns
    }

    /// Catalog spelling of `column` if any table owns it.
    pub fn canonical_column(&self, column: &str) -> Option<&str> {
        self.all_columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(column))
            .map(String::as_str)
    }

    pub fn is_schema_column(&self, column: &str) -> bool {
        self.canonical_column(column).is_some()
    }

    /// Tables owning `column`, in catalog order.
    pub fn tables_with_column(&self, column: &str) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.has_column(column))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// True if `name` is a table or a column anywhere in the schema.
    pub fn is_known_identifier(&self, name: &str) -> bool {
        self.contains_table(name) || self.is_schema_column(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// STUDENT / DEPARTMENT joined on DEPT_CODE, plus an unrelated COLLEGE table.
    pub fn university() -> SchemaCatalog {
        SchemaCatalog::new(
            vec![
                TableSchema::new("STUDENT", &["STU_NUM", "STU_FNAME", "STU_GPA", "DEPT_CODE"]),
                TableSchema::new("DEPARTMENT", &["DEPT_CODE", "SCHOOL_CODE", "EMP_NUM"]),
                TableSchema::new("COLLEGE", &["COLL_CODE", "DEPT_NAME"]),
            ],
            vec![ForeignKey::new("STUDENT", "DEPT_CODE", "DEPARTMENT", "DEPT_CODE")],
        )
        .unwrap()
    }
}
