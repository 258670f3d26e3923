//! Schema introspection for the SQL generation prompt

use duckdb::{Connection, Result as DuckResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::convert;

const SAMPLE_VALUES: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCatalog {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub sample_values: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseCatalog {
    pub tables: Vec<TableCatalog>,
}

impl DatabaseCatalog {
    /// Reads every table in the `main` schema. Tables that fail to describe
    /// are skipped.
    pub fn from_connection(conn: &Connection) -> DuckResult<Self> {
        let mut stmt = conn.prepare(
            "SELECT table_name FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_name",
        )?;
        let table_names: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<DuckResult<Vec<_>>>()?;

        let mut tables = Vec::with_capacity(table_names.len());
        for table_name in table_names {
            match Self::describe_table(conn, &table_name) {
                Ok(table) => tables.push(table),
                Err(e) => tracing::warn!(table = %table_name, error = %e, "Skipping table in catalog"),
            }
        }

        Ok(Self { tables })
    }

    fn describe_table(conn: &Connection, table_name: &str) -> DuckResult<TableCatalog> {
        let mut stmt = conn.prepare(
            "SELECT column_name, data_type, is_nullable \
             FROM information_schema.columns \
             WHERE table_schema = 'main' AND table_name = ? \
             ORDER BY ordinal_position",
        )?;
        let columns: Vec<(String, String, String)> = stmt
            .query_map([table_name], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<DuckResult<Vec<_>>>()?;

        let quoted = quote_ident(table_name);
        let row_count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", quoted), [], |row| row.get(0))?;

        let mut sample_stmt = conn.prepare(&format!("SELECT * FROM {} LIMIT {}", quoted, SAMPLE_VALUES))?;
        let width = columns.len();
        let sample_rows: Vec<Vec<Value>> = sample_stmt
            .query_map([], |row| {
                (0..width)
                    .map(|idx| row.get::<_, duckdb::types::Value>(idx).map(|v| convert::to_json(&v)))
                    .collect::<DuckResult<Vec<_>>>()
            })?
            .collect::<DuckResult<Vec<_>>>()?;

        let columns = columns
            .into_iter()
            .enumerate()
            .map(|(idx, (name, data_type, is_nullable))| ColumnInfo {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                sample_values: sample_rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .filter(|v| !v.is_null())
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(TableCatalog {
            name: table_name.to_string(),
            columns,
            row_count: usize::try_from(row_count).unwrap_or_default(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Plain-text schema description, one line per table
    pub fn to_prompt_context(&self) -> String {
        let mut out = String::from("Tables:\n");
        for table in &self.tables {
            let columns: Vec<String> = table
                .columns
                .iter()
                .map(|col| format!("{} {}", col.name, col.data_type))
                .collect();
            out.push_str(&format!("- {} ({} rows): {}\n", table.name, table.row_count, columns.join(", ")));

            for col in table.columns.iter().filter(|c| !c.sample_values.is_empty()) {
                let samples: Vec<String> = col.sample_values.iter().map(Value::to_string).collect();
                out.push_str(&format!("    {} e.g. {}\n", col.name, samples.join(", ")));
            }
        }
        out.trim_end().to_string()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
