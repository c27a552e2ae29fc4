use super::SchemaSource;
use anyhow::Context;
use rusqlite::{Connection, OpenFlags};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Lists user tables and their columns from a SQLite database file.
pub struct SqliteSchemaSource {
    path: PathBuf,
}

impl SqliteSchemaSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SchemaSource for SqliteSchemaSource {
    fn read_tables(&self) -> anyhow::Result<BTreeMap<String, Vec<String>>> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("failed to open relational database for introspection")?;

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tables = BTreeMap::new();
        for name in names {
            let mut info = conn.prepare(&format!(
                "PRAGMA table_info(\"{}\")",
                name.replace('"', "\"\"")
            ))?;
            let cols = info
                .query_map([], |r| r.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("failed to read columns of {}", name))?;
            tables.insert(name, cols);
        }
        Ok(tables)
    }
}
