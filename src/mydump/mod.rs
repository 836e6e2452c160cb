//! # Dump metadata enumeration.
//!
//! Walks the dump storage and routes file names into per-database,
//! per-table metadata. Only names and sizes are consumed here; dump file
//! *contents* are never parsed by the supervisor (the engine deals with
//! them).
//!
//! ## File name routing (mydumper layout)
//! - `<db>-schema-create.sql` declares database `<db>`
//! - `<db>.<table>-schema.sql` declares table `<db>.<table>`
//! - `<db>.<table>.sql` / `<db>.<table>.csv` and the numbered variants
//!   `<db>.<table>.<n>.sql|csv` are data files; their sizes accumulate into
//!   the table's `total_size`
//! - anything else (e.g. `metadata`) is ignored

use tracing::{debug, instrument};

use crate::error::Error;
use crate::storage::ExternalStorage;

/// Metadata of one table in the dump.
#[derive(Debug, Clone)]
pub struct TableMeta {
    pub schema: String,
    pub name: String,
    /// Sum of the data file sizes, in bytes.
    pub total_size: u64,
    /// The `<db>.<table>-schema.sql` file, if present.
    pub schema_file: Option<String>,
    /// Data file names in storage, sorted.
    pub data_files: Vec<String>,
}

impl TableMeta {
    /// Qualified name in backtick form, as used in progress events.
    pub fn qualified_name(&self) -> String {
        format!("`{}`.`{}`", self.schema, self.name)
    }
}

/// Metadata of one database in the dump.
#[derive(Debug, Clone)]
pub struct DatabaseMeta {
    pub name: String,
    /// The `<db>-schema-create.sql` file, if present.
    pub schema_file: Option<String>,
    pub tables: Vec<TableMeta>,
}

/// Enumerates the dump and builds database/table metadata.
///
/// Databases and tables come back sorted by name so downstream iteration
/// order is deterministic.
#[instrument(skip_all)]
pub async fn load_dump_metadata(
    storage: &dyn ExternalStorage,
) -> Result<Vec<DatabaseMeta>, Error> {
    let files = storage.list().await?;
    let mut dbs: Vec<DatabaseMeta> = Vec::new();

    for file in &files {
        // Dumps are flat; route by base name regardless of subdirectories.
        let base = file.name.rsplit('/').next().unwrap_or(&file.name);
        match route_file(base) {
            Some(Route::Database(db)) => {
                ensure_db(&mut dbs, db).schema_file = Some(file.name.clone());
            }
            Some(Route::TableSchema { db, table }) => {
                ensure_table(&mut dbs, db, table).schema_file = Some(file.name.clone());
            }
            Some(Route::Data { db, table }) => {
                let meta = ensure_table(&mut dbs, db, table);
                meta.total_size += file.size;
                meta.data_files.push(file.name.clone());
            }
            None => debug!(file = %file.name, "ignoring unrecognized dump file"),
        }
    }

    for db in &mut dbs {
        db.tables.sort_by(|a, b| a.name.cmp(&b.name));
        for table in &mut db.tables {
            table.data_files.sort();
        }
    }
    dbs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dbs)
}

enum Route<'a> {
    Database(&'a str),
    TableSchema { db: &'a str, table: &'a str },
    Data { db: &'a str, table: &'a str },
}

fn route_file(name: &str) -> Option<Route<'_>> {
    if let Some(db) = name.strip_suffix("-schema-create.sql") {
        return Some(Route::Database(db));
    }
    if let Some(rest) = name.strip_suffix("-schema.sql") {
        let (db, table) = rest.split_once('.')?;
        return Some(Route::TableSchema { db, table });
    }
    let rest = name
        .strip_suffix(".sql")
        .or_else(|| name.strip_suffix(".csv"))?;
    let (db, rest) = rest.split_once('.')?;
    // Either `<table>` or `<table>.<n>` remains.
    let table = match rest.rsplit_once('.') {
        Some((table, chunk)) if chunk.chars().all(|c| c.is_ascii_digit()) => table,
        _ => rest,
    };
    Some(Route::Data { db, table })
}

fn ensure_db<'a>(dbs: &'a mut Vec<DatabaseMeta>, name: &str) -> &'a mut DatabaseMeta {
    if let Some(idx) = dbs.iter().position(|d| d.name == name) {
        &mut dbs[idx]
    } else {
        dbs.push(DatabaseMeta {
            name: name.to_string(),
            schema_file: None,
            tables: Vec::new(),
        });
        dbs.last_mut().expect("just pushed")
    }
}

fn ensure_table<'a>(dbs: &'a mut Vec<DatabaseMeta>, db: &str, table: &str) -> &'a mut TableMeta {
    let db_meta = ensure_db(dbs, db);
    if let Some(idx) = db_meta.tables.iter().position(|t| t.name == table) {
        &mut db_meta.tables[idx]
    } else {
        db_meta.tables.push(TableMeta {
            schema: db.to_string(),
            name: table.to_string(),
            total_size: 0,
            schema_file: None,
            data_files: Vec::new(),
        });
        db_meta.tables.last_mut().expect("just pushed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{new, BackendDesc, ExternalStorageOptions};

    #[tokio::test]
    async fn enumerates_databases_tables_and_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, len: usize| {
            std::fs::write(dir.path().join(name), vec![b'x'; len]).unwrap();
        };
        write("shop-schema-create.sql", 10);
        write("shop.orders-schema.sql", 20);
        write("shop.orders.1.sql", 100);
        write("shop.orders.2.sql", 150);
        write("shop.users-schema.sql", 20);
        write("shop.users.csv", 30);
        write("metadata", 5);

        let storage = new(
            BackendDesc::Local {
                root: dir.path().to_path_buf(),
            },
            &ExternalStorageOptions::default(),
        )
        .await
        .unwrap();

        let dbs = load_dump_metadata(storage.as_ref()).await.unwrap();
        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].name, "shop");
        assert_eq!(dbs[0].tables.len(), 2);

        let orders = &dbs[0].tables[0];
        assert_eq!(orders.name, "orders");
        assert_eq!(orders.total_size, 250);
        assert_eq!(orders.data_files.len(), 2);
        assert_eq!(orders.qualified_name(), "`shop`.`orders`");

        let users = &dbs[0].tables[1];
        assert_eq!(users.name, "users");
        assert_eq!(users.total_size, 30);
    }

    #[test]
    fn routing_handles_dotted_chunk_suffixes() {
        assert!(matches!(
            route_file("db.tbl.0001.sql"),
            Some(Route::Data { db: "db", table: "tbl" })
        ));
        assert!(matches!(
            route_file("db.tbl.csv"),
            Some(Route::Data { db: "db", table: "tbl" })
        ));
        assert!(matches!(
            route_file("db-schema-create.sql"),
            Some(Route::Database("db"))
        ));
        assert!(route_file("metadata").is_none());
        assert!(route_file("loose.sql").is_none());
    }
}
