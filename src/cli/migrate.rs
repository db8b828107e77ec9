// src/cli/migrate.rs — Model database migration command
//
// Migrations run automatically whenever the SQLite store is opened; this
// command shows what is applied and can revert the schema.

use rusqlite::Connection;
use std::path::Path;

use crate::infra::config::{Config, StorageBackend};
use crate::storage::schema;

pub fn run_migrate(config: &Config, status_only: bool, rollback: bool) -> anyhow::Result<()> {
    if config.storage.backend != StorageBackend::Sqlite {
        println!("Storage backend is not sqlite; nothing to migrate.");
        return Ok(());
    }
    let db_path = config.storage.resolved_path();

    if !db_path.exists() && (status_only || rollback) {
        println!("No database found at: {}", db_path.display());
        return Ok(());
    }
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(&db_path)?;

    if status_only {
        return show_migration_status(&conn, &db_path);
    }

    if rollback {
        println!("Reverting all migrations (stored models will be dropped)...");
        schema::rollback_to(&conn, 0)?;
    } else {
        println!("Running database migrations...");
        schema::run_migrations(&conn)?;
    }
    println!("Done.");
    show_migration_status(&conn, &db_path)
}

fn show_migration_status(conn: &Connection, db_path: &Path) -> anyhow::Result<()> {
    let version = schema::current_version(conn)?;
    println!("Database: {}", db_path.display());
    println!("Current schema version: {version}");

    let mut stmt =
        conn.prepare("SELECT version, name, applied_at FROM _migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, u32>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;
    for row in rows {
        let (version, name, applied_at) = row?;
        println!("  v{version}: {name} (applied {applied_at})");
    }
    Ok(())
}
