//! Database Migration System
//!
//! Versioned migrations with tracking table.
//! Add new migrations to MIGRATIONS array.

use rusqlite::{params, Connection};

/// Migration definition
pub struct Migration {
    /// Unique version number (must be sequential)
    pub version: i32,
    /// Short description
    pub description: &'static str,
    /// SQL to execute
    pub sql: &'static str,
}

/// All migrations in order. Add new migrations at the end.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Create catalog_cache table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS catalog_cache (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                body TEXT NOT NULL,
                source_url TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add source column to game_paths",
        sql: r#"
            ALTER TABLE game_paths ADD COLUMN source TEXT;
        "#,
    },
];

/// Initialize migrations table
fn init_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
        [],
    )?;
    Ok(())
}

/// Get current schema version (0 if no migrations applied)
pub fn get_current_version(conn: &Connection) -> rusqlite::Result<i32> {
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);
    Ok(version)
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .filter_map(|r| r.ok())
        .collect();
    Ok(columns.contains(&column.to_string()))
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    init_migrations_table(conn)?;

    let current_version = get_current_version(conn)?;
    log::info!("Current schema version: {}", current_version);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        if migration.version == 2 {
            // Колонка могла остаться от частично применённой миграции
            if !column_exists(conn, "game_paths", "source")? {
                conn.execute("ALTER TABLE game_paths ADD COLUMN source TEXT", [])?;
            }
        } else {
            conn.execute_batch(migration.sql)?;
        }

        // Record migration as applied
        conn.execute(
            "INSERT INTO schema_migrations (version, description) VALUES (?1, ?2)",
            params![migration.version, migration.description],
        )?;

        log::info!("Migration v{} completed", migration.version);
    }

    Ok(())
}
