use rusqlite::Connection;
use std::path::{Path, PathBuf};

use crate::migrations;

/// Дескриптор базы лаунчера. Соединение открывается на каждую операцию
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Открыть (или создать) базу по пути, создать схему и прогнать миграции
    pub fn init(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let db = Self {
            path: path.as_ref().to_path_buf(),
        };
        let conn = db.conn()?;
        conn.execute_batch(
            r#"
            -- Настройки лаунчера (key/value)
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Куда установлена каждая игра
            CREATE TABLE IF NOT EXISTS game_paths (
                game_id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_settings_key ON settings(key);
            "#,
        )?;

        migrations::run_migrations(&conn)?;

        log::debug!("Database initialized at {}", db.path.display());
        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn conn(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(conn)
    }
}
