//! Пути установленных игр в SQLite

use azeroth_core::{PathStore, Result};
use chrono::Utc;
use rusqlite::params;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::db::Database;

/// `PathStore` поверх таблицы `game_paths`
#[derive(Debug, Clone)]
pub struct SqlitePathStore {
    db: Database,
}

impl SqlitePathStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn get_source(&self, id: &str) -> Result<Option<String>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT source FROM game_paths WHERE game_id = ?1")?;
        match stmt.query_row([id], |row| row.get::<_, Option<String>>(0)) {
            Ok(source) => Ok(source),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl PathStore for SqlitePathStore {
    fn save_path(&self, id: &str, path: &Path) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            r#"INSERT INTO game_paths (game_id, path, updated_at) VALUES (?1, ?2, ?3)
               ON CONFLICT(game_id) DO UPDATE SET path = excluded.path, updated_at = excluded.updated_at"#,
            params![id, path.to_string_lossy(), Utc::now().to_rfc3339()],
        )?;
        log::info!("Saved install path for {}: {}", id, path.display());
        Ok(())
    }

    fn get_path(&self, id: &str) -> Result<Option<PathBuf>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT path FROM game_paths WHERE game_id = ?1")?;
        match stmt.query_row([id], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(PathBuf::from(value))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_source(&self, id: &str, source: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "UPDATE game_paths SET source = ?2 WHERE game_id = ?1",
            params![id, source],
        )?;
        Ok(())
    }

    fn remove_path(&self, id: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute("DELETE FROM game_paths WHERE game_id = ?1", [id])?;
        Ok(())
    }

    fn all_paths(&self) -> Result<BTreeMap<String, PathBuf>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare("SELECT game_id, path FROM game_paths")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut paths = BTreeMap::new();
        for row in rows {
            let (id, path) = row?;
            paths.insert(id, PathBuf::from(path));
        }
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;

    #[test]
    fn test_save_overwrites_previous_path() {
        let (db, dir) = temp_db();
        let store = SqlitePathStore::new(db);

        store.save_path("tbc", Path::new("/games/tbc-old")).unwrap();
        store.save_path("tbc", Path::new("/games/tbc")).unwrap();
        store.save_source("tbc", "https://cdn.example.com/tbc.zip").unwrap();

        assert_eq!(store.get_path("tbc").unwrap(), Some(PathBuf::from("/games/tbc")));
        assert_eq!(
            store.get_source("tbc").unwrap().as_deref(),
            Some("https://cdn.example.com/tbc.zip")
        );
        assert_eq!(store.all_paths().unwrap().len(), 1);

        store.remove_path("tbc").unwrap();
        assert!(store.get_path("tbc").unwrap().is_none());
        assert!(store.get_source("tbc").unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_path_survives_reopen() {
        let (db, dir) = temp_db();
        SqlitePathStore::new(db.clone())
            .save_path("wotlk", Path::new("/games/wotlk"))
            .unwrap();

        let reopened = SqlitePathStore::new(Database::init(db.path()).unwrap());
        assert_eq!(
            reopened.get_path("wotlk").unwrap(),
            Some(PathBuf::from("/games/wotlk"))
        );

        let _ = std::fs::remove_dir_all(dir);
    }
}
