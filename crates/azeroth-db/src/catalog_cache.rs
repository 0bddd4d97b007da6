//! Последний удачно загруженный каталог аддонов

use azeroth_core::Result;
use chrono::Utc;
use rusqlite::params;

use crate::db::Database;

/// Снимок каталога из таблицы `catalog_cache`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCatalog {
    /// JSON как пришёл с сервера
    pub body: String,
    pub source_url: String,
    pub fetched_at: String,
}

#[derive(Debug, Clone)]
pub struct CatalogCache {
    db: Database,
}

impl CatalogCache {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn load(&self) -> Result<Option<CachedCatalog>> {
        let conn = self.db.conn()?;
        let mut stmt =
            conn.prepare("SELECT body, source_url, fetched_at FROM catalog_cache WHERE id = 1")?;
        match stmt.query_row([], |row| {
            Ok(CachedCatalog {
                body: row.get(0)?,
                source_url: row.get(1)?,
                fetched_at: row.get(2)?,
            })
        }) {
            Ok(cached) => Ok(Some(cached)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Хранится только одна версия, новая заменяет старую
    pub fn store(&self, body: &str, source_url: &str) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            r#"INSERT INTO catalog_cache (id, body, source_url, fetched_at) VALUES (1, ?1, ?2, ?3)
               ON CONFLICT(id) DO UPDATE SET body = excluded.body,
                   source_url = excluded.source_url, fetched_at = excluded.fetched_at"#,
            params![body, source_url, Utc::now().to_rfc3339()],
        )?;
        log::info!("Cached catalog from {} ({} bytes)", source_url, body.len());
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute("DELETE FROM catalog_cache", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_db;

    #[test]
    fn test_store_replaces_previous_snapshot() {
        let (db, dir) = temp_db();
        let cache = CatalogCache::new(db);
        assert!(cache.load().unwrap().is_none());

        cache.store("[]", "https://a.example.com/catalog.json").unwrap();
        cache.store(r#"[{"title":"Bagnon"}]"#, "https://b.example.com/catalog.json").unwrap();

        let cached = cache.load().unwrap().unwrap();
        assert_eq!(cached.body, r#"[{"title":"Bagnon"}]"#);
        assert_eq!(cached.source_url, "https://b.example.com/catalog.json");

        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());

        let _ = std::fs::remove_dir_all(dir);
    }
}
